//! Integration tests for the retrying workflow

use async_trait::async_trait;
use futures::StreamExt;
use genflow_core::prelude::*;
use genflow_core::store::StoredRecord;
use genflow_core::{CacheRecord, StoreError};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Generator that replays a script and records every request it receives.
#[derive(Default)]
struct ScriptedGenerator {
    script: Mutex<VecDeque<Result<RawResponse, GenerationError>>>,
    requests: Mutex<Vec<GenerationRequest>>,
}

impl ScriptedGenerator {
    fn new(script: Vec<Result<RawResponse, GenerationError>>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> usize {
        self.requests.lock().len()
    }

    fn request(&self, index: usize) -> GenerationRequest {
        self.requests.lock()[index].clone()
    }
}

#[async_trait]
impl Generator for ScriptedGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<RawResponse, GenerationError> {
        self.requests.lock().push(request.clone());
        self.script
            .lock()
            .pop_front()
            .unwrap_or_else(|| Ok(RawResponse::Text("not json".into())))
    }
}

/// Store whose writes always fail; reads optionally fail too.
struct BrokenStore {
    fail_scan: bool,
}

#[async_trait]
impl RecordStore for BrokenStore {
    async fn append(&self, _namespace: &str, _record: StoredRecord) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("disk full".into()))
    }

    async fn scan(&self, _namespace: &str) -> Result<Vec<StoredRecord>, StoreError> {
        if self.fail_scan {
            Err(StoreError::Unavailable("connection refused".into()))
        } else {
            Ok(Vec::new())
        }
    }

    async fn remove(&self, _namespace: &str, _ids: &[String]) -> Result<usize, StoreError> {
        Ok(0)
    }
}

fn post_validator() -> Validator {
    Validator::new(
        Schema::object()
            .non_empty("title", FieldKind::String)
            .required("body", FieldKind::String),
    )
}

fn valid_post(title: &str) -> RawResponse {
    RawResponse::Structured(json!({"title": title, "body": "text"}))
}

fn memory_cache() -> (InMemoryRecordStore, Arc<RecordCache<InMemoryRecordStore>>) {
    let store = InMemoryRecordStore::new();
    let cache = Arc::new(RecordCache::new(store.clone(), "posts"));
    (store, cache)
}

async fn collect(workflow: &RetryingWorkflow, topic: &str) -> Vec<WorkflowEvent> {
    workflow
        .stream(GenerationRequest::new(topic), CancellationToken::new())
        .collect()
        .await
}

fn terminal(events: &[WorkflowEvent]) -> &WorkflowOutcome {
    let finished: Vec<_> = events.iter().filter(|e| e.is_terminal()).collect();
    assert_eq!(finished.len(), 1, "expected exactly one terminal event: {events:?}");
    assert!(events.last().unwrap().is_terminal(), "terminal event must be last");
    events.last().unwrap().outcome().unwrap()
}

#[tokio::test]
async fn test_cache_hit_skips_generator() {
    let (_store, cache) = memory_cache();
    cache.store("rust", &json!({"title": "cached", "body": "b"})).await.unwrap();

    let generator = ScriptedGenerator::new(vec![Ok(valid_post("fresh"))]);
    let workflow = RetryingWorkflow::builder(generator.clone(), post_validator())
        .with_cache(cache)
        .build()
        .unwrap();

    let events = collect(&workflow, "rust").await;

    assert_eq!(
        terminal(&events),
        &WorkflowOutcome::Accepted {
            topic: "rust".into(),
            payload: json!({"title": "cached", "body": "b"}),
            attempts: 0,
            cached: true,
        }
    );
    assert!(events.contains(&WorkflowEvent::CacheHit { topic: "rust".into() }));
    assert_eq!(generator.calls(), 0);
}

#[tokio::test]
async fn test_always_invalid_exhausts_budget() {
    let (store, cache) = memory_cache();
    let generator = ScriptedGenerator::new(vec![]);
    let workflow = RetryingWorkflow::builder(generator.clone(), post_validator())
        .with_cache(cache)
        .max_attempts(3)
        .build()
        .unwrap();

    let events = collect(&workflow, "rust").await;

    match terminal(&events) {
        WorkflowOutcome::Exhausted {
            topic,
            attempts,
            message,
            last_error,
        } => {
            assert_eq!(topic, "rust");
            assert_eq!(*attempts, 3);
            assert!(message.contains("rust"));
            assert!(last_error.as_deref().unwrap().contains("not valid JSON"));
        }
        other => panic!("expected exhaustion, got {other:?}"),
    }
    assert_eq!(generator.calls(), 3);
    let rejected = events
        .iter()
        .filter(|e| matches!(e, WorkflowEvent::AttemptRejected { .. }))
        .count();
    assert_eq!(rejected, 3);
    assert!(store.is_empty("posts"), "nothing is cached on failure");
}

#[tokio::test]
async fn test_success_on_third_attempt_caches_that_payload() {
    let (_store, cache) = memory_cache();
    let generator = ScriptedGenerator::new(vec![
        Ok(RawResponse::Text("garbage".into())),
        Ok(RawResponse::Structured(json!({"title": "", "body": "x"}))),
        Ok(valid_post("third")),
    ]);
    let workflow = RetryingWorkflow::builder(generator.clone(), post_validator())
        .with_cache(cache.clone())
        .build()
        .unwrap();

    let outcome = workflow
        .run(GenerationRequest::new("rust"), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome.attempts(), 3);
    assert_eq!(outcome.payload(), Some(&json!({"title": "third", "body": "text"})));
    assert_eq!(generator.calls(), 3);

    let entries: Vec<CacheRecord> = cache.entries().await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].result, json!({"title": "third", "body": "text"}));
}

#[tokio::test]
async fn test_feedback_is_threaded_into_retries() {
    let generator = ScriptedGenerator::new(vec![
        Ok(RawResponse::Structured(json!({"title": "only a title"}))),
        Ok(valid_post("fixed")),
    ]);
    let workflow = RetryingWorkflow::builder(generator.clone(), post_validator())
        .build()
        .unwrap();

    let request = GenerationRequest::with_payload("rust", json!({"topic": "rust", "tone": "casual"}));
    let outcome = workflow.run(request, CancellationToken::new()).await.unwrap();
    assert!(outcome.is_accepted());

    assert_eq!(generator.request(0).payload, json!({"topic": "rust", "tone": "casual"}));

    let retry = generator.request(1).payload;
    assert_eq!(retry["original_request"], json!({"topic": "rust", "tone": "casual"}));
    assert_eq!(retry["previous_output"], json!({"title": "only a title"}));
    assert_eq!(retry["feedback"], json!("missing required field 'body'"));
    assert_eq!(retry["attempt"], json!(2));
    assert!(retry["instructions"].as_str().unwrap().len() > 10);
}

#[tokio::test]
async fn test_cache_write_failure_still_accepts() {
    let cache = Arc::new(RecordCache::new(BrokenStore { fail_scan: true }, "posts"));
    let generator = ScriptedGenerator::new(vec![Ok(valid_post("ok"))]);
    let workflow = RetryingWorkflow::builder(generator.clone(), post_validator())
        .with_cache(cache)
        .build()
        .unwrap();

    let events = collect(&workflow, "rust").await;

    assert!(terminal(&events).is_accepted());
    assert!(events.iter().any(|e| matches!(e, WorkflowEvent::CacheWriteFailed { .. })));
    assert!(events.contains(&WorkflowEvent::CacheMiss { topic: "rust".into() }));
    assert_eq!(generator.calls(), 1);
}

#[tokio::test]
async fn test_cache_disabled_always_generates() {
    let (store, cache) = memory_cache();
    cache.store("rust", &json!({"title": "cached", "body": "b"})).await.unwrap();

    let generator = ScriptedGenerator::new(vec![Ok(valid_post("fresh"))]);
    let workflow = RetryingWorkflow::builder(generator.clone(), post_validator())
        .with_cache(cache)
        .use_cache(false)
        .build()
        .unwrap();

    let outcome = workflow
        .run(GenerationRequest::new("rust"), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(generator.calls(), 1);
    assert_eq!(outcome.payload().unwrap()["title"], json!("fresh"));
    // Fresh result is still appended next to the old one.
    assert_eq!(store.len("posts"), 2);
}

#[tokio::test]
async fn test_event_sequence_ends_with_single_terminal() {
    let generator = ScriptedGenerator::new(vec![Ok(RawResponse::Text("{}".into())), Ok(valid_post("t"))]);
    let workflow = RetryingWorkflow::builder(generator, post_validator()).build().unwrap();

    let events = collect(&workflow, "rust").await;
    terminal(&events);

    assert!(matches!(events[0], WorkflowEvent::Started { .. }));
    assert_eq!(events[1], WorkflowEvent::CacheMiss { topic: "rust".into() });
    assert_eq!(
        events[2],
        WorkflowEvent::AttemptStarted {
            attempt: 1,
            max_attempts: 3
        }
    );
    assert!(matches!(events[3], WorkflowEvent::AttemptRejected { attempt: 1, .. }));
    assert_eq!(
        events[4],
        WorkflowEvent::AttemptStarted {
            attempt: 2,
            max_attempts: 3
        }
    );
    assert_eq!(events.len(), 6);
}

#[tokio::test]
async fn test_generator_errors_count_as_attempts() {
    let generator = ScriptedGenerator::new(vec![
        Err(GenerationError::Provider("500".into())),
        Ok(valid_post("ok")),
    ]);
    let workflow = RetryingWorkflow::builder(generator.clone(), post_validator())
        .build()
        .unwrap();

    let outcome = workflow
        .run(GenerationRequest::new("rust"), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome.attempts(), 2);
    let retry = generator.request(1).payload;
    assert_eq!(retry["previous_output"], Value::Null);
    assert!(retry["feedback"].as_str().unwrap().contains("Provider error: 500"));
}

#[tokio::test(start_paused = true)]
async fn test_attempt_deadline_counts_as_attempt() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let slow_then_fast = FnGenerator::new(move |request: GenerationRequest| {
        let n = counter.fetch_add(1, Ordering::SeqCst);
        async move {
            if n == 0 {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
            Ok(RawResponse::Structured(json!({"title": request.topic, "body": "b"})))
        }
    });

    let workflow = RetryingWorkflow::builder(slow_then_fast, post_validator())
        .attempt_timeout(Duration::from_secs(5))
        .build()
        .unwrap();

    let events = collect(&workflow, "rust").await;

    assert_eq!(terminal(&events).attempts(), 2);
    assert!(events.iter().any(|e| matches!(
        e,
        WorkflowEvent::AttemptRejected { attempt: 1, reason } if reason.contains("timed out")
    )));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_cancellation_ends_run_without_caching() {
    let (store, cache) = memory_cache();
    let hanging = FnGenerator::new(|_request: GenerationRequest| async {
        futures::future::pending::<Result<RawResponse, GenerationError>>().await
    });
    let workflow = RetryingWorkflow::builder(hanging, post_validator())
        .with_cache(cache)
        .build()
        .unwrap();

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        trigger.cancel();
    });

    let events: Vec<_> = workflow
        .stream(GenerationRequest::new("rust"), cancel)
        .collect()
        .await;

    assert_eq!(
        terminal(&events),
        &WorkflowOutcome::Cancelled {
            topic: "rust".into(),
            attempts: 1
        }
    );
    assert!(store.is_empty("posts"));
}

#[tokio::test]
async fn test_cancelled_before_start_makes_no_calls() {
    let generator = ScriptedGenerator::new(vec![Ok(valid_post("never"))]);
    let workflow = RetryingWorkflow::builder(generator.clone(), post_validator())
        .build()
        .unwrap();

    let cancel = CancellationToken::new();
    cancel.cancel();
    let outcome = workflow.run(GenerationRequest::new("rust"), cancel).await.unwrap();

    assert_eq!(outcome.attempts(), 0);
    assert!(matches!(outcome, WorkflowOutcome::Cancelled { .. }));
    assert_eq!(generator.calls(), 0);
}

#[tokio::test]
async fn test_transport_retries_are_one_attempt() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let flaky = FnGenerator::new(move |request: GenerationRequest| {
        let n = counter.fetch_add(1, Ordering::SeqCst);
        async move {
            if n == 0 {
                Err(GenerationError::Transport("connection reset".into()))
            } else {
                Ok(RawResponse::Structured(json!({"title": request.topic, "body": "b"})))
            }
        }
    });
    let policy = RetryPolicy::new(3)
        .with_initial_interval(Duration::from_millis(1))
        .with_jitter(false);

    let workflow = RetryingWorkflow::builder(RetryingGenerator::new(flaky, policy), post_validator())
        .build()
        .unwrap();

    let outcome = workflow
        .run(GenerationRequest::new("rust"), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome.attempts(), 1);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_reviewer_rejection_is_fed_back() {
    struct StrictReviewer {
        seen: AtomicUsize,
    }

    #[async_trait]
    impl Reviewer for StrictReviewer {
        async fn review(&self, _request: &GenerationRequest, payload: &Value) -> Result<Review, GenerationError> {
            self.seen.fetch_add(1, Ordering::SeqCst);
            if payload["title"] == json!("sloppy") {
                Ok(Review::reject("title is too vague"))
            } else {
                Ok(Review::approve())
            }
        }
    }

    let (store, cache) = memory_cache();
    let generator = ScriptedGenerator::new(vec![Ok(valid_post("sloppy")), Ok(valid_post("precise"))]);
    let reviewer = Arc::new(StrictReviewer { seen: AtomicUsize::new(0) });
    let workflow = RetryingWorkflow::builder(generator.clone(), post_validator())
        .with_cache(cache)
        .with_reviewer(reviewer.clone())
        .build()
        .unwrap();

    let outcome = workflow
        .run(GenerationRequest::new("rust"), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome.payload().unwrap()["title"], json!("precise"));
    assert_eq!(reviewer.seen.load(Ordering::SeqCst), 2);
    assert_eq!(
        generator.request(1).payload["feedback"],
        json!("review rejected the output: title is too vague")
    );
    assert_eq!(store.len("posts"), 1);
}

#[tokio::test]
async fn test_lookup_failure_is_a_miss() {
    let cache = Arc::new(RecordCache::new(BrokenStore { fail_scan: true }, "posts"));
    let generator = ScriptedGenerator::new(vec![Ok(valid_post("ok"))]);
    let workflow = RetryingWorkflow::builder(generator.clone(), post_validator())
        .with_cache(cache)
        .build()
        .unwrap();

    let outcome = workflow
        .run(GenerationRequest::new("rust"), CancellationToken::new())
        .await
        .unwrap();
    assert!(outcome.is_accepted());
    assert_eq!(generator.calls(), 1);
}

#[tokio::test]
async fn test_concurrent_runs_for_different_topics() {
    let (store, cache) = memory_cache();
    let generator = FnGenerator::new(|request: GenerationRequest| async move {
        Ok::<_, GenerationError>(RawResponse::Structured(json!({"title": request.topic, "body": "b"})))
    });
    let workflow = RetryingWorkflow::builder(generator, post_validator())
        .with_cache(cache)
        .build()
        .unwrap();

    let mut handles = Vec::new();
    for i in 0..8 {
        let workflow = workflow.clone();
        handles.push(tokio::spawn(async move {
            workflow
                .run(GenerationRequest::new(format!("topic-{i}")), CancellationToken::new())
                .await
                .unwrap()
        }));
    }
    for handle in handles {
        assert!(handle.await.unwrap().is_accepted());
    }
    assert_eq!(store.len("posts"), 8);
}
