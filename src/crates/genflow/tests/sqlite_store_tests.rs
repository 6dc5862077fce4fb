//! Tests for the SQLite record store behind the result cache

mod common;

use common::setup_test_store;
use genflow::db::{Database, SqliteRecordStore};
use genflow_core::prelude::*;
use genflow_core::store::StoredRecord;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

const NS: &str = "generation_workflows";

#[tokio::test]
async fn test_cached_results_survive_reopen() {
    let (_dir, path, store) = setup_test_store().await;

    let cache = RecordCache::new(store.clone(), NS);
    cache.store("rust ownership", &json!({"title": "Borrowing"})).await.unwrap();
    store.database().close().await;

    let reopened = SqliteRecordStore::new(Database::new(&path).await.unwrap());
    let cache = RecordCache::new(reopened, NS);
    let record = cache.lookup("rust ownership").await.unwrap().unwrap();

    assert_eq!(record.result, json!({"title": "Borrowing"}));
}

#[tokio::test]
async fn test_lookup_policies_over_sqlite() {
    let (_dir, _path, store) = setup_test_store().await;
    let cache = RecordCache::new(store.clone(), NS);

    cache.store("topic", &json!("first")).await.unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    cache.store("topic", &json!("second")).await.unwrap();

    let newest = cache.lookup("topic").await.unwrap().unwrap();
    assert_eq!(newest.result, json!("second"));

    let first = RecordCache::new(store, NS).with_policy(LookupPolicy::FirstMatch);
    assert_eq!(first.lookup("topic").await.unwrap().unwrap().result, json!("first"));
}

#[tokio::test]
async fn test_sessions_and_purge() {
    let (_dir, _path, store) = setup_test_store().await;
    let alice = RecordCache::new(store.clone(), NS).with_session("alice");
    let bob = RecordCache::new(store.clone(), NS).with_session("bob");

    alice.store("a", &json!(1)).await.unwrap();
    alice.store("b", &json!(2)).await.unwrap();
    bob.store("a", &json!(3)).await.unwrap();

    assert_eq!(bob.lookup("a").await.unwrap().unwrap().result, json!(3));
    assert!(bob.lookup("b").await.unwrap().is_none());

    assert_eq!(alice.purge(Some("a")).await.unwrap(), 1);
    assert_eq!(alice.entries().await.unwrap().len(), 1);
    assert_eq!(store.count(NS).await.unwrap(), 2);
}

#[tokio::test]
async fn test_foreign_records_are_skipped() {
    let (_dir, _path, store) = setup_test_store().await;
    store
        .append(NS, StoredRecord::new("", json!({"unrelated": true})))
        .await
        .unwrap();

    let cache = RecordCache::new(store, NS);
    cache.store("t", &json!("ok")).await.unwrap();

    assert_eq!(cache.entries().await.unwrap().len(), 1);
    assert_eq!(cache.lookup("t").await.unwrap().unwrap().result, json!("ok"));
}

#[tokio::test]
async fn test_concurrent_appends() {
    let (_dir, _path, store) = setup_test_store().await;
    let cache = Arc::new(RecordCache::new(store.clone(), NS));

    let handles: Vec<_> = (0..10)
        .map(|i| {
            let cache = cache.clone();
            tokio::spawn(async move { cache.store(&format!("topic-{}", i), &json!(i)).await })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert_eq!(store.count(NS).await.unwrap(), 10);
}

fn post_validator() -> Validator {
    Validator::new(
        Schema::object()
            .non_empty("title", FieldKind::String)
            .required("body", FieldKind::String),
    )
}

#[tokio::test]
async fn test_workflow_hits_cache_after_restart() {
    let (_dir, path, store) = setup_test_store().await;
    let calls = Arc::new(AtomicUsize::new(0));

    let counter = calls.clone();
    let generator = FnGenerator::new(move |_req: GenerationRequest| {
        let counter = counter.clone();
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok::<_, GenerationError>(RawResponse::Text(
                "```json\n{\"title\": \"Lifetimes\", \"body\": \"...\"}\n```".to_string(),
            ))
        }
    });

    let workflow = RetryingWorkflow::builder(generator, post_validator())
        .with_cache(Arc::new(RecordCache::new(store.clone(), NS)))
        .build()
        .unwrap();

    let first = workflow
        .run(GenerationRequest::new("lifetimes"), CancellationToken::new())
        .await
        .unwrap();
    assert!(matches!(first, WorkflowOutcome::Accepted { cached: false, attempts: 1, .. }));
    store.database().close().await;

    // Same topic through a freshly opened database: no generator call
    let reopened = SqliteRecordStore::new(Database::new(&path).await.unwrap());
    let never = FnGenerator::new(|_req: GenerationRequest| async {
        Err::<RawResponse, _>(GenerationError::Provider("should not be called".into()))
    });
    let workflow = RetryingWorkflow::builder(never, post_validator())
        .with_cache(Arc::new(RecordCache::new(reopened, NS)))
        .build()
        .unwrap();

    let second = workflow
        .run(GenerationRequest::new("lifetimes"), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(matches!(second, WorkflowOutcome::Accepted { cached: true, attempts: 0, .. }));
    assert_eq!(second.payload().unwrap()["title"], json!("Lifetimes"));
}

#[tokio::test]
async fn test_exhausted_run_caches_nothing() {
    let (_dir, _path, store) = setup_test_store().await;
    let generator = FnGenerator::new(|_req: GenerationRequest| async {
        Ok::<_, GenerationError>(RawResponse::Text("{\"title\": \"\"}".to_string()))
    });

    let workflow = RetryingWorkflow::builder(generator, post_validator())
        .with_cache(Arc::new(RecordCache::new(store.clone(), NS)))
        .max_attempts(2)
        .build()
        .unwrap();

    let outcome = workflow
        .run(GenerationRequest::new("empty"), CancellationToken::new())
        .await
        .unwrap();

    assert!(matches!(outcome, WorkflowOutcome::Exhausted { attempts: 2, .. }));
    assert_eq!(store.count(NS).await.unwrap(), 0);
}
