//! Bounded-retry validated generation
//!
//! [`RetryingWorkflow`] ties the collaborators together:
//!
//! ```text
//!                 ┌──────────────┐  hit
//! request ──────► │ CheckingCache├──────────────────────────────┐
//!                 └──────┬───────┘                              │
//!                        │ miss                                 │
//!                 ┌──────▼───────┐      ┌────────────┐          │
//!             ┌──►│  Generating  ├─────►│ Validating │          │
//!             │   └──────────────┘      └─────┬──────┘          │
//!             │                               │                 │
//!     Retrying│◄── rejected, budget left ─────┤                 │
//!  (feedback) │                               │ valid           ▼
//!             │     rejected, budget spent    └──────────► Accepted ─► cache
//!             └──────────► Exhausted
//! ```
//!
//! Each run executes on its own tokio task and reports through an
//! [`EventStream`]. The stream always ends with exactly one
//! [`WorkflowEvent::Finished`]. Exhaustion is a normal outcome, not an
//! error; [`WorkflowError`] is reserved for configuration mistakes and a
//! stream that ends without a terminal event.
//!
//! # Retry Payload
//!
//! Attempt 1 sends the caller's payload unchanged. Every later attempt sends
//! an enriched payload so the generator can correct itself:
//!
//! ```json
//! {
//!   "original_request": "<caller payload>",
//!   "previous_output": "<raw output of the failed attempt, null on a fault>",
//!   "feedback": "<why it was rejected>",
//!   "attempt": 2,
//!   "instructions": "<retry_instructions>"
//! }
//! ```
//!
//! # Example
//!
//! ```rust
//! use genflow_core::prelude::*;
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! # #[tokio::main]
//! # async fn main() -> genflow_core::error::Result<()> {
//! let generator = FnGenerator::new(|request: GenerationRequest| async move {
//!     Ok::<_, GenerationError>(RawResponse::Structured(json!({"title": request.topic})))
//! });
//! let validator = Validator::new(Schema::object().required("title", FieldKind::String));
//! let cache = Arc::new(RecordCache::new(InMemoryRecordStore::new(), "posts"));
//!
//! let workflow = RetryingWorkflow::builder(generator, validator)
//!     .with_cache(cache)
//!     .build()?;
//!
//! let outcome = workflow
//!     .run(GenerationRequest::new("rust"), CancellationToken::new())
//!     .await?;
//! assert!(outcome.is_accepted());
//! # Ok(())
//! # }
//! ```

use crate::cache::ResultCache;
use crate::error::{GenerationError, Result, ValidationError, WorkflowError};
use crate::generator::{GenerationRequest, Generator, RawResponse};
use crate::review::Reviewer;
use crate::stream::{EventStream, WorkflowEvent, WorkflowOutcome};
use crate::validate::Validator;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn, Instrument};

/// Default instruction sent with every retry.
pub const DEFAULT_RETRY_INSTRUCTIONS: &str = "The previous output was rejected. \
     Fix every problem listed in the feedback and return the complete corrected \
     result in the required format, without any commentary.";

/// Run-time knobs for a [`RetryingWorkflow`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    /// Consult the cache before generating
    pub use_cache: bool,

    /// Generator calls allowed per run, at least 1
    pub max_attempts: usize,

    /// Deadline for a single generator call
    #[serde(with = "optional_secs")]
    pub attempt_timeout: Option<Duration>,

    /// Text placed in the `instructions` field of retry payloads
    pub retry_instructions: String,

    /// Capacity of the notification channel
    pub event_buffer: usize,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            use_cache: true,
            max_attempts: 3,
            attempt_timeout: None,
            retry_instructions: DEFAULT_RETRY_INSTRUCTIONS.to_string(),
            event_buffer: 32,
        }
    }
}

impl WorkflowConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(WorkflowError::configuration("max_attempts must be at least 1"));
        }
        if self.event_buffer == 0 {
            return Err(WorkflowError::configuration("event_buffer must be at least 1"));
        }
        if self.attempt_timeout == Some(Duration::ZERO) {
            return Err(WorkflowError::configuration("attempt_timeout must be greater than zero"));
        }
        Ok(())
    }
}

/// Where a run currently is. Used for logging transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowState {
    CheckingCache,
    Generating,
    Validating,
    Reviewing,
    Retrying,
    Accepted,
    Exhausted,
    Cancelled,
}

impl fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WorkflowState::CheckingCache => "checking_cache",
            WorkflowState::Generating => "generating",
            WorkflowState::Validating => "validating",
            WorkflowState::Reviewing => "reviewing",
            WorkflowState::Retrying => "retrying",
            WorkflowState::Accepted => "accepted",
            WorkflowState::Exhausted => "exhausted",
            WorkflowState::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// One generation attempt. Never outlives the run that created it.
#[derive(Debug, Clone)]
struct Attempt {
    number: usize,
    raw: RawResponse,
    outcome: std::result::Result<Value, ValidationError>,
}

/// The notification receiver went away; the run stops early.
struct Disconnected;

type Step<T> = std::result::Result<T, Disconnected>;

/// Builder for [`RetryingWorkflow`].
pub struct WorkflowBuilder {
    generator: Arc<dyn Generator>,
    validator: Validator,
    cache: Option<Arc<dyn ResultCache>>,
    reviewer: Option<Arc<dyn Reviewer>>,
    config: WorkflowConfig,
}

impl WorkflowBuilder {
    /// Attach the result cache. Without one, nothing is looked up or stored.
    pub fn with_cache(mut self, cache: Arc<dyn ResultCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_reviewer(mut self, reviewer: Arc<dyn Reviewer>) -> Self {
        self.reviewer = Some(reviewer);
        self
    }

    /// Replace the whole configuration.
    pub fn with_config(mut self, config: WorkflowConfig) -> Self {
        self.config = config;
        self
    }

    pub fn use_cache(mut self, use_cache: bool) -> Self {
        self.config.use_cache = use_cache;
        self
    }

    pub fn max_attempts(mut self, max_attempts: usize) -> Self {
        self.config.max_attempts = max_attempts;
        self
    }

    pub fn attempt_timeout(mut self, timeout: Duration) -> Self {
        self.config.attempt_timeout = Some(timeout);
        self
    }

    pub fn retry_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.config.retry_instructions = instructions.into();
        self
    }

    /// Validate the configuration and build the workflow.
    pub fn build(self) -> Result<RetryingWorkflow> {
        self.config.validate()?;
        Ok(RetryingWorkflow {
            generator: self.generator,
            validator: Arc::new(self.validator),
            cache: self.cache,
            reviewer: self.reviewer,
            config: self.config,
        })
    }
}

/// Generate, validate, retry with feedback, cache on success.
///
/// Cheap to clone; clones share collaborators. Runs for different topics may
/// execute concurrently.
#[derive(Clone)]
pub struct RetryingWorkflow {
    generator: Arc<dyn Generator>,
    validator: Arc<Validator>,
    cache: Option<Arc<dyn ResultCache>>,
    reviewer: Option<Arc<dyn Reviewer>>,
    config: WorkflowConfig,
}

impl fmt::Debug for RetryingWorkflow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryingWorkflow")
            .field("generator", &self.generator.name())
            .field("validator", &self.validator)
            .field("cache", &self.cache.is_some())
            .field("reviewer", &self.reviewer.is_some())
            .field("config", &self.config)
            .finish()
    }
}

impl RetryingWorkflow {
    pub fn builder<G>(generator: G, validator: Validator) -> WorkflowBuilder
    where
        G: Generator + 'static,
    {
        WorkflowBuilder {
            generator: Arc::new(generator),
            validator,
            cache: None,
            reviewer: None,
            config: WorkflowConfig::default(),
        }
    }

    pub fn config(&self) -> &WorkflowConfig {
        &self.config
    }

    /// Start a run and return its notifications.
    ///
    /// The run proceeds on a spawned task. Dropping the stream stops the run
    /// at its next notification.
    pub fn stream(&self, request: GenerationRequest, cancel: CancellationToken) -> EventStream {
        let (tx, rx) = mpsc::channel(self.config.event_buffer);
        let workflow = self.clone();
        let run_id = uuid::Uuid::new_v4().to_string();
        let span = tracing::info_span!("workflow_run", run_id = %run_id, topic = %request.topic);

        tokio::spawn(
            async move {
                if let Ok(outcome) = workflow.drive(&run_id, request, &cancel, &tx).await {
                    info!(
                        attempts = outcome.attempts(),
                        accepted = outcome.is_accepted(),
                        "Workflow finished"
                    );
                    if tx.send(WorkflowEvent::Finished(outcome)).await.is_err() {
                        debug!("Receiver dropped before the terminal event");
                    }
                } else {
                    debug!("Receiver dropped, run abandoned");
                }
            }
            .instrument(span),
        );

        Box::pin(ReceiverStream::new(rx))
    }

    /// Run to completion and return the terminal outcome.
    pub async fn run(
        &self,
        request: GenerationRequest,
        cancel: CancellationToken,
    ) -> Result<WorkflowOutcome> {
        let mut events = self.stream(request, cancel);
        while let Some(event) = events.next().await {
            if let WorkflowEvent::Finished(outcome) = event {
                return Ok(outcome);
            }
        }
        Err(WorkflowError::Channel(
            "notification stream ended without a terminal event".to_string(),
        ))
    }

    async fn drive(
        &self,
        run_id: &str,
        request: GenerationRequest,
        cancel: &CancellationToken,
        tx: &mpsc::Sender<WorkflowEvent>,
    ) -> Step<WorkflowOutcome> {
        let topic = request.topic.clone();
        emit(
            tx,
            WorkflowEvent::Started {
                run_id: run_id.to_string(),
                topic: topic.clone(),
            },
        )
        .await?;

        if let Some(payload) = self.check_cache(&topic).await {
            emit(tx, WorkflowEvent::CacheHit { topic: topic.clone() }).await?;
            return Ok(WorkflowOutcome::Accepted {
                topic,
                payload,
                attempts: 0,
                cached: true,
            });
        }
        emit(tx, WorkflowEvent::CacheMiss { topic: topic.clone() }).await?;

        let max_attempts = self.config.max_attempts;
        let mut previous: Option<Attempt> = None;

        for number in 1..=max_attempts {
            if cancel.is_cancelled() {
                return Ok(cancelled(&topic, number - 1));
            }

            emit(
                tx,
                WorkflowEvent::AttemptStarted {
                    attempt: number,
                    max_attempts,
                },
            )
            .await?;

            let attempt_request = match &previous {
                Some(attempt) => self.enriched_request(&request, attempt),
                None => request.clone(),
            };

            let Some(attempt) = self.attempt(number, &attempt_request, cancel).await else {
                return Ok(cancelled(&topic, number));
            };

            match &attempt.outcome {
                Ok(payload) => {
                    debug!(attempt = number, state = %WorkflowState::Accepted, "Attempt accepted");
                    self.write_through(&topic, payload, tx).await?;
                    return Ok(WorkflowOutcome::Accepted {
                        topic,
                        payload: payload.clone(),
                        attempts: number,
                        cached: false,
                    });
                }
                Err(reason) => {
                    let next = if number < max_attempts {
                        WorkflowState::Retrying
                    } else {
                        WorkflowState::Exhausted
                    };
                    warn!(attempt = number, state = %next, reason = %reason, "Attempt rejected");
                    emit(
                        tx,
                        WorkflowEvent::AttemptRejected {
                            attempt: number,
                            reason: reason.to_string(),
                        },
                    )
                    .await?;
                }
            }

            previous = Some(attempt);
        }

        let last_error = previous
            .and_then(|attempt| attempt.outcome.err())
            .map(|reason| reason.to_string());
        Ok(WorkflowOutcome::exhausted(topic, max_attempts, last_error))
    }

    /// Returns the cached payload on a hit. Lookup failures count as a miss.
    async fn check_cache(&self, topic: &str) -> Option<Value> {
        if !self.config.use_cache {
            debug!("Cache lookup disabled for this run");
            return None;
        }
        let cache = self.cache.as_ref()?;

        debug!(state = %WorkflowState::CheckingCache, "Checking cache");
        match cache.lookup(topic).await {
            Ok(Some(record)) => {
                info!(cached_at = %record.timestamp, "Found cached result");
                Some(record.result)
            }
            Ok(None) => None,
            Err(e) => {
                warn!(error = %e, "Cache lookup failed, treating as a miss");
                None
            }
        }
    }

    /// Generate, validate and review once. `None` means the run was cancelled.
    async fn attempt(
        &self,
        number: usize,
        request: &GenerationRequest,
        cancel: &CancellationToken,
    ) -> Option<Attempt> {
        debug!(attempt = number, state = %WorkflowState::Generating, "Calling generator");

        let raw = tokio::select! {
            biased;
            _ = cancel.cancelled() => return None,
            result = self.generate(request) => match result {
                Ok(raw) => raw,
                Err(GenerationError::Cancelled) => return None,
                Err(e) => RawResponse::from(e),
            },
        };

        debug!(attempt = number, state = %WorkflowState::Validating, "Validating response");
        let mut outcome = self.validator.validate(&raw);

        if let (Ok(payload), Some(reviewer)) = (&outcome, &self.reviewer) {
            debug!(attempt = number, state = %WorkflowState::Reviewing, "Reviewing payload");
            let verdict = tokio::select! {
                biased;
                _ = cancel.cancelled() => return None,
                verdict = reviewer.review(request, payload) => verdict,
            };
            match verdict {
                Ok(review) if review.approved => {}
                Ok(review) => outcome = Err(ValidationError::Rejected(review.feedback)),
                Err(GenerationError::Cancelled) => return None,
                Err(e) => outcome = Err(ValidationError::Fault(e.to_string())),
            }
        }

        Some(Attempt { number, raw, outcome })
    }

    async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> std::result::Result<RawResponse, GenerationError> {
        match self.config.attempt_timeout {
            Some(limit) => tokio::time::timeout(limit, self.generator.generate(request))
                .await
                .unwrap_or(Err(GenerationError::Timeout(limit))),
            None => self.generator.generate(request).await,
        }
    }

    fn enriched_request(&self, original: &GenerationRequest, previous: &Attempt) -> GenerationRequest {
        let feedback = match &previous.outcome {
            Err(reason) => reason.to_string(),
            Ok(_) => String::new(),
        };

        GenerationRequest::with_payload(
            original.topic.clone(),
            json!({
                "original_request": original.payload,
                "previous_output": previous.raw.as_feedback_value(),
                "feedback": feedback,
                "attempt": previous.number + 1,
                "instructions": self.config.retry_instructions,
            }),
        )
    }

    async fn write_through(
        &self,
        topic: &str,
        payload: &Value,
        tx: &mpsc::Sender<WorkflowEvent>,
    ) -> Step<()> {
        let Some(cache) = &self.cache else {
            return Ok(());
        };

        if let Err(e) = cache.store(topic, payload).await {
            warn!(error = %e, "Failed to cache accepted result");
            emit(
                tx,
                WorkflowEvent::CacheWriteFailed {
                    topic: topic.to_string(),
                    error: e.to_string(),
                },
            )
            .await?;
        }
        Ok(())
    }
}

async fn emit(tx: &mpsc::Sender<WorkflowEvent>, event: WorkflowEvent) -> Step<()> {
    tx.send(event).await.map_err(|_| Disconnected)
}

fn cancelled(topic: &str, attempts: usize) -> WorkflowOutcome {
    info!(attempts, state = %WorkflowState::Cancelled, "Run cancelled");
    WorkflowOutcome::Cancelled {
        topic: topic.to_string(),
        attempts,
    }
}

mod optional_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => serializer.serialize_some(&d.as_secs_f64()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Duration>, D::Error> {
        match Option::<f64>::deserialize(deserializer)? {
            Some(secs) if secs.is_finite() && secs >= 0.0 => Duration::try_from_secs_f64(secs)
                .map(Some)
                .map_err(|e| serde::de::Error::custom(format!("timeout of {} seconds: {}", secs, e))),
            Some(_) => Err(serde::de::Error::custom("timeout must be a non-negative number of seconds")),
            None => Ok(None),
        }
    }
}
