//! Workflow notifications
//!
//! Every run of a [`RetryingWorkflow`](crate::workflow::RetryingWorkflow)
//! emits a sequence of [`WorkflowEvent`]s: zero or more progress events and
//! then exactly one [`WorkflowEvent::Finished`] carrying the
//! [`WorkflowOutcome`]. Nothing is ever emitted after the terminal event.
//!
//! ```text
//! Started
//! ├── CacheHit ─────────────────────────────┐
//! └── CacheMiss                             │
//!     └── AttemptStarted (1..=max_attempts) │
//!         ├── AttemptRejected  (retry)      │
//!         └── CacheWriteFailed (optional)   │
//! Finished(Accepted | Exhausted | Cancelled) ◄┘
//! ```
//!
//! Events serialize as `{"event": "...", "data": {...}}`, which is what the
//! CLI prints in `--format json` mode.

use futures::Stream;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::pin::Pin;

/// Stream of notifications for one run.
pub type EventStream = Pin<Box<dyn Stream<Item = WorkflowEvent> + Send>>;

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum WorkflowOutcome {
    /// A payload passed validation (or came from the cache).
    Accepted {
        topic: String,
        payload: Value,
        /// Generator calls made by this run; 0 on a cache hit
        attempts: usize,
        cached: bool,
    },

    /// Every attempt was rejected.
    Exhausted {
        topic: String,
        attempts: usize,
        /// Human-readable terminal message
        message: String,
        /// Rejection reason of the final attempt
        last_error: Option<String>,
    },

    /// The cancellation token fired before an acceptable payload arrived.
    Cancelled { topic: String, attempts: usize },
}

impl WorkflowOutcome {
    pub fn topic(&self) -> &str {
        match self {
            WorkflowOutcome::Accepted { topic, .. }
            | WorkflowOutcome::Exhausted { topic, .. }
            | WorkflowOutcome::Cancelled { topic, .. } => topic,
        }
    }

    pub fn attempts(&self) -> usize {
        match self {
            WorkflowOutcome::Accepted { attempts, .. }
            | WorkflowOutcome::Exhausted { attempts, .. }
            | WorkflowOutcome::Cancelled { attempts, .. } => *attempts,
        }
    }

    pub fn is_accepted(&self) -> bool {
        matches!(self, WorkflowOutcome::Accepted { .. })
    }

    /// Accepted payload, if any.
    pub fn payload(&self) -> Option<&Value> {
        match self {
            WorkflowOutcome::Accepted { payload, .. } => Some(payload),
            _ => None,
        }
    }

    /// Build the exhaustion outcome with its standard message.
    pub fn exhausted(topic: impl Into<String>, attempts: usize, last_error: Option<String>) -> Self {
        let topic = topic.into();
        let message = format!(
            "Sorry, could not produce a valid result for '{}' after {} attempt{}.",
            topic,
            attempts,
            if attempts == 1 { "" } else { "s" }
        );
        WorkflowOutcome::Exhausted {
            topic,
            attempts,
            message,
            last_error,
        }
    }
}

/// A single notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum WorkflowEvent {
    /// Run accepted the request.
    Started { run_id: String, topic: String },

    /// A cached result was found; no generator call follows.
    CacheHit { topic: String },

    /// No usable cached result (or the cache is disabled).
    CacheMiss { topic: String },

    AttemptStarted { attempt: usize, max_attempts: usize },

    /// An attempt failed and its reason becomes the next attempt's feedback.
    AttemptRejected { attempt: usize, reason: String },

    /// The accepted result could not be cached. The run still succeeds.
    CacheWriteFailed { topic: String, error: String },

    /// Terminal event.
    Finished(WorkflowOutcome),
}

impl WorkflowEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, WorkflowEvent::Finished(_))
    }

    /// Outcome carried by a terminal event.
    pub fn outcome(&self) -> Option<&WorkflowOutcome> {
        match self {
            WorkflowEvent::Finished(outcome) => Some(outcome),
            _ => None,
        }
    }
}
