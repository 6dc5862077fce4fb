//! # genflow-core - Validated Generation with Bounded Retries
//!
//! Model output is unreliable: it arrives wrapped in Markdown fences, misses
//! fields, or fails outright. `genflow-core` wraps a model call in a small
//! state machine that validates every response, retries a bounded number of
//! times with the rejection reason fed back to the model, and caches accepted
//! results by topic so repeated requests cost nothing.
//!
//! ## Components
//!
//! | Module | Role |
//! |--------|------|
//! | [`generator`] | [`Generator`] trait, [`GenerationRequest`], [`RawResponse`] |
//! | [`validate`] | [`Schema`] and [`Validator`]: fence stripping, shape checks, predicates |
//! | [`review`] | optional [`Reviewer`] second opinion |
//! | [`store`] | append-only [`RecordStore`] and the in-memory backend |
//! | [`cache`] | [`ResultCache`] keyed by topic, [`RecordCache`] over a store |
//! | [`retry`] | transport backoff: [`RetryPolicy`], [`RetryingGenerator`] |
//! | [`workflow`] | [`RetryingWorkflow`], the semantic retry loop |
//! | [`stream`] | [`WorkflowEvent`] notifications and [`WorkflowOutcome`] |
//! | [`session`] | session id helpers |
//!
//! ## Quick Start
//!
//! ```rust
//! use genflow_core::prelude::*;
//! use futures::StreamExt;
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let generator = FnGenerator::new(|request: GenerationRequest| async move {
//!     let text = format!("```json\n{{\"title\": \"{}\", \"body\": \"...\"}}\n```", request.topic);
//!     Ok::<_, GenerationError>(RawResponse::Text(text))
//! });
//!
//! let schema = Schema::object()
//!     .non_empty("title", FieldKind::String)
//!     .required("body", FieldKind::String);
//!
//! let workflow = RetryingWorkflow::builder(generator, Validator::new(schema))
//!     .with_cache(Arc::new(RecordCache::new(InMemoryRecordStore::new(), "posts")))
//!     .max_attempts(3)
//!     .build()?;
//!
//! let mut events = workflow.stream(GenerationRequest::new("ownership"), CancellationToken::new());
//! while let Some(event) = events.next().await {
//!     if let WorkflowEvent::Finished(outcome) = event {
//!         assert_eq!(outcome.payload().unwrap()["title"], json!("ownership"));
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod error;
pub mod generator;
pub mod retry;
pub mod review;
pub mod session;
pub mod store;
pub mod stream;
pub mod validate;
pub mod workflow;

pub use cache::{CacheRecord, LookupPolicy, RecordCache, ResultCache};
pub use error::{CacheError, GenerationError, Result, StoreError, ValidationError, WorkflowError};
pub use generator::{FnGenerator, GenerationRequest, Generator, RawResponse};
pub use retry::{RetryPolicy, RetryState, RetryingGenerator};
pub use review::{FnReviewer, Review, Reviewer};
pub use session::{hashed_session_id, slug_session_id};
pub use store::{InMemoryRecordStore, RecordStore, StoredRecord};
pub use stream::{EventStream, WorkflowEvent, WorkflowOutcome};
pub use validate::{FieldKind, FieldSpec, Schema, Validator};
pub use workflow::{RetryingWorkflow, WorkflowBuilder, WorkflowConfig, WorkflowState};

pub use tokio_util::sync::CancellationToken;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cache::{LookupPolicy, RecordCache, ResultCache};
    pub use crate::error::{GenerationError, ValidationError, WorkflowError};
    pub use crate::generator::{FnGenerator, GenerationRequest, Generator, RawResponse};
    pub use crate::retry::{RetryPolicy, RetryingGenerator};
    pub use crate::review::{Review, Reviewer};
    pub use crate::store::{InMemoryRecordStore, RecordStore};
    pub use crate::stream::{WorkflowEvent, WorkflowOutcome};
    pub use crate::validate::{FieldKind, Schema, Validator};
    pub use crate::workflow::{RetryingWorkflow, WorkflowConfig};
    pub use tokio_util::sync::CancellationToken;
}
