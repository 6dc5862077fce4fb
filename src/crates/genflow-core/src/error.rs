//! Error types for generation, validation, caching and workflow execution
//!
//! Every collaborator boundary in the crate has its own error enum. The
//! workflow folds [`GenerationError`] and [`ValidationError`] into its
//! retry/exhaustion decision and degrades gracefully on [`CacheError`]; only
//! [`WorkflowError`] ever escapes a run.
//!
//! # Error Hierarchy
//!
//! ```text
//! GenerationError      - Generator call failed (counted as one attempt)
//! ├── Transport        - Network / connection failure (transient)
//! ├── RateLimited      - Upstream throttling (transient)
//! ├── Timeout          - Upstream or per-attempt deadline expired (transient)
//! ├── Provider         - Upstream rejected the call (permanent)
//! ├── InvalidRequest   - Request could not be encoded (permanent)
//! └── Cancelled        - Cancellation token fired
//!
//! ValidationError      - Response rejected (forwarded as feedback)
//! StoreError           - Record store failure
//! CacheError           - Result cache failure (lookup → miss, store → warning)
//! WorkflowError        - Unexpected faults (bad configuration, closed channel)
//! ```
//!
//! # Matching Specific Errors
//!
//! ```rust
//! use genflow_core::error::GenerationError;
//!
//! fn describe(err: &GenerationError) -> &'static str {
//!     if err.is_transient() {
//!         "worth retrying at the transport layer"
//!     } else {
//!         "counted as a failed attempt"
//!     }
//! }
//!
//! assert_eq!(
//!     describe(&GenerationError::RateLimited("429".into())),
//!     "worth retrying at the transport layer"
//! );
//! ```

use std::time::Duration;
use thiserror::Error;

/// Result type for workflow operations.
pub type Result<T> = std::result::Result<T, WorkflowError>;

/// Errors raised by a [`Generator`](crate::generator::Generator).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GenerationError {
    /// Network or connection failure.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Upstream rate limit hit.
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// Deadline expired before a response arrived.
    #[error("Generation timed out after {0:?}")]
    Timeout(Duration),

    /// Upstream returned an error response.
    #[error("Provider error: {0}")]
    Provider(String),

    /// The request could not be turned into a provider call.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The run was cancelled while the call was in flight.
    #[error("Generation cancelled")]
    Cancelled,
}

impl GenerationError {
    /// Whether the transport layer should retry this fault.
    ///
    /// Semantic failures never reach this check; they are handled by the
    /// workflow's attempt budget instead.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            GenerationError::Transport(_)
                | GenerationError::RateLimited(_)
                | GenerationError::Timeout(_)
        )
    }
}

/// Reasons a response is rejected by the [`Validator`](crate::validate::Validator)
/// or a [`Reviewer`](crate::review::Reviewer).
///
/// The `Display` form is what gets threaded into the next attempt's
/// enriched request as feedback, so messages are written for the model.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// Nothing came back.
    #[error("response is empty")]
    Empty,

    /// The generator failed and no response exists for this attempt.
    #[error("generator fault: {0}")]
    Fault(String),

    /// Text that is not a serialized JSON document.
    #[error("response is not valid JSON: {0}")]
    Unparseable(String),

    /// Parsed, but the top-level value is not an object.
    #[error("expected a JSON object but got {found}")]
    WrongShape {
        /// JSON type name that was found
        found: String,
    },

    /// A required field is absent.
    #[error("missing required field '{0}'")]
    MissingField(String),

    /// A field has the wrong primitive type.
    #[error("field '{field}' must be {expected} but got {found}")]
    WrongType {
        /// Field name
        field: String,
        /// Expected kind
        expected: String,
        /// JSON type name that was found
        found: String,
    },

    /// A field declared `non_empty` is empty.
    #[error("field '{0}' must not be empty")]
    EmptyField(String),

    /// The caller-supplied semantic predicate rejected the payload.
    #[error("semantic check failed: {0}")]
    Predicate(String),

    /// Full JSON Schema validation failed.
    #[error("schema violation: {0}")]
    Schema(String),

    /// A reviewer judged the payload unacceptable.
    #[error("review rejected the output: {0}")]
    Rejected(String),
}

/// Errors from a [`RecordStore`](crate::store::RecordStore) backend.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    /// Backend could not be reached or refused the operation.
    #[error("Record store unavailable: {0}")]
    Unavailable(String),

    /// Record data could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

/// Errors from a [`ResultCache`](crate::cache::ResultCache).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CacheError {
    /// The underlying store failed.
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    /// A result could not be serialized for storage.
    #[error("Cache serialization error: {0}")]
    Serialization(String),
}

impl From<StoreError> for CacheError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Unavailable(msg) => CacheError::StorageUnavailable(msg),
            StoreError::Serialization(msg) => CacheError::Serialization(msg),
        }
    }
}

/// Faults that escape a workflow run.
///
/// Generator, validation and cache problems never show up here; they are
/// part of the normal outcome of a run.
#[derive(Error, Debug)]
pub enum WorkflowError {
    /// Workflow was built with an invalid configuration.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The notification stream ended without a terminal outcome.
    #[error("Notification channel error: {0}")]
    Channel(String),

    /// Schema document could not be parsed.
    #[error("Schema parse error: {0}")]
    SchemaParse(String),
}

impl WorkflowError {
    /// Create a configuration error.
    pub fn configuration(msg: impl Into<String>) -> Self {
        WorkflowError::Configuration(msg.into())
    }
}
