//! Error types for the genflow application layer
//!
//! The workflow itself reports generator, validation and cache trouble as
//! part of its outcome; this type only covers what can go wrong around it:
//! loading configuration, opening the database, building a client.

use genflow_core::error::{CacheError, StoreError, WorkflowError};
use std::fmt;

/// Result type alias for genflow operations
pub type Result<T> = std::result::Result<T, GenflowError>;

/// Main error type for genflow operations
#[derive(Debug)]
pub enum GenflowError {
    /// Configuration error
    Config(String),

    /// Database error
    Database(String),

    /// LLM client could not be built
    Llm(String),

    /// Workflow could not be built or its stream broke
    Workflow(WorkflowError),

    /// Cache maintenance (list/purge) failed
    Cache(CacheError),

    /// A file named explicitly (config, schema) does not exist
    NotFound(String),

    /// IO error
    Io(std::io::Error),

    /// Serialization/deserialization error
    Serde(serde_json::Error),

    /// SQL error
    Sqlx(sqlx::Error),

    /// Generic error with message
    Other(String),
}

impl fmt::Display for GenflowError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "Configuration error: {}", msg),
            Self::Database(msg) => write!(f, "Database error: {}", msg),
            Self::Llm(msg) => write!(f, "LLM error: {}", msg),
            Self::Workflow(err) => write!(f, "Workflow error: {}", err),
            Self::Cache(err) => write!(f, "Cache error: {}", err),
            Self::NotFound(msg) => write!(f, "Not found: {}", msg),
            Self::Io(err) => write!(f, "IO error: {}", err),
            Self::Serde(err) => write!(f, "Serialization error: {}", err),
            Self::Sqlx(err) => write!(f, "SQL error: {}", err),
            Self::Other(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for GenflowError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Workflow(err) => Some(err),
            Self::Cache(err) => Some(err),
            Self::Io(err) => Some(err),
            Self::Serde(err) => Some(err),
            Self::Sqlx(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for GenflowError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<serde_json::Error> for GenflowError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serde(err)
    }
}

impl From<sqlx::Error> for GenflowError {
    fn from(err: sqlx::Error) -> Self {
        Self::Sqlx(err)
    }
}

impl From<WorkflowError> for GenflowError {
    fn from(err: WorkflowError) -> Self {
        Self::Workflow(err)
    }
}

impl From<CacheError> for GenflowError {
    fn from(err: CacheError) -> Self {
        Self::Cache(err)
    }
}

impl From<StoreError> for GenflowError {
    fn from(err: StoreError) -> Self {
        Self::Cache(err.into())
    }
}

impl From<llm::LlmError> for GenflowError {
    fn from(err: llm::LlmError) -> Self {
        Self::Llm(err.to_string())
    }
}

impl From<String> for GenflowError {
    fn from(msg: String) -> Self {
        Self::Other(msg)
    }
}

impl From<&str> for GenflowError {
    fn from(msg: &str) -> Self {
        Self::Other(msg.to_string())
    }
}
