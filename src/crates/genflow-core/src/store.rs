//! Append-only record storage - the persistence collaborator behind the cache
//!
//! A [`RecordStore`] keeps [`StoredRecord`]s grouped by namespace (a table
//! name such as `generate_blog_post_workflows`). Records are only ever
//! appended; the store never edits a record in place, which is what lets
//! independent workflow runs share one store without read-modify-write
//! races.
//!
//! # Backends
//!
//! | Backend | Crate | Durability |
//! |---------|-------|------------|
//! | [`InMemoryRecordStore`] | `genflow-core` | process lifetime |
//! | `SqliteRecordStore` | `genflow` | survives restarts |
//!
//! # Example
//!
//! ```rust
//! use genflow_core::store::{InMemoryRecordStore, RecordStore, StoredRecord};
//! use serde_json::json;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let store = InMemoryRecordStore::new();
//! store
//!     .append("blog_posts", StoredRecord::new("session-1", json!({"topic": "rust"})))
//!     .await
//!     .unwrap();
//!
//! let records = store.scan("blog_posts").await.unwrap();
//! assert_eq!(records.len(), 1);
//! # }
//! ```

use crate::error::StoreError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Result type for record store operations
pub type Result<T> = std::result::Result<T, StoreError>;

/// One appended record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRecord {
    /// Unique record id
    pub id: String,

    /// Free-form session identifier the record was written under
    pub session_id: String,

    /// Record body
    pub data: Value,

    /// Append time
    pub created_at: DateTime<Utc>,
}

impl StoredRecord {
    /// Create a record stamped with a fresh id and the current time.
    pub fn new(session_id: impl Into<String>, data: Value) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            session_id: session_id.into(),
            data,
            created_at: Utc::now(),
        }
    }
}

/// Append-only record store keyed by namespace.
///
/// Implementations must allow concurrent `append` and `scan` calls from
/// independent tasks.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Append a record to `namespace`.
    async fn append(&self, namespace: &str, record: StoredRecord) -> Result<()>;

    /// All records in `namespace`, in append order.
    async fn scan(&self, namespace: &str) -> Result<Vec<StoredRecord>>;

    /// Delete records by id. Used for explicit purges only.
    ///
    /// Returns the number of records removed.
    async fn remove(&self, namespace: &str, ids: &[String]) -> Result<usize>;
}

#[async_trait]
impl<S: RecordStore + ?Sized> RecordStore for Arc<S> {
    async fn append(&self, namespace: &str, record: StoredRecord) -> Result<()> {
        (**self).append(namespace, record).await
    }

    async fn scan(&self, namespace: &str) -> Result<Vec<StoredRecord>> {
        (**self).scan(namespace).await
    }

    async fn remove(&self, namespace: &str, ids: &[String]) -> Result<usize> {
        (**self).remove(namespace, ids).await
    }
}

/// In-memory implementation of [`RecordStore`]
///
/// Thread-safe and cheap to clone (clones share the same data). Suitable for
/// tests and short-lived processes; use the SQLite store when cached results
/// must survive a restart.
#[derive(Clone, Default)]
pub struct InMemoryRecordStore {
    data: Arc<RwLock<HashMap<String, Vec<StoredRecord>>>>,
}

impl InMemoryRecordStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records in a namespace
    pub fn len(&self, namespace: &str) -> usize {
        self.data.read().get(namespace).map(Vec::len).unwrap_or(0)
    }

    /// Whether a namespace has no records
    pub fn is_empty(&self, namespace: &str) -> bool {
        self.len(namespace) == 0
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn append(&self, namespace: &str, record: StoredRecord) -> Result<()> {
        self.data
            .write()
            .entry(namespace.to_string())
            .or_default()
            .push(record);
        Ok(())
    }

    async fn scan(&self, namespace: &str) -> Result<Vec<StoredRecord>> {
        Ok(self.data.read().get(namespace).cloned().unwrap_or_default())
    }

    async fn remove(&self, namespace: &str, ids: &[String]) -> Result<usize> {
        let mut data = self.data.write();
        let Some(records) = data.get_mut(namespace) else {
            return Ok(0);
        };
        let before = records.len();
        records.retain(|record| !ids.contains(&record.id));
        Ok(before - records.len())
    }
}
