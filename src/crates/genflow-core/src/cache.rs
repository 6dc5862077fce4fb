//! Topic-keyed result cache over an append-only record store
//!
//! The [`ResultCache`] maps a topic to the last accepted result so a repeated
//! run can skip the generator entirely. [`RecordCache`] implements it on top
//! of any [`RecordStore`]: every accepted result is appended as a new record,
//! nothing is overwritten, and a lookup scans the namespace for records whose
//! topic matches exactly.
//!
//! # Lookup Policy
//!
//! With several records for one topic, which one wins is a policy choice:
//!
//! | Policy | Returns |
//! |--------|---------|
//! | [`LookupPolicy::MostRecent`] (default) | newest record by append time |
//! | [`LookupPolicy::FirstMatch`] | first record in storage order |
//!
//! # Failure Semantics
//!
//! Store failures surface as [`CacheError::StorageUnavailable`]. The workflow
//! treats a failed lookup as a miss and a failed store as a warning; callers
//! using the cache directly decide for themselves.
//!
//! # Example
//!
//! ```rust
//! use genflow_core::cache::{RecordCache, ResultCache};
//! use genflow_core::store::InMemoryRecordStore;
//! use serde_json::json;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let cache = RecordCache::new(InMemoryRecordStore::new(), "blog_posts");
//! cache.store("rust", &json!("first draft")).await.unwrap();
//! cache.store("rust", &json!("second draft")).await.unwrap();
//!
//! let hit = cache.lookup("rust").await.unwrap().unwrap();
//! assert_eq!(hit.result, json!("second draft"));
//! # }
//! ```

use crate::error::CacheError;
use crate::store::{RecordStore, StoredRecord};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

/// Result type for cache operations
pub type Result<T> = std::result::Result<T, CacheError>;

/// An accepted result persisted for a topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheRecord {
    /// Topic the result was generated for
    pub topic: String,

    /// The validated payload
    pub result: Value,

    /// When the result was cached
    pub timestamp: DateTime<Utc>,
}

impl CacheRecord {
    /// Create a record stamped with the current time.
    pub fn new(topic: impl Into<String>, result: Value) -> Self {
        Self {
            topic: topic.into(),
            result,
            timestamp: Utc::now(),
        }
    }
}

/// Which record wins when a topic has several.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LookupPolicy {
    /// Newest record by timestamp; ties go to the later append
    #[default]
    MostRecent,

    /// First record in storage order
    FirstMatch,
}

/// Topic → accepted result mapping.
#[async_trait]
pub trait ResultCache: Send + Sync {
    /// Find a cached result for `topic` (exact string match).
    async fn lookup(&self, topic: &str) -> Result<Option<CacheRecord>>;

    /// Append a new record for `topic`. Existing records are left alone.
    async fn store(&self, topic: &str, result: &Value) -> Result<CacheRecord>;
}

#[async_trait]
impl<C: ResultCache + ?Sized> ResultCache for Arc<C> {
    async fn lookup(&self, topic: &str) -> Result<Option<CacheRecord>> {
        (**self).lookup(topic).await
    }

    async fn store(&self, topic: &str, result: &Value) -> Result<CacheRecord> {
        (**self).store(topic, result).await
    }
}

/// [`ResultCache`] backed by a [`RecordStore`] namespace.
#[derive(Clone)]
pub struct RecordCache<S> {
    store: S,
    namespace: String,
    session_id: Option<String>,
    policy: LookupPolicy,
}

impl<S: RecordStore> RecordCache<S> {
    /// Cache over `namespace` of `store`, visible to every session.
    pub fn new(store: S, namespace: impl Into<String>) -> Self {
        Self {
            store,
            namespace: namespace.into(),
            session_id: None,
            policy: LookupPolicy::default(),
        }
    }

    /// Restrict reads and tag writes with a session id.
    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Choose the lookup policy.
    pub fn with_policy(mut self, policy: LookupPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Namespace this cache reads and writes.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Session scope, if any.
    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    /// Active lookup policy.
    pub fn policy(&self) -> LookupPolicy {
        self.policy
    }

    /// All cache records visible to this cache, in storage order.
    ///
    /// Records that do not decode as a [`CacheRecord`] are skipped.
    pub async fn entries(&self) -> Result<Vec<CacheRecord>> {
        Ok(self
            .visible_records()
            .await?
            .into_iter()
            .map(|(_, record)| record)
            .collect())
    }

    /// Delete cached records, either for one topic or all visible ones.
    ///
    /// This is an explicit purge; the workflow itself never deletes.
    pub async fn purge(&self, topic: Option<&str>) -> Result<usize> {
        let ids: Vec<String> = self
            .visible_records()
            .await?
            .into_iter()
            .filter(|(_, record)| topic.map_or(true, |t| record.topic == t))
            .map(|(id, _)| id)
            .collect();

        if ids.is_empty() {
            return Ok(0);
        }

        let removed = self.store.remove(&self.namespace, &ids).await?;
        debug!(namespace = %self.namespace, removed, "Purged cache records");
        Ok(removed)
    }

    async fn visible_records(&self) -> Result<Vec<(String, CacheRecord)>> {
        let records = self.store.scan(&self.namespace).await?;

        Ok(records
            .into_iter()
            .filter(|stored| {
                self.session_id
                    .as_deref()
                    .map_or(true, |session| stored.session_id == session)
            })
            .filter_map(|stored| {
                let StoredRecord { id, data, .. } = stored;
                match serde_json::from_value::<CacheRecord>(data) {
                    Ok(record) => Some((id, record)),
                    Err(e) => {
                        warn!(
                            namespace = %self.namespace,
                            record_id = %id,
                            error = %e,
                            "Skipping record that is not a cache entry"
                        );
                        None
                    }
                }
            })
            .collect())
    }
}

#[async_trait]
impl<S: RecordStore> ResultCache for RecordCache<S> {
    async fn lookup(&self, topic: &str) -> Result<Option<CacheRecord>> {
        let mut matches = self
            .entries()
            .await?
            .into_iter()
            .filter(|record| record.topic == topic);

        let found = match self.policy {
            LookupPolicy::FirstMatch => matches.next(),
            // max_by_key keeps the last maximum, so equal timestamps resolve
            // to the later append.
            LookupPolicy::MostRecent => matches.max_by_key(|record| record.timestamp),
        };

        debug!(
            namespace = %self.namespace,
            topic = %topic,
            hit = found.is_some(),
            "Cache lookup"
        );
        Ok(found)
    }

    async fn store(&self, topic: &str, result: &Value) -> Result<CacheRecord> {
        let record = CacheRecord::new(topic, result.clone());
        let data =
            serde_json::to_value(&record).map_err(|e| CacheError::Serialization(e.to_string()))?;
        let session = self.session_id.clone().unwrap_or_default();

        self.store
            .append(&self.namespace, StoredRecord::new(session, data))
            .await?;

        debug!(namespace = %self.namespace, topic = %topic, "Cached accepted result");
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryRecordStore;
    use chrono::Duration;
    use serde_json::json;

    async fn append_raw(store: &InMemoryRecordStore, session: &str, record: &CacheRecord) {
        store
            .append("ns", StoredRecord::new(session, serde_json::to_value(record).unwrap()))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_miss_on_empty_store() {
        let cache = RecordCache::new(InMemoryRecordStore::new(), "ns");
        assert!(cache.lookup("anything").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_store_appends_without_overwriting() {
        let store = InMemoryRecordStore::new();
        let cache = RecordCache::new(store.clone(), "ns");
        cache.store("t", &json!(1)).await.unwrap();
        cache.store("t", &json!(2)).await.unwrap();

        assert_eq!(store.len("ns"), 2);
        assert_eq!(cache.entries().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_exact_topic_match_only() {
        let cache = RecordCache::new(InMemoryRecordStore::new(), "ns");
        cache.store("Rust", &json!("upper")).await.unwrap();

        assert!(cache.lookup("rust").await.unwrap().is_none());
        assert!(cache.lookup("Rust ").await.unwrap().is_none());
        assert_eq!(cache.lookup("Rust").await.unwrap().unwrap().result, json!("upper"));
    }

    #[tokio::test]
    async fn test_lookup_policies() {
        let store = InMemoryRecordStore::new();
        let newer = CacheRecord::new("t", json!("newer"));
        let mut older = CacheRecord::new("t", json!("older"));
        older.timestamp = newer.timestamp - Duration::seconds(60);

        // Newer record stored first so storage order and time order disagree.
        append_raw(&store, "", &newer).await;
        append_raw(&store, "", &older).await;

        let first = RecordCache::new(store.clone(), "ns").with_policy(LookupPolicy::FirstMatch);
        assert_eq!(first.lookup("t").await.unwrap().unwrap().result, json!("newer"));

        let latest = RecordCache::new(store.clone(), "ns");
        assert_eq!(latest.policy(), LookupPolicy::MostRecent);
        assert_eq!(latest.lookup("t").await.unwrap().unwrap().result, json!("newer"));

        let mut newest = CacheRecord::new("t", json!("newest"));
        newest.timestamp = newer.timestamp + Duration::seconds(60);
        append_raw(&store, "", &newest).await;
        assert_eq!(latest.lookup("t").await.unwrap().unwrap().result, json!("newest"));
        assert_eq!(first.lookup("t").await.unwrap().unwrap().result, json!("newer"));
    }

    #[tokio::test]
    async fn test_session_scope() {
        let store = InMemoryRecordStore::new();
        let a = RecordCache::new(store.clone(), "ns").with_session("a");
        let b = RecordCache::new(store.clone(), "ns").with_session("b");
        let global = RecordCache::new(store.clone(), "ns");

        a.store("t", &json!("from a")).await.unwrap();

        assert!(b.lookup("t").await.unwrap().is_none());
        assert_eq!(a.lookup("t").await.unwrap().unwrap().result, json!("from a"));
        assert_eq!(global.lookup("t").await.unwrap().unwrap().result, json!("from a"));
        assert_eq!(a.session_id(), Some("a"));
    }

    #[tokio::test]
    async fn test_foreign_records_are_skipped() {
        let store = InMemoryRecordStore::new();
        store
            .append("ns", StoredRecord::new("", json!({"unrelated": true})))
            .await
            .unwrap();
        let cache = RecordCache::new(store, "ns");
        cache.store("t", &json!("ok")).await.unwrap();

        assert_eq!(cache.entries().await.unwrap().len(), 1);
        assert!(cache.lookup("t").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_purge_topic_and_all() {
        let store = InMemoryRecordStore::new();
        let cache = RecordCache::new(store.clone(), "ns");
        cache.store("a", &json!(1)).await.unwrap();
        cache.store("a", &json!(2)).await.unwrap();
        cache.store("b", &json!(3)).await.unwrap();

        assert_eq!(cache.purge(Some("a")).await.unwrap(), 2);
        assert!(cache.lookup("a").await.unwrap().is_none());
        assert!(cache.lookup("b").await.unwrap().is_some());
        assert_eq!(cache.purge(Some("missing")).await.unwrap(), 0);
        assert_eq!(cache.purge(None).await.unwrap(), 1);
        assert!(store.is_empty("ns"));
    }
}
