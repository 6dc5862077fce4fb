//! SQLite-backed [`RecordStore`]

use super::Database;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use genflow_core::error::StoreError;
use genflow_core::store::{RecordStore, Result, StoredRecord};
use sqlx::Row;
use tracing::debug;

/// Append-only record store on the `workflow_records` table.
///
/// Scan order is insertion order, so cache lookups with
/// `LookupPolicy::FirstMatch` behave the same as with the in-memory store.
#[derive(Clone, Debug)]
pub struct SqliteRecordStore {
    db: Database,
}

impl SqliteRecordStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Number of records in a namespace
    pub async fn count(&self, namespace: &str) -> Result<usize> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM workflow_records WHERE namespace = ?")
            .bind(namespace)
            .fetch_one(self.db.pool())
            .await
            .map_err(unavailable)?;
        Ok(usize::try_from(count).unwrap_or(usize::MAX))
    }
}

fn unavailable(err: sqlx::Error) -> StoreError {
    StoreError::Unavailable(err.to_string())
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    async fn append(&self, namespace: &str, record: StoredRecord) -> Result<()> {
        let data = serde_json::to_string(&record.data)?;

        sqlx::query(
            "INSERT INTO workflow_records (id, namespace, session_id, data, created_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&record.id)
        .bind(namespace)
        .bind(&record.session_id)
        .bind(&data)
        .bind(record.created_at.to_rfc3339())
        .execute(self.db.pool())
        .await
        .map_err(unavailable)?;

        debug!(namespace = %namespace, id = %record.id, "Record appended");
        Ok(())
    }

    async fn scan(&self, namespace: &str) -> Result<Vec<StoredRecord>> {
        let rows = sqlx::query(
            "SELECT id, session_id, data, created_at FROM workflow_records
             WHERE namespace = ? ORDER BY seq",
        )
        .bind(namespace)
        .fetch_all(self.db.pool())
        .await
        .map_err(unavailable)?;

        rows.into_iter()
            .map(|row| -> Result<StoredRecord> {
                let data: String = row.try_get("data").map_err(unavailable)?;
                let created_at: String = row.try_get("created_at").map_err(unavailable)?;
                let created_at = DateTime::parse_from_rfc3339(&created_at)
                    .map_err(|e| StoreError::Serialization(format!("bad timestamp {}: {}", created_at, e)))?
                    .with_timezone(&Utc);

                Ok(StoredRecord {
                    id: row.try_get("id").map_err(unavailable)?,
                    session_id: row.try_get("session_id").map_err(unavailable)?,
                    data: serde_json::from_str(&data)?,
                    created_at,
                })
            })
            .collect()
    }

    async fn remove(&self, namespace: &str, ids: &[String]) -> Result<usize> {
        let mut tx = self.db.pool().begin().await.map_err(unavailable)?;
        let mut removed = 0u64;

        for id in ids {
            let result = sqlx::query("DELETE FROM workflow_records WHERE namespace = ? AND id = ?")
                .bind(namespace)
                .bind(id)
                .execute(&mut *tx)
                .await
                .map_err(unavailable)?;
            removed += result.rows_affected();
        }

        tx.commit().await.map_err(unavailable)?;
        Ok(usize::try_from(removed).unwrap_or(usize::MAX))
    }
}
