//! Common test utilities and setup

use genflow::db::{Database, SqliteRecordStore};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::TempDir;

static TEST_DB_COUNTER: AtomicUsize = AtomicUsize::new(0);

/// Fresh database file path inside a temp dir
pub fn test_db_path() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let counter = TEST_DB_COUNTER.fetch_add(1, Ordering::SeqCst);
    let path = temp_dir.path().join(format!("test_{}.db", counter));
    (temp_dir, path)
}

/// Create a record store on a new database
pub async fn setup_test_store() -> (TempDir, PathBuf, SqliteRecordStore) {
    let (temp_dir, path) = test_db_path();
    let db = Database::new(&path).await.expect("Failed to create test database");
    (temp_dir, path, SqliteRecordStore::new(db))
}
