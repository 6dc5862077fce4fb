//! genflow - run validated, cached LLM generation from the command line
//!
//! This crate wires the [`genflow_core`] workflow to real collaborators:
//!
//! - **config**: dual-location TOML configuration (`~/.genflow`, `./.genflow`)
//! - **db**: SQLite database and the [`SqliteRecordStore`](db::SqliteRecordStore)
//!   that backs the result cache across restarts
//! - **setup**: building the LLM generator, schema and workflow from config
//! - **render**: text and JSON-lines output of workflow notifications
//! - **shutdown**: SIGINT/SIGTERM handling via a cancellation token

pub mod config;
pub mod db;
pub mod error;
pub mod render;
pub mod setup;
pub mod shutdown;

pub use config::{ConfigLoader, GenflowConfig};
pub use db::{Database, SqliteRecordStore};
pub use error::{GenflowError, Result};
pub use render::OutputFormat;
pub use shutdown::ShutdownCoordinator;

/// Version information
pub fn version_info() -> String {
    format!("genflow {}", env!("CARGO_PKG_VERSION"))
}
