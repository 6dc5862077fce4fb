//! Configuration management for genflow
//!
//! Supports dual-location configuration:
//! - User-level: ~/.genflow/genflow.toml
//! - Project-level: ./.genflow/genflow.toml
//!
//! Project-level config overrides user-level config.

mod loader;
mod schema;

pub use loader::ConfigLoader;
pub use schema::{
    genflow_home, DatabaseConfig, GenflowConfig, LlmConfig, LoggingConfig, TransportConfig,
    WorkflowSettings,
};

use crate::Result;

/// Load configuration from both locations with project config taking precedence
pub async fn load_config() -> Result<GenflowConfig> {
    ConfigLoader::new()?.load().await
}
