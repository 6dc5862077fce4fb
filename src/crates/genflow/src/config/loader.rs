//! Configuration loader with dual-location support
//!
//! Loads configuration from:
//! 1. Default values
//! 2. User-level config: ~/.genflow/genflow.toml
//! 3. Project-level config: ./.genflow/genflow.toml
//!
//! Later files override earlier ones key by key, so a project file that only
//! sets `llm.model` keeps the provider chosen in the user file.

use crate::config::schema::{genflow_home, GenflowConfig};
use crate::error::{GenflowError, Result};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

const CONFIG_FILE: &str = "genflow.toml";

/// Configuration loader that handles both user and project configs
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    user_config_path: PathBuf,
    project_config_path: PathBuf,
}

impl ConfigLoader {
    /// Loader for the standard locations.
    pub fn new() -> Result<Self> {
        let project_dir = std::env::current_dir()
            .map_err(|e| GenflowError::Config(format!("Failed to get current directory: {}", e)))?;

        Ok(Self {
            user_config_path: genflow_home()?.join(CONFIG_FILE),
            project_config_path: project_dir.join(".genflow").join(CONFIG_FILE),
        })
    }

    /// Loader for explicit paths.
    pub fn with_paths(user_config_path: impl Into<PathBuf>, project_config_path: impl Into<PathBuf>) -> Self {
        Self {
            user_config_path: user_config_path.into(),
            project_config_path: project_config_path.into(),
        }
    }

    /// Replace the project-level path, e.g. with a `--config` argument.
    pub fn with_project_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.project_config_path = path.into();
        self
    }

    /// Like [`with_project_path`](Self::with_project_path), but the file
    /// must exist. Used for paths named on the command line.
    pub fn with_explicit_config(self, path: impl Into<PathBuf>) -> Result<Self> {
        let loader = self.with_project_path(path);
        if !loader.project_config_exists() {
            return Err(GenflowError::NotFound(format!(
                "config file {}",
                loader.project_config_path.display()
            )));
        }
        Ok(loader)
    }

    /// Load configuration from both locations with project taking precedence
    ///
    /// Missing files are skipped. A file that exists but does not parse is an
    /// error.
    pub async fn load(&self) -> Result<GenflowConfig> {
        info!("Loading configuration with defaults");
        let mut merged = toml::Value::Table(toml::map::Map::new());

        for path in [&self.user_config_path, &self.project_config_path] {
            if !path.exists() {
                debug!(path = %path.display(), "Config file not found, skipping");
                continue;
            }
            let layer = Self::read_table(path).await?;
            debug!(path = %path.display(), "Loaded config layer");
            merge_values(&mut merged, layer);
        }

        let mut config: GenflowConfig = merged
            .try_into()
            .map_err(|e| GenflowError::Config(format!("Failed to parse config: {}", e)))?;

        config.resolve_env_vars();

        info!("Configuration loaded successfully");
        Ok(config)
    }

    /// Load configuration from a specific path
    pub async fn load_from_path(&self, path: &Path) -> Result<GenflowConfig> {
        let table = Self::read_table(path).await?;
        table
            .try_into()
            .map_err(|e| GenflowError::Config(format!("Failed to parse config {}: {}", path.display(), e)))
    }

    async fn read_table(path: &Path) -> Result<toml::Value> {
        if !path.exists() {
            return Err(GenflowError::NotFound(format!("config file {}", path.display())));
        }

        let content = fs::read_to_string(path)
            .await
            .map_err(|e| GenflowError::Config(format!("Failed to read config: {}", e)))?;

        let table: toml::Table = toml::from_str(&content)
            .map_err(|e| GenflowError::Config(format!("Failed to parse config {}: {}", path.display(), e)))?;

        Ok(toml::Value::Table(table))
    }

    /// Load only user-level config
    pub async fn load_user_config(&self) -> Result<GenflowConfig> {
        self.load_from_path(&self.user_config_path).await
    }

    /// Load only project-level config
    pub async fn load_project_config(&self) -> Result<GenflowConfig> {
        self.load_from_path(&self.project_config_path).await
    }

    pub fn user_config_path(&self) -> &Path {
        &self.user_config_path
    }

    pub fn project_config_path(&self) -> &Path {
        &self.project_config_path
    }

    pub fn project_config_exists(&self) -> bool {
        self.project_config_path.exists()
    }
}

/// Merge `overlay` into `base`. Tables merge recursively; anything else in
/// `overlay` replaces the value in `base`.
fn merge_values(base: &mut toml::Value, overlay: toml::Value) {
    match (base, overlay) {
        (toml::Value::Table(base_table), toml::Value::Table(overlay_table)) => {
            for (key, value) in overlay_table {
                match base_table.get_mut(&key) {
                    Some(existing) => merge_values(existing, value),
                    None => {
                        base_table.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}
