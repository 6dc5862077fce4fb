//! Configuration schema for genflow

use crate::error::{GenflowError, Result};
use genflow_core::cache::LookupPolicy;
use genflow_core::retry::RetryPolicy;
use genflow_core::workflow::{WorkflowConfig, DEFAULT_RETRY_INSTRUCTIONS};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main genflow configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct GenflowConfig {
    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// LLM configuration
    #[serde(default)]
    pub llm: LlmConfig,

    /// Workflow configuration
    #[serde(default)]
    pub workflow: WorkflowSettings,

    /// Transport-level retry configuration
    #[serde(default)]
    pub transport: TransportConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Database configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database file path (relative to ~/.genflow or absolute)
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "genflow.db".to_string(),
        }
    }
}

/// LLM provider configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// "ollama", "openai", "groq", "gemini", "openrouter" or "lmstudio"
    pub provider: String,

    /// Model name
    pub model: String,

    /// API key (supports environment variable interpolation)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// API base URL, overriding the provider preset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// Temperature for generation (0.0-1.0)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// Maximum tokens to generate
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<usize>,

    /// Ask the server for a single JSON document
    pub json_mode: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,

    /// HTTP request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "ollama".to_string(),
            model: "llama3.2".to_string(),
            api_key: None,
            base_url: None,
            temperature: Some(0.7),
            max_tokens: None,
            json_mode: true,
            system_prompt: None,
            timeout_secs: 120,
        }
    }
}

/// `[workflow]` section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowSettings {
    /// Consult the cache before generating
    pub use_cache: bool,

    /// Generator calls per run
    pub max_attempts: usize,

    /// Deadline for a single attempt, in seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attempt_timeout_secs: Option<f64>,

    pub retry_instructions: String,

    /// Record store namespace holding cached results
    pub namespace: String,

    /// Which cached record wins when a topic has several
    pub lookup_policy: LookupPolicy,

    /// Prefix for derived session ids
    pub session_prefix: String,
}

impl Default for WorkflowSettings {
    fn default() -> Self {
        let defaults = WorkflowConfig::default();
        Self {
            use_cache: defaults.use_cache,
            max_attempts: defaults.max_attempts,
            attempt_timeout_secs: None,
            retry_instructions: DEFAULT_RETRY_INSTRUCTIONS.to_string(),
            namespace: "generation_workflows".to_string(),
            lookup_policy: LookupPolicy::default(),
            session_prefix: "genflow".to_string(),
        }
    }
}

impl WorkflowSettings {
    /// Convert to the core workflow configuration.
    pub fn to_workflow_config(&self) -> Result<WorkflowConfig> {
        let attempt_timeout = match self.attempt_timeout_secs {
            Some(secs) if !secs.is_finite() || secs <= 0.0 => {
                return Err(GenflowError::Config(format!(
                    "workflow.attempt_timeout_secs must be positive, got {}",
                    secs
                )));
            }
            Some(secs) => Some(seconds("workflow.attempt_timeout_secs", secs)?),
            None => None,
        };

        let config = WorkflowConfig {
            use_cache: self.use_cache,
            max_attempts: self.max_attempts,
            attempt_timeout,
            retry_instructions: self.retry_instructions.clone(),
            ..WorkflowConfig::default()
        };
        config.validate()?;
        Ok(config)
    }
}

/// `[transport]` section: retries of a single generator call on
/// connection failures, throttling and 5xx responses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Calls per attempt, including the first
    pub max_attempts: usize,

    /// Initial retry delay in seconds
    pub initial_interval_secs: f64,

    /// Retry backoff multiplier
    pub backoff_factor: f64,

    /// Maximum retry delay in seconds
    pub max_interval_secs: f64,

    pub jitter: bool,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_interval_secs: 0.5,
            backoff_factor: 2.0,
            max_interval_secs: 30.0,
            jitter: true,
        }
    }
}

impl TransportConfig {
    pub fn to_retry_policy(&self) -> Result<RetryPolicy> {
        if self.max_attempts == 0 {
            return Err(GenflowError::Config(
                "transport.max_attempts must be at least 1".to_string(),
            ));
        }
        for (name, value) in [
            ("initial_interval_secs", self.initial_interval_secs),
            ("max_interval_secs", self.max_interval_secs),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(GenflowError::Config(format!(
                    "transport.{} must be a non-negative number, got {}",
                    name, value
                )));
            }
        }

        Ok(RetryPolicy::new(self.max_attempts)
            .with_initial_interval(seconds("transport.initial_interval_secs", self.initial_interval_secs)?)
            .with_backoff_factor(self.backoff_factor)
            .with_max_interval(seconds("transport.max_interval_secs", self.max_interval_secs)?)
            .with_jitter(self.jitter))
    }
}

fn seconds(name: &str, secs: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(secs)
        .map_err(|e| GenflowError::Config(format!("{} is out of range ({}): {}", name, secs, e)))
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error"
    pub level: String,

    /// Log format: "compact", "pretty", "json"
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            format: "compact".to_string(),
        }
    }
}

impl GenflowConfig {
    /// Expand `${VAR}` placeholders in secret-bearing fields.
    pub fn resolve_env_vars(&mut self) {
        if let Some(ref api_key) = self.llm.api_key {
            self.llm.api_key = Some(Self::expand_env_var(api_key));
        }

        if let Some(ref base_url) = self.llm.base_url {
            self.llm.base_url = Some(Self::expand_env_var(base_url));
        }

        self.database.path = Self::expand_env_var(&self.database.path);
    }

    fn expand_env_var(value: &str) -> String {
        if value.starts_with("${") && value.ends_with('}') {
            let var_name = &value[2..value.len() - 1];
            std::env::var(var_name).unwrap_or_else(|_| value.to_string())
        } else {
            value.to_string()
        }
    }

    /// Get the resolved database path
    ///
    /// If path is relative, resolves it relative to ~/.genflow
    pub fn database_path(&self) -> Result<PathBuf> {
        let path = PathBuf::from(&self.database.path);

        if path.is_absolute() {
            Ok(path)
        } else {
            Ok(genflow_home()?.join(path))
        }
    }

    /// Render as TOML.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| GenflowError::Config(format!("Failed to serialize config: {}", e)))
    }
}

/// `~/.genflow`
pub fn genflow_home() -> Result<PathBuf> {
    dirs::home_dir()
        .map(|home| home.join(".genflow"))
        .ok_or_else(|| GenflowError::Config("Failed to get home directory".to_string()))
}
