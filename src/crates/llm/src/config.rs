//! Common configuration structures for LLM providers.

use crate::error::{LlmError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Prompting options shared by every provider.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptOptions {
    /// System message sent before the request payload.
    pub system_prompt: Option<String>,

    pub temperature: Option<f32>,

    pub max_tokens: Option<usize>,

    /// Ask the provider for JSON-only output where supported.
    pub json_mode: bool,
}

impl PromptOptions {
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_json_mode(mut self, json_mode: bool) -> Self {
        self.json_mode = json_mode;
        self
    }
}

/// Configuration for local LLM servers (Ollama).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalLlmConfig {
    /// Base URL for the local LLM server, e.g. `http://localhost:11434`.
    pub base_url: String,

    /// Model name/identifier.
    pub model: String,

    /// Request timeout.
    #[serde(default = "default_timeout", with = "duration_secs")]
    pub timeout: Duration,

    #[serde(default)]
    pub options: PromptOptions,
}

impl LocalLlmConfig {
    /// Create a new local LLM configuration.
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            model: model.into(),
            timeout: default_timeout(),
            options: PromptOptions::default(),
        }
    }

    /// Set the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_options(mut self, options: PromptOptions) -> Self {
        self.options = options;
        self
    }
}

/// Configuration for OpenAI-compatible chat completion APIs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteLlmConfig {
    /// API key for authentication.
    pub api_key: String,

    /// Base URL for the API.
    ///
    /// Examples:
    /// - OpenAI: "https://api.openai.com/v1"
    /// - Groq: "https://api.groq.com/openai/v1"
    /// - Gemini: "https://generativelanguage.googleapis.com/v1beta/openai"
    /// - OpenRouter: "https://openrouter.ai/api/v1"
    /// - LM Studio: "http://localhost:1234/v1"
    pub base_url: String,

    /// Model name/identifier.
    pub model: String,

    /// Request timeout.
    #[serde(default = "default_timeout", with = "duration_secs")]
    pub timeout: Duration,

    /// Organization ID (optional, for providers that support it).
    #[serde(default)]
    pub organization: Option<String>,

    #[serde(default)]
    pub options: PromptOptions,
}

impl RemoteLlmConfig {
    /// Create a new remote LLM configuration.
    pub fn new(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: base_url.into(),
            model: model.into(),
            timeout: default_timeout(),
            organization: None,
            options: PromptOptions::default(),
        }
    }

    /// Create configuration with the API key taken from an environment variable.
    pub fn from_env(
        env_var: &str,
        base_url: impl Into<String>,
        model: impl Into<String>,
    ) -> Result<Self> {
        let api_key = std::env::var(env_var)
            .map_err(|_| LlmError::ApiKeyNotFound(format!("Environment variable: {}", env_var)))?;

        Ok(Self::new(api_key, base_url, model))
    }

    /// Set the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the organization ID.
    pub fn with_organization(mut self, organization: impl Into<String>) -> Self {
        self.organization = Some(organization.into());
        self
    }

    pub fn with_options(mut self, options: PromptOptions) -> Self {
        self.options = options;
        self
    }
}

fn default_timeout() -> Duration {
    Duration::from_secs(120)
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(deserializer)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_config_builder() {
        let config = LocalLlmConfig::new("http://localhost:11434", "llama3.2")
            .with_timeout(Duration::from_secs(30))
            .with_options(PromptOptions::default().with_json_mode(true));

        assert_eq!(config.base_url, "http://localhost:11434");
        assert_eq!(config.model, "llama3.2");
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert!(config.options.json_mode);
    }

    #[test]
    fn test_remote_config_builder() {
        let config = RemoteLlmConfig::new("test-key", "https://api.openai.com/v1", "gpt-4o-mini")
            .with_timeout(Duration::from_secs(90))
            .with_organization("org-123");

        assert_eq!(config.api_key, "test-key");
        assert_eq!(config.timeout, Duration::from_secs(90));
        assert_eq!(config.organization, Some("org-123".to_string()));
    }

    #[test]
    fn test_timeout_deserializes_from_seconds() {
        let config: LocalLlmConfig = serde_json::from_value(serde_json::json!({
            "base_url": "http://localhost:11434",
            "model": "llama3.2",
            "timeout": 15
        }))
        .unwrap();
        assert_eq!(config.timeout, Duration::from_secs(15));
        assert_eq!(config.options, PromptOptions::default());
    }

    #[test]
    fn test_missing_env_key() {
        let err = RemoteLlmConfig::from_env("GENFLOW_TEST_KEY_THAT_IS_NOT_SET", "u", "m").unwrap_err();
        assert!(err.is_auth_error());
    }
}
