//! Ollama client implementation.
//!
//! Talks to a local Ollama server over its `/api/chat` endpoint. The
//! generation request's payload becomes the user message; an optional system
//! prompt is sent first. With `json_mode` the server is asked for `format:
//! "json"`, which constrains most models to emit a single JSON document.
//!
//! # Example
//!
//! ```rust,no_run
//! use genflow_core::generator::{GenerationRequest, Generator};
//! use llm::config::{LocalLlmConfig, PromptOptions};
//! use llm::local::OllamaClient;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = LocalLlmConfig::new("http://localhost:11434", "llama3.2")
//!     .with_options(PromptOptions::default().with_json_mode(true));
//! let client = OllamaClient::new(config)?;
//!
//! let raw = client.generate(&GenerationRequest::new("Rust ownership")).await?;
//! # Ok(())
//! # }
//! ```

use crate::config::LocalLlmConfig;
use crate::error::{LlmError, Result};
use async_trait::async_trait;
use genflow_core::error::GenerationError;
use genflow_core::generator::{GenerationRequest, Generator, RawResponse};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

/// Ollama client for local LLM inference.
#[derive(Clone)]
pub struct OllamaClient {
    config: LocalLlmConfig,
    client: Client,
    name: String,
}

impl OllamaClient {
    /// Create a new Ollama client with the given configuration.
    pub fn new(config: LocalLlmConfig) -> Result<Self> {
        let client = Client::builder().timeout(config.timeout).build()?;
        let name = format!("ollama/{}", config.model);

        Ok(Self { config, client, name })
    }

    pub fn config(&self) -> &LocalLlmConfig {
        &self.config
    }

    /// Check if the Ollama server is running.
    pub async fn check_health(&self) -> bool {
        let url = format!("{}/api/tags", self.config.base_url.trim_end_matches('/'));
        match self.client.get(&url).send().await {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }

    fn build_request(&self, request: &GenerationRequest) -> OllamaRequest {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &self.config.options.system_prompt {
            messages.push(OllamaMessage {
                role: "system".to_string(),
                content: system.clone(),
            });
        }
        messages.push(OllamaMessage {
            role: "user".to_string(),
            content: request.prompt_text(),
        });

        let mut options = HashMap::new();
        if let Some(temp) = self.config.options.temperature {
            options.insert("temperature", serde_json::Value::from(temp));
        }
        if let Some(max_tokens) = self.config.options.max_tokens {
            options.insert("num_predict", serde_json::Value::from(max_tokens));
        }

        OllamaRequest {
            model: self.config.model.clone(),
            messages,
            stream: false,
            format: self.config.options.json_mode.then(|| "json".to_string()),
            options: if options.is_empty() { None } else { Some(options) },
        }
    }

    async fn chat(&self, request: &GenerationRequest) -> Result<String> {
        let url = format!("{}/api/chat", self.config.base_url.trim_end_matches('/'));
        let body = self.build_request(request);

        let response = self.client.post(&url).json(&body).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(LlmError::from_status("Ollama", status, error_text));
        }

        let ollama_resp: OllamaResponse = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

        debug!(
            model = %ollama_resp.model,
            prompt_tokens = ollama_resp.prompt_eval_count.unwrap_or(0),
            completion_tokens = ollama_resp.eval_count.unwrap_or(0),
            "Ollama response received"
        );

        Ok(ollama_resp.message.content)
    }
}

#[async_trait]
impl Generator for OllamaClient {
    async fn generate(&self, request: &GenerationRequest) -> std::result::Result<RawResponse, GenerationError> {
        let content = self.chat(request).await?;
        Ok(RawResponse::Text(content))
    }

    fn name(&self) -> &str {
        &self.name
    }
}

// Ollama API types
#[derive(Debug, Serialize)]
struct OllamaRequest {
    model: String,
    messages: Vec<OllamaMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<HashMap<&'static str, serde_json::Value>>,
}

#[derive(Debug, Serialize, Deserialize)]
struct OllamaMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct OllamaResponse {
    model: String,
    message: OllamaMessage,
    #[serde(default)]
    prompt_eval_count: Option<usize>,
    #[serde(default)]
    eval_count: Option<usize>,
}
