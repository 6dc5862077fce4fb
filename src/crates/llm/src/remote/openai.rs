//! OpenAI-compatible chat completions client.
//!
//! Any provider that speaks the `/chat/completions` protocol works here:
//! OpenAI itself, Groq, Gemini's OpenAI endpoint, OpenRouter and LM Studio.
//! See [`RemoteProvider`](super::RemoteProvider) for base URL presets.
//!
//! # Example
//!
//! ```rust,no_run
//! use genflow_core::generator::{GenerationRequest, Generator};
//! use llm::config::RemoteLlmConfig;
//! use llm::remote::OpenAiClient;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = RemoteLlmConfig::from_env(
//!     "OPENAI_API_KEY",
//!     "https://api.openai.com/v1",
//!     "gpt-4o-mini",
//! )?;
//! let client = OpenAiClient::new(config)?;
//!
//! let raw = client.generate(&GenerationRequest::new("Rust ownership")).await?;
//! # Ok(())
//! # }
//! ```

use crate::config::RemoteLlmConfig;
use crate::error::{LlmError, Result};
use async_trait::async_trait;
use genflow_core::error::GenerationError;
use genflow_core::generator::{GenerationRequest, Generator, RawResponse};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// OpenAI-compatible API client.
#[derive(Clone)]
pub struct OpenAiClient {
    config: RemoteLlmConfig,
    client: Client,
    name: String,
}

impl OpenAiClient {
    /// Create a new client with the given configuration.
    pub fn new(config: RemoteLlmConfig) -> Result<Self> {
        if config.api_key.trim().is_empty() {
            return Err(LlmError::ApiKeyNotFound(format!(
                "no API key configured for {}",
                config.base_url
            )));
        }

        let client = Client::builder().timeout(config.timeout).build()?;
        let name = format!("openai-compatible/{}", config.model);

        Ok(Self { config, client, name })
    }

    pub fn config(&self) -> &RemoteLlmConfig {
        &self.config
    }

    fn build_request(&self, request: &GenerationRequest) -> OpenAiRequest {
        let options = &self.config.options;

        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &options.system_prompt {
            messages.push(OpenAiMessage {
                role: "system".to_string(),
                content: Some(system.clone()),
            });
        }
        messages.push(OpenAiMessage {
            role: "user".to_string(),
            content: Some(request.prompt_text()),
        });

        OpenAiRequest {
            model: self.config.model.clone(),
            messages,
            temperature: options.temperature,
            max_tokens: options.max_tokens,
            response_format: options.json_mode.then(|| ResponseFormat {
                kind: "json_object".to_string(),
            }),
            stream: false,
        }
    }

    async fn chat(&self, request: &GenerationRequest) -> Result<String> {
        let url = format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'));

        let mut req = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&self.build_request(request));

        if let Some(org) = &self.config.organization {
            req = req.header("OpenAI-Organization", org);
        }

        let response = req.send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(LlmError::from_status("OpenAI-compatible", status, error_text));
        }

        let openai_resp: OpenAiResponse = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

        if let Some(usage) = &openai_resp.usage {
            debug!(
                model = %openai_resp.model,
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                "Chat completion received"
            );
        }

        let choice = openai_resp
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::InvalidResponse("response contained no choices".to_string()))?;

        Ok(strip_reasoning(&choice.message.content.unwrap_or_default()).to_string())
    }
}

/// Drop a leading `<think>...</think>` block emitted by reasoning models.
fn strip_reasoning(content: &str) -> &str {
    let trimmed = content.trim_start();
    if trimmed.starts_with("<think>") {
        if let Some(end) = trimmed.find("</think>") {
            return trimmed[end + "</think>".len()..].trim();
        }
    }
    content
}

#[async_trait]
impl Generator for OpenAiClient {
    async fn generate(&self, request: &GenerationRequest) -> std::result::Result<RawResponse, GenerationError> {
        let content = self.chat(request).await?;
        Ok(RawResponse::Text(content))
    }

    fn name(&self) -> &str {
        &self.name
    }
}

// OpenAI API types
#[derive(Debug, Serialize)]
struct OpenAiRequest {
    model: String,
    messages: Vec<OpenAiMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAiMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    #[serde(default)]
    model: String,
    choices: Vec<OpenAiChoice>,
    usage: Option<OpenAiUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: OpenAiMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAiUsage {
    prompt_tokens: usize,
    completion_tokens: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PromptOptions;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(base_url: &str, options: PromptOptions) -> OpenAiClient {
        OpenAiClient::new(RemoteLlmConfig::new("test-key", base_url, "gpt-4o-mini").with_options(options))
            .unwrap()
    }

    #[test]
    fn test_empty_api_key_is_rejected() {
        let result = OpenAiClient::new(RemoteLlmConfig::new("", "https://api.openai.com/v1", "gpt-4o"));
        assert!(matches!(result, Err(LlmError::ApiKeyNotFound(_))));
    }

    #[test]
    fn test_request_body_with_json_mode() {
        let options = PromptOptions::default()
            .with_system_prompt("Return JSON")
            .with_max_tokens(512)
            .with_json_mode(true);
        let client = client("https://api.openai.com/v1", options);
        let request = GenerationRequest::with_payload("t", json!({"idea": "x"}));

        let body = serde_json::to_value(client.build_request(&request)).unwrap();
        assert_eq!(body["response_format"], json!({"type": "json_object"}));
        assert_eq!(body["max_tokens"], json!(512));
        assert_eq!(body["messages"][0], json!({"role": "system", "content": "Return JSON"}));
        assert_eq!(body["messages"][1]["content"], json!("{\n  \"idea\": \"x\"\n}"));
        assert!(body.get("temperature").is_none());
    }

    #[test]
    fn test_strip_reasoning() {
        assert_eq!(strip_reasoning("<think>hmm</think>\n{\"a\": 1}"), "{\"a\": 1}");
        assert_eq!(strip_reasoning("{\"a\": 1}"), "{\"a\": 1}");
        assert_eq!(strip_reasoning("<think>unterminated"), "<think>unterminated");
    }

    #[tokio::test]
    async fn test_generate_reads_first_choice() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "chatcmpl-1",
                "object": "chat.completion",
                "model": "gpt-4o-mini",
                "choices": [{
                    "index": 0,
                    "message": {"role": "assistant", "content": "```json\n{\"ok\": true}\n```"},
                    "finish_reason": "stop"
                }],
                "usage": {"prompt_tokens": 5, "completion_tokens": 9, "total_tokens": 14}
            })))
            .mount(&server)
            .await;

        let client = client(&server.uri(), PromptOptions::default());
        let raw = client.generate(&GenerationRequest::new("t")).await.unwrap();
        assert_eq!(raw, RawResponse::Text("```json\n{\"ok\": true}\n```".to_string()));
    }

    #[tokio::test]
    async fn test_rate_limit_maps_to_transient() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(429).set_body_string("quota"))
            .mount(&server)
            .await;

        let err = client(&server.uri(), PromptOptions::default())
            .generate(&GenerationRequest::new("t"))
            .await
            .unwrap_err();
        assert_eq!(err, GenerationError::RateLimited("quota".to_string()));
    }

    #[tokio::test]
    async fn test_unauthorized_is_permanent() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(401).set_body_string("invalid key"))
            .mount(&server)
            .await;

        let err = client(&server.uri(), PromptOptions::default())
            .generate(&GenerationRequest::new("t"))
            .await
            .unwrap_err();
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn test_empty_choices_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"model": "m", "choices": []})))
            .mount(&server)
            .await;

        let err = client(&server.uri(), PromptOptions::default())
            .generate(&GenerationRequest::new("t"))
            .await
            .unwrap_err();
        assert!(matches!(err, GenerationError::Provider(msg) if msg.contains("no choices")));
    }
}
