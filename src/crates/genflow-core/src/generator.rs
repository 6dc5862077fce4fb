//! Generator collaborator - the model call behind every attempt
//!
//! A [`Generator`] turns a [`GenerationRequest`] into a [`RawResponse`]. The
//! workflow treats it as opaque: it may be an HTTP call to a hosted model, a
//! local inference server, or a test stub. Tool use (web search, article
//! readers, knowledge bases) happens inside the generator, never in the core.
//!
//! # Response Shapes
//!
//! Model SDKs hand back either an already-decoded object (structured output
//! mode) or plain text that is supposed to contain JSON. [`RawResponse`]
//! captures both as a tagged union so the validator matches on the variant
//! instead of guessing at runtime:
//!
//! ```text
//! RawResponse
//! ├── Structured(Value)  - decoded by the provider
//! ├── Text(String)       - needs stripping + parsing
//! └── Fault(String)      - the call failed; recorded for the attempt log
//! ```
//!
//! # Implementing a Generator
//!
//! ```rust
//! use async_trait::async_trait;
//! use genflow_core::error::GenerationError;
//! use genflow_core::generator::{GenerationRequest, Generator, RawResponse};
//! use serde_json::json;
//!
//! struct Echo;
//!
//! #[async_trait]
//! impl Generator for Echo {
//!     async fn generate(&self, request: &GenerationRequest) -> Result<RawResponse, GenerationError> {
//!         Ok(RawResponse::Structured(json!({ "topic": request.topic })))
//!     }
//! }
//! ```
//!
//! Closures work too, via [`FnGenerator`]:
//!
//! ```rust
//! use genflow_core::error::GenerationError;
//! use genflow_core::generator::{FnGenerator, GenerationRequest, RawResponse};
//!
//! let generator = FnGenerator::new(|request: GenerationRequest| {
//!     let text = format!("{{\"title\": \"{}\"}}", request.topic);
//!     async move { Ok::<_, GenerationError>(RawResponse::Text(text)) }
//! });
//! ```

use crate::error::GenerationError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;

/// A unit of generation work: the topic plus the payload sent to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// Cache key; compared by exact string match.
    pub topic: String,

    /// Free-form prompt payload forwarded to the generator.
    pub payload: Value,
}

impl GenerationRequest {
    /// Create a request whose payload is the topic itself.
    ///
    /// This is the common case of "write a blog post about X".
    pub fn new(topic: impl Into<String>) -> Self {
        let topic = topic.into();
        Self {
            payload: Value::String(topic.clone()),
            topic,
        }
    }

    /// Create a request with an explicit payload.
    pub fn with_payload(topic: impl Into<String>, payload: Value) -> Self {
        Self {
            topic: topic.into(),
            payload,
        }
    }

    /// Render the payload as prompt text.
    ///
    /// Strings are sent verbatim, anything else is pretty-printed JSON.
    pub fn prompt_text(&self) -> String {
        match &self.payload {
            Value::String(s) => s.clone(),
            other => serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
        }
    }
}

/// What a generator produced for one attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum RawResponse {
    /// Already-decoded structured output.
    Structured(Value),

    /// Text that should contain a serialized payload.
    Text(String),

    /// The generator call failed.
    Fault(String),
}

impl RawResponse {
    /// Representation carried into the next attempt as `previous_output`.
    pub fn as_feedback_value(&self) -> Value {
        match self {
            RawResponse::Structured(value) => value.clone(),
            RawResponse::Text(text) => Value::String(text.clone()),
            RawResponse::Fault(_) => Value::Null,
        }
    }

    /// Whether this is a fault marker.
    pub fn is_fault(&self) -> bool {
        matches!(self, RawResponse::Fault(_))
    }
}

impl From<GenerationError> for RawResponse {
    fn from(err: GenerationError) -> Self {
        RawResponse::Fault(err.to_string())
    }
}

/// Produces a raw response for a request.
///
/// Implementations must be `Send + Sync`; share them as `Arc<dyn Generator>`.
/// Blocking here is expected (model latency, network round-trips); the
/// workflow applies its own per-attempt deadline and cancellation around the
/// call.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Run the model for one attempt.
    async fn generate(&self, request: &GenerationRequest) -> Result<RawResponse, GenerationError>;

    /// Short name used in logs.
    fn name(&self) -> &str {
        "generator"
    }
}

#[async_trait]
impl<G: Generator + ?Sized> Generator for Arc<G> {
    async fn generate(&self, request: &GenerationRequest) -> Result<RawResponse, GenerationError> {
        (**self).generate(request).await
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

/// Adapter turning an async closure into a [`Generator`].
pub struct FnGenerator<F> {
    func: F,
    name: String,
}

impl<F> FnGenerator<F> {
    /// Wrap a closure.
    pub fn new(func: F) -> Self {
        Self {
            func,
            name: "fn-generator".to_string(),
        }
    }

    /// Set the name reported in logs.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

#[async_trait]
impl<F, Fut> Generator for FnGenerator<F>
where
    F: Fn(GenerationRequest) -> Fut + Send + Sync,
    Fut: Future<Output = Result<RawResponse, GenerationError>> + Send,
{
    async fn generate(&self, request: &GenerationRequest) -> Result<RawResponse, GenerationError> {
        (self.func)(request.clone()).await
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_defaults_payload_to_topic() {
        let request = GenerationRequest::new("rust async");
        assert_eq!(request.topic, "rust async");
        assert_eq!(request.payload, json!("rust async"));
        assert_eq!(request.prompt_text(), "rust async");
    }

    #[test]
    fn test_prompt_text_pretty_prints_objects() {
        let request = GenerationRequest::with_payload("t", json!({"a": 1}));
        assert_eq!(request.prompt_text(), "{\n  \"a\": 1\n}");
    }

    #[test]
    fn test_raw_response_serialization_is_tagged() {
        let raw = RawResponse::Text("hi".into());
        let encoded = serde_json::to_value(&raw).unwrap();
        assert_eq!(encoded, json!({"kind": "text", "value": "hi"}));
    }

    #[test]
    fn test_fault_has_no_feedback_value() {
        let raw: RawResponse = GenerationError::Provider("boom".into()).into();
        assert!(raw.is_fault());
        assert_eq!(raw.as_feedback_value(), Value::Null);
    }

    #[tokio::test]
    async fn test_fn_generator() {
        let generator = FnGenerator::new(|request: GenerationRequest| async move {
            Ok(RawResponse::Structured(json!({"echo": request.topic})))
        })
        .with_name("echo");

        let raw = generator.generate(&GenerationRequest::new("x")).await.unwrap();
        assert_eq!(raw, RawResponse::Structured(json!({"echo": "x"})));
        assert_eq!(generator.name(), "echo");
    }
}
