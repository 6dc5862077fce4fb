//! HTTP-backed generators for genflow.
//!
//! This crate implements the [`Generator`](genflow_core::Generator) trait
//! for hosted and local model servers. Each client sends the request payload
//! as a single user message (after an optional system prompt) and returns
//! the reply as [`RawResponse::Text`](genflow_core::RawResponse::Text); the
//! workflow's validator does the parsing.
//!
//! # Local Providers
//!
//! - **Ollama** - `/api/chat`, with `format: "json"` in JSON mode
//!
//! # Remote Providers
//!
//! - **OpenAI-compatible** - OpenAI, Groq, Gemini, OpenRouter, LM Studio
//!
//! Provider errors are mapped onto
//! [`GenerationError`](genflow_core::GenerationError) so that rate limits,
//! 5xx responses and dropped connections are classified as transient and can
//! be retried by a [`RetryingGenerator`](genflow_core::RetryingGenerator).
//!
//! # Example
//!
//! ```rust,no_run
//! use genflow_core::prelude::*;
//! use llm::config::LocalLlmConfig;
//! use llm::local::OllamaClient;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = OllamaClient::new(LocalLlmConfig::new("http://localhost:11434", "llama3.2"))?;
//! let generator = RetryingGenerator::new(client, RetryPolicy::new(4));
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;

#[cfg(feature = "local")]
pub mod local;

#[cfg(feature = "remote")]
pub mod remote;

// Re-export commonly used types
pub use config::{LocalLlmConfig, PromptOptions, RemoteLlmConfig};
pub use error::{LlmError, Result};
