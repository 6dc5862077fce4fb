//! Remote LLM provider implementations.
//!
//! Every supported hosted provider exposes an OpenAI-compatible chat
//! completions endpoint, so a single client covers them; [`RemoteProvider`]
//! only supplies the base URL and the conventional API key variable.

pub mod openai;

pub use openai::OpenAiClient;

use serde::{Deserialize, Serialize};

/// Known OpenAI-compatible endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemoteProvider {
    OpenAi,
    Groq,
    Gemini,
    OpenRouter,
    LmStudio,
}

impl RemoteProvider {
    pub fn base_url(&self) -> &'static str {
        match self {
            RemoteProvider::OpenAi => "https://api.openai.com/v1",
            RemoteProvider::Groq => "https://api.groq.com/openai/v1",
            RemoteProvider::Gemini => "https://generativelanguage.googleapis.com/v1beta/openai",
            RemoteProvider::OpenRouter => "https://openrouter.ai/api/v1",
            RemoteProvider::LmStudio => "http://localhost:1234/v1",
        }
    }

    /// Environment variable conventionally holding the API key.
    pub fn api_key_env(&self) -> &'static str {
        match self {
            RemoteProvider::OpenAi => "OPENAI_API_KEY",
            RemoteProvider::Groq => "GROQ_API_KEY",
            RemoteProvider::Gemini => "GOOGLE_API_KEY",
            RemoteProvider::OpenRouter => "OPENROUTER_API_KEY",
            RemoteProvider::LmStudio => "LMSTUDIO_API_KEY",
        }
    }

    /// Whether the server accepts requests without a real key.
    pub fn is_local(&self) -> bool {
        matches!(self, RemoteProvider::LmStudio)
    }
}
