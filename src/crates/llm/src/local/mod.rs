//! Local LLM provider implementations.
//!
//! These connect to inference servers on localhost or the local network and
//! need no API key.

pub mod ollama;

pub use ollama::OllamaClient;
