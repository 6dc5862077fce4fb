//! Wiring configuration into a runnable workflow

use crate::config::{GenflowConfig, LlmConfig, TransportConfig};
use crate::db::{Database, SqliteRecordStore};
use crate::error::{GenflowError, Result};
use genflow_core::cache::RecordCache;
use genflow_core::generator::Generator;
use genflow_core::retry::RetryingGenerator;
use genflow_core::validate::{Schema, Validator};
use genflow_core::workflow::RetryingWorkflow;
use llm::config::{LocalLlmConfig, PromptOptions, RemoteLlmConfig};
use llm::local::OllamaClient;
use llm::remote::{OpenAiClient, RemoteProvider};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

const OLLAMA_BASE_URL: &str = "http://localhost:11434";

/// Cache over the configured namespace of the SQLite store.
pub type SqliteCache = RecordCache<SqliteRecordStore>;

fn remote_provider(name: &str) -> Option<RemoteProvider> {
    match name {
        "openai" => Some(RemoteProvider::OpenAi),
        "groq" => Some(RemoteProvider::Groq),
        "gemini" => Some(RemoteProvider::Gemini),
        "openrouter" => Some(RemoteProvider::OpenRouter),
        "lmstudio" => Some(RemoteProvider::LmStudio),
        _ => None,
    }
}

fn prompt_options(config: &LlmConfig) -> PromptOptions {
    PromptOptions {
        system_prompt: config.system_prompt.clone(),
        temperature: config.temperature,
        max_tokens: config.max_tokens,
        json_mode: config.json_mode,
    }
}

/// Build the configured LLM client, wrapped in transport-level retries.
pub fn build_generator(llm: &LlmConfig, transport: &TransportConfig) -> Result<Arc<dyn Generator>> {
    let policy = transport.to_retry_policy()?;
    let timeout = Duration::from_secs(llm.timeout_secs);
    let options = prompt_options(llm);
    let provider = llm.provider.to_lowercase();

    let generator: Arc<dyn Generator> = if provider == "ollama" {
        let base_url = llm.base_url.clone().unwrap_or_else(|| OLLAMA_BASE_URL.to_string());
        let client = OllamaClient::new(
            LocalLlmConfig::new(base_url, &llm.model)
                .with_timeout(timeout)
                .with_options(options),
        )?;
        Arc::new(RetryingGenerator::new(client, policy))
    } else if let Some(remote) = remote_provider(&provider) {
        let api_key = match &llm.api_key {
            Some(key) if !key.starts_with("${") => key.clone(),
            _ => match std::env::var(remote.api_key_env()) {
                Ok(key) => key,
                Err(_) if remote.is_local() => "lm-studio".to_string(),
                Err(_) => {
                    return Err(GenflowError::Config(format!(
                        "no API key for provider '{}': set llm.api_key or {}",
                        provider,
                        remote.api_key_env()
                    )))
                }
            },
        };
        let base_url = llm.base_url.clone().unwrap_or_else(|| remote.base_url().to_string());
        let client = OpenAiClient::new(
            RemoteLlmConfig::new(api_key, base_url, &llm.model)
                .with_timeout(timeout)
                .with_options(options),
        )?;
        Arc::new(RetryingGenerator::new(client, policy))
    } else {
        return Err(GenflowError::Config(format!(
            "unknown LLM provider '{}'; expected ollama, openai, groq, gemini, openrouter or lmstudio",
            llm.provider
        )));
    };

    info!(generator = generator.name(), "LLM generator ready");
    Ok(generator)
}

/// Load a schema document. `.json` files are parsed as JSON, anything else
/// as YAML. Without a path the response is accepted as plain text.
pub async fn load_schema(path: Option<&Path>) -> Result<Schema> {
    let Some(path) = path else {
        return Ok(Schema::plain_text());
    };

    let source = tokio::fs::read_to_string(path).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => GenflowError::NotFound(format!("schema file {}", path.display())),
        _ => GenflowError::Config(format!("Failed to read schema {}: {}", path.display(), e)),
    })?;

    let is_json = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

    let schema = if is_json {
        Schema::from_json_str(&source)?
    } else {
        Schema::from_yaml_str(&source)?
    };
    debug!(path = %path.display(), schema = schema.label(), "Schema loaded");
    Ok(schema)
}

/// Open the configured database and the cache view over it.
pub async fn open_cache(config: &GenflowConfig, session_id: Option<&str>) -> Result<(Database, SqliteCache)> {
    let db = Database::new(config.database_path()?).await?;
    let mut cache = RecordCache::new(SqliteRecordStore::new(db.clone()), &config.workflow.namespace)
        .with_policy(config.workflow.lookup_policy);
    if let Some(session) = session_id {
        cache = cache.with_session(session);
    }
    Ok((db, cache))
}

/// Assemble a workflow from its parts and the `[workflow]` settings.
pub fn build_workflow(
    config: &GenflowConfig,
    generator: Arc<dyn Generator>,
    schema: Schema,
    cache: SqliteCache,
) -> Result<RetryingWorkflow> {
    let workflow = RetryingWorkflow::builder(generator, Validator::new(schema))
        .with_config(config.workflow.to_workflow_config()?)
        .with_cache(Arc::new(cache))
        .build()?;
    Ok(workflow)
}
