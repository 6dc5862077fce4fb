//! genflow CLI - validated, cached LLM generation
//!
//! Main entry point for the genflow command-line tool.

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use futures::StreamExt;
use genflow::config::{ConfigLoader, GenflowConfig, LoggingConfig};
use genflow::render::{self, OutputFormat};
use genflow::{setup, version_info, ShutdownCoordinator};
use genflow_core::cache::ResultCache;
use genflow_core::generator::GenerationRequest;
use genflow_core::session::{hashed_session_id, slug_session_id};
use genflow_core::stream::{WorkflowEvent, WorkflowOutcome};
use serde_json::Value;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "genflow")]
#[command(about = "genflow - validated, cached LLM generation with bounded retries", long_about = None)]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Project-level config file (default: ./.genflow/genflow.toml)
    #[arg(long, global = true, env = "GENFLOW_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a result for a topic, reusing a cached one when available
    Run(RunArgs),

    /// Inspect or purge cached results
    #[command(subcommand)]
    Cache(CacheCommands),

    /// Derive a session id from free text
    SessionId {
        /// Text to derive the id from
        text: String,
        /// Use the SHA-256 of the text (default)
        #[arg(long, conflicts_with = "slug")]
        hash: bool,
        /// Use the lowercased text with spaces replaced by dashes
        #[arg(long)]
        slug: bool,
        /// Prefix (default: workflow.session_prefix)
        #[arg(long)]
        prefix: Option<String>,
    },

    /// Print the effective configuration as TOML
    Config,

    /// Show version information
    Version,
}

#[derive(Args)]
struct RunArgs {
    /// Topic; also the cache key
    #[arg(short, long)]
    topic: String,

    /// JSON payload sent to the model (default: the topic itself)
    #[arg(short, long, conflicts_with = "payload_file")]
    payload: Option<String>,

    /// File holding the JSON payload
    #[arg(long)]
    payload_file: Option<PathBuf>,

    /// Schema file (YAML or JSON) the result must satisfy
    #[arg(short, long)]
    schema: Option<PathBuf>,

    /// Skip the cache lookup and always generate
    #[arg(long)]
    no_cache: bool,

    /// Generation attempts before giving up
    #[arg(long)]
    max_attempts: Option<usize>,

    /// Deadline for one attempt, in seconds
    #[arg(long)]
    attempt_timeout: Option<f64>,

    #[command(flatten)]
    scope: CacheScope,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,
}

#[derive(Args, Clone)]
struct CacheScope {
    /// Record store namespace (default: workflow.namespace)
    #[arg(long)]
    namespace: Option<String>,

    /// Only see and tag records of this session
    #[arg(long)]
    session: Option<String>,
}

#[derive(Subcommand)]
enum CacheCommands {
    /// List cached topics
    List {
        #[command(flatten)]
        scope: CacheScope,
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
    /// Show the cached result for a topic
    Show {
        topic: String,
        #[command(flatten)]
        scope: CacheScope,
    },
    /// Delete cached results for a topic, or all visible ones
    Purge {
        topic: Option<String>,
        #[command(flatten)]
        scope: CacheScope,
    },
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&logging.level))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    let result = match logging.format.as_str() {
        "json" => builder.json().try_init(),
        "pretty" => builder.pretty().try_init(),
        _ => builder.compact().try_init(),
    };
    if let Err(e) = result {
        eprintln!("warning: failed to initialize logging: {}", e);
    }
}

async fn load_config(path: Option<&PathBuf>) -> anyhow::Result<GenflowConfig> {
    let mut loader = ConfigLoader::new()?;
    if let Some(path) = path {
        loader = loader.with_explicit_config(path)?;
    }
    Ok(loader.load().await?)
}

fn apply_scope(config: &mut GenflowConfig, scope: &CacheScope) {
    if let Some(namespace) = &scope.namespace {
        config.workflow.namespace = namespace.clone();
    }
}

async fn read_payload(args: &RunArgs) -> anyhow::Result<Option<Value>> {
    let text = match (&args.payload, &args.payload_file) {
        (Some(text), _) => text.clone(),
        (None, Some(path)) => tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read payload file {}", path.display()))?,
        (None, None) => return Ok(None),
    };
    let payload = serde_json::from_str(&text).context("payload is not valid JSON")?;
    Ok(Some(payload))
}

async fn run(mut config: GenflowConfig, args: RunArgs) -> anyhow::Result<ExitCode> {
    apply_scope(&mut config, &args.scope);
    if args.no_cache {
        config.workflow.use_cache = false;
    }
    if let Some(max_attempts) = args.max_attempts {
        config.workflow.max_attempts = max_attempts;
    }
    if let Some(timeout) = args.attempt_timeout {
        config.workflow.attempt_timeout_secs = Some(timeout);
    }

    let request = match read_payload(&args).await? {
        Some(payload) => GenerationRequest::with_payload(&args.topic, payload),
        None => GenerationRequest::new(&args.topic),
    };

    let generator = setup::build_generator(&config.llm, &config.transport)?;
    let schema = setup::load_schema(args.schema.as_deref()).await?;
    let (db, cache) = setup::open_cache(&config, args.scope.session.as_deref()).await?;
    let workflow = setup::build_workflow(&config, generator, schema, cache)?;

    let shutdown = ShutdownCoordinator::new();
    let signals = shutdown.install_signal_handlers();

    let mut events = workflow.stream(request, shutdown.run_token());
    let mut outcome = None;
    while let Some(event) = events.next().await {
        println!("{}", render::render_event(&event, args.format));
        if let WorkflowEvent::Finished(finished) = event {
            outcome = Some(finished);
        }
    }

    signals.abort();
    db.close().await;

    match outcome {
        Some(WorkflowOutcome::Accepted { .. }) => Ok(ExitCode::SUCCESS),
        Some(WorkflowOutcome::Exhausted { .. }) => Ok(ExitCode::from(2)),
        Some(WorkflowOutcome::Cancelled { .. }) => Ok(ExitCode::from(130)),
        None => anyhow::bail!("workflow ended without a result"),
    }
}

async fn cache_command(mut config: GenflowConfig, command: CacheCommands) -> anyhow::Result<ExitCode> {
    let scope = match &command {
        CacheCommands::List { scope, .. }
        | CacheCommands::Show { scope, .. }
        | CacheCommands::Purge { scope, .. } => scope.clone(),
    };
    apply_scope(&mut config, &scope);
    let (db, cache) = setup::open_cache(&config, scope.session.as_deref()).await?;

    let code = match command {
        CacheCommands::List { format, .. } => {
            let entries = cache.entries().await?;
            if entries.is_empty() && format == OutputFormat::Text {
                println!("No cached results in '{}'", cache.namespace());
            }
            for entry in &entries {
                println!("{}", render::render_cache_entry(entry, format));
            }
            ExitCode::SUCCESS
        }
        CacheCommands::Show { topic, .. } => {
            match cache.lookup(&topic).await? {
                Some(record) => {
                    println!("{}", render::pretty(&record.result));
                    ExitCode::SUCCESS
                }
                None => {
                    eprintln!("{} no cached result for '{}'", "✗".red(), topic);
                    ExitCode::FAILURE
                }
            }
        }
        CacheCommands::Purge { topic, .. } => {
            let removed = cache.purge(topic.as_deref()).await?;
            println!("{} removed {} cached result(s)", "✓".green(), removed);
            ExitCode::SUCCESS
        }
    };

    db.close().await;
    Ok(code)
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref()).await?;
    init_tracing(&config.logging);

    match cli.command {
        Commands::Run(args) => run(config, args).await,
        Commands::Cache(command) => cache_command(config, command).await,
        Commands::SessionId {
            text,
            hash: _,
            slug,
            prefix,
        } => {
            let prefix = prefix.unwrap_or_else(|| config.workflow.session_prefix.clone());
            let id = if slug {
                slug_session_id(&prefix, &text)
            } else {
                hashed_session_id(&prefix, &text)
            };
            println!("{}", id);
            Ok(ExitCode::SUCCESS)
        }
        Commands::Config => {
            let mut shown = config;
            if shown.llm.api_key.is_some() {
                shown.llm.api_key = Some("********".to_string());
            }
            print!("{}", shown.to_toml()?);
            Ok(ExitCode::SUCCESS)
        }
        Commands::Version => {
            println!("{}", version_info());
            Ok(ExitCode::SUCCESS)
        }
    }
}
