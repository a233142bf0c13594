mod cli;
mod config;
mod dialogue;
mod error;
mod jobs;
mod llm;
mod orchestrator;
mod server;
#[cfg(test)]
mod test_support;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Command};
use config::{AppConfig, StoreKind};
use dialogue::{ConversationEngine, GenerationConfig, TemplatePromptBuilder};
use error::DialogenError;
use jobs::{FileJobStore, InMemoryJobStore, JobStore};
use llm::OpenAiClient;
use orchestrator::{JobOrchestrator, TokioSpawner};
use server::SyncResponse;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose {
        "dialogen=debug,tower_http=debug"
    } else {
        "dialogen=info,tower_http=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .init();

    let mut config = AppConfig::load(cli.config_file.as_deref())?;

    match cli.command {
        Command::Serve { bind } => {
            if let Some(bind) = bind {
                config.bind_addr = bind;
            }
            let addr = config.socket_addr()?;
            let orchestrator = build_orchestrator(&config).await?;
            server::serve(addr, orchestrator).await?;
        }
        Command::Generate {
            config: request,
            output,
        } => {
            let orchestrator = build_orchestrator(&config).await?;
            let rendered = generate_once(&orchestrator, &request).await?;
            match output {
                Some(path) => {
                    std::fs::write(&path, rendered)
                        .with_context(|| format!("failed to write {}", path.display()))?;
                    info!(path = %path.display(), "conversation written");
                }
                None => println!("{rendered}"),
            }
        }
    }

    Ok(())
}

/// Wires the shared HTTP client, LLM client, store and engine together.
async fn build_orchestrator(config: &AppConfig) -> Result<JobOrchestrator, DialogenError> {
    let http = reqwest::Client::builder()
        .connect_timeout(config.connect_timeout())
        .timeout(config.request_timeout())
        .build()
        .map_err(|e| DialogenError::Config(format!("cannot build HTTP client: {e}")))?;
    let default_key = config.has_api_key().then(|| config.api_key.clone());
    let llm = OpenAiClient::with_base_url(http, default_key, config.api_url.clone());
    let has_default_key = llm.has_default_key();

    let store: Arc<dyn JobStore> = match config.store {
        StoreKind::Memory => Arc::new(InMemoryJobStore::new()),
        StoreKind::File => Arc::new(FileJobStore::open(&config.store_dir).await?),
    };
    info!(store = ?config.store, has_default_key, "job store ready");

    let engine = ConversationEngine::new(Arc::new(llm), Arc::new(TemplatePromptBuilder));
    Ok(
        JobOrchestrator::new(store, Arc::new(engine), Arc::new(TokioSpawner))
            .with_default_key(has_default_key)
            .with_stale_after(config.stale_after()),
    )
}

/// Runs one synchronous generation from a JSON configuration file.
async fn generate_once(
    orchestrator: &JobOrchestrator,
    path: &Path,
) -> Result<String, DialogenError> {
    let raw = std::fs::read_to_string(path)?;
    let request: GenerationConfig = serde_json::from_str(&raw)?;
    request.validate().map_err(DialogenError::Config)?;

    let outcome = orchestrator.generate_sync(&request).await?;
    let response = SyncResponse {
        conversation: outcome.conversation,
        metadata: outcome.metadata,
    };
    Ok(serde_json::to_string_pretty(&response)?)
}
