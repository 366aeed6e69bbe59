mod config;
mod loader;
mod openai;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use polish_coordination::{
    ConfigError, EventBus, MultiPassPolisher, PolishEvent, PolishingStore, ProviderPool,
    SharedEventBus, SharedProvider,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use config::RunnerConfig;
use openai::OpenAiProvider;

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// TOML file with [polish] settings and [[endpoints]]
    #[arg(long)]
    config: PathBuf,

    /// Source-language text, blank-line-separated paragraphs
    #[arg(long)]
    original: PathBuf,

    /// Current translation, paragraph-aligned with the original
    #[arg(long)]
    translated: PathBuf,

    /// Where to write the polished translation
    #[arg(long)]
    output: Option<PathBuf>,

    /// Markdown report
    #[arg(long)]
    report: Option<PathBuf>,

    /// JSON report
    #[arg(long)]
    json: Option<PathBuf>,

    /// Session identifier (random when omitted)
    #[arg(long)]
    session_id: Option<String>,
}

fn build_pool(
    config: &RunnerConfig,
    bus: Option<SharedEventBus>,
    session_id: &str,
) -> Result<ProviderPool> {
    let mut pool = ProviderPool::new(config.polish.router_config(), bus, session_id);
    for name in config.polish.all_providers() {
        let endpoint = config
            .endpoint(&name)
            .ok_or_else(|| ConfigError::MissingProvider(name.clone()))?;
        let key = endpoint.resolve_key()?;
        let provider = OpenAiProvider::new(endpoint, key)
            .with_context(|| format!("Failed to build HTTP client for {name}"))?;
        let handle: SharedProvider = Arc::new(provider);
        pool.register_replicated(&name, &endpoint.model, handle, endpoint.instances);
    }
    Ok(pool)
}

/// Mirror bus events into the log.
fn log_events(bus: &SharedEventBus) {
    let mut rx = bus.subscribe();
    tokio::spawn(async move {
        loop {
            let event = match rx.recv().await {
                Ok(event) => event,
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!(skipped, "Event logger lagged");
                    continue;
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            };
            match &event {
                PolishEvent::Warning { message, .. } => warn!(event = "warning", "{message}"),
                PolishEvent::Progress {
                    message,
                    processed,
                    total,
                    pass_number: Some(pass),
                    ..
                } => info!(pass, processed, total, "{message}"),
                other => debug!(event = other.event_type(), "Polish event"),
            }
        }
    });
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = Args::parse();

    let mut config = RunnerConfig::from_file(&args.config)
        .with_context(|| format!("Failed to load {}", args.config.display()))?;
    config.polish.apply_env_overrides();
    config.validate().context("Invalid configuration")?;

    let original = std::fs::read_to_string(&args.original)
        .with_context(|| format!("Failed to read {}", args.original.display()))?;
    let translated = std::fs::read_to_string(&args.translated)
        .with_context(|| format!("Failed to read {}", args.translated.display()))?;
    let document = loader::load_document(&original, &translated);

    let session_id = args
        .session_id
        .clone()
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    info!(
        session_id = %session_id,
        units = document.unit_count(),
        polishable = document.polishable_count(),
        providers = ?config.polish.all_providers(),
        "Polish runner starting"
    );

    let bus = EventBus::new().shared();
    log_events(&bus);

    let pool = build_pool(&config, Some(bus.clone()), &session_id)?.shared();
    let store = if config.polish.persistence_enabled() {
        Some(
            PolishingStore::open(&config.polish.database_path)
                .await
                .context("Failed to open polishing database")?,
        )
    } else {
        None
    };

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received, stopping after the current unit");
                cancel.cancel();
            }
        });
    }

    let polisher = MultiPassPolisher::new(
        config.polish.clone(),
        Arc::clone(&pool),
        store,
        Some(bus),
        session_id,
    )?;
    let outcome = polisher.polish_document(document, cancel).await;
    pool.shutdown();
    let result = outcome.context("Polishing failed")?;

    if let Some(path) = &args.output {
        std::fs::write(path, loader::render_document(&result.final_document))
            .with_context(|| format!("Failed to write {}", path.display()))?;
        info!(path = %path.display(), "Polished text written");
    }
    if let Some(path) = &args.report {
        std::fs::write(path, result.final_report.render_markdown())
            .with_context(|| format!("Failed to write {}", path.display()))?;
        info!(path = %path.display(), "Markdown report written");
    }
    if let Some(path) = &args.json {
        let json = serde_json::to_string_pretty(&result.final_report.to_json())?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        info!(path = %path.display(), "JSON report written");
    }

    println!("{}", result.final_report.render_summary());
    println!("{}", result.all_notes.summary());
    Ok(())
}
