//! chartwatchd - webhook server for Kubernetes API compatibility audits.
//!
//! Settings come from the environment, see `chartwatch::config::Settings`.

#![forbid(unsafe_code)]

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use log::{info, warn};

use chartwatch::config::{logging_from_env, ConfigSchema, ProcessEnv, SecureContext, Settings};
use chartwatch::{create_router, init_logging, CompatibilityOrchestrator, SystemRunner, WebhookPipeline};

#[derive(Parser)]
#[command(name = "chartwatchd")]
#[command(author, version, about = "Kubernetes API compatibility webhook server")]
struct Cli {
    /// Listen address, overriding 0.0.0.0:$PORT
    #[arg(long)]
    listen: Option<SocketAddr>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let (log_level, log_format) = logging_from_env(&ProcessEnv);
    init_logging(&log_level, &log_format).context("Failed to initialize logging")?;

    let context = SecureContext::from_env(&ProcessEnv).context("Failed to load configuration")?;
    let settings = context.settings;
    settings.validate().context("Invalid configuration")?;

    if context.default_key_used {
        warn!("ENCRYPTION_KEY is not set, using the built-in default passphrase; set it in production");
    }
    info!("Configuration loaded:\n{}", settings.to_redacted_json());
    info!("Encrypted fields: {:?}", Settings::encrypted_fields());
    for (env, field) in Settings::encrypted_env_vars() {
        info!("Encrypted environment variable {} -> {}", env, field);
    }

    std::fs::create_dir_all(&settings.working_dir)
        .with_context(|| format!("Failed to create working directory {}", settings.working_dir))?;

    let addr = cli
        .listen
        .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], settings.port)));

    let orchestrator = CompatibilityOrchestrator::new(&settings, Arc::new(SystemRunner));
    let pipeline = WebhookPipeline::new(Arc::new(settings), Arc::new(orchestrator));
    let router = create_router(Arc::new(pipeline));

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Webhook server listening on {}", addr);

    axum::serve(listener, router).await.context("Server error")?;
    Ok(())
}
