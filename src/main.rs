//! PR Validator
//!
//! Runs the pull request review orchestrator either as an HTTP service or
//! against a single event.
//!
//! # Usage
//! ```bash
//! # Serve events on 0.0.0.0:8080
//! pr-validator --store-bucket pr-state serve
//!
//! # Handle one event from a file (or stdin)
//! pr-validator --store-bucket pr-state handle --file event.json
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use pr_validator::aws::{
    AwsContext, CodeCommitClient, CodePipelineClient, CredentialsProvider, S3Client,
};
use pr_validator::config::{Cli, Commands, LogFormat};
use pr_validator::server::{self, AppState};
use pr_validator::{EventEnvelope, EventHandler, HandlerSettings};

// ============================================================
// Main Entry Point
// ============================================================

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.verbose, cli.log_format);

    info!(
        region = %cli.region,
        bucket = %cli.store_bucket,
        "PR validator starting"
    );

    let credentials =
        CredentialsProvider::from_env().context("Failed to configure AWS credentials")?;
    info!(source = credentials.source_name(), "AWS credential source selected");

    let context = Arc::new(AwsContext::new(
        credentials,
        cli.region.clone(),
        cli.endpoint_url.clone(),
        cli.http_timeout(),
    )?);
    context
        .credentials()
        .await
        .context("Failed to load AWS credentials")?;

    let handler = Arc::new(EventHandler::new(
        Arc::new(CodeCommitClient::new(context.clone())),
        Arc::new(CodePipelineClient::new(context.clone())),
        Arc::new(S3Client::new(context)),
        HandlerSettings {
            bucket: cli.store_bucket.clone(),
            region: cli.region.clone(),
        },
    ));

    match cli.command {
        Commands::Serve {
            bind,
            webhook_secret,
        } => {
            if webhook_secret.is_none() {
                warn!("WEBHOOK_SECRET not set; signature verification disabled.");
            }

            let app = server::router(AppState {
                handler,
                webhook_secret: webhook_secret.map(String::into_bytes),
            });

            info!("pr-validator listening on {}", bind);
            let listener = tokio::net::TcpListener::bind(bind)
                .await
                .with_context(|| format!("Failed to bind {}", bind))?;
            axum::serve(listener, app).await?;
        }

        Commands::Handle { file } => {
            let envelope = load_envelope(file.as_deref())?;
            let outcome = handler.handle(envelope).await?;
            println!("{}", outcome.status());
        }
    }

    Ok(())
}

fn init_tracing(verbose: bool, format: LogFormat) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);

    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}

/// Read an envelope from `path`, or stdin when no path is given
fn load_envelope(path: Option<&Path>) -> Result<EventEnvelope> {
    let raw = match path {
        Some(path) => std::fs::read(path)
            .with_context(|| format!("Failed to read event from {}", path.display()))?,
        None => {
            let mut raw = Vec::new();
            std::io::stdin()
                .read_to_end(&mut raw)
                .context("Failed to read event from stdin")?;
            raw
        }
    };

    EventEnvelope::from_slice(&raw).context("Failed to decode event envelope")
}
