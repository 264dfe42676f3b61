//! Binary entry point: parses the CLI, loads configuration, initializes
//! telemetry, and dispatches to the requested entry point.

use clap::Parser;
use guardduty_azure_ingest::cli::{Cli, Command};
use guardduty_azure_ingest::{entrypoints, telemetry};
use ingest_core::config::EngineConfig;
use tracing::error;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    telemetry::init(cli.log_format);

    if let Err(error) = run(cli).await {
        error!(message = "Fatal error.", error = %error);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), ingest_core::error::IngestError> {
    let text = tokio::fs::read_to_string(&cli.config)
        .await
        .map_err(|e| ingest_core::error::IngestError::Config {
            message: format!("failed to read {}: {e}", cli.config.display()),
        })?;
    let config = EngineConfig::from_yaml(&text)?;

    match cli.command {
        Command::Serve => entrypoints::daemon::run(config).await,
        Command::RunOnce => entrypoints::scheduled::run(config).await,
        Command::HandleEvent => entrypoints::event::run(config).await,
        Command::Healthcheck => healthcheck(config).await,
    }
}

/// Builds a controller without running the full pipeline and reports its
/// initial health. A live daemon's health will differ once work is
/// in flight; this gives an operator a fast, dependency-free liveness/
/// configuration check without needing a running `serve` process to query.
async fn healthcheck(config: EngineConfig) -> Result<(), ingest_core::error::IngestError> {
    let controller = entrypoints::build_controller(config).await?;
    let report = controller.health().await;
    println!(
        "{}",
        serde_json::to_string(&report).unwrap_or_else(|_| "{}".into())
    );
    if report.status == ingest_pipeline::HealthStatus::Unhealthy {
        std::process::exit(1);
    }
    Ok(())
}
