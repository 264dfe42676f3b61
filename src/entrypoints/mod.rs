//! The three ways this engine is driven, per `SPEC_FULL.md` §12. Each
//! entrypoint builds one [`Controller`] from an [`EngineConfig`] and differs
//! only in how it supplies `ObjectRef`s to it.

pub mod daemon;
pub mod event;
pub mod scheduled;

use std::sync::Arc;

use ingest_core::config::{DeadLetterDestination, EngineConfig};
use ingest_core::error::IngestError;
use ingest_pipeline::dead_letter::DeadLetterWriter;
use ingest_pipeline::sink::AzureMonitorLogsSink;
use ingest_pipeline::source::S3Source;
use ingest_pipeline::token::TokenCache;
use ingest_pipeline::Controller;

/// Wires up the concrete C1/C7/C8/C9 implementations against AWS/Azure and
/// returns a fresh, not-yet-running [`Controller`]. Shared by all three
/// entrypoints so they stay identical apart from their object-supply loop.
pub async fn build_controller(config: EngineConfig) -> Result<Arc<Controller>, IngestError> {
    let source = Arc::new(S3Source::from_env().await);

    let tokens = Arc::new(TokenCache::new(&config.azure));
    let sink = Arc::new(AzureMonitorLogsSink::new(&config.sink, tokens)?);

    let dlq_s3_client = match &config.dead_letter.destination {
        DeadLetterDestination::S3 { .. } => {
            let shared = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
            Some(aws_sdk_s3::Client::new(&shared))
        }
        DeadLetterDestination::None | DeadLetterDestination::File(_) => None,
    };
    let dead_letter = Arc::new(DeadLetterWriter::new(
        config.dead_letter.destination.clone(),
        dlq_s3_client,
    ));

    Ok(Arc::new(Controller::new(config, source, sink, dead_letter)))
}

/// Waits for SIGINT, or SIGTERM where the platform supports it, then returns.
#[cfg(unix)]
async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = sigterm.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
