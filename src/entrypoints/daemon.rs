//! `serve`: the long-running daemon entry point. Polls the source on
//! `source.pollIntervalSecs` and feeds every object it finds into the
//! controller until a shutdown signal arrives, then drains gracefully.

use std::time::Duration;

use ingest_core::config::EngineConfig;
use ingest_core::error::IngestError;
use tracing::{info, warn};

use super::{build_controller, wait_for_shutdown_signal};

pub async fn run(config: EngineConfig) -> Result<(), IngestError> {
    let poll_interval = Duration::from_secs(config.source.poll_interval_secs.max(1));
    let controller = build_controller(config).await?;
    let cancel = controller.cancellation_token();

    let pipeline = tokio::spawn(controller.clone().run());

    let poller = {
        let controller = controller.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(poll_interval) => {}
                    _ = cancel.cancelled() => break,
                }
                match controller.enqueue_from_listing().await {
                    Ok(count) => info!(message = "Polled source.", count),
                    Err(error) => warn!(message = "Failed to list source objects.", error = %error),
                }
            }
        })
    };

    wait_for_shutdown_signal().await;
    info!(message = "Shutdown signal received; stopping poller and draining pipeline.");
    cancel.cancel();

    let _ = poller.await;
    let _ = pipeline.await;
    Ok(())
}
