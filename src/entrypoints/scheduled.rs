//! `run-once`: lists the source exactly once, drains the resulting objects
//! through the pipeline, and exits. Suited to a scheduled/cron invocation
//! rather than a long-running process.

use std::time::Duration;

use ingest_core::config::EngineConfig;
use ingest_core::error::IngestError;
use tracing::info;

use super::build_controller;

const POLL_INTERVAL: Duration = Duration::from_millis(200);
const IDLE_CONFIRMATIONS: u32 = 3;

pub async fn run(config: EngineConfig) -> Result<(), IngestError> {
    let controller = build_controller(config).await?;
    let cancel = controller.cancellation_token();
    let pipeline = tokio::spawn(controller.clone().run());

    let count = controller.enqueue_from_listing().await?;
    info!(message = "Listed source for one-shot run.", count);

    let mut idle_streak = 0;
    while idle_streak < IDLE_CONFIRMATIONS {
        tokio::time::sleep(POLL_INTERVAL).await;
        if controller.queues_idle() {
            idle_streak += 1;
        } else {
            idle_streak = 0;
        }
    }

    info!(message = "Queues drained; signaling shutdown.");
    cancel.cancel();
    let _ = pipeline.await;
    Ok(())
}
