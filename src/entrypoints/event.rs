//! `handle-event`: reads `{"bucket": ..., "key": ...}` JSON lines from
//! stdin and processes exactly those objects, then exits. Suited to
//! embedding behind an external event source (e.g. an S3 event
//! notification forwarded by a queue consumer).

use std::time::Duration;

use ingest_core::error::IngestError;
use ingest_core::object_ref::ObjectRef;
use ingest_core::config::EngineConfig;
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use super::build_controller;

const POLL_INTERVAL: Duration = Duration::from_millis(200);
const IDLE_CONFIRMATIONS: u32 = 3;

#[derive(Deserialize)]
struct EventLine {
    bucket: String,
    key: String,
}

pub async fn run(config: EngineConfig) -> Result<(), IngestError> {
    let controller = build_controller(config).await?;
    let cancel = controller.cancellation_token();
    let pipeline = tokio::spawn(controller.clone().run());

    let stdin = BufReader::new(tokio::io::stdin());
    let mut lines = stdin.lines();
    let mut enqueued = 0usize;
    while let Some(line) = lines.next_line().await.map_err(|e| IngestError::Config {
        message: format!("failed to read stdin: {e}"),
    })? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<EventLine>(line) {
            Ok(event) => {
                let object = ObjectRef::new(event.bucket, event.key);
                if controller.enqueue(object).is_ok() {
                    enqueued += 1;
                } else {
                    warn!(message = "Input queue full; dropping event.", line);
                }
            }
            Err(error) => warn!(message = "Skipping malformed event line.", line, error = %error),
        }
    }
    info!(message = "Stdin exhausted.", enqueued);

    let mut idle_streak = 0;
    while idle_streak < IDLE_CONFIRMATIONS {
        tokio::time::sleep(POLL_INTERVAL).await;
        if controller.queues_idle() {
            idle_streak += 1;
        } else {
            idle_streak = 0;
        }
    }

    cancel.cancel();
    let _ = pipeline.await;
    Ok(())
}
