//! C10: Pipeline Controller — owns component lifecycle, wires the
//! object-worker and ingest-worker pools together, and coordinates graceful
//! shutdown. See `spec.md` §4.10 and §5.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use ingest_core::batch::{Batch, BatchStatus};
use ingest_core::config::EngineConfig;
use ingest_core::error::IngestError;
use ingest_core::object_ref::ObjectRef;
use ingest_core::traits::{DeadLetterSink, ObjectSource, Sink};
use serde::Serialize;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::batch::Batcher;
use crate::dedup::Deduplicator;
use crate::internal_events::{emit, ObjectAccessError};
use crate::retry::execute_with_retry;
use crate::{decode, transform};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthStatus {
    /// Ordering used to roll several component probes up into one overall
    /// status: the worst of the bunch wins.
    fn severity(self) -> u8 {
        match self {
            HealthStatus::Healthy => 0,
            HealthStatus::Degraded => 1,
            HealthStatus::Unhealthy => 2,
        }
    }

    fn worst_of(self, other: HealthStatus) -> HealthStatus {
        if other.severity() > self.severity() {
            other
        } else {
            self
        }
    }
}

/// One component's probe result, per `spec.md` §6's health interface:
/// "per-component status with last-check timestamp".
#[derive(Debug, Clone, Serialize)]
pub struct ComponentHealth {
    pub name: &'static str,
    pub status: HealthStatus,
    pub last_checked: chrono::DateTime<chrono::Utc>,
}

/// The health probe surface from `spec.md` §6: overall status, per-component
/// status with last-check timestamp, uptime, and version.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub version: &'static str,
    pub uptime_secs: u64,
    pub components: Vec<ComponentHealth>,
    pub batch_queue_depth: usize,
    pub batch_queue_capacity: usize,
    pub dedup_hit_rate: f64,
}

/// Aggregate counters exposed through the metrics interface, per
/// `spec.md` §7's "user-visible behavior" note.
#[derive(Default)]
pub struct Metrics {
    pub received: AtomicU64,
    pub deduplicated: AtomicU64,
    pub decode_errors: AtomicU64,
    pub transformed: AtomicU64,
    pub ingested: AtomicU64,
    pub retried: AtomicU64,
    pub failed: AtomicU64,
    pub dead_lettered: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsSnapshot {
    pub received: u64,
    pub deduplicated: u64,
    pub decode_errors: u64,
    pub transformed: u64,
    pub ingested: u64,
    pub retried: u64,
    pub failed: u64,
    pub dead_lettered: u64,
}

impl Metrics {
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            received: self.received.load(Ordering::Relaxed),
            deduplicated: self.deduplicated.load(Ordering::Relaxed),
            decode_errors: self.decode_errors.load(Ordering::Relaxed),
            transformed: self.transformed.load(Ordering::Relaxed),
            ingested: self.ingested.load(Ordering::Relaxed),
            retried: self.retried.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            dead_lettered: self.dead_lettered.load(Ordering::Relaxed),
        }
    }
}

/// Owns the whole C1→C9 dataflow. Built once per process and driven by one
/// of the three entry points (`serve`/`run-once`/`handle-event`).
pub struct Controller {
    config: EngineConfig,
    source: Arc<dyn ObjectSource>,
    sink: Arc<dyn Sink>,
    dead_letter: Arc<dyn DeadLetterSink>,
    dedup: Arc<Deduplicator>,
    batcher: Arc<Batcher>,
    metrics: Arc<Metrics>,
    cancel: CancellationToken,
    started_at: std::time::Instant,
    object_tx: mpsc::Sender<ObjectRef>,
    object_rx: Mutex<Option<mpsc::Receiver<ObjectRef>>>,
    batch_tx: mpsc::Sender<Batch>,
    batch_rx: Mutex<Option<mpsc::Receiver<Batch>>>,
}

impl Controller {
    pub fn new(
        config: EngineConfig,
        source: Arc<dyn ObjectSource>,
        sink: Arc<dyn Sink>,
        dead_letter: Arc<dyn DeadLetterSink>,
    ) -> Self {
        let (object_tx, object_rx) = mpsc::channel(config.concurrency.input_queue_depth);
        let (batch_tx, batch_rx) = mpsc::channel(config.concurrency.batch_queue_depth);
        let dedup = Arc::new(Deduplicator::new(&config.deduplication));
        let batcher = Arc::new(Batcher::new(config.batch.clone()));

        Self {
            config,
            source,
            sink,
            dead_letter,
            dedup,
            batcher,
            metrics: Arc::new(Metrics::default()),
            cancel: CancellationToken::new(),
            started_at: std::time::Instant::now(),
            object_tx,
            object_rx: Mutex::new(Some(object_rx)),
            batch_tx,
            batch_rx: Mutex::new(Some(batch_rx)),
        }
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn metrics(&self) -> Arc<Metrics> {
        self.metrics.clone()
    }

    /// Submits one object for processing. Returns a `Transient` error when
    /// the bounded input queue is full, giving external triggers a busy
    /// signal to back off on rather than blocking indefinitely
    /// (`spec.md` §5, backpressure).
    pub fn enqueue(&self, object: ObjectRef) -> Result<(), IngestError> {
        self.object_tx.try_send(object).map_err(|_| IngestError::Transient {
            message: "input queue is full".into(),
        })
    }

    /// Lists the source once and enqueues every object found. Used by the
    /// `run-once` entry point.
    pub async fn enqueue_from_listing(&self) -> Result<usize, IngestError> {
        let objects = self
            .source
            .list(&self.config.source.bucket, &self.config.source.prefix, usize::MAX)
            .await?;
        let count = objects.len();
        for object in objects {
            self.enqueue(object)?;
        }
        Ok(count)
    }

    /// Whether both the object and batch queues are currently empty. A
    /// heuristic used by the `run-once` entry point to decide when a
    /// one-shot listing has fully drained and it is safe to signal
    /// shutdown — it does not prove in-flight work has finished, only that
    /// nothing is queued, but object/batch processing itself does not
    /// re-enqueue, so the queues stay empty once drained.
    pub fn queues_idle(&self) -> bool {
        self.object_tx.capacity() == self.config.concurrency.input_queue_depth
            && self.batch_tx.capacity() == self.config.concurrency.batch_queue_depth
    }

    /// Derives the aggregate status from the four component probes named in
    /// `spec.md` §4.10: Source reachability (a cheap `list` call), Sink
    /// reachability (whether recent ingest attempts have been failing),
    /// Batcher queue depth (degraded above a configurable threshold), and
    /// Dedup hit rate (informational only — it never affects the rollup).
    pub async fn health(&self) -> HealthReport {
        let now = chrono::Utc::now();

        let source_status = match self
            .source
            .list(&self.config.source.bucket, &self.config.source.prefix, 1)
            .await
        {
            Ok(_) => HealthStatus::Healthy,
            Err(_) => HealthStatus::Unhealthy,
        };

        let snapshot = self.metrics.snapshot();
        let sink_status = if snapshot.failed == 0 {
            HealthStatus::Healthy
        } else if snapshot.ingested > 0 {
            HealthStatus::Degraded
        } else {
            HealthStatus::Unhealthy
        };

        let depth = self.batch_tx.capacity();
        let capacity = self.config.concurrency.batch_queue_depth;
        let used = capacity.saturating_sub(depth);
        let degraded_threshold = capacity * 3 / 4;
        let batcher_status = if used >= capacity {
            HealthStatus::Unhealthy
        } else if used >= degraded_threshold {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        };

        let dedup_hit_rate = if snapshot.received == 0 {
            0.0
        } else {
            snapshot.deduplicated as f64 / snapshot.received as f64
        };

        let components = vec![
            ComponentHealth {
                name: "source",
                status: source_status,
                last_checked: now,
            },
            ComponentHealth {
                name: "sink",
                status: sink_status,
                last_checked: now,
            },
            ComponentHealth {
                name: "batcher_queue",
                status: batcher_status,
                last_checked: now,
            },
            ComponentHealth {
                name: "dedup",
                status: HealthStatus::Healthy,
                last_checked: now,
            },
        ];

        let status = components
            .iter()
            .fold(HealthStatus::Healthy, |acc, c| acc.worst_of(c.status));

        HealthReport {
            status,
            version: env!("CARGO_PKG_VERSION"),
            uptime_secs: self.started_at.elapsed().as_secs(),
            components,
            batch_queue_depth: used,
            batch_queue_capacity: capacity,
            dedup_hit_rate,
        }
    }

    /// Drives the full pipeline until `token.cancel()` is called and the
    /// shutdown deadline elapses. Spawns the object-worker pool, a
    /// flush-interval ticker, the ingest-worker pool, and the dead-letter
    /// drain, then waits for graceful drain.
    pub async fn run(self: Arc<Self>) {
        let object_rx = self
            .object_rx
            .lock()
            .await
            .take()
            .expect("Controller::run called more than once");
        let batch_rx = self
            .batch_rx
            .lock()
            .await
            .take()
            .expect("Controller::run called more than once");

        let mut object_workers = Vec::new();
        let object_rx = Arc::new(Mutex::new(object_rx));
        for _ in 0..self.config.concurrency.object_workers {
            let this = self.clone();
            let object_rx = object_rx.clone();
            object_workers.push(tokio::spawn(async move { this.run_object_worker(object_rx).await }));
        }

        let flush_task = {
            let this = self.clone();
            tokio::spawn(async move { this.run_flush_ticker().await })
        };

        let (dlq_tx, mut dlq_rx) = mpsc::unbounded_channel::<(Batch, IngestError)>();
        let dead_letter_task = {
            let this = self.clone();
            tokio::spawn(async move {
                while let Some((mut batch, error)) = dlq_rx.recv().await {
                    this.finalize_dead_letter(&mut batch, error).await;
                }
            })
        };

        let mut ingest_workers = Vec::new();
        let batch_rx = Arc::new(Mutex::new(batch_rx));
        for _ in 0..self.config.concurrency.ingest_workers {
            let this = self.clone();
            let batch_rx = batch_rx.clone();
            let dlq_tx = dlq_tx.clone();
            ingest_workers.push(tokio::spawn(async move {
                this.run_ingest_worker(batch_rx, dlq_tx).await
            }));
        }
        drop(dlq_tx);

        self.cancel.cancelled().await;
        info!(message = "Shutdown signal received; draining pipeline.");

        for worker in object_workers {
            let _ = worker.await;
        }
        if let Some(batch) = self.batcher.drain() {
            let _ = self.batch_tx.send(batch).await;
        }
        flush_task.abort();

        let deadline = std::time::Duration::from_secs(self.config.shutdown_deadline_secs);
        let drained = tokio::time::timeout(deadline, async {
            for worker in ingest_workers {
                let _ = worker.await;
            }
        })
        .await;
        if drained.is_err() {
            warn!(message = "Shutdown deadline exceeded; remaining batches will be dead-lettered.");
        }

        // `spec.md` §5(e): batches still sitting in the queue at the deadline
        // are dead-lettered rather than silently dropped with the channel.
        {
            let mut rx = batch_rx.lock().await;
            while let Ok(mut batch) = rx.try_recv() {
                let _ = batch.transition(BatchStatus::InFlight);
                let _ = batch.transition(BatchStatus::Failed);
                self.finalize_dead_letter(
                    &mut batch,
                    IngestError::Transient {
                        message: "shutdown before batch could be ingested".into(),
                    },
                )
                .await;
            }
        }

        drop(batch_rx);
        let _ = dead_letter_task.await;
    }

    async fn run_object_worker(&self, object_rx: Arc<Mutex<mpsc::Receiver<ObjectRef>>>) {
        loop {
            let object = {
                let mut rx = object_rx.lock().await;
                tokio::select! {
                    object = rx.recv() => object,
                    _ = self.cancel.cancelled() => None,
                }
            };
            let Some(object) = object else { break };
            if let Err(error) = self.process_object(&object).await {
                emit(ObjectAccessError {
                    object: object.to_string(),
                    error: error.to_string(),
                });
            }
        }
    }

    async fn process_object(&self, object: &ObjectRef) -> Result<(), IngestError> {
        let reader = self.source.fetch(object).await?;
        let outcome = decode::decode_object(reader, &object.to_string(), true).await?;

        self.metrics
            .received
            .fetch_add(outcome.findings.len() as u64, Ordering::Relaxed);
        self.metrics
            .decode_errors
            .fetch_add(outcome.malformed_lines, Ordering::Relaxed);

        let findings = if self.config.deduplication.enabled {
            let before = outcome.findings.len();
            let kept = self.dedup.filter(outcome.findings);
            self.metrics
                .deduplicated
                .fetch_add((before - kept.len()) as u64, Ordering::Relaxed);
            kept
        } else {
            outcome.findings
        };

        for finding in &findings {
            let record = transform::transform(finding, self.config.normalization.enabled);
            self.metrics.transformed.fetch_add(1, Ordering::Relaxed);
            if let Some(batch) = self.batcher.submit(record)? {
                self.batch_tx.send(batch).await.map_err(|_| IngestError::Transient {
                    message: "batch queue closed".into(),
                })?;
            }
        }
        Ok(())
    }

    async fn run_flush_ticker(&self) {
        let mut interval =
            tokio::time::interval(std::time::Duration::from_millis(self.config.batch.flush_interval_ms.max(1)));
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Some(batch) = self.batcher.poll_flush_interval() {
                        if self.batch_tx.send(batch).await.is_err() {
                            break;
                        }
                    }
                }
                _ = self.cancel.cancelled() => break,
            }
        }
    }

    async fn run_ingest_worker(
        &self,
        batch_rx: Arc<Mutex<mpsc::Receiver<Batch>>>,
        dlq_tx: mpsc::UnboundedSender<(Batch, IngestError)>,
    ) {
        loop {
            let batch = {
                let mut rx = batch_rx.lock().await;
                tokio::select! {
                    batch = rx.recv() => batch,
                    _ = self.cancel.cancelled() => None,
                }
            };
            let Some(mut batch) = batch else { break };

            if batch.transition(BatchStatus::InFlight).is_err() {
                continue;
            }

            let stream_name = self.config.sink.dcr_stream_name.clone();
            let sink = self.sink.clone();
            let retry_config = self.config.retry.clone();
            let cancel = self.cancel.clone();
            let batch_id = batch.id.to_string();
            let records = batch.records.clone();

            let mut last_attempt = 0u32;
            let result = execute_with_retry(&retry_config, &batch_id, &cancel, |attempt| {
                last_attempt = attempt;
                if attempt > 0 {
                    self.metrics.retried.fetch_add(1, Ordering::Relaxed);
                }
                let sink = sink.clone();
                let stream_name = stream_name.clone();
                let records = records.clone();
                async move { sink.ingest(&stream_name, &records).await }
            })
            .await;

            batch.attempt = last_attempt;

            match result {
                Ok(outcome) => {
                    let _ = batch.transition(BatchStatus::Completed);
                    self.metrics
                        .ingested
                        .fetch_add(outcome.accepted_records as u64, Ordering::Relaxed);
                }
                Err(error) => {
                    let _ = batch.transition(BatchStatus::Failed);
                    self.metrics.failed.fetch_add(1, Ordering::Relaxed);
                    if dlq_tx.send((batch, error)).is_err() {
                        error!(message = "Dead-letter channel closed; batch dropped.");
                    }
                }
            }
        }
    }

    async fn finalize_dead_letter(&self, batch: &mut Batch, error: IngestError) {
        match self.dead_letter.dead_letter(batch, &error).await {
            Ok(()) => {
                let _ = batch.transition(BatchStatus::DeadLettered);
                self.metrics
                    .dead_lettered
                    .fetch_add(batch.record_count() as u64, Ordering::Relaxed);
            }
            Err(dlq_error) => {
                error!(
                    message = "Failed to dead-letter batch; batch is lost.",
                    batch_id = %batch.id,
                    error = %dlq_error,
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ingest_core::config::{AzureAuthConfig, BatchConfig, SinkConfig, SourceConfig};
    use ingest_core::object_ref::ObjectRef;
    use ingest_core::testing::{MockDeadLetter, MockSink, MockSource};
    use ingest_core::traits::IngestResult;

    /// `process_object` always decodes as gzip (`spec.md` §4.1), so fixture
    /// bodies fed to `MockSource` here must be gzip-compressed.
    fn gzip(bytes: &[u8]) -> Vec<u8> {
        use std::io::Write;

        use flate2::write::GzEncoder;
        use flate2::Compression;

        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(bytes).unwrap();
        encoder.finish().unwrap()
    }

    fn config() -> EngineConfig {
        EngineConfig {
            source: SourceConfig {
                bucket: "b".into(),
                prefix: String::new(),
                kms_key_id: None,
                poll_interval_secs: 60,
            },
            sink: SinkConfig {
                azure_endpoint: "https://example".into(),
                dcr_immutable_id: "dcr-1".into(),
                dcr_stream_name: "Custom-Stream".into(),
                request_timeout_secs: 30,
            },
            azure: AzureAuthConfig {
                tenant_id: "t".into(),
                client_id: "c".into(),
                client_secret: "s".into(),
            },
            batch: BatchConfig {
                batch_size: 100,
                ..BatchConfig::default()
            },
            retry: Default::default(),
            deduplication: Default::default(),
            normalization: Default::default(),
            dead_letter: Default::default(),
            concurrency: Default::default(),
            shutdown_deadline_secs: 1,
        }
    }

    #[tokio::test]
    async fn happy_path_one_object_one_batch_reaches_sink() {
        let source = Arc::new(MockSource::new());
        let mut object = ObjectRef::new("b", "k1");
        object.size = 4;
        source.put(object.clone(), gzip(b"{\"id\":\"ab-1\",\"severity\":8.0}\n"));

        let sink = Arc::new(MockSink::new());
        let dlq = Arc::new(MockDeadLetter::new());

        let controller = Arc::new(Controller::new(config(), source, sink.clone(), dlq));
        controller.enqueue(object).unwrap();

        let cancel = controller.cancellation_token();
        let handle = tokio::spawn(controller.clone().run());
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        cancel.cancel();
        let _ = tokio::time::timeout(std::time::Duration::from_secs(2), handle).await;

        let received = sink.received.lock().unwrap();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0][0].finding_id, "ab-1");
    }

    #[tokio::test]
    async fn sink_rejection_reaches_dead_letter() {
        let source = Arc::new(MockSource::new());
        let object = ObjectRef::new("b", "k1");
        source.put(object.clone(), gzip(b"{\"id\":\"ab-1\"}\n"));

        let sink = Arc::new(MockSink::new());
        sink.push_response(Err(IngestError::SinkReject {
            status: 400,
            message: "bad".into(),
        }));
        let dlq = Arc::new(MockDeadLetter::new());

        let mut cfg = config();
        cfg.retry.max_retries = 0;
        let controller = Arc::new(Controller::new(cfg, source, sink, dlq.clone()));
        controller.enqueue(object).unwrap();

        let cancel = controller.cancellation_token();
        let handle = tokio::spawn(controller.clone().run());
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        cancel.cancel();
        let _ = tokio::time::timeout(std::time::Duration::from_secs(2), handle).await;

        assert_eq!(dlq.entries.lock().unwrap().len(), 1);
    }

    #[allow(dead_code)]
    fn assert_ingest_result_shape(_: IngestResult) {}
}
