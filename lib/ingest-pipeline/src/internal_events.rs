//! One struct per emission point, each owning its own log line and metric
//! update. Mirrors the teacher's `internal_events` convention
//! (`lib/codecs/src/internal_events`, `lib/file-source/src/internal_events.rs`):
//! a small `InternalEvent` trait with a single `emit` method, so a call site
//! reads as `emit(SomeEvent { .. })` rather than a scattered `tracing::`/
//! `metrics::` call pair.

use metrics::{counter, gauge, histogram};
use tracing::{debug, error, warn};

pub trait InternalEvent {
    fn emit(self);
}

pub fn emit(event: impl InternalEvent) {
    event.emit();
}

#[derive(Debug)]
pub struct ObjectsListed {
    pub bucket: String,
    pub prefix: String,
    pub count: usize,
}

impl InternalEvent for ObjectsListed {
    fn emit(self) {
        debug!(
            message = "Listed source objects.",
            bucket = %self.bucket,
            prefix = %self.prefix,
            count = self.count,
        );
        counter!("source_objects_listed_total").increment(self.count as u64);
    }
}

#[derive(Debug)]
pub struct ObjectAccessError {
    pub object: String,
    pub error: String,
}

impl InternalEvent for ObjectAccessError {
    fn emit(self) {
        error!(message = "Failed to access source object.", object = %self.object, error = %self.error);
        counter!("source_access_errors_total").increment(1);
    }
}

#[derive(Debug)]
pub struct ObjectDecryptionFailed {
    pub object: String,
    pub error: String,
}

impl InternalEvent for ObjectDecryptionFailed {
    fn emit(self) {
        error!(message = "KMS decryption failed.", object = %self.object, error = %self.error);
        counter!("source_decryption_errors_total").increment(1);
    }
}

#[derive(Debug)]
pub struct LineMalformed {
    pub object: String,
    pub line_number: u64,
    pub error: String,
}

impl InternalEvent for LineMalformed {
    fn emit(self) {
        warn!(
            message = "Skipped malformed JSONL line.",
            object = %self.object,
            line_number = self.line_number,
            error = %self.error,
        );
        counter!("decode_malformed_lines_total").increment(1);
    }
}

#[derive(Debug)]
pub struct FindingsDecoded {
    pub object: String,
    pub parsed: u64,
    pub malformed: u64,
}

impl InternalEvent for FindingsDecoded {
    fn emit(self) {
        debug!(
            message = "Finished decoding object.",
            object = %self.object,
            parsed = self.parsed,
            malformed = self.malformed,
        );
        counter!("decode_findings_parsed_total").increment(self.parsed);
    }
}

#[derive(Debug)]
pub struct DedupSuppressed {
    pub key: String,
}

impl InternalEvent for DedupSuppressed {
    fn emit(self) {
        debug!(message = "Suppressed duplicate finding.", key = %self.key);
        counter!("dedup_suppressed_total").increment(1);
    }
}

#[derive(Debug)]
pub struct DedupHitRate {
    pub hit_rate: f64,
    pub cache_len: usize,
}

impl InternalEvent for DedupHitRate {
    fn emit(self) {
        gauge!("dedup_cache_len").set(self.cache_len as f64);
        gauge!("dedup_hit_rate").set(self.hit_rate);
    }
}

#[derive(Debug)]
pub struct TransformWarning {
    pub finding_id: String,
    pub field: &'static str,
    pub message: String,
}

impl InternalEvent for TransformWarning {
    fn emit(self) {
        warn!(
            message = "Transform could not populate field.",
            finding_id = %self.finding_id,
            field = self.field,
            detail = %self.message,
        );
        counter!("transform_warnings_total").increment(1);
    }
}

#[derive(Debug)]
pub struct RecordRejectedOversized {
    pub finding_id: String,
    pub size_bytes: usize,
}

impl InternalEvent for RecordRejectedOversized {
    fn emit(self) {
        error!(
            message = "Record exceeds the hard size cap and was dead-lettered standalone.",
            finding_id = %self.finding_id,
            size_bytes = self.size_bytes,
        );
        counter!("batch_oversized_records_total").increment(1);
    }
}

#[derive(Debug)]
pub struct BatchEmitted {
    pub batch_id: String,
    pub record_count: usize,
    pub size_bytes: usize,
    pub trigger: &'static str,
}

impl InternalEvent for BatchEmitted {
    fn emit(self) {
        debug!(
            message = "Emitted batch.",
            batch_id = %self.batch_id,
            record_count = self.record_count,
            size_bytes = self.size_bytes,
            trigger = self.trigger,
        );
        counter!("batches_emitted_total").increment(1);
        histogram!("batch_record_count").record(self.record_count as f64);
        histogram!("batch_size_bytes").record(self.size_bytes as f64);
    }
}

#[derive(Debug)]
pub struct BatchQueueDepth {
    pub depth: usize,
}

impl InternalEvent for BatchQueueDepth {
    fn emit(self) {
        gauge!("batch_queue_depth").set(self.depth as f64);
    }
}

#[derive(Debug)]
pub struct IngestRetrying {
    pub batch_id: String,
    pub attempt: u32,
    pub delay_ms: u64,
    pub reason: String,
}

impl InternalEvent for IngestRetrying {
    fn emit(self) {
        warn!(
            message = "Retrying ingest after backoff.",
            batch_id = %self.batch_id,
            attempt = self.attempt,
            delay_ms = self.delay_ms,
            reason = %self.reason,
        );
        counter!("ingest_retries_total").increment(1);
    }
}

#[derive(Debug)]
pub struct IngestSucceeded {
    pub batch_id: String,
    pub accepted_records: usize,
}

impl InternalEvent for IngestSucceeded {
    fn emit(self) {
        debug!(
            message = "Batch ingested.",
            batch_id = %self.batch_id,
            accepted_records = self.accepted_records,
        );
        counter!("ingested_records_total").increment(self.accepted_records as u64);
    }
}

#[derive(Debug)]
pub struct IngestFailed {
    pub batch_id: String,
    pub error: String,
}

impl InternalEvent for IngestFailed {
    fn emit(self) {
        error!(message = "Batch ingest failed permanently.", batch_id = %self.batch_id, error = %self.error);
        counter!("ingest_failures_total").increment(1);
    }
}

#[derive(Debug)]
pub struct TokenRefreshed {
    pub expires_in_secs: i64,
}

impl InternalEvent for TokenRefreshed {
    fn emit(self) {
        debug!(message = "Refreshed Azure access token.", expires_in_secs = self.expires_in_secs);
        counter!("token_refreshes_total").increment(1);
    }
}

#[derive(Debug)]
pub struct TokenRefreshFailed {
    pub error: String,
}

impl InternalEvent for TokenRefreshFailed {
    fn emit(self) {
        error!(message = "Failed to refresh Azure access token.", error = %self.error);
        counter!("token_refresh_failures_total").increment(1);
    }
}

#[derive(Debug)]
pub struct BatchDeadLettered {
    pub batch_id: String,
    pub record_count: usize,
    pub reason: String,
}

impl InternalEvent for BatchDeadLettered {
    fn emit(self) {
        warn!(
            message = "Batch dead-lettered.",
            batch_id = %self.batch_id,
            record_count = self.record_count,
            reason = %self.reason,
        );
        counter!("dead_lettered_records_total").increment(self.record_count as u64);
    }
}

#[derive(Debug)]
pub struct DeadLetterWriteFailed {
    pub batch_id: String,
    pub error: String,
}

impl InternalEvent for DeadLetterWriteFailed {
    fn emit(self) {
        error!(
            message = "Failed to write dead-letter payload; batch is lost.",
            batch_id = %self.batch_id,
            error = %self.error,
        );
        counter!("dead_letter_write_failures_total").increment(1);
    }
}
