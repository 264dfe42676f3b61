//! C5: Batcher — accumulates records into [`Batch`]es, emitting on count,
//! size, flush-interval, or drain triggers. See `spec.md` §4.5.

use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use ingest_core::batch::Batch;
use ingest_core::config::BatchConfig;
use ingest_core::error::IngestError;
use ingest_core::finding::TargetRecord;

use crate::internal_events::{emit, BatchEmitted, BatchQueueDepth, RecordRejectedOversized};

struct BatcherState {
    records: Vec<TargetRecord>,
    first_seen: Option<DateTime<Utc>>,
}

/// Buffers submitted records under a producer-side mutex; emission swaps the
/// buffer out atomically, per `spec.md` §5's mutation-policy note.
pub struct Batcher {
    config: BatchConfig,
    state: Mutex<BatcherState>,
}

impl Batcher {
    pub fn new(config: BatchConfig) -> Self {
        Self {
            config,
            state: Mutex::new(BatcherState {
                records: Vec::new(),
                first_seen: None,
            }),
        }
    }

    /// Submits one record. Returns `Ok(Some(batch))` when a count or size
    /// trigger fires as a result of this submission, `Ok(None)` otherwise.
    /// A record that alone would exceed the hard cap is rejected without
    /// ever entering the buffer (`spec.md` §4.5 invariant).
    pub fn submit(&self, record: TargetRecord) -> Result<Option<Batch>, IngestError> {
        let size = record.estimated_size();
        if size + 2 > self.config.hard_cap_bytes {
            emit(RecordRejectedOversized {
                finding_id: record.finding_id.clone(),
                size_bytes: size,
            });
            return Err(IngestError::Schema {
                message: format!(
                    "record {} ({size} bytes) exceeds the {}-byte hard cap",
                    record.finding_id, self.config.hard_cap_bytes
                ),
            });
        }

        let mut state = self.state.lock().unwrap();
        if state.first_seen.is_none() {
            state.first_seen = Some(Utc::now());
        }
        state.records.push(record);

        let trigger = if state.records.len() >= self.config.batch_size {
            Some("count")
        } else if records_size(&state.records) >= self.config.soft_cap_bytes {
            Some("size")
        } else {
            None
        };

        let depth = state.records.len();
        let batch = trigger.map(|trigger| {
            let records = std::mem::take(&mut state.records);
            state.first_seen = None;
            (records, trigger)
        });
        drop(state);

        emit(BatchQueueDepth { depth });
        Ok(batch.map(|(records, trigger)| self.emit_batch(records, trigger)))
    }

    /// Called periodically by the controller; emits the current buffer if
    /// it has aged past `flushIntervalMs` and is non-empty.
    pub fn poll_flush_interval(&self) -> Option<Batch> {
        let mut state = self.state.lock().unwrap();
        let first_seen = state.first_seen?;
        let age = Utc::now().signed_duration_since(first_seen);
        if age < Duration::milliseconds(self.config.flush_interval_ms as i64) {
            return None;
        }
        if state.records.is_empty() {
            return None;
        }
        let records = std::mem::take(&mut state.records);
        state.first_seen = None;
        drop(state);
        Some(self.emit_batch(records, "flush_interval"))
    }

    /// Forces emission of the current buffer regardless of triggers, for
    /// graceful shutdown (`spec.md` §5, flush-on-drain).
    pub fn drain(&self) -> Option<Batch> {
        let mut state = self.state.lock().unwrap();
        if state.records.is_empty() {
            return None;
        }
        let records = std::mem::take(&mut state.records);
        state.first_seen = None;
        drop(state);
        Some(self.emit_batch(records, "drain"))
    }

    fn emit_batch(&self, records: Vec<TargetRecord>, trigger: &'static str) -> Batch {
        let batch = Batch::new(records);
        emit(BatchEmitted {
            batch_id: batch.id.to_string(),
            record_count: batch.record_count(),
            size_bytes: batch.estimated_size(),
            trigger,
        });
        batch
    }
}

fn records_size(records: &[TargetRecord]) -> usize {
    let elements: usize = records.iter().map(TargetRecord::estimated_size).sum();
    elements + records.len().saturating_sub(1) + 2
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> BatchConfig {
        BatchConfig {
            batch_size: 3,
            soft_cap_bytes: 10_000,
            hard_cap_bytes: 20_000,
            flush_interval_ms: 50,
        }
    }

    fn record(id: &str) -> TargetRecord {
        TargetRecord {
            time_generated: "2024-01-01T00:00:00Z".into(),
            finding_id: id.into(),
            account_id: "123456789012".into(),
            region: "us-east-1".into(),
            severity: 5.0,
            finding_type: "x".into(),
            raw_json: "{}".into(),
            title: String::new(),
            description: String::new(),
            service: String::new(),
            resource_type: String::new(),
            instance_id: String::new(),
            remote_ip_address: String::new(),
            remote_ip_country: String::new(),
            action_type: String::new(),
            threat_names: String::new(),
            created_at: String::new(),
            updated_at: String::new(),
            event_first_seen: String::new(),
            event_last_seen: String::new(),
            count: String::new(),
            archived: String::new(),
        }
    }

    #[test]
    fn emits_on_count_trigger_preserving_order() {
        let batcher = Batcher::new(config());
        assert!(batcher.submit(record("a")).unwrap().is_none());
        assert!(batcher.submit(record("b")).unwrap().is_none());
        let batch = batcher.submit(record("c")).unwrap().unwrap();
        assert_eq!(batch.record_count(), 3);
        assert_eq!(batch.records[0].finding_id, "a");
        assert_eq!(batch.records[2].finding_id, "c");
    }

    #[test]
    fn flush_interval_emits_partial_buffer_after_aging() {
        let mut cfg = config();
        cfg.flush_interval_ms = 0;
        let batcher = Batcher::new(cfg);
        batcher.submit(record("a")).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(5));
        let batch = batcher.poll_flush_interval().unwrap();
        assert_eq!(batch.record_count(), 1);
    }

    #[test]
    fn drain_flushes_partial_buffer_regardless_of_triggers() {
        let batcher = Batcher::new(config());
        batcher.submit(record("a")).unwrap();
        let batch = batcher.drain().unwrap();
        assert_eq!(batch.record_count(), 1);
        assert!(batcher.drain().is_none());
    }

    #[test]
    fn oversized_single_record_is_rejected_before_buffering() {
        let mut cfg = config();
        cfg.hard_cap_bytes = 10;
        let batcher = Batcher::new(cfg);
        let err = batcher.submit(record("a")).unwrap_err();
        assert!(matches!(err, IngestError::Schema { .. }));
        assert!(batcher.drain().is_none());
    }
}
