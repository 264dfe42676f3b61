//! `Batch` and its terminal state machine, per `spec.md` §3 and §4.10.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::finding::TargetRecord;

/// Monotonic-ordered identifier (UUIDv7 embeds a millisecond timestamp, so
/// batch ids sort chronologically without a separate sequence counter).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BatchId(Uuid);

impl BatchId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for BatchId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for BatchId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A batch's lifecycle, per `spec.md` §4.10's state machine. `Completed`,
/// `Failed`, and `DeadLettered` are terminal: once reached, a batch never
/// transitions again (see [`Batch::transition`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchStatus {
    Pending,
    InFlight,
    Completed,
    Failed,
    DeadLettered,
}

impl BatchStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            BatchStatus::Completed | BatchStatus::Failed | BatchStatus::DeadLettered
        )
    }
}

/// Raised by [`Batch::transition`] when a caller attempts an invalid move,
/// e.g. re-entering `in-flight` from a terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidTransition {
    pub from: BatchStatus,
    pub to: BatchStatus,
}

impl std::fmt::Display for InvalidTransition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid batch transition {:?} -> {:?}", self.from, self.to)
    }
}

impl std::error::Error for InvalidTransition {}

/// An ordered sequence of [`TargetRecord`]s emitted by the Batcher (C5),
/// tracked through the Retry Engine (C6) and Sink Client (C8) until it
/// reaches a terminal status.
#[derive(Debug, Clone)]
pub struct Batch {
    pub id: BatchId,
    pub records: Vec<TargetRecord>,
    pub attempt: u32,
    pub first_seen: DateTime<Utc>,
    pub status: BatchStatus,
}

impl Batch {
    pub fn new(records: Vec<TargetRecord>) -> Self {
        Self {
            id: BatchId::new(),
            records,
            attempt: 0,
            first_seen: Utc::now(),
            status: BatchStatus::Pending,
        }
    }

    /// Sum of each record's estimated serialized size. Used to enforce the
    /// 30 MiB hard cap invariant (`spec.md` §3, §8 invariant 4).
    pub fn estimated_size(&self) -> usize {
        // Account for the JSON array's brackets and comma separators so the
        // estimate tracks the wire payload, not just the sum of elements.
        let elements: usize = self.records.iter().map(TargetRecord::estimated_size).sum();
        elements + self.records.len().saturating_sub(1) + 2
    }

    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    /// Moves this batch to `to`, enforcing that terminal states never
    /// re-enter `in-flight` or any other non-terminal state.
    pub fn transition(&mut self, to: BatchStatus) -> Result<(), InvalidTransition> {
        if self.status.is_terminal() {
            return Err(InvalidTransition {
                from: self.status,
                to,
            });
        }
        match (self.status, to) {
            (BatchStatus::Pending, BatchStatus::InFlight)
            | (BatchStatus::InFlight, BatchStatus::InFlight)
            | (BatchStatus::InFlight, BatchStatus::Completed)
            | (BatchStatus::InFlight, BatchStatus::Failed)
            | (BatchStatus::Failed, BatchStatus::DeadLettered) => {
                self.status = to;
                Ok(())
            }
            _ => Err(InvalidTransition {
                from: self.status,
                to,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_record() -> TargetRecord {
        TargetRecord {
            time_generated: "2024-01-01T00:00:00Z".into(),
            finding_id: "ab-1".into(),
            account_id: "123456789012".into(),
            region: "us-east-1".into(),
            severity: 8.0,
            finding_type: "Trojan:EC2/DNSDataExfiltration".into(),
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
    fn valid_happy_path_transitions() {
        let mut batch = Batch::new(vec![sample_record()]);
        assert_eq!(batch.status, BatchStatus::Pending);
        batch.transition(BatchStatus::InFlight).unwrap();
        batch.transition(BatchStatus::Completed).unwrap();
        assert!(batch.status.is_terminal());
    }

    #[test]
    fn terminal_never_reenters_in_flight() {
        let mut batch = Batch::new(vec![sample_record()]);
        batch.transition(BatchStatus::InFlight).unwrap();
        batch.transition(BatchStatus::Completed).unwrap();
        let err = batch.transition(BatchStatus::InFlight).unwrap_err();
        assert_eq!(err.from, BatchStatus::Completed);
    }

    #[test]
    fn failed_can_dead_letter_once() {
        let mut batch = Batch::new(vec![sample_record()]);
        batch.transition(BatchStatus::InFlight).unwrap();
        batch.transition(BatchStatus::Failed).unwrap();
        batch.transition(BatchStatus::DeadLettered).unwrap();
        assert!(batch.transition(BatchStatus::Failed).is_err());
    }

    #[test]
    fn estimated_size_accounts_for_array_overhead() {
        let batch = Batch::new(vec![sample_record(), sample_record()]);
        let one = sample_record().estimated_size();
        assert_eq!(batch.estimated_size(), one * 2 + 1 + 2);
    }
}
