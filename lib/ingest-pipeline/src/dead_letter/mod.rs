//! C9: Dead-Letter Sink — durably records batches that exhausted retries,
//! to one of `none` / `file:` / `s3://` destinations. See `spec.md` §4.9.

use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;
use ingest_core::batch::Batch;
use ingest_core::config::DeadLetterDestination;
use ingest_core::error::IngestError;
use ingest_core::traits::DeadLetterSink;
use serde::Serialize;
use tokio::io::AsyncWriteExt;

use crate::internal_events::{emit, BatchDeadLettered, DeadLetterWriteFailed};

#[derive(Serialize)]
struct DeadLetterPayload<'a> {
    batch_id: String,
    record_count: usize,
    attempt: u32,
    first_seen: chrono::DateTime<chrono::Utc>,
    error_kind: &'static str,
    error_message: String,
    records: &'a [ingest_core::finding::TargetRecord],
}

fn error_kind(error: &IngestError) -> &'static str {
    match error {
        IngestError::Config { .. } => "Config",
        IngestError::Authentication { .. } => "Authentication",
        IngestError::SourceAccess { .. } => "SourceAccess",
        IngestError::Decryption { .. } => "Decryption",
        IngestError::Decode { .. } => "Decode",
        IngestError::Schema { .. } => "Schema",
        IngestError::Transient { .. } => "Transient",
        IngestError::SinkReject { .. } => "SinkReject",
        IngestError::DeadLetterFailure { .. } => "DeadLetterFailure",
    }
}

/// Writes dead-lettered batches to the configured destination. A failure to
/// dead-letter is itself logged and counted, and the engine continues
/// (`spec.md` §4.9) — callers should not treat `Err` here as fatal to the
/// overall pipeline, only to this one batch.
pub struct DeadLetterWriter {
    destination: DeadLetterDestination,
    s3_client: Option<S3Client>,
}

impl DeadLetterWriter {
    pub fn new(destination: DeadLetterDestination, s3_client: Option<S3Client>) -> Self {
        Self {
            destination,
            s3_client,
        }
    }
}

#[async_trait]
impl DeadLetterSink for DeadLetterWriter {
    async fn dead_letter(&self, batch: &Batch, terminal_error: &IngestError) -> Result<(), IngestError> {
        let payload = DeadLetterPayload {
            batch_id: batch.id.to_string(),
            record_count: batch.record_count(),
            attempt: batch.attempt,
            first_seen: batch.first_seen,
            error_kind: error_kind(terminal_error),
            error_message: terminal_error.to_string(),
            records: &batch.records,
        };
        let body = serde_json::to_vec(&payload).map_err(|e| IngestError::DeadLetterFailure {
            message: format!("failed to serialize dead-letter payload: {e}"),
        })?;

        let result = match &self.destination {
            DeadLetterDestination::None => Ok(()),
            DeadLetterDestination::File(path) => self.write_file(path, &body).await,
            DeadLetterDestination::S3 { bucket, prefix } => {
                self.write_s3(bucket, prefix, &batch.id.to_string(), body).await
            }
        };

        match &result {
            Ok(()) => emit(BatchDeadLettered {
                batch_id: batch.id.to_string(),
                record_count: batch.record_count(),
                reason: terminal_error.to_string(),
            }),
            Err(error) => emit(DeadLetterWriteFailed {
                batch_id: batch.id.to_string(),
                error: error.to_string(),
            }),
        }
        result
    }
}

impl DeadLetterWriter {
    async fn write_file(&self, path: &str, body: &[u8]) -> Result<(), IngestError> {
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await
            .map_err(|e| IngestError::DeadLetterFailure {
                message: format!("failed to open dead-letter file {path}: {e}"),
            })?;
        file.write_all(body).await.map_err(|e| IngestError::DeadLetterFailure {
            message: format!("failed to write dead-letter file {path}: {e}"),
        })?;
        file.write_all(b"\n").await.map_err(|e| IngestError::DeadLetterFailure {
            message: format!("failed to write dead-letter file {path}: {e}"),
        })
    }

    async fn write_s3(
        &self,
        bucket: &str,
        prefix: &str,
        batch_id: &str,
        body: Vec<u8>,
    ) -> Result<(), IngestError> {
        let client = self.s3_client.as_ref().ok_or_else(|| IngestError::DeadLetterFailure {
            message: "dead-letter destination is s3:// but no S3 client was configured".into(),
        })?;
        let key = format!("{}/{batch_id}.json", prefix.trim_end_matches('/'));
        client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|e| IngestError::DeadLetterFailure {
                message: format!("failed to write dead-letter object to s3://{bucket}/{prefix}: {e}"),
            })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ingest_core::finding::TargetRecord;

    fn sample_batch() -> Batch {
        Batch::new(vec![TargetRecord {
            time_generated: "2024-01-01T00:00:00Z".into(),
            finding_id: "f1".into(),
            account_id: "1".into(),
            region: "us-east-1".into(),
            severity: 1.0,
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
        }])
    }

    #[tokio::test]
    async fn none_destination_drops_with_success() {
        let writer = DeadLetterWriter::new(DeadLetterDestination::None, None);
        let err = IngestError::Schema { message: "bad".into() };
        assert!(writer.dead_letter(&sample_batch(), &err).await.is_ok());
    }

    #[tokio::test]
    async fn file_destination_appends_a_json_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dlq.jsonl");
        let writer = DeadLetterWriter::new(
            DeadLetterDestination::File(path.to_string_lossy().into_owned()),
            None,
        );
        let err = IngestError::Schema { message: "bad".into() };
        writer.dead_letter(&sample_batch(), &err).await.unwrap();
        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        assert!(contents.contains("\"batch_id\""));
        assert!(contents.trim_end().ends_with('}'));
    }

    #[tokio::test]
    async fn s3_destination_without_client_fails_distinctly() {
        let writer = DeadLetterWriter::new(
            DeadLetterDestination::S3 {
                bucket: "b".into(),
                prefix: "p".into(),
            },
            None,
        );
        let err = IngestError::Schema { message: "bad".into() };
        let result = writer.dead_letter(&sample_batch(), &err).await;
        assert!(matches!(result, Err(IngestError::DeadLetterFailure { .. })));
    }
}
