//! Narrow capability interfaces the Pipeline Controller (C10) wires
//! together, per `spec.md` §9's re-architecture note: "polymorphism over the
//! capability set {Source, Sink, DeadLetter} via narrow interfaces" instead
//! of a class hierarchy over worker types.

use async_trait::async_trait;
use tokio::io::AsyncRead;

use crate::batch::Batch;
use crate::error::IngestError;
use crate::finding::TargetRecord;
use crate::object_ref::ObjectRef;

/// C1: list and fetch objects from the source bucket.
#[async_trait]
pub trait ObjectSource: Send + Sync {
    async fn list(
        &self,
        bucket: &str,
        prefix: &str,
        limit: usize,
    ) -> Result<Vec<ObjectRef>, IngestError>;

    /// Returns a byte stream for `object`. Transparently decrypts via KMS
    /// when `object.kms_key_id` is set.
    async fn fetch(
        &self,
        object: &ObjectRef,
    ) -> Result<Box<dyn AsyncRead + Send + Unpin>, IngestError>;
}

/// Outcome of one `ingest` call, per `spec.md` §4.8.
#[derive(Debug, Clone)]
pub struct IngestResult {
    pub accepted_records: usize,
    pub request_id: uuid::Uuid,
}

/// C8: POST batches to the ingestion endpoint.
#[async_trait]
pub trait Sink: Send + Sync {
    async fn ingest(
        &self,
        stream_name: &str,
        records: &[TargetRecord],
    ) -> Result<IngestResult, IngestError>;
}

/// C9: durably record batches that exhausted retries.
#[async_trait]
pub trait DeadLetterSink: Send + Sync {
    async fn dead_letter(&self, batch: &Batch, terminal_error: &IngestError) -> Result<(), IngestError>;
}
