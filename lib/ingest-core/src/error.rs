//! The error taxonomy from `spec.md` §7, as a single `snafu`-derived enum.
//!
//! Each variant names its propagation policy in a doc comment; callers
//! match on [`IngestError::is_retryable`] rather than re-deriving policy
//! from the variant shape.

use snafu::Snafu;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum IngestError {
    /// Missing/invalid configuration at startup. Fatal: abort the process.
    #[snafu(display("invalid configuration: {message}"))]
    Config { message: String },

    /// Token fetch failed, or a 401 persisted past one refresh. Fatal per
    /// batch; the batch is dead-lettered and the failure counted in health.
    #[snafu(display("azure authentication failed: {message}"))]
    Authentication { message: String },

    /// Cannot list or fetch an object. Fatal per object; the `ObjectRef` is
    /// dead-lettered and the pipeline continues.
    #[snafu(display("source access error for {object}: {message}"))]
    SourceAccess { object: String, message: String },

    /// KMS decryption failed. Fatal per object; dead-lettered.
    #[snafu(display("decryption failed for {object}: {message}"))]
    Decryption { object: String, message: String },

    /// A single JSONL line was malformed. Warn and skip; counted, never
    /// propagated past the decoder.
    #[snafu(display("malformed line {line_number} in {object}: {message}"))]
    Decode {
        object: String,
        line_number: u64,
        message: String,
    },

    /// A record or batch was rejected by pre-flight validation in the Sink
    /// Client. Fatal per batch; dead-lettered.
    #[snafu(display("schema validation failed: {message}"))]
    Schema { message: String },

    /// Network error, timeout, 5xx, or 429. Retryable by the Retry Engine.
    #[snafu(display("transient error: {message}"))]
    Transient { message: String },

    /// A 4xx (other than 401/429) with a validation detail from the sink.
    /// Fatal per batch; dead-lettered with the server message preserved.
    #[snafu(display("sink rejected request ({status}): {message}"))]
    SinkReject { status: u16, message: String },

    /// Writing to the dead-letter destination itself failed. Logged and
    /// counted; the batch is considered lost.
    #[snafu(display("dead-letter write failed: {message}"))]
    DeadLetterFailure { message: String },
}

impl IngestError {
    /// Whether the Retry Engine (C6) should retry this error, per the
    /// default classification in `spec.md` §4.6.
    pub fn is_retryable(&self) -> bool {
        matches!(self, IngestError::Transient { .. })
    }

    /// Whether this error kind results in a per-object/per-batch
    /// dead-letter rather than aborting the whole pipeline.
    pub fn is_dead_letterable(&self) -> bool {
        matches!(
            self,
            IngestError::Authentication { .. }
                | IngestError::SourceAccess { .. }
                | IngestError::Decryption { .. }
                | IngestError::Schema { .. }
                | IngestError::SinkReject { .. }
        )
    }
}
