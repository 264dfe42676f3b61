//! `S3Source` — the concrete [`ObjectSource`] implementation against AWS S3,
//! with KMS-aware error classification per `spec.md` §4.1.

use async_trait::async_trait;
use aws_sdk_s3::Client as S3Client;
use futures::TryStreamExt;
use ingest_core::error::IngestError;
use ingest_core::object_ref::ObjectRef;
use ingest_core::traits::ObjectSource;
use tokio::io::AsyncRead;
use tokio_util::io::StreamReader;

use crate::internal_events::{emit, ObjectAccessError, ObjectDecryptionFailed, ObjectsListed};

pub struct S3Source {
    client: S3Client,
}

impl S3Source {
    pub fn new(client: S3Client) -> Self {
        Self { client }
    }

    /// Builds a client from the default AWS credential/region chain,
    /// matching the teacher's `aws-config` usage elsewhere in the stack.
    pub async fn from_env() -> Self {
        let shared_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        Self::new(S3Client::new(&shared_config))
    }
}

#[async_trait]
impl ObjectSource for S3Source {
    async fn list(
        &self,
        bucket: &str,
        prefix: &str,
        limit: usize,
    ) -> Result<Vec<ObjectRef>, IngestError> {
        let mut refs = Vec::new();
        let mut continuation_token = None;

        loop {
            let mut request = self
                .client
                .list_objects_v2()
                .bucket(bucket)
                .prefix(prefix)
                .max_keys((limit.saturating_sub(refs.len())).min(1000) as i32);
            if let Some(token) = continuation_token.take() {
                request = request.continuation_token(token);
            }

            let output = request.send().await.map_err(|e| IngestError::SourceAccess {
                object: format!("s3://{bucket}/{prefix}*"),
                message: e.to_string(),
            })?;

            for object in output.contents() {
                let Some(key) = object.key() else { continue };
                refs.push(ObjectRef {
                    bucket: bucket.to_owned(),
                    key: key.to_owned(),
                    size: object.size().unwrap_or(0).max(0) as u64,
                    last_modified: object
                        .last_modified()
                        .and_then(|t| chrono::DateTime::from_timestamp(t.secs(), 0)),
                    etag: object.e_tag().map(str::to_owned),
                    kms_key_id: None,
                });
                if refs.len() >= limit {
                    break;
                }
            }

            if refs.len() >= limit || !output.is_truncated().unwrap_or(false) {
                break;
            }
            continuation_token = output.next_continuation_token().map(str::to_owned);
        }

        emit(ObjectsListed {
            bucket: bucket.to_owned(),
            prefix: prefix.to_owned(),
            count: refs.len(),
        });
        Ok(refs)
    }

    async fn fetch(
        &self,
        object: &ObjectRef,
    ) -> Result<Box<dyn AsyncRead + Send + Unpin>, IngestError> {
        let response = self
            .client
            .get_object()
            .bucket(&object.bucket)
            .key(&object.key)
            .send()
            .await;

        let output = match response {
            Ok(output) => output,
            Err(error) => {
                let message = error.to_string();
                // S3 surfaces a caller's missing `kms:Decrypt` grant as an
                // AccessDenied on GetObject; since SSE-KMS decryption is
                // performed server-side, this is the only signal available
                // to distinguish a KMS failure from a generic access error.
                if object.kms_key_id.is_some()
                    && (message.contains("KMS") || message.contains("Kms"))
                {
                    emit(ObjectDecryptionFailed {
                        object: object.to_string(),
                        error: message.clone(),
                    });
                    return Err(IngestError::Decryption {
                        object: object.to_string(),
                        message,
                    });
                }
                if message.contains("NoSuchKey") {
                    // Treated as a successful no-op: the object may have
                    // been deleted between list and fetch (spec.md §4.1).
                    return Ok(Box::new(tokio::io::empty()));
                }
                emit(ObjectAccessError {
                    object: object.to_string(),
                    error: message.clone(),
                });
                return Err(IngestError::SourceAccess {
                    object: object.to_string(),
                    message,
                });
            }
        };

        let stream = output
            .body
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e));
        Ok(Box::new(StreamReader::new(stream)))
    }
}
