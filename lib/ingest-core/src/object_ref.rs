//! `ObjectRef` — an opaque handle to a source object, per `spec.md` §3.

use chrono::{DateTime, Utc};

/// A handle identifying one object in the source bucket. The engine never
/// parses `key`; it is treated as opaque between `list` and `fetch`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectRef {
    pub bucket: String,
    pub key: String,
    pub size: u64,
    pub last_modified: Option<DateTime<Utc>>,
    pub etag: Option<String>,
    pub kms_key_id: Option<String>,
}

impl ObjectRef {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
            size: 0,
            last_modified: None,
            etag: None,
            kms_key_id: None,
        }
    }
}

impl std::fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "s3://{}/{}", self.bucket, self.key)
    }
}
