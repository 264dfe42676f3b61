//! In-memory fakes for [`ObjectSource`], [`Sink`], and [`DeadLetterSink`],
//! gated behind the `test-util` feature, in the spirit of the teacher's
//! `src/test_util::mock::{sources,sinks}` convention.

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Mutex;
use std::task::{Context, Poll};

use async_trait::async_trait;
use tokio::io::AsyncRead;

use crate::batch::Batch;
use crate::error::IngestError;
use crate::finding::TargetRecord;
use crate::object_ref::ObjectRef;
use crate::traits::{DeadLetterSink, IngestResult, ObjectSource, Sink};

/// An in-memory byte cursor implementing [`AsyncRead`] directly; avoids
/// pulling in a blocking-to-async bridge for test fixtures that never
/// actually touch the filesystem or network.
pub struct MemoryReader {
    data: Vec<u8>,
    position: usize,
}

impl MemoryReader {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data, position: 0 }
    }
}

impl AsyncRead for MemoryReader {
    fn poll_read(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut tokio::io::ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        let remaining = &self.data[self.position..];
        let n = remaining.len().min(buf.remaining());
        buf.put_slice(&remaining[..n]);
        self.position += n;
        Poll::Ready(Ok(()))
    }
}

/// A fixed catalogue of objects and their bytes, with optional per-key
/// injected failures (access-denied, not-found, decryption).
#[derive(Default)]
pub struct MockSource {
    objects: Mutex<HashMap<String, ObjectRef>>,
    bodies: Mutex<HashMap<String, Vec<u8>>>,
    fetch_errors: Mutex<HashMap<String, IngestError>>,
}

impl MockSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, object: ObjectRef, body: Vec<u8>) {
        let key = object.key.clone();
        self.objects.lock().unwrap().insert(key.clone(), object);
        self.bodies.lock().unwrap().insert(key, body);
    }

    pub fn fail_fetch(&self, key: &str, error: IngestError) {
        self.fetch_errors
            .lock()
            .unwrap()
            .insert(key.to_owned(), error);
    }
}

#[async_trait]
impl ObjectSource for MockSource {
    async fn list(
        &self,
        _bucket: &str,
        prefix: &str,
        limit: usize,
    ) -> Result<Vec<ObjectRef>, IngestError> {
        let objects = self.objects.lock().unwrap();
        Ok(objects
            .values()
            .filter(|o| o.key.starts_with(prefix))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn fetch(
        &self,
        object: &ObjectRef,
    ) -> Result<Box<dyn AsyncRead + Send + Unpin>, IngestError> {
        if let Some(error) = self.fetch_errors.lock().unwrap().remove(&object.key) {
            return Err(error);
        }
        let bodies = self.bodies.lock().unwrap();
        let body = bodies
            .get(&object.key)
            .cloned()
            .ok_or_else(|| IngestError::SourceAccess {
                object: object.to_string(),
                message: "not found".into(),
            })?;
        Ok(Box::new(MemoryReader::new(body)))
    }
}

/// Records every batch handed to it; `responses` lets a test script a
/// sequence of outcomes (e.g. 503, 503, 204) to exercise the Retry Engine.
pub struct MockSink {
    pub received: Mutex<Vec<Vec<TargetRecord>>>,
    responses: Mutex<std::collections::VecDeque<Result<IngestResult, IngestError>>>,
}

impl MockSink {
    pub fn new() -> Self {
        Self {
            received: Mutex::new(Vec::new()),
            responses: Mutex::new(std::collections::VecDeque::new()),
        }
    }

    pub fn push_response(&self, response: Result<IngestResult, IngestError>) {
        self.responses.lock().unwrap().push_back(response);
    }
}

impl Default for MockSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Sink for MockSink {
    async fn ingest(
        &self,
        _stream_name: &str,
        records: &[TargetRecord],
    ) -> Result<IngestResult, IngestError> {
        self.received.lock().unwrap().push(records.to_vec());
        match self.responses.lock().unwrap().pop_front() {
            Some(response) => response,
            None => Ok(IngestResult {
                accepted_records: records.len(),
                request_id: uuid::Uuid::new_v4(),
            }),
        }
    }
}

#[derive(Default)]
pub struct MockDeadLetter {
    pub entries: Mutex<Vec<(Batch, String)>>,
}

impl MockDeadLetter {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DeadLetterSink for MockDeadLetter {
    async fn dead_letter(&self, batch: &Batch, terminal_error: &IngestError) -> Result<(), IngestError> {
        self.entries
            .lock()
            .unwrap()
            .push((batch.clone(), terminal_error.to_string()));
        Ok(())
    }
}
