//! C2: JSONL Decoder — decompresses (optionally) and line-splits an object
//! body, lenient-parsing each line into a [`Finding`]. See `spec.md` §4.2.

use async_compression::tokio::bufread::GzipDecoder;
use ingest_core::error::IngestError;
use ingest_core::finding::Finding;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};

use crate::internal_events::{emit, FindingsDecoded, LineMalformed};

/// The result of decoding one object: the findings that parsed, plus a count
/// of lines skipped as malformed. A decode never fails the object outright —
/// per `spec.md` §7, a bad line is warned-and-skipped, not propagated.
#[derive(Debug, Default)]
pub struct DecodeOutcome {
    pub findings: Vec<Finding>,
    pub malformed_lines: u64,
}

/// Decodes one object's body into findings.
///
/// `gzip` mirrors the source object's `Content-Encoding` (GuardDuty's S3
/// export writes gzip-compressed JSONL by default); pass `false` for
/// already-decompressed bodies.
pub async fn decode_object(
    reader: Box<dyn AsyncRead + Send + Unpin>,
    object: &str,
    gzip: bool,
) -> Result<DecodeOutcome, IngestError> {
    let buffered = BufReader::new(reader);

    let mut outcome = DecodeOutcome::default();
    let mut line_number: u64 = 0;

    if gzip {
        let decoder = GzipDecoder::new(buffered);
        let mut lines = BufReader::new(decoder).lines();
        loop {
            let next = lines.next_line().await.map_err(|e| IngestError::Decode {
                object: object.to_owned(),
                line_number,
                message: format!("gzip stream error: {e}"),
            })?;
            let Some(line) = next else { break };
            line_number += 1;
            decode_line(&line, line_number, object, &mut outcome);
        }
    } else {
        let mut lines = buffered.lines();
        loop {
            let next = lines.next_line().await.map_err(|e| IngestError::Decode {
                object: object.to_owned(),
                line_number,
                message: e.to_string(),
            })?;
            let Some(line) = next else { break };
            line_number += 1;
            decode_line(&line, line_number, object, &mut outcome);
        }
    }

    emit(FindingsDecoded {
        object: object.to_owned(),
        parsed: outcome.findings.len() as u64,
        malformed: outcome.malformed_lines,
    });
    Ok(outcome)
}

fn decode_line(line: &str, line_number: u64, object: &str, outcome: &mut DecodeOutcome) {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return;
    }

    let parsed = serde_json::from_str::<serde_json::Value>(trimmed)
        .map_err(|e| e.to_string())
        .and_then(|value| Finding::from_value(value).map_err(|e| e.to_string()));

    match parsed {
        Ok(finding) => outcome.findings.push(finding),
        Err(message) => {
            outcome.malformed_lines += 1;
            emit(LineMalformed {
                object: object.to_owned(),
                line_number,
                error: message,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ingest_core::testing::MemoryReader;

    fn reader(bytes: &[u8]) -> Box<dyn AsyncRead + Send + Unpin> {
        Box::new(MemoryReader::new(bytes.to_vec()))
    }

    #[tokio::test]
    async fn parses_plain_jsonl() {
        let body = b"{\"id\":\"a\"}\n{\"id\":\"b\"}\n";
        let outcome = decode_object(reader(body), "s3://b/k", false).await.unwrap();
        assert_eq!(outcome.findings.len(), 2);
        assert_eq!(outcome.malformed_lines, 0);
    }

    #[tokio::test]
    async fn skips_malformed_lines_without_failing() {
        let body = b"{\"id\":\"a\"}\nnot json\n{\"no_id\":true}\n{\"id\":\"c\"}\n";
        let outcome = decode_object(reader(body), "s3://b/k", false).await.unwrap();
        assert_eq!(outcome.findings.len(), 2);
        assert_eq!(outcome.malformed_lines, 2);
    }

    #[tokio::test]
    async fn ignores_blank_lines() {
        let body = b"{\"id\":\"a\"}\n\n\n{\"id\":\"b\"}\n";
        let outcome = decode_object(reader(body), "s3://b/k", false).await.unwrap();
        assert_eq!(outcome.findings.len(), 2);
        assert_eq!(outcome.malformed_lines, 0);
    }
}
