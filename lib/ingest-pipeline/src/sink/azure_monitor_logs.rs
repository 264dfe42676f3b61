//! The concrete [`Sink`] against the Azure Monitor Logs Ingestion API.
//! Request shape grounded on `spec.md` §6; bearer-header construction
//! follows the teacher corpus's `AzureMonitorLogsDceService` pattern
//! (`sinks/azure_monitor_logs_dce/service.rs` in the sibling `yaxitech`
//! fork) of building a plain `POST` with the token applied as a header.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ingest_core::config::SinkConfig;
use ingest_core::error::IngestError;
use ingest_core::finding::TargetRecord;
use ingest_core::traits::{IngestResult, Sink};

use crate::internal_events::{emit, IngestFailed, IngestSucceeded};
use crate::token::TokenCache;

const API_VERSION: &str = "2023-01-01";
const HARD_CAP_BYTES: usize = 30 * 1024 * 1024;

pub struct AzureMonitorLogsSink {
    client: reqwest::Client,
    endpoint: String,
    dcr_immutable_id: String,
    tokens: Arc<TokenCache>,
}

impl AzureMonitorLogsSink {
    pub fn new(config: &SinkConfig, tokens: Arc<TokenCache>) -> Result<Self, IngestError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| IngestError::Config {
                message: format!("failed to build HTTP client: {e}"),
            })?;
        Ok(Self {
            client,
            endpoint: config.azure_endpoint.trim_end_matches('/').to_owned(),
            dcr_immutable_id: config.dcr_immutable_id.clone(),
            tokens,
        })
    }

    fn url(&self, stream_name: &str) -> String {
        format!(
            "{}/dataCollectionRules/{}/streams/{}?api-version={}",
            self.endpoint, self.dcr_immutable_id, stream_name, API_VERSION
        )
    }

    /// Pre-flight validation per `spec.md` §4.8: a non-empty array, within
    /// the 30 MiB hard cap, with every `TimeGenerated` already normalized
    /// to a parseable ISO-8601 string. Violations never reach the network.
    fn validate(records: &[TargetRecord], body: &[u8]) -> Result<(), IngestError> {
        if records.is_empty() {
            return Err(IngestError::Schema {
                message: "batch has no records".into(),
            });
        }
        if body.len() > HARD_CAP_BYTES {
            return Err(IngestError::Schema {
                message: format!("serialized batch is {} bytes, exceeds the 30 MiB cap", body.len()),
            });
        }
        for record in records {
            if chrono::DateTime::parse_from_rfc3339(&record.time_generated).is_err() {
                return Err(IngestError::Schema {
                    message: format!(
                        "record {} has an unparseable TimeGenerated: {:?}",
                        record.finding_id, record.time_generated
                    ),
                });
            }
        }
        Ok(())
    }

    async fn post_once(
        &self,
        url: &str,
        body: &[u8],
        request_id: uuid::Uuid,
        token: &str,
    ) -> Result<reqwest::Response, IngestError> {
        self.client
            .post(url)
            .bearer_auth(token)
            .header("content-type", "application/json")
            .header("x-ms-client-request-id", request_id.to_string())
            .body(body.to_vec())
            .send()
            .await
            .map_err(|e| IngestError::Transient {
                message: format!("ingest request failed: {e}"),
            })
    }
}

#[async_trait]
impl Sink for AzureMonitorLogsSink {
    async fn ingest(
        &self,
        stream_name: &str,
        records: &[TargetRecord],
    ) -> Result<IngestResult, IngestError> {
        // `TargetRecord` has no `Option` fields, so the "nulls become empty
        // string" data-preparation rule (`spec.md` §4.8) is already
        // satisfied structurally by the time a record reaches the sink.
        let body = serde_json::to_vec(records).map_err(|e| IngestError::Schema {
            message: format!("failed to serialize batch: {e}"),
        })?;
        Self::validate(records, &body)?;

        let url = self.url(stream_name);
        let request_id = uuid::Uuid::new_v4();

        let token = self.tokens.get_token().await?;
        let response = self
            .post_once(&url, &body, request_id, &token.access_token)
            .await?;

        let response = if response.status().as_u16() == 401 {
            self.tokens.invalidate().await;
            let token = self.tokens.get_token().await?;
            self.post_once(&url, &body, request_id, &token.access_token)
                .await?
        } else {
            response
        };

        let status = response.status();
        if status.is_success() {
            let result = IngestResult {
                accepted_records: records.len(),
                request_id,
            };
            emit(IngestSucceeded {
                batch_id: request_id.to_string(),
                accepted_records: result.accepted_records,
            });
            return Ok(result);
        }

        if status.as_u16() == 401 {
            let message = "authentication failed twice; persisted past one token refresh".into();
            emit(IngestFailed {
                batch_id: request_id.to_string(),
                error: message,
            });
            return Err(IngestError::Authentication {
                message: "token rejected after refresh".into(),
            });
        }

        if status.as_u16() == 429 {
            if let Some(retry_after) = parse_retry_after(&response) {
                tokio::time::sleep(retry_after).await;
            }
            return Err(IngestError::Transient {
                message: "rate limited (429)".into(),
            });
        }

        if status.is_server_error() {
            return Err(IngestError::Transient {
                message: format!("sink returned {status}"),
            });
        }

        let body = response.text().await.unwrap_or_default();
        emit(IngestFailed {
            batch_id: request_id.to_string(),
            error: format!("{status}: {body}"),
        });
        Err(IngestError::SinkReject {
            status: status.as_u16(),
            message: body,
        })
    }
}

fn parse_retry_after(response: &reqwest::Response) -> Option<Duration> {
    response
        .headers()
        .get("retry-after")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_secs)
}
