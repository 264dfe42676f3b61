//! `EngineConfig` — the configuration surface from `spec.md` §6, expanded
//! into a deserializable, validated tree per `SPEC_FULL.md` §10.

use serde::{Deserialize, Serialize};

use crate::error::IngestError;

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceConfig {
    pub bucket: String,
    #[serde(default)]
    pub prefix: String,
    #[serde(default)]
    pub kms_key_id: Option<String>,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
}

fn default_poll_interval_secs() -> u64 {
    60
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SinkConfig {
    pub azure_endpoint: String,
    pub dcr_immutable_id: String,
    pub dcr_stream_name: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_request_timeout_secs() -> u64 {
    30
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AzureAuthConfig {
    pub tenant_id: String,
    pub client_id: String,
    pub client_secret: String,
}

impl std::fmt::Debug for AzureAuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AzureAuthConfig")
            .field("tenant_id", &self.tenant_id)
            .field("client_id", &self.client_id)
            .field("client_secret", &"***")
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchConfig {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_soft_cap_bytes")]
    pub soft_cap_bytes: usize,
    #[serde(default = "default_hard_cap_bytes")]
    pub hard_cap_bytes: usize,
    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,
}

fn default_batch_size() -> usize {
    2000
}
fn default_soft_cap_bytes() -> usize {
    25 * 1024 * 1024
}
fn default_hard_cap_bytes() -> usize {
    30 * 1024 * 1024
}
fn default_flush_interval_ms() -> u64 {
    5_000
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            soft_cap_bytes: default_soft_cap_bytes(),
            hard_cap_bytes: default_hard_cap_bytes(),
            flush_interval_ms: default_flush_interval_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
}

fn default_max_retries() -> u32 {
    5
}
fn default_initial_backoff_ms() -> u64 {
    500
}
fn default_max_backoff_ms() -> u64 {
    30_000
}
fn default_multiplier() -> f64 {
    2.0
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            multiplier: default_multiplier(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DedupStrategy {
    ById,
    ContentHash,
    TimeWindow,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeduplicationConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_dedup_strategy")]
    pub strategy: DedupStrategy,
    #[serde(default = "default_time_window_minutes")]
    pub time_window_minutes: u64,
    #[serde(default = "default_cache_size")]
    pub cache_size: usize,
}

fn default_dedup_strategy() -> DedupStrategy {
    DedupStrategy::ById
}
fn default_time_window_minutes() -> u64 {
    60
}
fn default_cache_size() -> usize {
    100_000
}

impl Default for DeduplicationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            strategy: default_dedup_strategy(),
            time_window_minutes: default_time_window_minutes(),
            cache_size: default_cache_size(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizationConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for NormalizationConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Where dead-lettered batches go. `spec.md` §6 specifies the option as a
/// "destination identifier" string; this parses that string into a typed
/// variant. `None` means "drop with log", per the same table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeadLetterDestination {
    None,
    File(String),
    S3 { bucket: String, prefix: String },
}

impl Default for DeadLetterDestination {
    fn default() -> Self {
        DeadLetterDestination::None
    }
}

impl Serialize for DeadLetterDestination {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for DeadLetterDestination {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

impl std::fmt::Display for DeadLetterDestination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeadLetterDestination::None => write!(f, "none"),
            DeadLetterDestination::File(path) => write!(f, "file:{path}"),
            DeadLetterDestination::S3 { bucket, prefix } => write!(f, "s3://{bucket}/{prefix}"),
        }
    }
}

impl std::str::FromStr for DeadLetterDestination {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        if raw.is_empty() || raw.eq_ignore_ascii_case("none") {
            return Ok(DeadLetterDestination::None);
        }
        if let Some(path) = raw.strip_prefix("file:") {
            return Ok(DeadLetterDestination::File(path.to_owned()));
        }
        if let Some(rest) = raw.strip_prefix("s3://") {
            let (bucket, prefix) = rest.split_once('/').unwrap_or((rest, ""));
            return Ok(DeadLetterDestination::S3 {
                bucket: bucket.to_owned(),
                prefix: prefix.to_owned(),
            });
        }
        Err(format!("unrecognized dead-letter destination: {raw}"))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeadLetterConfig {
    #[serde(default)]
    pub destination: DeadLetterDestination,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConcurrencyConfig {
    #[serde(default = "default_object_workers")]
    pub object_workers: usize,
    #[serde(default = "default_ingest_workers")]
    pub ingest_workers: usize,
    #[serde(default = "default_batch_queue_depth")]
    pub batch_queue_depth: usize,
    #[serde(default = "default_input_queue_depth")]
    pub input_queue_depth: usize,
}

fn default_object_workers() -> usize {
    10
}
fn default_ingest_workers() -> usize {
    4
}
fn default_batch_queue_depth() -> usize {
    64
}
fn default_input_queue_depth() -> usize {
    256
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        Self {
            object_workers: default_object_workers(),
            ingest_workers: default_ingest_workers(),
            batch_queue_depth: default_batch_queue_depth(),
            input_queue_depth: default_input_queue_depth(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineConfig {
    pub source: SourceConfig,
    pub sink: SinkConfig,
    pub azure: AzureAuthConfig,
    #[serde(default)]
    pub batch: BatchConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub deduplication: DeduplicationConfig,
    #[serde(default)]
    pub normalization: NormalizationConfig,
    #[serde(default)]
    pub dead_letter: DeadLetterConfig,
    #[serde(default)]
    pub concurrency: ConcurrencyConfig,
    #[serde(default = "default_shutdown_deadline_secs")]
    pub shutdown_deadline_secs: u64,
}

fn default_shutdown_deadline_secs() -> u64 {
    30
}

impl EngineConfig {
    /// Parses YAML config text, then validates field ranges.
    pub fn from_yaml(text: &str) -> Result<Self, IngestError> {
        let config: EngineConfig =
            serde_yaml::from_str(text).map_err(|e| IngestError::Config {
                message: format!("failed to parse config: {e}"),
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the ranges named in `spec.md` §6's configuration table.
    /// A validation failure is a fatal `Config` error (`spec.md` §7).
    pub fn validate(&self) -> Result<(), IngestError> {
        let mut problems = Vec::new();

        if !(1..=2000).contains(&self.batch.batch_size) {
            problems.push(format!(
                "batch.batchSize must be in 1..=2000, got {}",
                self.batch.batch_size
            ));
        }
        if self.batch.soft_cap_bytes > self.batch.hard_cap_bytes {
            problems.push("batch.softCapBytes must not exceed batch.hardCapBytes".to_owned());
        }
        if self.batch.hard_cap_bytes > 30 * 1024 * 1024 {
            problems.push("batch.hardCapBytes must not exceed the Azure 30 MiB limit".to_owned());
        }
        if self.retry.max_retries > 10 {
            problems.push(format!(
                "retry.maxRetries must be in 0..=10, got {}",
                self.retry.max_retries
            ));
        }
        if !(100..=60_000).contains(&self.retry.initial_backoff_ms) {
            problems.push(format!(
                "retry.initialBackoffMs must be in 100..=60000, got {}",
                self.retry.initial_backoff_ms
            ));
        }
        if self.retry.max_backoff_ms < self.retry.initial_backoff_ms {
            problems.push("retry.maxBackoffMs must be >= retry.initialBackoffMs".to_owned());
        }
        if self.source.bucket.trim().is_empty() {
            problems.push("source.bucket must not be empty".to_owned());
        }
        if self.sink.dcr_immutable_id.trim().is_empty() {
            problems.push("sink.dcrImmutableId must not be empty".to_owned());
        }
        if self.sink.dcr_stream_name.trim().is_empty() {
            problems.push("sink.dcrStreamName must not be empty".to_owned());
        }
        if self.concurrency.object_workers == 0 || self.concurrency.ingest_workers == 0 {
            problems.push("concurrency worker pools must be non-zero".to_owned());
        }
        if matches!(self.deduplication.strategy, DedupStrategy::TimeWindow)
            && self.deduplication.time_window_minutes == 0
        {
            problems.push(
                "deduplication.timeWindowMinutes must be > 0 when strategy is time-window"
                    .to_owned(),
            );
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(IngestError::Config {
                message: problems.join("; "),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_yaml() -> &'static str {
        r#"
source:
  bucket: my-bucket
sink:
  azureEndpoint: sample.westeurope.ingest.monitor.azure.com
  dcrImmutableId: dcr-1234
  dcrStreamName: Custom-Stream
azure:
  tenantId: t
  clientId: c
  clientSecret: s
"#
    }

    #[test]
    fn parses_minimal_config_with_defaults() {
        let config = EngineConfig::from_yaml(minimal_yaml()).unwrap();
        assert_eq!(config.batch.batch_size, 2000);
        assert_eq!(config.concurrency.object_workers, 10);
        assert_eq!(config.dead_letter.destination, DeadLetterDestination::None);
    }

    #[test]
    fn rejects_batch_size_out_of_range() {
        let mut config = EngineConfig::from_yaml(minimal_yaml()).unwrap();
        config.batch.batch_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn parses_dead_letter_destinations() {
        assert_eq!(
            "file:/tmp/dlq".parse::<DeadLetterDestination>().unwrap(),
            DeadLetterDestination::File("/tmp/dlq".into())
        );
        assert_eq!(
            "s3://bucket/prefix".parse::<DeadLetterDestination>().unwrap(),
            DeadLetterDestination::S3 {
                bucket: "bucket".into(),
                prefix: "prefix".into()
            }
        );
    }

    #[test]
    fn debug_redacts_client_secret() {
        let config = EngineConfig::from_yaml(minimal_yaml()).unwrap();
        let rendered = format!("{:?}", config.azure);
        assert!(rendered.contains("***"));
        assert!(!rendered.contains("client_secret: \"s\""));
    }
}
