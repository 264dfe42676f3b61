//! The `Finding` (input) and `TargetRecord` (output) data model, per
//! `SPEC_FULL.md` §3.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single GuardDuty finding, as decoded from one JSONL line.
///
/// Only `id` is guaranteed present (the decoder's sole admission criterion);
/// every other field is best-effort extracted from the raw JSON and falls
/// back to an empty/default value. `raw` retains the finding's full parsed
/// JSON value so downstream stages can preserve it verbatim.
#[derive(Debug, Clone, PartialEq)]
pub struct Finding {
    pub id: String,
    pub account_id: String,
    pub region: String,
    pub partition: String,
    pub finding_type: String,
    pub severity: f64,
    pub created_at: String,
    pub updated_at: String,
    pub title: String,
    pub description: String,
    pub raw: Value,
}

/// Returned by [`Finding::from_value`] when a JSON value cannot be treated as
/// a finding at all (the one case the decoder counts as malformed).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotAFinding;

impl fmt::Display for NotAFinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "value is not a JSON object with a string `id` field")
    }
}

impl std::error::Error for NotAFinding {}

impl Finding {
    /// Builds a `Finding` from a decoded JSON value. Fails only when the
    /// value isn't an object or has no string `id` — every other field is
    /// extracted leniently.
    pub fn from_value(value: Value) -> Result<Self, NotAFinding> {
        let id = value
            .get("id")
            .and_then(Value::as_str)
            .map(str::to_owned)
            .ok_or(NotAFinding)?;

        let str_field = |key: &str| -> String {
            value
                .get(key)
                .and_then(Value::as_str)
                .map(str::to_owned)
                .unwrap_or_default()
        };

        let severity = value.get("severity").and_then(Value::as_f64).unwrap_or(0.0);

        Ok(Finding {
            id,
            account_id: str_field("accountId"),
            region: str_field("region"),
            partition: str_field("partition"),
            finding_type: str_field("type"),
            severity,
            created_at: str_field("createdAt"),
            updated_at: str_field("updatedAt"),
            title: str_field("title"),
            description: str_field("description"),
            raw: value,
        })
    }

    /// Navigates a dot-separated path into `raw`, returning the first
    /// matching value. Array segments are addressed with `[N]` or the
    /// wildcard `[*]`, which returns the first non-null match across
    /// elements. Missing segments yield `None`, never an error.
    pub fn lookup(&self, path: &str) -> Option<&Value> {
        lookup_path(&self.raw, path)
    }
}

fn lookup_path<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = root;
    for segment in path.split('.') {
        let (key, index) = split_index(segment);
        if let Some(key) = key {
            current = current.as_object()?.get(key)?;
        }
        if let Some(index) = index {
            let arr = current.as_array()?;
            current = match index {
                Index::At(i) => arr.get(i)?,
                Index::Wildcard => arr.iter().find(|v| !v.is_null())?,
            };
        }
        if current.is_null() {
            return None;
        }
    }
    Some(current)
}

enum Index {
    At(usize),
    Wildcard,
}

fn split_index(segment: &str) -> (Option<&str>, Option<Index>) {
    match segment.find('[') {
        None => (Some(segment), None),
        Some(pos) => {
            let key = &segment[..pos];
            let key = if key.is_empty() { None } else { Some(key) };
            let inner = segment[pos + 1..].trim_end_matches(']');
            let index = if inner == "*" {
                Index::Wildcard
            } else {
                Index::At(inner.parse().ok().unwrap_or(0))
            };
            (key, Some(index))
        }
    }
}

/// The flat record shape accepted by the Azure Monitor Logs Ingestion API,
/// per `spec.md` §3. Required fields are always populated; optional fields
/// normalize missing/null values to an empty string rather than omitting the
/// key, since some DCR stream schemas reject missing columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetRecord {
    #[serde(rename = "TimeGenerated")]
    pub time_generated: String,
    #[serde(rename = "FindingId")]
    pub finding_id: String,
    #[serde(rename = "AccountId")]
    pub account_id: String,
    #[serde(rename = "Region")]
    pub region: String,
    #[serde(rename = "Severity")]
    pub severity: f64,
    #[serde(rename = "Type")]
    pub finding_type: String,
    #[serde(rename = "RawJson")]
    pub raw_json: String,

    #[serde(rename = "Title", default)]
    pub title: String,
    #[serde(rename = "Description", default)]
    pub description: String,
    #[serde(rename = "Service", default)]
    pub service: String,
    #[serde(rename = "ResourceType", default)]
    pub resource_type: String,
    #[serde(rename = "InstanceId", default)]
    pub instance_id: String,
    #[serde(rename = "RemoteIpAddress", default)]
    pub remote_ip_address: String,
    #[serde(rename = "RemoteIpCountry", default)]
    pub remote_ip_country: String,
    #[serde(rename = "ActionType", default)]
    pub action_type: String,
    #[serde(rename = "ThreatNames", default)]
    pub threat_names: String,
    #[serde(rename = "CreatedAt", default)]
    pub created_at: String,
    #[serde(rename = "UpdatedAt", default)]
    pub updated_at: String,
    #[serde(rename = "EventFirstSeen", default)]
    pub event_first_seen: String,
    #[serde(rename = "EventLastSeen", default)]
    pub event_last_seen: String,
    #[serde(rename = "Count", default)]
    pub count: String,
    #[serde(rename = "Archived", default)]
    pub archived: String,
}

impl TargetRecord {
    /// Serialized size of this record, as it would contribute to a batch.
    pub fn estimated_size(&self) -> usize {
        serde_json::to_vec(self).map(|v| v.len()).unwrap_or(0)
    }
}

/// Current wall-clock time formatted as the ISO-8601 string the Transformer
/// stamps onto `TimeGenerated` when a finding carries no usable timestamp.
pub fn now_iso8601() -> String {
    Utc::now().to_rfc3339()
}

/// Parses a loosely-formatted timestamp (RFC3339 or a handful of common
/// GuardDuty variants) into canonical ISO-8601/RFC3339. Returns `None` when
/// unparseable, matching the Transformer's "empty string and a recorded
/// warning" contract (the caller supplies the warning).
pub fn normalize_timestamp(raw: &str) -> Option<String> {
    if raw.is_empty() {
        return None;
    }
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc).to_rfc3339())
        .ok()
}
