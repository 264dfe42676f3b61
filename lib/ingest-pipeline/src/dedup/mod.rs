//! C3: Deduplicator — suppresses previously-seen findings via a bounded,
//! concurrency-safe LRU cache keyed by id, content hash, or time window.
//! See `spec.md` §4.3.

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use ingest_core::config::{DedupStrategy, DeduplicationConfig};
use ingest_core::finding::Finding;
use lru::LruCache;
use sha2::{Digest, Sha256};

use crate::internal_events::{emit, DedupHitRate, DedupSuppressed};

/// A bounded cache of previously-seen finding keys, safe under concurrent
/// `filter` callers. Modeled on the teacher corpus's plain `lru::LruCache`
/// usage (e.g. a retry-tracking cache keyed by request id), wrapped in a
/// `Mutex` here since insert/lookup never spans an `.await`.
pub struct Deduplicator {
    strategy: DedupStrategy,
    window: Duration,
    cache: Mutex<LruCache<String, DateTime<Utc>>>,
    total: AtomicU64,
    suppressed: AtomicU64,
}

impl Deduplicator {
    pub fn new(config: &DeduplicationConfig) -> Self {
        let capacity = NonZeroUsize::new(config.cache_size.max(1)).unwrap();
        Self {
            strategy: config.strategy,
            window: Duration::minutes(config.time_window_minutes.max(1) as i64),
            cache: Mutex::new(LruCache::new(capacity)),
            total: AtomicU64::new(0),
            suppressed: AtomicU64::new(0),
        }
    }

    /// Returns the subset of `findings` not previously observed within the
    /// active window, recording newly-seen keys atomically as it goes. The
    /// invariant "no key emitted twice" holds across concurrent callers
    /// sharing this `Deduplicator`, though interleaving across calls is
    /// unspecified (`spec.md` §4.3).
    pub fn filter(&self, findings: Vec<Finding>) -> Vec<Finding> {
        let now = Utc::now();
        let mut kept = Vec::with_capacity(findings.len());

        for finding in findings {
            self.total.fetch_add(1, Ordering::Relaxed);
            let key = self.key_for(&finding);

            let is_new = {
                let mut cache = self.cache.lock().unwrap();
                match cache.get(&key) {
                    Some(first_seen) if now.signed_duration_since(*first_seen) <= self.window => {
                        false
                    }
                    _ => {
                        cache.put(key.clone(), now);
                        true
                    }
                }
            };

            if is_new {
                kept.push(finding);
            } else {
                self.suppressed.fetch_add(1, Ordering::Relaxed);
                emit(DedupSuppressed { key });
            }
        }

        let total = self.total.load(Ordering::Relaxed);
        let suppressed = self.suppressed.load(Ordering::Relaxed);
        emit(DedupHitRate {
            hit_rate: if total == 0 {
                0.0
            } else {
                suppressed as f64 / total as f64
            },
            cache_len: self.cache.lock().unwrap().len(),
        });

        kept
    }

    fn key_for(&self, finding: &Finding) -> String {
        match self.strategy {
            DedupStrategy::ById => finding.id.clone(),
            DedupStrategy::ContentHash => content_hash(finding),
            DedupStrategy::TimeWindow => {
                let updated = DateTime::parse_from_rfc3339(&finding.updated_at)
                    .map(|dt| dt.timestamp())
                    .unwrap_or(0);
                let window_secs = self.window.num_seconds().max(1);
                format!("{}|{}", finding.id, updated / window_secs)
            }
        }
    }
}

/// SHA-256 of the finding's raw JSON with object keys sorted and whitespace
/// removed, per `spec.md` §4.3's content-hash strategy definition.
fn content_hash(finding: &Finding) -> String {
    let canonical = canonicalize(&finding.raw);
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn canonicalize(value: &serde_json::Value) -> String {
    use serde_json::Value;
    match value {
        Value::Object(map) => {
            let sorted: std::collections::BTreeMap<_, _> =
                map.iter().map(|(k, v)| (k.clone(), canonicalize(v))).collect();
            let body = sorted
                .into_iter()
                .map(|(k, v)| format!("{:?}:{}", k, v))
                .collect::<Vec<_>>()
                .join(",");
            format!("{{{body}}}")
        }
        Value::Array(items) => {
            let body = items.iter().map(canonicalize).collect::<Vec<_>>().join(",");
            format!("[{body}]")
        }
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config(strategy: DedupStrategy) -> DeduplicationConfig {
        DeduplicationConfig {
            enabled: true,
            strategy,
            time_window_minutes: 60,
            cache_size: 16,
        }
    }

    fn finding(id: &str, updated_at: &str) -> Finding {
        Finding::from_value(json!({"id": id, "updatedAt": updated_at})).unwrap()
    }

    #[test]
    fn by_id_suppresses_exact_repeats() {
        let dedup = Deduplicator::new(&config(DedupStrategy::ById));
        let kept = dedup.filter(vec![
            finding("f1", "2026-01-01T00:00:00Z"),
            finding("f1", "2026-01-01T00:00:00Z"),
            finding("f2", "2026-01-01T00:00:00Z"),
        ]);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].id, "f1");
        assert_eq!(kept[1].id, "f2");
    }

    #[test]
    fn content_hash_dedupes_identical_payloads_with_different_ids_field_untouched() {
        let dedup = Deduplicator::new(&config(DedupStrategy::ContentHash));
        let a = Finding::from_value(json!({"id": "f1", "title": "x"})).unwrap();
        let b = Finding::from_value(json!({"id": "f1", "title": "x"})).unwrap();
        let kept = dedup.filter(vec![a, b]);
        assert_eq!(kept.len(), 1);
    }

    #[test]
    fn time_window_allows_recurrence_across_windows() {
        let dedup = Deduplicator::new(&config(DedupStrategy::TimeWindow));
        let kept = dedup.filter(vec![
            finding("f1", "2026-01-01T00:00:00Z"),
            finding("f1", "2026-01-01T00:30:00Z"),
            finding("f1", "2026-01-01T05:00:00Z"),
        ]);
        // first two fall in the same 60-minute bucket; the third is 5 hours later.
        assert_eq!(kept.len(), 2);
    }

    #[test]
    fn lru_evicts_least_recently_used_beyond_capacity() {
        let mut small = config(DedupStrategy::ById);
        small.cache_size = 2;
        let dedup = Deduplicator::new(&small);
        let kept = dedup.filter(vec![
            finding("a", "2026-01-01T00:00:00Z"),
            finding("b", "2026-01-01T00:00:00Z"),
            finding("c", "2026-01-01T00:00:00Z"),
            finding("a", "2026-01-01T00:00:00Z"),
        ]);
        // "a" was evicted by the time it recurs, so it is treated as new again.
        assert_eq!(kept.len(), 4);
    }
}
