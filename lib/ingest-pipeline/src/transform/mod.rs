//! C4: Transformer — maps a [`Finding`] onto a [`TargetRecord`] via the
//! fixed, priority-ordered path map from `SPEC_FULL.md` §4.4. See also
//! `spec.md` §4.4.

use ingest_core::finding::{normalize_timestamp, now_iso8601, Finding, TargetRecord};
use serde_json::Value;

use crate::internal_events::{emit, TransformWarning};

/// Extracts a nested field by trying each path in priority order and
/// returning the first that resolves to a non-empty string. Paths
/// extracted from an array wildcard (`ThreatNames`) are joined separately.
fn first_string(finding: &Finding, paths: &[&str]) -> String {
    for path in paths {
        if let Some(value) = finding.lookup(path) {
            if let Some(s) = value.as_str() {
                if !s.is_empty() {
                    return s.to_owned();
                }
            } else if let Some(n) = value.as_f64() {
                return n.to_string();
            } else if let Some(b) = value.as_bool() {
                return b.to_string();
            }
        }
    }
    String::new()
}

/// `ThreatNames` is the one field that joins multiple matches rather than
/// taking the first: a direct list, or a nested `[*].threatNames.[*]` path.
fn threat_names(finding: &Finding) -> String {
    if let Some(Value::String(name)) = finding.lookup("service.additionalInfo.threatListName") {
        if !name.is_empty() {
            return name.clone();
        }
    }
    if let Some(details) = finding
        .lookup("service.threatIntelligenceDetails")
        .and_then(Value::as_array)
    {
        let names: Vec<String> = details
            .iter()
            .filter_map(|detail| detail.get("threatNames"))
            .filter_map(Value::as_array)
            .flatten()
            .filter_map(Value::as_str)
            .map(str::to_owned)
            .collect();
        if !names.is_empty() {
            return names.join(",");
        }
    }
    String::new()
}

/// Transforms one finding into a sink-ready record. Never fails: every
/// missing or unparseable field degrades to an empty string plus a recorded
/// warning, per `spec.md` §4.4.
pub fn transform(finding: &Finding, normalize: bool) -> TargetRecord {
    let time_generated = normalize_timestamp(&finding.created_at).unwrap_or_else(now_iso8601);

    let created_at = if finding.created_at.is_empty() {
        String::new()
    } else {
        normalize_timestamp(&finding.created_at).unwrap_or_else(|| {
            emit(TransformWarning {
                finding_id: finding.id.clone(),
                field: "CreatedAt",
                message: format!("unparseable timestamp: {}", finding.created_at),
            });
            String::new()
        })
    };

    let updated_at = if finding.updated_at.is_empty() {
        String::new()
    } else {
        normalize_timestamp(&finding.updated_at).unwrap_or_else(|| {
            emit(TransformWarning {
                finding_id: finding.id.clone(),
                field: "UpdatedAt",
                message: format!("unparseable timestamp: {}", finding.updated_at),
            });
            String::new()
        })
    };

    let mut record = TargetRecord {
        time_generated,
        finding_id: finding.id.clone(),
        account_id: finding.account_id.clone(),
        region: finding.region.clone(),
        severity: finding.severity,
        finding_type: finding.finding_type.clone(),
        raw_json: finding.raw.to_string(),
        title: finding.title.clone(),
        description: finding.description.clone(),
        created_at,
        updated_at,
        ..empty_record()
    };

    if !normalize {
        return record;
    }

    record.service = first_string(finding, &["service.serviceName"]);
    record.resource_type = first_string(finding, &["resource.resourceType"]);
    record.instance_id = first_string(finding, &["resource.instanceDetails.instanceId"]);
    record.remote_ip_address = first_string(
        finding,
        &[
            "service.action.networkConnectionAction.remoteIpDetails.ipAddressV4",
            "service.action.dnsRequestAction.remoteIpDetails.ipAddressV4",
            "service.action.portProbeAction.portProbeDetails[0].remoteIpDetails.ipAddressV4",
        ],
    );
    record.remote_ip_country = first_string(
        finding,
        &[
            "service.action.networkConnectionAction.remoteIpDetails.country.countryName",
            "service.action.dnsRequestAction.remoteIpDetails.country.countryName",
        ],
    );
    record.action_type = first_string(finding, &["service.action.actionType"]);
    record.threat_names = threat_names(finding);
    record.event_first_seen = first_string(finding, &["service.eventFirstSeen"]);
    record.event_last_seen = first_string(finding, &["service.eventLastSeen"]);
    record.count = first_string(finding, &["service.count"]);
    record.archived = first_string(finding, &["service.archived"]);

    record
}

fn empty_record() -> TargetRecord {
    TargetRecord {
        time_generated: String::new(),
        finding_id: String::new(),
        account_id: String::new(),
        region: String::new(),
        severity: 0.0,
        finding_type: String::new(),
        raw_json: String::new(),
        title: String::new(),
        description: String::new(),
        service: String::new(),
        resource_type: String::new(),
        instance_id: String::new(),
        remote_ip_address: String::new(),
        remote_ip_country: String::new(),
        action_type: String::new(),
        threat_names: String::new(),
        created_at: String::new(),
        updated_at: String::new(),
        event_first_seen: String::new(),
        event_last_seen: String::new(),
        count: String::new(),
        archived: String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn raw_json_is_verbatim_and_time_generated_falls_back_to_now() {
        let value = json!({"id": "f1", "severity": 5.0});
        let finding = Finding::from_value(value.clone()).unwrap();
        let record = transform(&finding, true);
        assert_eq!(record.raw_json, value.to_string());
        assert!(!record.time_generated.is_empty());
    }

    #[test]
    fn remote_ip_prefers_network_connection_over_dns() {
        let value = json!({
            "id": "f1",
            "service": {
                "action": {
                    "networkConnectionAction": {
                        "remoteIpDetails": {"ipAddressV4": "1.2.3.4"}
                    },
                    "dnsRequestAction": {
                        "remoteIpDetails": {"ipAddressV4": "9.9.9.9"}
                    }
                }
            }
        });
        let finding = Finding::from_value(value).unwrap();
        let record = transform(&finding, true);
        assert_eq!(record.remote_ip_address, "1.2.3.4");
    }

    #[test]
    fn remote_ip_falls_back_to_port_probe_first_entry() {
        let value = json!({
            "id": "f1",
            "service": {
                "action": {
                    "portProbeAction": {
                        "portProbeDetails": [
                            {"remoteIpDetails": {"ipAddressV4": "5.5.5.5"}}
                        ]
                    }
                }
            }
        });
        let finding = Finding::from_value(value).unwrap();
        let record = transform(&finding, true);
        assert_eq!(record.remote_ip_address, "5.5.5.5");
    }

    #[test]
    fn threat_names_joins_nested_wildcard_list() {
        let value = json!({
            "id": "f1",
            "service": {
                "threatIntelligenceDetails": [
                    {"threatNames": ["Scanner:Generic", "Tor:Exit"]}
                ]
            }
        });
        let finding = Finding::from_value(value).unwrap();
        let record = transform(&finding, true);
        assert_eq!(record.threat_names, "Scanner:Generic,Tor:Exit");
    }

    #[test]
    fn missing_paths_yield_empty_string_without_failing() {
        let finding = Finding::from_value(json!({"id": "f1"})).unwrap();
        let record = transform(&finding, true);
        assert_eq!(record.remote_ip_address, "");
        assert_eq!(record.instance_id, "");
    }

    #[test]
    fn normalization_disabled_skips_nested_extraction() {
        let value = json!({
            "id": "f1",
            "service": {"serviceName": "guardduty"}
        });
        let finding = Finding::from_value(value).unwrap();
        let record = transform(&finding, false);
        assert_eq!(record.service, "");
    }

    #[test]
    fn unparseable_date_yields_empty_string_and_warning() {
        let value = json!({"id": "f1", "createdAt": "not-a-date"});
        let finding = Finding::from_value(value).unwrap();
        let record = transform(&finding, true);
        assert_eq!(record.created_at, "");
    }
}
