//! Flat JSON rendering of audit events.
//!
//! Field order follows the struct declaration; optional blocks are
//! omitted entirely rather than serialized as null so downstream
//! schema-on-read tooling sees a stable shape.

use serde::Serialize;

use super::{AuditEvent, SiemIntegration, action_severity, format_timestamp};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct JsonRecord<'a> {
    timestamp: String,
    event_id: &'a str,
    severity: u8,
    category: &'static str,
    action: &'a str,
    entity_type: &'a str,
    entity_id: &'a str,
    changes: &'a serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    user_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    source_ip: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    geo: Option<GeoRecord<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    device: Option<DeviceRecord<'a>>,
}

#[derive(Serialize)]
struct GeoRecord<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    country: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    city: Option<&'a str>,
}

#[derive(Serialize)]
struct DeviceRecord<'a> {
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    device_type: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    browser: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    os: Option<&'a str>,
}

pub fn format_json(event: &AuditEvent, integration: &SiemIntegration) -> String {
    let record = JsonRecord {
        timestamp: format_timestamp(&event.created_at),
        event_id: &event.id,
        severity: action_severity(&event.action),
        category: "audit",
        action: &event.action,
        entity_type: &event.entity_type,
        entity_id: &event.entity_id,
        changes: &event.changes,
        user_id: event.user_id.as_deref(),
        source_ip: if integration.include_ip {
            event.ip_address.as_deref()
        } else {
            None
        },
        geo: if integration.include_geo {
            event.geo.as_ref().map(|geo| GeoRecord {
                country: geo.country.as_deref(),
                city: geo.city.as_deref(),
            })
        } else {
            None
        },
        device: if integration.include_device {
            event.device.as_ref().map(|device| DeviceRecord {
                device_type: device.device_type.as_deref(),
                browser: device.browser.as_deref(),
                os: device.os.as_deref(),
            })
        } else {
            None
        },
    };

    serde_json::to_string(&record).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::super::test_fixtures::{sample_event, sample_integration};
    use super::super::SiemFormat;
    use super::*;

    #[test]
    fn golden_json_all_fields() {
        let output = format_json(&sample_event(), &sample_integration(SiemFormat::Json));

        assert_eq!(
            output,
            concat!(
                r#"{"timestamp":"2026-01-15T10:30:00.000Z","eventId":"evt-001","severity":7,"#,
                r#""category":"audit","action":"delete","entityType":"assessment","entityId":"a-42","#,
                r#""changes":{"status":["active","archived"]},"userId":"user-7","sourceIp":"203.0.113.9","#,
                r#""geo":{"country":"US","city":"Seattle"},"#,
                r#""device":{"type":"desktop","browser":"Firefox","os":"Linux"}}"#
            )
        );
    }

    #[test]
    fn inclusion_flags_drop_optional_blocks() {
        let mut integration = sample_integration(SiemFormat::Json);
        integration.include_ip = false;
        integration.include_geo = false;
        integration.include_device = false;

        let output = format_json(&sample_event(), &integration);

        assert!(!output.contains("sourceIp"));
        assert!(!output.contains("\"geo\""));
        assert!(!output.contains("\"device\""));
        // userId is not gated by an inclusion flag
        assert!(output.contains(r#""userId":"user-7""#));
    }

    #[test]
    fn anonymous_event_omits_user_id() {
        let mut event = sample_event();
        event.user_id = None;

        let output = format_json(&event, &sample_integration(SiemFormat::Json));

        assert!(!output.contains("userId"));
    }
}
