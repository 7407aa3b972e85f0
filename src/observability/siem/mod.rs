//! Audit-event rendering and forwarding for SIEM integration.
//!
//! Audit events produced by the platform are delivered to customer-managed
//! SIEM endpoints. Each integration picks one wire format:
//!
//! - **JSON**: flat object, one event per POST body
//! - **CEF (Common Event Format)**: ArcSight-originated, pipe-delimited
//!   header with `key=value` extensions
//! - **LEEF (Log Event Extended Format)**: IBM QRadar, tab-delimited
//!   attributes
//! - **Syslog (RFC 5424)**: standard syslog line with one structured-data
//!   element
//!
//! The layouts are compatibility-critical: downstream parsers match on
//! exact field order, so each formatter is covered by golden-string tests.
//!
//! # Severity
//!
//! Severity is derived from the audit action, not from a log level:
//!
//! | Action            | CEF/LEEF/JSON | Syslog |
//! |-------------------|---------------|--------|
//! | `delete`          | 7             | 2 (critical) |
//! | `disable`         | 5             | 4 (warning)  |
//! | `create`/`update`/`enable` | 3    | 6 (info)     |
//! | anything else     | 5             | 6 (info)     |

pub mod cef;
pub mod forward;
pub mod json;
pub mod leef;
pub mod syslog;

pub use cef::format_cef;
pub use forward::{DeliveryRecord, IntegrationHealth, SiemForwarder};
pub use json::format_json;
pub use leef::format_leef;
pub use syslog::format_syslog;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Device identity carried in every CEF and LEEF header.
pub const DEVICE_VENDOR: &str = "SecurityAssessment";
pub const DEVICE_PRODUCT: &str = "AuditLog";
pub const DEVICE_VERSION: &str = "1.0";

/// One audit record, produced upstream by the audit-log pipeline and
/// consumed read-only here.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEvent {
    pub id: String,
    pub entity_type: String,
    pub entity_id: String,
    pub action: String,
    #[serde(default)]
    pub changes: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geo: Option<GeoInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device: Option<DeviceInfo>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeoInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInfo {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub device_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub browser: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub os: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SiemFormat {
    Json,
    Cef,
    Leef,
    Syslog,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SiemAuthType {
    #[default]
    None,
    Bearer,
    Basic,
    ApiKey,
}

/// A configured SIEM destination with its format, auth, and
/// field-inclusion policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SiemIntegration {
    pub id: String,
    pub name: String,
    pub endpoint_url: String,
    pub format: SiemFormat,
    #[serde(default)]
    pub auth_type: SiemAuthType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_header: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_secret_ref: Option<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub include_ip: bool,
    #[serde(default)]
    pub include_geo: bool,
    #[serde(default)]
    pub include_device: bool,
    /// Entity types to forward; `None` or empty forwards everything.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_filter: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_filter: Option<Vec<String>>,
}

fn default_enabled() -> bool {
    true
}

/// Numeric severity for an action, on the 0-10 scale CEF and LEEF share.
pub fn action_severity(action: &str) -> u8 {
    match action {
        "delete" => 7,
        "disable" => 5,
        "create" | "update" | "enable" => 3,
        _ => 5,
    }
}

/// RFC 5424 severity for an action.
pub fn syslog_severity(action: &str) -> u8 {
    match action {
        "delete" => 2,
        "disable" => 4,
        _ => 6,
    }
}

/// Every format carries UTC timestamps at millisecond precision.
pub(crate) fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Render an event in the integration's configured format.
pub fn format_event(event: &AuditEvent, integration: &SiemIntegration) -> String {
    match integration.format {
        SiemFormat::Json => format_json(event, integration),
        SiemFormat::Cef => format_cef(event, integration),
        SiemFormat::Leef => format_leef(event, integration),
        SiemFormat::Syslog => format_syslog(event, integration),
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_severity_table() {
        assert_eq!(action_severity("delete"), 7);
        assert_eq!(action_severity("disable"), 5);
        assert_eq!(action_severity("create"), 3);
        assert_eq!(action_severity("update"), 3);
        assert_eq!(action_severity("enable"), 3);
        assert_eq!(action_severity("export"), 5);
    }

    #[test]
    fn syslog_severity_table() {
        assert_eq!(syslog_severity("delete"), 2);
        assert_eq!(syslog_severity("disable"), 4);
        assert_eq!(syslog_severity("create"), 6);
        assert_eq!(syslog_severity("anything"), 6);
    }

    #[test]
    fn timestamps_are_millisecond_utc() {
        let event = test_fixtures::sample_event();
        assert_eq!(format_timestamp(&event.created_at), "2026-01-15T10:30:00.000Z");
    }

    #[test]
    fn integration_deserializes_with_defaults() {
        let integration: SiemIntegration = serde_json::from_value(serde_json::json!({
            "id": "int-9",
            "name": "splunk",
            "endpointUrl": "https://splunk.example.com/hec",
            "format": "cef"
        }))
        .unwrap();

        assert!(integration.enabled);
        assert_eq!(integration.auth_type, SiemAuthType::None);
        assert!(!integration.include_ip);
        assert!(integration.entity_filter.is_none());
    }
}
