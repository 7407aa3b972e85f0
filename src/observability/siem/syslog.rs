//! Syslog (RFC 5424) rendering of audit events.
//!
//! # Format
//!
//! ```text
//! <PRI>1 TIMESTAMP security-assessment audit-log - MSGID [audit@12345 k="v" ...] MSG
//! ```
//!
//! - **PRI**: `facility * 8 + severity` with the facility fixed at 13
//!   (log audit)
//! - **MSGID**: the audit event id
//! - **SD**: one `audit@12345` structured-data element carrying user,
//!   source IP, geo, and device parameters as the integration allows
//! - **MSG**: `<entityType> <action>: <entityId>`

use std::fmt::Write as FmtWrite;

use super::{AuditEvent, SiemIntegration, format_timestamp, syslog_severity};

/// Facility 13 is "log audit" in RFC 5424.
const FACILITY: u16 = 13;

const HOSTNAME: &str = "security-assessment";
const APP_NAME: &str = "audit-log";
const SD_ID: &str = "audit@12345";

pub fn format_syslog(event: &AuditEvent, integration: &SiemIntegration) -> String {
    let priority = FACILITY * 8 + u16::from(syslog_severity(&event.action));

    let mut output = String::with_capacity(256);
    let _ = write!(
        output,
        "<{}>1 {} {} {} - {} ",
        priority,
        format_timestamp(&event.created_at),
        HOSTNAME,
        APP_NAME,
        sanitize_syslog_field(&event.id, 32),
    );

    output.push_str(&format_structured_data(event, integration));

    let _ = write!(
        output,
        " {} {}: {}",
        event.entity_type, event.action, event.entity_id
    );
    output
}

fn format_structured_data(event: &AuditEvent, integration: &SiemIntegration) -> String {
    let mut params = Vec::new();

    if let Some(user) = &event.user_id {
        params.push(("user", user.clone()));
    }
    if integration.include_ip
        && let Some(ip) = &event.ip_address
    {
        params.push(("ip", ip.clone()));
    }
    if integration.include_geo
        && let Some(geo) = &event.geo
    {
        if let Some(country) = &geo.country {
            params.push(("country", country.clone()));
        }
        if let Some(city) = &geo.city {
            params.push(("city", city.clone()));
        }
    }
    if integration.include_device
        && let Some(device) = &event.device
    {
        if let Some(kind) = &device.device_type {
            params.push(("deviceType", kind.clone()));
        }
        if let Some(browser) = &device.browser {
            params.push(("browser", browser.clone()));
        }
        if let Some(os) = &device.os {
            params.push(("os", os.clone()));
        }
    }

    let mut output = String::with_capacity(128);
    output.push('[');
    output.push_str(SD_ID);
    for (key, value) in params {
        let _ = write!(output, " {}=\"{}\"", key, escape_sd_value(&value));
    }
    output.push(']');
    output
}

/// Header fields allow printable US-ASCII only, no spaces, bounded length.
fn sanitize_syslog_field(s: &str, max_len: usize) -> String {
    let sanitized: String = s
        .chars()
        .filter(|c| *c >= '\x21' && *c <= '\x7e')
        .take(max_len)
        .collect();

    if sanitized.is_empty() {
        "-".to_string()
    } else {
        sanitized
    }
}

/// SD-PARAM-VALUE escapes `\`, `"`, and `]`.
fn escape_sd_value(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => result.push_str("\\\\"),
            '"' => result.push_str("\\\""),
            ']' => result.push_str("\\]"),
            _ => result.push(c),
        }
    }
    result
}
