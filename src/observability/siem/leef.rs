//! LEEF (Log Event Extended Format) rendering of audit events.
//!
//! # Format
//!
//! ```text
//! LEEF:2.0|SecurityAssessment|AuditLog|1.0|<eventId>|attr1=value1<TAB>attr2=value2
//! ```
//!
//! Attributes are tab-joined in a fixed order: `devTime`, `cat`, `sev`,
//! `action`, `resource`, then `usrName`, `src`, `country`, `city`,
//! `devType`, `browser`, `os` as the integration's inclusion flags and
//! the event's data allow. The resource attribute carries
//! `<entityType>:<entityId>`.

use std::fmt::Write as FmtWrite;

use super::{
    AuditEvent, DEVICE_PRODUCT, DEVICE_VENDOR, DEVICE_VERSION, SiemIntegration, action_severity,
    format_timestamp,
};

pub fn format_leef(event: &AuditEvent, integration: &SiemIntegration) -> String {
    let mut output = String::with_capacity(256);
    let _ = write!(
        output,
        "LEEF:2.0|{}|{}|{}|{}|",
        DEVICE_VENDOR,
        DEVICE_PRODUCT,
        DEVICE_VERSION,
        escape_leef_header(&event.id),
    );

    let mut attributes = Vec::new();
    attributes.push(format!(
        "devTime={}",
        escape_leef_value(&format_timestamp(&event.created_at))
    ));
    attributes.push("cat=audit".to_string());
    attributes.push(format!("sev={}", action_severity(&event.action)));
    attributes.push(format!("action={}", escape_leef_value(&event.action)));
    attributes.push(format!(
        "resource={}:{}",
        escape_leef_value(&event.entity_type),
        escape_leef_value(&event.entity_id)
    ));

    if let Some(user) = &event.user_id {
        attributes.push(format!("usrName={}", escape_leef_value(user)));
    }
    if integration.include_ip
        && let Some(ip) = &event.ip_address
    {
        attributes.push(format!("src={}", escape_leef_value(ip)));
    }
    if integration.include_geo
        && let Some(geo) = &event.geo
    {
        if let Some(country) = &geo.country {
            attributes.push(format!("country={}", escape_leef_value(country)));
        }
        if let Some(city) = &geo.city {
            attributes.push(format!("city={}", escape_leef_value(city)));
        }
    }
    if integration.include_device
        && let Some(device) = &event.device
    {
        if let Some(kind) = &device.device_type {
            attributes.push(format!("devType={}", escape_leef_value(kind)));
        }
        if let Some(browser) = &device.browser {
            attributes.push(format!("browser={}", escape_leef_value(browser)));
        }
        if let Some(os) = &device.os {
            attributes.push(format!("os={}", escape_leef_value(os)));
        }
    }

    output.push_str(&attributes.join("\t"));
    output
}

/// Header fields use `|` as delimiter, so `|` must be escaped with `\`.
fn escape_leef_header(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '|' => result.push_str("\\|"),
            '\\' => result.push_str("\\\\"),
            '\n' => result.push_str("\\n"),
            '\r' => result.push_str("\\r"),
            _ => result.push(c),
        }
    }
    result
}

/// Attribute values escape the tab delimiter, `=`, and special characters.
fn escape_leef_value(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\t' => result.push_str("\\x09"),
            '\\' => result.push_str("\\\\"),
            '=' => result.push_str("\\="),
            '\n' => result.push_str("\\n"),
            '\r' => result.push_str("\\r"),
            _ => result.push(c),
        }
    }
    result
}
