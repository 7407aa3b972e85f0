//! CEF (Common Event Format) rendering of audit events.
//!
//! # Format
//!
//! ```text
//! CEF:0|SecurityAssessment|AuditLog|1.0|<action>|<entityType> <action>|<severity>|<extension>
//! ```
//!
//! The extension is space-joined `key=value` pairs in a fixed order:
//! `rt` (epoch milliseconds), `cs1`/`cs1Label` for the entity id, then
//! `suser`, `src`, and the `cs2..cs5` custom strings for geo and device
//! data when the integration includes them. Absent pairs are dropped,
//! never emitted empty.

use std::fmt::Write as FmtWrite;

use super::{
    AuditEvent, DEVICE_PRODUCT, DEVICE_VENDOR, DEVICE_VERSION, SiemIntegration, action_severity,
};

pub fn format_cef(event: &AuditEvent, integration: &SiemIntegration) -> String {
    let name = format!("{} {}", event.entity_type, event.action);

    let mut output = String::with_capacity(256);
    let _ = write!(
        output,
        "CEF:0|{}|{}|{}|{}|{}|{}|",
        DEVICE_VENDOR,
        DEVICE_PRODUCT,
        DEVICE_VERSION,
        escape_cef_header(&event.action),
        escape_cef_header(&name),
        action_severity(&event.action)
    );

    let mut extensions = Vec::new();
    extensions.push(format!("rt={}", event.created_at.timestamp_millis()));
    extensions.push(format!("cs1={}", escape_cef_extension(&event.entity_id)));
    extensions.push("cs1Label=EntityID".to_string());

    if let Some(user) = &event.user_id {
        extensions.push(format!("suser={}", escape_cef_extension(user)));
    }
    if integration.include_ip
        && let Some(ip) = &event.ip_address
    {
        extensions.push(format!("src={}", escape_cef_extension(ip)));
    }
    if integration.include_geo
        && let Some(geo) = &event.geo
    {
        if let Some(country) = &geo.country {
            extensions.push(format!("cs2={}", escape_cef_extension(country)));
            extensions.push("cs2Label=Country".to_string());
        }
        if let Some(city) = &geo.city {
            extensions.push(format!("cs3={}", escape_cef_extension(city)));
            extensions.push("cs3Label=City".to_string());
        }
    }
    if integration.include_device
        && let Some(device) = &event.device
    {
        if let Some(kind) = &device.device_type {
            extensions.push(format!("cs4={}", escape_cef_extension(kind)));
            extensions.push("cs4Label=DeviceType".to_string());
        }
        // Browser and OS share the last custom-string slot.
        let agent = match (&device.browser, &device.os) {
            (Some(browser), Some(os)) => Some(format!("{browser}/{os}")),
            (Some(browser), None) => Some(browser.clone()),
            (None, Some(os)) => Some(os.clone()),
            (None, None) => None,
        };
        if let Some(agent) = agent {
            extensions.push(format!("cs5={}", escape_cef_extension(&agent)));
            extensions.push("cs5Label=UserAgent".to_string());
        }
    }

    output.push_str(&extensions.join(" "));
    output
}

/// Header fields use `|` as delimiter, so `|` and `\` must be escaped.
fn escape_cef_header(s: &str) -> String {
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

/// Extension values escape `=`, backslash, and newlines.
fn escape_cef_extension(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => result.push_str("\\\\"),
            '=' => result.push_str("\\="),
            '\n' => result.push_str("\\n"),
            '\r' => result.push_str("\\r"),
            _ => result.push(c),
        }
    }
    result
}
