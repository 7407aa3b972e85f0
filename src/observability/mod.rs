//! Logging and audit observability.
//!
//! This module provides:
//! - Structured JSON logging with secret redaction on every line
//! - Tracing initialization with configurable formats (json, pretty, compact)
//! - SIEM formatting and delivery for audit events (CEF, LEEF, Syslog, JSON)

pub mod logger;
pub mod redact;
pub mod siem;
mod tracing_init;

pub use tracing_init::*;
