//! Structured JSON log layer with redaction on the write path.
//!
//! Each tracing event becomes exactly one JSON line. WARN and ERROR land on
//! stderr, everything else on stdout, and the writer is flushed per event so
//! lines are never lost to buffering. Message and field values pass through
//! the redaction pass before serialization.

use std::{
    io::{self, Write},
    sync::Mutex,
};

use chrono::Utc;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{
    Event, Level, Subscriber,
    field::{Field, Visit},
};
use tracing_subscriber::{Layer, layer::Context};

use super::redact::{redact_fields, redact_str};

/// A tracing layer that writes one redacted JSON line per event.
pub struct RedactingJsonLayer<O: Write + Send + 'static, E: Write + Send + 'static> {
    out: Mutex<O>,
    err: Mutex<E>,
}

impl<O: Write + Send + 'static, E: Write + Send + 'static> RedactingJsonLayer<O, E> {
    /// Create a layer over an explicit writer pair.
    pub fn new(out: O, err: E) -> Self {
        Self {
            out: Mutex::new(out),
            err: Mutex::new(err),
        }
    }
}

impl RedactingJsonLayer<io::Stdout, io::Stderr> {
    /// Create a layer over the process stdio pair.
    pub fn stdio() -> Self {
        Self::new(io::stdout(), io::stderr())
    }
}

impl<S, O, E> Layer<S> for RedactingJsonLayer<O, E>
where
    S: Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
    O: Write + Send + 'static,
    E: Write + Send + 'static,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();

        let mut visitor = JsonFieldVisitor::new();
        event.record(&mut visitor);

        let timestamp = Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string();
        let line = format_json_line(
            &timestamp,
            metadata.level(),
            metadata.target(),
            visitor.message.as_deref().unwrap_or(""),
            visitor.fields,
        );

        match *metadata.level() {
            Level::ERROR | Level::WARN => {
                if let Ok(mut writer) = self.err.lock() {
                    let _ = writeln!(writer, "{line}");
                    let _ = writer.flush();
                }
            }
            _ => {
                if let Ok(mut writer) = self.out.lock() {
                    let _ = writeln!(writer, "{line}");
                    let _ = writer.flush();
                }
            }
        }
    }
}

/// Visitor that collects fields from a tracing event, keeping native JSON
/// types where tracing exposes them.
struct JsonFieldVisitor {
    fields: Map<String, Value>,
    message: Option<String>,
}

impl JsonFieldVisitor {
    fn new() -> Self {
        Self {
            fields: Map::new(),
            message: None,
        }
    }
}

impl Visit for JsonFieldVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        let name = field.name();
        let value_str = format!("{:?}", value);

        if name == "message" {
            self.message = Some(value_str.trim_matches('"').to_string());
        } else {
            self.fields.insert(name.to_string(), Value::String(value_str));
        }
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        let name = field.name();

        if name == "message" {
            self.message = Some(value.to_string());
        } else {
            self.fields
                .insert(name.to_string(), Value::String(value.to_string()));
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.fields.insert(field.name().to_string(), Value::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.fields.insert(field.name().to_string(), Value::from(value));
    }

    fn record_i128(&mut self, field: &Field, value: i128) {
        self.fields
            .insert(field.name().to_string(), Value::String(value.to_string()));
    }

    fn record_u128(&mut self, field: &Field, value: u128) {
        self.fields
            .insert(field.name().to_string(), Value::String(value.to_string()));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.fields.insert(field.name().to_string(), Value::from(value));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.fields.insert(field.name().to_string(), Value::from(value));
    }

    fn record_error(&mut self, field: &Field, value: &(dyn std::error::Error + 'static)) {
        self.fields
            .insert(field.name().to_string(), Value::String(value.to_string()));
    }
}

#[derive(Serialize)]
struct JsonLogLine<'a> {
    timestamp: &'a str,
    level: &'a str,
    target: &'a str,
    message: &'a str,
    #[serde(skip_serializing_if = "Map::is_empty")]
    fields: Map<String, Value>,
}

fn level_str(level: &Level) -> &'static str {
    match *level {
        Level::TRACE => "TRACE",
        Level::DEBUG => "DEBUG",
        Level::INFO => "INFO",
        Level::WARN => "WARN",
        Level::ERROR => "ERROR",
    }
}

/// Serialize one redacted log line, without the trailing newline.
fn format_json_line(
    timestamp: &str,
    level: &Level,
    target: &str,
    message: &str,
    mut fields: Map<String, Value>,
) -> String {
    redact_fields(&mut fields);
    let message = redact_str(message);

    let record = JsonLogLine {
        timestamp,
        level: level_str(level),
        target,
        message: &message,
        fields,
    };
    serde_json::to_string(&record).unwrap_or_default()
}
