//! Tracing initialization with configurable log formats.

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::{config::LogFormat, observability::logger::RedactingJsonLayer};

/// Default filter applied when `RUST_LOG` is unset or unparseable.
const DEFAULT_FILTER: &str = "info,hyper=warn,h2=warn,tower=info,reqwest=warn";

/// Initialize the global tracing subscriber.
///
/// The `json` format routes events through the redacting JSON layer; `pretty`
/// and `compact` use the stock fmt layers for local development. Filtering
/// honors `RUST_LOG` and falls back to an info-level default that quiets
/// noisy transport crates.
pub fn init_tracing(format: LogFormat) -> Result<(), TracingError> {
    let filter = build_env_filter();

    match format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(RedactingJsonLayer::stdio())
            .try_init(),
        LogFormat::Pretty => {
            let fmt_layer = tracing_subscriber::fmt::layer()
                .pretty()
                .with_target(true)
                .with_thread_ids(false);
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt_layer)
                .try_init()
        }
        LogFormat::Compact => {
            let fmt_layer = tracing_subscriber::fmt::layer().compact().with_target(true);
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt_layer)
                .try_init()
        }
    }
    .map_err(|e| TracingError::Init(e.to_string()))
}

/// Build the environment filter from `RUST_LOG`.
fn build_env_filter() -> EnvFilter {
    match std::env::var("RUST_LOG") {
        Ok(spec) => EnvFilter::try_new(spec).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER)),
        Err(_) => EnvFilter::new(DEFAULT_FILTER),
    }
}

/// Tracing initialization errors.
#[derive(Debug, thiserror::Error)]
pub enum TracingError {
    #[error("Failed to initialize tracing: {0}")]
    Init(String),
}

#[cfg(test)]
mod tests {
    use serial_test::serial;

    use super::*;

    #[test]
    #[serial]
    fn env_filter_honors_rust_log() {
        temp_env::with_var("RUST_LOG", Some("debug,hyper=error"), || {
            let rendered = build_env_filter().to_string();
            assert!(rendered.contains("hyper=error"), "got: {rendered}");
            assert!(rendered.contains("debug"), "got: {rendered}");
        });
    }

    #[test]
    #[serial]
    fn env_filter_falls_back_on_invalid_spec() {
        temp_env::with_var("RUST_LOG", Some("not a ==== filter"), || {
            let filter = build_env_filter();
            assert_eq!(filter.to_string(), EnvFilter::new(DEFAULT_FILTER).to_string());
        });
    }

    #[test]
    #[serial]
    fn env_filter_defaults_when_unset() {
        temp_env::with_var("RUST_LOG", None::<&str>, || {
            let filter = build_env_filter();
            assert!(filter.to_string().contains("hyper=warn"));
        });
    }
}
