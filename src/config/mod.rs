//! Environment-driven configuration.
//!
//! Every knob arrives through process environment variables, read once at
//! startup into [`VallumConfig`] and shared behind an `Arc`. Defaults are
//! chosen so an empty environment (plus `AUTH_JWT_SECRET`) yields a working
//! deployment: no proxy, no custom CA, rate limiting disabled, JSON logs.
//!
//! Boolean variables accept `1`/`true`/`yes`/`on` case-insensitively.

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::egress::{ProxyEnv, TrustConfig};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),
    #[error("invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

impl ConfigError {
    fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            name,
            reason: reason.into(),
        }
    }
}

/// Log output format, from `LOG_FORMAT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// One redacted JSON object per line. The production default.
    #[default]
    Json,
    Pretty,
    Compact,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "pretty" => Ok(Self::Pretty),
            "compact" => Ok(Self::Compact),
            other => Err(format!("unknown log format {other:?}")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    /// Exact-match origin allow-list; empty allows every origin.
    pub allowed_origins: Vec<String>,
    pub max_request_body_bytes: usize,
}

/// Custom trust anchors for outbound TLS, as raw configuration values.
/// Decoding and parsing happen in [`TrustConfig::from_parts`].
#[derive(Debug, Clone, Default)]
pub struct TlsConfig {
    pub custom_ca_cert: Option<String>,
    pub custom_ca_cert_base64: Option<String>,
}

impl TlsConfig {
    pub fn trust_config(&self) -> Result<TrustConfig, ConfigError> {
        TrustConfig::from_parts(
            self.custom_ca_cert.as_deref(),
            self.custom_ca_cert_base64.as_deref(),
        )
        .map_err(|err| ConfigError::invalid("CUSTOM_CA_CERT", err.to_string()))
    }
}

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub window: Duration,
    /// Per-operation request caps; non-positive disables the cap.
    pub ai_chat_max: i64,
    pub siem_forward_max: i64,
    pub analytics_export_max: i64,
}

/// External secret provider, present only when `SECRET_PROVIDER_URL` is set.
#[derive(Debug, Clone)]
pub struct SecretProviderConfig {
    pub url: String,
    pub token: Option<String>,
    pub timeout: Duration,
}

/// Bounds on chat payloads. Violations are client errors, not truncation.
#[derive(Debug, Clone)]
pub struct ChatLimits {
    pub max_messages: usize,
    pub max_message_chars: usize,
    pub max_total_chars: usize,
}

#[derive(Debug, Clone)]
pub struct AnalyticsExportConfig {
    pub url: Option<String>,
    pub token: Option<String>,
    pub timeout: Duration,
    pub include_user_id: bool,
}

#[derive(Debug, Clone)]
pub struct AuditConfig {
    /// When off, geo data is stripped from forwarded events regardless of
    /// what individual integrations ask for.
    pub geo_lookup_enabled: bool,
}

#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// HS256 signing secret for bearer tokens. Accepts secret-reference
    /// syntax (`env:`, `file:`, base64) and is resolved at startup.
    pub jwt_secret: String,
}

#[derive(Debug, Clone)]
pub struct VallumConfig {
    pub server: ServerConfig,
    pub log_format: LogFormat,
    pub proxy: ProxyEnv,
    pub tls: TlsConfig,
    pub allow_local_endpoints: bool,
    pub rate_limit: RateLimitConfig,
    pub secret_provider: Option<SecretProviderConfig>,
    pub chat: ChatLimits,
    pub analytics: AnalyticsExportConfig,
    pub audit: AuditConfig,
    pub auth: AuthConfig,
}

impl VallumConfig {
    /// Read and validate the full configuration from the process
    /// environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = Self {
            server: ServerConfig {
                bind_addr: parsed("BIND_ADDR", "0.0.0.0:8080".parse().unwrap())?,
                allowed_origins: list("ALLOWED_ORIGINS"),
                max_request_body_bytes: parsed("MAX_REQUEST_BODY_BYTES", 1_048_576)?,
            },
            log_format: parsed("LOG_FORMAT", LogFormat::default())?,
            proxy: ProxyEnv::from_process(),
            tls: TlsConfig {
                custom_ca_cert: var("CUSTOM_CA_CERT"),
                custom_ca_cert_base64: var("CUSTOM_CA_CERT_BASE64"),
            },
            allow_local_endpoints: flag("ALLOW_LOCAL_ENDPOINTS", false)?,
            rate_limit: RateLimitConfig {
                window: Duration::from_secs(parsed("RATE_LIMIT_WINDOW_SECONDS", 60)?),
                ai_chat_max: parsed("AI_CHAT_RATE_LIMIT_MAX", 0)?,
                siem_forward_max: parsed("SIEM_FORWARD_RATE_LIMIT_MAX", 0)?,
                analytics_export_max: parsed("ANALYTICS_EXPORT_RATE_LIMIT_MAX", 0)?,
            },
            secret_provider: var("SECRET_PROVIDER_URL")
                .map(|url| {
                    Ok::<_, ConfigError>(SecretProviderConfig {
                        url,
                        token: var("SECRET_PROVIDER_TOKEN"),
                        timeout: Duration::from_millis(parsed("SECRET_PROVIDER_TIMEOUT_MS", 5000)?),
                    })
                })
                .transpose()?,
            chat: ChatLimits {
                max_messages: parsed("MAX_AI_MESSAGES", 50)?,
                max_message_chars: parsed("MAX_AI_MESSAGE_CHARS", 8000)?,
                max_total_chars: parsed("MAX_AI_TOTAL_CHARS", 64_000)?,
            },
            analytics: AnalyticsExportConfig {
                url: var("ANALYTICS_EXPORT_URL"),
                token: var("ANALYTICS_EXPORT_TOKEN"),
                timeout: Duration::from_millis(parsed("ANALYTICS_EXPORT_TIMEOUT_MS", 10_000)?),
                include_user_id: flag("ANALYTICS_EXPORT_INCLUDE_USER_ID", false)?,
            },
            audit: AuditConfig {
                geo_lookup_enabled: flag("AUDIT_GEO_LOOKUP_ENABLED", true)?,
            },
            auth: AuthConfig {
                jwt_secret: var("AUTH_JWT_SECRET").ok_or(ConfigError::Missing("AUTH_JWT_SECRET"))?,
            },
        };
        config.validate()?;
        Ok(config)
    }

    /// Cross-field checks that `from_env` parsing cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.max_request_body_bytes == 0 {
            return Err(ConfigError::invalid(
                "MAX_REQUEST_BODY_BYTES",
                "must be greater than zero",
            ));
        }
        if self.rate_limit.window.is_zero() {
            return Err(ConfigError::invalid(
                "RATE_LIMIT_WINDOW_SECONDS",
                "must be greater than zero",
            ));
        }
        if self.chat.max_messages == 0 || self.chat.max_message_chars == 0 {
            return Err(ConfigError::invalid("MAX_AI_MESSAGES", "chat limits must be positive"));
        }
        if self.chat.max_total_chars < self.chat.max_message_chars {
            return Err(ConfigError::invalid(
                "MAX_AI_TOTAL_CHARS",
                "must be at least MAX_AI_MESSAGE_CHARS",
            ));
        }
        if let Some(provider) = &self.secret_provider
            && provider.timeout.is_zero()
        {
            return Err(ConfigError::invalid(
                "SECRET_PROVIDER_TIMEOUT_MS",
                "must be greater than zero",
            ));
        }
        if self.analytics.timeout.is_zero() {
            return Err(ConfigError::invalid(
                "ANALYTICS_EXPORT_TIMEOUT_MS",
                "must be greater than zero",
            ));
        }
        // Fail on a malformed CA bundle at startup, not on the first call.
        self.tls.trust_config()?;
        Ok(())
    }
}

fn var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn list(name: &str) -> Vec<String> {
    var(name)
        .map(|raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|entry| !entry.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn parsed<T>(name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match var(name) {
        Some(raw) => raw
            .parse()
            .map_err(|err| ConfigError::invalid(name, format!("{err}"))),
        None => Ok(default),
    }
}

fn flag(name: &'static str, default: bool) -> Result<bool, ConfigError> {
    match var(name) {
        Some(raw) => match raw.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            other => Err(ConfigError::invalid(name, format!("not a boolean: {other:?}"))),
        },
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use serial_test::serial;
    use temp_env::{with_var, with_vars};

    use super::*;

    const BASE: [(&str, Option<&str>); 1] = [("AUTH_JWT_SECRET", Some("test-secret"))];

    #[test]
    #[serial]
    fn defaults_apply_with_minimal_environment() {
        with_vars(BASE, || {
            let config = VallumConfig::from_env().unwrap();
            assert_eq!(config.server.bind_addr, "0.0.0.0:8080".parse().unwrap());
            assert!(config.server.allowed_origins.is_empty());
            assert_eq!(config.server.max_request_body_bytes, 1_048_576);
            assert_eq!(config.log_format, LogFormat::Json);
            assert!(!config.allow_local_endpoints);
            assert_eq!(config.rate_limit.window, Duration::from_secs(60));
            assert_eq!(config.rate_limit.ai_chat_max, 0);
            assert!(config.secret_provider.is_none());
            assert_eq!(config.chat.max_messages, 50);
            assert!(config.audit.geo_lookup_enabled);
            assert!(!config.analytics.include_user_id);
        });
    }

    #[test]
    #[serial]
    fn missing_jwt_secret_is_fatal() {
        with_var("AUTH_JWT_SECRET", None::<&str>, || {
            let err = VallumConfig::from_env().unwrap_err();
            assert!(matches!(err, ConfigError::Missing("AUTH_JWT_SECRET")));
        });
    }

    #[test]
    #[serial]
    fn origin_list_is_split_and_trimmed() {
        with_vars(
            [
                ("AUTH_JWT_SECRET", Some("s")),
                (
                    "ALLOWED_ORIGINS",
                    Some("https://app.example.com , https://admin.example.com,,"),
                ),
            ],
            || {
                let config = VallumConfig::from_env().unwrap();
                assert_eq!(
                    config.server.allowed_origins,
                    vec![
                        "https://app.example.com".to_string(),
                        "https://admin.example.com".to_string()
                    ]
                );
            },
        );
    }

    #[test]
    #[serial]
    fn boolean_spellings_are_accepted() {
        for (raw, expected) in [("1", true), ("TRUE", true), ("on", true), ("No", false)] {
            with_vars(
                [
                    ("AUTH_JWT_SECRET", Some("s")),
                    ("ALLOW_LOCAL_ENDPOINTS", Some(raw)),
                ],
                || {
                    let config = VallumConfig::from_env().unwrap();
                    assert_eq!(config.allow_local_endpoints, expected, "{raw}");
                },
            );
        }
    }

    #[test]
    #[serial]
    fn garbage_boolean_is_rejected() {
        with_vars(
            [
                ("AUTH_JWT_SECRET", Some("s")),
                ("AUDIT_GEO_LOOKUP_ENABLED", Some("maybe")),
            ],
            || {
                let err = VallumConfig::from_env().unwrap_err();
                assert!(matches!(err, ConfigError::Invalid { name: "AUDIT_GEO_LOOKUP_ENABLED", .. }));
            },
        );
    }

    #[test]
    #[serial]
    fn secret_provider_requires_only_the_url() {
        with_vars(
            [
                ("AUTH_JWT_SECRET", Some("s")),
                ("SECRET_PROVIDER_URL", Some("https://vault.internal/resolve")),
            ],
            || {
                let config = VallumConfig::from_env().unwrap();
                let provider = config.secret_provider.unwrap();
                assert_eq!(provider.url, "https://vault.internal/resolve");
                assert!(provider.token.is_none());
                assert_eq!(provider.timeout, Duration::from_millis(5000));
            },
        );
    }

    #[test]
    #[serial]
    fn zero_body_limit_fails_validation() {
        with_vars(
            [
                ("AUTH_JWT_SECRET", Some("s")),
                ("MAX_REQUEST_BODY_BYTES", Some("0")),
            ],
            || {
                let err = VallumConfig::from_env().unwrap_err();
                assert!(matches!(err, ConfigError::Invalid { name: "MAX_REQUEST_BODY_BYTES", .. }));
            },
        );
    }

    #[test]
    #[serial]
    fn malformed_ca_bundle_fails_at_startup() {
        with_vars(
            [
                ("AUTH_JWT_SECRET", Some("s")),
                ("CUSTOM_CA_CERT_BASE64", Some("!!not-base64!!")),
            ],
            || {
                let err = VallumConfig::from_env().unwrap_err();
                assert!(matches!(err, ConfigError::Invalid { name: "CUSTOM_CA_CERT", .. }));
            },
        );
    }

    #[test]
    #[serial]
    fn unknown_log_format_is_rejected() {
        with_vars(
            [("AUTH_JWT_SECRET", Some("s")), ("LOG_FORMAT", Some("xml"))],
            || {
                let err = VallumConfig::from_env().unwrap_err();
                assert!(matches!(err, ConfigError::Invalid { name: "LOG_FORMAT", .. }));
            },
        );
    }
}
