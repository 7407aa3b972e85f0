//! Process-wide shared state.
//!
//! Everything mutable that outlives a single request lives here: the cached
//! egress transport, the rate-limit buckets, and the SIEM health counters.
//! Built once at startup and cloned cheaply into every handler.

use std::sync::Arc;

use crate::{
    auth::JwtVerifier,
    config::{ConfigError, VallumConfig},
    egress::EgressClient,
    observability::siem::SiemForwarder,
    providers::ProviderGateway,
    ratelimit::RateLimiter,
    secrets::{HttpSecretProvider, ResolveOptions, SecretResolver},
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<VallumConfig>,
    pub egress: Arc<EgressClient>,
    pub secrets: Arc<SecretResolver>,
    pub rate_limiter: Arc<RateLimiter>,
    pub gateway: Arc<ProviderGateway>,
    pub forwarder: Arc<SiemForwarder>,
    pub jwt: Arc<JwtVerifier>,
}

impl AppState {
    /// Wire the service graph up from configuration.
    ///
    /// The JWT secret is itself a secret reference and is resolved here,
    /// once; a reference that resolves to nothing is a startup failure.
    pub async fn build(config: VallumConfig) -> Result<Self, ConfigError> {
        let config = Arc::new(config);

        let trust = config.tls.trust_config()?;
        let egress = Arc::new(EgressClient::new(config.proxy.clone(), trust));

        let mut secrets = SecretResolver::new();
        if let Some(provider) = &config.secret_provider {
            secrets = secrets.with_external_provider(Arc::new(HttpSecretProvider::new(
                provider.url.clone(),
                provider.token.clone(),
                provider.timeout,
                &config.proxy,
            )));
        }
        let secrets = Arc::new(secrets);

        let jwt_secret = secrets
            .resolve(
                Some(&config.auth.jwt_secret),
                ResolveOptions { decode_base64: true },
            )
            .await
            .ok_or(ConfigError::Invalid {
                name: "AUTH_JWT_SECRET",
                reason: "secret reference did not resolve".to_string(),
            })?;
        let jwt = Arc::new(JwtVerifier::new(jwt_secret.as_bytes()));

        let rate_limiter = Arc::new(RateLimiter::new(config.rate_limit.window));
        let gateway = Arc::new(ProviderGateway::new(
            Arc::clone(&egress),
            Arc::clone(&secrets),
            config.chat.clone(),
            config.allow_local_endpoints,
        ));
        let forwarder = Arc::new(SiemForwarder::new(
            Arc::clone(&egress),
            Arc::clone(&secrets),
            config.allow_local_endpoints,
            config.audit.geo_lookup_enabled,
        ));

        Ok(Self {
            config,
            egress,
            secrets,
            rate_limiter,
            gateway,
            forwarder,
            jwt,
        })
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::net::SocketAddr;
    use std::time::Duration;

    use crate::config::{
        AnalyticsExportConfig, AuditConfig, AuthConfig, ChatLimits, LogFormat, RateLimitConfig,
        ServerConfig, TlsConfig, VallumConfig,
    };
    use crate::egress::ProxyEnv;

    pub const TEST_JWT_SECRET: &str = "route-test-secret";

    /// A self-contained config that touches no process environment.
    pub fn test_config() -> VallumConfig {
        VallumConfig {
            server: ServerConfig {
                bind_addr: "127.0.0.1:0".parse::<SocketAddr>().unwrap(),
                allowed_origins: Vec::new(),
                max_request_body_bytes: 1_048_576,
            },
            log_format: LogFormat::Json,
            proxy: ProxyEnv::default(),
            tls: TlsConfig::default(),
            allow_local_endpoints: true,
            rate_limit: RateLimitConfig {
                window: Duration::from_secs(60),
                ai_chat_max: 0,
                siem_forward_max: 0,
                analytics_export_max: 0,
            },
            secret_provider: None,
            chat: ChatLimits {
                max_messages: 50,
                max_message_chars: 8000,
                max_total_chars: 64_000,
            },
            analytics: AnalyticsExportConfig {
                url: None,
                token: None,
                timeout: Duration::from_secs(5),
                include_user_id: false,
            },
            audit: AuditConfig {
                geo_lookup_enabled: true,
            },
            auth: AuthConfig {
                jwt_secret: TEST_JWT_SECRET.to_string(),
            },
        }
    }
}
