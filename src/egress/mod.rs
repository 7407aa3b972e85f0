//! Outbound HTTP transport.
//!
//! All server-initiated requests leave through [`EgressClient`], which
//! applies the proxy routing from [`proxy`] and any custom trust anchors
//! from configuration. One transport is cached at a time, keyed by the
//! effective proxy URL and the CA bundle fingerprint; a change in either
//! rebuilds it. Target validation happens upstream: the only way to reach
//! the client is through a [`ValidatedUrl`].

pub mod proxy;

use std::time::Duration;

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use thiserror::Error;

pub use proxy::{ProxyEnv, is_no_proxy_target, parse_no_proxy_list, proxy_for};

use crate::validation::ValidatedUrl;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum EgressError {
    #[error("invalid custom CA certificate: {0}")]
    InvalidCa(String),
    #[error("invalid proxy URL {url}: {reason}")]
    InvalidProxy { url: String, reason: String },
    #[error("failed to build outbound transport: {0}")]
    Transport(String),
}

pub type EgressResult<T> = Result<T, EgressError>;

/// Custom trust anchors, assembled from the literal and base64-encoded
/// PEM configuration values. The two sources are additive.
#[derive(Debug, Clone, Default)]
pub struct TrustConfig {
    bundle: Option<Vec<u8>>,
    fingerprint: Option<String>,
}

impl TrustConfig {
    /// Build from the raw configuration values, decoding and parsing
    /// eagerly so a malformed bundle fails at startup rather than on the
    /// first outbound call.
    pub fn from_parts(literal_pem: Option<&str>, base64_pem: Option<&str>) -> EgressResult<Self> {
        let mut bundle = Vec::new();
        if let Some(pem) = literal_pem.map(str::trim).filter(|p| !p.is_empty()) {
            bundle.extend_from_slice(pem.as_bytes());
            bundle.push(b'\n');
        }
        if let Some(encoded) = base64_pem.map(str::trim).filter(|p| !p.is_empty()) {
            let decoded = BASE64
                .decode(encoded.as_bytes())
                .map_err(|err| EgressError::InvalidCa(format!("base64 decode failed: {err}")))?;
            bundle.extend_from_slice(&decoded);
            bundle.push(b'\n');
        }
        if bundle.is_empty() {
            return Ok(Self::default());
        }

        let certs = reqwest::Certificate::from_pem_bundle(&bundle)
            .map_err(|err| EgressError::InvalidCa(err.to_string()))?;
        if certs.is_empty() {
            return Err(EgressError::InvalidCa(
                "bundle contains no certificates".to_string(),
            ));
        }

        let fingerprint = hex::encode(Sha256::digest(&bundle));
        Ok(Self {
            bundle: Some(bundle),
            fingerprint: Some(fingerprint),
        })
    }

    pub fn fingerprint(&self) -> Option<&str> {
        self.fingerprint.as_deref()
    }

    fn certificates(&self) -> EgressResult<Vec<reqwest::Certificate>> {
        match &self.bundle {
            Some(bundle) => reqwest::Certificate::from_pem_bundle(bundle)
                .map_err(|err| EgressError::InvalidCa(err.to_string())),
            None => Ok(Vec::new()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct TransportKey {
    proxy: Option<String>,
    ca_fingerprint: Option<String>,
}

struct CachedTransport {
    key: TransportKey,
    client: reqwest::Client,
}

/// Shared outbound client. Cheap to clone handles out of: the cached
/// `reqwest::Client` is itself reference-counted.
pub struct EgressClient {
    proxy_env: ProxyEnv,
    trust: TrustConfig,
    slot: Mutex<Option<CachedTransport>>,
}

impl EgressClient {
    pub fn new(proxy_env: ProxyEnv, trust: TrustConfig) -> Self {
        Self {
            proxy_env,
            trust,
            slot: Mutex::new(None),
        }
    }

    /// The transport to use for `target`. Reuses the cached client when
    /// the proxy decision and trust bundle are unchanged; otherwise the
    /// previous client is dropped and a fresh one built.
    pub fn client_for(&self, target: &ValidatedUrl) -> EgressResult<reqwest::Client> {
        let key = TransportKey {
            proxy: proxy_for(target.as_str(), &self.proxy_env),
            ca_fingerprint: self.trust.fingerprint().map(str::to_string),
        };

        let mut slot = self.slot.lock();
        if let Some(cached) = slot.as_ref()
            && cached.key == key
        {
            return Ok(cached.client.clone());
        }

        tracing::debug!(
            proxied = key.proxy.is_some(),
            custom_ca = key.ca_fingerprint.is_some(),
            "building outbound transport"
        );
        let client = self.build_transport(&key)?;
        *slot = Some(CachedTransport {
            key,
            client: client.clone(),
        });
        Ok(client)
    }

    fn build_transport(&self, key: &TransportKey) -> EgressResult<reqwest::Client> {
        // Routing is decided by `proxy_for`; reqwest's own env scan stays off.
        let mut builder = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .user_agent(concat!("vallum/", env!("CARGO_PKG_VERSION")))
            .no_proxy();

        if let Some(proxy_url) = &key.proxy {
            let proxy = reqwest::Proxy::all(proxy_url).map_err(|err| EgressError::InvalidProxy {
                url: proxy_url.clone(),
                reason: err.to_string(),
            })?;
            builder = builder.proxy(proxy);
        }

        for cert in self.trust.certificates()? {
            builder = builder.add_root_certificate(cert);
        }

        builder
            .build()
            .map_err(|err| EgressError::Transport(err.to_string()))
    }

    #[cfg(test)]
    fn cached_key(&self) -> Option<TransportKey> {
        self.slot.lock().as_ref().map(|c| c.key.clone())
    }
}
