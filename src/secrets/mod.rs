//! Secret reference resolution.
//!
//! A secret arrives as a reference string tagged by prefix scheme:
//! - `env:NAME` — process environment variable
//! - `file:/path` — file contents, trailing whitespace trimmed
//! - `secret:ref` — external secret provider
//! - anything else — the literal value, optionally base64-wrapped
//!
//! Resolution never fails loudly: every error path degrades to `None` and
//! the caller decides how to fail its own operation. Resolved values are
//! not cached; a secret must not outlive the request that needed it.

use std::{io, sync::Arc, time::Duration};

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use thiserror::Error;

use crate::egress::{ProxyEnv, proxy_for};

#[derive(Debug, Error)]
pub enum SecretError {
    #[error("connection error: {0}")]
    Connection(String),

    #[error("provider returned status {0}")]
    Status(u16),

    #[error("malformed provider response: {0}")]
    Malformed(String),
}

pub type SecretResult<T> = Result<T, SecretError>;

/// Process-environment access, injectable for tests.
pub trait EnvReader: Send + Sync {
    fn var(&self, name: &str) -> Option<String>;
}

/// Default environment reader over `std::env`.
pub struct ProcessEnv;

impl EnvReader for ProcessEnv {
    fn var(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }
}

/// Async file access, injectable for tests.
#[async_trait]
pub trait FileReader: Send + Sync {
    async fn read_to_string(&self, path: &str) -> io::Result<String>;
}

/// Default file reader over `tokio::fs`.
pub struct TokioFileReader;

#[async_trait]
impl FileReader for TokioFileReader {
    async fn read_to_string(&self, path: &str) -> io::Result<String> {
        tokio::fs::read_to_string(path).await
    }
}

/// Backend for `secret:` references.
#[async_trait]
pub trait ExternalSecretProvider: Send + Sync {
    /// Fetch a secret by reference. Returns `Ok(None)` if the provider does
    /// not know the reference.
    async fn fetch(&self, reference: &str) -> SecretResult<Option<String>>;
}

/// HTTP-backed external secret provider.
///
/// POSTs `{"ref": "<reference>"}` to the configured endpoint with a bearer
/// token and expects `{"value": "<secret>"}` back. The transport honors the
/// process proxy environment (including NO_PROXY bypass); TLS trust is the
/// platform root store, since the custom-CA bundle belongs to the egress
/// client this resolver feeds.
pub struct HttpSecretProvider {
    endpoint: String,
    token: Option<String>,
    timeout: Duration,
    client: reqwest::Client,
}

impl HttpSecretProvider {
    pub fn new(
        endpoint: String,
        token: Option<String>,
        timeout: Duration,
        proxy: &ProxyEnv,
    ) -> Self {
        let client = match proxy_for(&endpoint, proxy) {
            Some(proxy_url) => reqwest::Proxy::all(&proxy_url)
                .and_then(|proxy| reqwest::Client::builder().proxy(proxy).build())
                .unwrap_or_else(|err| {
                    tracing::warn!(error = %err, "secret provider proxy rejected, going direct");
                    reqwest::Client::new()
                }),
            None => reqwest::Client::new(),
        };
        Self {
            endpoint,
            token,
            timeout,
            client,
        }
    }
}

#[async_trait]
impl ExternalSecretProvider for HttpSecretProvider {
    async fn fetch(&self, reference: &str) -> SecretResult<Option<String>> {
        let mut request = self
            .client
            .post(&self.endpoint)
            .timeout(self.timeout)
            .json(&serde_json::json!({ "ref": reference }));
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| SecretError::Connection(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(SecretError::Status(status.as_u16()));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| SecretError::Malformed(e.to_string()))?;

        Ok(body
            .get("value")
            .and_then(|v| v.as_str())
            .map(str::to_string))
    }
}

/// Options for a single resolution.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResolveOptions {
    /// Attempt one base64 decode pass on literal values that look encoded.
    pub decode_base64: bool,
}

/// Resolves secret references to plaintext values.
pub struct SecretResolver {
    env: Arc<dyn EnvReader>,
    files: Arc<dyn FileReader>,
    external: Option<Arc<dyn ExternalSecretProvider>>,
}

impl SecretResolver {
    pub fn new() -> Self {
        Self {
            env: Arc::new(ProcessEnv),
            files: Arc::new(TokioFileReader),
            external: None,
        }
    }

    pub fn with_env_reader(mut self, env: Arc<dyn EnvReader>) -> Self {
        self.env = env;
        self
    }

    pub fn with_file_reader(mut self, files: Arc<dyn FileReader>) -> Self {
        self.files = files;
        self
    }

    pub fn with_external_provider(mut self, provider: Arc<dyn ExternalSecretProvider>) -> Self {
        self.external = Some(provider);
        self
    }

    /// Resolve a reference to its plaintext value.
    ///
    /// Null, empty, and whitespace-only input resolve to `None`, as does
    /// every failure along the way. The base64 retry is a bounded loop:
    /// at most one decode pass, and a value that decodes to itself is
    /// returned as the literal.
    pub async fn resolve(&self, raw: Option<&str>, opts: ResolveOptions) -> Option<String> {
        let mut value = raw?.trim().to_string();
        if value.is_empty() {
            return None;
        }
        let mut decode_base64 = opts.decode_base64;

        loop {
            if let Some(name) = value.strip_prefix("env:") {
                return self.env.var(name.trim()).filter(|v| !v.trim().is_empty());
            }

            if let Some(path) = value.strip_prefix("file:") {
                return match self.files.read_to_string(path.trim()).await {
                    Ok(contents) => {
                        let trimmed = contents.trim_end();
                        (!trimmed.is_empty()).then(|| trimmed.to_string())
                    }
                    Err(e) => {
                        tracing::debug!(error = %e, "secret file read failed");
                        None
                    }
                };
            }

            if let Some(reference) = value.strip_prefix("secret:") {
                let provider = self.external.as_ref()?;
                return match provider.fetch(reference.trim()).await {
                    Ok(found) => found.filter(|v| !v.trim().is_empty()),
                    Err(e) => {
                        tracing::warn!(error = %e, "external secret fetch failed");
                        None
                    }
                };
            }

            if decode_base64
                && looks_like_base64(&value)
                && let Some(decoded) = decode_base64_utf8(&value)
            {
                let decoded = decoded.trim().to_string();
                if decoded != value {
                    if decoded.is_empty() {
                        return None;
                    }
                    value = decoded;
                    decode_base64 = false;
                    continue;
                }
            }

            return Some(value);
        }
    }
}

impl Default for SecretResolver {
    fn default() -> Self {
        Self::new()
    }
}

/// Shape check only; actual decoding still verifies the content.
fn looks_like_base64(s: &str) -> bool {
    if s.len() < 8 || s.len() % 4 != 0 {
        return false;
    }
    let bytes = s.as_bytes();
    let padding = bytes.iter().rev().take_while(|&&b| b == b'=').count();
    if padding > 2 {
        return false;
    }
    bytes[..bytes.len() - padding]
        .iter()
        .all(|&b| b.is_ascii_alphanumeric() || b == b'+' || b == b'/')
}

fn decode_base64_utf8(s: &str) -> Option<String> {
    let bytes = BASE64.decode(s).ok()?;
    String::from_utf8(bytes).ok()
}
