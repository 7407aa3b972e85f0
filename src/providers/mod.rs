//! AI provider gateway.
//!
//! Validates a chat request, builds the system prompt, resolves the provider
//! key and endpoint, dispatches to the adapter for the configured provider,
//! and returns a canonical SSE response. Providers are a closed tagged
//! union: adding one means adding a [`ProviderKind`] variant and its
//! adapter arm, not a new branch in a handler.

mod adapters;
mod prompt;

use std::{io, sync::Arc};

use axum::{body::Body, http::StatusCode, response::Response};
use bytes::Bytes;
use futures_util::{Stream, StreamExt};
pub use prompt::{AssessmentContext, CriticalGap, DomainMetrics, DomainOverview};
use serde::{Deserialize, Serialize};

use crate::{
    config::ChatLimits,
    egress::EgressClient,
    error::{ApiError, UpstreamFailure},
    observability::redact::redact_str,
    secrets::{ResolveOptions, SecretResolver},
    streaming::{NormalizedStream, StreamingLimits, UpstreamFraming},
    validation::{UrlValidationOptions, ValidatedUrl, validate_external_url},
};

/// Max tokens sent upstream when the request does not specify one.
const DEFAULT_MAX_TOKENS: u32 = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

impl ChatRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

/// The closed set of supported providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    OpenAi,
    Anthropic,
    Google,
    Ollama,
    Lovable,
    HuggingFace,
    Custom,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Anthropic => "anthropic",
            Self::Google => "google",
            Self::Ollama => "ollama",
            Self::Lovable => "lovable",
            Self::HuggingFace => "huggingface",
            Self::Custom => "custom",
        }
    }

    /// Endpoint used when the request carries none. Custom has no default.
    /// The Ollama default is local and only passes URL validation when
    /// local endpoints are explicitly allowed.
    fn default_endpoint(&self) -> Option<&'static str> {
        match self {
            Self::OpenAi => Some("https://api.openai.com/v1/chat/completions"),
            Self::Anthropic => Some("https://api.anthropic.com/v1/messages"),
            Self::Google => Some("https://generativelanguage.googleapis.com/v1beta/models"),
            Self::Ollama => Some("http://localhost:11434/api/chat"),
            Self::Lovable => Some("https://ai.gateway.lovable.dev/v1/chat/completions"),
            Self::HuggingFace => Some("https://router.huggingface.co/v1/chat/completions"),
            Self::Custom => None,
        }
    }

    fn default_model(&self) -> Option<&'static str> {
        match self {
            Self::OpenAi => Some("gpt-4o-mini"),
            Self::Anthropic => Some("claude-sonnet-4-20250514"),
            Self::Google => Some("gemini-1.5-flash"),
            Self::Ollama => Some("llama3.1"),
            Self::Lovable => Some("google/gemini-2.5-flash"),
            Self::HuggingFace => Some("meta-llama/Llama-3.1-8B-Instruct"),
            Self::Custom => None,
        }
    }

    /// Hosted APIs reject keyless calls outright; Ollama daemons and custom
    /// (often self-hosted) endpoints may be open.
    fn requires_key(&self) -> bool {
        !matches!(self, Self::Ollama | Self::Custom)
    }

    /// Wire format of the streamed response. `None` means the provider
    /// already emits canonical OpenAI-shaped SSE and passes through.
    fn upstream_framing(&self) -> Option<UpstreamFraming> {
        match self {
            Self::Anthropic => Some(UpstreamFraming::AnthropicSse),
            Self::Google => Some(UpstreamFraming::GoogleJson),
            Self::Ollama => Some(UpstreamFraming::OllamaNdjson),
            Self::OpenAi | Self::Lovable | Self::HuggingFace | Self::Custom => None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderConfig {
    pub provider_type: ProviderKind,
    #[serde(default)]
    pub endpoint_url: Option<String>,
    #[serde(default)]
    pub model_id: Option<String>,
    #[serde(default)]
    pub secret_ref: Option<String>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub system_prompt: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub context: Option<AssessmentContext>,
    pub provider_config: ProviderConfig,
}

/// Everything an adapter needs to build its wire body.
pub(crate) struct ChatCall<'a> {
    pub model: &'a str,
    pub system_prompt: &'a str,
    pub messages: &'a [ChatMessage],
    pub max_tokens: u32,
    pub temperature: Option<f64>,
}

/// Enforce the message bounds. Violations are client errors, never
/// truncation.
pub fn validate_messages(messages: &[ChatMessage], limits: &ChatLimits) -> Result<(), ApiError> {
    if messages.is_empty() {
        return Err(ApiError::Validation("messages must not be empty".to_string()));
    }
    if messages.len() > limits.max_messages {
        return Err(ApiError::Validation(format!(
            "too many messages: {} exceeds the limit of {}",
            messages.len(),
            limits.max_messages
        )));
    }

    let mut total_chars = 0usize;
    for (index, message) in messages.iter().enumerate() {
        let chars = message.content.chars().count();
        if chars == 0 {
            return Err(ApiError::Validation(format!(
                "message {index} has empty content"
            )));
        }
        if chars > limits.max_message_chars {
            return Err(ApiError::Validation(format!(
                "message {index} exceeds {} characters",
                limits.max_message_chars
            )));
        }
        total_chars += chars;
    }

    if total_chars > limits.max_total_chars {
        return Err(ApiError::Validation(format!(
            "conversation exceeds {} characters in total",
            limits.max_total_chars
        )));
    }

    Ok(())
}

fn missing_key(kind: ProviderKind) -> ApiError {
    ApiError::Config(format!(
        "no API key configured for provider {}",
        kind.as_str()
    ))
}

fn sse_response<S, E>(stream: S) -> Result<Response, ApiError>
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: Into<Box<dyn std::error::Error + Send + Sync>> + 'static,
{
    Response::builder()
        .status(StatusCode::OK)
        .header("content-type", "text/event-stream")
        .header("cache-control", "no-cache")
        .body(Body::from_stream(stream))
        .map_err(|e| ApiError::Config(format!("failed to build streaming response: {e}")))
}

/// Dispatches validated chat requests to provider adapters.
pub struct ProviderGateway {
    egress: Arc<EgressClient>,
    secrets: Arc<SecretResolver>,
    chat_limits: ChatLimits,
    allow_local: bool,
    streaming: StreamingLimits,
}

impl ProviderGateway {
    pub fn new(
        egress: Arc<EgressClient>,
        secrets: Arc<SecretResolver>,
        chat_limits: ChatLimits,
        allow_local: bool,
    ) -> Self {
        Self {
            egress,
            secrets,
            chat_limits,
            allow_local,
            streaming: StreamingLimits::default(),
        }
    }

    /// Run one chat request end to end, returning the SSE response.
    pub async fn chat(&self, request: ChatRequest) -> Result<Response, ApiError> {
        let config = &request.provider_config;
        let kind = config.provider_type;

        validate_messages(&request.messages, &self.chat_limits)?;

        let system_prompt =
            prompt::build_system_prompt(config.system_prompt.as_deref(), request.context.as_ref());

        let model = config
            .model_id
            .as_deref()
            .or(kind.default_model())
            .ok_or_else(|| {
                ApiError::Validation("modelId is required for custom endpoints".to_string())
            })?;

        let api_key = self
            .secrets
            .resolve(
                config.secret_ref.as_deref(),
                ResolveOptions { decode_base64: true },
            )
            .await;
        if api_key.is_none() && kind.requires_key() {
            return Err(missing_key(kind));
        }

        let endpoint = self.resolve_endpoint(config, model)?;

        tracing::info!(
            provider = kind.as_str(),
            model,
            messages = request.messages.len(),
            endpoint = %endpoint,
            "dispatching chat request"
        );

        let call = ChatCall {
            model,
            system_prompt: &system_prompt,
            messages: &request.messages,
            max_tokens: config.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            temperature: config.temperature,
        };

        let response = match kind {
            ProviderKind::Anthropic => {
                let key = api_key.as_deref().ok_or_else(|| missing_key(kind))?;
                adapters::call_anthropic(&self.egress, &endpoint, key, &call).await?
            }
            ProviderKind::Google => {
                let key = api_key.as_deref().ok_or_else(|| missing_key(kind))?;
                adapters::call_google(&self.egress, &endpoint, key, &call).await?
            }
            ProviderKind::Ollama => adapters::call_ollama(&self.egress, &endpoint, &call).await?,
            ProviderKind::OpenAi
            | ProviderKind::Lovable
            | ProviderKind::HuggingFace
            | ProviderKind::Custom => {
                adapters::call_openai_compatible(&self.egress, &endpoint, api_key.as_deref(), &call)
                    .await?
            }
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(
                provider = kind.as_str(),
                status = %status,
                body = %redact_str(&body),
                "provider returned an error"
            );
            return Err(ApiError::Upstream(UpstreamFailure::from_status(status)));
        }

        match kind.upstream_framing() {
            Some(framing) => {
                let upstream = response
                    .bytes_stream()
                    .map(|result| result.map_err(io::Error::other));
                sse_response(NormalizedStream::new(upstream, framing, self.streaming))
            }
            None => sse_response(response.bytes_stream()),
        }
    }

    /// Pick and validate the endpoint. Google's model lives in the URL path,
    /// so the model segment is appended before validation.
    fn resolve_endpoint(
        &self,
        config: &ProviderConfig,
        model: &str,
    ) -> Result<ValidatedUrl, ApiError> {
        let kind = config.provider_type;
        let base = config
            .endpoint_url
            .as_deref()
            .or(kind.default_endpoint())
            .ok_or_else(|| {
                ApiError::Validation("endpointUrl is required for custom endpoints".to_string())
            })?;

        let target = match kind {
            ProviderKind::Google => {
                format!("{}/{}:streamGenerateContent", base.trim_end_matches('/'), model)
            }
            _ => base.to_string(),
        };

        let opts = UrlValidationOptions {
            allow_local: self.allow_local,
        };
        Ok(validate_external_url(&target, opts)?)
    }
}

#[cfg(test)]
mod tests {
    use axum::body::to_bytes;
    use serde_json::json;
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{body_partial_json, header, method, path, query_param},
    };

    use super::*;
    use crate::egress::{ProxyEnv, TrustConfig};

    fn test_limits() -> ChatLimits {
        ChatLimits {
            max_messages: 50,
            max_message_chars: 8000,
            max_total_chars: 64000,
        }
    }

    fn gateway() -> ProviderGateway {
        ProviderGateway::new(
            Arc::new(EgressClient::new(ProxyEnv::default(), TrustConfig::default())),
            Arc::new(SecretResolver::new()),
            test_limits(),
            true,
        )
    }

    fn user_message(content: &str) -> ChatMessage {
        ChatMessage {
            role: ChatRole::User,
            content: content.to_string(),
        }
    }

    fn request_for(kind: ProviderKind, endpoint: &str, secret: &str) -> ChatRequest {
        ChatRequest {
            messages: vec![user_message("hello")],
            context: None,
            provider_config: ProviderConfig {
                provider_type: kind,
                endpoint_url: Some(endpoint.to_string()),
                model_id: Some("test-model".to_string()),
                secret_ref: Some(secret.to_string()),
                max_tokens: None,
                temperature: None,
                system_prompt: Some("Base prompt.".to_string()),
            },
        }
    }

    async fn body_text(response: Response) -> String {
        let bytes = to_bytes(response.into_body(), 1024 * 1024).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[test]
    fn provider_kind_parses_lowercase_tags() {
        assert_eq!(
            serde_json::from_str::<ProviderKind>("\"huggingface\"").unwrap(),
            ProviderKind::HuggingFace
        );
        assert_eq!(
            serde_json::from_str::<ProviderKind>("\"openai\"").unwrap(),
            ProviderKind::OpenAi
        );
        assert!(serde_json::from_str::<ProviderKind>("\"azure\"").is_err());
    }

    #[test]
    fn chat_request_deserializes_camel_case() {
        let request: ChatRequest = serde_json::from_str(
            r#"{
                "messages": [{"role": "user", "content": "hi"}],
                "providerConfig": {
                    "providerType": "anthropic",
                    "secretRef": "env:ANTHROPIC_KEY",
                    "modelId": "claude-sonnet-4-20250514",
                    "maxTokens": 512
                }
            }"#,
        )
        .unwrap();

        assert_eq!(request.provider_config.provider_type, ProviderKind::Anthropic);
        assert_eq!(request.provider_config.max_tokens, Some(512));
        assert!(request.context.is_none());
    }

    #[test]
    fn unknown_role_is_rejected_at_parse_time() {
        let result = serde_json::from_str::<ChatMessage>(r#"{"role": "system", "content": "x"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn default_endpoints_are_well_formed() {
        for kind in [
            ProviderKind::OpenAi,
            ProviderKind::Anthropic,
            ProviderKind::Google,
            ProviderKind::Ollama,
            ProviderKind::Lovable,
            ProviderKind::HuggingFace,
        ] {
            let endpoint = kind.default_endpoint().unwrap();
            let validated =
                validate_external_url(endpoint, UrlValidationOptions { allow_local: true });
            assert!(validated.is_ok(), "{endpoint}");
        }
        assert!(ProviderKind::Custom.default_endpoint().is_none());
    }

    #[test]
    fn message_bounds_are_enforced() {
        let limits = ChatLimits {
            max_messages: 2,
            max_message_chars: 10,
            max_total_chars: 15,
        };

        assert!(validate_messages(&[], &limits).is_err());

        let too_many = vec![user_message("a"), user_message("b"), user_message("c")];
        assert!(validate_messages(&too_many, &limits).is_err());

        let oversized = vec![user_message("0123456789a")];
        assert!(validate_messages(&oversized, &limits).is_err());

        let empty_content = vec![user_message("")];
        assert!(validate_messages(&empty_content, &limits).is_err());

        let total_overflow = vec![user_message("0123456789"), user_message("0123456789")];
        assert!(validate_messages(&total_overflow, &limits).is_err());

        let fine = vec![user_message("hello"), user_message("world")];
        assert!(validate_messages(&fine, &limits).is_ok());
    }

    #[tokio::test]
    async fn anthropic_chat_normalizes_the_stream() {
        let server = MockServer::start().await;
        let upstream = "event: message_start\n\
data: {\"type\":\"message_start\"}\n\n\
data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"Hi\"}}\n\n\
data: {\"type\":\"message_stop\"}\n\n";

        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .and(header("x-api-key", "sk-test-key-123"))
            .and(header("anthropic-version", "2023-06-01"))
            .and(body_partial_json(json!({"model": "test-model", "stream": true})))
            .respond_with(ResponseTemplate::new(200).set_body_raw(upstream, "text/event-stream"))
            .mount(&server)
            .await;

        let request = request_for(
            ProviderKind::Anthropic,
            &format!("{}/v1/messages", server.uri()),
            "sk-test-key-123",
        );
        let response = gateway().chat(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get("content-type").unwrap(),
            "text/event-stream"
        );
        assert_eq!(
            body_text(response).await,
            "data: {\"choices\":[{\"delta\":{\"content\":\"Hi\"}}]}\n\ndata: [DONE]\n\n"
        );
    }

    #[tokio::test]
    async fn openai_stream_passes_through_untouched() {
        let server = MockServer::start().await;
        let upstream = "data: {\"choices\":[{\"delta\":{\"content\":\"Hi\"}}]}\n\ndata: [DONE]\n\n";

        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer sk-test-key-123"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(upstream, "text/event-stream"))
            .mount(&server)
            .await;

        let request = request_for(
            ProviderKind::OpenAi,
            &format!("{}/v1/chat/completions", server.uri()),
            "sk-test-key-123",
        );
        let response = gateway().chat(request).await.unwrap();

        assert_eq!(body_text(response).await, upstream);
    }

    #[tokio::test]
    async fn google_chat_appends_model_path_and_key() {
        let server = MockServer::start().await;
        let upstream = "[{\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"Hullo\"}]}}]}]";

        Mock::given(method("POST"))
            .and(path("/models/test-model:streamGenerateContent"))
            .and(query_param("key", "g-key-123456"))
            .and(body_partial_json(
                json!({"contents": [{"role": "user", "parts": [{"text": "hello"}]}]}),
            ))
            .respond_with(ResponseTemplate::new(200).set_body_raw(upstream, "application/json"))
            .mount(&server)
            .await;

        let request = request_for(
            ProviderKind::Google,
            &format!("{}/models", server.uri()),
            "g-key-123456",
        );
        let response = gateway().chat(request).await.unwrap();

        assert_eq!(
            body_text(response).await,
            "data: {\"choices\":[{\"delta\":{\"content\":\"Hullo\"}}]}\n\ndata: [DONE]\n\n"
        );
    }

    #[tokio::test]
    async fn ollama_chat_needs_no_key() {
        let server = MockServer::start().await;
        let upstream = "{\"message\":{\"role\":\"assistant\",\"content\":\"Hey\"},\"done\":false}\n\
{\"message\":{\"role\":\"assistant\",\"content\":\"\"},\"done\":true}\n";

        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .and(body_partial_json(json!({"model": "test-model", "stream": true})))
            .respond_with(ResponseTemplate::new(200).set_body_raw(upstream, "application/x-ndjson"))
            .mount(&server)
            .await;

        let request = request_for(
            ProviderKind::Ollama,
            &format!("{}/api/chat", server.uri()),
            "",
        );
        let response = gateway().chat(request).await.unwrap();

        assert_eq!(
            body_text(response).await,
            "data: {\"choices\":[{\"delta\":{\"content\":\"Hey\"}}]}\n\ndata: [DONE]\n\n"
        );
    }

    #[tokio::test]
    async fn upstream_429_maps_to_rate_limited() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
            .mount(&server)
            .await;

        let request = request_for(
            ProviderKind::OpenAi,
            &format!("{}/v1/chat/completions", server.uri()),
            "sk-test-key-123",
        );
        let err = gateway().chat(request).await.unwrap_err();

        assert!(matches!(
            err,
            ApiError::Upstream(UpstreamFailure::RateLimited)
        ));
    }

    #[tokio::test]
    async fn missing_key_for_hosted_provider_is_a_config_error() {
        let request = request_for(
            ProviderKind::Anthropic,
            "https://api.anthropic.com/v1/messages",
            "   ",
        );
        let err = gateway().chat(request).await.unwrap_err();
        assert!(matches!(err, ApiError::Config(_)));
    }

    #[tokio::test]
    async fn custom_provider_requires_an_endpoint() {
        let request = ChatRequest {
            messages: vec![user_message("hi")],
            context: None,
            provider_config: ProviderConfig {
                provider_type: ProviderKind::Custom,
                endpoint_url: None,
                model_id: Some("local-model".to_string()),
                secret_ref: None,
                max_tokens: None,
                temperature: None,
                system_prompt: None,
            },
        };
        let err = gateway().chat(request).await.unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
    }

    #[tokio::test]
    async fn private_endpoint_is_rejected_when_local_is_disallowed() {
        let restricted = ProviderGateway::new(
            Arc::new(EgressClient::new(ProxyEnv::default(), TrustConfig::default())),
            Arc::new(SecretResolver::new()),
            test_limits(),
            false,
        );

        let request = request_for(
            ProviderKind::OpenAi,
            "http://10.0.0.5/v1/chat/completions",
            "sk-test-key-123",
        );
        let err = restricted.chat(request).await.unwrap_err();

        match err {
            ApiError::Validation(message) => assert!(message.contains("private_network")),
            other => panic!("expected validation error, got {other:?}"),
        }
    }
}
