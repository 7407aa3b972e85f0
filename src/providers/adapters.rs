//! Provider-native request construction and dispatch.
//!
//! One call function per provider family. Each builds the provider's wire
//! body from a [`ChatCall`], attaches its auth scheme, and sends through the
//! shared egress client. Status handling and stream normalization stay in
//! the gateway; these functions only get bytes moving.

use std::time::Duration;

use http::header::AUTHORIZATION;
use serde::Serialize;

use super::{ChatCall, ChatRole};
use crate::{
    egress::EgressClient,
    error::{ApiError, UpstreamFailure},
    validation::ValidatedUrl,
};

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Whole-call budget, generous because responses stream token by token.
const CHAT_TIMEOUT: Duration = Duration::from_secs(300);

/// Role/content pair shared by the OpenAI, Anthropic, and Ollama wire formats.
#[derive(Debug, Serialize)]
struct WireMessage<'a> {
    role: &'a str,
    content: &'a str,
}

fn wire_messages<'a>(call: &ChatCall<'a>, include_system: bool) -> Vec<WireMessage<'a>> {
    let mut messages = Vec::with_capacity(call.messages.len() + 1);
    if include_system && !call.system_prompt.is_empty() {
        messages.push(WireMessage {
            role: "system",
            content: call.system_prompt,
        });
    }
    for message in call.messages {
        messages.push(WireMessage {
            role: message.role.as_str(),
            content: &message.content,
        });
    }
    messages
}

fn send_failure(error: reqwest::Error) -> ApiError {
    // without_url: the Google URL carries the API key as a query parameter.
    let error = error.without_url();
    tracing::warn!(error = %error, "provider request failed");
    ApiError::Upstream(UpstreamFailure::Unavailable)
}

#[derive(Debug, Serialize)]
struct OpenAiChatRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    stream: bool,
}

fn openai_body<'a>(call: &ChatCall<'a>) -> OpenAiChatRequest<'a> {
    OpenAiChatRequest {
        model: call.model,
        messages: wire_messages(call, true),
        max_tokens: call.max_tokens,
        temperature: call.temperature,
        stream: true,
    }
}

/// OpenAI, Lovable, HuggingFace, and custom endpoints all speak the same
/// chat-completions dialect; the only variation is whether a key exists.
pub(super) async fn call_openai_compatible(
    egress: &EgressClient,
    endpoint: &ValidatedUrl,
    api_key: Option<&str>,
    call: &ChatCall<'_>,
) -> Result<reqwest::Response, ApiError> {
    let client = egress.client_for(endpoint)?;

    let mut request = client
        .post(endpoint.as_str())
        .json(&openai_body(call))
        .timeout(CHAT_TIMEOUT);
    if let Some(key) = api_key {
        request = request.header(AUTHORIZATION, format!("Bearer {key}"));
    }

    request.send().await.map_err(send_failure)
}

#[derive(Debug, Serialize)]
struct AnthropicChatRequest<'a> {
    model: &'a str,
    #[serde(skip_serializing_if = "str::is_empty")]
    system: &'a str,
    messages: Vec<WireMessage<'a>>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    stream: bool,
}

fn anthropic_body<'a>(call: &ChatCall<'a>) -> AnthropicChatRequest<'a> {
    AnthropicChatRequest {
        model: call.model,
        system: call.system_prompt,
        messages: wire_messages(call, false),
        max_tokens: call.max_tokens,
        temperature: call.temperature,
        stream: true,
    }
}

pub(super) async fn call_anthropic(
    egress: &EgressClient,
    endpoint: &ValidatedUrl,
    api_key: &str,
    call: &ChatCall<'_>,
) -> Result<reqwest::Response, ApiError> {
    let client = egress.client_for(endpoint)?;

    client
        .post(endpoint.as_str())
        .header("x-api-key", api_key)
        .header("anthropic-version", ANTHROPIC_VERSION)
        .json(&anthropic_body(call))
        .timeout(CHAT_TIMEOUT)
        .send()
        .await
        .map_err(send_failure)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GoogleChatRequest<'a> {
    contents: Vec<GoogleContent<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GoogleSystemInstruction<'a>>,
    generation_config: GoogleGenerationConfig,
}

#[derive(Debug, Serialize)]
struct GoogleContent<'a> {
    role: &'a str,
    parts: [GoogleTextPart<'a>; 1],
}

#[derive(Debug, Serialize)]
struct GoogleSystemInstruction<'a> {
    parts: [GoogleTextPart<'a>; 1],
}

#[derive(Debug, Serialize)]
struct GoogleTextPart<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GoogleGenerationConfig {
    max_output_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
}

fn google_body<'a>(call: &ChatCall<'a>) -> GoogleChatRequest<'a> {
    let contents = call
        .messages
        .iter()
        .map(|message| GoogleContent {
            role: match message.role {
                ChatRole::User => "user",
                ChatRole::Assistant => "model",
            },
            parts: [GoogleTextPart {
                text: &message.content,
            }],
        })
        .collect();

    let system_instruction = (!call.system_prompt.is_empty()).then(|| GoogleSystemInstruction {
        parts: [GoogleTextPart {
            text: call.system_prompt,
        }],
    });

    GoogleChatRequest {
        contents,
        system_instruction,
        generation_config: GoogleGenerationConfig {
            max_output_tokens: call.max_tokens,
            temperature: call.temperature,
        },
    }
}

/// Gemini authenticates with a `key` query parameter, not a header. The key
/// is appended after validation so it never participates in URL checks.
pub(super) async fn call_google(
    egress: &EgressClient,
    endpoint: &ValidatedUrl,
    api_key: &str,
    call: &ChatCall<'_>,
) -> Result<reqwest::Response, ApiError> {
    let client = egress.client_for(endpoint)?;

    let mut url = endpoint.as_url().clone();
    url.query_pairs_mut().append_pair("key", api_key);

    client
        .post(url.as_str())
        .json(&google_body(call))
        .timeout(CHAT_TIMEOUT)
        .send()
        .await
        .map_err(send_failure)
}

#[derive(Debug, Serialize)]
struct OllamaChatRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    stream: bool,
}

fn ollama_body<'a>(call: &ChatCall<'a>) -> OllamaChatRequest<'a> {
    OllamaChatRequest {
        model: call.model,
        messages: wire_messages(call, true),
        stream: true,
    }
}

/// Ollama daemons are unauthenticated; no key is sent.
pub(super) async fn call_ollama(
    egress: &EgressClient,
    endpoint: &ValidatedUrl,
    call: &ChatCall<'_>,
) -> Result<reqwest::Response, ApiError> {
    let client = egress.client_for(endpoint)?;

    client
        .post(endpoint.as_str())
        .json(&ollama_body(call))
        .timeout(CHAT_TIMEOUT)
        .send()
        .await
        .map_err(send_failure)
}
