//! Anthropic SSE frame parsing.
//!
//! Anthropic streams typed SSE events; only `content_block_delta` text
//! carries assistant output. Everything else (message lifecycle, pings,
//! tool-use deltas) is dropped.

use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum AnthropicEvent {
    ContentBlockDelta { delta: AnthropicDelta },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct AnthropicDelta {
    #[serde(default)]
    text: Option<String>,
}

/// Extract the delta text from one SSE line, if it carries any.
///
/// Unparsable data lines are logged and skipped; they never abort the
/// stream.
pub(crate) fn delta_text(line: &str) -> Option<String> {
    if line.starts_with("event:") {
        return None;
    }
    let json_str = line.strip_prefix("data: ")?.trim();
    if json_str.is_empty() || json_str == "[DONE]" {
        return None;
    }

    match serde_json::from_str::<AnthropicEvent>(json_str) {
        Ok(AnthropicEvent::ContentBlockDelta { delta }) => delta.text,
        Ok(AnthropicEvent::Other) => None,
        Err(e) => {
            tracing::warn!(error = %e, "skipping unparsable anthropic frame");
            None
        }
    }
}
