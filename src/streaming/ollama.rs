//! Ollama NDJSON frame parsing.
//!
//! Ollama streams one JSON object per line with no SSE prefix; assistant
//! output lives at `message.content`. The final `done:true` line usually
//! carries no content and falls out naturally.

use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct OllamaChunk {
    #[serde(default)]
    message: Option<OllamaMessage>,
}

#[derive(Debug, Deserialize)]
struct OllamaMessage {
    #[serde(default)]
    content: String,
}

/// Extract the delta text from one NDJSON line, if it carries any.
pub(crate) fn delta_text(line: &str) -> Option<String> {
    match serde_json::from_str::<OllamaChunk>(line) {
        Ok(chunk) => chunk.message.map(|message| message.content),
        Err(e) => {
            tracing::warn!(error = %e, "skipping unparsable ollama frame");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_content_is_extracted() {
        let line = r#"{"model":"llama3","created_at":"2026-01-15T10:30:00Z","message":{"role":"assistant","content":"Hi"},"done":false}"#;
        assert_eq!(delta_text(line).as_deref(), Some("Hi"));
    }

    #[test]
    fn done_line_without_message_yields_nothing() {
        let line = r#"{"model":"llama3","done":true,"total_duration":12345}"#;
        assert_eq!(delta_text(line), None);
    }

    #[test]
    fn garbage_is_skipped() {
        assert_eq!(delta_text("not json"), None);
    }
}
