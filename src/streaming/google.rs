//! Google (Gemini) streamed-JSON frame parsing.
//!
//! Gemini streams a raw JSON array of response objects with no SSE framing.
//! The scanner in `json_scan` carves out complete objects; this module pulls
//! the text from `candidates[0].content.parts[0].text`, falling back to a
//! bare top-level `text` field.

use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct GoogleChunk {
    #[serde(default)]
    candidates: Vec<GoogleCandidate>,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GoogleCandidate {
    #[serde(default)]
    content: Option<GoogleContent>,
}

#[derive(Debug, Deserialize)]
struct GoogleContent {
    #[serde(default)]
    parts: Vec<GooglePart>,
}

#[derive(Debug, Deserialize)]
struct GooglePart {
    #[serde(default)]
    text: Option<String>,
}

impl GoogleChunk {
    fn into_delta_text(self) -> Option<String> {
        self.candidates
            .into_iter()
            .next()
            .and_then(|candidate| candidate.content)
            .and_then(|content| content.parts.into_iter().next())
            .and_then(|part| part.text)
            .or(self.text)
    }
}

/// Extract the delta text from one complete response object, if any.
pub(crate) fn delta_text(object: &[u8]) -> Option<String> {
    match serde_json::from_slice::<GoogleChunk>(object) {
        Ok(chunk) => chunk.into_delta_text(),
        Err(e) => {
            tracing::warn!(error = %e, "skipping unparsable gemini fragment");
            None
        }
    }
}
