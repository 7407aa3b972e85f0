//! The AI chat gateway route.
//!
//! The body is parsed by hand rather than through the `Json` extractor so
//! malformed payloads surface in the boundary error shape like every other
//! validation failure.

use axum::{body::Bytes, extract::State, response::Response};

use crate::{error::ApiError, providers::ChatRequest, state::AppState};

pub async fn chat(State(state): State<AppState>, body: Bytes) -> Result<Response, ApiError> {
    let request: ChatRequest = serde_json::from_slice(&body)
        .map_err(|err| ApiError::Validation(format!("invalid chat request: {err}")))?;
    state.gateway.chat(request).await
}
