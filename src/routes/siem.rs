//! SIEM forwarding route.
//!
//! Delivers one audit event to the integrations supplied in the request
//! and reports every delivery attempt back to the caller. Skipped
//! integrations (disabled, or filtered out by entity/action) produce no
//! record.

use axum::{Json, body::Bytes, extract::State};
use serde::{Deserialize, Serialize};

use crate::{
    error::ApiError,
    observability::siem::{AuditEvent, DeliveryRecord, SiemIntegration},
    state::AppState,
};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForwardRequest {
    pub event: AuditEvent,
    pub integrations: Vec<SiemIntegration>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ForwardResponse {
    pub forwarded: usize,
    pub failed: usize,
    pub deliveries: Vec<DeliveryRecord>,
}

pub async fn forward(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<ForwardResponse>, ApiError> {
    let request: ForwardRequest = serde_json::from_slice(&body)
        .map_err(|err| ApiError::Validation(format!("invalid forward request: {err}")))?;

    let deliveries = state
        .forwarder
        .forward_event(&request.event, &request.integrations)
        .await;

    let forwarded = deliveries.iter().filter(|record| record.success).count();
    Ok(Json(ForwardResponse {
        forwarded,
        failed: deliveries.len() - forwarded,
        deliveries,
    }))
}
