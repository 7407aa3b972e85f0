//! Analytics export route.
//!
//! Pushes an opaque analytics payload to the configured export endpoint.
//! The payload is forwarded as-is apart from user-id stripping: unless the
//! deployment opts in, every `userId`/`user_id` field is removed at any
//! nesting depth before the document leaves the platform.

use axum::{Json, body::Bytes, extract::State, http::header::AUTHORIZATION};
use serde::Serialize;
use serde_json::Value;

use crate::{
    error::{ApiError, UpstreamFailure},
    observability::redact::redact_str,
    secrets::ResolveOptions,
    state::AppState,
    validation::{UrlValidationOptions, validate_external_url},
};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportResponse {
    pub upstream_status: u16,
}

pub async fn export(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<ExportResponse>, ApiError> {
    let mut payload: Value = serde_json::from_slice(&body)
        .map_err(|err| ApiError::Validation(format!("invalid export payload: {err}")))?;

    let analytics = &state.config.analytics;
    let url = analytics
        .url
        .as_deref()
        .ok_or_else(|| ApiError::Config("ANALYTICS_EXPORT_URL is not configured".to_string()))?;
    let target = validate_external_url(
        url,
        UrlValidationOptions {
            allow_local: state.config.allow_local_endpoints,
        },
    )?;

    if !analytics.include_user_id {
        strip_user_ids(&mut payload);
    }

    let http = state
        .egress
        .client_for(&target)
        .map_err(|err| ApiError::Config(err.to_string()))?;
    let mut request = http
        .post(target.as_str())
        .timeout(analytics.timeout)
        .json(&payload);

    if let Some(token) = state
        .secrets
        .resolve(analytics.token.as_deref(), ResolveOptions::default())
        .await
    {
        request = request.header(AUTHORIZATION, format!("Bearer {token}"));
    }

    let response = request.send().await.map_err(|err| {
        tracing::warn!(error = %err, "analytics export request failed");
        ApiError::Upstream(UpstreamFailure::Unavailable)
    })?;

    // An upstream rejection is still a completed export attempt: the
    // caller gets a 200 envelope carrying whatever status came back.
    let status = response.status();
    if status.is_success() {
        tracing::info!(status = %status, "analytics payload exported");
    } else {
        let body = response.text().await.unwrap_or_default();
        tracing::warn!(
            status = %status,
            body = %redact_str(&body),
            "analytics export rejected upstream"
        );
    }
    Ok(Json(ExportResponse {
        upstream_status: status.as_u16(),
    }))
}

/// Remove user-identifying keys at every nesting depth, arrays included.
fn strip_user_ids(value: &mut Value) {
    match value {
        Value::Object(map) => {
            map.retain(|key, _| !matches!(key.as_str(), "userId" | "user_id"));
            for nested in map.values_mut() {
                strip_user_ids(nested);
            }
        }
        Value::Array(items) => {
            for item in items {
                strip_user_ids(item);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn strips_user_ids_at_every_depth() {
        let mut payload = json!({
            "userId": "u-1",
            "events": [
                {"name": "login", "user_id": "u-1", "meta": {"userId": "u-1", "ok": true}},
                {"name": "export"}
            ],
            "count": 2
        });

        strip_user_ids(&mut payload);

        assert_eq!(
            payload,
            json!({
                "events": [
                    {"name": "login", "meta": {"ok": true}},
                    {"name": "export"}
                ],
                "count": 2
            })
        );
    }

    #[test]
    fn leaves_non_matching_keys_alone() {
        let mut payload = json!({"userIdentifier": "keep", "user": {"id": "keep"}});
        strip_user_ids(&mut payload);
        assert_eq!(payload, json!({"userIdentifier": "keep", "user": {"id": "keep"}}));
    }
}
