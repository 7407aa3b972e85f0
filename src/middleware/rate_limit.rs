//! Per-route fixed-window rate limiting.
//!
//! Runs inside the auth layer so the key is the verified user id. Each
//! route carries its own [`RouteLimit`]; responses gain `X-RateLimit-*`
//! headers whenever the route is limited, and a denial becomes a 429 with
//! a `Retry-After` hint.

use axum::{
    extract::{Request, State},
    http::{HeaderMap, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::{
    auth::AuthedUser, error::ApiError, ratelimit::RateLimitDecision, state::AppState,
};

/// Operation name and request cap for one route.
#[derive(Debug, Clone, Copy)]
pub struct RouteLimit {
    pub operation: &'static str,
    pub limit: i64,
}

pub async fn rate_limit_middleware(
    State((state, route)): State<(AppState, RouteLimit)>,
    req: Request,
    next: Next,
) -> Response {
    // Callers without a verified identity never get this far; fall back
    // to a shared key rather than skipping the check if they somehow do.
    let user_id = req
        .extensions()
        .get::<AuthedUser>()
        .map(|user| user.user_id.clone())
        .unwrap_or_else(|| "anonymous".to_string());

    let decision = state
        .rate_limiter
        .check(route.operation, &user_id, route.limit);

    if !decision.allowed {
        tracing::warn!(
            operation = route.operation,
            user_id = %user_id,
            limit = decision.limit,
            "rate limit exceeded"
        );
        let mut response = ApiError::RateLimited {
            retry_after_secs: decision.retry_after_ms.div_ceil(1000),
        }
        .into_response();
        apply_headers(response.headers_mut(), &decision);
        return response;
    }

    let mut response = next.run(req).await;
    apply_headers(response.headers_mut(), &decision);
    response
}

fn apply_headers(headers: &mut HeaderMap, decision: &RateLimitDecision) {
    if decision.remaining < 0 {
        // Limiting disabled for this route; advertise nothing.
        return;
    }
    let pairs = [
        ("X-RateLimit-Limit", decision.limit.to_string()),
        ("X-RateLimit-Remaining", decision.remaining.to_string()),
        // The decision carries milliseconds; headers advertise whole
        // seconds, a partial second counting as a full one.
        (
            "X-RateLimit-Reset",
            decision.retry_after_ms.div_ceil(1000).to_string(),
        ),
    ];
    for (name, value) in pairs {
        if let Ok(value) = HeaderValue::from_str(&value) {
            headers.insert(name, value);
        }
    }
}
