//! HTTP surface assembly.
//!
//! `/health` is open; the three `/v1` routes sit behind the full boundary
//! stack. Layer order, outermost first: request-id, trace, CORS/origin,
//! byte cap on the body, then per-route method/content guards, bearer
//! auth, and rate limiting.

pub mod analytics;
pub mod chat;
pub mod health;
pub mod siem;

use axum::{
    Router,
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
};
use tower_http::{limit::RequestBodyLimitLayer, trace::TraceLayer};

use crate::{
    middleware::{
        RouteLimit, body_guard, cors_middleware, rate_limit_middleware, request_id_middleware,
        require_bearer,
    },
    state::AppState,
};

pub fn build_router(state: AppState) -> Router {
    let limits = &state.config.rate_limit;

    let chat_limit = from_fn_with_state(
        (
            state.clone(),
            RouteLimit {
                operation: "ai_chat",
                limit: limits.ai_chat_max,
            },
        ),
        rate_limit_middleware,
    );
    let siem_limit = from_fn_with_state(
        (
            state.clone(),
            RouteLimit {
                operation: "siem_forward",
                limit: limits.siem_forward_max,
            },
        ),
        rate_limit_middleware,
    );
    let analytics_limit = from_fn_with_state(
        (
            state.clone(),
            RouteLimit {
                operation: "analytics_export",
                limit: limits.analytics_export_max,
            },
        ),
        rate_limit_middleware,
    );

    let api = Router::new()
        .route("/v1/ai/chat", post(chat::chat).route_layer(chat_limit))
        .route("/v1/siem/forward", post(siem::forward).route_layer(siem_limit))
        .route(
            "/v1/analytics/export",
            post(analytics::export).route_layer(analytics_limit),
        )
        .route_layer(from_fn_with_state(state.clone(), require_bearer))
        .route_layer(from_fn_with_state(state.clone(), body_guard));

    Router::new()
        .route("/health", get(health::health))
        .merge(api)
        .layer(RequestBodyLimitLayer::new(
            state.config.server.max_request_body_bytes,
        ))
        .layer(from_fn_with_state(state.clone(), cors_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(from_fn(request_id_middleware))
        .with_state(state)
}
