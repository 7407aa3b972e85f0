//! Content-type and declared-size guards for JSON routes.
//!
//! Runs before auth: an oversized or mistyped request is rejected without
//! spending signature verification on it. The declared `Content-Length` is
//! checked here; bodies that arrive chunked are capped by the router's
//! byte-limit layer instead.

use axum::{
    extract::{Request, State},
    http::{
        Method,
        header::{CONTENT_LENGTH, CONTENT_TYPE},
    },
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::{error::ApiError, state::AppState};

pub async fn body_guard(State(state): State<AppState>, req: Request, next: Next) -> Response {
    // Preflight is answered further out; everything else on the API
    // surface is POST.
    if req.method() != Method::POST {
        return ApiError::MethodNotAllowed.into_response();
    }

    let headers = req.headers();

    let json = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| {
            ct.trim()
                .split(';')
                .next()
                .is_some_and(|mime| mime.trim().eq_ignore_ascii_case("application/json"))
        });
    if !json {
        return ApiError::UnsupportedMediaType.into_response();
    }

    let declared = headers
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<usize>().ok());
    if let Some(length) = declared
        && length > state.config.server.max_request_body_bytes
    {
        return ApiError::PayloadTooLarge.into_response();
    }

    next.run(req).await
}
