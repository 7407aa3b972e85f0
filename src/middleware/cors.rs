//! Origin policy and CORS preflight.
//!
//! The allow-list from `ALLOWED_ORIGINS` is matched exactly (ASCII
//! case-insensitive); an empty list allows every origin. Preflight
//! `OPTIONS` requests are answered here without touching the router, so
//! they carry neither auth nor rate-limit cost.

use axum::{
    body::Body,
    extract::{Request, State},
    http::{
        HeaderValue, Method, StatusCode,
        header::{
            ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS,
            ACCESS_CONTROL_ALLOW_ORIGIN, ACCESS_CONTROL_MAX_AGE, ORIGIN, VARY,
        },
    },
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::{error::ApiError, state::AppState};

const ALLOWED_METHODS: &str = "POST, OPTIONS";
const ALLOWED_HEADERS: &str = "authorization, content-type";
const MAX_AGE_SECS: &str = "86400";

pub fn origin_allowed(origin: &str, allowed: &[String]) -> bool {
    allowed.is_empty() || allowed.iter().any(|entry| entry.eq_ignore_ascii_case(origin))
}

pub async fn cors_middleware(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Response {
    let allowed = &state.config.server.allowed_origins;
    let origin = req
        .headers()
        .get(ORIGIN)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    if let Some(origin) = &origin
        && !origin_allowed(origin, allowed)
    {
        tracing::warn!(origin = %origin, "request from disallowed origin");
        return ApiError::OriginForbidden.into_response();
    }

    if req.method() == Method::OPTIONS {
        return preflight(origin.as_deref(), allowed);
    }

    let mut response = next.run(req).await;
    if let Some(origin) = origin {
        apply_origin_header(response.headers_mut(), &origin, allowed);
    }
    response
}

fn preflight(origin: Option<&str>, allowed: &[String]) -> Response {
    let mut response = Response::builder()
        .status(StatusCode::NO_CONTENT)
        .body(Body::empty())
        .unwrap_or_default();

    let headers = response.headers_mut();
    if let Some(origin) = origin {
        apply_origin_header(headers, origin, allowed);
    }
    headers.insert(
        ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static(ALLOWED_METHODS),
    );
    headers.insert(
        ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static(ALLOWED_HEADERS),
    );
    headers.insert(ACCESS_CONTROL_MAX_AGE, HeaderValue::from_static(MAX_AGE_SECS));
    response
}

fn apply_origin_header(
    headers: &mut axum::http::HeaderMap,
    origin: &str,
    allowed: &[String],
) {
    // Allow-all deployments advertise the wildcard; restricted ones echo
    // the (already checked) requesting origin and mark it cache-variant.
    let value = if allowed.is_empty() {
        HeaderValue::from_static("*")
    } else {
        match HeaderValue::from_str(origin) {
            Ok(value) => value,
            Err(_) => return,
        }
    };
    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, value);
    if !allowed.is_empty() {
        headers.insert(VARY, HeaderValue::from_static("Origin"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_allow_list_allows_everything() {
        assert!(origin_allowed("https://anywhere.example", &[]));
    }

    #[test]
    fn exact_match_is_case_insensitive() {
        let allowed = vec!["https://App.Example.com".to_string()];
        assert!(origin_allowed("https://app.example.com", &allowed));
        assert!(!origin_allowed("https://evil.example.com", &allowed));
        // A subdomain is a different origin.
        assert!(!origin_allowed("https://sub.app.example.com", &allowed));
    }

    #[test]
    fn preflight_carries_the_contract_headers() {
        let response = preflight(Some("https://app.example.com"), &[]);
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let headers = response.headers();
        assert_eq!(headers.get(ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(), "*");
        assert_eq!(headers.get(ACCESS_CONTROL_ALLOW_METHODS).unwrap(), ALLOWED_METHODS);
        assert_eq!(headers.get(ACCESS_CONTROL_ALLOW_HEADERS).unwrap(), ALLOWED_HEADERS);
        assert_eq!(headers.get(ACCESS_CONTROL_MAX_AGE).unwrap(), "86400");
    }

    #[test]
    fn restricted_preflight_echoes_the_origin() {
        let allowed = vec!["https://app.example.com".to_string()];
        let response = preflight(Some("https://app.example.com"), &allowed);
        assert_eq!(
            response.headers().get(ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
            "https://app.example.com"
        );
        assert_eq!(response.headers().get(VARY).unwrap(), "Origin");
    }
}
