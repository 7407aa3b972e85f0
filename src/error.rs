//! Request-boundary error taxonomy.
//!
//! Helpers below the HTTP boundary (secret resolution, proxy routing) return
//! `Option` sentinels and never error; route handlers and middleware are the
//! only places failures become HTTP responses, via this enum. Bodies carry a
//! generic message plus an error code; the request-id middleware injects
//! `error.request_id` for log correlation. Diagnostic detail goes to the
//! structured log only.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use crate::validation::UrlRejection;

/// Stable category for a failed provider or export call.
///
/// Upstream bodies are never echoed to the caller; the category is derived
/// from the upstream status alone. A rejected provider key is a server-side
/// configuration problem and surfaces as a 500, not a 401, so it cannot be
/// confused with this service's own auth.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpstreamFailure {
    RateLimited,
    CreditsExhausted,
    InvalidKey,
    Unavailable,
}

impl UpstreamFailure {
    pub fn from_status(status: StatusCode) -> Self {
        match status.as_u16() {
            429 => Self::RateLimited,
            402 => Self::CreditsExhausted,
            401 => Self::InvalidKey,
            _ => Self::Unavailable,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Self::CreditsExhausted => StatusCode::PAYMENT_REQUIRED,
            Self::InvalidKey | Self::Unavailable => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::RateLimited => "provider_rate_limited",
            Self::CreditsExhausted => "provider_credits_exhausted",
            Self::InvalidKey => "provider_key_rejected",
            Self::Unavailable => "provider_unavailable",
        }
    }

    fn message(&self) -> &'static str {
        match self {
            Self::RateLimited => "The upstream provider is rate limiting requests, try again later",
            Self::CreditsExhausted => "Upstream provider credits are exhausted",
            Self::InvalidKey => "The configured provider credentials were rejected",
            Self::Unavailable => "The upstream provider is currently unavailable",
        }
    }
}

impl std::fmt::Display for UpstreamFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    /// Missing or unusable server-side configuration for this request.
    #[error("configuration error: {0}")]
    Config(String),

    /// The request payload failed validation.
    #[error("{0}")]
    Validation(String),

    /// Body exceeded the configured size limit.
    #[error("request body too large")]
    PayloadTooLarge,

    /// Content type other than application/json on a JSON route.
    #[error("unsupported media type")]
    UnsupportedMediaType,

    /// API routes accept POST only.
    #[error("method not allowed")]
    MethodNotAllowed,

    /// Missing, malformed, or expired bearer token.
    #[error("{0}")]
    Unauthorized(&'static str),

    /// Origin not in the allow-list.
    #[error("origin not allowed")]
    OriginForbidden,

    /// Local fixed-window limit exceeded.
    #[error("rate limit exceeded")]
    RateLimited { retry_after_secs: u64 },

    /// Upstream call failed; category mapped from its status.
    #[error("upstream failure: {0}")]
    Upstream(UpstreamFailure),
}

impl From<crate::egress::EgressError> for ApiError {
    fn from(err: crate::egress::EgressError) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<UrlRejection> for ApiError {
    fn from(rejection: UrlRejection) -> Self {
        Self::Validation(format!("endpoint URL rejected: {}", rejection.kind()))
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, Serialize)]
struct ErrorDetail {
    code: &'static str,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            ApiError::Config(detail) => {
                tracing::error!(detail = %detail, "request failed on configuration");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "configuration_error",
                    "Service configuration error".to_string(),
                )
            }
            ApiError::Validation(message) => {
                (StatusCode::BAD_REQUEST, "validation_error", message.clone())
            }
            ApiError::PayloadTooLarge => (
                StatusCode::PAYLOAD_TOO_LARGE,
                "payload_too_large",
                "Request body too large".to_string(),
            ),
            ApiError::UnsupportedMediaType => (
                StatusCode::UNSUPPORTED_MEDIA_TYPE,
                "unsupported_media_type",
                "Content-Type must be application/json".to_string(),
            ),
            ApiError::MethodNotAllowed => (
                StatusCode::METHOD_NOT_ALLOWED,
                "method_not_allowed",
                "Use POST for this endpoint".to_string(),
            ),
            ApiError::Unauthorized(message) => {
                (StatusCode::UNAUTHORIZED, "unauthorized", message.to_string())
            }
            ApiError::OriginForbidden => (
                StatusCode::FORBIDDEN,
                "origin_forbidden",
                "Origin not allowed".to_string(),
            ),
            ApiError::RateLimited { retry_after_secs } => {
                let body = ErrorBody {
                    error: ErrorDetail {
                        code: "rate_limited",
                        message: "Rate limit exceeded, try again later".to_string(),
                    },
                };
                return (
                    StatusCode::TOO_MANY_REQUESTS,
                    [("Retry-After", retry_after_secs.to_string())],
                    Json(body),
                )
                    .into_response();
            }
            ApiError::Upstream(failure) => {
                (failure.status(), failure.code(), failure.message().to_string())
            }
        };

        let body = ErrorBody {
            error: ErrorDetail { code, message },
        };
        (status, Json(body)).into_response()
    }
}
