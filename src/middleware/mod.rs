//! HTTP boundary middleware.
//!
//! Ordering, outermost first: request-id, CORS/origin guard, body guards,
//! bearer auth, per-route rate limiting. Every failure converts to an
//! [`crate::error::ApiError`] response here; nothing below the boundary
//! builds HTTP responses.

mod auth;
mod body_guard;
mod cors;
mod rate_limit;
mod request_id;

pub use auth::require_bearer;
pub use body_guard::body_guard;
pub use cors::cors_middleware;
pub use rate_limit::{RouteLimit, rate_limit_middleware};
pub use request_id::{REQUEST_ID_HEADER, RequestId, request_id_middleware};
