//! Validation of outbound targets before any egress call.

pub mod url;

pub use url::{UrlRejection, UrlValidationOptions, ValidatedUrl, validate_external_url};
