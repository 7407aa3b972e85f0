//! Bearer-token verification.
//!
//! Every API route (health excepted) requires `Authorization: Bearer <jwt>`,
//! verified as HS256 against the shared secret from configuration. The
//! subject claim becomes the caller identity used for rate-limit keys and
//! audit context. There is no session state; each request is verified
//! independently.

use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde::Deserialize;

use crate::error::ApiError;

/// Identity of the verified caller, stored in request extensions.
#[derive(Debug, Clone)]
pub struct AuthedUser {
    pub user_id: String,
}

#[derive(Debug, Deserialize)]
struct Claims {
    sub: String,
    #[allow(dead_code)]
    exp: usize,
}

pub struct JwtVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl JwtVerifier {
    pub fn new(secret: &[u8]) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.required_spec_claims = ["exp", "sub"].iter().map(|s| s.to_string()).collect();
        Self {
            key: DecodingKey::from_secret(secret),
            validation,
        }
    }

    /// Verify a compact JWT and extract the caller identity.
    ///
    /// All failure modes collapse to a 401 with a generic message; the
    /// precise reason goes to the log at debug level only.
    pub fn verify(&self, token: &str) -> Result<AuthedUser, ApiError> {
        match decode::<Claims>(token, &self.key, &self.validation) {
            Ok(data) => Ok(AuthedUser {
                user_id: data.claims.sub,
            }),
            Err(err) => {
                tracing::debug!(error = %err, "bearer token rejected");
                Err(ApiError::Unauthorized("invalid or expired bearer token"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use jsonwebtoken::{EncodingKey, Header, encode};
    use serde::Serialize;

    use super::*;

    const SECRET: &[u8] = b"unit-test-secret";

    #[derive(Serialize)]
    struct TestClaims {
        sub: &'static str,
        exp: i64,
    }

    fn token(secret: &[u8], exp_offset_secs: i64) -> String {
        let claims = TestClaims {
            sub: "user-42",
            exp: chrono::Utc::now().timestamp() + exp_offset_secs,
        };
        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(secret),
        )
        .unwrap()
    }

    #[test]
    fn valid_token_yields_the_subject() {
        let verifier = JwtVerifier::new(SECRET);
        let user = verifier.verify(&token(SECRET, 3600)).unwrap();
        assert_eq!(user.user_id, "user-42");
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let verifier = JwtVerifier::new(SECRET);
        let err = verifier.verify(&token(b"other-secret", 3600)).unwrap_err();
        assert!(matches!(err, ApiError::Unauthorized(_)));
    }

    #[test]
    fn expired_token_is_rejected() {
        let verifier = JwtVerifier::new(SECRET);
        // Past the default leeway.
        let err = verifier.verify(&token(SECRET, -600)).unwrap_err();
        assert!(matches!(err, ApiError::Unauthorized(_)));
    }

    #[test]
    fn token_without_subject_is_rejected() {
        #[derive(Serialize)]
        struct NoSub {
            exp: i64,
        }
        let raw = encode(
            &Header::new(Algorithm::HS256),
            &NoSub {
                exp: chrono::Utc::now().timestamp() + 3600,
            },
            &EncodingKey::from_secret(SECRET),
        )
        .unwrap();

        let verifier = JwtVerifier::new(SECRET);
        assert!(verifier.verify(&raw).is_err());
    }

    #[test]
    fn garbage_token_is_rejected() {
        let verifier = JwtVerifier::new(SECRET);
        assert!(verifier.verify("not.a.jwt").is_err());
    }
}
