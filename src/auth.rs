//! Bearer-token verification at the HTTP boundary.
//!
//! Tokens are issued elsewhere; this only turns a valid token into the
//! requester id the admission service takes as an explicit argument.

use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::RequesterId;

/// Claims carried by tokens from the login service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub user_id: RequesterId,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub role: String,
    /// Expiration (seconds since epoch).
    pub exp: i64,
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("missing bearer token")]
    MissingToken,
    #[error("invalid token: {0}")]
    InvalidToken(String),
}

pub trait TokenVerifier: Send + Sync {
    fn verify(&self, token: &str) -> Result<RequesterId, AuthError>;
}

/// HS256 verifier with a shared secret.
pub struct HmacTokenVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl HmacTokenVerifier {
    pub fn new(secret: &[u8]) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 5; // clock skew, seconds
        Self {
            key: DecodingKey::from_secret(secret),
            validation,
        }
    }
}

impl std::fmt::Debug for HmacTokenVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HmacTokenVerifier")
            .field("validation", &self.validation)
            .finish()
    }
}

impl TokenVerifier for HmacTokenVerifier {
    fn verify(&self, token: &str) -> Result<RequesterId, AuthError> {
        decode::<Claims>(token, &self.key, &self.validation)
            .map(|data| data.claims.user_id)
            .map_err(|e| AuthError::InvalidToken(e.to_string()))
    }
}

/// Extract the token from an `Authorization` header value.
/// Accepts `Bearer <token>`, and a bare token as the login service's clients send it.
pub fn bearer_token(header: Option<&str>) -> Result<&str, AuthError> {
    let value = header.ok_or(AuthError::MissingToken)?;
    let token = value.strip_prefix("Bearer ").unwrap_or(value).trim();
    if token.is_empty() {
        return Err(AuthError::MissingToken);
    }
    Ok(token)
}
