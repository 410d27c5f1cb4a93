//! `Requester` extractor: verifies the bearer token and yields the requester id.

use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;

use crate::auth::bearer_token;
use crate::model::RequesterId;

use super::AppState;
use super::error::ApiError;

/// Authenticated requester, handed to handlers as an explicit value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Requester(pub RequesterId);

impl FromRequestParts<AppState> for Requester {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok());

        let verified = bearer_token(header).and_then(|token| state.verifier.verify(token));
        match verified {
            Ok(id) => Ok(Requester(id)),
            Err(e) => {
                tracing::debug!("rejected bearer token: {e}");
                metrics::counter!(crate::observability::AUTH_FAILURES_TOTAL).increment(1);
                Err(e.into())
            }
        }
    }
}
