//! Maps admission and ledger errors to HTTP responses.

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::admission::AdmissionError;
use crate::auth::AuthError;
use crate::ledger::LedgerError;

/// Standard API error body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiErrorResponse {
    /// Machine-readable error code.
    pub error: String,
    /// Human-readable message.
    pub message: String,
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error(transparent)]
    Unauthorized(#[from] AuthError),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    Unavailable(String),
}

impl From<AdmissionError> for ApiError {
    fn from(e: AdmissionError) -> Self {
        match e {
            AdmissionError::InvalidInterval | AdmissionError::Rejected(_) => {
                ApiError::BadRequest(e.to_string())
            }
            AdmissionError::RoomNotFound(_) => ApiError::NotFound(e.to_string()),
            AdmissionError::Conflict => ApiError::Conflict(e.to_string()),
            AdmissionError::Unavailable(_) => ApiError::Unavailable(e.to_string()),
        }
    }
}

impl From<LedgerError> for ApiError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::RoomNotFound(_) => ApiError::NotFound(e.to_string()),
            other => ApiError::from(AdmissionError::from(other)),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            ApiError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            ApiError::Conflict(_) => (StatusCode::CONFLICT, "CONFLICT"),
            ApiError::Unavailable(_) => (StatusCode::INTERNAL_SERVER_ERROR, "UNAVAILABLE"),
        };
        // Infrastructure detail stays in the logs.
        let message = match &self {
            ApiError::Unavailable(_) => "booking store unavailable, retry later".to_string(),
            other => other.to_string(),
        };

        let body = ApiErrorResponse {
            error: code.to_string(),
            message,
        };
        (status, Json(body)).into_response()
    }
}
