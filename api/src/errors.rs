use crate::{dto::FieldErrors, session::SessionError};
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::debug;

/// Failures reported by the backend service boundary.
///
/// The gateway never lets these escape: they are logged and turned into an
/// empty result. They exist so that the backend implementations and the
/// saga can tell steps apart.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BackendError {
    #[error("{0} not found")]
    NotFound(String),
    #[error("unauthorized")]
    Unauthorized,
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("injected failure at {0}")]
    Injected(String),
    #[error("backend error: {0}")]
    Internal(String),
}

#[derive(Debug)]
pub enum ApiError {
    Unauthorized,
    NotFound,
    RateLimited,
    ValidationError(FieldErrors),
    /// A backend call came back empty; the user is asked to try again.
    RetryLater(String),
}

/// Every error leaves as `{"error": ...}`; validation failures add the
/// per-field messages under `fields`.
impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, "Unauthorized"),
            ApiError::NotFound => (StatusCode::NOT_FOUND, "Not Found"),
            ApiError::RateLimited => (StatusCode::TOO_MANY_REQUESTS, "Too many requests"),
            ApiError::ValidationError(fields) => {
                return (
                    StatusCode::BAD_REQUEST,
                    Json(serde_json::json!({
                      "error": "Validation failed",
                      "fields": fields
                    })),
                )
                    .into_response();
            }
            ApiError::RetryLater(msg) => {
                debug!("Asking client to retry: {}", msg);
                return (
                    StatusCode::BAD_GATEWAY,
                    Json(serde_json::json!({
                      "error": msg
                    })),
                )
                    .into_response();
            }
        };

        (
            status,
            Json(serde_json::json!({
              "error": message
            })),
        )
            .into_response()
    }
}

impl From<SessionError> for ApiError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::Invalid(fields) => ApiError::ValidationError(fields),
            other => ApiError::RetryLater(other.to_string()),
        }
    }
}
