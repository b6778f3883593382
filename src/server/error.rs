//! HTTP error responses
//!
//! Handlers return `Result<T, ApiError>`; the error renders as
//! `{"error": "..."}` with a status picked from the underlying
//! [`GatewayError`]. Storage and I/O details are logged, not returned.

use crate::error::{gateway_error, GatewayError};
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

/// Error returned by every handler
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    /// 400 with the given message
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    /// 404 with the given message
    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }

    /// Status code of the response
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Client-facing message
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        let (status, message) = match gateway_error(&err) {
            Some(GatewayError::AuthUnavailable) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "missing credentials".to_string(),
            ),
            Some(GatewayError::BadRequest(m)) => (StatusCode::BAD_REQUEST, m.clone()),
            Some(GatewayError::NotFound(m)) => (StatusCode::NOT_FOUND, m.clone()),
            Some(
                e @ (GatewayError::Upstream { .. }
                | GatewayError::Transport(_)
                | GatewayError::MalformedDrawResponse
                | GatewayError::IncompleteDrawResponse(_)),
            ) => {
                tracing::warn!(error = %e, "Request failed upstream");
                (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
            }
            _ => {
                tracing::error!(error = ?err, "Internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal server error".to_string(),
                )
            }
        };
        Self { status, message }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}
