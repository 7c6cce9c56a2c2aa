//! services/api/src/error.rs
//!
//! Defines the primary error type for the entire API service and its mapping
//! onto HTTP responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::config::ConfigError;
use crate::session::AuthError;
use questlog_core::ports::PortError;

/// The primary error type for the `api` service.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Represents an error that occurred during configuration loading.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Represents an authentication or token lifecycle failure.
    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    /// Represents an error that propagated up from one of the core service ports.
    #[error("Service Port Error: {0}")]
    Port(#[from] PortError),

    /// Represents a rejected request payload.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Represents an error from the underlying database library.
    #[error("Database Error: {0}")]
    Database(#[from] sqlx::Error),

    /// Represents a standard Input/Output error (e.g., binding to a network socket).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A catch-all for any other unexpected errors.
    #[error("An unexpected internal error occurred: {0}")]
    Internal(String),
}

impl ApiError {
    /// The status code and client-facing message for this error.
    ///
    /// Credential and token failures collapse onto fixed messages: a
    /// response never distinguishes an unknown account from a bad password,
    /// and store failures surface without internal detail.
    fn status_and_message(&self) -> (StatusCode, String) {
        match self {
            ApiError::Auth(AuthError::InvalidCredentials) => (
                StatusCode::UNAUTHORIZED,
                "Invalid email or password".to_string(),
            ),
            ApiError::Auth(AuthError::NoToken) => (
                StatusCode::UNAUTHORIZED,
                "No refresh token provided".to_string(),
            ),
            ApiError::Auth(AuthError::Unauthorized) => {
                (StatusCode::UNAUTHORIZED, "Invalid token".to_string())
            }
            ApiError::Auth(AuthError::InvalidToken)
            | ApiError::Auth(AuthError::TokenReuseDetected) => {
                (StatusCode::FORBIDDEN, "Invalid refresh token".to_string())
            }
            ApiError::Auth(AuthError::Internal(_)) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
            ),
            ApiError::Port(PortError::NotFound(msg)) => (StatusCode::NOT_FOUND, msg.clone()),
            ApiError::Port(PortError::Conflict(msg)) => (StatusCode::CONFLICT, msg.clone()),
            ApiError::Port(PortError::Unauthorized) => {
                (StatusCode::UNAUTHORIZED, "Unauthorized".to_string())
            }
            ApiError::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            _ => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
            ),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = self.status_and_message();
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!("request failed: {:?}", self);
        }
        (status, Json(json!({ "message": message }))).into_response()
    }
}
