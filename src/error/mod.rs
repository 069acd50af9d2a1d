//! Application error types for robust error handling.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Application-level errors.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unknown channel: {0}")]
    UnknownChannel(String),

    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Rejected without a body; used where the client must not learn why.
    #[error("Unauthorized")]
    Unauthorized,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("JWT error: {0}")]
    Jwt(String),

    #[error("Not connected")]
    NotConnected,

    #[error("Transport error: {0}")]
    Transport(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        AppError::Validation(errors.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::Unauthorized => return StatusCode::UNAUTHORIZED.into_response(),
            AppError::Config(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
            AppError::Redis(e) => (
                StatusCode::SERVICE_UNAVAILABLE,
                format!("Redis error: {}", e),
            ),
            AppError::Serialization(e) => (
                StatusCode::BAD_REQUEST,
                format!("Invalid payload: {}", e),
            ),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::UnknownChannel(name) => {
                (StatusCode::BAD_REQUEST, format!("Unknown channel: {}", name))
            }
            AppError::Auth(msg) => (StatusCode::UNAUTHORIZED, msg.clone()),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg.clone()),
            AppError::Jwt(msg) => (StatusCode::UNAUTHORIZED, msg.clone()),
            AppError::NotConnected => (StatusCode::SERVICE_UNAVAILABLE, self.to_string()),
            AppError::Transport(e) => (
                StatusCode::SERVICE_UNAVAILABLE,
                format!("Transport error: {}", e),
            ),
            AppError::Internal(e) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Internal error: {}", e),
            ),
        };

        let body = Json(json!({ "error": message }));
        (status, body).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;
