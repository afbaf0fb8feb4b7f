//! Application error types.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::error;

use tessera_core::auth::AuthError;
use tessera_core::auth::signer::SignerError;

use crate::models::ErrorResponse;

/// Convenience alias for handler return types.
pub type AppResult<T> = Result<T, AppError>;

/// Application-level errors with HTTP status mapping.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal server error")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, message) = match &self {
            AppError::Validation(m) => (StatusCode::BAD_REQUEST, "validation_error", m.as_str()),
            AppError::Unauthorized(m) => (StatusCode::UNAUTHORIZED, "unauthorized", m.as_str()),
            AppError::Forbidden(m) => (StatusCode::FORBIDDEN, "forbidden", m.as_str()),
            AppError::Conflict(m) => (StatusCode::CONFLICT, "conflict", m.as_str()),
            AppError::Internal(detail) => {
                error!(detail = %detail, "request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "Internal server error",
                )
            }
        };
        let body = Json(ErrorResponse {
            error: error.to_string(),
            message: message.to_string(),
        });
        (status, body).into_response()
    }
}

impl From<AuthError> for AppError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::InvalidCredentials => AppError::Unauthorized("Invalid credentials".into()),
            AuthError::AccountDisabled => AppError::Forbidden("Account disabled".into()),
            AuthError::InvalidSessionId => AppError::Unauthorized("Invalid session".into()),
            AuthError::SessionNotFound => AppError::Unauthorized("Session not found".into()),
            AuthError::EmailTaken => AppError::Conflict("Email already registered".into()),
            AuthError::Validation(msg) => AppError::Validation(msg),
            AuthError::Token(e) => AppError::from(e),
            e @ (AuthError::PasswordHash(_) | AuthError::Store(_) | AuthError::Cache(_)) => {
                AppError::Internal(e.to_string())
            }
        }
    }
}

impl From<SignerError> for AppError {
    fn from(e: SignerError) -> Self {
        match e {
            SignerError::Expired => AppError::Unauthorized("Token expired".into()),
            SignerError::InvalidSignature
            | SignerError::InvalidAlgorithm
            | SignerError::Malformed(_) => AppError::Unauthorized("Invalid token".into()),
            other => AppError::Internal(other.to_string()),
        }
    }
}
