//! Application error types.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use eveauth_core::auth::AuthError;
use eveauth_core::sso::SsoError;
use eveauth_core::sso::flow::LoginError;
use thiserror::Error;
use tracing::{error, warn};

use crate::models::ErrorResponse;

/// Convenience alias for handler return types.
pub type AppResult<T> = Result<T, AppError>;

/// Message for every rejected login. Details only go to the log.
pub const AUTHENTICATION_FAILED: &str = "Authentication failed";

/// Application-level errors with HTTP status mapping.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Internal server error")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, message) = match &self {
            AppError::Validation(m) => (StatusCode::BAD_REQUEST, "validation_error", m.as_str()),
            AppError::Unauthorized(m) => (StatusCode::UNAUTHORIZED, "unauthorized", m.as_str()),
            AppError::Unavailable(m) => {
                (StatusCode::SERVICE_UNAVAILABLE, "unavailable", m.as_str())
            }
            AppError::Internal(detail) => {
                error!(detail = %detail, "internal error");
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

impl From<LoginError> for AppError {
    fn from(e: LoginError) -> Self {
        warn!(stage = e.stage().as_str(), error = %e, "login failed");
        match e {
            LoginError::Unavailable(_) => {
                AppError::Unavailable("Login temporarily unavailable".into())
            }
            _ => AppError::Unauthorized(AUTHENTICATION_FAILED.into()),
        }
    }
}

impl From<AuthError> for AppError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::InvalidSession(_) => {
                AppError::Unauthorized("Invalid or expired session".into())
            }
            AuthError::TokenError(msg) => AppError::Internal(msg),
        }
    }
}

impl From<SsoError> for AppError {
    fn from(e: SsoError) -> Self {
        if e.is_transient() {
            AppError::Unavailable(e.to_string())
        } else {
            AppError::Internal(e.to_string())
        }
    }
}
