//! services/api/src/error.rs
//!
//! Defines the startup error type for the API service and the request-level
//! error that handlers return.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use mangati_core::{AccessError, PortError, QuotaError, ValidationError};
use serde_json::json;
use tracing::error;

use crate::config::ConfigError;
use crate::token::TokenError;

/// The primary error type for starting and running the `api` service.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Represents an error that occurred during configuration loading.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Token signing could not be set up. Fatal: the service must not run unsigned.
    #[error("Token configuration error: {0}")]
    Token(#[from] TokenError),

    /// Represents an error that propagated up from the persistence port.
    #[error("Service Port Error: {0}")]
    Port(#[from] PortError),

    /// Represents an error from the underlying database library.
    #[error("Database Error: {0}")]
    Database(#[from] sqlx::Error),

    /// Represents a failure to apply the embedded migrations.
    #[error("Migration Error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Represents a standard Input/Output error (e.g., binding to a network socket).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A catch-all for any other unexpected errors.
    #[error("An unexpected internal error occurred: {0}")]
    Internal(String),
}

/// A request-level failure, rendered as a status code and a `{ "message" }` body.
#[derive(Debug)]
pub struct HttpError {
    pub status: StatusCode,
    pub message: String,
}

impl HttpError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn internal() -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "An internal error occurred")
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "message": self.message }))).into_response()
    }
}

impl From<AccessError> for HttpError {
    fn from(err: AccessError) -> Self {
        let status = match err {
            AccessError::Unauthenticated => StatusCode::UNAUTHORIZED,
            AccessError::Forbidden => StatusCode::FORBIDDEN,
            AccessError::NotFound => StatusCode::NOT_FOUND,
        };
        Self::new(status, err.to_string())
    }
}

impl From<QuotaError> for HttpError {
    fn from(err: QuotaError) -> Self {
        Self::bad_request(err.to_string())
    }
}

impl From<ValidationError> for HttpError {
    fn from(err: ValidationError) -> Self {
        Self::bad_request(err.to_string())
    }
}

impl From<PortError> for HttpError {
    fn from(err: PortError) -> Self {
        match err {
            PortError::NotFound(msg) => Self::not_found(msg),
            PortError::Conflict(msg) => Self::new(StatusCode::CONFLICT, msg),
            PortError::Quota(quota) => quota.into(),
            PortError::Unauthorized => Self::unauthorized("Authentication required"),
            PortError::Unexpected(msg) => {
                error!("Unexpected port error: {}", msg);
                Self::internal()
            }
        }
    }
}

pub type HttpResult<T> = Result<T, HttpError>;
