//! Error handling module
//!
//! Centralized error types and HTTP response conversion.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

/// Application-wide Result type
pub type AppResult<T> = Result<T, AppError>;

/// Application error types
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    // Client errors (4xx)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Field '{0}' cannot be updated after creation")]
    ImmutableField(&'static str),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Company not found: {0}")]
    CompanyNotFound(String),

    #[error("Transaction not found: {0}")]
    TransactionNotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Version conflict: concurrent modification detected")]
    VersionConflict,

    // Domain errors
    #[error(transparent)]
    Domain(#[from] crate::domain::DomainError),

    // Server errors (5xx)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub error_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_code, details) = match &self {
            // 400 Bad Request
            AppError::InvalidRequest(msg) => {
                (StatusCode::BAD_REQUEST, "invalid_request", Some(msg.clone()))
            }
            AppError::ImmutableField(field) => (
                StatusCode::BAD_REQUEST,
                "immutable_field",
                Some(field.to_string()),
            ),

            // 401 Unauthorized
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized", None),

            // 404 Not Found
            AppError::CompanyNotFound(id) => {
                (StatusCode::NOT_FOUND, "company_not_found", Some(id.clone()))
            }
            AppError::TransactionNotFound(id) => (
                StatusCode::NOT_FOUND,
                "transaction_not_found",
                Some(id.clone()),
            ),

            // 409 Conflict
            AppError::Conflict(msg) => (StatusCode::CONFLICT, "conflict", Some(msg.clone())),
            AppError::VersionConflict => (StatusCode::CONFLICT, "version_conflict", None),

            // Domain errors - map to appropriate HTTP status
            AppError::Domain(ref domain_err) => {
                use crate::domain::DomainError;
                match domain_err {
                    DomainError::InsufficientFunds { .. } => (
                        StatusCode::BAD_REQUEST,
                        "insufficient_funds",
                        Some(domain_err.to_string()),
                    ),
                    DomainError::InvalidAmount(msg) => {
                        (StatusCode::BAD_REQUEST, "invalid_amount", Some(msg.clone()))
                    }
                    DomainError::InvalidType(value) => {
                        (StatusCode::BAD_REQUEST, "invalid_type", Some(value.clone()))
                    }
                }
            }

            // Store constraint violations surface as 409, everything else 500
            AppError::Database(e) => {
                if e.as_database_error()
                    .is_some_and(|db| db.is_unique_violation())
                {
                    (
                        StatusCode::CONFLICT,
                        "conflict",
                        Some("a record with this value already exists".to_string()),
                    )
                } else {
                    tracing::error!("Database error: {:?}", e);
                    (StatusCode::INTERNAL_SERVER_ERROR, "database_error", None)
                }
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", None)
            }
            AppError::Config(e) => {
                tracing::error!("Config error: {:?}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "config_error", None)
            }
        };

        let body = ErrorResponse {
            error: self.to_string(),
            error_code: error_code.to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}
