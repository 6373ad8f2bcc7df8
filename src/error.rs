//! Error types for the OCR server

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::auth::TokenError;
use crate::retry::Transient;
use crate::upload::UploadError;

/// Application-wide result type
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Validation failed")]
    Validation(Vec<FieldError>),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Upload rejected: {0}")]
    Upload(#[from] UploadError),

    #[error("Token rejected: {0}")]
    Token(#[from] TokenError),

    #[error("S3 error: {0}")]
    Storage(#[from] StorageError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Storage-specific errors
#[derive(Error, Debug, Clone)]
pub enum StorageError {
    #[error("S3 connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Bucket not found: {0}")]
    BucketNotFound(String),

    #[error("Object not found: {0}")]
    ObjectNotFound(String),

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("S3 SDK error: {0}")]
    SdkError(String),
}

impl Transient for StorageError {
    fn is_transient(&self) -> bool {
        matches!(self, Self::ConnectionFailed(_) | Self::SdkError(_))
    }
}

/// A single rejected request field
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

impl FieldError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Error response body
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    errors: Option<Vec<FieldError>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let mut field_errors = None;

        let (status, error_type, message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found".to_string(), msg.clone()),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request".to_string(), msg.clone()),
            AppError::Validation(errors) => {
                field_errors = Some(errors.clone());
                (
                    StatusCode::BAD_REQUEST,
                    "validation_error".to_string(),
                    "Validation error".to_string(),
                )
            }
            AppError::Unauthorized(msg) => {
                (StatusCode::UNAUTHORIZED, "unauthorized".to_string(), msg.clone())
            }
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, "forbidden".to_string(), msg.clone()),
            AppError::Upload(e) => (e.status_code(), e.code().to_string(), e.to_string()),
            AppError::Token(e) => {
                tracing::debug!("Token rejected: {}", e);
                (
                    StatusCode::UNAUTHORIZED,
                    "unauthorized".to_string(),
                    "Invalid token".to_string(),
                )
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error".to_string(),
                    "An internal error occurred".to_string(),
                )
            }
            AppError::Storage(e) => {
                tracing::error!("Storage error: {}", e);
                match e {
                    StorageError::ObjectNotFound(key) => (
                        StatusCode::NOT_FOUND,
                        "not_found".to_string(),
                        format!("Object not found: {}", key),
                    ),
                    _ => (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "storage_error".to_string(),
                        "Error accessing image storage. Please try again.".to_string(),
                    ),
                }
            }
            AppError::Database(e) => {
                tracing::error!("Database error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "database_error".to_string(),
                    "Database error occurred. Please try again later.".to_string(),
                )
            }
        };

        let body = Json(ErrorResponse {
            error: error_type,
            message,
            errors: field_errors,
            details: if cfg!(debug_assertions) && status.is_server_error() {
                Some(self.to_string())
            } else {
                None
            },
        });

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (AppError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (AppError::Forbidden("x".into()), StatusCode::FORBIDDEN),
            (AppError::Unauthorized("x".into()), StatusCode::UNAUTHORIZED),
            (AppError::Validation(vec![]), StatusCode::BAD_REQUEST),
            (AppError::Token(TokenError::Expired), StatusCode::UNAUTHORIZED),
            (
                AppError::Storage(StorageError::SdkError("boom".into())),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (error, expected) in cases {
            assert_eq!(error.into_response().status(), expected);
        }
    }

    #[test]
    fn test_storage_error_transience() {
        assert!(StorageError::ConnectionFailed("reset".into()).is_transient());
        assert!(!StorageError::ObjectNotFound("k".into()).is_transient());
        assert!(!StorageError::AccessDenied("k".into()).is_transient());
    }
}
