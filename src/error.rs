// src/error.rs

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

/// Global Application Error Enum.
/// Every service operation fails with exactly one of these; handlers map them to HTTP responses.
#[derive(Debug, Error)]
pub enum AppError {
    // 404 Not Found
    #[error("{0}")]
    NotFound(String),

    // 409 Conflict: answer for the wrong question, attempt already live, ...
    #[error("{0}")]
    InvalidState(String),

    // 409 Conflict
    #[error("{0}")]
    AlreadyCompleted(String),

    // 422 Unprocessable Entity
    #[error("{0}")]
    Validation(String),

    // 403 Forbidden
    #[error("{0}")]
    Forbidden(String),

    // 409 Conflict (e.g., duplicate username)
    #[error("{0}")]
    Conflict(String),

    // 500 Internal Server Error
    #[error("persistence failure: {0}")]
    Persistence(String),
}

pub type AppResult<T> = Result<T, AppError>;

/// Converts the error into a JSON response with appropriate HTTP status code.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::Persistence(msg) => {
                tracing::error!("Persistence error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal Server Error".to_string(),
                )
            }
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::InvalidState(msg) => (StatusCode::CONFLICT, msg),
            AppError::AlreadyCompleted(msg) => (StatusCode::CONFLICT, msg),
            AppError::Validation(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg),
        };
        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

/// Allows using `?` operator on database queries.
/// Unique violations surface as `Conflict`, everything else as `Persistence`.
impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            if db_err.is_unique_violation() {
                return AppError::Conflict(db_err.message().to_string());
            }
        }
        AppError::Persistence(err.to_string())
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::Validation(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Persistence(err.to_string())
    }
}
