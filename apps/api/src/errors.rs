use axum::{
    extract::rejection::{JsonRejection, PathRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};
use thiserror::Error;

use crate::db::is_unique_violation;
use crate::demo::rate_limit::DemoLimitError;

/// Application-level error type.
/// Implements `IntoResponse` so Axum handlers can return `Result<T, AppError>`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Session ID required for demo usage")]
    SessionRequired,

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Uploaded file is too large")]
    PayloadTooLarge,

    #[error("Unsupported file type: {0}")]
    UnsupportedMedia(String),

    #[error(transparent)]
    DemoLimit(#[from] DemoLimitError),

    #[error("Daily analysis limit of {limit} reached")]
    UsageLimit { limit: i64 },

    #[error("AI provider error ({code}): {message}")]
    Ai {
        status: StatusCode,
        code: &'static str,
        message: String,
    },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, body(msg, "NOT_FOUND", None)),
            AppError::Validation(msg) => (
                StatusCode::BAD_REQUEST,
                body(msg, "VALIDATION_ERROR", None),
            ),
            AppError::SessionRequired => (
                StatusCode::BAD_REQUEST,
                body(
                    "Session ID required for demo usage",
                    "SESSION_REQUIRED",
                    Some("Send an x-session-id header or sign in."),
                ),
            ),
            AppError::Unauthorized(msg) => {
                (StatusCode::UNAUTHORIZED, body(msg, "UNAUTHORIZED", None))
            }
            AppError::Conflict(msg) => (StatusCode::CONFLICT, body(msg, "CONFLICT", None)),
            AppError::PayloadTooLarge => (
                StatusCode::PAYLOAD_TOO_LARGE,
                body(
                    "File is too large",
                    "PAYLOAD_TOO_LARGE",
                    Some("Uploads are limited to 10MB."),
                ),
            ),
            AppError::UnsupportedMedia(msg) => (
                StatusCode::UNSUPPORTED_MEDIA_TYPE,
                body(msg, "UNSUPPORTED_FILE_TYPE", None),
            ),
            AppError::DemoLimit(e) => {
                let mut value = body(&e.to_string(), e.code(), Some(e.hint()));
                match e {
                    DemoLimitError::CooldownActive { wait_secs }
                    | DemoLimitError::TooSoon { wait_secs } => {
                        value["waitTime"] = json!(wait_secs);
                    }
                    DemoLimitError::SessionLimitExceeded { limit }
                    | DemoLimitError::IpLimitExceeded { limit } => {
                        value["limit"] = json!(limit);
                    }
                }
                (StatusCode::TOO_MANY_REQUESTS, value)
            }
            AppError::UsageLimit { limit } => {
                let mut value = body(
                    "Daily analysis limit reached",
                    "USAGE_LIMIT_EXCEEDED",
                    Some("Upgrade to Pro for unlimited analyses."),
                );
                value["limit"] = json!(limit);
                (StatusCode::TOO_MANY_REQUESTS, value)
            }
            AppError::Ai {
                status,
                code,
                message,
            } => {
                tracing::error!("AI provider error [{code}]: {message}");
                (*status, body(message, code, None))
            }
            AppError::Database(e) if is_unique_violation(e) => (
                StatusCode::CONFLICT,
                body("This record already exists", "CONFLICT", None),
            ),
            AppError::Database(e) => {
                tracing::error!("Database error: {e}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    body("A database error occurred", "DATABASE_ERROR", None),
                )
            }
            AppError::Internal(e) => {
                tracing::error!("Internal error: {e:?}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    body("Internal server error", "INTERNAL_ERROR", None),
                )
            }
        };

        (status, Json(body)).into_response()
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::Validation(format!("Invalid input: {}", rejection.body_text()))
    }
}

/// A path segment that fails to parse (e.g. a malformed id) names no resource.
impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        tracing::debug!("Rejected path parameters: {}", rejection.body_text());
        AppError::NotFound("Resource not found".to_string())
    }
}

fn body(error: &str, code: &str, message: Option<&str>) -> Value {
    json!({
        "error": error,
        "code": code,
        "message": message.unwrap_or(error),
    })
}
