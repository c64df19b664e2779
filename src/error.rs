use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Unsafe SQL: {0}")]
    UnsafeSql(String),

    #[error("Query timed out after {0:?}")]
    QueryTimeout(Duration),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("LLM unavailable: {0}")]
    LlmUnavailable(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, AppError>;

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::UnsafeSql(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::QueryTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            AppError::Llm(_) | AppError::LlmUnavailable(_) => StatusCode::BAD_GATEWAY,
            AppError::Config(_)
            | AppError::Database(_)
            | AppError::Json(_)
            | AppError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to return to API clients. Internal failures are masked.
    pub fn public_message(&self) -> String {
        match self.status() {
            StatusCode::INTERNAL_SERVER_ERROR => "Internal server error".to_string(),
            _ => self.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        } else {
            tracing::debug!(error = %self, "request rejected");
        }
        let body = serde_json::json!({ "error": self.public_message() });
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(AppError::Validation("x".into()).status(), StatusCode::BAD_REQUEST);
        assert_eq!(AppError::Conflict("x".into()).status(), StatusCode::CONFLICT);
        assert_eq!(AppError::UnsafeSql("x".into()).status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(
            AppError::QueryTimeout(Duration::from_secs(1)).status(),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(AppError::Llm("x".into()).status(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn test_internal_errors_are_masked() {
        let err = AppError::Config("DATABASE_URL has password hunter2".into());
        assert_eq!(err.public_message(), "Internal server error");

        let err = AppError::NotFound("Team 42".into());
        assert_eq!(err.public_message(), "Not found: Team 42");
    }
}
