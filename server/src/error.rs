//! Unified error handling for the server.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Application error type.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// A query failed; `context` names the endpoint's operation.
    #[error("{context}: {source}")]
    Database {
        context: &'static str,
        #[source]
        source: sqlx::Error,
    },

    #[error("Invalid request: {error}")]
    BadRequest {
        error: String,
        details: Option<String>,
    },

    #[error("Not found: {0}")]
    NotFound(String),
}

impl AppError {
    pub fn bad_request(error: impl Into<String>) -> Self {
        AppError::BadRequest {
            error: error.into(),
            details: None,
        }
    }
}

/// Attach an endpoint-level message to database errors.
pub trait Context<T> {
    fn context(self, context: &'static str) -> Result<T>;
}

impl<T> Context<T> for std::result::Result<T, sqlx::Error> {
    fn context(self, context: &'static str) -> Result<T> {
        self.map_err(|source| AppError::Database { context, source })
    }
}

/// Error response body.
#[derive(Serialize)]
struct ErrorResponse {
    success: bool,
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message, details) = match self {
            AppError::Database { context, source } => {
                tracing::error!(error = ?source, "{context}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    context.to_string(),
                    Some(source.to_string()),
                )
            }
            AppError::BadRequest { error, details } => (StatusCode::BAD_REQUEST, error, details),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg, None),
        };

        let body = Json(ErrorResponse {
            success: false,
            error: error_message,
            details,
        });

        (status, body).into_response()
    }
}

/// Result type alias for handlers.
pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn not_found_renders_failure_body() {
        let response = AppError::NotFound("Task not found".into()).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let body = body_json(response).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "Task not found");
        assert!(body.get("details").is_none());
    }

    #[tokio::test]
    async fn database_errors_carry_details() {
        let err: Result<()> = Err(sqlx::Error::RowNotFound).context("Failed to fetch tasks");
        let response = err.unwrap_err().into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = body_json(response).await;
        assert_eq!(body["error"], "Failed to fetch tasks");
        assert!(body["details"].as_str().unwrap().contains("no rows"));
    }
}
