use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("no authorisation token provided")]
    NoToken,

    #[error("invalid authorisation token or rate limit exceeded")]
    InvalidOrExhausted,

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, msg) = match &self {
            // Fixed wire messages — operator tooling matches on these.
            AppError::NoToken => (
                StatusCode::FORBIDDEN,
                "No authorisation token provided!".to_string(),
            ),
            AppError::InvalidOrExhausted => (
                StatusCode::FORBIDDEN,
                "Invalid authorisation token provided or API rate limit exceeded!".to_string(),
            ),
            AppError::Database(e) => {
                tracing::error!("database error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal server error".to_string(),
                )
            }
            AppError::Internal(e) => {
                tracing::error!("internal error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal server error".to_string(),
                )
            }
        };

        let body = Json(json!({ "error_detail": msg }));
        (status, body).into_response()
    }
}
