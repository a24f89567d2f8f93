use axum::{
    http::{header::RETRY_AFTER, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::oracle::OracleError;

/// Application-level error type.
/// Implements `IntoResponse` so Axum handlers can return `Result<T, AppError>`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error(transparent)]
    Oracle(#[from] OracleError),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let mut retry_after: Option<u64> = None;

        let (status, code, message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
            AppError::Oracle(OracleError::RateLimited { retry_after_secs }) => {
                tracing::warn!("Oracle rate limited: retry_after={retry_after_secs:?}");
                retry_after = *retry_after_secs;
                (
                    StatusCode::TOO_MANY_REQUESTS,
                    "ORACLE_RATE_LIMITED",
                    "Rate limit exceeded. Try again in a few seconds.".to_string(),
                )
            }
            AppError::Oracle(e @ OracleError::PromptTooLarge { .. }) => (
                StatusCode::BAD_REQUEST,
                "ORACLE_PROMPT_TOO_LARGE",
                e.to_string(),
            ),
            AppError::Oracle(e @ OracleError::Malformed(_)) => {
                tracing::error!("Oracle error: {e}");
                (
                    StatusCode::BAD_GATEWAY,
                    "ORACLE_MALFORMED",
                    "The rewriting service returned an unreadable response".to_string(),
                )
            }
            AppError::Oracle(e @ OracleError::Unavailable { .. }) => {
                tracing::error!("Oracle error: {e}");
                (
                    StatusCode::BAD_GATEWAY,
                    "ORACLE_UNAVAILABLE",
                    e.to_string(),
                )
            }
            AppError::Internal(e) => {
                tracing::error!("Internal error: {e:?}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal server error occurred".to_string(),
                )
            }
        };

        let mut error = json!({
            "code": code,
            "message": message
        });
        if let Some(secs) = retry_after {
            error["retry_after"] = json!(secs);
        }

        let mut response = (status, Json(json!({ "error": error }))).into_response();
        if let Some(secs) = retry_after {
            if let Ok(value) = HeaderValue::from_str(&secs.to_string()) {
                response.headers_mut().insert(RETRY_AFTER, value);
            }
        }
        response
    }
}
