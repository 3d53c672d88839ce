//! API error types with structured JSON responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::core_state::CoreError;
use crate::pipeline::PipelineError;

/// Error response body. `detail` is what the web frontend reads.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub detail: String,
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub code: &'static str,
    pub message: String,
}

/// API-level errors with HTTP status mapping.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    #[error("Insufficient scores: {0}")]
    InsufficientScores(String),
    #[error("Rate limit exceeded")]
    RateLimited { retry_after: u64 },
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Invalid request: {0}")]
    BadRequest(String),
    #[error("Internal error: {0}")]
    Internal(String),
    #[error("Planning failed: {0}")]
    Planning(String),
    #[error("Upstream failure: {0}")]
    Upstream(String),
}

impl ApiError {
    pub fn unauthorized() -> Self {
        Self::Unauthorized("Could not validate credentials".into())
    }

    pub fn presentation_not_found() -> Self {
        Self::NotFound("Presentation not found".into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            ApiError::Unauthorized(detail) => {
                (StatusCode::UNAUTHORIZED, "AUTH_REQUIRED", detail.clone())
            }
            ApiError::InsufficientScores(detail) => {
                (StatusCode::PAYMENT_REQUIRED, "INSUFFICIENT_SCORES", detail.clone())
            }
            ApiError::RateLimited { retry_after } => (
                StatusCode::TOO_MANY_REQUESTS,
                "RATE_LIMITED",
                format!("Rate limit exceeded. Retry after {retry_after}s"),
            ),
            ApiError::NotFound(detail) => (StatusCode::NOT_FOUND, "NOT_FOUND", detail.clone()),
            ApiError::BadRequest(detail) => {
                (StatusCode::BAD_REQUEST, "BAD_REQUEST", detail.clone())
            }
            ApiError::Internal(detail) => {
                tracing::error!(detail, "API internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL",
                    "An internal error occurred".to_string(),
                )
            }
            ApiError::Planning(detail) => {
                tracing::warn!(detail, "Planning failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "PLAN_FAILED", detail.clone())
            }
            ApiError::Upstream(detail) => {
                tracing::warn!(detail, "AI service failure");
                (StatusCode::BAD_GATEWAY, "UPSTREAM", detail.clone())
            }
        };

        let body = ErrorBody {
            detail: message.clone(),
            error: ErrorDetail { code, message },
        };

        let mut response = (status, Json(body)).into_response();
        if let ApiError::RateLimited { retry_after } = &self {
            if let Ok(val) = axum::http::HeaderValue::from_str(&retry_after.to_string()) {
                response.headers_mut().insert("Retry-After", val);
            }
        }
        response
    }
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl From<rusqlite::Error> for ApiError {
    fn from(err: rusqlite::Error) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl From<crate::db::DatabaseError> for ApiError {
    fn from(err: crate::db::DatabaseError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::Database(_) | PipelineError::Io(_) | PipelineError::ImageSave(_) => {
                ApiError::Internal(err.to_string())
            }
            other => ApiError::Upstream(other.to_string()),
        }
    }
}
