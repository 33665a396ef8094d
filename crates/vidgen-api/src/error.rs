//! API error types.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use vidgen_models::ParamsError;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unknown task type: {0}")]
    UnknownTaskType(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Task already finished: {0}")]
    AlreadyTerminal(String),

    #[error("Queue transport unavailable: {0}")]
    TransportUnavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Store error: {0}")]
    Store(#[from] vidgen_store::StoreError),

    #[error("Queue error: {0}")]
    Queue(#[from] vidgen_queue::QueueError),
}

impl ApiError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn already_terminal(msg: impl Into<String>) -> Self {
        Self::AlreadyTerminal(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) | ApiError::UnknownTaskType(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::AlreadyTerminal(_) => StatusCode::CONFLICT,
            ApiError::TransportUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) | ApiError::Queue(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Store(vidgen_store::StoreError::NotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            ApiError::Validation(_) => "validation",
            ApiError::UnknownTaskType(_) => "unknown_task_type",
            ApiError::NotFound(_) => "not_found",
            ApiError::AlreadyTerminal(_) => "already_terminal",
            ApiError::TransportUnavailable(_) => "transport_unavailable",
            ApiError::Internal(_) => "internal",
            ApiError::Store(vidgen_store::StoreError::NotFound(_)) => "not_found",
            ApiError::Store(_) => "store",
            ApiError::Queue(_) => "queue",
        }
    }
}

impl From<ParamsError> for ApiError {
    fn from(e: ParamsError) -> Self {
        match e {
            ParamsError::UnknownTaskType(ty) => ApiError::UnknownTaskType(ty),
            other => ApiError::Validation(other.to_string()),
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    detail: String,
    code: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // Don't expose internal error details in production
        let detail = match &self {
            ApiError::Internal(_) | ApiError::Store(_) | ApiError::Queue(_) => {
                if std::env::var("ENVIRONMENT").unwrap_or_default() == "production" {
                    "An internal error occurred".to_string()
                } else {
                    self.to_string()
                }
            }
            _ => self.to_string(),
        };

        let body = ErrorResponse {
            detail,
            code: self.code().to_string(),
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_follow_taxonomy() {
        assert_eq!(
            ApiError::validation("x").status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::UnknownTaskType("make_coffee".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(ApiError::not_found("x").status_code(), StatusCode::NOT_FOUND);
        assert_eq!(
            ApiError::already_terminal("x").status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError::TransportUnavailable("x".into()).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }
}
