// src/error.rs
// Typed failure taxonomy shared by every operation the core exposes.
// The HTTP mapping lives here so handlers stay thin.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("upstream provider unavailable")]
    UpstreamUnavailable,

    #[error("validation: {0}")]
    Validation(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("internal error")]
    Internal(#[from] anyhow::Error),
}

impl ChatError {
    fn kind(&self) -> &'static str {
        match self {
            ChatError::NotFound(_) => "not_found",
            ChatError::InvalidState(_) => "invalid_state",
            ChatError::Conflict(_) => "conflict",
            ChatError::UpstreamUnavailable => "upstream_unavailable",
            ChatError::Validation(_) => "validation_error",
            ChatError::Forbidden(_) => "forbidden",
            ChatError::Internal(_) => "internal",
        }
    }

    fn status_code(&self) -> StatusCode {
        match self {
            ChatError::NotFound(_) => StatusCode::NOT_FOUND,
            ChatError::InvalidState(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ChatError::Conflict(_) => StatusCode::CONFLICT,
            ChatError::UpstreamUnavailable => StatusCode::BAD_GATEWAY,
            ChatError::Validation(_) => StatusCode::BAD_REQUEST,
            ChatError::Forbidden(_) => StatusCode::FORBIDDEN,
            ChatError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<sqlx::Error> for ChatError {
    fn from(e: sqlx::Error) -> Self {
        ChatError::Internal(e.into())
    }
}

impl IntoResponse for ChatError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        if matches!(self, ChatError::Internal(_)) {
            tracing::error!("internal error: {:#}", self);
        }

        // Internal details never reach the client
        let message = match &self {
            ChatError::Internal(_) => "internal error".to_string(),
            other => other.to_string(),
        };

        let body = Json(json!({
            "error": self.kind(),
            "message": message,
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            ChatError::NotFound("session".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ChatError::Conflict("already completed".into()).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ChatError::InvalidState("terminal".into()).status_code(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            ChatError::UpstreamUnavailable.status_code(),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn test_internal_message_is_opaque() {
        let err = ChatError::Internal(anyhow::anyhow!("connection string leaked"));
        assert_eq!(err.kind(), "internal");
        // The Display impl for Internal never includes the inner error
        assert_eq!(err.to_string(), "internal error");
    }
}
