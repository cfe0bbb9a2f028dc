//! HTTP error mapping for route handlers.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use grc_agent_runtime::RuntimeError;
use grc_common::GrcError;
use tracing::{error, warn};

use crate::types::ErrorResponse;

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
}

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "VALIDATION_ERROR", message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "UNAUTHENTICATED", message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, "FORBIDDEN", message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", message)
    }
}

impl From<RuntimeError> for ApiError {
    fn from(err: RuntimeError) -> Self {
        let message = err.to_string();
        match err {
            RuntimeError::Validation(_) => Self::bad_request(message),
            RuntimeError::Forbidden(_) => Self::forbidden(message),
            RuntimeError::UsageDenied { reason } => {
                Self::new(StatusCode::PAYMENT_REQUIRED, "USAGE_LIMIT_REACHED", reason)
            }
            RuntimeError::AgentNotFound(_) => Self::new(StatusCode::NOT_FOUND, "AGENT_NOT_FOUND", message),
            RuntimeError::AgentTypeNotFound(_) => {
                Self::new(StatusCode::NOT_FOUND, "AGENT_TYPE_NOT_FOUND", message)
            }
            RuntimeError::TaskNotFound(_) => Self::new(StatusCode::NOT_FOUND, "TASK_NOT_FOUND", message),
            RuntimeError::InvalidStateTransition { .. } => {
                Self::new(StatusCode::CONFLICT, "INVALID_STATE_TRANSITION", message)
            }
            RuntimeError::AgentNotRunnable { .. } => Self::new(StatusCode::CONFLICT, "AGENT_NOT_RUNNABLE", message),
            RuntimeError::EmptySkillSet(_) => Self::new(StatusCode::CONFLICT, "EMPTY_SKILL_SET", message),
            RuntimeError::ProtectedResource(_) => {
                Self::new(StatusCode::CONFLICT, "PROTECTED_RESOURCE", message)
            }
            RuntimeError::ExecutionFailed { .. } => {
                Self::new(StatusCode::UNPROCESSABLE_ENTITY, "EXECUTION_FAILED", message)
            }
            RuntimeError::Store(inner) => inner.into(),
            _ => Self::internal(message),
        }
    }
}

impl From<GrcError> for ApiError {
    fn from(err: GrcError) -> Self {
        match err {
            GrcError::NotFound { .. } => Self::new(StatusCode::NOT_FOUND, "NOT_FOUND", err.to_string()),
            GrcError::Conflict(_) => Self::new(StatusCode::CONFLICT, "CONFLICT", err.to_string()),
            GrcError::InvalidValue { .. } | GrcError::ConfigValidation { .. } => Self::bad_request(err.to_string()),
            other => Self::internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            error!(code = self.code, "Request failed: {}", self.message);
        } else {
            warn!(code = self.code, status = %self.status, "Request rejected: {}", self.message);
        }

        let body = ErrorResponse {
            error: self.message,
            code: Some(self.code.to_string()),
            timestamp: Utc::now(),
        };
        (self.status, Json(body)).into_response()
    }
}
