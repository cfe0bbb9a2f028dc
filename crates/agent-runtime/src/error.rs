use grc_common::{GrcError, TaskStatus};
use thiserror::Error;

/// Failures of run, approval and management operations
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RuntimeError {
    #[error("Agent not found: {0}")]
    AgentNotFound(String),

    #[error("Agent type not found: {0}")]
    AgentTypeNotFound(String),

    #[error("Agent type {0} has no skills")]
    EmptySkillSet(String),

    #[error("Agent {agent_id} is {status} and cannot run")]
    AgentNotRunnable { agent_id: String, status: String },

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error("Invalid state transition: {from} -> {to}")]
    InvalidStateTransition { from: TaskStatus, to: TaskStatus },

    #[error("Execution failed - {task_id}: {reason}")]
    ExecutionFailed { task_id: String, reason: String },

    #[error("Usage limit reached: {reason}")]
    UsageDenied { reason: String },

    #[error("Protected resource: {0}")]
    ProtectedResource(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Store error: {0}")]
    Store(#[from] GrcError),
}

impl RuntimeError {
    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn execution_failed(task_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ExecutionFailed {
            task_id: task_id.into(),
            reason: reason.into(),
        }
    }

    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Llm(_) | Self::Store(GrcError::Database(_))
        )
    }

    /// Errors caused by the request rather than the system
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::AgentNotFound(_)
                | Self::AgentTypeNotFound(_)
                | Self::AgentNotRunnable { .. }
                | Self::Forbidden(_)
                | Self::TaskNotFound(_)
                | Self::InvalidStateTransition { .. }
                | Self::UsageDenied { .. }
                | Self::ProtectedResource(_)
                | Self::Validation(_)
        )
    }
}

pub type RuntimeResult<T> = std::result::Result<T, RuntimeError>;
