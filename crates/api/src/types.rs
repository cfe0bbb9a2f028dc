//! Request and response bodies of the HTTP API

use chrono::{DateTime, Utc};
use grc_agent_runtime::skills::Skill;
use grc_common::{AgentStatus, AgentTask, RunId, TaskStatus};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

/// Health check response
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// Health status
    pub status: String,

    /// Optional additional information
    pub message: Option<String>,

    /// Timestamp of health check
    pub timestamp: DateTime<Utc>,
}

/// Error response
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    /// Error message
    pub error: String,

    /// Machine-readable error code
    pub code: Option<String>,

    /// Timestamp of error
    pub timestamp: DateTime<Utc>,
}

/// One catalog entry
#[derive(Debug, Serialize, ToSchema)]
pub struct SkillResponse {
    pub id: String,
    pub name: String,
    pub description: String,
    /// research, analysis, write or output
    pub category: String,
    pub requires_approval: bool,
}

impl From<&Skill> for SkillResponse {
    fn from(skill: &Skill) -> Self {
        Self {
            id: skill.id.to_string(),
            name: skill.name.to_string(),
            description: skill.description.to_string(),
            category: skill.category.to_string(),
            requires_approval: skill.requires_approval,
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateAgentStatusRequest {
    /// `active` to resume, `suspended` to pause
    pub status: AgentStatus,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateSkillsRequest {
    pub skills: Vec<String>,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct TaskListQuery {
    /// Only tasks in this state
    pub status: Option<TaskStatus>,
    /// Only tasks produced by this run
    #[param(value_type = Option<String>)]
    pub run_id: Option<RunId>,
    /// At most this many tasks, newest first
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TaskListResponse {
    pub tasks: Vec<AgentTask>,
    pub count: usize,
}
