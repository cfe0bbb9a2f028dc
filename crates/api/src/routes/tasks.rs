use axum::{
    extract::{Path, Query, State},
    Json,
};
use grc_agent_runtime::ApprovalOutcome;
use grc_common::{AgentTask, TaskFilter, TaskId};
use tracing::instrument;
use uuid::Uuid;

use super::require_member;
use crate::context::RequestContext;
use crate::error::ApiResult;
use crate::server::AppState;
use crate::types::{ErrorResponse, TaskListQuery, TaskListResponse};

pub const DEFAULT_TASK_LIMIT: usize = 50;
pub const MAX_TASK_LIMIT: usize = 200;

/// List agent tasks, newest first
#[utoipa::path(
    get,
    path = "/tasks",
    params(TaskListQuery),
    responses(
        (status = 200, description = "Matching tasks", body = TaskListResponse),
        (status = 403, description = "Not a member", body = ErrorResponse),
    ),
    tag = "tasks"
)]
#[instrument(skip(state))]
pub async fn list_tasks(
    State(state): State<AppState>,
    ctx: RequestContext,
    Query(query): Query<TaskListQuery>,
) -> ApiResult<Json<TaskListResponse>> {
    require_member(&state, &ctx).await?;

    let filter = TaskFilter {
        status: query.status,
        run_id: query.run_id,
        agent_id: None,
        limit: Some(query.limit.unwrap_or(DEFAULT_TASK_LIMIT).clamp(1, MAX_TASK_LIMIT)),
    };
    let tasks = state.platform.store.list_tasks(ctx.organization_id, &filter).await?;
    let count = tasks.len();
    Ok(Json(TaskListResponse { tasks, count }))
}

/// Approve a pending write task and execute it
#[utoipa::path(
    post,
    path = "/tasks/{id}/approve",
    params(("id" = Uuid, Path, description = "Task id")),
    responses(
        (status = 200, description = "Write executed", body = ApprovalOutcome),
        (status = 403, description = "Not an owner or admin", body = ErrorResponse),
        (status = 404, description = "Task not found", body = ErrorResponse),
        (status = 409, description = "Task is not pending approval", body = ErrorResponse),
        (status = 422, description = "Approval recorded but the write failed", body = ErrorResponse),
    ),
    tag = "tasks"
)]
#[instrument(skip(state))]
pub async fn approve_task(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ApprovalOutcome>> {
    let outcome = state
        .platform
        .approvals
        .approve(TaskId(id), ctx.user_id, ctx.organization_id)
        .await?;
    Ok(Json(outcome))
}

/// Decline a pending write task
#[utoipa::path(
    post,
    path = "/tasks/{id}/decline",
    params(("id" = Uuid, Path, description = "Task id")),
    responses(
        (status = 200, description = "Task declined", body = AgentTask),
        (status = 403, description = "Not an owner or admin", body = ErrorResponse),
        (status = 404, description = "Task not found", body = ErrorResponse),
        (status = 409, description = "Task is not pending approval", body = ErrorResponse),
    ),
    tag = "tasks"
)]
#[instrument(skip(state))]
pub async fn decline_task(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<AgentTask>> {
    let task = state
        .platform
        .approvals
        .decline(TaskId(id), ctx.user_id, ctx.organization_id)
        .await?;
    Ok(Json(task))
}
