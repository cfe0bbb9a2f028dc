use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use grc_agent_runtime::{ManualRunResult, NewAgent};
use grc_common::{Agent, AgentId};
use tracing::{info, instrument};
use uuid::Uuid;

use super::require_member;
use crate::context::RequestContext;
use crate::error::ApiResult;
use crate::server::AppState;
use crate::types::{ErrorResponse, UpdateAgentStatusRequest};

/// List the organization's agents
///
/// The default agent type and the organization's first agent are provisioned
/// on first access.
#[utoipa::path(
    get,
    path = "/agents",
    responses(
        (status = 200, description = "Non-deleted agents", body = Vec<Agent>),
        (status = 401, description = "Missing identity headers", body = ErrorResponse),
        (status = 403, description = "Not a member", body = ErrorResponse),
    ),
    tag = "agents"
)]
#[instrument(skip(state))]
pub async fn list_agents(State(state): State<AppState>, ctx: RequestContext) -> ApiResult<Json<Vec<Agent>>> {
    require_member(&state, &ctx).await?;
    state
        .platform
        .agents
        .ensure_default_agent(ctx.organization_id, Some(ctx.user_id))
        .await?;
    let agents = state.platform.agents.list_agents(ctx.organization_id).await?;
    Ok(Json(agents))
}

#[utoipa::path(
    post,
    path = "/agents",
    request_body = NewAgent,
    responses(
        (status = 201, description = "Agent created", body = Agent),
        (status = 400, description = "Invalid request", body = ErrorResponse),
        (status = 403, description = "Not an owner or admin, or plan required", body = ErrorResponse),
        (status = 404, description = "Agent type not found", body = ErrorResponse),
    ),
    tag = "agents"
)]
#[instrument(skip(state, request))]
pub async fn create_agent(
    State(state): State<AppState>,
    ctx: RequestContext,
    Json(request): Json<NewAgent>,
) -> ApiResult<(StatusCode, Json<Agent>)> {
    let agent = state
        .platform
        .agents
        .create_agent(ctx.organization_id, ctx.user_id, request)
        .await?;
    info!("Created agent {} ({})", agent.name, agent.id);
    Ok((StatusCode::CREATED, Json(agent)))
}

/// Suspend or resume an agent
#[utoipa::path(
    patch,
    path = "/agents/{id}/status",
    params(("id" = Uuid, Path, description = "Agent id")),
    request_body = UpdateAgentStatusRequest,
    responses(
        (status = 200, description = "Updated agent", body = Agent),
        (status = 400, description = "Invalid status", body = ErrorResponse),
        (status = 404, description = "Agent not found", body = ErrorResponse),
        (status = 409, description = "Agent is deleted", body = ErrorResponse),
    ),
    tag = "agents"
)]
#[instrument(skip(state, request))]
pub async fn update_agent_status(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateAgentStatusRequest>,
) -> ApiResult<Json<Agent>> {
    let agent = state
        .platform
        .agents
        .update_agent_status(ctx.organization_id, ctx.user_id, AgentId(id), request.status)
        .await?;
    Ok(Json(agent))
}

/// Soft-delete an agent
#[utoipa::path(
    delete,
    path = "/agents/{id}",
    params(("id" = Uuid, Path, description = "Agent id")),
    responses(
        (status = 204, description = "Agent deleted"),
        (status = 404, description = "Agent not found", body = ErrorResponse),
    ),
    tag = "agents"
)]
#[instrument(skip(state))]
pub async fn delete_agent(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    state
        .platform
        .agents
        .delete_agent(ctx.organization_id, ctx.user_id, AgentId(id))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Trigger a manual run
///
/// Runs synchronously and returns the run summary with the refreshed usage
/// status. Only successful runs count against the organization's usage.
#[utoipa::path(
    post,
    path = "/agents/{id}/run",
    params(("id" = Uuid, Path, description = "Agent id")),
    responses(
        (status = 200, description = "Run finished", body = ManualRunResult),
        (status = 402, description = "Usage limit reached", body = ErrorResponse),
        (status = 403, description = "Viewers cannot run agents", body = ErrorResponse),
        (status = 404, description = "Agent not found", body = ErrorResponse),
        (status = 409, description = "Agent is not active", body = ErrorResponse),
    ),
    tag = "agents"
)]
#[instrument(skip(state))]
pub async fn run_agent(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ManualRunResult>> {
    let result = state
        .platform
        .runs
        .trigger_manual_run(AgentId(id), ctx.organization_id, ctx.user_id)
        .await?;
    Ok(Json(result))
}
