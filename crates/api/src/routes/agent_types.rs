use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use grc_agent_runtime::NewAgentType;
use grc_common::{AgentType, AgentTypeId};
use tracing::instrument;
use uuid::Uuid;

use super::require_member;
use crate::context::RequestContext;
use crate::error::ApiResult;
use crate::server::AppState;
use crate::types::{ErrorResponse, UpdateSkillsRequest};

#[utoipa::path(
    get,
    path = "/agent-types",
    responses(
        (status = 200, description = "Agent types, default first", body = Vec<AgentType>),
        (status = 403, description = "Not a member", body = ErrorResponse),
    ),
    tag = "agent-types"
)]
#[instrument(skip(state))]
pub async fn list_agent_types(
    State(state): State<AppState>,
    ctx: RequestContext,
) -> ApiResult<Json<Vec<AgentType>>> {
    require_member(&state, &ctx).await?;
    state
        .platform
        .agents
        .ensure_default_agent(ctx.organization_id, Some(ctx.user_id))
        .await?;
    Ok(Json(state.platform.agents.list_agent_types(ctx.organization_id).await?))
}

#[utoipa::path(
    post,
    path = "/agent-types",
    request_body = NewAgentType,
    responses(
        (status = 201, description = "Agent type created", body = AgentType),
        (status = 400, description = "Empty name or unknown skill", body = ErrorResponse),
        (status = 403, description = "Not an owner or admin", body = ErrorResponse),
    ),
    tag = "agent-types"
)]
#[instrument(skip(state, request))]
pub async fn create_agent_type(
    State(state): State<AppState>,
    ctx: RequestContext,
    Json(request): Json<NewAgentType>,
) -> ApiResult<(StatusCode, Json<AgentType>)> {
    let agent_type = state
        .platform
        .agents
        .create_agent_type(ctx.organization_id, ctx.user_id, request)
        .await?;
    Ok((StatusCode::CREATED, Json(agent_type)))
}

/// Replace a custom type's skill list
#[utoipa::path(
    put,
    path = "/agent-types/{id}/skills",
    params(("id" = Uuid, Path, description = "Agent type id")),
    request_body = UpdateSkillsRequest,
    responses(
        (status = 200, description = "Updated agent type", body = AgentType),
        (status = 400, description = "Unknown skill", body = ErrorResponse),
        (status = 404, description = "Agent type not found", body = ErrorResponse),
        (status = 409, description = "Default type is read-only", body = ErrorResponse),
    ),
    tag = "agent-types"
)]
#[instrument(skip(state, request))]
pub async fn update_agent_type_skills(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateSkillsRequest>,
) -> ApiResult<Json<AgentType>> {
    let agent_type = state
        .platform
        .agents
        .update_agent_type_skills(ctx.organization_id, ctx.user_id, AgentTypeId(id), request.skills)
        .await?;
    Ok(Json(agent_type))
}

#[utoipa::path(
    delete,
    path = "/agent-types/{id}",
    params(("id" = Uuid, Path, description = "Agent type id")),
    responses(
        (status = 204, description = "Agent type deleted"),
        (status = 404, description = "Agent type not found", body = ErrorResponse),
        (status = 409, description = "Default type or still in use", body = ErrorResponse),
    ),
    tag = "agent-types"
)]
#[instrument(skip(state))]
pub async fn delete_agent_type(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    state
        .platform
        .agents
        .delete_agent_type(ctx.organization_id, ctx.user_id, AgentTypeId(id))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
