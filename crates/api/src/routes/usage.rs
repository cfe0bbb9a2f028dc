use axum::{extract::State, Json};
use chrono::Utc;
use grc_agent_runtime::UsageStatus;
use tracing::instrument;

use super::require_member;
use crate::context::RequestContext;
use crate::error::ApiResult;
use crate::server::AppState;
use crate::types::ErrorResponse;

/// Whether the caller's organization may trigger another manual run
#[utoipa::path(
    get,
    path = "/usage",
    responses(
        (status = 200, description = "Current usage status", body = UsageStatus),
        (status = 401, description = "Missing identity headers", body = ErrorResponse),
        (status = 403, description = "Not a member", body = ErrorResponse),
    ),
    tag = "usage"
)]
#[instrument(skip(state))]
pub async fn get_usage(State(state): State<AppState>, ctx: RequestContext) -> ApiResult<Json<UsageStatus>> {
    require_member(&state, &ctx).await?;
    let status = state.platform.usage.check_usage(ctx.organization_id, Utc::now()).await?;
    Ok(Json(status))
}
