//! Route handlers grouped by resource

pub mod agent_types;
pub mod agents;
pub mod internal;
pub mod skills;
pub mod tasks;
pub mod usage;

use grc_common::MemberRole;

use crate::context::RequestContext;
use crate::error::{ApiError, ApiResult};
use crate::server::AppState;

/// Reads are open to every member of the organization, viewers included
pub(crate) async fn require_member(state: &AppState, ctx: &RequestContext) -> ApiResult<MemberRole> {
    state
        .platform
        .store
        .member_role(ctx.organization_id, ctx.user_id)
        .await?
        .ok_or_else(|| ApiError::forbidden("not a member of this organization"))
}
