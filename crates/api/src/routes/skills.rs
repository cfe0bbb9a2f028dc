use axum::Json;
use grc_agent_runtime::SKILLS;

use crate::types::SkillResponse;

/// List the skill catalog
///
/// Write skills (`requires_approval = true`) are never executed by an agent
/// directly; they produce tasks awaiting human approval.
#[utoipa::path(
    get,
    path = "/skills",
    responses(
        (status = 200, description = "Skill catalog", body = Vec<SkillResponse>),
    ),
    tag = "discovery"
)]
pub async fn list_skills() -> Json<Vec<SkillResponse>> {
    Json(SKILLS.iter().map(SkillResponse::from).collect())
}
