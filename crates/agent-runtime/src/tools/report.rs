use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use grc_common::OrganizationId;
use serde_json::{json, Value};

use super::SkillExecutor;
use crate::skills::DRAFT_REPORT;

/// `draft_report`: shapes the model's findings into a report document
#[derive(Debug, Clone, Copy)]
pub struct DraftReportSkill;

#[async_trait]
impl SkillExecutor for DraftReportSkill {
    fn skill_id(&self) -> &'static str {
        DRAFT_REPORT
    }

    async fn execute(&self, input: Value, _organization_id: OrganizationId) -> Result<Value> {
        let field = |name: &str| input.get(name).cloned().unwrap_or(Value::Null);

        Ok(json!({
            "report_type": field("report_type"),
            "title": field("title"),
            "summary": field("summary"),
            "sections": input.get("sections").cloned().unwrap_or_else(|| json!([])),
            "generated_at": Utc::now(),
        }))
    }
}
