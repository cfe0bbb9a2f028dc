use anyhow::{Context, Result};
use async_trait::async_trait;
use grc_common::{find_framework, Framework, OrganizationId, OrganizationSettings, RequirementStatus, FRAMEWORKS};
use grc_storage::GrcStore;
use serde_json::{json, Value};
use std::fmt;
use std::sync::Arc;
use tracing::instrument;

use super::SkillExecutor;
use crate::skills::{COMPLIANCE_CHECK, RISK_ANALYSIS};

pub const RISK_SAMPLE_SIZE: usize = 50;
pub const HIGH_SEVERITY_SCORE: i32 = 15;
pub const TOP_RISK_COUNT: usize = 5;
pub const MAX_GAPS: usize = 10;

const OPEN_STATUSES: [&str; 5] = ["identified", "assessed", "open", "in_progress", "treating"];

/// `risk_analysis`: register statistics over the most recent risks
#[derive(Clone)]
pub struct RiskAnalysisSkill {
    store: Arc<dyn GrcStore>,
}

impl RiskAnalysisSkill {
    pub fn new(store: Arc<dyn GrcStore>) -> Self {
        Self { store }
    }
}

impl fmt::Debug for RiskAnalysisSkill {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RiskAnalysisSkill").finish_non_exhaustive()
    }
}

#[async_trait]
impl SkillExecutor for RiskAnalysisSkill {
    fn skill_id(&self) -> &'static str {
        RISK_ANALYSIS
    }

    #[instrument(skip(self, input))]
    async fn execute(&self, input: Value, organization_id: OrganizationId) -> Result<Value> {
        let risks = self
            .store
            .list_recent_risks(organization_id, RISK_SAMPLE_SIZE)
            .await
            .context("Failed to load risks")?;

        let mut scored: Vec<_> = risks
            .iter()
            .map(|r| (r.likelihood * r.impact, r))
            .collect();

        let total = scored.len();
        let high_severity_count = scored
            .iter()
            .filter(|(score, _)| *score >= HIGH_SEVERITY_SCORE)
            .count();
        let open_count = risks
            .iter()
            .filter(|r| OPEN_STATUSES.contains(&r.status.to_lowercase().as_str()))
            .count();
        let average = if total == 0 {
            0.0
        } else {
            let sum: i32 = scored.iter().map(|(score, _)| score).sum();
            (sum as f64 / total as f64 * 10.0).round() / 10.0
        };

        // Stable sort keeps recency order among equal scores
        scored.sort_by(|a, b| b.0.cmp(&a.0));
        let top_risks: Vec<Value> = scored
            .iter()
            .take(TOP_RISK_COUNT)
            .map(|(score, r)| {
                json!({
                    "risk_id": r.risk_id,
                    "title": r.title,
                    "score": score,
                    "likelihood": r.likelihood,
                    "impact": r.impact,
                    "status": r.status,
                    "category": r.category,
                })
            })
            .collect();

        let mut output = json!({
            "total_risks": total,
            "high_severity_count": high_severity_count,
            "open_count": open_count,
            "average_inherent_score": average,
            "top_risks": top_risks,
        });
        if let Some(focus) = input.get("focus").and_then(Value::as_str) {
            output["focus"] = json!(focus);
        }
        Ok(output)
    }
}

/// `compliance_check`: requirement coverage per framework
#[derive(Clone)]
pub struct ComplianceCheckSkill {
    store: Arc<dyn GrcStore>,
}

impl ComplianceCheckSkill {
    pub fn new(store: Arc<dyn GrcStore>) -> Self {
        Self { store }
    }
}

impl fmt::Debug for ComplianceCheckSkill {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComplianceCheckSkill").finish_non_exhaustive()
    }
}

/// Coverage summary for one framework
pub fn framework_coverage(framework: &Framework, settings: &OrganizationSettings) -> Value {
    let mut implemented = 0usize;
    let mut in_progress = 0usize;
    let mut not_started = 0usize;
    let mut gaps = Vec::new();

    for requirement in framework.requirements {
        let status = settings.requirement_status(framework.code, requirement.code);
        match status {
            RequirementStatus::Implemented => implemented += 1,
            RequirementStatus::InProgress => in_progress += 1,
            RequirementStatus::NotStarted => not_started += 1,
            RequirementStatus::NotApplicable | RequirementStatus::Other(_) => {}
        }
        if status != RequirementStatus::Implemented {
            gaps.push(requirement.code);
        }
    }

    let total = framework.requirements.len();
    let percentage = if total == 0 {
        0
    } else {
        (implemented as f64 / total as f64 * 100.0).round() as u64
    };
    gaps.truncate(MAX_GAPS);

    json!({
        "framework": framework.code,
        "name": framework.name,
        "total": total,
        "implemented": implemented,
        "in_progress": in_progress,
        "not_started": not_started,
        "percentage": percentage,
        "gaps": gaps,
    })
}

#[async_trait]
impl SkillExecutor for ComplianceCheckSkill {
    fn skill_id(&self) -> &'static str {
        COMPLIANCE_CHECK
    }

    #[instrument(skip(self, input))]
    async fn execute(&self, input: Value, organization_id: OrganizationId) -> Result<Value> {
        let settings = self
            .store
            .get_settings(organization_id)
            .await
            .context("Failed to load organization settings")?;

        let frameworks: Vec<&Framework> = match input.get("framework").and_then(Value::as_str) {
            Some(code) => vec![find_framework(code)
                .with_context(|| format!("Unknown framework '{}'", code))?],
            None if settings.active_frameworks.is_empty() => FRAMEWORKS.iter().collect(),
            None => settings
                .active_frameworks
                .iter()
                .filter_map(|code| find_framework(code))
                .collect(),
        };

        let results: Vec<Value> = frameworks
            .iter()
            .map(|framework| framework_coverage(framework, &settings))
            .collect();

        Ok(json!({ "frameworks": results }))
    }
}
