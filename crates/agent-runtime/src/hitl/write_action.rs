//! Typed payloads for deferred write skills.
//!
//! A pending write task stores the model's raw tool input. On approval it is
//! decoded into exactly one [`WriteAction`] variant; adding a write skill
//! means adding a variant here and an arm in the approval handler.

use grc_common::IncidentSeverity;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use thiserror::Error;

use crate::skills::{CREATE_INCIDENT, CREATE_POLICY, CREATE_RISK, UPDATE_REQUIREMENT};

pub const DEFAULT_SCORE: i32 = 3;

#[derive(Debug, Error, PartialEq)]
pub enum WriteActionError {
    #[error("unknown write skill: {0}")]
    UnknownSkill(String),

    #[error("invalid {skill} payload: {reason}")]
    InvalidPayload { skill: String, reason: String },
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RiskProposal {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default = "default_score", deserialize_with = "lenient_score")]
    pub likelihood: i32,
    #[serde(default = "default_score", deserialize_with = "lenient_score")]
    pub impact: i32,
    #[serde(default)]
    pub owner: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct IncidentProposal {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_severity", deserialize_with = "lenient_severity")]
    pub severity: IncidentSeverity,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PolicyProposal {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RequirementUpdate {
    pub framework: String,
    pub requirement_code: String,
    pub status: String,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum WriteAction {
    CreateRisk(RiskProposal),
    CreateIncident(IncidentProposal),
    CreatePolicy(PolicyProposal),
    UpdateRequirement(RequirementUpdate),
}

impl WriteAction {
    pub fn decode(skill_id: &str, payload: &Value) -> Result<Self, WriteActionError> {
        let action = match skill_id {
            CREATE_RISK => Self::CreateRisk(parse(skill_id, payload)?),
            CREATE_INCIDENT => Self::CreateIncident(parse(skill_id, payload)?),
            CREATE_POLICY => Self::CreatePolicy(parse(skill_id, payload)?),
            UPDATE_REQUIREMENT => Self::UpdateRequirement(parse(skill_id, payload)?),
            other => return Err(WriteActionError::UnknownSkill(other.to_string())),
        };
        action.validate()?;
        Ok(action)
    }

    pub fn skill_id(&self) -> &'static str {
        match self {
            Self::CreateRisk(_) => CREATE_RISK,
            Self::CreateIncident(_) => CREATE_INCIDENT,
            Self::CreatePolicy(_) => CREATE_POLICY,
            Self::UpdateRequirement(_) => UPDATE_REQUIREMENT,
        }
    }

    fn validate(&self) -> Result<(), WriteActionError> {
        let missing = match self {
            Self::CreateRisk(p) if p.title.trim().is_empty() => Some("title"),
            Self::CreateIncident(p) if p.title.trim().is_empty() => Some("title"),
            Self::CreatePolicy(p) if p.title.trim().is_empty() => Some("title"),
            Self::UpdateRequirement(p) if p.framework.trim().is_empty() => Some("framework"),
            Self::UpdateRequirement(p) if p.requirement_code.trim().is_empty() => Some("requirement_code"),
            _ => None,
        };
        match missing {
            Some(field) => Err(WriteActionError::InvalidPayload {
                skill: self.skill_id().to_string(),
                reason: format!("'{}' must not be empty", field),
            }),
            None => Ok(()),
        }
    }
}

fn parse<T: for<'de> Deserialize<'de>>(skill_id: &str, payload: &Value) -> Result<T, WriteActionError> {
    T::deserialize(payload).map_err(|e| WriteActionError::InvalidPayload {
        skill: skill_id.to_string(),
        reason: e.to_string(),
    })
}

fn default_score() -> i32 {
    DEFAULT_SCORE
}

fn default_severity() -> IncidentSeverity {
    IncidentSeverity::Medium
}

/// Clamp to 1..=5; accepts numbers or numeric strings, anything else is the default
fn lenient_score<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i32, D::Error> {
    let raw = Value::deserialize(deserializer)?;
    let parsed = match &raw {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    Ok(parsed
        .map(|v| (v.round() as i64).clamp(1, 5) as i32)
        .unwrap_or(DEFAULT_SCORE))
}

fn lenient_severity<'de, D: Deserializer<'de>>(deserializer: D) -> Result<IncidentSeverity, D::Error> {
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or_else(default_severity))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_risk_scores_clamped_and_defaulted() {
        let action = WriteAction::decode(
            "create_risk",
            &json!({ "title": "Vendor outage", "likelihood": 9, "impact": "2" }),
        )
        .unwrap();

        let WriteAction::CreateRisk(risk) = action else {
            panic!("expected risk");
        };
        assert_eq!(risk.likelihood, 5);
        assert_eq!(risk.impact, 2);

        let WriteAction::CreateRisk(risk) =
            WriteAction::decode("create_risk", &json!({ "title": "x", "likelihood": 0 })).unwrap()
        else {
            panic!("expected risk");
        };
        assert_eq!(risk.likelihood, 1);
        assert_eq!(risk.impact, DEFAULT_SCORE);
    }

    #[test]
    fn test_severity_defaults_to_medium() {
        let WriteAction::CreateIncident(incident) =
            WriteAction::decode("create_incident", &json!({ "title": "Phish", "severity": "SEVERE" }))
                .unwrap()
        else {
            panic!("expected incident");
        };
        assert_eq!(incident.severity, IncidentSeverity::Medium);

        let WriteAction::CreateIncident(incident) =
            WriteAction::decode("create_incident", &json!({ "title": "Phish", "severity": "High" }))
                .unwrap()
        else {
            panic!("expected incident");
        };
        assert_eq!(incident.severity, IncidentSeverity::High);
    }

    #[test]
    fn test_unknown_skill() {
        let err = WriteAction::decode("delete_risk", &json!({})).unwrap_err();
        assert_eq!(err, WriteActionError::UnknownSkill("delete_risk".into()));
        assert!(err.to_string().contains("unknown write skill"));
    }

    #[test]
    fn test_missing_or_blank_title_rejected() {
        assert!(matches!(
            WriteAction::decode("create_policy", &json!({ "content": "..." })),
            Err(WriteActionError::InvalidPayload { .. })
        ));
        assert!(matches!(
            WriteAction::decode("create_policy", &json!({ "title": "  " })),
            Err(WriteActionError::InvalidPayload { .. })
        ));
    }

    #[test]
    fn test_skill_id_round_trip() {
        let action = WriteAction::decode(
            "update_requirement",
            &json!({ "framework": "soc2", "requirement_code": "CC6.1", "status": "implemented" }),
        )
        .unwrap();
        assert_eq!(action.skill_id(), "update_requirement");
    }
}
