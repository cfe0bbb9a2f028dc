//! Typed view over the organization settings JSON blob.
//!
//! Storage keeps settings as one JSON document; the core only ever works on
//! [`OrganizationSettings`]. Keys it does not know about are carried in
//! `extra` so a decode/encode cycle never drops data written by other parts
//! of the product.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::types::UserId;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct OrganizationSettings {
    #[serde(default)]
    pub agent_run_count: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_trial_started_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub agent_credits_purchased: u64,

    /// Purchase ids already credited, so webhook redelivery is harmless
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub agent_credit_purchase_ids: Vec<String>,

    #[serde(default)]
    pub active_frameworks: Vec<String>,

    /// framework code -> requirement code -> entry
    #[serde(default)]
    pub requirement_statuses: BTreeMap<String, BTreeMap<String, RequirementEntry>>,

    #[serde(flatten)]
    #[cfg_attr(feature = "openapi", schema(value_type = Object))]
    pub extra: Map<String, Value>,
}

impl OrganizationSettings {
    pub fn from_value(value: Value) -> crate::Result<Self> {
        if value.is_null() {
            return Ok(Self::default());
        }
        Ok(serde_json::from_value(value)?)
    }

    pub fn to_value(&self) -> crate::Result<Value> {
        Ok(serde_json::to_value(self)?)
    }

    pub fn requirement_status(&self, framework: &str, requirement: &str) -> RequirementStatus {
        self.requirement_statuses
            .get(framework)
            .and_then(|reqs| reqs.get(requirement))
            .map(|entry| entry.status.clone())
            .unwrap_or(RequirementStatus::NotStarted)
    }

    /// Merge one requirement entry, returning the previous one if any
    pub fn set_requirement(
        &mut self,
        framework: &str,
        requirement: &str,
        entry: RequirementEntry,
    ) -> Option<RequirementEntry> {
        self.requirement_statuses
            .entry(framework.to_string())
            .or_default()
            .insert(requirement.to_string(), entry)
    }

    pub fn activate_framework(&mut self, framework: &str) {
        if !self.active_frameworks.iter().any(|f| f == framework) {
            self.active_frameworks.push(framework.to_string());
        }
    }

    /// Add purchased credits unless `purchase_id` was already credited.
    /// Returns whether anything changed.
    pub fn record_credit_purchase(&mut self, purchase_id: &str, credits: u64) -> bool {
        if self.agent_credit_purchase_ids.iter().any(|p| p == purchase_id) {
            return false;
        }
        self.agent_credits_purchased = self.agent_credits_purchased.saturating_add(credits);
        self.agent_credit_purchase_ids.push(purchase_id.to_string());
        true
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct RequirementEntry {
    pub status: RequirementStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_by: Option<UserId>,
}

/// Requirement implementation status. Values written by other tools are
/// preserved verbatim in `Other`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RequirementStatus {
    NotStarted,
    InProgress,
    Implemented,
    NotApplicable,
    Other(String),
}

impl RequirementStatus {
    pub fn as_str(&self) -> &str {
        match self {
            Self::NotStarted => "not_started",
            Self::InProgress => "in_progress",
            Self::Implemented => "implemented",
            Self::NotApplicable => "not_applicable",
            Self::Other(s) => s.as_str(),
        }
    }

    /// Parse a user/LLM supplied status, rejecting anything outside the known set
    pub fn parse_known(raw: &str) -> Option<Self> {
        match Self::from(raw.trim().to_lowercase().replace([' ', '-'], "_")) {
            Self::Other(_) => None,
            known => Some(known),
        }
    }
}

/// Serialized as a plain string, so the schema is one too
#[cfg(feature = "openapi")]
impl<'s> utoipa::ToSchema<'s> for RequirementStatus {
    fn schema() -> (&'s str, utoipa::openapi::RefOr<utoipa::openapi::schema::Schema>) {
        use utoipa::openapi::schema::{ObjectBuilder, Schema, SchemaType};

        let schema = ObjectBuilder::new()
            .schema_type(SchemaType::String)
            .description(Some(
                "not_started, in_progress, implemented, not_applicable, or a value written by another tool",
            ))
            .example(Some(serde_json::json!("in_progress")))
            .build();
        ("RequirementStatus", utoipa::openapi::RefOr::T(Schema::Object(schema)))
    }
}

impl From<String> for RequirementStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "not_started" => Self::NotStarted,
            "in_progress" => Self::InProgress,
            "implemented" => Self::Implemented,
            "not_applicable" => Self::NotApplicable,
            _ => Self::Other(s),
        }
    }
}

impl From<RequirementStatus> for String {
    fn from(status: RequirementStatus) -> Self {
        status.as_str().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unknown_keys_survive_round_trip() {
        let raw = json!({
            "agent_run_count": 4,
            "theme": "dark",
            "requirement_statuses": {
                "soc2": { "CC6.1": { "status": "implemented" } }
            }
        });
        let settings = OrganizationSettings::from_value(raw).unwrap();
        assert_eq!(settings.agent_run_count, 4);
        assert_eq!(settings.extra.get("theme"), Some(&json!("dark")));

        let encoded = settings.to_value().unwrap();
        assert_eq!(encoded["theme"], json!("dark"));
        assert_eq!(
            encoded["requirement_statuses"]["soc2"]["CC6.1"]["status"],
            json!("implemented")
        );
    }

    #[test]
    fn null_settings_decode_to_default() {
        let settings = OrganizationSettings::from_value(Value::Null).unwrap();
        assert_eq!(settings, OrganizationSettings::default());
    }

    #[test]
    fn credit_purchase_is_applied_once() {
        let mut settings = OrganizationSettings::default();
        assert!(settings.record_credit_purchase("pi_1", 50));
        assert!(!settings.record_credit_purchase("pi_1", 50));
        assert!(settings.record_credit_purchase("pi_2", 25));
        assert_eq!(settings.agent_credits_purchased, 75);
        assert_eq!(settings.agent_credit_purchase_ids, vec!["pi_1", "pi_2"]);
    }

    #[test]
    fn activating_a_framework_twice_keeps_one_entry() {
        let mut settings = OrganizationSettings::default();
        settings.activate_framework("soc2");
        settings.activate_framework("soc2");
        assert_eq!(settings.active_frameworks, vec!["soc2"]);
    }

    #[test]
    fn absent_requirement_is_not_started() {
        let settings = OrganizationSettings::default();
        assert_eq!(
            settings.requirement_status("soc2", "CC1.1"),
            RequirementStatus::NotStarted
        );
    }

    #[cfg(feature = "openapi")]
    #[test]
    fn requirement_status_schema_is_a_string() {
        use utoipa::ToSchema;

        let (name, schema) = RequirementStatus::schema();
        assert_eq!(name, "RequirementStatus");
        let rendered = serde_json::to_value(&schema).unwrap();
        assert_eq!(rendered["type"], json!("string"));

        let (name, _) = RequirementEntry::schema();
        assert_eq!(name, "RequirementEntry");
    }

    #[test]
    fn foreign_status_is_preserved() {
        let status: RequirementStatus = serde_json::from_value(json!("needs_review")).unwrap();
        assert_eq!(status, RequirementStatus::Other("needs_review".into()));
        assert_eq!(serde_json::to_value(&status).unwrap(), json!("needs_review"));
        assert_eq!(RequirementStatus::parse_known("needs_review"), None);
        assert_eq!(
            RequirementStatus::parse_known("In Progress"),
            Some(RequirementStatus::InProgress)
        );
    }
}
