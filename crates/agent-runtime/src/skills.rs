//! Static skill catalog.
//!
//! Whether a skill needs approval is fixed here and nowhere else; task
//! creation derives `action_type` and `requires_approval` from [`is_write_skill`].

use grc_common::ActionType;
use serde::Serialize;
use strum_macros::{AsRefStr, Display};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display, AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SkillCategory {
    Research,
    Analysis,
    Write,
    Output,
}

#[derive(Debug, Clone, Serialize)]
pub struct Skill {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub category: SkillCategory,
    pub requires_approval: bool,
}

pub const WEB_SEARCH: &str = "web_search";
pub const RISK_ANALYSIS: &str = "risk_analysis";
pub const COMPLIANCE_CHECK: &str = "compliance_check";
pub const DRAFT_REPORT: &str = "draft_report";
pub const CREATE_RISK: &str = "create_risk";
pub const CREATE_INCIDENT: &str = "create_incident";
pub const CREATE_POLICY: &str = "create_policy";
pub const UPDATE_REQUIREMENT: &str = "update_requirement";

pub const WRITE_SKILLS: [&str; 4] = [CREATE_RISK, CREATE_INCIDENT, CREATE_POLICY, UPDATE_REQUIREMENT];

/// Skills granted to the default "GRC Agent" type
pub const DEFAULT_SKILLS: [&str; 8] = [
    WEB_SEARCH,
    RISK_ANALYSIS,
    COMPLIANCE_CHECK,
    DRAFT_REPORT,
    CREATE_RISK,
    CREATE_INCIDENT,
    CREATE_POLICY,
    UPDATE_REQUIREMENT,
];

pub static SKILLS: &[Skill] = &[
    Skill {
        id: WEB_SEARCH,
        name: "Web Search",
        description: "Search the web for regulatory updates, threats and industry guidance",
        category: SkillCategory::Research,
        requires_approval: false,
    },
    Skill {
        id: RISK_ANALYSIS,
        name: "Risk Analysis",
        description: "Analyze the organization's risk register and surface the highest risks",
        category: SkillCategory::Analysis,
        requires_approval: false,
    },
    Skill {
        id: COMPLIANCE_CHECK,
        name: "Compliance Check",
        description: "Measure requirement coverage for the active compliance frameworks",
        category: SkillCategory::Analysis,
        requires_approval: false,
    },
    Skill {
        id: DRAFT_REPORT,
        name: "Draft Report",
        description: "Draft a structured report from findings gathered during the run",
        category: SkillCategory::Output,
        requires_approval: false,
    },
    Skill {
        id: CREATE_RISK,
        name: "Create Risk",
        description: "Add a new risk to the risk register",
        category: SkillCategory::Write,
        requires_approval: true,
    },
    Skill {
        id: CREATE_INCIDENT,
        name: "Create Incident",
        description: "Log a new security or compliance incident",
        category: SkillCategory::Write,
        requires_approval: true,
    },
    Skill {
        id: CREATE_POLICY,
        name: "Create Policy",
        description: "Draft a new policy document",
        category: SkillCategory::Write,
        requires_approval: true,
    },
    Skill {
        id: UPDATE_REQUIREMENT,
        name: "Update Requirement",
        description: "Change the implementation status of a framework requirement",
        category: SkillCategory::Write,
        requires_approval: true,
    },
];

pub fn find_skill(id: &str) -> Option<&'static Skill> {
    SKILLS.iter().find(|s| s.id == id)
}

pub fn is_known_skill(id: &str) -> bool {
    find_skill(id).is_some()
}

pub fn is_write_skill(id: &str) -> bool {
    WRITE_SKILLS.contains(&id)
}

pub fn action_type_for(id: &str) -> ActionType {
    if is_write_skill(id) {
        ActionType::Write
    } else {
        ActionType::Read
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_approval_flag_matches_write_set() {
        for skill in SKILLS {
            assert_eq!(skill.requires_approval, is_write_skill(skill.id), "{}", skill.id);
            assert_eq!(skill.category == SkillCategory::Write, skill.requires_approval);
        }
    }

    #[test]
    fn test_default_skills_are_catalogued() {
        assert!(DEFAULT_SKILLS.iter().all(|id| is_known_skill(id)));
        assert_eq!(action_type_for("risk_analysis"), ActionType::Read);
        assert_eq!(action_type_for("create_policy"), ActionType::Write);
        assert_eq!(action_type_for("delete_everything"), ActionType::Read);
    }
}
