//! Declarative skill-to-tool table.
//!
//! Every tool the LLM can see is described once in [`TOOL_SPECS`]; the JSON
//! schemas are rendered lazily on first use and then only looked up.

use once_cell::sync::Lazy;
use serde_json::{json, Map, Value};
use std::collections::{HashMap, HashSet};

use crate::llm::ToolSchema;
use crate::skills::{
    COMPLIANCE_CHECK, CREATE_INCIDENT, CREATE_POLICY, CREATE_RISK, DRAFT_REPORT, RISK_ANALYSIS,
    UPDATE_REQUIREMENT, WEB_SEARCH,
};

#[derive(Debug, Clone, Copy)]
pub enum ParamKind {
    String,
    Integer { min: i64, max: i64 },
    Enum(&'static [&'static str]),
    /// Array of objects with the given string fields
    ObjectList(&'static [&'static str]),
}

#[derive(Debug, Clone, Copy)]
pub struct ParamSpec {
    pub name: &'static str,
    pub kind: ParamKind,
    pub description: &'static str,
    pub required: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct ToolSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub params: &'static [ParamSpec],
}

const fn param(name: &'static str, kind: ParamKind, description: &'static str, required: bool) -> ParamSpec {
    ParamSpec {
        name,
        kind,
        description,
        required,
    }
}

const FRAMEWORK_CODES: &[&str] = &["soc2", "iso27001", "nist_csf"];
const SEVERITIES: &[&str] = &["low", "medium", "high", "critical"];
const REQUIREMENT_STATUSES: &[&str] = &["not_started", "in_progress", "implemented", "not_applicable"];
const REPORT_TYPES: &[&str] = &[
    "risk_summary",
    "compliance_status",
    "incident_summary",
    "executive_summary",
];
const SCORE: ParamKind = ParamKind::Integer { min: 1, max: 5 };

pub static TOOL_SPECS: &[ToolSpec] = &[
    ToolSpec {
        name: WEB_SEARCH,
        description: "Search the web for current regulatory, threat and industry information.",
        params: &[param("query", ParamKind::String, "Search query", true)],
    },
    ToolSpec {
        name: RISK_ANALYSIS,
        description: "Summarize the organization's risk register: counts, open risks and the highest scoring risks.",
        params: &[param(
            "focus",
            ParamKind::String,
            "Optional area to focus the analysis on",
            false,
        )],
    },
    ToolSpec {
        name: COMPLIANCE_CHECK,
        description: "Report requirement coverage and gaps for the organization's compliance frameworks.",
        params: &[param(
            "framework",
            ParamKind::Enum(FRAMEWORK_CODES),
            "Limit the check to one framework",
            false,
        )],
    },
    ToolSpec {
        name: DRAFT_REPORT,
        description: "Draft a structured report from the findings of this run.",
        params: &[
            param("report_type", ParamKind::Enum(REPORT_TYPES), "Kind of report", true),
            param("title", ParamKind::String, "Report title", true),
            param("summary", ParamKind::String, "Executive summary", true),
            param(
                "sections",
                ParamKind::ObjectList(&["heading", "body"]),
                "Report sections",
                false,
            ),
        ],
    },
    ToolSpec {
        name: CREATE_RISK,
        description: "Propose a new risk for the risk register. Requires human approval.",
        params: &[
            param("title", ParamKind::String, "Short risk title", true),
            param("description", ParamKind::String, "What could happen and why", true),
            param("category", ParamKind::String, "Risk category, e.g. operational or security", false),
            param("likelihood", SCORE, "Likelihood from 1 (rare) to 5 (almost certain)", false),
            param("impact", SCORE, "Impact from 1 (negligible) to 5 (severe)", false),
            param("owner", ParamKind::String, "Proposed risk owner", false),
        ],
    },
    ToolSpec {
        name: CREATE_INCIDENT,
        description: "Propose logging a new incident. Requires human approval.",
        params: &[
            param("title", ParamKind::String, "Short incident title", true),
            param("description", ParamKind::String, "What happened", true),
            param("severity", ParamKind::Enum(SEVERITIES), "Incident severity", false),
        ],
    },
    ToolSpec {
        name: CREATE_POLICY,
        description: "Propose a new policy document. Requires human approval.",
        params: &[
            param("title", ParamKind::String, "Policy title", true),
            param("description", ParamKind::String, "Purpose and scope", true),
            param("category", ParamKind::String, "Policy category", false),
            param("content", ParamKind::String, "Full policy text", true),
        ],
    },
    ToolSpec {
        name: UPDATE_REQUIREMENT,
        description: "Propose a status change for a compliance framework requirement. Requires human approval.",
        params: &[
            param("framework", ParamKind::Enum(FRAMEWORK_CODES), "Framework code", true),
            param("requirement_code", ParamKind::String, "Requirement code, e.g. CC6.1", true),
            param("status", ParamKind::Enum(REQUIREMENT_STATUSES), "New implementation status", true),
            param("notes", ParamKind::String, "Justification or evidence notes", false),
        ],
    },
];

static TOOLS: Lazy<HashMap<&'static str, ToolSchema>> = Lazy::new(|| {
    TOOL_SPECS
        .iter()
        .map(|spec| (spec.name, spec.to_schema()))
        .collect()
});

impl ParamKind {
    fn json_schema(&self, description: &str) -> Value {
        match self {
            Self::String => json!({ "type": "string", "description": description }),
            Self::Integer { min, max } => json!({
                "type": "integer",
                "minimum": min,
                "maximum": max,
                "description": description,
            }),
            Self::Enum(values) => json!({ "type": "string", "enum": values, "description": description }),
            Self::ObjectList(fields) => {
                let properties: Map<String, Value> = fields
                    .iter()
                    .map(|f| (f.to_string(), json!({ "type": "string" })))
                    .collect();
                json!({
                    "type": "array",
                    "description": description,
                    "items": { "type": "object", "properties": properties },
                })
            }
        }
    }
}

impl ToolSpec {
    fn to_schema(&self) -> ToolSchema {
        let properties: Map<String, Value> = self
            .params
            .iter()
            .map(|p| (p.name.to_string(), p.kind.json_schema(p.description)))
            .collect();
        let required: Vec<&str> = self
            .params
            .iter()
            .filter(|p| p.required)
            .map(|p| p.name)
            .collect();

        ToolSchema {
            name: self.name.to_string(),
            description: self.description.to_string(),
            input_schema: json!({
                "type": "object",
                "properties": properties,
                "required": required,
            }),
        }
    }
}

/// Tool schemas for the granted skills, in grant order, unknown ids skipped
pub fn build_tools(skill_ids: &[String]) -> Vec<ToolSchema> {
    let mut seen = HashSet::new();
    skill_ids
        .iter()
        .filter(|id| seen.insert(id.as_str()))
        .filter_map(|id| TOOLS.get(id.as_str()).cloned())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::skills::SKILLS;

    fn ids(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_every_skill_has_a_tool() {
        for skill in SKILLS {
            assert!(TOOLS.contains_key(skill.id), "missing tool for {}", skill.id);
        }
    }

    #[test]
    fn test_order_dedup_and_unknown() {
        let tools = build_tools(&ids(&["create_risk", "bogus", "risk_analysis", "create_risk"]));
        let names: Vec<_> = tools.iter().map(|t| t.name.as_str()).collect();

        assert_eq!(names, vec!["create_risk", "risk_analysis"]);
    }

    #[test]
    fn test_required_params_rendered() {
        let tools = build_tools(&ids(&["update_requirement"]));
        let schema = &tools[0].input_schema;

        assert_eq!(schema["type"], "object");
        assert_eq!(
            schema["required"],
            json!(["framework", "requirement_code", "status"])
        );
        assert_eq!(schema["properties"]["status"]["enum"][2], "implemented");
    }

    #[test]
    fn test_empty_grant_yields_no_tools() {
        assert!(build_tools(&[]).is_empty());
    }
}
