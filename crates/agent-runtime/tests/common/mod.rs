//! Shared fixtures for agent runtime tests

#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use grc_agent_runtime::llm::{CompletionRequest, CompletionResponse, ContentBlock, LlmClient, StopReason};
use grc_agent_runtime::skills::DEFAULT_SKILLS;
use grc_agent_runtime::{AgentPlatform, SkillRegistry};
use grc_agent_runtime::tools::{ComplianceCheckSkill, DraftReportSkill, RiskAnalysisSkill};
use grc_common::{
    Agent, AgentId, AgentStatus, AgentType, AgentTypeId, MemberRole, OrganizationId, Schedule, UserId,
};
use grc_storage::{GrcStore, MemoryStore};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, Once};

static INIT: Once = Once::new();

/// Initialize logging for tests
pub fn init_test_logging() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("debug")
            .with_test_writer()
            .try_init();
    });
}

/// LLM double that replays queued responses and records every request
#[derive(Default)]
pub struct ScriptedLlm {
    responses: Mutex<VecDeque<Result<CompletionResponse, String>>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedLlm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, response: CompletionResponse) -> &Self {
        self.responses.lock().unwrap().push_back(Ok(response));
        self
    }

    pub fn push_error(&self, message: &str) -> &Self {
        self.responses.lock().unwrap().push_back(Err(message.to_string()));
        self
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse> {
        self.requests.lock().unwrap().push(request.clone());
        match self.responses.lock().unwrap().pop_front() {
            Some(Ok(response)) => Ok(response),
            Some(Err(message)) => Err(anyhow::anyhow!(message)),
            // An exhausted script ends the conversation
            None => Ok(text_reply("Done.")),
        }
    }
}

pub fn tool_use(calls: &[(&str, &str, Value)]) -> CompletionResponse {
    let mut content = vec![ContentBlock::text("Working on it.")];
    for (id, name, input) in calls {
        content.push(ContentBlock::ToolUse {
            id: id.to_string(),
            name: name.to_string(),
            input: input.clone(),
        });
    }
    CompletionResponse {
        content,
        stop_reason: Some(StopReason::ToolUse),
    }
}

pub fn text_reply(text: &str) -> CompletionResponse {
    CompletionResponse {
        content: vec![ContentBlock::text(text)],
        stop_reason: Some(StopReason::EndTurn),
    }
}

pub fn risk_proposal(title: &str) -> Value {
    json!({
        "title": title,
        "description": "Third-party vendor holds unencrypted customer data",
        "category": "vendor",
        "likelihood": 4,
        "impact": 5,
        "owner": "CISO",
    })
}

/// Everything a test needs: a store, a scripted model and the wired services
pub struct Harness {
    pub store: MemoryStore,
    pub llm: Arc<ScriptedLlm>,
    pub platform: AgentPlatform,
    pub org: OrganizationId,
    pub owner: UserId,
    pub member: UserId,
    pub viewer: UserId,
}

impl Harness {
    pub async fn new() -> Self {
        init_test_logging();
        let store = MemoryStore::new();
        let llm = Arc::new(ScriptedLlm::new());
        let shared: Arc<dyn GrcStore> = Arc::new(store.clone());

        // Web search needs a network provider; the other read skills are local
        let mut skills = SkillRegistry::new();
        skills.register(Arc::new(RiskAnalysisSkill::new(shared.clone())));
        skills.register(Arc::new(ComplianceCheckSkill::new(shared.clone())));
        skills.register(Arc::new(DraftReportSkill));

        let platform = AgentPlatform::new(shared, llm.clone(), skills);

        let org = OrganizationId::new();
        let owner = UserId::new();
        let member = UserId::new();
        let viewer = UserId::new();
        store.add_member(org, owner, MemberRole::Owner).await;
        store.add_member(org, member, MemberRole::Member).await;
        store.add_member(org, viewer, MemberRole::Viewer).await;

        Self {
            store,
            llm,
            platform,
            org,
            owner,
            member,
            viewer,
        }
    }

    pub async fn agent_type(&self, skills: &[&str], is_default: bool) -> AgentType {
        let agent_type = AgentType {
            id: AgentTypeId::new(),
            organization_id: self.org,
            name: if is_default { "GRC Agent".into() } else { "Custom".into() },
            description: String::new(),
            skills: skills.iter().map(|s| s.to_string()).collect(),
            is_default,
            created_at: Utc::now(),
        };
        self.store.insert_agent_type(&agent_type).await.unwrap();
        agent_type
    }

    pub async fn agent(&self, agent_type: &AgentType, schedule: Schedule) -> Agent {
        let agent = Agent {
            id: AgentId::new(),
            organization_id: self.org,
            agent_type_id: agent_type.id,
            name: "Risk Sentinel".into(),
            description: "Watch vendor risk".into(),
            schedule,
            status: AgentStatus::Active,
            config: json!({ "focus": "vendors" }),
            created_by: Some(self.owner),
            last_run_at: None,
            next_run_at: None,
            created_at: Utc::now(),
        };
        self.store.insert_agent(&agent).await.unwrap();
        agent
    }

    /// An active agent on the default type with every starter skill
    pub async fn default_agent(&self, schedule: Schedule) -> Agent {
        let existing = self
            .store
            .list_agent_types(self.org)
            .await
            .unwrap()
            .into_iter()
            .find(|t| t.is_default);
        let agent_type = match existing {
            Some(agent_type) => agent_type,
            None => self.agent_type(&DEFAULT_SKILLS, true).await,
        };
        self.agent(&agent_type, schedule).await
    }
}
