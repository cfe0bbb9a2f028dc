//! Shared fixtures for HTTP API tests

#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use grc_agent_runtime::llm::{CompletionRequest, CompletionResponse, ContentBlock, LlmClient, StopReason};
use grc_agent_runtime::tools::{ComplianceCheckSkill, DraftReportSkill, RiskAnalysisSkill};
use grc_agent_runtime::{AgentPlatform, SkillRegistry};
use grc_api::context::{ORGANIZATION_ID_HEADER, USER_ID_HEADER};
use grc_api::GrcServer;
use grc_common::{MemberRole, OrganizationId, SystemConfig, UserId};
use grc_storage::{GrcStore, MemoryStore};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, Once};
use tower::ServiceExt;

pub const CRON_SECRET: &str = "cron-test-secret";
pub const BILLING_SECRET: &str = "billing-test-secret";

static INIT: Once = Once::new();

pub fn init_test_logging() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("debug")
            .with_test_writer()
            .try_init();
    });
}

/// Replays queued model responses, then ends the conversation
#[derive(Default)]
pub struct ScriptedLlm {
    responses: Mutex<VecDeque<CompletionResponse>>,
}

impl ScriptedLlm {
    pub fn push(&self, response: CompletionResponse) {
        self.responses.lock().unwrap().push_back(response);
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    async fn complete(&self, _request: &CompletionRequest) -> Result<CompletionResponse> {
        Ok(self.responses.lock().unwrap().pop_front().unwrap_or_else(|| CompletionResponse {
            content: vec![ContentBlock::text("Done.")],
            stop_reason: Some(StopReason::EndTurn),
        }))
    }
}

pub fn tool_use(id: &str, name: &str, input: Value) -> CompletionResponse {
    CompletionResponse {
        content: vec![ContentBlock::ToolUse {
            id: id.to_string(),
            name: name.to_string(),
            input,
        }],
        stop_reason: Some(StopReason::ToolUse),
    }
}

pub struct TestApp {
    pub router: Router,
    pub store: MemoryStore,
    pub llm: Arc<ScriptedLlm>,
    pub platform: AgentPlatform,
    pub org: OrganizationId,
    pub owner: UserId,
    pub member: UserId,
    pub viewer: UserId,
}

impl TestApp {
    pub async fn new() -> Self {
        init_test_logging();
        let store = MemoryStore::new();
        let shared: Arc<dyn GrcStore> = Arc::new(store.clone());
        let llm = Arc::new(ScriptedLlm::default());

        let mut skills = SkillRegistry::new();
        skills.register(Arc::new(RiskAnalysisSkill::new(shared.clone())));
        skills.register(Arc::new(ComplianceCheckSkill::new(shared.clone())));
        skills.register(Arc::new(DraftReportSkill));
        let platform = AgentPlatform::new(shared, llm.clone(), skills);

        let mut config = SystemConfig::default();
        config.security.cron_secret = Some(CRON_SECRET.to_string());
        config.security.billing_secret = Some(BILLING_SECRET.to_string());
        let router = GrcServer::new(platform.clone(), config).router();

        let org = OrganizationId::new();
        let owner = UserId::new();
        let member = UserId::new();
        let viewer = UserId::new();
        store.add_member(org, owner, MemberRole::Owner).await;
        store.add_member(org, member, MemberRole::Member).await;
        store.add_member(org, viewer, MemberRole::Viewer).await;

        Self {
            router,
            store,
            llm,
            platform,
            org,
            owner,
            member,
            viewer,
        }
    }

    /// Send a request as `user` in this app's organization
    pub async fn call(&self, method: Method, uri: &str, user: UserId, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(USER_ID_HEADER, user.0.to_string())
            .header(ORGANIZATION_ID_HEADER, self.org.0.to_string());
        self.send(builder, body).await
    }

    pub async fn send(&self, builder: axum::http::request::Builder, body: Option<Value>) -> (StatusCode, Value) {
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }
}
