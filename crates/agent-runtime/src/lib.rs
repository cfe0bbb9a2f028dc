//! Agent execution, approval and usage services for the GRC platform

pub mod agents;
pub mod billing;
pub mod error;
pub mod executor;
pub mod hitl;
pub mod llm;
pub mod runs;
pub mod schedule;
pub mod scheduler;
pub mod skills;
pub mod tools;
pub mod usage;

pub use agents::{AgentManager, NewAgent, NewAgentType};
pub use billing::{BillingEvent, BillingEventResult, BillingLedger};
pub use error::{RuntimeError, RuntimeResult};
pub use executor::{AgentRunner, RunOutcome};
pub use hitl::{ApprovalOutcome, ApprovalService, AuditLogger};
pub use llm::{AnthropicClient, LlmClient};
pub use runs::{ManualRunResult, RunService};
pub use schedule::ScheduleExt;
pub use scheduler::{ScheduledRun, Scheduler, SchedulerReport};
pub use skills::{Skill, SkillCategory, SKILLS};
pub use tools::{SkillExecutor, SkillRegistry};
pub use usage::{UsageGate, UsageStatus};

use grc_common::SystemConfig;
use grc_storage::GrcStore;
use std::sync::Arc;

/// Every service wired over one store and one LLM client
#[derive(Clone)]
pub struct AgentPlatform {
    pub store: Arc<dyn GrcStore>,
    pub runner: AgentRunner,
    pub approvals: ApprovalService,
    pub scheduler: Scheduler,
    pub runs: RunService,
    pub agents: AgentManager,
    pub billing: BillingLedger,
    pub usage: UsageGate,
}

impl AgentPlatform {
    pub fn new(store: Arc<dyn GrcStore>, llm: Arc<dyn LlmClient>, skills: SkillRegistry) -> Self {
        let audit = AuditLogger::new(store.clone());
        let usage = UsageGate::new(store.clone());
        let runner = AgentRunner::new(store.clone(), llm, skills, audit.clone());

        Self {
            approvals: ApprovalService::new(store.clone(), audit.clone()),
            scheduler: Scheduler::new(store.clone(), runner.clone()),
            runs: RunService::new(store.clone(), runner.clone(), usage.clone()),
            agents: AgentManager::new(store.clone(), audit.clone()),
            billing: BillingLedger::new(store.clone(), audit),
            usage,
            runner,
            store,
        }
    }

    /// Production wiring: Anthropic client and the built-in read skills
    pub fn from_config(store: Arc<dyn GrcStore>, config: &SystemConfig) -> anyhow::Result<Self> {
        let llm: Arc<dyn LlmClient> = Arc::new(AnthropicClient::new(&config.llm)?);
        let skills = SkillRegistry::with_defaults(store.clone(), &config.search)?;
        Ok(Self::new(store, llm, skills))
    }
}
