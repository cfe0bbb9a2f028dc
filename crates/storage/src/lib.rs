//! Persistence for the GRC agent platform.
//!
//! [`GrcStore`] is the typed query surface the agent runtime depends on.
//! [`PostgresStore`] is the production backend; [`MemoryStore`] backs tests
//! and local development.

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PostgresStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use grc_common::{
    Agent, AgentId, AgentStatus, AgentTask, AgentType, AgentTypeId, AuditEntry, Incident,
    MemberRole, OrganizationId, OrganizationSettings, Policy, RecordKind, RequirementEntry, Result,
    Risk, Subscription, TaskFilter, TaskId, TaskStatus, UserId,
};

#[async_trait]
pub trait GrcStore: Send + Sync {
    // Agents
    async fn get_agent(&self, org: OrganizationId, id: AgentId) -> Result<Option<Agent>>;
    async fn list_agents(&self, org: OrganizationId) -> Result<Vec<Agent>>;
    async fn insert_agent(&self, agent: &Agent) -> Result<()>;
    async fn update_agent_status(
        &self,
        org: OrganizationId,
        id: AgentId,
        status: AgentStatus,
        next_run_at: Option<DateTime<Utc>>,
    ) -> Result<()>;
    async fn record_agent_run(
        &self,
        id: AgentId,
        last_run_at: DateTime<Utc>,
        next_run_at: Option<DateTime<Utc>>,
    ) -> Result<()>;
    /// Active agents on a non-manual schedule whose `next_run_at` has elapsed
    async fn list_due_agents(&self, now: DateTime<Utc>) -> Result<Vec<Agent>>;

    // Agent types
    async fn get_agent_type(&self, org: OrganizationId, id: AgentTypeId)
        -> Result<Option<AgentType>>;
    async fn list_agent_types(&self, org: OrganizationId) -> Result<Vec<AgentType>>;
    async fn insert_agent_type(&self, agent_type: &AgentType) -> Result<()>;
    async fn update_agent_type_skills(
        &self,
        org: OrganizationId,
        id: AgentTypeId,
        skills: &[String],
    ) -> Result<()>;
    async fn delete_agent_type(&self, org: OrganizationId, id: AgentTypeId) -> Result<()>;

    // Tasks
    async fn insert_task(&self, task: &AgentTask) -> Result<()>;
    async fn get_task(&self, id: TaskId) -> Result<Option<AgentTask>>;
    /// Persist status, result, error and approval stamps of an existing task
    async fn update_task(&self, task: &AgentTask) -> Result<()>;
    /// Like `update_task`, but only while the stored status is still `from`.
    /// Returns false when another writer moved the task first.
    async fn transition_task(&self, task: &AgentTask, from: TaskStatus) -> Result<bool>;
    async fn list_tasks(&self, org: OrganizationId, filter: &TaskFilter) -> Result<Vec<AgentTask>>;

    // Domain records
    async fn list_recent_risks(&self, org: OrganizationId, limit: usize) -> Result<Vec<Risk>>;
    async fn count_records(&self, org: OrganizationId, kind: RecordKind) -> Result<u64>;
    async fn insert_risk(&self, risk: &Risk) -> Result<()>;
    async fn insert_incident(&self, incident: &Incident) -> Result<()>;
    async fn insert_policy(&self, policy: &Policy) -> Result<()>;

    // Organization settings
    async fn get_settings(&self, org: OrganizationId) -> Result<OrganizationSettings>;
    async fn save_settings(&self, org: OrganizationId, settings: &OrganizationSettings)
        -> Result<()>;
    /// Bump `agent_run_count`, stamping the trial start on the first run
    async fn increment_agent_run_count(
        &self,
        org: OrganizationId,
        now: DateTime<Utc>,
    ) -> Result<OrganizationSettings>;
    /// Credit a purchase exactly once. `None` when `purchase_id` was already applied.
    async fn apply_credit_purchase(
        &self,
        org: OrganizationId,
        purchase_id: &str,
        credits: u64,
    ) -> Result<Option<OrganizationSettings>>;
    /// Merge one requirement entry and mark its framework active, returning
    /// the entry it replaced
    async fn set_requirement_status(
        &self,
        org: OrganizationId,
        framework: &str,
        requirement: &str,
        entry: &RequirementEntry,
    ) -> Result<Option<RequirementEntry>>;

    // Billing
    async fn get_subscription(&self, org: OrganizationId) -> Result<Option<Subscription>>;
    async fn upsert_subscription(&self, subscription: &Subscription) -> Result<()>;

    // Membership
    async fn member_role(&self, org: OrganizationId, user: UserId) -> Result<Option<MemberRole>>;

    // Audit
    async fn insert_audit(&self, entry: &AuditEntry) -> Result<()>;
    async fn list_audit(&self, org: OrganizationId, limit: usize) -> Result<Vec<AuditEntry>>;
}

/// Connect to PostgreSQL and bring the schema up to date
pub async fn initialize_storage(postgres_url: &str, max_connections: u32) -> anyhow::Result<PostgresStore> {
    let store = PostgresStore::connect(postgres_url, max_connections).await?;
    store.run_migrations().await?;

    tracing::info!("Storage backend initialized successfully");
    Ok(store)
}
