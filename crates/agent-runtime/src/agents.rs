//! Agent and agent-type management.

use chrono::Utc;
use grc_common::{
    Agent, AgentId, AgentStatus, AgentType, AgentTypeId, AuditEntry, MemberRole, OrganizationId,
    Principal, Schedule, UserId,
};
use grc_storage::GrcStore;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{info, instrument};
use utoipa::ToSchema;

use crate::error::{RuntimeError, RuntimeResult};
use crate::hitl::AuditLogger;
use crate::schedule::ScheduleExt;
use crate::skills::{is_known_skill, DEFAULT_SKILLS};

pub const DEFAULT_AGENT_TYPE_NAME: &str = "GRC Agent";
pub const DEFAULT_AGENT_NAME: &str = "GRC Agent";
pub const DEFAULT_AGENT_SCHEDULE: Schedule = Schedule::Daily9am;

const DEFAULT_AGENT_TYPE_DESCRIPTION: &str =
    "General-purpose governance, risk and compliance agent with the full starter skill set";
const DEFAULT_AGENT_MISSION: &str = "Review the risk register and compliance posture every morning, \
     research relevant threats and regulatory changes, and propose new risks, incidents, policies or \
     requirement updates where the evidence supports them.";

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct NewAgent {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Defaults to the organization's default agent type
    #[serde(default)]
    pub agent_type_id: Option<AgentTypeId>,
    #[serde(default = "manual_schedule")]
    pub schedule: Schedule,
    #[serde(default)]
    #[schema(value_type = Object)]
    pub config: Value,
}

fn manual_schedule() -> Schedule {
    Schedule::Manual
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct NewAgentType {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub skills: Vec<String>,
}

#[derive(Clone)]
pub struct AgentManager {
    store: Arc<dyn GrcStore>,
    audit: AuditLogger,
}

impl AgentManager {
    pub fn new(store: Arc<dyn GrcStore>, audit: AuditLogger) -> Self {
        Self { store, audit }
    }

    pub async fn list_agents(&self, organization_id: OrganizationId) -> RuntimeResult<Vec<Agent>> {
        Ok(self.store.list_agents(organization_id).await?)
    }

    pub async fn list_agent_types(&self, organization_id: OrganizationId) -> RuntimeResult<Vec<AgentType>> {
        Ok(self.store.list_agent_types(organization_id).await?)
    }

    /// Provision the default type and, for an organization without agents,
    /// its first agent. Safe to call on every request.
    #[instrument(skip(self))]
    pub async fn ensure_default_agent(
        &self,
        organization_id: OrganizationId,
        user_id: Option<UserId>,
    ) -> RuntimeResult<(AgentType, Option<Agent>)> {
        let types = self.store.list_agent_types(organization_id).await?;
        let default_type = match types.into_iter().find(|t| t.is_default) {
            Some(existing) => existing,
            None => {
                let agent_type = AgentType {
                    id: AgentTypeId::new(),
                    organization_id,
                    name: DEFAULT_AGENT_TYPE_NAME.to_string(),
                    description: DEFAULT_AGENT_TYPE_DESCRIPTION.to_string(),
                    skills: DEFAULT_SKILLS.iter().map(|s| s.to_string()).collect(),
                    is_default: true,
                    created_at: Utc::now(),
                };
                self.store.insert_agent_type(&agent_type).await?;
                info!("Provisioned default agent type for organization {}", organization_id);
                agent_type
            }
        };

        if !self.store.list_agents(organization_id).await?.is_empty() {
            return Ok((default_type, None));
        }

        let now = Utc::now();
        let agent = Agent {
            id: AgentId::new(),
            organization_id,
            agent_type_id: default_type.id,
            name: DEFAULT_AGENT_NAME.to_string(),
            description: DEFAULT_AGENT_MISSION.to_string(),
            schedule: DEFAULT_AGENT_SCHEDULE,
            status: AgentStatus::Active,
            config: json!({}),
            created_by: user_id,
            last_run_at: None,
            next_run_at: DEFAULT_AGENT_SCHEDULE.next_run(now),
            created_at: now,
        };
        self.store.insert_agent(&agent).await?;
        info!("Provisioned first agent {} for organization {}", agent.id, organization_id);

        let principal = user_id.map(Principal::User).unwrap_or(Principal::Scheduler);
        self.audit
            .record(
                AuditEntry::new(organization_id, principal, "agent.created", "agent", agent.id)
                    .with_new_values(json!({ "name": agent.name, "schedule": agent.schedule, "provisioned": true })),
            )
            .await;

        Ok((default_type, Some(agent)))
    }

    #[instrument(skip(self, request), fields(name = %request.name))]
    pub async fn create_agent(
        &self,
        organization_id: OrganizationId,
        user_id: UserId,
        request: NewAgent,
    ) -> RuntimeResult<Agent> {
        self.require_manager(organization_id, user_id).await?;
        if request.name.trim().is_empty() {
            return Err(RuntimeError::validation("agent name must not be empty"));
        }

        let agent_type = match request.agent_type_id {
            Some(type_id) => self
                .store
                .get_agent_type(organization_id, type_id)
                .await?
                .ok_or_else(|| RuntimeError::AgentTypeNotFound(type_id.to_string()))?,
            None => self.ensure_default_agent(organization_id, Some(user_id)).await?.0,
        };

        if !agent_type.is_default {
            let unlimited = self
                .store
                .get_subscription(organization_id)
                .await?
                .map(|s| s.has_active_unlimited_plan())
                .unwrap_or(false);
            if !unlimited {
                return Err(RuntimeError::forbidden(
                    "custom agent types require the unlimited agent plan",
                ));
            }
        }

        let now = Utc::now();
        let agent = Agent {
            id: AgentId::new(),
            organization_id,
            agent_type_id: agent_type.id,
            name: request.name.trim().to_string(),
            description: request.description,
            schedule: request.schedule,
            status: AgentStatus::Active,
            config: if request.config.is_null() { json!({}) } else { request.config },
            created_by: Some(user_id),
            last_run_at: None,
            next_run_at: request.schedule.next_run(now),
            created_at: now,
        };
        self.store.insert_agent(&agent).await?;

        self.audit
            .record(
                AuditEntry::new(organization_id, Principal::User(user_id), "agent.created", "agent", agent.id)
                    .with_new_values(json!({
                        "name": agent.name,
                        "agent_type_id": agent.agent_type_id,
                        "schedule": agent.schedule,
                    })),
            )
            .await;
        Ok(agent)
    }

    /// Suspend or resume an agent
    #[instrument(skip(self))]
    pub async fn update_agent_status(
        &self,
        organization_id: OrganizationId,
        user_id: UserId,
        agent_id: AgentId,
        status: AgentStatus,
    ) -> RuntimeResult<Agent> {
        self.require_manager(organization_id, user_id).await?;
        if status == AgentStatus::Deleted {
            return Err(RuntimeError::validation("use delete to remove an agent"));
        }

        let mut agent = self.load_agent(organization_id, agent_id).await?;
        if agent.status == AgentStatus::Deleted {
            return Err(RuntimeError::ProtectedResource(format!("agent {} is deleted", agent_id)));
        }

        let previous = agent.status;
        agent.status = status;
        agent.next_run_at = match status {
            AgentStatus::Active => agent.schedule.next_run(Utc::now()),
            _ => None,
        };
        self.store
            .update_agent_status(organization_id, agent_id, agent.status, agent.next_run_at)
            .await?;

        self.audit
            .record(
                AuditEntry::new(organization_id, Principal::User(user_id), "agent.status_changed", "agent", agent_id)
                    .with_old_values(json!({ "status": previous }))
                    .with_new_values(json!({ "status": status })),
            )
            .await;
        Ok(agent)
    }

    /// Soft delete; task history keeps pointing at the agent
    #[instrument(skip(self))]
    pub async fn delete_agent(
        &self,
        organization_id: OrganizationId,
        user_id: UserId,
        agent_id: AgentId,
    ) -> RuntimeResult<()> {
        self.require_manager(organization_id, user_id).await?;
        let agent = self.load_agent(organization_id, agent_id).await?;
        if agent.status == AgentStatus::Deleted {
            return Ok(());
        }

        self.store
            .update_agent_status(organization_id, agent_id, AgentStatus::Deleted, None)
            .await?;
        self.audit
            .record(
                AuditEntry::new(organization_id, Principal::User(user_id), "agent.deleted", "agent", agent_id)
                    .with_old_values(json!({ "status": agent.status, "name": agent.name })),
            )
            .await;
        Ok(())
    }

    #[instrument(skip(self, request), fields(name = %request.name))]
    pub async fn create_agent_type(
        &self,
        organization_id: OrganizationId,
        user_id: UserId,
        request: NewAgentType,
    ) -> RuntimeResult<AgentType> {
        self.require_manager(organization_id, user_id).await?;
        if request.name.trim().is_empty() {
            return Err(RuntimeError::validation("agent type name must not be empty"));
        }
        let skills = validate_skills(&request.skills)?;

        let agent_type = AgentType {
            id: AgentTypeId::new(),
            organization_id,
            name: request.name.trim().to_string(),
            description: request.description,
            skills,
            is_default: false,
            created_at: Utc::now(),
        };
        self.store.insert_agent_type(&agent_type).await?;

        self.audit
            .record(
                AuditEntry::new(
                    organization_id,
                    Principal::User(user_id),
                    "agent_type.created",
                    "agent_type",
                    agent_type.id,
                )
                .with_new_values(json!({ "name": agent_type.name, "skills": agent_type.skills })),
            )
            .await;
        Ok(agent_type)
    }

    #[instrument(skip(self, skills))]
    pub async fn update_agent_type_skills(
        &self,
        organization_id: OrganizationId,
        user_id: UserId,
        type_id: AgentTypeId,
        skills: Vec<String>,
    ) -> RuntimeResult<AgentType> {
        self.require_manager(organization_id, user_id).await?;
        let mut agent_type = self.load_agent_type(organization_id, type_id).await?;
        if agent_type.is_default {
            return Err(RuntimeError::ProtectedResource(
                "the default agent type's skills cannot be changed".to_string(),
            ));
        }
        let skills = validate_skills(&skills)?;

        self.store
            .update_agent_type_skills(organization_id, type_id, &skills)
            .await?;
        let previous = std::mem::replace(&mut agent_type.skills, skills);

        self.audit
            .record(
                AuditEntry::new(
                    organization_id,
                    Principal::User(user_id),
                    "agent_type.skills_updated",
                    "agent_type",
                    type_id,
                )
                .with_old_values(json!({ "skills": previous }))
                .with_new_values(json!({ "skills": agent_type.skills })),
            )
            .await;
        Ok(agent_type)
    }

    #[instrument(skip(self))]
    pub async fn delete_agent_type(
        &self,
        organization_id: OrganizationId,
        user_id: UserId,
        type_id: AgentTypeId,
    ) -> RuntimeResult<()> {
        self.require_manager(organization_id, user_id).await?;
        let agent_type = self.load_agent_type(organization_id, type_id).await?;
        if agent_type.is_default {
            return Err(RuntimeError::ProtectedResource(
                "the default agent type cannot be deleted".to_string(),
            ));
        }

        let in_use = self
            .store
            .list_agents(organization_id)
            .await?
            .iter()
            .any(|a| a.agent_type_id == type_id);
        if in_use {
            return Err(RuntimeError::ProtectedResource(format!(
                "agent type '{}' is still used by an agent",
                agent_type.name
            )));
        }

        self.store.delete_agent_type(organization_id, type_id).await?;
        self.audit
            .record(
                AuditEntry::new(
                    organization_id,
                    Principal::User(user_id),
                    "agent_type.deleted",
                    "agent_type",
                    type_id,
                )
                .with_old_values(json!({ "name": agent_type.name, "skills": agent_type.skills })),
            )
            .await;
        Ok(())
    }

    async fn require_manager(&self, organization_id: OrganizationId, user_id: UserId) -> RuntimeResult<MemberRole> {
        match self.store.member_role(organization_id, user_id).await? {
            Some(role) if role.can_manage_agents() => Ok(role),
            _ => Err(RuntimeError::forbidden("only owners and admins can manage agents")),
        }
    }

    async fn load_agent(&self, organization_id: OrganizationId, agent_id: AgentId) -> RuntimeResult<Agent> {
        self.store
            .get_agent(organization_id, agent_id)
            .await?
            .ok_or_else(|| RuntimeError::AgentNotFound(agent_id.to_string()))
    }

    async fn load_agent_type(&self, organization_id: OrganizationId, type_id: AgentTypeId) -> RuntimeResult<AgentType> {
        self.store
            .get_agent_type(organization_id, type_id)
            .await?
            .ok_or_else(|| RuntimeError::AgentTypeNotFound(type_id.to_string()))
    }
}

/// Skills must be catalogued; order is kept and duplicates dropped
fn validate_skills(skills: &[String]) -> RuntimeResult<Vec<String>> {
    if skills.is_empty() {
        return Err(RuntimeError::validation("an agent type needs at least one skill"));
    }
    if let Some(unknown) = skills.iter().find(|s| !is_known_skill(s)) {
        return Err(RuntimeError::validation(format!("unknown skill '{}'", unknown)));
    }
    let mut unique: Vec<String> = Vec::with_capacity(skills.len());
    for skill in skills {
        if !unique.contains(skill) {
            unique.push(skill.clone());
        }
    }
    Ok(unique)
}
