//! In-process store used by tests and `--memory` development runs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use grc_common::{
    Agent, AgentId, AgentStatus, AgentTask, AgentType, AgentTypeId, AuditEntry, GrcError,
    Incident, MemberRole, OrganizationId, OrganizationSettings, Policy, RecordKind,
    RequirementEntry, Result, Risk, Schedule, Subscription, TaskFilter, TaskId, TaskStatus, UserId,
};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::GrcStore;

#[derive(Default)]
struct Tables {
    agents: HashMap<AgentId, Agent>,
    agent_types: HashMap<AgentTypeId, AgentType>,
    tasks: Vec<AgentTask>,
    risks: Vec<Risk>,
    incidents: Vec<Incident>,
    policies: Vec<Policy>,
    settings: HashMap<OrganizationId, OrganizationSettings>,
    subscriptions: HashMap<OrganizationId, Subscription>,
    members: HashMap<(OrganizationId, UserId), MemberRole>,
    audit: Vec<AuditEntry>,
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<RwLock<Tables>>,
    failing: Arc<RwLock<HashSet<String>>>,
    conflicts: Arc<RwLock<HashMap<String, usize>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_member(&self, org: OrganizationId, user: UserId, role: MemberRole) {
        self.tables.write().await.members.insert((org, user), role);
    }

    /// Make every subsequent call to `operation` fail with a database error
    pub async fn inject_failure(&self, operation: &str) {
        self.failing.write().await.insert(operation.to_string());
    }

    /// Make the next `times` calls to `operation` fail with a conflict
    pub async fn inject_conflict(&self, operation: &str, times: usize) {
        self.conflicts.write().await.insert(operation.to_string(), times);
    }

    pub async fn clear_failures(&self) {
        self.failing.write().await.clear();
        self.conflicts.write().await.clear();
    }

    pub async fn risks(&self, org: OrganizationId) -> Vec<Risk> {
        let tables = self.tables.read().await;
        tables.risks.iter().filter(|r| r.organization_id == org).cloned().collect()
    }

    pub async fn incidents(&self, org: OrganizationId) -> Vec<Incident> {
        let tables = self.tables.read().await;
        tables.incidents.iter().filter(|i| i.organization_id == org).cloned().collect()
    }

    pub async fn policies(&self, org: OrganizationId) -> Vec<Policy> {
        let tables = self.tables.read().await;
        tables.policies.iter().filter(|p| p.organization_id == org).cloned().collect()
    }

    async fn check(&self, operation: &str) -> Result<()> {
        if self.failing.read().await.contains(operation) {
            return Err(GrcError::Database(format!("injected failure in {}", operation)));
        }
        if let Some(remaining) = self.conflicts.write().await.get_mut(operation) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(GrcError::Conflict(format!("injected conflict in {}", operation)));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl GrcStore for MemoryStore {
    async fn get_agent(&self, org: OrganizationId, id: AgentId) -> Result<Option<Agent>> {
        self.check("get_agent").await?;
        let tables = self.tables.read().await;
        Ok(tables
            .agents
            .get(&id)
            .filter(|a| a.organization_id == org)
            .cloned())
    }

    async fn list_agents(&self, org: OrganizationId) -> Result<Vec<Agent>> {
        self.check("list_agents").await?;
        let tables = self.tables.read().await;
        let mut agents: Vec<Agent> = tables
            .agents
            .values()
            .filter(|a| a.organization_id == org && a.status != AgentStatus::Deleted)
            .cloned()
            .collect();
        agents.sort_by_key(|a| a.created_at);
        Ok(agents)
    }

    async fn insert_agent(&self, agent: &Agent) -> Result<()> {
        self.check("insert_agent").await?;
        let mut tables = self.tables.write().await;
        if tables.agents.contains_key(&agent.id) {
            return Err(GrcError::Conflict(format!("agent {} already exists", agent.id)));
        }
        tables.agents.insert(agent.id, agent.clone());
        Ok(())
    }

    async fn update_agent_status(
        &self,
        org: OrganizationId,
        id: AgentId,
        status: AgentStatus,
        next_run_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        self.check("update_agent_status").await?;
        let mut tables = self.tables.write().await;
        let agent = tables
            .agents
            .get_mut(&id)
            .filter(|a| a.organization_id == org)
            .ok_or_else(|| GrcError::not_found("agent", id))?;
        agent.status = status;
        agent.next_run_at = next_run_at;
        Ok(())
    }

    async fn record_agent_run(
        &self,
        id: AgentId,
        last_run_at: DateTime<Utc>,
        next_run_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        self.check("record_agent_run").await?;
        let mut tables = self.tables.write().await;
        let agent = tables
            .agents
            .get_mut(&id)
            .ok_or_else(|| GrcError::not_found("agent", id))?;
        agent.last_run_at = Some(last_run_at);
        agent.next_run_at = next_run_at;
        Ok(())
    }

    async fn list_due_agents(&self, now: DateTime<Utc>) -> Result<Vec<Agent>> {
        self.check("list_due_agents").await?;
        let tables = self.tables.read().await;
        let mut due: Vec<Agent> = tables
            .agents
            .values()
            .filter(|a| {
                a.status == AgentStatus::Active
                    && a.schedule != Schedule::Manual
                    && a.next_run_at.map(|at| at <= now).unwrap_or(false)
            })
            .cloned()
            .collect();
        due.sort_by_key(|a| a.next_run_at);
        Ok(due)
    }

    async fn get_agent_type(
        &self,
        org: OrganizationId,
        id: AgentTypeId,
    ) -> Result<Option<AgentType>> {
        self.check("get_agent_type").await?;
        let tables = self.tables.read().await;
        Ok(tables
            .agent_types
            .get(&id)
            .filter(|t| t.organization_id == org)
            .cloned())
    }

    async fn list_agent_types(&self, org: OrganizationId) -> Result<Vec<AgentType>> {
        self.check("list_agent_types").await?;
        let tables = self.tables.read().await;
        let mut types: Vec<AgentType> = tables
            .agent_types
            .values()
            .filter(|t| t.organization_id == org)
            .cloned()
            .collect();
        types.sort_by_key(|t| (!t.is_default, t.created_at));
        Ok(types)
    }

    async fn insert_agent_type(&self, agent_type: &AgentType) -> Result<()> {
        self.check("insert_agent_type").await?;
        let mut tables = self.tables.write().await;
        if agent_type.is_default
            && tables
                .agent_types
                .values()
                .any(|t| t.organization_id == agent_type.organization_id && t.is_default)
        {
            return Err(GrcError::Conflict(
                "organization already has a default agent type".to_string(),
            ));
        }
        tables.agent_types.insert(agent_type.id, agent_type.clone());
        Ok(())
    }

    async fn update_agent_type_skills(
        &self,
        org: OrganizationId,
        id: AgentTypeId,
        skills: &[String],
    ) -> Result<()> {
        self.check("update_agent_type_skills").await?;
        let mut tables = self.tables.write().await;
        let agent_type = tables
            .agent_types
            .get_mut(&id)
            .filter(|t| t.organization_id == org)
            .ok_or_else(|| GrcError::not_found("agent_type", id))?;
        agent_type.skills = skills.to_vec();
        Ok(())
    }

    async fn delete_agent_type(&self, org: OrganizationId, id: AgentTypeId) -> Result<()> {
        self.check("delete_agent_type").await?;
        let mut tables = self.tables.write().await;
        match tables.agent_types.get(&id) {
            Some(t) if t.organization_id == org => {
                tables.agent_types.remove(&id);
                Ok(())
            }
            _ => Err(GrcError::not_found("agent_type", id)),
        }
    }

    async fn insert_task(&self, task: &AgentTask) -> Result<()> {
        self.check("insert_task").await?;
        let mut tables = self.tables.write().await;
        if tables.tasks.iter().any(|t| {
            t.id == task.id
                || (t.organization_id == task.organization_id && t.task_id == task.task_id)
        }) {
            return Err(GrcError::Conflict(format!("task {} already exists", task.task_id)));
        }
        tables.tasks.push(task.clone());
        Ok(())
    }

    async fn get_task(&self, id: TaskId) -> Result<Option<AgentTask>> {
        self.check("get_task").await?;
        let tables = self.tables.read().await;
        Ok(tables.tasks.iter().find(|t| t.id == id).cloned())
    }

    async fn update_task(&self, task: &AgentTask) -> Result<()> {
        self.check("update_task").await?;
        let mut tables = self.tables.write().await;
        let existing = tables
            .tasks
            .iter_mut()
            .find(|t| t.id == task.id)
            .ok_or_else(|| GrcError::not_found("agent_task", task.id))?;
        *existing = task.clone();
        Ok(())
    }

    async fn transition_task(&self, task: &AgentTask, from: TaskStatus) -> Result<bool> {
        self.check("transition_task").await?;
        let mut tables = self.tables.write().await;
        let existing = tables
            .tasks
            .iter_mut()
            .find(|t| t.id == task.id)
            .ok_or_else(|| GrcError::not_found("agent_task", task.id))?;
        if existing.status != from {
            return Ok(false);
        }
        *existing = task.clone();
        Ok(true)
    }

    async fn list_tasks(&self, org: OrganizationId, filter: &TaskFilter) -> Result<Vec<AgentTask>> {
        self.check("list_tasks").await?;
        let tables = self.tables.read().await;
        let mut tasks: Vec<AgentTask> = tables
            .tasks
            .iter()
            .filter(|t| t.organization_id == org)
            .filter(|t| filter.status.map_or(true, |s| t.status == s))
            .filter(|t| filter.run_id.map_or(true, |r| t.run_id == r))
            .filter(|t| filter.agent_id.map_or(true, |a| t.agent_id == a))
            .cloned()
            .collect();
        // Newest first; insertion order breaks ties within one run
        tasks.reverse();
        tasks.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        if let Some(limit) = filter.limit {
            tasks.truncate(limit);
        }
        Ok(tasks)
    }

    async fn list_recent_risks(&self, org: OrganizationId, limit: usize) -> Result<Vec<Risk>> {
        self.check("list_recent_risks").await?;
        let tables = self.tables.read().await;
        let mut risks: Vec<Risk> = tables
            .risks
            .iter()
            .filter(|r| r.organization_id == org)
            .cloned()
            .collect();
        risks.reverse();
        risks.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        risks.truncate(limit);
        Ok(risks)
    }

    async fn count_records(&self, org: OrganizationId, kind: RecordKind) -> Result<u64> {
        self.check("count_records").await?;
        let tables = self.tables.read().await;
        let count = match kind {
            RecordKind::Risk => tables.risks.iter().filter(|r| r.organization_id == org).count(),
            RecordKind::Incident => tables
                .incidents
                .iter()
                .filter(|i| i.organization_id == org)
                .count(),
            RecordKind::Policy => tables
                .policies
                .iter()
                .filter(|p| p.organization_id == org)
                .count(),
        };
        Ok(count as u64)
    }

    async fn insert_risk(&self, risk: &Risk) -> Result<()> {
        self.check("insert_risk").await?;
        self.tables.write().await.risks.push(risk.clone());
        Ok(())
    }

    async fn insert_incident(&self, incident: &Incident) -> Result<()> {
        self.check("insert_incident").await?;
        self.tables.write().await.incidents.push(incident.clone());
        Ok(())
    }

    async fn insert_policy(&self, policy: &Policy) -> Result<()> {
        self.check("insert_policy").await?;
        self.tables.write().await.policies.push(policy.clone());
        Ok(())
    }

    async fn get_settings(&self, org: OrganizationId) -> Result<OrganizationSettings> {
        self.check("get_settings").await?;
        let tables = self.tables.read().await;
        Ok(tables.settings.get(&org).cloned().unwrap_or_default())
    }

    async fn save_settings(
        &self,
        org: OrganizationId,
        settings: &OrganizationSettings,
    ) -> Result<()> {
        self.check("save_settings").await?;
        self.tables.write().await.settings.insert(org, settings.clone());
        Ok(())
    }

    async fn increment_agent_run_count(
        &self,
        org: OrganizationId,
        now: DateTime<Utc>,
    ) -> Result<OrganizationSettings> {
        self.check("increment_agent_run_count").await?;
        let mut tables = self.tables.write().await;
        let settings = tables.settings.entry(org).or_default();
        settings.agent_run_count += 1;
        if settings.agent_trial_started_at.is_none() {
            settings.agent_trial_started_at = Some(now);
        }
        Ok(settings.clone())
    }

    async fn apply_credit_purchase(
        &self,
        org: OrganizationId,
        purchase_id: &str,
        credits: u64,
    ) -> Result<Option<OrganizationSettings>> {
        self.check("apply_credit_purchase").await?;
        let mut tables = self.tables.write().await;
        let settings = tables.settings.entry(org).or_default();
        if !settings.record_credit_purchase(purchase_id, credits) {
            return Ok(None);
        }
        Ok(Some(settings.clone()))
    }

    async fn set_requirement_status(
        &self,
        org: OrganizationId,
        framework: &str,
        requirement: &str,
        entry: &RequirementEntry,
    ) -> Result<Option<RequirementEntry>> {
        self.check("set_requirement_status").await?;
        let mut tables = self.tables.write().await;
        let settings = tables.settings.entry(org).or_default();
        let previous = settings.set_requirement(framework, requirement, entry.clone());
        settings.activate_framework(framework);
        Ok(previous)
    }

    async fn get_subscription(&self, org: OrganizationId) -> Result<Option<Subscription>> {
        self.check("get_subscription").await?;
        Ok(self.tables.read().await.subscriptions.get(&org).cloned())
    }

    async fn upsert_subscription(&self, subscription: &Subscription) -> Result<()> {
        self.check("upsert_subscription").await?;
        self.tables
            .write()
            .await
            .subscriptions
            .insert(subscription.organization_id, subscription.clone());
        Ok(())
    }

    async fn member_role(&self, org: OrganizationId, user: UserId) -> Result<Option<MemberRole>> {
        self.check("member_role").await?;
        Ok(self.tables.read().await.members.get(&(org, user)).copied())
    }

    async fn insert_audit(&self, entry: &AuditEntry) -> Result<()> {
        self.check("insert_audit").await?;
        self.tables.write().await.audit.push(entry.clone());
        Ok(())
    }

    async fn list_audit(&self, org: OrganizationId, limit: usize) -> Result<Vec<AuditEntry>> {
        self.check("list_audit").await?;
        let tables = self.tables.read().await;
        Ok(tables
            .audit
            .iter()
            .rev()
            .filter(|e| e.organization_id == org)
            .take(limit)
            .cloned()
            .collect())
    }
}
