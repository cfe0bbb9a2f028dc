//! Approve or decline pending write tasks.

use chrono::{DateTime, Utc};
use grc_common::{
    find_framework, AgentTask, AuditEntry, Incident, OrganizationId, Policy, Principal, RecordKind,
    RequirementEntry, RequirementStatus, Risk, TaskId, TaskStatus, UserId,
};
use grc_storage::GrcStore;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use super::audit::AuditLogger;
use super::write_action::{
    IncidentProposal, PolicyProposal, RequirementUpdate, RiskProposal, WriteAction,
};
use crate::error::{RuntimeError, RuntimeResult};

const INITIAL_RISK_STATUS: &str = "identified";
const INITIAL_INCIDENT_STATUS: &str = "open";
const INITIAL_POLICY_STATUS: &str = "draft";
const INITIAL_POLICY_VERSION: &str = "1.0";

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ApprovalOutcome {
    pub task: AgentTask,
    /// Reference to the record the approved write produced
    #[schema(value_type = Object)]
    pub created: Value,
}

#[derive(Clone)]
pub struct ApprovalService {
    store: Arc<dyn GrcStore>,
    audit: AuditLogger,
}

impl ApprovalService {
    pub fn new(store: Arc<dyn GrcStore>, audit: AuditLogger) -> Self {
        Self { store, audit }
    }

    /// Execute the deferred write of a pending task.
    ///
    /// The task is claimed (`pending_approval` to `approved`) before the write
    /// runs, so a decision executes at most once even under concurrent
    /// approvals. Execution failures move the claimed task to `failed` and are
    /// reported as [`RuntimeError::ExecutionFailed`].
    #[instrument(skip(self), fields(task_id = %task_id))]
    pub async fn approve(
        &self,
        task_id: TaskId,
        approver: UserId,
        organization_id: OrganizationId,
    ) -> RuntimeResult<ApprovalOutcome> {
        let mut task = self
            .load_pending(task_id, approver, organization_id, TaskStatus::Approved)
            .await?;
        let now = Utc::now();
        task.status = TaskStatus::Approved;
        task.approved_by = Some(approver);
        task.approved_at = Some(now);
        task.updated_at = now;
        self.claim(&task).await?;

        let executed = match WriteAction::decode(&task.skill_used, &task.result) {
            Ok(action) => self.execute(action, organization_id, approver, now).await,
            Err(e) => Err(e.to_string()),
        };

        match executed {
            Ok(created) => {
                task.result = with_created(task.result.take(), created.clone());
                task.updated_at = Utc::now();
                self.store_outcome(&task).await;

                info!(skill = %task.skill_used, "Approved task {}", task.task_id);
                self.audit
                    .record(
                        AuditEntry::new(
                            organization_id,
                            Principal::User(approver),
                            "agent_task.approved",
                            "agent_task",
                            &task.task_id,
                        )
                        .with_old_values(json!({ "status": TaskStatus::PendingApproval }))
                        .with_new_values(json!({
                            "status": TaskStatus::Approved,
                            "skill_used": task.skill_used,
                            "created": created,
                        })),
                    )
                    .await;

                Ok(ApprovalOutcome { task, created })
            }
            Err(reason) => {
                task.status = TaskStatus::Failed;
                task.error_message = Some(reason.clone());
                task.updated_at = Utc::now();
                self.store_outcome(&task).await;

                warn!(skill = %task.skill_used, "Approved task {} failed to execute: {}", task.task_id, reason);
                self.audit
                    .record(
                        AuditEntry::new(
                            organization_id,
                            Principal::User(approver),
                            "agent_task.approval_failed",
                            "agent_task",
                            &task.task_id,
                        )
                        .with_old_values(json!({ "status": TaskStatus::PendingApproval }))
                        .with_new_values(json!({
                            "status": TaskStatus::Failed,
                            "skill_used": task.skill_used,
                            "error": reason,
                        })),
                    )
                    .await;

                Err(RuntimeError::execution_failed(task.task_id, reason))
            }
        }
    }

    /// Reject a pending task; nothing outside the task row changes
    #[instrument(skip(self), fields(task_id = %task_id))]
    pub async fn decline(
        &self,
        task_id: TaskId,
        approver: UserId,
        organization_id: OrganizationId,
    ) -> RuntimeResult<AgentTask> {
        let mut task = self
            .load_pending(task_id, approver, organization_id, TaskStatus::Declined)
            .await?;
        let now = Utc::now();

        task.status = TaskStatus::Declined;
        task.approved_by = Some(approver);
        task.approved_at = Some(now);
        task.updated_at = now;
        self.claim(&task).await?;

        info!(skill = %task.skill_used, "Declined task {}", task.task_id);
        self.audit
            .record(
                AuditEntry::new(
                    organization_id,
                    Principal::User(approver),
                    "agent_task.declined",
                    "agent_task",
                    &task.task_id,
                )
                .with_old_values(json!({ "status": TaskStatus::PendingApproval }))
                .with_new_values(json!({
                    "status": TaskStatus::Declined,
                    "skill_used": task.skill_used,
                })),
            )
            .await;

        Ok(task)
    }

    /// Move a pending task to its decided status, failing if another
    /// approver decided it first
    async fn claim(&self, task: &AgentTask) -> RuntimeResult<()> {
        if self
            .store
            .transition_task(task, TaskStatus::PendingApproval)
            .await?
        {
            return Ok(());
        }
        let current = self
            .store
            .get_task(task.id)
            .await?
            .map(|t| t.status)
            .ok_or_else(|| RuntimeError::TaskNotFound(task.id.to_string()))?;
        debug!("Task {} already decided as {}", task.task_id, current);
        Err(RuntimeError::InvalidStateTransition {
            from: current,
            to: task.status,
        })
    }

    /// Record the result of an executed decision. The task is already claimed
    /// and the write has happened, so a failure here is logged, not returned.
    async fn store_outcome(&self, task: &AgentTask) {
        if let Err(e) = self.store.update_task(task).await {
            error!(
                "Failed to store outcome of task {} ({}): {}",
                task.task_id, task.status, e
            );
        }
    }

    async fn load_pending(
        &self,
        task_id: TaskId,
        approver: UserId,
        organization_id: OrganizationId,
        target: TaskStatus,
    ) -> RuntimeResult<AgentTask> {
        let role = self.store.member_role(organization_id, approver).await?;
        if !role.map(|r| r.can_approve()).unwrap_or(false) {
            return Err(RuntimeError::forbidden(
                "only owners and admins can review agent tasks",
            ));
        }

        // A task from another tenant is reported exactly like a missing one
        let task = self
            .store
            .get_task(task_id)
            .await?
            .filter(|t| t.organization_id == organization_id)
            .ok_or_else(|| RuntimeError::TaskNotFound(task_id.to_string()))?;

        if !task.status.can_transition_to(target) {
            return Err(RuntimeError::InvalidStateTransition {
                from: task.status,
                to: target,
            });
        }
        Ok(task)
    }

    async fn execute(
        &self,
        action: WriteAction,
        organization_id: OrganizationId,
        approver: UserId,
        now: DateTime<Utc>,
    ) -> Result<Value, String> {
        let result = match action {
            WriteAction::CreateRisk(p) => self.create_risk(p, organization_id, approver, now).await,
            WriteAction::CreateIncident(p) => {
                self.create_incident(p, organization_id, approver, now).await
            }
            WriteAction::CreatePolicy(p) => self.create_policy(p, organization_id, approver, now).await,
            WriteAction::UpdateRequirement(p) => {
                self.update_requirement(p, organization_id, approver, now).await
            }
        };
        result.map_err(|e| e.to_string())
    }

    async fn next_identifier(&self, organization_id: OrganizationId, kind: RecordKind) -> RuntimeResult<String> {
        let count = self.store.count_records(organization_id, kind).await?;
        Ok(kind.identifier(count + 1))
    }

    async fn create_risk(
        &self,
        proposal: RiskProposal,
        organization_id: OrganizationId,
        approver: UserId,
        now: DateTime<Utc>,
    ) -> RuntimeResult<Value> {
        let risk = Risk {
            id: Uuid::new_v4(),
            organization_id,
            risk_id: self.next_identifier(organization_id, RecordKind::Risk).await?,
            title: proposal.title,
            description: proposal.description,
            category: proposal.category,
            likelihood: proposal.likelihood,
            impact: proposal.impact,
            inherent_score: proposal.likelihood * proposal.impact,
            residual_score: None,
            status: INITIAL_RISK_STATUS.to_string(),
            owner: proposal.owner,
            created_by: Some(approver),
            created_at: now,
        };
        self.store.insert_risk(&risk).await?;

        Ok(json!({
            "type": "risk",
            "id": risk.id,
            "risk_id": risk.risk_id,
            "inherent_score": risk.inherent_score,
        }))
    }

    async fn create_incident(
        &self,
        proposal: IncidentProposal,
        organization_id: OrganizationId,
        approver: UserId,
        now: DateTime<Utc>,
    ) -> RuntimeResult<Value> {
        let incident = Incident {
            id: Uuid::new_v4(),
            organization_id,
            incident_id: self.next_identifier(organization_id, RecordKind::Incident).await?,
            title: proposal.title,
            description: proposal.description,
            severity: proposal.severity,
            status: INITIAL_INCIDENT_STATUS.to_string(),
            detected_at: now,
            created_by: Some(approver),
            created_at: now,
        };
        self.store.insert_incident(&incident).await?;

        Ok(json!({
            "type": "incident",
            "id": incident.id,
            "incident_id": incident.incident_id,
            "severity": incident.severity,
        }))
    }

    async fn create_policy(
        &self,
        proposal: PolicyProposal,
        organization_id: OrganizationId,
        approver: UserId,
        now: DateTime<Utc>,
    ) -> RuntimeResult<Value> {
        let policy = Policy {
            id: Uuid::new_v4(),
            organization_id,
            policy_id: self.next_identifier(organization_id, RecordKind::Policy).await?,
            title: proposal.title,
            description: proposal.description,
            category: proposal.category,
            content: proposal.content,
            status: INITIAL_POLICY_STATUS.to_string(),
            version: INITIAL_POLICY_VERSION.to_string(),
            created_by: Some(approver),
            created_at: now,
        };
        self.store.insert_policy(&policy).await?;

        Ok(json!({
            "type": "policy",
            "id": policy.id,
            "policy_id": policy.policy_id,
        }))
    }

    async fn update_requirement(
        &self,
        update: RequirementUpdate,
        organization_id: OrganizationId,
        approver: UserId,
        now: DateTime<Utc>,
    ) -> RuntimeResult<Value> {
        let framework = find_framework(&update.framework)
            .ok_or_else(|| RuntimeError::validation(format!("unknown framework '{}'", update.framework)))?;
        let requirement = framework.requirement(&update.requirement_code).ok_or_else(|| {
            RuntimeError::validation(format!(
                "unknown requirement '{}' for framework '{}'",
                update.requirement_code, framework.code
            ))
        })?;
        let status = RequirementStatus::parse_known(&update.status)
            .ok_or_else(|| RuntimeError::validation(format!("unknown requirement status '{}'", update.status)))?;

        let entry = RequirementEntry {
            status: status.clone(),
            notes: update.notes,
            updated_at: Some(now),
            updated_by: Some(approver),
        };
        let previous = self
            .store
            .set_requirement_status(organization_id, framework.code, requirement.code, &entry)
            .await?;

        Ok(json!({
            "type": "requirement",
            "framework": framework.code,
            "requirement_code": requirement.code,
            "status": status,
            "previous_status": previous
                .map(|p| p.status)
                .unwrap_or(RequirementStatus::NotStarted),
        }))
    }
}

fn with_created(result: Value, created: Value) -> Value {
    match result {
        Value::Object(mut map) => {
            map.insert("created".to_string(), created);
            Value::Object(map)
        }
        other => json!({ "input": other, "created": created }),
    }
}
