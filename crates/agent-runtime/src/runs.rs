use chrono::Utc;
use grc_common::{AgentId, AgentStatus, OrganizationId, Principal, UserId};
use grc_storage::GrcStore;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument};
use utoipa::ToSchema;

use crate::error::{RuntimeError, RuntimeResult};
use crate::executor::{AgentRunner, RunOutcome};
use crate::usage::{UsageGate, UsageStatus};

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ManualRunResult {
    pub outcome: RunOutcome,
    pub usage: UsageStatus,
}

/// User-triggered runs: permission, agent state and usage checks around the executor
#[derive(Clone)]
pub struct RunService {
    store: Arc<dyn GrcStore>,
    runner: AgentRunner,
    usage: UsageGate,
}

impl RunService {
    pub fn new(store: Arc<dyn GrcStore>, runner: AgentRunner, usage: UsageGate) -> Self {
        Self {
            store,
            runner,
            usage,
        }
    }

    #[instrument(skip(self))]
    pub async fn trigger_manual_run(
        &self,
        agent_id: AgentId,
        organization_id: OrganizationId,
        user_id: UserId,
    ) -> RuntimeResult<ManualRunResult> {
        let role = self.store.member_role(organization_id, user_id).await?;
        if !role.map(|r| r.can_run_agents()).unwrap_or(false) {
            return Err(RuntimeError::forbidden("viewers cannot run agents"));
        }

        let agent = self
            .store
            .get_agent(organization_id, agent_id)
            .await?
            .ok_or_else(|| RuntimeError::AgentNotFound(agent_id.to_string()))?;
        if agent.status != AgentStatus::Active {
            return Err(RuntimeError::AgentNotRunnable {
                agent_id: agent_id.to_string(),
                status: agent.status.to_string(),
            });
        }

        let usage = self.usage.check_usage(organization_id, Utc::now()).await?;
        if !usage.allowed {
            return Err(RuntimeError::UsageDenied {
                reason: usage.reason.unwrap_or_else(|| "usage limit reached".to_string()),
            });
        }

        let outcome = self
            .runner
            .run_agent(agent_id, organization_id, Principal::User(user_id))
            .await?;

        // Failed runs are not billed
        if outcome.is_success() {
            self.usage.increment_usage(organization_id, Utc::now()).await?;
        } else {
            info!("Run {} ended with an error; usage not counted", outcome.run_id);
        }

        let usage = self.usage.check_usage(organization_id, Utc::now()).await?;
        Ok(ManualRunResult { outcome, usage })
    }
}
