use chrono::{DateTime, Utc};
use grc_common::{AgentId, OrganizationId, Principal};
use grc_storage::GrcStore;
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use utoipa::ToSchema;

use crate::error::RuntimeResult;
use crate::executor::{AgentRunner, RunOutcome};
use crate::schedule::ScheduleExt;

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ScheduledRun {
    pub agent_id: AgentId,
    pub organization_id: OrganizationId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<RunOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SchedulerReport {
    pub checked_at: DateTime<Utc>,
    pub agents_run: usize,
    pub results: Vec<ScheduledRun>,
}

/// Sweeps due agents. Scheduled runs bypass the usage gate.
#[derive(Clone)]
pub struct Scheduler {
    store: Arc<dyn GrcStore>,
    runner: AgentRunner,
}

impl Scheduler {
    pub fn new(store: Arc<dyn GrcStore>, runner: AgentRunner) -> Self {
        Self { store, runner }
    }

    /// Run every due agent, one after another
    #[instrument(skip(self))]
    pub async fn run_due_agents(&self, now: DateTime<Utc>) -> RuntimeResult<SchedulerReport> {
        let due = self.store.list_due_agents(now).await?;
        info!("Scheduler found {} due agents", due.len());

        let mut results = Vec::with_capacity(due.len());
        for agent in due {
            let result = match self
                .runner
                .run_agent(agent.id, agent.organization_id, Principal::Scheduler)
                .await
            {
                Ok(outcome) => ScheduledRun {
                    agent_id: agent.id,
                    organization_id: agent.organization_id,
                    error: outcome.error.clone(),
                    outcome: Some(outcome),
                },
                Err(e) => {
                    warn!("Scheduled run for agent {} failed: {}", agent.id, e);
                    // Move past this slot so a broken agent is retried on its
                    // next occurrence instead of on every sweep
                    let next_run_at = agent.schedule.next_run(now);
                    if let Err(advance) = self
                        .store
                        .update_agent_status(agent.organization_id, agent.id, agent.status, next_run_at)
                        .await
                    {
                        error!("Failed to advance schedule of agent {}: {}", agent.id, advance);
                    }
                    ScheduledRun {
                        agent_id: agent.id,
                        organization_id: agent.organization_id,
                        outcome: None,
                        error: Some(e.to_string()),
                    }
                }
            };
            results.push(result);
        }

        Ok(SchedulerReport {
            checked_at: now,
            agents_run: results.len(),
            results,
        })
    }
}
