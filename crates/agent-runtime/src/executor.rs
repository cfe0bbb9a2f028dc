//! Agent executor: one bounded tool-calling run.

use chrono::{DateTime, Utc};
use grc_common::{
    ActionType, Agent, AgentId, AgentTask, AgentType, AuditEntry, GrcError, OrganizationId,
    Principal, RunId, TaskId, TaskStatus,
};
use grc_storage::GrcStore;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};
use utoipa::ToSchema;

use crate::error::{RuntimeError, RuntimeResult};
use crate::hitl::AuditLogger;
use crate::llm::{CompletionRequest, ContentBlock, LlmClient, Message, Role};
use crate::schedule::ScheduleExt;
use crate::skills::{find_skill, is_write_skill};
use crate::tools::{build_tools, SkillRegistry};

pub const MAX_LLM_ROUNDS: usize = 3;
pub const MAX_TOOL_CALLS_PER_RUN: usize = 5;

pub const SKILL_NOT_PERMITTED: &str = "skill not permitted";

/// Fresh references drawn when a task reference collides inside the organization
const TASK_INSERT_ATTEMPTS: usize = 3;

const KICKOFF_MESSAGE: &str = "Start your run now. Review the organization's governance, risk and \
     compliance posture with your skills and take the actions your mission calls for. Finish with \
     a short summary of what you did.";

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct RunOutcome {
    pub run_id: RunId,
    pub agent_id: AgentId,
    pub tasks_created: usize,
    pub write_tasks_created: usize,
    pub read_tasks_completed: usize,
    pub read_tasks_failed: usize,
    /// Calls for skills outside the agent's grant; never queued or executed
    pub rejected_tool_calls: usize,
    /// Set when the run stopped early; tasks persisted before that are kept
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RunOutcome {
    fn new(run_id: RunId, agent_id: AgentId) -> Self {
        Self {
            run_id,
            agent_id,
            tasks_created: 0,
            write_tasks_created: 0,
            read_tasks_completed: 0,
            read_tasks_failed: 0,
            rejected_tool_calls: 0,
            error: None,
        }
    }

    fn count(&mut self, task: &AgentTask) {
        self.tasks_created += 1;
        if task.error_message.as_deref() == Some(SKILL_NOT_PERMITTED) {
            self.rejected_tool_calls += 1;
            return;
        }
        match (task.action_type, task.status) {
            (ActionType::Write, _) => self.write_tasks_created += 1,
            (ActionType::Read, TaskStatus::Completed) => self.read_tasks_completed += 1,
            (ActionType::Read, _) => self.read_tasks_failed += 1,
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Everything one run needs, resolved before the first LLM call
struct RunContext<'a> {
    agent: &'a Agent,
    run_id: RunId,
    granted: HashSet<&'a str>,
}

#[derive(Clone)]
pub struct AgentRunner {
    store: Arc<dyn GrcStore>,
    llm: Arc<dyn LlmClient>,
    skills: SkillRegistry,
    audit: AuditLogger,
}

impl AgentRunner {
    pub fn new(
        store: Arc<dyn GrcStore>,
        llm: Arc<dyn LlmClient>,
        skills: SkillRegistry,
        audit: AuditLogger,
    ) -> Self {
        Self {
            store,
            llm,
            skills,
            audit,
        }
    }

    /// Run one agent to completion or to the round cap.
    ///
    /// Missing agent, missing type or an empty skill set fail before anything
    /// is persisted. Once the loop starts, provider and store failures end the
    /// run and are reported in [`RunOutcome::error`].
    #[instrument(name = "agent_run", skip(self), fields(run_id = tracing::field::Empty))]
    pub async fn run_agent(
        &self,
        agent_id: AgentId,
        organization_id: OrganizationId,
        principal: Principal,
    ) -> RuntimeResult<RunOutcome> {
        let agent = self
            .store
            .get_agent(organization_id, agent_id)
            .await?
            .ok_or_else(|| RuntimeError::AgentNotFound(agent_id.to_string()))?;
        let agent_type = self
            .store
            .get_agent_type(organization_id, agent.agent_type_id)
            .await?
            .ok_or_else(|| RuntimeError::AgentTypeNotFound(agent.agent_type_id.to_string()))?;
        if agent_type.skills.is_empty() {
            return Err(RuntimeError::EmptySkillSet(agent_type.name.clone()));
        }

        let run_id = RunId::new();
        tracing::Span::current().record("run_id", tracing::field::display(run_id));
        info!(agent = %agent.name, %principal, "Starting agent run");

        let ctx = RunContext {
            agent: &agent,
            run_id,
            granted: agent_type.skills.iter().map(String::as_str).collect(),
        };
        let mut outcome = RunOutcome::new(run_id, agent.id);

        if let Err(e) = self.run_loop(&ctx, &agent_type, &mut outcome).await {
            error!("Agent run {} stopped: {}", run_id, e);
            outcome.error = Some(e.to_string());
        }

        let finished_at = Utc::now();
        let next_run_at = agent.schedule.next_run(finished_at);
        if let Err(e) = self
            .store
            .record_agent_run(agent.id, finished_at, next_run_at)
            .await
        {
            error!("Failed to record run for agent {}: {}", agent.id, e);
            outcome.error.get_or_insert_with(|| e.to_string());
        }

        self.audit_run(&agent, principal, &outcome, next_run_at).await;
        info!(
            tasks = outcome.tasks_created,
            writes = outcome.write_tasks_created,
            failed = outcome.error.is_some(),
            "Agent run finished"
        );
        Ok(outcome)
    }

    async fn run_loop(
        &self,
        ctx: &RunContext<'_>,
        agent_type: &AgentType,
        outcome: &mut RunOutcome,
    ) -> RuntimeResult<()> {
        let mut request = CompletionRequest {
            system: build_system_prompt(ctx.agent, agent_type),
            messages: vec![Message::user_text(KICKOFF_MESSAGE)],
            tools: build_tools(&agent_type.skills),
        };

        for round in 0..MAX_LLM_ROUNDS {
            debug!(target: "agent_execution", "LLM round {}/{} for run {}", round + 1, MAX_LLM_ROUNDS, ctx.run_id);

            let response = self
                .llm
                .complete(&request)
                .await
                .map_err(|e| RuntimeError::Llm(format!("{:#}", e)))?;

            request.messages.push(Message {
                role: Role::Assistant,
                content: response
                    .content
                    .iter()
                    .filter(|b| !matches!(b, ContentBlock::Unsupported))
                    .cloned()
                    .collect(),
            });

            let calls = response.tool_calls();
            if !response.wants_tools() || calls.is_empty() {
                debug!(target: "agent_execution", "Run {} finished after {} rounds", ctx.run_id, round + 1);
                break;
            }

            let mut results = Vec::with_capacity(calls.len());
            for (tool_use_id, name, input) in calls {
                let mut task = self.dispatch(ctx, name, input).await;
                self.persist_task(&mut task).await?;
                outcome.count(&task);
                results.push(tool_result_for(tool_use_id, &task));
            }

            request.messages.push(Message {
                role: Role::User,
                content: results,
            });
        }
        Ok(())
    }

    async fn persist_task(&self, task: &mut AgentTask) -> RuntimeResult<()> {
        let mut attempt = 1;
        loop {
            match self.store.insert_task(task).await {
                Err(GrcError::Conflict(reason)) if attempt < TASK_INSERT_ATTEMPTS => {
                    warn!(target: "agent_execution", task_id = %task.task_id, "Task reference taken, drawing a new one: {}", reason);
                    task.reassign_id();
                    attempt += 1;
                }
                result => return Ok(result?),
            }
        }
    }

    /// Turn one tool call into exactly one task
    async fn dispatch(&self, ctx: &RunContext<'_>, name: &str, input: &Value) -> AgentTask {
        let now = Utc::now();
        let mut task = new_task(ctx, name, input, now);

        let permitted = ctx.granted.contains(name) && find_skill(name).is_some();
        if !permitted {
            warn!(target: "agent_execution", skill = name, "Tool call for a skill outside the grant");
            task.status = TaskStatus::Failed;
            task.result = json!({ "error": SKILL_NOT_PERMITTED, "input": input });
            task.error_message = Some(SKILL_NOT_PERMITTED.to_string());
            return task;
        }

        if is_write_skill(name) {
            debug!(target: "agent_execution", skill = name, task_id = %task.task_id, "Write queued for approval");
            task.status = TaskStatus::PendingApproval;
            task.result = input.clone();
            return task;
        }

        let Some(executor) = self.skills.get(name) else {
            task.status = TaskStatus::Failed;
            task.result = json!({ "error": format!("no executor registered for {}", name) });
            task.error_message = Some(format!("no executor registered for {}", name));
            return task;
        };

        match executor.execute(input.clone(), ctx.agent.organization_id).await {
            Ok(output) => {
                debug!(target: "agent_execution", skill = name, "Read skill completed");
                task.status = TaskStatus::Completed;
                task.result = output;
            }
            Err(e) => {
                warn!(target: "agent_execution", skill = name, "Read skill failed: {:#}", e);
                task.status = TaskStatus::Failed;
                task.result = json!({ "error": e.to_string() });
                task.error_message = Some(e.to_string());
            }
        }
        task.updated_at = Utc::now();
        task
    }

    async fn audit_run(
        &self,
        agent: &Agent,
        principal: Principal,
        outcome: &RunOutcome,
        next_run_at: Option<DateTime<Utc>>,
    ) {
        let action = if outcome.is_success() {
            "agent.run"
        } else {
            "agent.run_failed"
        };
        let entry = AuditEntry::new(agent.organization_id, principal, action, "agent", agent.id)
            .with_new_values(json!({
                "run_id": outcome.run_id,
                "tasks_created": outcome.tasks_created,
                "write_tasks_created": outcome.write_tasks_created,
                "read_tasks_completed": outcome.read_tasks_completed,
                "read_tasks_failed": outcome.read_tasks_failed,
                "rejected_tool_calls": outcome.rejected_tool_calls,
                "schedule": agent.schedule,
                "next_run_at": next_run_at,
                "error": outcome.error,
            }));
        self.audit.record(entry).await;
    }
}

fn new_task(ctx: &RunContext<'_>, name: &str, input: &Value, now: DateTime<Utc>) -> AgentTask {
    let id = TaskId::new();
    let skill = find_skill(name);
    let label = skill.map(|s| s.name).unwrap_or(name);
    let title = match input.get("title").and_then(Value::as_str) {
        Some(subject) => format!("{}: {}", label, subject),
        None => label.to_string(),
    };
    let description = input
        .get("description")
        .and_then(Value::as_str)
        .map(str::to_string)
        .or_else(|| skill.map(|s| s.description.to_string()))
        .unwrap_or_default();
    let write = is_write_skill(name);

    AgentTask {
        id,
        task_id: AgentTask::human_task_id(&id),
        organization_id: ctx.agent.organization_id,
        run_id: ctx.run_id,
        agent_id: ctx.agent.id,
        title,
        description,
        skill_used: name.to_string(),
        action_type: if write { ActionType::Write } else { ActionType::Read },
        status: TaskStatus::Failed,
        result: Value::Null,
        error_message: None,
        requires_approval: write,
        approved_by: None,
        approved_at: None,
        created_at: now,
        updated_at: now,
    }
}

fn tool_result_for(tool_use_id: &str, task: &AgentTask) -> ContentBlock {
    match task.status {
        TaskStatus::PendingApproval => ContentBlock::tool_result(
            tool_use_id,
            json!({
                "status": "pending_approval",
                "task_id": task.task_id,
                "message": "Queued for human approval. This action has NOT been executed yet.",
            })
            .to_string(),
            false,
        ),
        TaskStatus::Completed => ContentBlock::tool_result(tool_use_id, task.result.to_string(), false),
        _ => {
            let error = task
                .error_message
                .clone()
                .unwrap_or_else(|| "tool call failed".to_string());
            ContentBlock::tool_result(tool_use_id, json!({ "error": error }).to_string(), true)
        }
    }
}

pub fn build_system_prompt(agent: &Agent, agent_type: &AgentType) -> String {
    let config = serde_json::to_string_pretty(&agent.config).unwrap_or_else(|_| "{}".to_string());
    let mission = if agent.description.trim().is_empty() {
        "Keep the organization's risk register, incidents, policies and compliance requirements accurate and current."
    } else {
        agent.description.as_str()
    };

    format!(
        "You are {name}, an autonomous governance, risk and compliance agent.\n\n\
         Mission: {mission}\n\n\
         Allowed skills: {skills}\n\n\
         Agent configuration:\n{config}\n\n\
         Rules:\n\
         - Use only the allowed skills listed above. Never call any other tool.\n\
         - Make at most {max_calls} tool calls in this run.\n\
         - Write skills (create_risk, create_incident, create_policy, update_requirement) are queued \
         for human approval and are not executed immediately.\n\
         - Base every proposal on evidence gathered with your read skills.",
        name = agent.name,
        mission = mission,
        skills = agent_type.skills.join(", "),
        config = config,
        max_calls = MAX_TOOL_CALLS_PER_RUN,
    )
}
