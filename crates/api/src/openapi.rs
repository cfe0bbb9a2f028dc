//! OpenAPI Specification Configuration
//!
//! The document is generated from the route handlers and the request and
//! response types with utoipa, and served at `/api-doc/openapi.json`.

use grc_agent_runtime::{
    ApprovalOutcome, BillingEvent, BillingEventResult, ManualRunResult, NewAgent, NewAgentType, RunOutcome,
    ScheduledRun, SchedulerReport, UsageStatus,
};
use grc_common::{
    ActionType, Agent, AgentId, AgentPlan, AgentStatus, AgentTask, AgentType, AgentTypeId, OrganizationId, RunId,
    Schedule, Subscription, SubscriptionStatus, TaskId, TaskStatus, UserId,
};
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::Modify;

use crate::types::*;

#[derive(utoipa::OpenApi)]
#[openapi(
    info(
        title = "GRC Agent Platform API",
        description = "
Autonomous governance, risk and compliance agents with human approval of every write.

## Identity

Every endpoint except `/health`, `/skills` and `/internal/*` expects the
authenticated caller in two headers set by the auth gateway:

- `x-user-id`: the user's UUID
- `x-organization-id`: the organization the request acts on

Missing or malformed headers yield `401`.

## Agent runs

A run is a bounded tool-calling conversation with the model. Read skills run
immediately and their results are fed back; write skills (`create_risk`,
`create_incident`, `create_policy`, `update_requirement`) become tasks in
`pending_approval` and change nothing until an owner or admin approves them.

## Errors

Failures return `ErrorResponse` with a machine-readable `code`.
`402` means the organization's trial, free actions and credits are used up.
`422` on approval means the approval was recorded but the write failed.
        ",
        version = "1.0.0",
    ),
    paths(
        crate::server::health_check,
        crate::routes::skills::list_skills,
        crate::routes::usage::get_usage,
        crate::routes::agents::list_agents,
        crate::routes::agents::create_agent,
        crate::routes::agents::update_agent_status,
        crate::routes::agents::delete_agent,
        crate::routes::agents::run_agent,
        crate::routes::agent_types::list_agent_types,
        crate::routes::agent_types::create_agent_type,
        crate::routes::agent_types::update_agent_type_skills,
        crate::routes::agent_types::delete_agent_type,
        crate::routes::tasks::list_tasks,
        crate::routes::tasks::approve_task,
        crate::routes::tasks::decline_task,
        crate::routes::internal::run_scheduled_agents,
        crate::routes::internal::apply_billing_event,
    ),
    components(schemas(
        HealthResponse,
        ErrorResponse,
        SkillResponse,
        UpdateAgentStatusRequest,
        UpdateSkillsRequest,
        TaskListResponse,
        UsageStatus,
        RunOutcome,
        ManualRunResult,
        ApprovalOutcome,
        SchedulerReport,
        ScheduledRun,
        BillingEvent,
        BillingEventResult,
        NewAgent,
        NewAgentType,
        Agent,
        AgentType,
        AgentTask,
        AgentId,
        AgentTypeId,
        OrganizationId,
        UserId,
        RunId,
        TaskId,
        Schedule,
        AgentStatus,
        ActionType,
        TaskStatus,
        AgentPlan,
        Subscription,
        SubscriptionStatus,
    )),
    modifiers(&BearerSecurity),
    tags(
        (name = "health", description = "Service health"),
        (name = "discovery", description = "Skill catalog"),
        (name = "usage", description = "Trial, free actions and credits"),
        (name = "agents", description = "Agent management and manual runs"),
        (name = "agent-types", description = "Skill bundles agents are built from"),
        (name = "tasks", description = "Run output and human approval"),
        (name = "internal", description = "Cron and billing relays")
    )
)]
pub struct ApiDoc;

/// Shared-secret scheme used by the internal endpoints
struct BearerSecurity;

impl Modify for BearerSecurity {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Bearer).build()),
            );
        }
    }
}
