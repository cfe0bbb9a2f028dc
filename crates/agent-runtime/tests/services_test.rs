//! Scheduler, manual runs, agent management and billing

mod common;

use anyhow::Result;
use chrono::{Duration, Utc};
use common::{risk_proposal, tool_use, Harness};
use grc_agent_runtime::usage::{FREE_ACTION_LIMIT, TRIAL_EXPIRED_REASON};
use grc_agent_runtime::{BillingEvent, NewAgent, NewAgentType, RuntimeError};
use grc_common::{
    AgentPlan, AgentStatus, OrganizationSettings, Schedule, Subscription, SubscriptionStatus, TaskFilter,
};
use grc_storage::GrcStore;
use serde_json::json;

fn new_agent(name: &str) -> NewAgent {
    NewAgent {
        name: name.to_string(),
        description: "Monitor vendor risk".to_string(),
        agent_type_id: None,
        schedule: Schedule::Daily6am,
        config: json!({}),
    }
}

async fn unlimited_plan(h: &Harness) {
    h.store
        .upsert_subscription(&Subscription {
            organization_id: h.org,
            agent_plan: Some(AgentPlan::Unlimited),
            status: SubscriptionStatus::Active,
            updated_at: Utc::now(),
        })
        .await
        .unwrap();
}

// ============================================================================
// Scheduler
// ============================================================================

#[tokio::test]
async fn test_scheduler_runs_only_due_agents() -> Result<()> {
    let h = Harness::new().await;
    let now = Utc::now();

    let due = h.default_agent(Schedule::Hourly).await;
    h.store.record_agent_run(due.id, now - Duration::hours(2), Some(now - Duration::minutes(5))).await?;

    let later = h.default_agent(Schedule::Daily9am).await;
    h.store.record_agent_run(later.id, now, Some(now + Duration::hours(3))).await?;

    let manual = h.default_agent(Schedule::Manual).await;
    h.store.record_agent_run(manual.id, now, Some(now - Duration::hours(1))).await?;

    let report = h.platform.scheduler.run_due_agents(now).await?;
    assert_eq!(report.agents_run, 1);
    assert_eq!(report.results[0].agent_id, due.id);

    let stored = h.store.get_agent(h.org, due.id).await?.unwrap();
    assert!(stored.next_run_at.unwrap() > now);
    Ok(())
}

#[tokio::test]
async fn test_scheduler_skips_usage_gate() -> Result<()> {
    let h = Harness::new().await;
    let now = Utc::now();

    let mut settings = OrganizationSettings::default();
    settings.agent_run_count = 50;
    settings.agent_trial_started_at = Some(now - Duration::days(60));
    h.store.save_settings(h.org, &settings).await?;

    let agent = h.default_agent(Schedule::Hourly).await;
    h.store.record_agent_run(agent.id, now - Duration::hours(1), Some(now - Duration::seconds(1))).await?;
    h.llm.push(tool_use(&[("tu_1", "create_risk", risk_proposal("Scheduled finding"))]));

    let report = h.platform.scheduler.run_due_agents(now).await?;
    assert_eq!(report.agents_run, 1);
    assert_eq!(report.results[0].outcome.as_ref().unwrap().write_tasks_created, 1);

    // Scheduled runs are not counted
    assert_eq!(h.store.get_settings(h.org).await?.agent_run_count, 50);
    Ok(())
}

#[tokio::test]
async fn test_scheduler_continues_after_failed_agent() -> Result<()> {
    let h = Harness::new().await;
    let now = Utc::now();

    let empty_type = h.agent_type(&[], false).await;
    let broken = h.agent(&empty_type, Schedule::Hourly).await;
    h.store.record_agent_run(broken.id, now - Duration::hours(3), Some(now - Duration::hours(2))).await?;

    let healthy = h.default_agent(Schedule::Hourly).await;
    h.store.record_agent_run(healthy.id, now - Duration::hours(1), Some(now - Duration::minutes(1))).await?;

    let report = h.platform.scheduler.run_due_agents(now).await?;
    assert_eq!(report.agents_run, 2);

    let failed = report.results.iter().find(|r| r.agent_id == broken.id).unwrap();
    assert!(failed.outcome.is_none());
    assert!(failed.error.as_deref().unwrap().contains("no skills"));

    let ok = report.results.iter().find(|r| r.agent_id == healthy.id).unwrap();
    assert!(ok.outcome.is_some());
    assert!(ok.error.is_none());
    Ok(())
}

#[tokio::test]
async fn test_failed_scheduled_agent_waits_for_next_slot() -> Result<()> {
    let h = Harness::new().await;
    let now = Utc::now();

    let empty_type = h.agent_type(&[], false).await;
    let broken = h.agent(&empty_type, Schedule::Hourly).await;
    h.store.record_agent_run(broken.id, now - Duration::hours(3), Some(now - Duration::hours(2))).await?;

    let report = h.platform.scheduler.run_due_agents(now).await?;
    assert_eq!(report.agents_run, 1);
    assert!(report.results[0].error.is_some());

    let stored = h.store.get_agent(h.org, broken.id).await?.unwrap();
    assert!(stored.next_run_at.unwrap() > now);
    assert_eq!(stored.status, AgentStatus::Active);
    // Never ran, so the last run is untouched
    assert_eq!(stored.last_run_at, Some(now - Duration::hours(3)));

    let again = h.platform.scheduler.run_due_agents(now + Duration::seconds(1)).await?;
    assert_eq!(again.agents_run, 0);
    Ok(())
}

// ============================================================================
// Manual runs
// ============================================================================

#[tokio::test]
async fn test_manual_run_counts_usage() -> Result<()> {
    let h = Harness::new().await;
    let agent = h.default_agent(Schedule::Manual).await;

    let result = h.platform.runs.trigger_manual_run(agent.id, h.org, h.member).await?;
    assert!(result.outcome.is_success());
    assert_eq!(result.usage.run_count, 1);
    assert_eq!(result.usage.free_actions_remaining, FREE_ACTION_LIMIT - 1);
    assert!(result.usage.trial_started_at.is_some());
    Ok(())
}

#[tokio::test]
async fn test_failed_manual_run_is_not_counted() -> Result<()> {
    let h = Harness::new().await;
    let agent = h.default_agent(Schedule::Manual).await;
    h.llm.push_error("model unavailable");

    let result = h.platform.runs.trigger_manual_run(agent.id, h.org, h.owner).await?;
    assert!(!result.outcome.is_success());
    assert_eq!(result.usage.run_count, 0);
    assert_eq!(result.usage.trial_started_at, None);
    Ok(())
}

#[tokio::test]
async fn test_viewer_cannot_run() -> Result<()> {
    let h = Harness::new().await;
    let agent = h.default_agent(Schedule::Manual).await;

    let result = h.platform.runs.trigger_manual_run(agent.id, h.org, h.viewer).await;
    assert!(matches!(result, Err(RuntimeError::Forbidden(_))));
    assert!(h.llm.requests().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_suspended_agent_cannot_run() -> Result<()> {
    let h = Harness::new().await;
    let agent = h.default_agent(Schedule::Manual).await;
    h.platform
        .agents
        .update_agent_status(h.org, h.owner, agent.id, AgentStatus::Suspended)
        .await?;

    let result = h.platform.runs.trigger_manual_run(agent.id, h.org, h.owner).await;
    assert!(matches!(result, Err(RuntimeError::AgentNotRunnable { .. })));
    Ok(())
}

#[tokio::test]
async fn test_expired_trial_denies_manual_run() -> Result<()> {
    let h = Harness::new().await;
    let agent = h.default_agent(Schedule::Manual).await;

    let mut settings = OrganizationSettings::default();
    settings.agent_run_count = 3;
    settings.agent_trial_started_at = Some(Utc::now() - Duration::days(15));
    h.store.save_settings(h.org, &settings).await?;

    let result = h.platform.runs.trigger_manual_run(agent.id, h.org, h.owner).await;
    match result {
        Err(RuntimeError::UsageDenied { reason }) => assert_eq!(reason, TRIAL_EXPIRED_REASON),
        other => panic!("expected usage denial, got {:?}", other.map(|r| r.outcome)),
    }
    assert!(h.llm.requests().is_empty());
    assert_eq!(h.store.get_settings(h.org).await?.agent_run_count, 3);
    Ok(())
}

#[tokio::test]
async fn test_purchased_credits_extend_usage() -> Result<()> {
    let h = Harness::new().await;
    let agent = h.default_agent(Schedule::Manual).await;

    let mut settings = OrganizationSettings::default();
    settings.agent_run_count = FREE_ACTION_LIMIT;
    settings.agent_trial_started_at = Some(Utc::now() - Duration::days(2));
    h.store.save_settings(h.org, &settings).await?;

    let denied = h.platform.runs.trigger_manual_run(agent.id, h.org, h.owner).await;
    assert!(matches!(denied, Err(RuntimeError::UsageDenied { .. })));

    h.platform
        .billing
        .apply_event(BillingEvent::CreditsPurchased {
            organization_id: h.org,
            credits: 2,
            purchase_id: "pi_001".into(),
        })
        .await?;

    let result = h.platform.runs.trigger_manual_run(agent.id, h.org, h.owner).await?;
    assert_eq!(result.usage.credits_remaining, 1);
    assert!(result.usage.allowed);
    Ok(())
}

// ============================================================================
// Agent manager
// ============================================================================

#[tokio::test]
async fn test_default_provisioning_is_idempotent() -> Result<()> {
    let h = Harness::new().await;

    let (default_type, agent) = h.platform.agents.ensure_default_agent(h.org, Some(h.owner)).await?;
    assert!(default_type.is_default);
    assert_eq!(default_type.skills.len(), 8);
    let agent = agent.unwrap();
    assert_eq!(agent.schedule, Schedule::Daily9am);
    assert!(agent.next_run_at.is_some());

    let (again, second) = h.platform.agents.ensure_default_agent(h.org, Some(h.owner)).await?;
    assert_eq!(again.id, default_type.id);
    assert!(second.is_none());
    assert_eq!(h.platform.agents.list_agent_types(h.org).await?.len(), 1);
    assert_eq!(h.platform.agents.list_agents(h.org).await?.len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_create_agent_on_default_type() -> Result<()> {
    let h = Harness::new().await;
    let agent = h.platform.agents.create_agent(h.org, h.owner, new_agent("Vendor watch")).await?;

    assert_eq!(agent.status, AgentStatus::Active);
    assert!(agent.next_run_at.is_some());
    assert_eq!(agent.created_by, Some(h.owner));

    let audit = h.store.list_audit(h.org, 10).await?;
    assert!(audit.iter().any(|e| e.action == "agent.created" && e.entity_id == agent.id.to_string()));
    Ok(())
}

#[tokio::test]
async fn test_custom_type_requires_unlimited_plan() -> Result<()> {
    let h = Harness::new().await;
    let custom = h
        .platform
        .agents
        .create_agent_type(
            h.org,
            h.owner,
            NewAgentType {
                name: "Researcher".into(),
                description: String::new(),
                skills: vec!["web_search".into(), "draft_report".into(), "web_search".into()],
            },
        )
        .await?;
    assert_eq!(custom.skills, vec!["web_search".to_string(), "draft_report".to_string()]);

    let mut request = new_agent("Research bot");
    request.agent_type_id = Some(custom.id);

    let denied = h.platform.agents.create_agent(h.org, h.owner, request.clone()).await;
    assert!(matches!(denied, Err(RuntimeError::Forbidden(_))));

    unlimited_plan(&h).await;
    let agent = h.platform.agents.create_agent(h.org, h.owner, request).await?;
    assert_eq!(agent.agent_type_id, custom.id);
    Ok(())
}

#[tokio::test]
async fn test_member_cannot_manage_agents() -> Result<()> {
    let h = Harness::new().await;
    let result = h.platform.agents.create_agent(h.org, h.member, new_agent("Nope")).await;
    assert!(matches!(result, Err(RuntimeError::Forbidden(_))));
    Ok(())
}

#[tokio::test]
async fn test_suspend_resume_and_delete() -> Result<()> {
    let h = Harness::new().await;
    let agent = h.platform.agents.create_agent(h.org, h.owner, new_agent("Lifecycle")).await?;

    let suspended = h
        .platform
        .agents
        .update_agent_status(h.org, h.owner, agent.id, AgentStatus::Suspended)
        .await?;
    assert_eq!(suspended.next_run_at, None);

    let resumed = h
        .platform
        .agents
        .update_agent_status(h.org, h.owner, agent.id, AgentStatus::Active)
        .await?;
    assert!(resumed.next_run_at.is_some());

    let via_status = h
        .platform
        .agents
        .update_agent_status(h.org, h.owner, agent.id, AgentStatus::Deleted)
        .await;
    assert!(matches!(via_status, Err(RuntimeError::Validation(_))));

    h.platform.agents.delete_agent(h.org, h.owner, agent.id).await?;
    assert!(h.platform.agents.list_agents(h.org).await?.iter().all(|a| a.id != agent.id));

    // Soft delete keeps the row
    let stored = h.store.get_agent(h.org, agent.id).await?.unwrap();
    assert_eq!(stored.status, AgentStatus::Deleted);
    assert_eq!(stored.next_run_at, None);

    let revive = h
        .platform
        .agents
        .update_agent_status(h.org, h.owner, agent.id, AgentStatus::Active)
        .await;
    assert!(matches!(revive, Err(RuntimeError::ProtectedResource(_))));
    Ok(())
}

#[tokio::test]
async fn test_default_type_is_protected() -> Result<()> {
    let h = Harness::new().await;
    let (default_type, _) = h.platform.agents.ensure_default_agent(h.org, Some(h.owner)).await?;

    let delete = h.platform.agents.delete_agent_type(h.org, h.owner, default_type.id).await;
    assert!(matches!(delete, Err(RuntimeError::ProtectedResource(_))));

    let edit = h
        .platform
        .agents
        .update_agent_type_skills(h.org, h.owner, default_type.id, vec!["web_search".into()])
        .await;
    assert!(matches!(edit, Err(RuntimeError::ProtectedResource(_))));
    Ok(())
}

#[tokio::test]
async fn test_type_in_use_cannot_be_deleted() -> Result<()> {
    let h = Harness::new().await;
    unlimited_plan(&h).await;
    let custom = h
        .platform
        .agents
        .create_agent_type(
            h.org,
            h.owner,
            NewAgentType {
                name: "Auditor".into(),
                description: String::new(),
                skills: vec!["compliance_check".into()],
            },
        )
        .await?;
    let mut request = new_agent("Audit bot");
    request.agent_type_id = Some(custom.id);
    let agent = h.platform.agents.create_agent(h.org, h.owner, request).await?;

    let blocked = h.platform.agents.delete_agent_type(h.org, h.owner, custom.id).await;
    assert!(matches!(blocked, Err(RuntimeError::ProtectedResource(_))));

    // Soft-deleted agents no longer pin their type
    h.platform.agents.delete_agent(h.org, h.owner, agent.id).await?;
    h.platform.agents.delete_agent_type(h.org, h.owner, custom.id).await?;
    assert!(h.store.get_agent_type(h.org, custom.id).await?.is_none());
    Ok(())
}

#[tokio::test]
async fn test_agent_type_skills_are_validated() -> Result<()> {
    let h = Harness::new().await;
    let unknown = h
        .platform
        .agents
        .create_agent_type(
            h.org,
            h.owner,
            NewAgentType {
                name: "Bad".into(),
                description: String::new(),
                skills: vec!["launch_missiles".into()],
            },
        )
        .await;
    assert!(matches!(unknown, Err(RuntimeError::Validation(_))));

    let empty = h
        .platform
        .agents
        .create_agent_type(
            h.org,
            h.owner,
            NewAgentType {
                name: "Empty".into(),
                description: String::new(),
                skills: vec![],
            },
        )
        .await;
    assert!(matches!(empty, Err(RuntimeError::Validation(_))));

    let custom = h
        .platform
        .agents
        .create_agent_type(
            h.org,
            h.owner,
            NewAgentType {
                name: "Editable".into(),
                description: String::new(),
                skills: vec!["web_search".into()],
            },
        )
        .await?;
    let updated = h
        .platform
        .agents
        .update_agent_type_skills(h.org, h.owner, custom.id, vec!["risk_analysis".into(), "create_risk".into()])
        .await?;
    assert_eq!(updated.skills, vec!["risk_analysis".to_string(), "create_risk".to_string()]);
    Ok(())
}

// ============================================================================
// Billing
// ============================================================================

#[tokio::test]
async fn test_duplicate_purchase_is_applied_once() -> Result<()> {
    let h = Harness::new().await;
    let event = BillingEvent::CreditsPurchased {
        organization_id: h.org,
        credits: 25,
        purchase_id: "pi_dup".into(),
    };

    let first = h.platform.billing.apply_event(event.clone()).await?;
    let second = h.platform.billing.apply_event(event).await?;

    assert!(first.applied);
    assert!(!second.applied);
    assert_eq!(h.store.get_settings(h.org).await?.agent_credits_purchased, 25);

    let audit = h.store.list_audit(h.org, 10).await?;
    let credited: Vec<_> = audit.iter().filter(|e| e.action == "billing.credits_purchased").collect();
    assert_eq!(credited.len(), 1);
    assert_eq!(credited[0].actor, "system:billing");
    Ok(())
}

#[tokio::test]
async fn test_credit_purchase_keeps_concurrent_run_count() -> Result<()> {
    let h = Harness::new().await;
    let purchase = BillingEvent::CreditsPurchased {
        organization_id: h.org,
        credits: 10,
        purchase_id: "pi_overlap".into(),
    };

    let (credited, counted) = tokio::join!(
        h.platform.billing.apply_event(purchase),
        h.store.increment_agent_run_count(h.org, Utc::now()),
    );
    credited?;
    counted?;
    h.store.increment_agent_run_count(h.org, Utc::now()).await?;

    let settings = h.store.get_settings(h.org).await?;
    assert_eq!(settings.agent_run_count, 2);
    assert_eq!(settings.agent_credits_purchased, 10);
    Ok(())
}

#[tokio::test]
async fn test_concurrent_redeliveries_credit_once() -> Result<()> {
    let h = Harness::new().await;
    let event = BillingEvent::CreditsPurchased {
        organization_id: h.org,
        credits: 30,
        purchase_id: "pi_race".into(),
    };

    let (a, b) = tokio::join!(
        h.platform.billing.apply_event(event.clone()),
        h.platform.billing.apply_event(event),
    );
    let applied = [a?.applied, b?.applied].iter().filter(|applied| **applied).count();

    assert_eq!(applied, 1);
    assert_eq!(h.store.get_settings(h.org).await?.agent_credits_purchased, 30);
    Ok(())
}

#[tokio::test]
async fn test_zero_credit_purchase_is_rejected() -> Result<()> {
    let h = Harness::new().await;
    let result = h
        .platform
        .billing
        .apply_event(BillingEvent::CreditsPurchased {
            organization_id: h.org,
            credits: 0,
            purchase_id: "pi_zero".into(),
        })
        .await;
    assert!(matches!(result, Err(RuntimeError::Validation(_))));
    Ok(())
}

#[tokio::test]
async fn test_plan_change_unlocks_unlimited_usage() -> Result<()> {
    let h = Harness::new().await;
    let mut settings = OrganizationSettings::default();
    settings.agent_run_count = 40;
    settings.agent_trial_started_at = Some(Utc::now() - Duration::days(90));
    h.store.save_settings(h.org, &settings).await?;

    let event: BillingEvent = serde_json::from_value(json!({
        "type": "agent_plan_changed",
        "organization_id": h.org,
        "agent_plan": "unlimited",
        "status": "active",
    }))?;
    h.platform.billing.apply_event(event).await?;

    let usage = h.platform.usage.check_usage(h.org, Utc::now()).await?;
    assert!(usage.allowed);
    assert!(usage.has_unlimited_plan);

    h.platform
        .billing
        .apply_event(BillingEvent::AgentPlanChanged {
            organization_id: h.org,
            agent_plan: Some(AgentPlan::Unlimited),
            status: SubscriptionStatus::Canceled,
        })
        .await?;
    let usage = h.platform.usage.check_usage(h.org, Utc::now()).await?;
    assert!(!usage.allowed);
    Ok(())
}

#[tokio::test]
async fn test_pending_tasks_listing_by_status() -> Result<()> {
    let h = Harness::new().await;
    let agent = h.default_agent(Schedule::Manual).await;
    h.llm.push(tool_use(&[
        ("a", "create_risk", risk_proposal("One")),
        ("b", "draft_report", json!({ "title": "Two" })),
    ]));
    h.platform.runs.trigger_manual_run(agent.id, h.org, h.owner).await?;

    let pending = h
        .store
        .list_tasks(h.org, &TaskFilter { status: Some(grc_common::TaskStatus::PendingApproval), ..Default::default() })
        .await?;
    assert_eq!(pending.len(), 1);
    Ok(())
}
