use chrono::{Duration, Utc};
use grc_common::*;
use grc_storage::{GrcStore, MemoryStore};
use serde_json::json;
use uuid::Uuid;

fn risk(org: OrganizationId, title: &str, minutes_ago: i64) -> Risk {
    Risk {
        id: Uuid::new_v4(),
        organization_id: org,
        risk_id: format!("RISK-{}", title),
        title: title.to_string(),
        description: String::new(),
        category: None,
        likelihood: 3,
        impact: 3,
        inherent_score: 9,
        residual_score: None,
        status: "identified".to_string(),
        owner: None,
        created_by: None,
        created_at: Utc::now() - Duration::minutes(minutes_ago),
    }
}

#[tokio::test]
async fn test_settings_default_when_missing() {
    let store = MemoryStore::new();
    let settings = store.get_settings(OrganizationId::new()).await.unwrap();

    assert_eq!(settings, OrganizationSettings::default());
}

#[tokio::test]
async fn test_increment_stamps_trial_once() {
    let store = MemoryStore::new();
    let org = OrganizationId::new();
    let first_at = Utc::now() - Duration::days(2);

    let first = store.increment_agent_run_count(org, first_at).await.unwrap();
    let second = store.increment_agent_run_count(org, Utc::now()).await.unwrap();

    assert_eq!(first.agent_run_count, 1);
    assert_eq!(second.agent_run_count, 2);
    assert_eq!(second.agent_trial_started_at, Some(first_at));
}

#[tokio::test]
async fn test_recent_risks_newest_first() {
    let store = MemoryStore::new();
    let org = OrganizationId::new();
    store.insert_risk(&risk(org, "old", 30)).await.unwrap();
    store.insert_risk(&risk(org, "new", 1)).await.unwrap();
    store.insert_risk(&risk(OrganizationId::new(), "foreign", 0)).await.unwrap();

    let risks = store.list_recent_risks(org, 50).await.unwrap();
    let titles: Vec<_> = risks.iter().map(|r| r.title.as_str()).collect();

    assert_eq!(titles, vec!["new", "old"]);
    assert_eq!(store.count_records(org, RecordKind::Risk).await.unwrap(), 2);
    assert_eq!(store.count_records(org, RecordKind::Policy).await.unwrap(), 0);
}

#[tokio::test]
async fn test_only_one_default_agent_type() {
    let store = MemoryStore::new();
    let org = OrganizationId::new();
    let make = || AgentType {
        id: AgentTypeId::new(),
        organization_id: org,
        name: "GRC Agent".to_string(),
        description: String::new(),
        skills: vec![],
        is_default: true,
        created_at: Utc::now(),
    };

    store.insert_agent_type(&make()).await.unwrap();
    let err = store.insert_agent_type(&make()).await.unwrap_err();
    assert!(matches!(err, GrcError::Conflict(_)));
}

#[tokio::test]
async fn test_due_agents_skip_manual_and_suspended() {
    let store = MemoryStore::new();
    let org = OrganizationId::new();
    let past = Some(Utc::now() - Duration::minutes(1));
    let make = |schedule, status| Agent {
        id: AgentId::new(),
        organization_id: org,
        agent_type_id: AgentTypeId::new(),
        name: "agent".to_string(),
        description: String::new(),
        schedule,
        status,
        config: json!({}),
        created_by: None,
        last_run_at: None,
        next_run_at: past,
        created_at: Utc::now(),
    };
    let due = make(Schedule::Hourly, AgentStatus::Active);
    store.insert_agent(&due).await.unwrap();
    store.insert_agent(&make(Schedule::Manual, AgentStatus::Active)).await.unwrap();
    store.insert_agent(&make(Schedule::Hourly, AgentStatus::Suspended)).await.unwrap();

    let listed = store.list_due_agents(Utc::now()).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, due.id);
}

#[tokio::test]
async fn test_injected_failure() {
    let store = MemoryStore::new();
    store.inject_failure("get_settings").await;

    let err = store.get_settings(OrganizationId::new()).await.unwrap_err();
    assert!(matches!(err, GrcError::Database(_)));

    store.clear_failures().await;
    assert!(store.get_settings(OrganizationId::new()).await.is_ok());
}

fn pending_task(org: OrganizationId) -> AgentTask {
    let id = TaskId::new();
    AgentTask {
        id,
        task_id: AgentTask::human_task_id(&id),
        organization_id: org,
        run_id: RunId::new(),
        agent_id: AgentId::new(),
        title: "Create risk".to_string(),
        description: String::new(),
        skill_used: "create_risk".to_string(),
        action_type: ActionType::Write,
        status: TaskStatus::PendingApproval,
        result: json!({ "payload": { "title": "Vendor outage" } }),
        error_message: None,
        requires_approval: true,
        approved_by: None,
        approved_at: None,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

#[tokio::test]
async fn test_transition_only_from_expected_status() {
    let store = MemoryStore::new();
    let task = pending_task(OrganizationId::new());
    store.insert_task(&task).await.unwrap();

    let mut approved = task.clone();
    approved.status = TaskStatus::Approved;
    let mut declined = task.clone();
    declined.status = TaskStatus::Declined;

    assert!(store.transition_task(&approved, TaskStatus::PendingApproval).await.unwrap());
    assert!(!store.transition_task(&declined, TaskStatus::PendingApproval).await.unwrap());

    let stored = store.get_task(task.id).await.unwrap().unwrap();
    assert_eq!(stored.status, TaskStatus::Approved);
}

#[tokio::test]
async fn test_task_reference_unique_per_organization() {
    let store = MemoryStore::new();
    let first = pending_task(OrganizationId::new());
    store.insert_task(&first).await.unwrap();

    // Same human reference in another tenant is fine
    let mut other_org = pending_task(OrganizationId::new());
    other_org.task_id = first.task_id.clone();
    store.insert_task(&other_org).await.unwrap();

    let mut same_org = pending_task(first.organization_id);
    same_org.task_id = first.task_id.clone();
    let err = store.insert_task(&same_org).await.unwrap_err();
    assert!(matches!(err, GrcError::Conflict(_)));
}

#[tokio::test]
async fn test_injected_conflict_fires_once() {
    let store = MemoryStore::new();
    store.inject_conflict("insert_task", 1).await;
    let task = pending_task(OrganizationId::new());

    let err = store.insert_task(&task).await.unwrap_err();
    assert!(matches!(err, GrcError::Conflict(_)));
    store.insert_task(&task).await.unwrap();
}

#[tokio::test]
async fn test_credit_purchase_applied_once_and_keeps_run_count() {
    let store = MemoryStore::new();
    let org = OrganizationId::new();
    store.increment_agent_run_count(org, Utc::now()).await.unwrap();

    let applied = store.apply_credit_purchase(org, "pi_1", 40).await.unwrap();
    assert_eq!(applied.map(|s| s.agent_credits_purchased), Some(40));
    assert!(store.apply_credit_purchase(org, "pi_1", 40).await.unwrap().is_none());

    let settings = store.get_settings(org).await.unwrap();
    assert_eq!(settings.agent_credits_purchased, 40);
    assert_eq!(settings.agent_run_count, 1);
}

#[tokio::test]
async fn test_requirement_status_merges_in_place() {
    let store = MemoryStore::new();
    let org = OrganizationId::new();
    let entry = |status: RequirementStatus| RequirementEntry {
        status,
        notes: None,
        updated_at: Some(Utc::now()),
        updated_by: None,
    };

    let previous = store
        .set_requirement_status(org, "soc2", "CC6.1", &entry(RequirementStatus::InProgress))
        .await
        .unwrap();
    assert!(previous.is_none());

    store.increment_agent_run_count(org, Utc::now()).await.unwrap();
    let previous = store
        .set_requirement_status(org, "soc2", "CC6.1", &entry(RequirementStatus::Implemented))
        .await
        .unwrap();
    assert_eq!(previous.map(|p| p.status), Some(RequirementStatus::InProgress));

    let settings = store.get_settings(org).await.unwrap();
    assert_eq!(settings.agent_run_count, 1);
    assert_eq!(settings.active_frameworks, vec!["soc2"]);
    assert_eq!(
        settings.requirement_status("soc2", "CC6.1"),
        RequirementStatus::Implemented
    );
}
