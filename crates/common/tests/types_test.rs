use chrono::Utc;
use grc_common::types::*;
use std::str::FromStr;

#[test]
fn test_task_id_creation() {
    let task_id1 = TaskId::new();
    let task_id2 = TaskId::new();

    assert_ne!(task_id1, task_id2);
    assert_eq!(task_id1, task_id1);
}

#[test]
fn test_human_task_id_format() {
    let id = TaskId::new();
    let human = AgentTask::human_task_id(&id);

    assert!(human.starts_with("AT-"));
    assert_eq!(human.len(), 11);
    assert_eq!(human, human.to_uppercase());
}

#[test]
fn test_schedule_wire_names() {
    assert_eq!(Schedule::Daily6am.to_string(), "daily_6am");
    assert_eq!(Schedule::from_str("weekly_monday").unwrap(), Schedule::WeeklyMonday);
    assert_eq!(
        serde_json::to_string(&Schedule::Daily9am).unwrap(),
        "\"daily_9am\""
    );
    assert!(Schedule::from_str("every_tuesday").is_err());
}

#[test]
fn test_task_status_transitions() {
    assert!(TaskStatus::PendingApproval.can_transition_to(TaskStatus::Approved));
    assert!(TaskStatus::PendingApproval.can_transition_to(TaskStatus::Declined));
    assert!(TaskStatus::PendingApproval.can_transition_to(TaskStatus::Failed));
    assert!(!TaskStatus::Approved.can_transition_to(TaskStatus::Approved));
    assert!(!TaskStatus::Declined.can_transition_to(TaskStatus::Approved));
    assert!(!TaskStatus::Completed.can_transition_to(TaskStatus::Failed));
    assert_eq!(TaskStatus::PendingApproval.to_string(), "pending_approval");
}

#[test]
fn test_member_role_permissions() {
    assert!(MemberRole::Owner.can_approve());
    assert!(MemberRole::Admin.can_approve());
    assert!(!MemberRole::Member.can_approve());
    assert!(!MemberRole::Viewer.can_approve());
    assert!(MemberRole::Member.can_run_agents());
    assert!(!MemberRole::Viewer.can_run_agents());
}

#[test]
fn test_unlimited_plan_requires_live_subscription() {
    let mut subscription = Subscription {
        organization_id: OrganizationId::new(),
        agent_plan: Some(AgentPlan::Unlimited),
        status: SubscriptionStatus::Active,
        updated_at: Utc::now(),
    };
    assert!(subscription.has_active_unlimited_plan());

    subscription.status = SubscriptionStatus::Canceled;
    assert!(!subscription.has_active_unlimited_plan());

    subscription.status = SubscriptionStatus::Trialing;
    subscription.agent_plan = None;
    assert!(!subscription.has_active_unlimited_plan());
}

#[test]
fn test_record_identifiers() {
    assert_eq!(RecordKind::Risk.identifier(7), "RISK-007");
    assert_eq!(RecordKind::Incident.identifier(12), "INC-012");
    assert_eq!(RecordKind::Policy.identifier(1234), "POL-1234");
}

#[test]
fn test_audit_entry_principal() {
    let org = OrganizationId::new();
    let user = UserId::new();

    let entry = AuditEntry::new(org, Principal::User(user), "agent.run", "agent", "a1");
    assert_eq!(entry.user_id, Some(user));
    assert!(entry.actor.starts_with("user:"));

    let entry = AuditEntry::new(org, Principal::Scheduler, "agent.run", "agent", "a1");
    assert_eq!(entry.user_id, None);
    assert_eq!(entry.actor, "system:scheduler");
}
