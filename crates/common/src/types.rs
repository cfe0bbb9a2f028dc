use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use strum_macros::{AsRefStr, Display, EnumIter, EnumString};
use uuid::Uuid;

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }
    };
}

uuid_id!(
    /// Tenant identifier
    OrganizationId
);
uuid_id!(
    /// Authenticated user identifier
    UserId
);
uuid_id!(AgentId);
uuid_id!(AgentTypeId);
uuid_id!(
    /// Primary key of a persisted agent task
    TaskId
);
uuid_id!(
    /// Correlates every task produced by one agent execution
    RunId
);

/// When an agent is picked up by the scheduler
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr, EnumIter,
)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub enum Schedule {
    #[serde(rename = "manual")]
    #[strum(serialize = "manual")]
    Manual,
    #[serde(rename = "hourly")]
    #[strum(serialize = "hourly")]
    Hourly,
    #[serde(rename = "daily_6am")]
    #[strum(serialize = "daily_6am")]
    Daily6am,
    #[serde(rename = "daily_9am")]
    #[strum(serialize = "daily_9am")]
    Daily9am,
    #[serde(rename = "weekly_monday")]
    #[strum(serialize = "weekly_monday")]
    WeeklyMonday,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AgentStatus {
    Active,
    Suspended,
    /// Soft-deleted; kept so task history stays attached
    Deleted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ActionType {
    Read,
    Write,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TaskStatus {
    Completed,
    PendingApproval,
    Approved,
    Declined,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::PendingApproval)
    }

    /// Only a pending write can move, and it moves exactly once.
    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        matches!(
            (self, next),
            (
                Self::PendingApproval,
                Self::Approved | Self::Declined | Self::Failed
            )
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MemberRole {
    Owner,
    Admin,
    Member,
    Viewer,
}

impl MemberRole {
    /// Owners and admins may approve or decline agent writes
    pub fn can_approve(&self) -> bool {
        matches!(self, Self::Owner | Self::Admin)
    }

    pub fn can_manage_agents(&self) -> bool {
        matches!(self, Self::Owner | Self::Admin)
    }

    pub fn can_run_agents(&self) -> bool {
        !matches!(self, Self::Viewer)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AgentPlan {
    Unlimited,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    Trialing,
    PastDue,
    Canceled,
}

/// A configured autonomous worker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct Agent {
    pub id: AgentId,
    pub organization_id: OrganizationId,
    pub agent_type_id: AgentTypeId,
    pub name: String,
    pub description: String,
    pub schedule: Schedule,
    pub status: AgentStatus,
    pub config: Value,
    pub created_by: Option<UserId>,
    pub last_run_at: Option<DateTime<Utc>>,
    pub next_run_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// A named bundle of permitted skills
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct AgentType {
    pub id: AgentTypeId,
    pub organization_id: OrganizationId,
    pub name: String,
    pub description: String,
    pub skills: Vec<String>,
    pub is_default: bool,
    pub created_at: DateTime<Utc>,
}

/// Persisted record of one tool invocation during a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct AgentTask {
    pub id: TaskId,
    /// Human-readable reference, e.g. `AT-3F9A01BC`
    pub task_id: String,
    pub organization_id: OrganizationId,
    pub run_id: RunId,
    pub agent_id: AgentId,
    pub title: String,
    pub description: String,
    pub skill_used: String,
    pub action_type: ActionType,
    pub status: TaskStatus,
    pub result: Value,
    pub error_message: Option<String>,
    pub requires_approval: bool,
    pub approved_by: Option<UserId>,
    pub approved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AgentTask {
    pub fn human_task_id(id: &TaskId) -> String {
        let simple = id.0.simple().to_string();
        format!("AT-{}", simple[..8].to_uppercase())
    }

    /// Draw a fresh id and human reference, used when the reference
    /// collides inside the organization
    pub fn reassign_id(&mut self) {
        self.id = TaskId::new();
        self.task_id = Self::human_task_id(&self.id);
    }
}

/// Filter for task listings
#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    pub status: Option<TaskStatus>,
    pub run_id: Option<RunId>,
    pub agent_id: Option<AgentId>,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum RecordKind {
    Risk,
    Incident,
    Policy,
}

impl RecordKind {
    pub fn prefix(&self) -> &'static str {
        match self {
            Self::Risk => "RISK",
            Self::Incident => "INC",
            Self::Policy => "POL",
        }
    }

    /// `RISK-007` style identifier for the n-th record of an organization
    pub fn identifier(&self, sequence: u64) -> String {
        format!("{}-{:03}", self.prefix(), sequence)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct Risk {
    pub id: Uuid,
    pub organization_id: OrganizationId,
    pub risk_id: String,
    pub title: String,
    pub description: String,
    pub category: Option<String>,
    pub likelihood: i32,
    pub impact: i32,
    pub inherent_score: i32,
    pub residual_score: Option<i32>,
    pub status: String,
    pub owner: Option<String>,
    pub created_by: Option<UserId>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum IncidentSeverity {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct Incident {
    pub id: Uuid,
    pub organization_id: OrganizationId,
    pub incident_id: String,
    pub title: String,
    pub description: String,
    pub severity: IncidentSeverity,
    pub status: String,
    pub detected_at: DateTime<Utc>,
    pub created_by: Option<UserId>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct Policy {
    pub id: Uuid,
    pub organization_id: OrganizationId,
    pub policy_id: String,
    pub title: String,
    pub description: String,
    pub category: Option<String>,
    pub content: String,
    pub status: String,
    pub version: String,
    pub created_by: Option<UserId>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct Subscription {
    pub organization_id: OrganizationId,
    pub agent_plan: Option<AgentPlan>,
    pub status: SubscriptionStatus,
    pub updated_at: DateTime<Utc>,
}

impl Subscription {
    /// An unlimited add-on only counts while the subscription is live
    pub fn has_active_unlimited_plan(&self) -> bool {
        self.agent_plan == Some(AgentPlan::Unlimited)
            && matches!(
                self.status,
                SubscriptionStatus::Active | SubscriptionStatus::Trialing
            )
    }
}

/// The acting identity of an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "user_id", rename_all = "snake_case")]
pub enum Principal {
    User(UserId),
    Scheduler,
    /// Ledger events relayed from the payment provider
    Billing,
}

impl Principal {
    pub fn user_id(&self) -> Option<UserId> {
        match self {
            Self::User(id) => Some(*id),
            Self::Scheduler | Self::Billing => None,
        }
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User(id) => write!(f, "user:{}", id),
            Self::Scheduler => write!(f, "system:scheduler"),
            Self::Billing => write!(f, "system:billing"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct AuditEntry {
    pub id: Uuid,
    pub organization_id: OrganizationId,
    pub user_id: Option<UserId>,
    pub actor: String,
    pub action: String,
    pub entity_type: String,
    pub entity_id: String,
    pub old_values: Option<Value>,
    pub new_values: Option<Value>,
    pub created_at: DateTime<Utc>,
}

impl AuditEntry {
    pub fn new(
        organization_id: OrganizationId,
        principal: Principal,
        action: impl Into<String>,
        entity_type: impl Into<String>,
        entity_id: impl ToString,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            organization_id,
            user_id: principal.user_id(),
            actor: principal.to_string(),
            action: action.into(),
            entity_type: entity_type.into(),
            entity_id: entity_id.to_string(),
            old_values: None,
            new_values: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_old_values(mut self, values: Value) -> Self {
        self.old_values = Some(values);
        self
    }

    pub fn with_new_values(mut self, values: Value) -> Self {
        self.new_values = Some(values);
        self
    }
}
