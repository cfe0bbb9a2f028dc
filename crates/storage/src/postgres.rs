use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use grc_common::{
    Agent, AgentId, AgentStatus, AgentTask, AgentType, AgentTypeId, AuditEntry, GrcError,
    Incident, MemberRole, OrganizationId, OrganizationSettings, Policy, RecordKind,
    RequirementEntry, Result, Risk, Subscription, TaskFilter, TaskId, TaskStatus, UserId,
};
use serde_json::Value;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use std::str::FromStr;
use tracing::{debug, instrument};
use uuid::Uuid;

const SCHEMA: &str = include_str!("../migrations/001_init.sql");

const AGENT_COLUMNS: &str = "id, organization_id, agent_type_id, name, description, schedule, \
     status, config, created_by, last_run_at, next_run_at, created_at";

const TASK_COLUMNS: &str = "id, task_id, organization_id, run_id, agent_id, title, description, \
     skill_used, action_type, status, result, error_message, requires_approval, approved_by, \
     approved_at, created_at, updated_at";

const RISK_COLUMNS: &str = "id, organization_id, risk_id, title, description, category, \
     likelihood, impact, inherent_score, residual_score, status, owner, created_by, created_at";

pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub async fn connect(database_url: &str, max_connections: u32) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    pub fn with_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Apply the bundled schema. Every statement is idempotent.
    pub async fn run_migrations(&self) -> anyhow::Result<()> {
        sqlx::raw_sql(SCHEMA).execute(&self.pool).await?;
        debug!("Schema migrations applied");
        Ok(())
    }

    /// Seed a membership row, creating the organization if needed
    pub async fn add_member(&self, org: OrganizationId, user: UserId, role: MemberRole) -> Result<()> {
        self.ensure_organization(org).await?;
        sqlx::query(
            "INSERT INTO organization_members (organization_id, user_id, role) VALUES ($1, $2, $3)
             ON CONFLICT (organization_id, user_id) DO UPDATE SET role = EXCLUDED.role",
        )
        .bind(org.0)
        .bind(user.0)
        .bind(role.as_ref())
        .execute(&self.pool)
        .await
        .map_err(map_db)?;
        Ok(())
    }

    async fn ensure_organization(&self, org: OrganizationId) -> Result<()> {
        sqlx::query("INSERT INTO organizations (id) VALUES ($1) ON CONFLICT (id) DO NOTHING")
            .bind(org.0)
            .execute(&self.pool)
            .await
            .map_err(map_db)?;
        Ok(())
    }

    /// Read-modify-write of the settings document under a row lock, so
    /// concurrent single-statement updates are serialized rather than lost
    async fn modify_settings<R, F>(&self, org: OrganizationId, apply: F) -> Result<R>
    where
        R: Send,
        F: FnOnce(&mut OrganizationSettings) -> R + Send,
    {
        let mut tx = self.pool.begin().await.map_err(map_db)?;
        sqlx::query("INSERT INTO organizations (id) VALUES ($1) ON CONFLICT (id) DO NOTHING")
            .bind(org.0)
            .execute(&mut *tx)
            .await
            .map_err(map_db)?;
        let value: Value =
            sqlx::query_scalar("SELECT settings FROM organizations WHERE id = $1 FOR UPDATE")
                .bind(org.0)
                .fetch_one(&mut *tx)
                .await
                .map_err(map_db)?;

        let mut settings = OrganizationSettings::from_value(value)?;
        let outcome = apply(&mut settings);

        sqlx::query("UPDATE organizations SET settings = $2, updated_at = NOW() WHERE id = $1")
            .bind(org.0)
            .bind(settings.to_value()?)
            .execute(&mut *tx)
            .await
            .map_err(map_db)?;
        tx.commit().await.map_err(map_db)?;
        Ok(outcome)
    }
}

fn map_db(err: sqlx::Error) -> GrcError {
    let unique_violation = err
        .as_database_error()
        .and_then(|db| db.code())
        .map(|code| code == "23505")
        .unwrap_or(false);
    if unique_violation {
        GrcError::Conflict(err.to_string())
    } else {
        GrcError::database(err)
    }
}

fn parse_column<T: FromStr>(row: &PgRow, column: &str) -> Result<T> {
    let raw: String = row.try_get(column).map_err(map_db)?;
    raw.parse().map_err(|_| GrcError::InvalidValue {
        field: column.to_string(),
        value: raw,
    })
}

fn row_to_agent(row: &PgRow) -> Result<Agent> {
    Ok(Agent {
        id: AgentId(row.try_get("id").map_err(map_db)?),
        organization_id: OrganizationId(row.try_get("organization_id").map_err(map_db)?),
        agent_type_id: AgentTypeId(row.try_get("agent_type_id").map_err(map_db)?),
        name: row.try_get("name").map_err(map_db)?,
        description: row.try_get("description").map_err(map_db)?,
        schedule: parse_column(row, "schedule")?,
        status: parse_column(row, "status")?,
        config: row.try_get("config").map_err(map_db)?,
        created_by: row
            .try_get::<Option<Uuid>, _>("created_by")
            .map_err(map_db)?
            .map(UserId),
        last_run_at: row.try_get("last_run_at").map_err(map_db)?,
        next_run_at: row.try_get("next_run_at").map_err(map_db)?,
        created_at: row.try_get("created_at").map_err(map_db)?,
    })
}

fn row_to_agent_type(row: &PgRow) -> Result<AgentType> {
    Ok(AgentType {
        id: AgentTypeId(row.try_get("id").map_err(map_db)?),
        organization_id: OrganizationId(row.try_get("organization_id").map_err(map_db)?),
        name: row.try_get("name").map_err(map_db)?,
        description: row.try_get("description").map_err(map_db)?,
        skills: row.try_get("skills").map_err(map_db)?,
        is_default: row.try_get("is_default").map_err(map_db)?,
        created_at: row.try_get("created_at").map_err(map_db)?,
    })
}

fn row_to_task(row: &PgRow) -> Result<AgentTask> {
    Ok(AgentTask {
        id: TaskId(row.try_get("id").map_err(map_db)?),
        task_id: row.try_get("task_id").map_err(map_db)?,
        organization_id: OrganizationId(row.try_get("organization_id").map_err(map_db)?),
        run_id: grc_common::RunId(row.try_get("run_id").map_err(map_db)?),
        agent_id: AgentId(row.try_get("agent_id").map_err(map_db)?),
        title: row.try_get("title").map_err(map_db)?,
        description: row.try_get("description").map_err(map_db)?,
        skill_used: row.try_get("skill_used").map_err(map_db)?,
        action_type: parse_column(row, "action_type")?,
        status: parse_column(row, "status")?,
        result: row.try_get("result").map_err(map_db)?,
        error_message: row.try_get("error_message").map_err(map_db)?,
        requires_approval: row.try_get("requires_approval").map_err(map_db)?,
        approved_by: row
            .try_get::<Option<Uuid>, _>("approved_by")
            .map_err(map_db)?
            .map(UserId),
        approved_at: row.try_get("approved_at").map_err(map_db)?,
        created_at: row.try_get("created_at").map_err(map_db)?,
        updated_at: row.try_get("updated_at").map_err(map_db)?,
    })
}

fn row_to_risk(row: &PgRow) -> Result<Risk> {
    Ok(Risk {
        id: row.try_get("id").map_err(map_db)?,
        organization_id: OrganizationId(row.try_get("organization_id").map_err(map_db)?),
        risk_id: row.try_get("risk_id").map_err(map_db)?,
        title: row.try_get("title").map_err(map_db)?,
        description: row.try_get("description").map_err(map_db)?,
        category: row.try_get("category").map_err(map_db)?,
        likelihood: row.try_get("likelihood").map_err(map_db)?,
        impact: row.try_get("impact").map_err(map_db)?,
        inherent_score: row.try_get("inherent_score").map_err(map_db)?,
        residual_score: row.try_get("residual_score").map_err(map_db)?,
        status: row.try_get("status").map_err(map_db)?,
        owner: row.try_get("owner").map_err(map_db)?,
        created_by: row
            .try_get::<Option<Uuid>, _>("created_by")
            .map_err(map_db)?
            .map(UserId),
        created_at: row.try_get("created_at").map_err(map_db)?,
    })
}

fn row_to_audit(row: &PgRow) -> Result<AuditEntry> {
    Ok(AuditEntry {
        id: row.try_get("id").map_err(map_db)?,
        organization_id: OrganizationId(row.try_get("organization_id").map_err(map_db)?),
        user_id: row
            .try_get::<Option<Uuid>, _>("user_id")
            .map_err(map_db)?
            .map(UserId),
        actor: row.try_get("actor").map_err(map_db)?,
        action: row.try_get("action").map_err(map_db)?,
        entity_type: row.try_get("entity_type").map_err(map_db)?,
        entity_id: row.try_get("entity_id").map_err(map_db)?,
        old_values: row.try_get("old_values").map_err(map_db)?,
        new_values: row.try_get("new_values").map_err(map_db)?,
        created_at: row.try_get("created_at").map_err(map_db)?,
    })
}

#[async_trait]
impl crate::GrcStore for PostgresStore {
    async fn get_agent(&self, org: OrganizationId, id: AgentId) -> Result<Option<Agent>> {
        let sql = format!(
            "SELECT {AGENT_COLUMNS} FROM agents WHERE id = $1 AND organization_id = $2"
        );
        let row = sqlx::query(&sql)
            .bind(id.0)
            .bind(org.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_db)?;
        row.as_ref().map(row_to_agent).transpose()
    }

    async fn list_agents(&self, org: OrganizationId) -> Result<Vec<Agent>> {
        let sql = format!(
            "SELECT {AGENT_COLUMNS} FROM agents
             WHERE organization_id = $1 AND status <> 'deleted'
             ORDER BY created_at"
        );
        let rows = sqlx::query(&sql)
            .bind(org.0)
            .fetch_all(&self.pool)
            .await
            .map_err(map_db)?;
        rows.iter().map(row_to_agent).collect()
    }

    #[instrument(skip(self, agent), fields(agent_id = %agent.id))]
    async fn insert_agent(&self, agent: &Agent) -> Result<()> {
        sqlx::query(
            "INSERT INTO agents (id, organization_id, agent_type_id, name, description, schedule,
                 status, config, created_by, last_run_at, next_run_at, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)",
        )
        .bind(agent.id.0)
        .bind(agent.organization_id.0)
        .bind(agent.agent_type_id.0)
        .bind(&agent.name)
        .bind(&agent.description)
        .bind(agent.schedule.as_ref())
        .bind(agent.status.as_ref())
        .bind(&agent.config)
        .bind(agent.created_by.map(|u| u.0))
        .bind(agent.last_run_at)
        .bind(agent.next_run_at)
        .bind(agent.created_at)
        .execute(&self.pool)
        .await
        .map_err(map_db)?;
        Ok(())
    }

    async fn update_agent_status(
        &self,
        org: OrganizationId,
        id: AgentId,
        status: AgentStatus,
        next_run_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        let result = sqlx::query(
            "UPDATE agents SET status = $3, next_run_at = $4
             WHERE id = $1 AND organization_id = $2",
        )
        .bind(id.0)
        .bind(org.0)
        .bind(status.as_ref())
        .bind(next_run_at)
        .execute(&self.pool)
        .await
        .map_err(map_db)?;
        if result.rows_affected() == 0 {
            return Err(GrcError::not_found("agent", id));
        }
        Ok(())
    }

    async fn record_agent_run(
        &self,
        id: AgentId,
        last_run_at: DateTime<Utc>,
        next_run_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        let result = sqlx::query("UPDATE agents SET last_run_at = $2, next_run_at = $3 WHERE id = $1")
            .bind(id.0)
            .bind(last_run_at)
            .bind(next_run_at)
            .execute(&self.pool)
            .await
            .map_err(map_db)?;
        if result.rows_affected() == 0 {
            return Err(GrcError::not_found("agent", id));
        }
        Ok(())
    }

    async fn list_due_agents(&self, now: DateTime<Utc>) -> Result<Vec<Agent>> {
        let sql = format!(
            "SELECT {AGENT_COLUMNS} FROM agents
             WHERE status = 'active' AND schedule <> 'manual'
               AND next_run_at IS NOT NULL AND next_run_at <= $1
             ORDER BY next_run_at"
        );
        let rows = sqlx::query(&sql)
            .bind(now)
            .fetch_all(&self.pool)
            .await
            .map_err(map_db)?;
        rows.iter().map(row_to_agent).collect()
    }

    async fn get_agent_type(
        &self,
        org: OrganizationId,
        id: AgentTypeId,
    ) -> Result<Option<AgentType>> {
        let row = sqlx::query(
            "SELECT id, organization_id, name, description, skills, is_default, created_at
             FROM agent_types WHERE id = $1 AND organization_id = $2",
        )
        .bind(id.0)
        .bind(org.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_db)?;
        row.as_ref().map(row_to_agent_type).transpose()
    }

    async fn list_agent_types(&self, org: OrganizationId) -> Result<Vec<AgentType>> {
        let rows = sqlx::query(
            "SELECT id, organization_id, name, description, skills, is_default, created_at
             FROM agent_types WHERE organization_id = $1
             ORDER BY is_default DESC, created_at",
        )
        .bind(org.0)
        .fetch_all(&self.pool)
        .await
        .map_err(map_db)?;
        rows.iter().map(row_to_agent_type).collect()
    }

    async fn insert_agent_type(&self, agent_type: &AgentType) -> Result<()> {
        sqlx::query(
            "INSERT INTO agent_types (id, organization_id, name, description, skills, is_default, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(agent_type.id.0)
        .bind(agent_type.organization_id.0)
        .bind(&agent_type.name)
        .bind(&agent_type.description)
        .bind(&agent_type.skills)
        .bind(agent_type.is_default)
        .bind(agent_type.created_at)
        .execute(&self.pool)
        .await
        .map_err(map_db)?;
        Ok(())
    }

    async fn update_agent_type_skills(
        &self,
        org: OrganizationId,
        id: AgentTypeId,
        skills: &[String],
    ) -> Result<()> {
        let result = sqlx::query(
            "UPDATE agent_types SET skills = $3 WHERE id = $1 AND organization_id = $2",
        )
        .bind(id.0)
        .bind(org.0)
        .bind(skills)
        .execute(&self.pool)
        .await
        .map_err(map_db)?;
        if result.rows_affected() == 0 {
            return Err(GrcError::not_found("agent_type", id));
        }
        Ok(())
    }

    async fn delete_agent_type(&self, org: OrganizationId, id: AgentTypeId) -> Result<()> {
        let result = sqlx::query("DELETE FROM agent_types WHERE id = $1 AND organization_id = $2")
            .bind(id.0)
            .bind(org.0)
            .execute(&self.pool)
            .await
            .map_err(map_db)?;
        if result.rows_affected() == 0 {
            return Err(GrcError::not_found("agent_type", id));
        }
        Ok(())
    }

    async fn insert_task(&self, task: &AgentTask) -> Result<()> {
        sqlx::query(
            "INSERT INTO agent_tasks (id, task_id, organization_id, run_id, agent_id, title,
                 description, skill_used, action_type, status, result, error_message,
                 requires_approval, approved_by, approved_at, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)",
        )
        .bind(task.id.0)
        .bind(&task.task_id)
        .bind(task.organization_id.0)
        .bind(task.run_id.0)
        .bind(task.agent_id.0)
        .bind(&task.title)
        .bind(&task.description)
        .bind(&task.skill_used)
        .bind(task.action_type.as_ref())
        .bind(task.status.as_ref())
        .bind(&task.result)
        .bind(&task.error_message)
        .bind(task.requires_approval)
        .bind(task.approved_by.map(|u| u.0))
        .bind(task.approved_at)
        .bind(task.created_at)
        .bind(task.updated_at)
        .execute(&self.pool)
        .await
        .map_err(map_db)?;
        Ok(())
    }

    async fn get_task(&self, id: TaskId) -> Result<Option<AgentTask>> {
        let sql = format!("SELECT {TASK_COLUMNS} FROM agent_tasks WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_db)?;
        row.as_ref().map(row_to_task).transpose()
    }

    async fn update_task(&self, task: &AgentTask) -> Result<()> {
        let result = sqlx::query(
            "UPDATE agent_tasks
             SET status = $2, result = $3, error_message = $4, approved_by = $5,
                 approved_at = $6, updated_at = $7
             WHERE id = $1",
        )
        .bind(task.id.0)
        .bind(task.status.as_ref())
        .bind(&task.result)
        .bind(&task.error_message)
        .bind(task.approved_by.map(|u| u.0))
        .bind(task.approved_at)
        .bind(task.updated_at)
        .execute(&self.pool)
        .await
        .map_err(map_db)?;
        if result.rows_affected() == 0 {
            return Err(GrcError::not_found("agent_task", task.id));
        }
        Ok(())
    }

    #[instrument(skip(self, task), fields(task_id = %task.task_id))]
    async fn transition_task(&self, task: &AgentTask, from: TaskStatus) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE agent_tasks
             SET status = $2, result = $3, error_message = $4, approved_by = $5,
                 approved_at = $6, updated_at = $7
             WHERE id = $1 AND status = $8",
        )
        .bind(task.id.0)
        .bind(task.status.as_ref())
        .bind(&task.result)
        .bind(&task.error_message)
        .bind(task.approved_by.map(|u| u.0))
        .bind(task.approved_at)
        .bind(task.updated_at)
        .bind(from.as_ref())
        .execute(&self.pool)
        .await
        .map_err(map_db)?;
        Ok(result.rows_affected() == 1)
    }

    async fn list_tasks(&self, org: OrganizationId, filter: &TaskFilter) -> Result<Vec<AgentTask>> {
        let sql = format!(
            "SELECT {TASK_COLUMNS} FROM agent_tasks
             WHERE organization_id = $1
               AND ($2::text IS NULL OR status = $2)
               AND ($3::uuid IS NULL OR run_id = $3)
               AND ($4::uuid IS NULL OR agent_id = $4)
             ORDER BY created_at DESC
             LIMIT $5"
        );
        let rows = sqlx::query(&sql)
            .bind(org.0)
            .bind(filter.status.map(|s| s.to_string()))
            .bind(filter.run_id.map(|r| r.0))
            .bind(filter.agent_id.map(|a| a.0))
            .bind(filter.limit.map(|l| l as i64))
            .fetch_all(&self.pool)
            .await
            .map_err(map_db)?;
        rows.iter().map(row_to_task).collect()
    }

    async fn list_recent_risks(&self, org: OrganizationId, limit: usize) -> Result<Vec<Risk>> {
        let sql = format!(
            "SELECT {RISK_COLUMNS} FROM risks WHERE organization_id = $1
             ORDER BY created_at DESC LIMIT $2"
        );
        let rows = sqlx::query(&sql)
            .bind(org.0)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(map_db)?;
        rows.iter().map(row_to_risk).collect()
    }

    async fn count_records(&self, org: OrganizationId, kind: RecordKind) -> Result<u64> {
        let table = match kind {
            RecordKind::Risk => "risks",
            RecordKind::Incident => "incidents",
            RecordKind::Policy => "policies",
        };
        let sql = format!("SELECT COUNT(*) FROM {table} WHERE organization_id = $1");
        let count: i64 = sqlx::query_scalar(&sql)
            .bind(org.0)
            .fetch_one(&self.pool)
            .await
            .map_err(map_db)?;
        Ok(count.max(0) as u64)
    }

    async fn insert_risk(&self, risk: &Risk) -> Result<()> {
        sqlx::query(
            "INSERT INTO risks (id, organization_id, risk_id, title, description, category,
                 likelihood, impact, inherent_score, residual_score, status, owner, created_by, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)",
        )
        .bind(risk.id)
        .bind(risk.organization_id.0)
        .bind(&risk.risk_id)
        .bind(&risk.title)
        .bind(&risk.description)
        .bind(&risk.category)
        .bind(risk.likelihood)
        .bind(risk.impact)
        .bind(risk.inherent_score)
        .bind(risk.residual_score)
        .bind(&risk.status)
        .bind(&risk.owner)
        .bind(risk.created_by.map(|u| u.0))
        .bind(risk.created_at)
        .execute(&self.pool)
        .await
        .map_err(map_db)?;
        Ok(())
    }

    async fn insert_incident(&self, incident: &Incident) -> Result<()> {
        sqlx::query(
            "INSERT INTO incidents (id, organization_id, incident_id, title, description,
                 severity, status, detected_at, created_by, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        )
        .bind(incident.id)
        .bind(incident.organization_id.0)
        .bind(&incident.incident_id)
        .bind(&incident.title)
        .bind(&incident.description)
        .bind(incident.severity.as_ref())
        .bind(&incident.status)
        .bind(incident.detected_at)
        .bind(incident.created_by.map(|u| u.0))
        .bind(incident.created_at)
        .execute(&self.pool)
        .await
        .map_err(map_db)?;
        Ok(())
    }

    async fn insert_policy(&self, policy: &Policy) -> Result<()> {
        sqlx::query(
            "INSERT INTO policies (id, organization_id, policy_id, title, description, category,
                 content, status, version, created_by, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
        )
        .bind(policy.id)
        .bind(policy.organization_id.0)
        .bind(&policy.policy_id)
        .bind(&policy.title)
        .bind(&policy.description)
        .bind(&policy.category)
        .bind(&policy.content)
        .bind(&policy.status)
        .bind(&policy.version)
        .bind(policy.created_by.map(|u| u.0))
        .bind(policy.created_at)
        .execute(&self.pool)
        .await
        .map_err(map_db)?;
        Ok(())
    }

    async fn get_settings(&self, org: OrganizationId) -> Result<OrganizationSettings> {
        let value: Option<Value> =
            sqlx::query_scalar("SELECT settings FROM organizations WHERE id = $1")
                .bind(org.0)
                .fetch_optional(&self.pool)
                .await
                .map_err(map_db)?;
        OrganizationSettings::from_value(value.unwrap_or(Value::Null))
    }

    async fn save_settings(
        &self,
        org: OrganizationId,
        settings: &OrganizationSettings,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO organizations (id, settings) VALUES ($1, $2)
             ON CONFLICT (id) DO UPDATE SET settings = EXCLUDED.settings, updated_at = NOW()",
        )
        .bind(org.0)
        .bind(settings.to_value()?)
        .execute(&self.pool)
        .await
        .map_err(map_db)?;
        Ok(())
    }

    /// Single-statement read-modify-write on the settings document
    #[instrument(skip(self))]
    async fn increment_agent_run_count(
        &self,
        org: OrganizationId,
        now: DateTime<Utc>,
    ) -> Result<OrganizationSettings> {
        let started_at = now.to_rfc3339_opts(SecondsFormat::Micros, true);
        let value: Value = sqlx::query_scalar(
            "INSERT INTO organizations (id, settings)
             VALUES ($1, jsonb_build_object('agent_run_count', 1, 'agent_trial_started_at', $2::text))
             ON CONFLICT (id) DO UPDATE SET
                 settings = jsonb_set(
                     CASE WHEN organizations.settings->>'agent_trial_started_at' IS NULL
                          THEN organizations.settings || jsonb_build_object('agent_trial_started_at', $2::text)
                          ELSE organizations.settings
                     END,
                     '{agent_run_count}',
                     to_jsonb(COALESCE((organizations.settings->>'agent_run_count')::bigint, 0) + 1)
                 ),
                 updated_at = NOW()
             RETURNING settings",
        )
        .bind(org.0)
        .bind(started_at)
        .fetch_one(&self.pool)
        .await
        .map_err(map_db)?;
        OrganizationSettings::from_value(value)
    }

    #[instrument(skip(self))]
    async fn apply_credit_purchase(
        &self,
        org: OrganizationId,
        purchase_id: &str,
        credits: u64,
    ) -> Result<Option<OrganizationSettings>> {
        self.modify_settings(org, |settings| {
            settings
                .record_credit_purchase(purchase_id, credits)
                .then(|| settings.clone())
        })
        .await
    }

    #[instrument(skip(self, entry))]
    async fn set_requirement_status(
        &self,
        org: OrganizationId,
        framework: &str,
        requirement: &str,
        entry: &RequirementEntry,
    ) -> Result<Option<RequirementEntry>> {
        self.modify_settings(org, |settings| {
            let previous = settings.set_requirement(framework, requirement, entry.clone());
            settings.activate_framework(framework);
            previous
        })
        .await
    }

    async fn get_subscription(&self, org: OrganizationId) -> Result<Option<Subscription>> {
        let row = sqlx::query(
            "SELECT organization_id, agent_plan, status, updated_at
             FROM subscriptions WHERE organization_id = $1",
        )
        .bind(org.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_db)?;

        let Some(row) = row else {
            return Ok(None);
        };
        let plan: Option<String> = row.try_get("agent_plan").map_err(map_db)?;
        Ok(Some(Subscription {
            organization_id: OrganizationId(row.try_get("organization_id").map_err(map_db)?),
            // Unrecognised plans from the billing side are treated as no add-on
            agent_plan: plan.and_then(|p| p.parse().ok()),
            status: parse_column(&row, "status")?,
            updated_at: row.try_get("updated_at").map_err(map_db)?,
        }))
    }

    async fn upsert_subscription(&self, subscription: &Subscription) -> Result<()> {
        sqlx::query(
            "INSERT INTO subscriptions (organization_id, agent_plan, status, updated_at)
             VALUES ($1, $2, $3, $4)
             ON CONFLICT (organization_id) DO UPDATE SET
                 agent_plan = EXCLUDED.agent_plan,
                 status = EXCLUDED.status,
                 updated_at = EXCLUDED.updated_at",
        )
        .bind(subscription.organization_id.0)
        .bind(subscription.agent_plan.map(|p| p.to_string()))
        .bind(subscription.status.as_ref())
        .bind(subscription.updated_at)
        .execute(&self.pool)
        .await
        .map_err(map_db)?;
        Ok(())
    }

    async fn member_role(&self, org: OrganizationId, user: UserId) -> Result<Option<MemberRole>> {
        let role: Option<String> = sqlx::query_scalar(
            "SELECT role FROM organization_members WHERE organization_id = $1 AND user_id = $2",
        )
        .bind(org.0)
        .bind(user.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_db)?;

        role.map(|r| {
            r.parse().map_err(|_| GrcError::InvalidValue {
                field: "role".to_string(),
                value: r,
            })
        })
        .transpose()
    }

    async fn insert_audit(&self, entry: &AuditEntry) -> Result<()> {
        sqlx::query(
            "INSERT INTO audit_logs (id, organization_id, user_id, actor, action, entity_type,
                 entity_id, old_values, new_values, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        )
        .bind(entry.id)
        .bind(entry.organization_id.0)
        .bind(entry.user_id.map(|u| u.0))
        .bind(&entry.actor)
        .bind(&entry.action)
        .bind(&entry.entity_type)
        .bind(&entry.entity_id)
        .bind(&entry.old_values)
        .bind(&entry.new_values)
        .bind(entry.created_at)
        .execute(&self.pool)
        .await
        .map_err(map_db)?;
        Ok(())
    }

    async fn list_audit(&self, org: OrganizationId, limit: usize) -> Result<Vec<AuditEntry>> {
        let rows = sqlx::query(
            "SELECT id, organization_id, user_id, actor, action, entity_type, entity_id,
                    old_values, new_values, created_at
             FROM audit_logs WHERE organization_id = $1
             ORDER BY created_at DESC LIMIT $2",
        )
        .bind(org.0)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(map_db)?;
        rows.iter().map(row_to_audit).collect()
    }
}
