//! Usage gate for manually triggered runs.
//!
//! The decision itself is [`evaluate`], a pure function over [`UsageInputs`]
//! and a caller-supplied clock. [`UsageGate`] only loads those inputs from
//! the store and bumps the counter after a successful run.

use chrono::{DateTime, Utc};
use grc_common::{OrganizationId, OrganizationSettings, Subscription};
use grc_storage::GrcStore;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, instrument};
use utoipa::ToSchema;

use crate::error::RuntimeResult;

pub const TRIAL_LENGTH_DAYS: i64 = 14;
pub const FREE_ACTION_LIMIT: u64 = 10;

const MILLIS_PER_DAY: f64 = 86_400_000.0;

pub const TRIAL_EXPIRED_REASON: &str = "Your 14-day free trial has ended. Purchase agent credits or \
     add the unlimited agent plan to keep running agents.";
pub const FREE_ACTIONS_EXHAUSTED_REASON: &str = "You have used all 10 free agent actions. Purchase \
     agent credits or add the unlimited agent plan to keep running agents.";

/// Everything the decision depends on, decoded from settings and billing
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UsageInputs {
    pub run_count: u64,
    pub trial_started_at: Option<DateTime<Utc>>,
    pub credits_purchased: u64,
    pub has_unlimited_plan: bool,
}

impl UsageInputs {
    pub fn from_records(settings: &OrganizationSettings, subscription: Option<&Subscription>) -> Self {
        Self {
            run_count: settings.agent_run_count,
            trial_started_at: settings.agent_trial_started_at,
            credits_purchased: settings.agent_credits_purchased,
            has_unlimited_plan: subscription
                .map(Subscription::has_active_unlimited_plan)
                .unwrap_or(false),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct UsageStatus {
    pub allowed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub run_count: u64,
    pub trial_started_at: Option<DateTime<Utc>>,
    pub trial_expired: bool,
    pub trial_days_remaining: i64,
    pub free_actions_remaining: u64,
    pub credits_remaining: u64,
    pub has_unlimited_plan: bool,
}

/// Credits left once the free allotment is used up
pub fn credits_remaining(run_count: u64, credits_purchased: u64) -> u64 {
    let paid_runs = run_count.saturating_sub(FREE_ACTION_LIMIT);
    credits_purchased.saturating_sub(paid_runs)
}

pub fn evaluate(inputs: &UsageInputs, now: DateTime<Utc>) -> UsageStatus {
    let elapsed_days = inputs
        .trial_started_at
        .map(|started| (now - started).num_milliseconds() as f64 / MILLIS_PER_DAY);

    let trial_expired = elapsed_days
        .map(|days| days > TRIAL_LENGTH_DAYS as f64)
        .unwrap_or(false);
    let trial_days_remaining = match elapsed_days {
        Some(days) => ((TRIAL_LENGTH_DAYS as f64 - days).ceil() as i64).max(0),
        None => TRIAL_LENGTH_DAYS,
    };
    let free_actions_remaining = FREE_ACTION_LIMIT.saturating_sub(inputs.run_count);
    let credits_remaining = credits_remaining(inputs.run_count, inputs.credits_purchased);

    let (allowed, reason) = if inputs.has_unlimited_plan {
        (true, None)
    } else if !trial_expired && inputs.run_count < FREE_ACTION_LIMIT {
        (true, None)
    } else if credits_remaining > 0 {
        (true, None)
    } else if trial_expired {
        (false, Some(TRIAL_EXPIRED_REASON.to_string()))
    } else {
        (false, Some(FREE_ACTIONS_EXHAUSTED_REASON.to_string()))
    };

    UsageStatus {
        allowed,
        reason,
        run_count: inputs.run_count,
        trial_started_at: inputs.trial_started_at,
        trial_expired,
        trial_days_remaining,
        free_actions_remaining,
        credits_remaining,
        has_unlimited_plan: inputs.has_unlimited_plan,
    }
}

#[derive(Clone)]
pub struct UsageGate {
    store: Arc<dyn GrcStore>,
}

impl UsageGate {
    pub fn new(store: Arc<dyn GrcStore>) -> Self {
        Self { store }
    }

    #[instrument(skip(self))]
    pub async fn check_usage(
        &self,
        organization_id: OrganizationId,
        now: DateTime<Utc>,
    ) -> RuntimeResult<UsageStatus> {
        let settings = self.store.get_settings(organization_id).await?;
        let subscription = self.store.get_subscription(organization_id).await?;
        let status = evaluate(
            &UsageInputs::from_records(&settings, subscription.as_ref()),
            now,
        );
        debug!(allowed = status.allowed, run_count = status.run_count, "Usage evaluated");
        Ok(status)
    }

    /// Count one run; the first call starts the trial clock
    #[instrument(skip(self))]
    pub async fn increment_usage(
        &self,
        organization_id: OrganizationId,
        now: DateTime<Utc>,
    ) -> RuntimeResult<OrganizationSettings> {
        Ok(self.store.increment_agent_run_count(organization_id, now).await?)
    }
}
