//! Applies payment-provider effects to the organization's usage ledger.

use chrono::Utc;
use grc_common::{AgentPlan, AuditEntry, OrganizationId, Principal, Subscription, SubscriptionStatus};
use grc_storage::GrcStore;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{info, instrument};
use utoipa::ToSchema;

use crate::error::{RuntimeError, RuntimeResult};
use crate::hitl::AuditLogger;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BillingEvent {
    CreditsPurchased {
        organization_id: OrganizationId,
        credits: u64,
        /// Provider-side id; redelivered events carry the same value
        purchase_id: String,
    },
    AgentPlanChanged {
        organization_id: OrganizationId,
        #[serde(default)]
        agent_plan: Option<AgentPlan>,
        status: SubscriptionStatus,
    },
}

impl BillingEvent {
    pub fn organization_id(&self) -> OrganizationId {
        match self {
            Self::CreditsPurchased { organization_id, .. } | Self::AgentPlanChanged { organization_id, .. } => {
                *organization_id
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct BillingEventResult {
    /// False when the event had already been applied
    pub applied: bool,
    pub credits_purchased: Option<u64>,
    pub subscription: Option<Subscription>,
}

#[derive(Clone)]
pub struct BillingLedger {
    store: Arc<dyn GrcStore>,
    audit: AuditLogger,
}

impl BillingLedger {
    pub fn new(store: Arc<dyn GrcStore>, audit: AuditLogger) -> Self {
        Self { store, audit }
    }

    #[instrument(skip(self), fields(organization_id = %event.organization_id()))]
    pub async fn apply_event(&self, event: BillingEvent) -> RuntimeResult<BillingEventResult> {
        match event {
            BillingEvent::CreditsPurchased {
                organization_id,
                credits,
                purchase_id,
            } => self.add_credits(organization_id, credits, purchase_id).await,
            BillingEvent::AgentPlanChanged {
                organization_id,
                agent_plan,
                status,
            } => self.change_plan(organization_id, agent_plan, status).await,
        }
    }

    async fn add_credits(
        &self,
        organization_id: OrganizationId,
        credits: u64,
        purchase_id: String,
    ) -> RuntimeResult<BillingEventResult> {
        if credits == 0 {
            return Err(RuntimeError::validation("credits must be greater than zero"));
        }
        let purchase_id = purchase_id.trim().to_string();
        if purchase_id.is_empty() {
            return Err(RuntimeError::validation("purchase_id must not be empty"));
        }

        let Some(settings) = self
            .store
            .apply_credit_purchase(organization_id, &purchase_id, credits)
            .await?
        else {
            info!("Purchase {} already credited, skipping", purchase_id);
            let settings = self.store.get_settings(organization_id).await?;
            return Ok(BillingEventResult {
                applied: false,
                credits_purchased: Some(settings.agent_credits_purchased),
                subscription: None,
            });
        };

        let previous = settings.agent_credits_purchased.saturating_sub(credits);
        info!(
            "Credited {} agent runs to organization {} ({} total)",
            credits, organization_id, settings.agent_credits_purchased
        );

        self.audit
            .record(
                AuditEntry::new(
                    organization_id,
                    Principal::Billing,
                    "billing.credits_purchased",
                    "organization",
                    organization_id,
                )
                .with_old_values(json!({ "agent_credits_purchased": previous }))
                .with_new_values(json!({
                    "agent_credits_purchased": settings.agent_credits_purchased,
                    "purchase_id": purchase_id,
                })),
            )
            .await;

        Ok(BillingEventResult {
            applied: true,
            credits_purchased: Some(settings.agent_credits_purchased),
            subscription: None,
        })
    }

    async fn change_plan(
        &self,
        organization_id: OrganizationId,
        agent_plan: Option<AgentPlan>,
        status: SubscriptionStatus,
    ) -> RuntimeResult<BillingEventResult> {
        let previous = self.store.get_subscription(organization_id).await?;
        let subscription = Subscription {
            organization_id,
            agent_plan,
            status,
            updated_at: Utc::now(),
        };
        self.store.upsert_subscription(&subscription).await?;

        let mut entry = AuditEntry::new(
            organization_id,
            Principal::Billing,
            "billing.agent_plan_changed",
            "subscription",
            organization_id,
        )
        .with_new_values(json!({ "agent_plan": agent_plan, "status": status }));
        if let Some(previous) = previous {
            entry = entry.with_old_values(json!({
                "agent_plan": previous.agent_plan,
                "status": previous.status,
            }));
        }
        self.audit.record(entry).await;

        Ok(BillingEventResult {
            applied: true,
            credits_purchased: None,
            subscription: Some(subscription),
        })
    }
}
