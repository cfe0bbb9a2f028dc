//! Machine-to-machine endpoints guarded by shared bearer secrets

use axum::{extract::State, http::HeaderMap, Json};
use chrono::Utc;
use grc_agent_runtime::{BillingEvent, BillingEventResult, SchedulerReport};
use tracing::{info, instrument};

use crate::context::require_bearer;
use crate::error::ApiResult;
use crate::server::AppState;
use crate::types::ErrorResponse;

/// Run every due agent once
///
/// Called by an external cron. Scheduled runs do not consume usage.
#[utoipa::path(
    post,
    path = "/internal/cron/agents",
    responses(
        (status = 200, description = "Sweep finished", body = SchedulerReport),
        (status = 401, description = "Missing or wrong cron secret", body = ErrorResponse),
    ),
    security(("bearer" = [])),
    tag = "internal"
)]
#[instrument(skip_all)]
pub async fn run_scheduled_agents(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<SchedulerReport>> {
    require_bearer(&headers, state.config.security.cron_secret.as_deref())?;
    let report = state.platform.scheduler.run_due_agents(Utc::now()).await?;
    info!("Scheduler sweep ran {} agents", report.agents_run);
    Ok(Json(report))
}

/// Apply a credit purchase or plan change relayed from the payment provider
#[utoipa::path(
    post,
    path = "/internal/billing/events",
    request_body = BillingEvent,
    responses(
        (status = 200, description = "Event applied or already seen", body = BillingEventResult),
        (status = 400, description = "Invalid event", body = ErrorResponse),
        (status = 401, description = "Missing or wrong billing secret", body = ErrorResponse),
    ),
    security(("bearer" = [])),
    tag = "internal"
)]
#[instrument(skip_all)]
pub async fn apply_billing_event(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(event): Json<BillingEvent>,
) -> ApiResult<Json<BillingEventResult>> {
    require_bearer(&headers, state.config.security.billing_secret.as_deref())?;
    Ok(Json(state.platform.billing.apply_event(event).await?))
}
