use anyhow::{Context, Result};
use axum::{
    middleware,
    routing::{delete, get, patch, post, put},
    Json, Router,
};
use chrono::Utc;
use grc_agent_runtime::AgentPlatform;
use grc_common::SystemConfig;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::info;
use utoipa::OpenApi;

use crate::middleware::{get_tracing_layer, logging_middleware};
use crate::openapi::ApiDoc;
use crate::routes::{agent_types, agents, internal, skills, tasks, usage};
use crate::types::HealthResponse;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub platform: AgentPlatform,
    pub config: Arc<SystemConfig>,
}

pub struct GrcServer {
    state: AppState,
}

impl GrcServer {
    pub fn new(platform: AgentPlatform, config: SystemConfig) -> Self {
        Self {
            state: AppState {
                platform,
                config: Arc::new(config),
            },
        }
    }

    pub fn router(&self) -> Router {
        build_router(self.state.clone())
    }

    /// Bind the configured address and serve until shutdown
    pub async fn run(self) -> Result<()> {
        let addr = format!("{}:{}", self.state.config.server.host, self.state.config.server.port);
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .with_context(|| format!("Failed to bind {}", addr))?;
        info!("GRC API listening on {}", addr);
        info!("OpenAPI document at http://{}/api-doc/openapi.json", addr);

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown_signal())
            .await
            .context("Server error")?;
        info!("Server stopped");
        Ok(())
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/skills", get(skills::list_skills))
        .route("/usage", get(usage::get_usage))
        .route("/agents", get(agents::list_agents).post(agents::create_agent))
        .route("/agents/:id", delete(agents::delete_agent))
        .route("/agents/:id/status", patch(agents::update_agent_status))
        .route("/agents/:id/run", post(agents::run_agent))
        .route(
            "/agent-types",
            get(agent_types::list_agent_types).post(agent_types::create_agent_type),
        )
        .route("/agent-types/:id", delete(agent_types::delete_agent_type))
        .route("/agent-types/:id/skills", put(agent_types::update_agent_type_skills))
        .route("/tasks", get(tasks::list_tasks))
        .route("/tasks/:id/approve", post(tasks::approve_task))
        .route("/tasks/:id/decline", post(tasks::decline_task))
        .route("/internal/cron/agents", post(internal::run_scheduled_agents))
        .route("/internal/billing/events", post(internal::apply_billing_event))
        .route("/api-doc/openapi.json", get(openapi_json))
        .layer(middleware::from_fn(logging_middleware))
        .layer(get_tracing_layer())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Liveness check
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is up", body = HealthResponse),
    ),
    tag = "health"
)]
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        message: Some(format!("grc-api {}", env!("CARGO_PKG_VERSION"))),
        timestamp: Utc::now(),
    })
}

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
    info!("Shutdown signal received");
}
