//! # GRC Agent Platform HTTP API
//!
//! axum server in front of the agent runtime. Identity comes from the
//! upstream auth gateway (`x-user-id`, `x-organization-id`); internal cron and
//! billing relays authenticate with shared bearer secrets.
//!
//! ```text
//! ┌─────────────────────┐
//! │   REST Endpoints    │ <- /agents, /agent-types, /tasks, /usage, /skills
//! ├─────────────────────┤
//! │  Internal Relays    │ <- /internal/cron/agents, /internal/billing/events
//! ├─────────────────────┤
//! │   Agent Platform    │ <- runner, approvals, scheduler, usage, billing
//! ├─────────────────────┤
//! │      GrcStore       │ <- PostgreSQL or in-memory
//! └─────────────────────┘
//! ```
//!
//! The OpenAPI document is served at `/api-doc/openapi.json`.

pub mod context;
pub mod error;
pub mod middleware;
pub mod openapi;
pub mod routes;
pub mod server;
pub mod types;

pub use context::RequestContext;
pub use error::{ApiError, ApiResult};
pub use server::{build_router, AppState, GrcServer};
pub use types::*;
