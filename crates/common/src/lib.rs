//! Common types and utilities shared across all crates

pub mod config;
pub mod error;
pub mod frameworks;
pub mod settings;
pub mod telemetry;
pub mod types;

pub use config::*;
pub use error::{GrcError, Result};
pub use frameworks::{find_framework, Framework, FrameworkRequirement, FRAMEWORKS};
pub use settings::*;
pub use telemetry::{init_tracing_with_level, shutdown_tracer};
pub use types::*;
