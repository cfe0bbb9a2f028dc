//! Human-in-the-loop review of agent writes

pub mod approval;
pub mod audit;
pub mod write_action;

pub use approval::{ApprovalOutcome, ApprovalService};
pub use audit::AuditLogger;
pub use write_action::{WriteAction, WriteActionError};
