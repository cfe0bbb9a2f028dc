//! Audit sink with OpenTelemetry integration

use grc_common::AuditEntry;
use grc_storage::GrcStore;
use opentelemetry::trace::TraceContextExt;
use opentelemetry::KeyValue;
use std::sync::Arc;
use tracing::{info, span, warn, Instrument, Level};

#[derive(Clone)]
pub struct AuditLogger {
    store: Arc<dyn GrcStore>,
}

impl AuditLogger {
    pub fn new(store: Arc<dyn GrcStore>) -> Self {
        Self { store }
    }

    /// Persist an audit entry. Failures are logged and never surface to the caller.
    pub async fn record(&self, entry: AuditEntry) {
        let span = span!(
            Level::INFO,
            "audit.event",
            organization_id = %entry.organization_id,
            actor = %entry.actor,
            action = %entry.action,
            entity_id = %entry.entity_id,
        );
        {
            let _enter = span.enter();

            let cx = opentelemetry::Context::current();
            cx.span().add_event(
                "audit_event",
                vec![
                    KeyValue::new("audit.action", entry.action.clone()),
                    KeyValue::new("audit.actor", entry.actor.clone()),
                    KeyValue::new("audit.entity_type", entry.entity_type.clone()),
                    KeyValue::new("audit.entity_id", entry.entity_id.clone()),
                ],
            );

            info!(
                target: "audit",
                action = %entry.action,
                entity_type = %entry.entity_type,
                entity_id = %entry.entity_id,
                "Audit event"
            );
        }

        if let Err(e) = self.store.insert_audit(&entry).instrument(span).await {
            warn!(target: "audit", action = %entry.action, "Failed to persist audit entry: {}", e);
        }
    }
}
