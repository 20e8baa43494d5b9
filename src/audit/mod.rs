//! Audit trail: append-only mutation records with an admin read endpoint.
//! Recording is best-effort and never blocks or fails the originating
//! request.

pub mod api;
pub mod models;
pub mod store;

use std::sync::Arc;

use tracing::warn;

pub use models::{AuditAction, AuditEntry, AuditEvent, AuditQuery, ResourceType};
pub use store::AuditStore;

/// Record an audit event on a background task. Storage failures are logged
/// and swallowed.
pub fn record(store: &Arc<AuditStore>, event: AuditEvent) {
    let store = Arc::clone(store);
    tokio::spawn(async move {
        if let Err(e) = store.append(&event) {
            warn!(
                action = event.action.as_str(),
                resource = event.resource_type.as_str(),
                "failed to record audit entry: {e:#}"
            );
        }
    });
}
