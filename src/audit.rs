//! Best-effort audit trail.
//!
//! Writes go through a Tokio task so they never sit on the response path,
//! and a failed insert is logged and swallowed: the triggering operation has
//! already succeeded and must not be rolled back or reported as failed over
//! a missing audit row.

use crate::models::audit::AuditEntry;
use crate::store::sqlite::SqliteStore;

pub fn record(db: SqliteStore, entry: AuditEntry) {
    tokio::spawn(async move {
        if let Err(e) = db.insert_audit(&entry).await {
            tracing::error!(
                action = %entry.action,
                resource_type = %entry.resource_type,
                "failed to write audit log: {}",
                e
            );
        } else {
            tracing::debug!(action = %entry.action, "audit log recorded");
        }
    });
}
