//! Append-only audit trail.
//!
//! Writes are a non-transactional side effect: [`AuditTrail::record`] may fail
//! silently and callers never observe the outcome.

use std::sync::Arc;

use async_trait::async_trait;

use crate::model::{AuditPage, NewAuditEvent};
use crate::store::Store;

/// Destination of audit events.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn append(&self, event: NewAuditEvent) -> anyhow::Result<()>;
}

#[async_trait]
impl AuditSink for Store {
    async fn append(&self, event: NewAuditEvent) -> anyhow::Result<()> {
        self.insert_audit_event(&event).await?;
        Ok(())
    }
}

#[derive(Clone)]
pub struct AuditTrail {
    sink: Arc<dyn AuditSink>,
}

impl std::fmt::Debug for AuditTrail {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditTrail").finish_non_exhaustive()
    }
}

impl AuditTrail {
    pub fn new(sink: Arc<dyn AuditSink>) -> Self {
        Self { sink }
    }

    /// Audit trail writing to the store's `audit_events` table.
    pub fn from_store(store: Store) -> Self {
        Self::new(Arc::new(store))
    }

    /// Record an event. Failures are logged and swallowed.
    pub async fn record(
        &self,
        tenant_id: Option<&str>,
        event_type: &str,
        message: impl Into<String>,
        actor_id: Option<&str>,
        metadata: Option<serde_json::Value>,
    ) {
        let event = NewAuditEvent {
            tenant_id: tenant_id.map(str::to_string),
            event_type: event_type.to_string(),
            message: message.into(),
            actor_id: actor_id.map(str::to_string),
            metadata,
        };

        match self.sink.append(event).await {
            Ok(()) => tracing::debug!(event_type, tenant_id, "Audit event recorded"),
            Err(e) => tracing::warn!(
                event_type,
                tenant_id,
                error = %e,
                "Failed to record audit event"
            ),
        }
    }
}

/// Paginated, newest-first read of the audit table.
pub async fn list_events(
    store: &Store,
    tenant_id: Option<&str>,
    page: u32,
    per_page: u32,
) -> Result<AuditPage, sqlx::Error> {
    store.list_audit_events(tenant_id, page, per_page).await
}
