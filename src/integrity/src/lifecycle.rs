use common::model::{Tenant, TenantStatus};
use common::{AuditTrail, QuarantineTenant, Store};

use crate::error::{IntegrityError, PreconditionFailure, Result};

pub const TENANT_STATUS_CHANGED_EVENT: &str = "tenant.status_changed";

/// Tenant lookup and status changes, the first step of the deletion gate.
pub struct TenantLifecycle<'a> {
    store: &'a Store,
    quarantine: Option<&'a QuarantineTenant>,
    audit: &'a AuditTrail,
}

impl<'a> TenantLifecycle<'a> {
    pub fn new(
        store: &'a Store,
        quarantine: Option<&'a QuarantineTenant>,
        audit: &'a AuditTrail,
    ) -> Self {
        Self {
            store,
            quarantine,
            audit,
        }
    }

    pub async fn get_tenant(&self, tenant_id: &str) -> Result<Tenant> {
        self.store
            .get_tenant(tenant_id)
            .await?
            .ok_or_else(|| IntegrityError::NotFound(format!("tenant {tenant_id}")))
    }

    pub async fn set_status(
        &self,
        tenant_id: &str,
        status: TenantStatus,
        actor: Option<&str>,
    ) -> Result<Tenant> {
        let tenant = self.get_tenant(tenant_id).await?;
        if self.quarantine.is_some_and(|q| q.id == tenant.id) {
            return Err(PreconditionFailure::QuarantineTenantProtected.into());
        }
        if tenant.status == status {
            return Ok(tenant);
        }

        if !self.store.set_tenant_status(&tenant.id, status).await? {
            return Err(IntegrityError::NotFound(format!("tenant {tenant_id}")));
        }
        tracing::info!(
            tenant_id = %tenant.id,
            from = %tenant.status,
            to = %status,
            "Tenant status changed"
        );

        self.audit
            .record(
                Some(&tenant.id),
                TENANT_STATUS_CHANGED_EVENT,
                format!("Status of {} changed from {} to {status}", tenant.slug, tenant.status),
                actor,
                Some(serde_json::json!({ "from": tenant.status, "to": status })),
            )
            .await;

        self.get_tenant(&tenant.id).await
    }
}
