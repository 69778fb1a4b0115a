//! Atomic removal of a tenant and every record it owns.
//!
//! A row is owned by tenant `T` when its tenant column equals `T`, or when
//! its tenant column is NULL (or absent) and it hangs off an owned parent
//! through an ownership edge. Rows carrying a different tenant are never
//! touched. All deletes run in one transaction in [`schema::deletion_order`],
//! finishing with the tenant row.

use std::collections::BTreeMap;

use serde::Serialize;

use common::model::{Tenant, TenantStatus};
use common::schema::{self, TENANT_COLUMN, TENANTS_TABLE, TableSpec};
use common::store::BoundStatement;
use common::{AuditTrail, QuarantineTenant, Store};

use crate::error::{IntegrityError, PreconditionFailure, Result};

pub const TENANT_DELETED_EVENT: &str = "tenant.deleted";

#[derive(Debug, Clone, Serialize)]
pub struct TenantDeletionReport {
    pub tenant_id: String,
    pub slug: String,
    pub name: String,
    /// Rows deleted per table, tables with no rows omitted
    pub deleted: BTreeMap<String, u64>,
    pub total_deleted: u64,
}

/// SQL predicate selecting rows of `spec` owned by the tenant bound as `tenant_param`.
pub fn owned_by_tenant_predicate(
    spec: &TableSpec,
    tenant_param: &str,
) -> std::result::Result<String, IntegrityError> {
    let via_parents = spec
        .ownership_edges()
        .map(|edge| {
            let parent = schema::table(edge.parent).ok_or_else(|| {
                IntegrityError::Schema(schema::GraphError(format!(
                    "{} points at unknown table {}",
                    spec.name, edge.parent
                )))
            })?;
            Ok(format!(
                "{} IN (SELECT id FROM {} WHERE {})",
                edge.column,
                parent.name,
                owned_by_tenant_predicate(parent, tenant_param)?
            ))
        })
        .collect::<std::result::Result<Vec<String>, IntegrityError>>()?;

    let via_parents = if via_parents.is_empty() {
        None
    } else {
        Some(via_parents.join(" OR "))
    };

    Ok(match (spec.tenant_scoped, via_parents) {
        (true, Some(via_parents)) => format!(
            "({TENANT_COLUMN} = {tenant_param} OR ({TENANT_COLUMN} IS NULL AND ({via_parents})))"
        ),
        (true, None) => format!("{TENANT_COLUMN} = {tenant_param}"),
        (false, Some(via_parents)) => format!("({via_parents})"),
        (false, None) => "1 = 0".to_string(),
    })
}

pub struct TenantDeletionCascade<'a> {
    store: &'a Store,
    quarantine: Option<&'a QuarantineTenant>,
    audit: &'a AuditTrail,
}

impl<'a> TenantDeletionCascade<'a> {
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

    /// Check that `tenant_id` may be deleted and return it.
    async fn check_preconditions(&self, tenant_id: &str) -> Result<Tenant> {
        let tenant = self
            .store
            .get_tenant(tenant_id)
            .await?
            .ok_or_else(|| IntegrityError::NotFound(format!("tenant {tenant_id}")))?;

        if self.quarantine.is_some_and(|q| q.id == tenant.id) {
            return Err(PreconditionFailure::QuarantineTenantProtected.into());
        }
        if tenant.status == TenantStatus::Active {
            return Err(PreconditionFailure::TenantActive(tenant.id).into());
        }
        Ok(tenant)
    }

    pub fn statements(&self, tenant_id: &str) -> Result<Vec<BoundStatement>> {
        let p = self.store.param(1);
        let mut statements = Vec::new();
        for spec in schema::deletion_order()? {
            statements.push(BoundStatement {
                label: spec.name.to_string(),
                sql: format!(
                    "DELETE FROM {} WHERE {}",
                    spec.name,
                    owned_by_tenant_predicate(spec, &p)?
                ),
                binds: vec![tenant_id.to_string()],
            });
        }
        statements.push(BoundStatement {
            label: TENANTS_TABLE.to_string(),
            sql: format!("DELETE FROM {TENANTS_TABLE} WHERE id = {p}"),
            binds: vec![tenant_id.to_string()],
        });
        Ok(statements)
    }

    pub async fn delete_tenant(
        &self,
        tenant_id: &str,
        actor: Option<&str>,
    ) -> Result<TenantDeletionReport> {
        let tenant = self.check_preconditions(tenant_id).await?;
        let statements = self.statements(&tenant.id)?;

        tracing::info!(
            tenant_id = %tenant.id,
            slug = %tenant.slug,
            tables = statements.len(),
            "Deleting tenant"
        );

        let affected = self
            .store
            .execute_in_transaction(&statements)
            .await
            .map_err(|failure| {
                tracing::error!(
                    tenant_id = %tenant.id,
                    table = %failure.label,
                    error = %failure.source,
                    "Tenant deletion rolled back"
                );
                IntegrityError::from(failure)
            })?;

        let deleted: BTreeMap<String, u64> = statements
            .iter()
            .zip(affected)
            .filter(|(_, rows)| *rows > 0)
            .map(|(statement, rows)| (statement.label.clone(), rows))
            .collect();
        let report = TenantDeletionReport {
            total_deleted: deleted.values().sum(),
            tenant_id: tenant.id.clone(),
            slug: tenant.slug.clone(),
            name: tenant.name.clone(),
            deleted,
        };

        tracing::info!(
            tenant_id = %report.tenant_id,
            total_deleted = report.total_deleted,
            "Tenant deleted"
        );

        // The tenant's own audit rows are gone, so the event is platform-level.
        self.audit
            .record(
                None,
                TENANT_DELETED_EVENT,
                format!("Deleted tenant {} ({})", tenant.name, tenant.slug),
                actor,
                Some(serde_json::json!({
                    "tenant_id": report.tenant_id,
                    "name": report.name,
                    "slug": report.slug,
                    "deleted": report.deleted,
                    "total_deleted": report.total_deleted,
                })),
            )
            .await;

        Ok(report)
    }
}
