//! Operator-driven assignment of orphan rows to the quarantine tenant.

use serde::Serialize;

use common::schema::{self, AUDIT_TABLE, TENANT_COLUMN};
use common::store::BoundStatement;
use common::{AuditTrail, QuarantineTenant, Store};

use crate::error::{IntegrityError, PreconditionFailure, Result};

pub const ROWS_QUARANTINED_EVENT: &str = "integrity.rows_quarantined";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuarantineResult {
    pub table: String,
    pub quarantine_tenant_id: String,
    pub requested: usize,
    /// Rows moved; rows that already had a tenant are left alone
    pub updated: u64,
}

pub struct Quarantine<'a> {
    store: &'a Store,
    quarantine: Option<&'a QuarantineTenant>,
    audit: &'a AuditTrail,
    max_rows: usize,
}

impl<'a> Quarantine<'a> {
    pub fn new(
        store: &'a Store,
        quarantine: Option<&'a QuarantineTenant>,
        audit: &'a AuditTrail,
        max_rows: usize,
    ) -> Self {
        Self {
            store,
            quarantine,
            audit,
            max_rows,
        }
    }

    pub async fn quarantine_rows(
        &self,
        table: &str,
        row_ids: &[String],
        actor: Option<&str>,
    ) -> Result<QuarantineResult> {
        let spec = schema::table(table)
            .filter(|spec| spec.tenant_scoped && spec.name != AUDIT_TABLE)
            .ok_or_else(|| {
                IntegrityError::validation(format!("{table} is not a tenant-scoped table"))
            })?;
        if row_ids.is_empty() || row_ids.len() > self.max_rows {
            return Err(IntegrityError::validation(format!(
                "row_ids must hold between 1 and {} ids",
                self.max_rows
            )));
        }
        let quarantine = self
            .quarantine
            .ok_or(PreconditionFailure::QuarantineTenantMissing)?;

        let sql = format!(
            "UPDATE {} SET {TENANT_COLUMN} = {} WHERE id IN ({}) AND {TENANT_COLUMN} IS NULL",
            spec.name,
            self.store.param(1),
            self.store.params(2, row_ids.len())
        );
        let mut binds = Vec::with_capacity(row_ids.len() + 1);
        binds.push(quarantine.id.clone());
        binds.extend(row_ids.iter().cloned());

        let affected = self
            .store
            .execute_in_transaction(&[BoundStatement {
                label: spec.name.to_string(),
                sql,
                binds,
            }])
            .await?;
        let updated: u64 = affected.iter().sum();

        tracing::info!(
            table = spec.name,
            requested = row_ids.len(),
            updated,
            "Quarantined orphan rows"
        );

        if updated > 0 {
            self.audit
                .record(
                    Some(&quarantine.id),
                    ROWS_QUARANTINED_EVENT,
                    format!("Moved {updated} orphan row(s) of {} to quarantine", spec.name),
                    actor,
                    Some(serde_json::json!({
                        "table": spec.name,
                        "row_ids": row_ids,
                        "updated": updated,
                    })),
                )
                .await;
        }

        Ok(QuarantineResult {
            table: spec.name.to_string(),
            quarantine_tenant_id: quarantine.id.clone(),
            requested: row_ids.len(),
            updated,
        })
    }
}
