//! Whole-schema repair walk with before/after orphan counts.
//!
//! Tables are visited parents first, so a parent repaired earlier in a live
//! run already resolves for its children. A dry run keeps the tenants it
//! would have assigned and resolves children against those.

use serde::Serialize;

use common::config::IntegrityConfig;
use common::schema::{self, TENANT_COLUMN, TableSpec};
use common::{AuditTrail, QuarantineTenant, Store};

use crate::error::Result;
use crate::executor::{
    ExecutionMode, REPAIR_APPLIED_EVENT, repair_statements, tenant_counts,
};
use crate::planner::{ParentTenants, RepairCandidate, RepairPlanner};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BackfillTable {
    pub table: String,
    /// Orphans before the run
    pub before: i64,
    /// Orphans after the run (projected for a dry run)
    pub after: i64,
    /// Rows written (live) or that would be written (dry run)
    pub updated: u64,
    pub low_confidence: usize,
    pub unresolved: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BackfillReport {
    pub tables: Vec<BackfillTable>,
    pub total_before: i64,
    pub total_after: i64,
    pub total_updated: u64,
    pub dry_run: bool,
}

impl BackfillReport {
    pub fn table(&self, name: &str) -> Option<&BackfillTable> {
        self.tables.iter().find(|entry| entry.table == name)
    }
}

pub struct Backfill<'a> {
    store: &'a Store,
    planner: RepairPlanner<'a>,
    audit: &'a AuditTrail,
    batch_size: usize,
}

impl<'a> Backfill<'a> {
    pub fn new(
        store: &'a Store,
        quarantine: Option<&'a QuarantineTenant>,
        config: &'a IntegrityConfig,
        audit: &'a AuditTrail,
    ) -> Self {
        Self {
            store,
            planner: RepairPlanner::new(store, quarantine, config),
            audit,
            batch_size: config.backfill_batch_size.max(1),
        }
    }

    pub async fn run(&self, mode: ExecutionMode, actor: Option<&str>) -> Result<BackfillReport> {
        let dry_run = mode.is_dry_run();
        let tables: Vec<&'static TableSpec> = schema::repair_order()?
            .into_iter()
            .filter(|spec| spec.integrity_checked)
            .collect();

        tracing::info!(
            tables = tables.len(),
            dry_run,
            batch_size = self.batch_size,
            "Starting backfill"
        );

        let mut assigned = ParentTenants::new();
        let mut entries = Vec::with_capacity(tables.len());
        for spec in tables {
            let entry = match self.backfill_table(spec, dry_run, &mut assigned, actor).await {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!(table = spec.name, error = %e, "Backfill failed for table, continuing");
                    BackfillTable {
                        table: spec.name.to_string(),
                        error: Some(e.to_string()),
                        ..BackfillTable::default()
                    }
                }
            };
            entries.push(entry);
        }

        let report = BackfillReport {
            total_before: entries.iter().map(|e| e.before).sum(),
            total_after: entries.iter().map(|e| e.after).sum(),
            total_updated: entries.iter().map(|e| e.updated).sum(),
            tables: entries,
            dry_run,
        };

        tracing::info!(
            dry_run,
            before = report.total_before,
            after = report.total_after,
            updated = report.total_updated,
            "Backfill complete"
        );

        Ok(report)
    }

    async fn backfill_table(
        &self,
        spec: &'static TableSpec,
        dry_run: bool,
        assigned: &mut ParentTenants,
        actor: Option<&str>,
    ) -> Result<BackfillTable> {
        let before = self.count_missing(spec).await?;
        let mut entry = BackfillTable {
            table: spec.name.to_string(),
            before,
            after: before,
            ..BackfillTable::default()
        };
        if before == 0 {
            return Ok(entry);
        }

        // Page through every orphan before writing anything, so the id cursor
        // walks a stable set.
        let mut candidates: Vec<RepairCandidate> = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let overlay = if dry_run { Some(&*assigned) } else { None };
            let page = self
                .planner
                .plan_table(spec, self.batch_size, cursor.as_deref(), None, overlay)
                .await?;
            entry.low_confidence += page.summary.low;
            entry.unresolved += page.summary.unresolved;
            if dry_run {
                page.record_assignments(spec.name, assigned);
            }
            candidates.extend(page.high().cloned());

            if !page.summary.truncated {
                break;
            }
            cursor = page.last_id;
        }

        if dry_run {
            entry.updated = candidates.len() as u64;
            entry.after = before - candidates.len() as i64;
            tracing::info!(
                table = spec.name,
                rows = entry.updated,
                "[DRY-RUN] Would backfill tenant on orphan rows"
            );
            return Ok(entry);
        }

        if !candidates.is_empty() {
            let statements = repair_statements(self.store, spec.name, &candidates);
            let affected = self.store.execute_in_transaction(&statements).await?;
            entry.updated = affected.iter().sum();
        }
        entry.after = self.count_missing(spec).await?;

        if entry.updated > 0 {
            self.audit
                .record(
                    None,
                    REPAIR_APPLIED_EVENT,
                    format!(
                        "Backfilled tenant on {} orphan row(s) in {}",
                        entry.updated, spec.name
                    ),
                    actor,
                    Some(serde_json::json!({
                        "table": spec.name,
                        "source": "backfill",
                        "before": entry.before,
                        "after": entry.after,
                        "updated": entry.updated,
                        "tenants": tenant_counts(&candidates),
                    })),
                )
                .await;
        }

        Ok(entry)
    }

    async fn count_missing(&self, spec: &TableSpec) -> std::result::Result<i64, sqlx::Error> {
        let sql = format!(
            "SELECT COUNT(*) FROM {} WHERE {TENANT_COLUMN} IS NULL",
            spec.name
        );
        self.store.fetch_count(&sql, &[]).await
    }
}
