//! Applies high-confidence repair candidates, one transaction per table.
//!
//! Tables are independent units: a failing table is recorded and the run
//! continues, so tables repaired earlier in the same run stay committed.

use std::collections::BTreeMap;

use serde::Serialize;

use common::config::IntegrityConfig;
use common::schema::TENANT_COLUMN;
use common::store::BoundStatement;
use common::{AuditTrail, QuarantineTenant, Store};

use crate::error::{PreconditionFailure, Result};
use crate::planner::{Confidence, ParentTenants, RepairCandidate, RepairPlanner};
use crate::scope::PlanScope;

pub const REPAIR_APPLIED_EVENT: &str = "integrity.repair_applied";

/// Which candidates a caller asked to apply.
///
/// Low-confidence candidates are never written; `AllowLowConfidence` is only
/// recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidencePolicy {
    #[default]
    OnlyHigh,
    AllowLowConfidence,
}

impl ConfidencePolicy {
    pub fn from_flag(apply_only_high_confidence: bool) -> Self {
        if apply_only_high_confidence {
            ConfidencePolicy::OnlyHigh
        } else {
            ConfidencePolicy::AllowLowConfidence
        }
    }
}

/// Proof that the caller sent the out-of-band confirmation for a live run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LiveConfirmation(());

impl LiveConfirmation {
    pub const HEADER: &'static str = "x-confirm-repair";
    pub const VALUE: &'static str = "apply";

    pub fn from_header(value: Option<&str>) -> Result<Self> {
        match value {
            Some(value) if value.trim().eq_ignore_ascii_case(Self::VALUE) => Ok(Self(())),
            _ => Err(PreconditionFailure::MissingConfirmation.into()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    DryRun,
    Live(LiveConfirmation),
}

impl ExecutionMode {
    pub fn is_dry_run(&self) -> bool {
        matches!(self, ExecutionMode::DryRun)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TableRepairOutcome {
    pub table: String,
    /// High and low candidates found for the table
    pub candidates_found: usize,
    /// Rows written (live) or that would be written (dry run)
    pub updated: u64,
    pub skipped: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RepairResult {
    pub tables: Vec<TableRepairOutcome>,
    pub total_candidates: usize,
    pub total_updated: u64,
    pub total_skipped: u64,
    pub dry_run: bool,
}

impl RepairResult {
    pub fn table(&self, name: &str) -> Option<&TableRepairOutcome> {
        self.tables.iter().find(|outcome| outcome.table == name)
    }
}

/// `UPDATE` statements assigning each high-confidence candidate its tenant.
/// The `tenant_id IS NULL` guard makes a second writer a no-op.
pub(crate) fn repair_statements<'c>(
    store: &Store,
    table: &str,
    candidates: impl IntoIterator<Item = &'c RepairCandidate>,
) -> Vec<BoundStatement> {
    let sql = format!(
        "UPDATE {table} SET {TENANT_COLUMN} = {} WHERE id = {} AND {TENANT_COLUMN} IS NULL",
        store.param(1),
        store.param(2)
    );
    candidates
        .into_iter()
        .filter(|candidate| candidate.confidence == Confidence::High)
        .map(|candidate| BoundStatement {
            label: table.to_string(),
            sql: sql.clone(),
            binds: vec![
                candidate.candidate_tenant_id.clone(),
                candidate.row_id.clone(),
            ],
        })
        .collect()
}

/// Number of rows per candidate tenant, recorded in audit metadata.
pub(crate) fn tenant_counts<'c>(
    candidates: impl IntoIterator<Item = &'c RepairCandidate>,
) -> BTreeMap<String, u64> {
    let mut counts = BTreeMap::new();
    for candidate in candidates {
        *counts
            .entry(candidate.candidate_tenant_id.clone())
            .or_insert(0) += 1;
    }
    counts
}

pub struct RepairExecutor<'a> {
    store: &'a Store,
    planner: RepairPlanner<'a>,
    config: &'a IntegrityConfig,
    audit: &'a AuditTrail,
}

impl<'a> RepairExecutor<'a> {
    pub fn new(
        store: &'a Store,
        quarantine: Option<&'a QuarantineTenant>,
        config: &'a IntegrityConfig,
        audit: &'a AuditTrail,
    ) -> Self {
        Self {
            store,
            planner: RepairPlanner::new(store, quarantine, config),
            config,
            audit,
        }
    }

    /// Apply the high-confidence candidates for `scope`, parents first.
    ///
    /// Each table is planned right before it is written, so rows whose parent
    /// was repaired earlier in the run resolve in the same run. A dry run
    /// carries its would-be assignments forward instead.
    pub async fn apply(
        &self,
        scope: &PlanScope,
        policy: ConfidencePolicy,
        mode: ExecutionMode,
        actor: Option<&str>,
    ) -> Result<RepairResult> {
        if policy == ConfidencePolicy::AllowLowConfidence {
            tracing::warn!(
                "apply_only_high_confidence=false requested; low-confidence candidates are still never applied"
            );
        }

        let (tables, limit) = scope.resolve(self.config)?;
        let scope_tenant = scope.tenant_id.as_deref();
        let dry_run = mode.is_dry_run();
        let mut assigned = ParentTenants::new();

        let mut outcomes = Vec::with_capacity(tables.len());
        for spec in tables {
            let overlay = if dry_run { Some(&assigned) } else { None };
            let plan = match self
                .planner
                .plan_table(spec, limit, None, scope_tenant, overlay)
                .await
            {
                Ok(plan) => plan,
                Err(e) => {
                    tracing::warn!(table = spec.name, error = %e, "Planning failed for table, continuing");
                    outcomes.push(TableRepairOutcome {
                        table: spec.name.to_string(),
                        error: Some(e.to_string()),
                        ..TableRepairOutcome::default()
                    });
                    continue;
                }
            };

            let candidates = &plan.candidates;
            let high = plan.summary.high as u64;
            let mut outcome = TableRepairOutcome {
                table: spec.name.to_string(),
                candidates_found: candidates.len(),
                ..TableRepairOutcome::default()
            };

            if high == 0 {
                outcome.skipped = candidates.len() as u64;
                outcomes.push(outcome);
                continue;
            }

            if dry_run {
                tracing::info!(
                    table = spec.name,
                    rows = high,
                    "[DRY-RUN] Would assign tenant to orphan rows"
                );
                outcome.updated = high;
                plan.record_assignments(spec.name, &mut assigned);
            } else {
                let statements = repair_statements(self.store, spec.name, candidates);
                match self.store.execute_in_transaction(&statements).await {
                    Ok(affected) => {
                        outcome.updated = affected.iter().sum();
                        tracing::info!(
                            table = spec.name,
                            updated = outcome.updated,
                            "Applied tenant repairs"
                        );
                    }
                    Err(e) => {
                        tracing::error!(table = spec.name, error = %e, "Repair failed for table, continuing");
                        outcome.error = Some(e.to_string());
                    }
                }
            }
            outcome.skipped = (candidates.len() as u64).saturating_sub(outcome.updated);

            if !dry_run && outcome.updated > 0 {
                self.audit
                    .record(
                        scope_tenant,
                        REPAIR_APPLIED_EVENT,
                        format!(
                            "Assigned tenant to {} orphan row(s) in {}",
                            outcome.updated, spec.name
                        ),
                        actor,
                        Some(serde_json::json!({
                            "table": spec.name,
                            "updated": outcome.updated,
                            "skipped": outcome.skipped,
                            "tenants": tenant_counts(plan.high()),
                            "confidence_policy": policy,
                        })),
                    )
                    .await;
            }

            outcomes.push(outcome);
        }

        let result = RepairResult {
            total_candidates: outcomes.iter().map(|o| o.candidates_found).sum(),
            total_updated: outcomes.iter().map(|o| o.updated).sum(),
            total_skipped: outcomes.iter().map(|o| o.skipped).sum(),
            tables: outcomes,
            dry_run,
        };

        tracing::info!(
            dry_run,
            updated = result.total_updated,
            skipped = result.total_skipped,
            "Repair run complete"
        );

        Ok(result)
    }
}
