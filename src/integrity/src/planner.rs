//! Repair planning: derive a tenant for each orphan row from its direct
//! parents and classify how trustworthy that derivation is.
//!
//! The planner reads a snapshot (orphan rows plus the tenant of every parent
//! they reference) and then classifies it with pure functions, so the
//! classification rules are testable without a database:
//!
//! - every derivation edge is resolved one hop, to the parent row's own tenant;
//! - a parent that is missing, orphaned itself, or quarantined does not resolve;
//! - exactly one distinct tenant among the resolving edges is **high** confidence;
//! - two or more distinct tenants is **low** confidence, proposing the tenant
//!   of the most reliable (first listed) resolving edge;
//! - no resolving edge leaves the row unresolved.

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use serde::Serialize;

use common::config::IntegrityConfig;
use common::schema::{Edge, TENANT_COLUMN, TableSpec};
use common::{QuarantineTenant, Store};

use crate::error::Result;
use crate::scope::PlanScope;

/// Parent ids are looked up in chunks of this size.
const PARENT_LOOKUP_CHUNK: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Low,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RepairCandidate {
    pub table: String,
    pub row_id: String,
    pub candidate_tenant_id: String,
    pub confidence: Confidence,
    /// Edges that produced the candidate, e.g. `project_id -> projects.tenant_id = T1`
    pub rationale: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TablePlanSummary {
    pub table: String,
    pub orphans_examined: usize,
    pub high: usize,
    pub low: usize,
    pub unresolved: usize,
    /// More orphans exist beyond the examined limit
    pub truncated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RepairPreview {
    pub high_confidence: Vec<RepairCandidate>,
    pub low_confidence: Vec<RepairCandidate>,
    pub tables: Vec<TablePlanSummary>,
    /// Rows with no candidate at all; left for manual review or quarantine
    pub total_unresolved: usize,
    pub generated_at: DateTime<Utc>,
}

impl RepairPreview {
    pub fn table(&self, name: &str) -> Option<&TablePlanSummary> {
        self.tables.iter().find(|summary| summary.table == name)
    }
}

/// An orphan row with the values of its table's derivation-edge columns, in
/// edge order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrphanRow {
    pub id: String,
    pub edge_values: Vec<Option<String>>,
}

/// Tenant of each parent row that resolves, keyed by `(parent table, parent id)`.
///
/// Also used as the overlay of tenants a dry run has already assigned, so
/// children of a parent repaired earlier in the run resolve as they would live.
pub type ParentTenants = HashMap<(&'static str, String), String>;

/// Classified plan for one table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TablePlan {
    pub candidates: Vec<RepairCandidate>,
    pub summary: TablePlanSummary,
    /// Id of the last orphan examined, used as the next page's cursor
    pub last_id: Option<String>,
}

impl TablePlan {
    pub fn high(&self) -> impl Iterator<Item = &RepairCandidate> {
        self.candidates
            .iter()
            .filter(|candidate| candidate.confidence == Confidence::High)
    }

    /// Record the high-confidence candidates as tenants assigned to rows of
    /// `table`, for planning its children later in a dry run.
    pub fn record_assignments(&self, table: &'static str, assigned: &mut ParentTenants) {
        assigned.extend(self.high().map(|candidate| {
            (
                (table, candidate.row_id.clone()),
                candidate.candidate_tenant_id.clone(),
            )
        }));
    }
}

/// Classify one orphan row from the tenants its edges resolve to.
///
/// `resolutions` pairs each derivation edge, in reliability order, with the
/// tenant its parent resolved to (`None` when it did not resolve).
pub fn classify(
    table: &str,
    row_id: &str,
    resolutions: &[(&Edge, Option<&str>)],
) -> Option<RepairCandidate> {
    let resolving: Vec<(&Edge, &str)> = resolutions
        .iter()
        .filter_map(|(edge, tenant)| tenant.map(|tenant| (*edge, tenant)))
        .collect();

    let (_, first_tenant) = *resolving.first()?;
    let distinct: BTreeSet<&str> = resolving.iter().map(|(_, tenant)| *tenant).collect();

    let rationale = resolving
        .iter()
        .map(|(edge, tenant)| {
            format!(
                "{} -> {}.{TENANT_COLUMN} = {tenant}",
                edge.column, edge.parent
            )
        })
        .collect::<Vec<_>>()
        .join("; ");

    let (confidence, rationale) = if distinct.len() == 1 {
        (Confidence::High, rationale)
    } else {
        (
            Confidence::Low,
            format!("conflicting parents ({rationale})"),
        )
    };

    Some(RepairCandidate {
        table: table.to_string(),
        row_id: row_id.to_string(),
        candidate_tenant_id: first_tenant.to_string(),
        confidence,
        rationale,
    })
}

/// Classify a page of orphan rows of one table.
///
/// With `scope_tenant`, only candidates for that tenant are kept and
/// unresolved rows are not counted.
pub fn derive_table_plan(
    spec: &TableSpec,
    rows: &[OrphanRow],
    parents: &ParentTenants,
    scope_tenant: Option<&str>,
) -> TablePlan {
    let edges: Vec<&'static Edge> = spec.derivation_edges().collect();
    let mut plan = TablePlan {
        summary: TablePlanSummary {
            table: spec.name.to_string(),
            orphans_examined: rows.len(),
            ..TablePlanSummary::default()
        },
        last_id: rows.last().map(|row| row.id.clone()),
        ..TablePlan::default()
    };

    for row in rows {
        let resolutions: Vec<(&Edge, Option<&str>)> = edges
            .iter()
            .zip(&row.edge_values)
            .map(|(edge, value)| {
                let tenant = value.as_ref().and_then(|parent_id| {
                    parents
                        .get(&(edge.parent, parent_id.clone()))
                        .map(String::as_str)
                });
                (*edge, tenant)
            })
            .collect();

        match classify(spec.name, &row.id, &resolutions) {
            Some(candidate) => {
                if scope_tenant.is_some_and(|tenant| tenant != candidate.candidate_tenant_id) {
                    continue;
                }
                match candidate.confidence {
                    Confidence::High => plan.summary.high += 1,
                    Confidence::Low => plan.summary.low += 1,
                }
                plan.candidates.push(candidate);
            }
            None if scope_tenant.is_none() => plan.summary.unresolved += 1,
            None => {}
        }
    }

    plan
}

pub struct RepairPlanner<'a> {
    store: &'a Store,
    quarantine: Option<&'a QuarantineTenant>,
    config: &'a IntegrityConfig,
}

impl<'a> RepairPlanner<'a> {
    pub fn new(
        store: &'a Store,
        quarantine: Option<&'a QuarantineTenant>,
        config: &'a IntegrityConfig,
    ) -> Self {
        Self {
            store,
            quarantine,
            config,
        }
    }

    /// Build a preview for the scope. Nothing is written.
    pub async fn plan(&self, scope: &PlanScope) -> Result<RepairPreview> {
        let (tables, limit) = scope.resolve(self.config)?;
        let scope_tenant = scope.tenant_id.as_deref();

        tracing::info!(
            tables = tables.len(),
            limit,
            tenant_id = ?scope_tenant,
            "Planning repairs"
        );

        let mut preview = RepairPreview {
            high_confidence: Vec::new(),
            low_confidence: Vec::new(),
            tables: Vec::with_capacity(tables.len()),
            total_unresolved: 0,
            generated_at: Utc::now(),
        };

        for spec in tables {
            match self.plan_table(spec, limit, None, scope_tenant, None).await {
                Ok(plan) => {
                    preview.total_unresolved += plan.summary.unresolved;
                    for candidate in plan.candidates {
                        match candidate.confidence {
                            Confidence::High => preview.high_confidence.push(candidate),
                            Confidence::Low => preview.low_confidence.push(candidate),
                        }
                    }
                    preview.tables.push(plan.summary);
                }
                Err(e) => {
                    tracing::warn!(table = spec.name, error = %e, "Planning failed for table, continuing");
                    preview.tables.push(TablePlanSummary {
                        table: spec.name.to_string(),
                        error: Some(e.to_string()),
                        ..TablePlanSummary::default()
                    });
                }
            }
        }

        tracing::info!(
            high = preview.high_confidence.len(),
            low = preview.low_confidence.len(),
            unresolved = preview.total_unresolved,
            "Repair plan ready"
        );

        Ok(preview)
    }

    /// Plan one page of a table: up to `limit` orphans ordered by id, starting
    /// after `after_id`.
    ///
    /// `assigned` holds parent rows that are still orphaned in the store but
    /// have been given a tenant earlier in the same dry run.
    pub async fn plan_table(
        &self,
        spec: &TableSpec,
        limit: usize,
        after_id: Option<&str>,
        scope_tenant: Option<&str>,
        assigned: Option<&ParentTenants>,
    ) -> std::result::Result<TablePlan, sqlx::Error> {
        let (rows, truncated) = self.fetch_orphans(spec, limit, after_id).await?;
        let parents = self.resolve_parents(spec, &rows, assigned).await?;

        let mut plan = derive_table_plan(spec, &rows, &parents, scope_tenant);
        plan.summary.truncated = truncated;

        tracing::debug!(
            table = spec.name,
            examined = plan.summary.orphans_examined,
            high = plan.summary.high,
            low = plan.summary.low,
            unresolved = plan.summary.unresolved,
            "Planned table"
        );

        Ok(plan)
    }

    async fn fetch_orphans(
        &self,
        spec: &TableSpec,
        limit: usize,
        after_id: Option<&str>,
    ) -> std::result::Result<(Vec<OrphanRow>, bool), sqlx::Error> {
        let edge_columns: Vec<&str> = spec.derivation_edges().map(|edge| edge.column).collect();
        let mut select = vec!["id"];
        select.extend(&edge_columns);

        let cursor = match after_id {
            Some(_) => format!(" AND id > {}", self.store.param(1)),
            None => String::new(),
        };
        let sql = format!(
            "SELECT {} FROM {} WHERE {TENANT_COLUMN} IS NULL{cursor} ORDER BY id LIMIT {}",
            select.join(", "),
            spec.name,
            limit + 1
        );
        let binds: Vec<&str> = after_id.into_iter().collect();

        let mut rows: Vec<OrphanRow> = self
            .store
            .fetch_text_rows(&sql, &binds, select.len())
            .await?
            .into_iter()
            .map(|(id, edge_values)| OrphanRow { id, edge_values })
            .collect();

        let truncated = rows.len() > limit;
        rows.truncate(limit);
        Ok((rows, truncated))
    }

    /// Batch-read the tenant of every parent referenced by `rows`. Parents
    /// without a tenant, or in the quarantine tenant, are left out unless
    /// `assigned` gives them one.
    async fn resolve_parents(
        &self,
        spec: &TableSpec,
        rows: &[OrphanRow],
        assigned: Option<&ParentTenants>,
    ) -> std::result::Result<ParentTenants, sqlx::Error> {
        let mut parents = ParentTenants::new();
        let quarantine_id = self.quarantine.map(|q| q.id.as_str());

        for (index, edge) in spec.derivation_edges().enumerate() {
            let ids: BTreeSet<&str> = rows
                .iter()
                .filter_map(|row| row.edge_values.get(index).and_then(|v| v.as_deref()))
                .collect();
            let ids: Vec<&str> = ids.into_iter().collect();

            for chunk in ids.chunks(PARENT_LOOKUP_CHUNK) {
                let sql = format!(
                    "SELECT id, {TENANT_COLUMN} FROM {} WHERE id IN ({}) AND {TENANT_COLUMN} IS NOT NULL",
                    edge.parent,
                    self.store.params(1, chunk.len())
                );
                for (id, values) in self.store.fetch_text_rows(&sql, chunk, 2).await? {
                    let Some(tenant) = values.into_iter().next().flatten() else {
                        continue;
                    };
                    if Some(tenant.as_str()) == quarantine_id {
                        continue;
                    }
                    parents.insert((edge.parent, id), tenant);
                }
            }

            if let Some(assigned) = assigned {
                for id in ids {
                    let key = (edge.parent, id.to_string());
                    if let Some(tenant) = assigned.get(&key) {
                        parents.entry(key).or_insert_with(|| tenant.clone());
                    }
                }
            }
        }

        Ok(parents)
    }
}
