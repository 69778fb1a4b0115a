//! Read-only health scan: per-table orphan and quarantine counts.

use chrono::{DateTime, Utc};
use serde::Serialize;

use common::schema::{TENANT_COLUMN, TableSpec};
use common::{QuarantineTenant, Store};

use crate::error::Result;
use crate::scope::ScanScope;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableHealth {
    pub table: String,
    /// Rows whose tenant column is NULL
    pub missing: i64,
    /// Rows assigned to the quarantine tenant
    pub quarantined: i64,
    /// Whether a count hit the row limit
    pub truncated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthSummary {
    pub tables: Vec<TableHealth>,
    pub total_missing: i64,
    pub total_quarantined: i64,
    /// Active tenants, not counting the quarantine tenant; absent when the
    /// count failed
    pub active_tenants: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_tenants_error: Option<String>,
    pub quarantine_tenant_present: bool,
    pub scanned_at: DateTime<Utc>,
}

impl HealthSummary {
    pub fn table(&self, name: &str) -> Option<&TableHealth> {
        self.tables.iter().find(|health| health.table == name)
    }
}

pub struct IntegrityScanner<'a> {
    store: &'a Store,
    quarantine: Option<&'a QuarantineTenant>,
    /// Applied when the scope names no row limit
    default_row_limit: Option<u64>,
}

impl<'a> IntegrityScanner<'a> {
    pub fn new(
        store: &'a Store,
        quarantine: Option<&'a QuarantineTenant>,
        default_row_limit: Option<u64>,
    ) -> Self {
        Self {
            store,
            quarantine,
            default_row_limit,
        }
    }

    pub async fn scan(&self, scope: &ScanScope) -> Result<HealthSummary> {
        let tables = scope.resolve()?;
        let row_limit = scope.row_limit.or(self.default_row_limit);
        let tenant_id = scope.tenant_id.as_deref();

        tracing::info!(
            tables = tables.len(),
            tenant_id = ?tenant_id,
            row_limit = ?row_limit,
            "Starting integrity scan"
        );

        let mut entries = Vec::with_capacity(tables.len());
        for spec in tables {
            let entry = match self.scan_table(spec, tenant_id, row_limit).await {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!(table = spec.name, error = %e, "Table scan failed, continuing");
                    TableHealth {
                        table: spec.name.to_string(),
                        missing: 0,
                        quarantined: 0,
                        truncated: false,
                        error: Some(e.to_string()),
                    }
                }
            };
            entries.push(entry);
        }

        let (active_tenants, active_tenants_error) = match self
            .store
            .count_active_tenants(self.quarantine.map(|q| q.id.as_str()))
            .await
        {
            Ok(count) => (Some(count), None),
            Err(e) => {
                tracing::warn!(error = %e, "Active tenant count failed, continuing");
                (None, Some(e.to_string()))
            }
        };

        let summary = HealthSummary {
            total_missing: entries.iter().map(|e| e.missing).sum(),
            total_quarantined: entries.iter().map(|e| e.quarantined).sum(),
            tables: entries,
            active_tenants,
            active_tenants_error,
            quarantine_tenant_present: self.quarantine.is_some(),
            scanned_at: Utc::now(),
        };

        tracing::info!(
            total_missing = summary.total_missing,
            total_quarantined = summary.total_quarantined,
            active_tenants = ?summary.active_tenants,
            "Integrity scan complete"
        );

        Ok(summary)
    }

    async fn scan_table(
        &self,
        spec: &TableSpec,
        tenant_id: Option<&str>,
        row_limit: Option<u64>,
    ) -> std::result::Result<TableHealth, sqlx::Error> {
        let mut health = TableHealth {
            table: spec.name.to_string(),
            missing: 0,
            quarantined: 0,
            truncated: false,
            error: None,
        };

        // With a tenant filter, only rows reachable from that tenant through a
        // derivation edge count; tables without such edges report zero.
        let attribution = match tenant_id {
            Some(_) => match self.attribution_predicate(spec) {
                Some(predicate) => Some(predicate),
                None => return Ok(health),
            },
            None => None,
        };

        // ?1 / $1 is the tenant filter when present; the quarantine id follows it.
        let mut binds: Vec<&str> = tenant_id.into_iter().collect();
        let scoped = |condition: String| match &attribution {
            Some(predicate) => format!("{condition} AND ({predicate})"),
            None => condition,
        };

        let (missing, truncated) = self
            .capped_count(
                spec.name,
                &scoped(format!("{TENANT_COLUMN} IS NULL")),
                &binds,
                row_limit,
            )
            .await?;
        health.missing = missing;
        health.truncated = truncated;

        if let Some(quarantine) = self.quarantine {
            binds.push(quarantine.id.as_str());
            let condition = format!("{TENANT_COLUMN} = {}", self.store.param(binds.len()));
            let (quarantined, truncated) = self
                .capped_count(spec.name, &scoped(condition), &binds, row_limit)
                .await?;
            health.quarantined = quarantined;
            health.truncated |= truncated;
        }

        Ok(health)
    }

    /// `EXISTS` over every derivation edge whose parent belongs to the tenant
    /// bound as the first parameter.
    fn attribution_predicate(&self, spec: &TableSpec) -> Option<String> {
        let p = self.store.param(1);
        let clauses: Vec<String> = spec
            .derivation_edges()
            .map(|edge| {
                format!(
                    "EXISTS (SELECT 1 FROM {parent} p WHERE p.id = {table}.{column} AND p.{TENANT_COLUMN} = {p})",
                    parent = edge.parent,
                    table = spec.name,
                    column = edge.column,
                )
            })
            .collect();

        if clauses.is_empty() {
            None
        } else {
            Some(clauses.join(" OR "))
        }
    }

    async fn capped_count(
        &self,
        table: &str,
        condition: &str,
        binds: &[&str],
        row_limit: Option<u64>,
    ) -> std::result::Result<(i64, bool), sqlx::Error> {
        match row_limit {
            None => {
                let sql = format!("SELECT COUNT(*) FROM {table} WHERE {condition}");
                Ok((self.store.fetch_count(&sql, binds).await?, false))
            }
            Some(limit) => {
                // One extra row tells a capped count apart from an exact one.
                let sql = format!(
                    "SELECT COUNT(*) FROM (SELECT 1 FROM {table} WHERE {condition} LIMIT {}) capped",
                    limit + 1
                );
                let count = self.store.fetch_count(&sql, binds).await?;
                let limit = i64::try_from(limit).unwrap_or(i64::MAX);
                Ok((count.min(limit), count > limit))
            }
        }
    }
}
