//! Table-by-table wipe of all application data, for non-production use.
//!
//! The quarantine tenant is created out of band and outlives a purge, so the
//! engine's resolved quarantine identity stays valid afterwards.

use serde::Serialize;

use common::config::{PURGE_CONFIRMATION_PHRASE, PurgeConfig};
use common::schema::{self, TENANTS_TABLE};
use common::{AuditTrail, QuarantineTenant, Store};

use crate::error::{PreconditionFailure, Result};

pub const DATA_PURGED_EVENT: &str = "data.purged";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PurgeTableStatus {
    Purged { rows: u64 },
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PurgeTableOutcome {
    pub table: String,
    #[serde(flatten)]
    pub status: PurgeTableStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct PurgeReport {
    pub tables: Vec<PurgeTableOutcome>,
    pub total_rows: u64,
    pub failed_tables: usize,
}

impl PurgeReport {
    pub fn status(&self, table: &str) -> Option<&PurgeTableStatus> {
        self.tables
            .iter()
            .find(|outcome| outcome.table == table)
            .map(|outcome| &outcome.status)
    }
}

pub struct DataPurge<'a> {
    store: &'a Store,
    quarantine: Option<&'a QuarantineTenant>,
    config: &'a PurgeConfig,
    production: bool,
    audit: &'a AuditTrail,
}

impl<'a> DataPurge<'a> {
    pub fn new(
        store: &'a Store,
        quarantine: Option<&'a QuarantineTenant>,
        config: &'a PurgeConfig,
        production: bool,
        audit: &'a AuditTrail,
    ) -> Self {
        Self {
            store,
            quarantine,
            config,
            production,
            audit,
        }
    }

    /// All three confirmations, checked in order.
    pub fn check_confirmations(&self, phrase: &str) -> Result<()> {
        if !self.config.allow {
            return Err(PreconditionFailure::PurgeNotAllowed.into());
        }
        if self.production && !self.config.allow_in_production {
            return Err(PreconditionFailure::PurgeNotAllowedInProduction.into());
        }
        if phrase != PURGE_CONFIRMATION_PHRASE {
            return Err(PreconditionFailure::ConfirmationPhraseMismatch.into());
        }
        Ok(())
    }

    pub async fn purge(&self, phrase: &str, actor: Option<&str>) -> Result<PurgeReport> {
        self.check_confirmations(phrase)?;

        let mut tables: Vec<&str> = schema::deletion_order()?
            .into_iter()
            .map(|spec| spec.name)
            .collect();
        tables.push(TENANTS_TABLE);

        tracing::warn!(
            tables = tables.len(),
            production = self.production,
            "Purging all application data"
        );

        let mut outcomes = Vec::with_capacity(tables.len());
        for table in tables {
            let status = match self.delete_all(table).await {
                Ok(rows) => {
                    tracing::info!(table, rows, "Purged table");
                    PurgeTableStatus::Purged { rows }
                }
                Err(e) => {
                    tracing::error!(table, error = %e, "Failed to purge table, continuing");
                    PurgeTableStatus::Failed {
                        error: e.to_string(),
                    }
                }
            };
            outcomes.push(PurgeTableOutcome {
                table: table.to_string(),
                status,
            });
        }

        let report = PurgeReport {
            total_rows: outcomes
                .iter()
                .map(|outcome| match outcome.status {
                    PurgeTableStatus::Purged { rows } => rows,
                    PurgeTableStatus::Failed { .. } => 0,
                })
                .sum(),
            failed_tables: outcomes
                .iter()
                .filter(|outcome| matches!(outcome.status, PurgeTableStatus::Failed { .. }))
                .count(),
            tables: outcomes,
        };

        self.audit
            .record(
                None,
                DATA_PURGED_EVENT,
                format!(
                    "Purged {} row(s) from {} table(s)",
                    report.total_rows,
                    report.tables.len()
                ),
                actor,
                Some(serde_json::json!({
                    "total_rows": report.total_rows,
                    "failed_tables": report.failed_tables,
                })),
            )
            .await;

        Ok(report)
    }

    async fn delete_all(&self, table: &str) -> std::result::Result<u64, sqlx::Error> {
        match self.quarantine {
            Some(quarantine) if table == TENANTS_TABLE => {
                let sql = format!("DELETE FROM {table} WHERE id <> {}", self.store.param(1));
                self.store.execute(&sql, &[quarantine.id.as_str()]).await
            }
            _ => self.store.execute(&format!("DELETE FROM {table}"), &[]).await,
        }
    }
}
