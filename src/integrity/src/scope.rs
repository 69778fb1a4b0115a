//! Request scopes for scans, previews and repairs, validated before any read.

use serde::{Deserialize, Serialize};

use common::config::IntegrityConfig;
use common::schema::{self, TableSpec};

use crate::error::{IntegrityError, Result};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanScope {
    /// Count only rows attributable to this tenant
    pub tenant_id: Option<String>,
    /// Restrict the scan to these tables
    pub tables: Option<Vec<String>>,
    /// Cap each per-table count
    pub row_limit: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlanScope {
    /// Return only candidates for this tenant
    pub tenant_id: Option<String>,
    pub tables: Option<Vec<String>>,
    /// Orphan rows examined per table; defaults to `integrity.default_limit`
    pub limit: Option<usize>,
}

fn check_tenant(tenant_id: &Option<String>) -> Result<()> {
    match tenant_id {
        Some(tenant_id) if tenant_id.trim().is_empty() => {
            Err(IntegrityError::validation("tenant_id must not be empty"))
        }
        _ => Ok(()),
    }
}

/// Pick the requested integrity-checked tables out of `order`, keeping its
/// order. `None` selects all of them.
pub(crate) fn select_tables(
    order: &[&'static TableSpec],
    requested: Option<&[String]>,
) -> Result<Vec<&'static TableSpec>> {
    let checked = order.iter().copied().filter(|spec| spec.integrity_checked);
    let Some(requested) = requested else {
        return Ok(checked.collect());
    };

    if requested.is_empty() {
        return Err(IntegrityError::validation("tables must not be empty when given"));
    }
    for name in requested {
        match schema::table(name) {
            Some(spec) if spec.integrity_checked => {}
            Some(_) => {
                return Err(IntegrityError::validation(format!(
                    "table {name} is not integrity-checked"
                )));
            }
            None => {
                return Err(IntegrityError::validation(format!("unknown table {name}")));
            }
        }
    }

    Ok(checked
        .filter(|spec| requested.iter().any(|name| name == spec.name))
        .collect())
}

impl ScanScope {
    pub fn for_tenant(tenant_id: impl Into<String>) -> Self {
        Self {
            tenant_id: Some(tenant_id.into()),
            ..Self::default()
        }
    }

    /// Validate and return the tables to scan in registry order.
    pub fn resolve(&self) -> Result<Vec<&'static TableSpec>> {
        check_tenant(&self.tenant_id)?;
        if self.row_limit == Some(0) {
            return Err(IntegrityError::validation("row_limit must be positive"));
        }
        let registry: Vec<&'static TableSpec> = schema::TABLES.iter().collect();
        select_tables(&registry, self.tables.as_deref())
    }
}

impl PlanScope {
    pub fn for_tenant(tenant_id: impl Into<String>) -> Self {
        Self {
            tenant_id: Some(tenant_id.into()),
            ..Self::default()
        }
    }

    pub fn for_tables(tables: &[&str]) -> Self {
        Self {
            tables: Some(tables.iter().map(|name| name.to_string()).collect()),
            ..Self::default()
        }
    }

    /// Validate and return the tables (parents first) and the effective limit.
    pub fn resolve(&self, config: &IntegrityConfig) -> Result<(Vec<&'static TableSpec>, usize)> {
        check_tenant(&self.tenant_id)?;

        let limit = self.limit.unwrap_or(config.default_limit);
        if limit == 0 || limit > config.max_limit {
            return Err(IntegrityError::validation(format!(
                "limit must be between 1 and {}, got {limit}",
                config.max_limit
            )));
        }

        let order = schema::repair_order()?;
        let tables = select_tables(&order, self.tables.as_deref())?;
        Ok((tables, limit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_scope_limit_bounds() {
        let config = IntegrityConfig::default();

        let (_, limit) = PlanScope::default().resolve(&config).unwrap();
        assert_eq!(limit, 500);

        let scope = PlanScope {
            limit: Some(1000),
            ..PlanScope::default()
        };
        assert_eq!(scope.resolve(&config).unwrap().1, 1000);

        for bad in [0, 1001] {
            let scope = PlanScope {
                limit: Some(bad),
                ..PlanScope::default()
            };
            assert!(matches!(
                scope.resolve(&config),
                Err(IntegrityError::Validation(_))
            ));
        }
    }

    #[test]
    fn test_table_subset_keeps_parents_first() {
        let scope = PlanScope::for_tables(&["task_comments", "projects", "tasks"]);
        let (tables, _) = scope.resolve(&IntegrityConfig::default()).unwrap();
        let names: Vec<&str> = tables.iter().map(|spec| spec.name).collect();
        assert_eq!(names, vec!["projects", "tasks", "task_comments"]);
    }

    #[test]
    fn test_unknown_and_unchecked_tables_are_rejected() {
        let config = IntegrityConfig::default();
        assert!(PlanScope::for_tables(&["nope"]).resolve(&config).is_err());
        assert!(PlanScope::for_tables(&["task_tags"]).resolve(&config).is_err());
        assert!(PlanScope::for_tables(&["audit_events"]).resolve(&config).is_err());
        assert!(PlanScope::for_tables(&[]).resolve(&config).is_err());
    }

    #[test]
    fn test_scan_scope_validation() {
        assert!(ScanScope::default().resolve().is_ok());
        assert!(ScanScope::for_tenant(" ").resolve().is_err());
        let scope = ScanScope {
            row_limit: Some(0),
            ..ScanScope::default()
        };
        assert!(scope.resolve().is_err());
        assert_eq!(
            ScanScope::default().resolve().unwrap().len(),
            common::schema::integrity_tables().count()
        );
    }
}
