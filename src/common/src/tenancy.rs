//! Tenancy enforcement for ordinary (non-integrity) requests.
//!
//! The mode is read from configuration once and carried in a [`TenancyPolicy`]
//! value; nothing here consults the environment directly.

use serde::{Deserialize, Serialize};

use crate::model::Tenant;
use crate::store::Store;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TenancyMode {
    /// An unresolved tenant fails the request
    Strict,
    /// An unresolved tenant falls back to an unscoped read with a warning
    #[default]
    Soft,
}

impl TenancyMode {
    pub fn is_strict(&self) -> bool {
        matches!(self, TenancyMode::Strict)
    }

    pub fn is_soft(&self) -> bool {
        matches!(self, TenancyMode::Soft)
    }
}

impl std::fmt::Display for TenancyMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TenancyMode::Strict => f.write_str("strict"),
            TenancyMode::Soft => f.write_str("soft"),
        }
    }
}

/// Outcome of resolving the tenant of a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TenantResolution {
    Scoped { tenant_id: String },
    /// Soft mode only: the request proceeds unscoped and the warning should
    /// be surfaced to the caller.
    Unscoped { warning: String },
}

#[derive(Debug, thiserror::Error)]
pub enum TenancyError {
    #[error("tenant could not be resolved{}", requested_suffix(.requested))]
    Unresolved { requested: Option<String> },
    #[error("tenant lookup failed: {0}")]
    Lookup(#[from] sqlx::Error),
}

fn requested_suffix(requested: &Option<String>) -> String {
    match requested {
        Some(value) => format!(" from '{value}'"),
        None => String::new(),
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TenancyPolicy {
    pub mode: TenancyMode,
}

impl TenancyPolicy {
    pub fn new(mode: TenancyMode) -> Self {
        Self { mode }
    }

    /// Apply the enforcement mode to a lookup result.
    pub fn decide(
        &self,
        resolved: Option<Tenant>,
        requested: Option<&str>,
    ) -> Result<TenantResolution, TenancyError> {
        if let Some(tenant) = resolved {
            return Ok(TenantResolution::Scoped {
                tenant_id: tenant.id,
            });
        }

        if self.mode.is_strict() {
            return Err(TenancyError::Unresolved {
                requested: requested.map(str::to_string),
            });
        }

        let warning = match requested {
            Some(value) => format!("tenant '{value}' not found; serving unscoped legacy lookup"),
            None => "no tenant supplied; serving unscoped legacy lookup".to_string(),
        };
        tracing::warn!(requested = ?requested, "Tenant unresolved in soft mode: {warning}");
        Ok(TenantResolution::Unscoped { warning })
    }

    /// Look up the tenant named by a request header (id or slug) and apply
    /// the enforcement mode.
    pub async fn resolve_request_tenant(
        &self,
        store: &Store,
        header: Option<&str>,
    ) -> Result<TenantResolution, TenancyError> {
        let requested = header.map(str::trim).filter(|value| !value.is_empty());
        let resolved = match requested {
            Some(value) => store.find_tenant(value).await?,
            None => None,
        };
        self.decide(resolved, requested)
    }
}

/// The reserved tenant that receives rows of unknown ownership, resolved
/// once at startup from its configured slug.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuarantineTenant {
    pub id: String,
    pub slug: String,
}

impl QuarantineTenant {
    /// Returns `None` when no tenant carries the slug.
    pub async fn resolve(store: &Store, slug: &str) -> Result<Option<Self>, sqlx::Error> {
        let tenant = store.find_tenant_by_slug(slug).await?;
        match &tenant {
            Some(tenant) => log::info!("Quarantine tenant resolved: {} ({})", tenant.slug, tenant.id),
            None => log::warn!("Quarantine tenant '{slug}' does not exist"),
        }
        Ok(tenant.map(|tenant| Self {
            id: tenant.id,
            slug: tenant.slug,
        }))
    }
}
