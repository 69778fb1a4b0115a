use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use crate::tenancy::TenancyMode;

/// Phrase an operator must type verbatim before a data purge runs.
pub const PURGE_CONFIRMATION_PHRASE: &str = "PURGE ALL APPLICATION DATA";

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub dsn: String,
    /// Upper bound of pooled connections (ignored for in-memory SQLite)
    pub max_connections: u32,
    /// How long to wait for a pooled connection before failing
    #[serde(with = "humantime_serde")]
    pub acquire_timeout: Duration,
    /// Create the registry tables on startup if they are missing
    pub bootstrap_schema: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            dsn: String::from("sqlite://.data/tenantguard.db"),
            max_connections: 5,
            acquire_timeout: Duration::from_secs(30),
            bootstrap_schema: true,
        }
    }
}

impl DatabaseConfig {
    /// Create an in-memory database configuration for tests and local runs
    pub fn in_memory() -> Self {
        Self {
            dsn: String::from("sqlite::memory:"),
            ..Self::default()
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TenancyConfig {
    /// Enforcement mode for ordinary tenant-scoped requests
    pub mode: TenancyMode,
    /// Slug of the reserved tenant that receives records of unknown ownership
    pub quarantine_slug: String,
}

impl Default for TenancyConfig {
    fn default() -> Self {
        Self {
            mode: TenancyMode::Soft,
            quarantine_slug: String::from("quarantine"),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IntegrityConfig {
    /// Rows examined per table when a preview does not name a limit
    pub default_limit: usize,
    /// Largest per-table limit a preview or apply may request
    pub max_limit: usize,
    /// Page size used when a backfill walks a whole table
    pub backfill_batch_size: usize,
    /// Optional cap on every per-table count of a health scan
    pub scan_row_limit: Option<u64>,
}

impl Default for IntegrityConfig {
    fn default() -> Self {
        Self {
            default_limit: 500,
            max_limit: 1000,
            backfill_batch_size: 500,
            scan_row_limit: None,
        }
    }
}

/// Switches guarding the purge of all application data.
///
/// Both default to off. `allow_in_production` only matters when
/// [`Configuration::environment`] is `production`.
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct PurgeConfig {
    pub allow: bool,
    pub allow_in_production: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AdminApiKeyConfig {
    /// Raw key as presented in the Authorization header
    pub key: String,
    /// Name recorded as the actor of audited operations
    pub name: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct AdminConfig {
    pub api_keys: Vec<AdminApiKeyConfig>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Configuration {
    /// Relational store holding tenants and tenant-scoped records
    pub database: DatabaseConfig,
    /// Tenancy enforcement and quarantine identity
    pub tenancy: TenancyConfig,
    /// Limits for scans, previews and repairs
    pub integrity: IntegrityConfig,
    /// Purge permission flags
    pub purge: PurgeConfig,
    /// Deployment environment name, `production` enables the second purge gate
    pub environment: String,
    /// Platform administrator credentials
    pub admin: AdminConfig,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            tenancy: TenancyConfig::default(),
            integrity: IntegrityConfig::default(),
            purge: PurgeConfig::default(),
            environment: String::from("development"),
            admin: AdminConfig::default(),
        }
    }
}

impl Configuration {
    pub fn load() -> Result<Self, Box<figment::Error>> {
        let config = Figment::from(Serialized::defaults(Configuration::default()))
            .merge(Toml::file("tenantguard.toml"))
            .merge(Env::prefixed("TENANTGUARD__").split("__"))
            .extract()
            .map_err(Box::new)?;

        Ok(config)
    }

    pub fn load_from_path(path: &Path) -> Result<Self, Box<figment::Error>> {
        let config = Figment::from(Serialized::defaults(Configuration::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed("TENANTGUARD__").split("__"))
            .extract()
            .map_err(Box::new)?;

        Ok(config)
    }

    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }

    /// Check the limits and credentials for values the engine cannot work with.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.integrity.max_limit == 0 {
            anyhow::bail!("integrity.max_limit must be positive");
        }

        if self.integrity.default_limit == 0
            || self.integrity.default_limit > self.integrity.max_limit
        {
            anyhow::bail!(
                "integrity.default_limit must be between 1 and {}, got {}",
                self.integrity.max_limit,
                self.integrity.default_limit
            );
        }

        if self.integrity.backfill_batch_size == 0 {
            anyhow::bail!("integrity.backfill_batch_size must be positive");
        }

        if self.integrity.scan_row_limit == Some(0) {
            anyhow::bail!("integrity.scan_row_limit must be positive when set");
        }

        if self.tenancy.quarantine_slug.trim().is_empty() {
            anyhow::bail!("tenancy.quarantine_slug must not be empty");
        }

        if self.database.max_connections == 0 {
            anyhow::bail!("database.max_connections must be positive");
        }

        for key in &self.admin.api_keys {
            if key.key.is_empty() || key.name.is_empty() {
                anyhow::bail!("admin.api_keys entries need both a key and a name");
            }
        }

        Ok(())
    }
}
