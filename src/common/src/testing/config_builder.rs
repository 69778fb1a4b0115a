//! Test configuration builder for creating test setups quickly.

use crate::config::{AdminApiKeyConfig, Configuration, DatabaseConfig};
use crate::tenancy::TenancyMode;

/// Builder for creating test configurations.
///
/// Starts from an in-memory SQLite database so tests never touch disk
/// unless they ask for it.
#[derive(Debug, Clone)]
pub struct TestConfigBuilder {
    config: Configuration,
}

impl Default for TestConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TestConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: Configuration {
                database: DatabaseConfig::in_memory(),
                ..Configuration::default()
            },
        }
    }

    /// Set the database DSN.
    pub fn with_database_dsn(mut self, dsn: &str) -> Self {
        self.config.database.dsn = dsn.to_string();
        self
    }

    pub fn strict(mut self) -> Self {
        self.config.tenancy.mode = TenancyMode::Strict;
        self
    }

    pub fn soft(mut self) -> Self {
        self.config.tenancy.mode = TenancyMode::Soft;
        self
    }

    pub fn with_quarantine_slug(mut self, slug: &str) -> Self {
        self.config.tenancy.quarantine_slug = slug.to_string();
        self
    }

    /// Register an admin API key.
    pub fn with_admin_key(mut self, key: &str, name: &str) -> Self {
        self.config.admin.api_keys.push(AdminApiKeyConfig {
            key: key.to_string(),
            name: name.to_string(),
        });
        self
    }

    pub fn with_limits(mut self, default_limit: usize, max_limit: usize) -> Self {
        self.config.integrity.default_limit = default_limit;
        self.config.integrity.max_limit = max_limit;
        self
    }

    pub fn with_backfill_batch_size(mut self, size: usize) -> Self {
        self.config.integrity.backfill_batch_size = size;
        self
    }

    /// Set both purge flags and the environment name.
    pub fn with_purge(mut self, allow: bool, allow_in_production: bool, environment: &str) -> Self {
        self.config.purge.allow = allow;
        self.config.purge.allow_in_production = allow_in_production;
        self.config.environment = environment.to_string();
        self
    }

    pub fn build(self) -> Configuration {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults_to_in_memory() {
        let config = TestConfigBuilder::new().build();
        assert_eq!(config.database.dsn, "sqlite::memory:");
        assert!(config.tenancy.mode.is_soft());
        assert!(config.admin.api_keys.is_empty());
    }

    #[test]
    fn test_builder_chain() {
        let config = TestConfigBuilder::new()
            .strict()
            .with_quarantine_slug("limbo")
            .with_admin_key("secret", "ops")
            .with_limits(10, 20)
            .with_purge(true, false, "production")
            .build();

        assert!(config.tenancy.mode.is_strict());
        assert_eq!(config.tenancy.quarantine_slug, "limbo");
        assert_eq!(config.admin.api_keys[0].name, "ops");
        assert_eq!(config.integrity.max_limit, 20);
        assert!(config.purge.allow);
        assert!(config.is_production());
        assert!(config.validate().is_ok());
    }
}
