use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Global CLI arguments
#[derive(Parser, Debug, Clone, Default)]
pub struct CommonArgs {
    #[arg(long, global = true, help = "Configuration file path")]
    pub config: Option<PathBuf>,

    #[arg(short, long, global = true, help = "Enable verbose logging")]
    pub verbose: bool,

    #[arg(short, long, global = true, help = "Enable quiet mode (minimal output)")]
    pub quiet: bool,
}

/// Subcommands that inspect configuration without touching the database
#[derive(Subcommand, Debug, Clone)]
pub enum CommonCommands {
    /// Show current configuration and exit
    Config {
        #[arg(long, help = "Show configuration in JSON format")]
        json: bool,
    },
    /// Validate configuration and exit
    Validate,
    /// Show version information and exit
    Version,
}

/// Utility functions for CLI operations
pub mod utils {
    use super::*;
    use crate::config::Configuration;
    use anyhow::{Context, Result};
    use tracing_subscriber::EnvFilter;

    /// Log level implied by the CLI flags
    pub fn log_level(args: &CommonArgs) -> &'static str {
        if args.quiet {
            "warn"
        } else if args.verbose {
            "debug"
        } else {
            "info"
        }
    }

    /// Initialize logging based on CLI arguments. `RUST_LOG` wins when set.
    pub fn init_logging(args: &CommonArgs) {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(log_level(args)));
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    /// Load configuration with optional override from CLI
    pub fn load_config(config_path: Option<&PathBuf>) -> Result<Configuration> {
        match config_path {
            Some(path) => {
                log::info!("Loading configuration from: {}", path.display());
                Configuration::load_from_path(path).context("Failed to load configuration")
            }
            None => Configuration::load().context("Failed to load configuration"),
        }
    }

    /// Display configuration in human-readable or JSON format. Admin keys
    /// are never printed.
    pub fn display_config(config: &Configuration, json: bool) -> Result<()> {
        if json {
            let mut redacted = config.clone();
            for key in &mut redacted.admin.api_keys {
                key.key = "<redacted>".to_string();
            }
            let json = serde_json::to_string_pretty(&redacted)
                .context("Failed to serialize configuration to JSON")?;
            println!("{json}");
        } else {
            println!("tenantguard Configuration:");
            println!("==========================");
            println!("Environment: {}", config.environment);
            println!("Database DSN: {}", config.database.dsn);
            println!("Database max connections: {}", config.database.max_connections);
            println!("Bootstrap schema: {}", config.database.bootstrap_schema);
            println!("Tenancy mode: {}", config.tenancy.mode);
            println!("Quarantine tenant slug: {}", config.tenancy.quarantine_slug);
            println!(
                "Preview limit: default {}, max {}",
                config.integrity.default_limit, config.integrity.max_limit
            );
            println!("Backfill batch size: {}", config.integrity.backfill_batch_size);
            match config.integrity.scan_row_limit {
                Some(limit) => println!("Scan row limit: {limit}"),
                None => println!("Scan row limit: none"),
            }
            println!(
                "Purge allowed: {} (in production: {})",
                config.purge.allow, config.purge.allow_in_production
            );
            println!("Admin API keys: {}", config.admin.api_keys.len());
        }
        Ok(())
    }

    /// Validate configuration and report any issues
    pub fn validate_config(config: &Configuration) -> Result<()> {
        log::info!("Validating configuration...");

        if config.database.dsn.is_empty() {
            anyhow::bail!("Database DSN cannot be empty");
        }

        config.validate()?;

        if config.admin.api_keys.is_empty() {
            log::warn!("No admin API keys configured; every /admin request will be rejected");
        }

        log::info!("✅ Configuration validation passed");
        Ok(())
    }

    /// Handle commands that don't require the database
    pub fn handle_common_command(command: &CommonCommands, config: &Configuration) -> Result<()> {
        match command {
            CommonCommands::Config { json } => display_config(config, *json),
            CommonCommands::Validate => validate_config(config),
            CommonCommands::Version => {
                println!("{}", version_info());
                Ok(())
            }
        }
    }

    /// Standard version information
    pub fn version_info() -> String {
        format!(
            "tenantguard {} (rust {})",
            env!("CARGO_PKG_VERSION"),
            env!("CARGO_PKG_RUST_VERSION")
        )
    }
}
