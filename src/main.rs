use std::net::SocketAddr;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use common::Store;
use common::cli::{CommonArgs, CommonCommands, utils};
use common::config::Configuration;
use integrity::{ExecutionMode, Integrity, LiveConfirmation, PlanScope, ScanScope};
use router::{AppState, create_router};

/// Actor recorded for writes made from the command line
const CLI_ACTOR: &str = "cli";

#[derive(Parser)]
#[command(name = "tenantguard")]
#[command(about = "tenantguard - tenant data-integrity scanner, repair engine and admin API")]
#[command(version)]
struct Cli {
    #[command(flatten)]
    common: CommonArgs,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Args)]
struct ServeArgs {
    #[arg(long, help = "Admin HTTP API port", default_value_t = 8080)]
    port: u16,

    #[arg(long, help = "Bind address for the HTTP server", default_value = "0.0.0.0")]
    bind: String,
}

impl Default for ServeArgs {
    fn default() -> Self {
        Self {
            port: 8080,
            bind: String::from("0.0.0.0"),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the admin HTTP API (default)
    Serve(ServeArgs),
    /// Print a health summary of rows missing their tenant
    Scan {
        #[arg(long, help = "Only count rows attributable to this tenant")]
        tenant_id: Option<String>,
        #[arg(long, value_delimiter = ',', help = "Comma-separated tables to scan")]
        tables: Option<Vec<String>>,
        #[arg(long, help = "Cap each per-table count")]
        row_limit: Option<u64>,
    },
    /// Print repair candidates without writing anything
    Preview {
        #[arg(long)]
        tenant_id: Option<String>,
        #[arg(long, value_delimiter = ',')]
        tables: Option<Vec<String>>,
        #[arg(long, help = "Orphan rows examined per table")]
        limit: Option<usize>,
    },
    /// Walk every checked table and assign tenants to orphan rows
    Backfill {
        #[arg(long, help = "Write the repairs instead of reporting them")]
        apply: bool,
    },
    #[command(flatten)]
    Common(CommonCommands),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    utils::init_logging(&cli.common);

    let config = utils::load_config(cli.common.config.as_ref())?;

    let command = cli
        .command
        .unwrap_or_else(|| Commands::Serve(ServeArgs::default()));
    if let Commands::Common(common_cmd) = &command {
        return utils::handle_common_command(common_cmd, &config);
    }

    config.validate().context("Invalid configuration")?;
    let integrity = open_engine(&config).await?;

    match command {
        Commands::Serve(args) => serve(integrity, config, &args.bind, args.port).await,
        Commands::Scan {
            tenant_id,
            tables,
            row_limit,
        } => {
            let scope = ScanScope {
                tenant_id,
                tables,
                row_limit,
            };
            print_json(&integrity.scan(&scope).await?)
        }
        Commands::Preview {
            tenant_id,
            tables,
            limit,
        } => {
            let scope = PlanScope {
                tenant_id,
                tables,
                limit,
            };
            print_json(&integrity.plan(&scope).await?)
        }
        Commands::Backfill { apply } => {
            // The flag is the command-line form of the confirmation header
            let mode = if apply {
                ExecutionMode::Live(LiveConfirmation::from_header(Some(LiveConfirmation::VALUE))?)
            } else {
                ExecutionMode::DryRun
            };
            print_json(&integrity.backfill(mode, Some(CLI_ACTOR)).await?)
        }
        Commands::Common(_) => Ok(()),
    }
}

async fn open_engine(config: &Configuration) -> Result<Integrity> {
    let store = Store::connect(&config.database)
        .await
        .context("Failed to connect to database")?;
    let integrity = Integrity::from_store(store, config)
        .await
        .context("Failed to initialize integrity engine")?;

    if integrity.quarantine().is_none() {
        log::warn!(
            "Quarantine tenant '{}' is missing; quarantine actions will be refused",
            config.tenancy.quarantine_slug
        );
    }
    Ok(integrity)
}

async fn serve(integrity: Integrity, config: Configuration, bind: &str, port: u16) -> Result<()> {
    let bind_ip = bind
        .parse::<std::net::IpAddr>()
        .context("Invalid bind address")?;
    let addr = SocketAddr::new(bind_ip, port);

    let mode = config.tenancy.mode;
    let app = create_router(AppState::new(integrity, config));

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    tracing::info!(%addr, tenancy_mode = %mode, "Admin API listening");

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                log::error!("Failed to listen for ctrl+c signal: {e}");
            }
            log::info!("Shutting down admin API...");
        })
        .await
        .context("HTTP server error")?;

    log::info!("Admin API stopped gracefully");
    Ok(())
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to serialize result")?;
    println!("{json}");
    Ok(())
}
