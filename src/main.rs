//! cardhub - Trello ↔ GitLab synchronization relay
//!
//! Main entry point for the cardhub CLI.

use anyhow::Context;
use cardhub::config::{validate_config, HubConfig, RunMode};
use cardhub::server::WebhookServer;
use cardhub::store::{MappingStatus, MappingStore};
use cardhub::sync::SyncOrchestrator;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

/// cardhub - Moves work between a Trello board and a GitLab project
#[derive(Parser, Debug)]
#[command(name = "cardhub")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to config file (default: ~/.config/cardhub/config.yaml)
    #[arg(short, long, env = "CARDHUB_CONFIG", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the webhook server
    Serve {
        /// Port to listen on (overrides the config file)
        #[arg(short, long, env = "CARDHUB_PORT")]
        port: Option<u16>,

        /// Log format (overrides the config file)
        #[arg(long, env = "CARDHUB_MODE", value_enum)]
        mode: Option<RunMode>,
    },

    /// Write a template configuration file
    Init,

    /// Load and validate the configuration
    CheckConfig,

    /// List stored card/issue mappings
    Mappings {
        /// Only show mappings with this status
        #[arg(short, long, value_enum)]
        status: Option<MappingStatus>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config_path = cli.config.unwrap_or_else(HubConfig::default_path);

    match cli.command {
        Commands::Serve { port, mode } => handle_serve(&config_path, port, mode).await,
        Commands::Init => {
            init_logging(RunMode::Debug);
            handle_init(&config_path)
        }
        Commands::CheckConfig => {
            init_logging(RunMode::Debug);
            handle_check_config(&config_path)
        }
        Commands::Mappings { status } => {
            init_logging(RunMode::Debug);
            handle_mappings(&config_path, status).await
        }
    }
}

fn init_logging(mode: RunMode) {
    if let Err(e) = cardhub::logging::init(mode) {
        eprintln!("Failed to initialize logging: {}", e);
    }
}

fn load_config(path: &Path) -> anyhow::Result<HubConfig> {
    HubConfig::load(path).with_context(|| {
        format!(
            "Could not load {}. Run 'cardhub init' to create one.",
            path.display()
        )
    })
}

async fn handle_serve(
    config_path: &Path,
    port: Option<u16>,
    mode: Option<RunMode>,
) -> anyhow::Result<()> {
    let mut config = load_config(config_path)?;
    if let Some(port) = port {
        config.server.port = port;
    }
    if let Some(mode) = mode {
        config.server.mode = mode;
    }

    init_logging(config.server.mode);
    cardhub::config::validate_config_result(&config)?;

    let store = Arc::new(
        MappingStore::open(&config.store)
            .with_context(|| format!("Failed to open store {}", config.store.path.display()))?,
    );
    let orchestrator = SyncOrchestrator::from_config(&config, store)?;

    tracing::info!(
        port = config.server.port,
        mode = ?config.server.mode,
        in_progress = %config.trello.list_in_progress,
        testing = %config.trello.list_testing,
        project = %config.gitlab.project_id,
        "Starting cardhub"
    );

    let addr = format!("0.0.0.0:{}", config.server.port);
    WebhookServer::new(orchestrator).run(&addr).await?;

    tracing::info!("cardhub stopped");
    Ok(())
}

fn handle_init(config_path: &Path) -> anyhow::Result<()> {
    if config_path.exists() {
        println!("Configuration already exists at {}", config_path.display());
        println!();
        println!("Check it with:");
        println!("  cardhub check-config");
        return Ok(());
    }

    HubConfig::template()
        .save(config_path)
        .with_context(|| format!("Failed to write {}", config_path.display()))?;

    println!("✓ Created configuration at {}", config_path.display());
    println!();
    println!("Next steps:");
    println!("  1. Fill in the Trello key, list ids and GitLab project id");
    println!("  2. Export TRELLO_TOKEN and GITLAB_TOKEN");
    println!("  3. cardhub check-config");
    println!("  4. cardhub serve");

    Ok(())
}

fn handle_check_config(config_path: &Path) -> anyhow::Result<()> {
    let config = load_config(config_path)?;

    match validate_config(&config) {
        Ok(()) => {
            println!("✓ {} is valid", config_path.display());
            println!("  Port:        {}", config.server.port);
            println!("  Store:       {} ({})", config.store.path.display(), config.store.table);
            println!("  In progress: {}", config.trello.list_in_progress);
            println!("  Testing:     {}", config.trello.list_testing);
            println!("  Project:     {}", config.gitlab.project_id);
            Ok(())
        }
        Err(errors) => {
            println!("✗ {} has {} problem(s):", config_path.display(), errors.len());
            for error in &errors {
                println!("  - {}", error);
            }
            anyhow::bail!("invalid configuration")
        }
    }
}

async fn handle_mappings(
    config_path: &Path,
    status: Option<MappingStatus>,
) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    let store = MappingStore::open(&config.store)?;
    let records = store.list(status).await?;

    if records.is_empty() {
        println!("No mappings");
        return Ok(());
    }

    println!(
        "{:<26} {:>10} {:>6} {:<7} UPDATED",
        "CARD", "ISSUE", "CYCLE", "STATUS"
    );
    for record in &records {
        println!(
            "{:<26} {:>10} {:>6} {:<7} {}",
            record.card_id,
            record.issue_id,
            record.cycle,
            record.status.as_str(),
            record.updated_at.format("%Y-%m-%d %H:%M:%S")
        );
    }
    println!();
    println!("{} mapping(s)", records.len());

    Ok(())
}
