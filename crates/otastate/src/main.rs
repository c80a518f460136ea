//! otastate agent
//!
//! Recovers persisted OTA state at boot and keeps the device inventory
//! published until shut down.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::Result;
use otastate_inventory::Inventory;
use otastate_storage::Storage;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod agent;
mod config;

use agent::LogPublisher;
use config::Config;

#[derive(Parser)]
#[command(name = "otastate")]
#[command(about = "Device state layer for an OTA update agent", long_about = None)]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Recover state and publish inventory until interrupted (default)
    Run,
    /// Show what is persisted
    Status,
    /// Forget the in-flight deployment
    #[command(name = "clear-deployment")]
    ClearDeployment,
    /// Erase keys and deployment
    #[command(name = "factory-reset")]
    FactoryReset,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::load_default()?,
    };
    init_tracing(&config);

    let storage = Storage::open_dir(&config.storage.path)?;
    let result = match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run(&config, &storage).await,
        Commands::Status => status(&storage),
        Commands::ClearDeployment => storage.clear_ota_deployment().map_err(Into::into),
        Commands::FactoryReset => storage.factory_reset().map_err(Into::into),
    };
    storage.exit();

    result
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.agent.log_level));

    if config.agent.json_logs {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

async fn run(config: &Config, storage: &Storage) -> Result<()> {
    let boot = agent::recover(storage)?;
    info!(
        has_auth_keys = boot.has_auth_keys,
        pending_deployment = boot.pending_deployment.is_some(),
        "otastate agent starting"
    );

    let settings = config.inventory.settings.clone();
    let publisher = Arc::new(LogPublisher::new(&settings));
    let inventory = Inventory::init(settings, publisher);

    inventory.set(Some(&config.inventory.attributes)).await?;
    inventory.activate()?;
    inventory.execute()?;

    tokio::signal::ctrl_c().await?;
    info!("shutdown requested");

    inventory.exit().await;
    Ok(())
}

fn status(storage: &Storage) -> Result<()> {
    match storage.get_auth_keys()? {
        Some(pair) => println!(
            "auth keys: private {} bytes, public {} bytes",
            pair.private_key().len(),
            pair.public_key().len()
        ),
        None => println!("auth keys: none"),
    }

    match storage.get_ota_deployment()? {
        Some(record) => println!(
            "deployment: {} (artifact {})",
            record.id, record.artifact_name
        ),
        None => println!("deployment: none"),
    }

    Ok(())
}
