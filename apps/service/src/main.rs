use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use sentinel_service::{Config, Monitoring};
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Parser)]
#[command(name = "sentinel-service")]
#[command(about = "Headless network liveness monitor", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to the config file (default: $XDG_CONFIG_HOME/sentinel/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Print the effective configuration and exit
    #[arg(long)]
    print_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    logger::init_tracing();

    let cli = Cli::parse();

    let mut config = Config::from_config(cli.config.as_deref()).context("Failed to load configuration")?;
    config.apply_env(std::env::vars()).context("Invalid SENTINEL_* environment")?;
    config.validate().context("Invalid configuration")?;

    if cli.print_config {
        print!("{config}");
        return Ok(());
    }
    info!("{}", config);

    let cancel = CancellationToken::new();
    let monitoring = Monitoring::start(&config, cancel.clone()).await?;

    tokio::signal::ctrl_c().await.context("Failed to listen for Ctrl-C")?;
    info!("Shutdown requested");
    monitoring.shutdown().await;

    Ok(())
}
