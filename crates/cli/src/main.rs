use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::{Parser, Subcommand};
use loopbot_core::{AppConfig, ConfigLoader, DEFAULT_CONFIG_PATH};
use tracing_subscriber::EnvFilter;

mod commands;
mod market_file;

use commands::{RunArgs, ScanArgs, ValidateArgs};

#[derive(Parser)]
#[command(name = "loopbot")]
#[command(about = "Multi-exchange loop arbitrage", long_about = None)]
struct Cli {
    /// Config file path; defaults to config/Loopbot.toml merged with the environment
    #[arg(short, long, global = true, env = "LOOPBOT_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Discover and evaluate loops once, then print them
    Scan(ScanArgs),
    /// Step the engine against the paper market
    Run(RunArgs),
    /// Check a market file
    Validate(ValidateArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .or_else(|_| EnvFilter::try_new(&config.logging.filter))
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    match cli.command {
        Commands::Scan(args) => commands::run_scan(&args, &config).await?,
        Commands::Run(args) => {
            let watched = cli.config.or_else(|| {
                let default = PathBuf::from(DEFAULT_CONFIG_PATH);
                default.is_file().then_some(default)
            });
            commands::run_engine(&args, &config, watched).await?;
        }
        Commands::Validate(args) => commands::run_validate(&args)?,
    }

    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<AppConfig> {
    match path {
        Some(path) => ConfigLoader::load_from(path),
        None => ConfigLoader::load(),
    }
}
