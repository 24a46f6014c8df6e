//! agro-price-digest: daily CEPEA/ESALQ commodity digest.
//!
//! Single-binary Tokio application that:
//! 1. Fetches the Soja, Milho and Boi Gordo indicator pages (HTTP, then browser)
//! 2. Extracts and validates the R$ price of each
//! 3. Falls back to the last known good values
//! 4. Prints or delivers a three-line summary

use agro_price_digest::commands::{self, AppContext};
use agro_price_digest::domain::Commodity;
use agro_price_digest::infrastructure::config::ConfigManager;
use agro_price_digest::infrastructure::delivery::StdoutDelivery;
use agro_price_digest::infrastructure::logging::{LoggingConfig, init_logging_with_config};
use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// CEPEA/ESALQ commodity price digest
#[derive(Parser)]
#[command(name = "agro-price-digest", version, about = "CEPEA/ESALQ commodity price digest")]
struct Cli {
    /// Configuration file (defaults to the user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Never fall back to the browser fetcher.
    #[arg(long, global = true)]
    no_browser: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Collect all commodities and print the summary
    Collect,
    /// Collect and deliver the summary now
    Send,
    /// Deliver the summary every day at the configured time
    Schedule,
    /// Collect a single commodity without touching the cache
    Test {
        /// soja, milho or boi
        commodity: Commodity,
    },
    /// Print the effective configuration
    Config,
}

/// Cancel `token` on the first Ctrl-C
fn cancel_on_ctrl_c(token: CancellationToken) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                warn!("🛑 Ctrl-C received, stopping");
                token.cancel();
            }
            Err(e) => warn!("Failed to listen for Ctrl-C: {}", e),
        }
    });
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let manager = match cli.config {
        Some(path) => ConfigManager::with_path(path),
        None => ConfigManager::new()?,
    };
    let config = manager.load_config().await?;
    init_logging_with_config(&LoggingConfig::from_app_config(&config)?)?;
    info!("Configuration: {:?}", manager.config_path());

    let cancel = CancellationToken::new();
    cancel_on_ctrl_c(cancel.clone());
    let ctx = AppContext::new(config, manager.config_path().to_path_buf(), cancel, !cli.no_browser)?;

    let code = match cli.command {
        Command::Collect => {
            commands::collect(&ctx).await?;
            ExitCode::SUCCESS
        }
        Command::Send => {
            if commands::send(&ctx, &StdoutDelivery).await? {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
        Command::Schedule => {
            commands::schedule(&ctx, &StdoutDelivery).await?;
            ExitCode::SUCCESS
        }
        Command::Test { commodity } => {
            if commands::test_commodity(&ctx, commodity).await? {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
        Command::Config => {
            commands::show_config(&ctx)?;
            ExitCode::SUCCESS
        }
    };
    Ok(code)
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("❌ {e:#}");
            ExitCode::FAILURE
        }
    }
}
