#![allow(clippy::uninlined_format_args)]

mod cli;

use std::time::Duration;

use anyhow::{Result, bail};
use clap::Parser;
use tracing::{info, warn};

use cli::{Cli, Commands};
use lead_sync_lib::application::{AppState, StartResult};
use lead_sync_lib::commands;
use lead_sync_lib::domain::{JobStatus, SyncMode};
use lead_sync_lib::infrastructure::logging::{init_logging_with_config, log_system_info};
use lead_sync_lib::infrastructure::{AppConfig, ConfigManager, DatabaseConnection};

const STATUS_POLL_INTERVAL: Duration = Duration::from_secs(2);

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = ConfigManager::load_config(cli.config.as_deref())?;
    init_logging_with_config(&config.logging)?;

    match cli.command.unwrap_or(Commands::Sync {
        mode: SyncMode::Incremental,
    }) {
        Commands::Sync { mode } => run_sync(config, mode).await,
        Commands::Migrate => {
            let db = DatabaseConnection::from_config(&config.database).await?;
            db.migrate().await?;
            info!("✅ Migration complete: {}", config.database.url);
            Ok(())
        }
        Commands::Stats => {
            let state = AppState::initialize(config).await?;
            let stats = commands::get_database_stats(&state).await.map_err(anyhow::Error::msg)?;
            let options = commands::get_filter_options(&state).await.map_err(anyhow::Error::msg)?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
            println!("{}", serde_json::to_string_pretty(&options)?);
            Ok(())
        }
        Commands::Config => {
            println!("{:#?}", config);
            Ok(())
        }
    }
}

async fn run_sync(config: AppConfig, mode: SyncMode) -> Result<()> {
    log_system_info();
    let state = AppState::initialize(config).await?;

    let response = commands::start_sync(&state, mode).await;
    if response.result != StartResult::Accepted {
        warn!("{}", response.message);
        return Ok(());
    }

    let mut ticker = tokio::time::interval(STATUS_POLL_INTERVAL);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let status = commands::get_sync_status(&state).await;
                if !status.running {
                    break;
                }
                info!(
                    "⏳ {} ({} / {} records, eta {}s)",
                    status.message, status.processed, status.total, status.eta_seconds
                );
            }
            _ = tokio::signal::ctrl_c() => {
                warn!("🛑 Ctrl-C received, stopping after the current batch");
                commands::cancel_sync(&state).await;
            }
        }
    }

    state.wait_for_current_run().await?;
    let status = commands::get_sync_status(&state).await;
    println!("{}", serde_json::to_string_pretty(&status)?);

    if status.status == JobStatus::Failed {
        bail!(status.message);
    }
    Ok(())
}
