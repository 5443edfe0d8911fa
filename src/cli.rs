use std::path::PathBuf;

use clap::{Parser, Subcommand};

use lead_sync_lib::domain::SyncMode;

#[derive(Debug, Parser)]
#[command(name = "lead-sync", version, about = "Incremental lead synchronization engine")]
pub struct Cli {
    /// Config file (TOML/JSON). Defaults to the per-user config file when present.
    #[arg(long, global = true, env = "LEAD_SYNC_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run one sync in the foreground (default if no subcommand given).
    Sync {
        /// `full` pages through everything, `incremental` stops at the watermark.
        #[arg(long, default_value = "incremental")]
        mode: SyncMode,
    },

    /// Create or update the lead_events / lead_projections schema.
    Migrate,

    /// Print database statistics and the available filter values.
    Stats,

    /// Print the resolved configuration (secrets redacted).
    Config,
}
