//! Logging system configuration and initialization
//!
//! This module provides the logging setup for the sync engine:
//! - Console output (plain) and optional non-blocking file output
//! - Structured JSON logging (optional)
//! - Configuration file based log level control with per-module filters
//! - `RUST_LOG` always wins over the configured level

#![allow(clippy::uninlined_format_args)]

use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{Result, anyhow};
use chrono::Utc;
use lazy_static::lazy_static;
use tracing::info;
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{
    EnvFilter, Layer, Registry,
    fmt::{self, time::FormatTime},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

// Re-export LoggingConfig from config module
pub use crate::infrastructure::config::LoggingConfig;
use crate::infrastructure::config::ConfigManager;

// Global guard to keep the log file writer alive
lazy_static! {
    static ref LOG_GUARDS: Mutex<Vec<tracing_appender::non_blocking::WorkerGuard>> = Mutex::new(Vec::new());
}

/// Noisy dependency targets held down unless TRACE is requested
const QUIET_TARGETS: &[&str] = &[
    "sqlx::query=warn",
    "sqlx::sqlite=warn",
    "reqwest=warn",
    "hyper=warn",
    "hyper_util=warn",
    "h2=warn",
];

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Millisecond UTC timestamps
struct UtcTimeFormatter;

impl FormatTime for UtcTimeFormatter {
    fn format_time(&self, w: &mut fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ"))
    }
}

/// Resolve the log directory: configured path, else `<data dir>/lead-sync/logs`, else `./logs`
pub fn get_log_directory(config: &LoggingConfig) -> PathBuf {
    if let Some(dir) = &config.log_dir {
        return dir.clone();
    }
    ConfigManager::get_app_data_dir()
        .map(|dir| dir.join("logs"))
        .unwrap_or_else(|| PathBuf::from("logs"))
}

/// Initialize the logging system with default configuration
pub fn init_logging() -> Result<()> {
    init_logging_with_config(&LoggingConfig::default())
}

/// Builds the filter from `RUST_LOG` or, when unset, from the configuration.
pub fn build_env_filter(config: &LoggingConfig) -> Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    filter_from_config(config)
}

fn filter_from_config(config: &LoggingConfig) -> Result<EnvFilter> {
    let mut filter = EnvFilter::try_new(&config.level)
        .map_err(|e| anyhow!("Invalid log level '{}': {}", config.level, e))?;

    if !config.level.to_lowercase().contains("trace") {
        for directive in QUIET_TARGETS {
            filter = filter.add_directive(directive.parse()?);
        }
    }

    // Module filters are applied last so they win over the quiet defaults
    for (module, level) in &config.module_filters {
        filter = filter.add_directive(format!("{}={}", module, level).parse()?);
    }

    Ok(filter)
}

/// Initialize logging with custom configuration
///
/// Safe to call more than once; only the first call installs a subscriber.
pub fn init_logging_with_config(config: &LoggingConfig) -> Result<()> {
    let env_filter = build_env_filter(config)?;
    let mut layers: Vec<BoxedLayer> = Vec::new();

    if config.file_output {
        let log_dir = get_log_directory(config);
        std::fs::create_dir_all(&log_dir)
            .map_err(|e| anyhow!("Failed to create log directory {:?}: {}", log_dir, e))?;

        let file_appender = rolling::never(&log_dir, &config.file_name);
        let (file_writer, file_guard) = non_blocking(file_appender);

        // Store the guard globally to prevent it from being dropped
        LOG_GUARDS
            .lock()
            .map_err(|_| anyhow!("Log guard registry poisoned"))?
            .push(file_guard);

        let file_layer = if config.json_format {
            fmt::Layer::new()
                .json()
                .with_writer(file_writer)
                .with_timer(UtcTimeFormatter)
                .with_target(true)
                .with_ansi(false)
                .boxed()
        } else {
            fmt::Layer::new()
                .with_writer(file_writer)
                .with_timer(UtcTimeFormatter)
                .with_target(false)
                .with_ansi(false)
                .boxed()
        };
        layers.push(file_layer);
    }

    if config.console_output {
        let console_layer = if config.json_format {
            fmt::Layer::new()
                .json()
                .with_writer(std::io::stdout)
                .with_timer(UtcTimeFormatter)
                .boxed()
        } else {
            fmt::Layer::new()
                .with_writer(std::io::stdout)
                .with_timer(UtcTimeFormatter)
                .with_target(false)
                .boxed()
        };
        layers.push(console_layer);
    }

    if layers.is_empty() {
        return Err(anyhow!("No logging output configured"));
    }

    if tracing_subscriber::registry()
        .with(layers)
        .with(env_filter)
        .try_init()
        .is_err()
    {
        return Ok(());
    }

    info!("Logging system initialized");
    info!("Log level: {}", config.level);
    info!("JSON format: {}", config.json_format);
    info!("Console output: {}", config.console_output);
    if config.file_output {
        info!("File output: {:?}", get_log_directory(config).join(&config.file_name));
    }
    Ok(())
}

/// Log system information for diagnostics
pub fn log_system_info() {
    info!("=== lead-sync System Information ===");
    info!("Application version: {}", env!("CARGO_PKG_VERSION"));
    info!("Operating system: {}", std::env::consts::OS);
    info!("Architecture: {}", std::env::consts::ARCH);

    if let Ok(current_dir) = std::env::current_dir() {
        info!("Working directory: {:?}", current_dir);
    }
    info!("====================================");
}
