//! Configuration infrastructure
//!
//! Configuration is layered, lowest priority first:
//! 1. Built-in defaults (see [`defaults`])
//! 2. Optional config file (TOML / JSON, picked by extension)
//! 3. `LEAD_SYNC__SECTION__KEY` environment variables
//! 4. The deployment-wide `DATABASE_URL` and `SOURCE_AUTH_COOKIE` variables

#![allow(clippy::derivable_impls)]

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load config: {source}")]
    Load {
        #[from]
        source: config::ConfigError,
    },

    #[error("Configuration validation failed: {message}")]
    Validation { message: String },
}

/// Complete application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub source: SourceConfig,
    pub sync: SyncConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// sqlx connection url, e.g. `sqlite:data/leads.db`
    pub url: String,
    pub max_connections: u32,
}

/// Marketplace API connection settings
#[derive(Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    pub base_url: String,
    pub list_path: String,
    /// Name of the session cookie the marketplace authenticates with
    pub cookie_name: String,
    /// Opaque session credential (cookie value)
    pub auth_cookie: String,
    pub page_size: u32,
    pub request_timeout_seconds: u64,
    /// Immediate re-attempts inside a single fetch, no backoff
    pub immediate_retries: u32,
    pub user_agent: String,
    pub origin: Option<String>,
    pub referer: Option<String>,
}

// auth_cookie is a credential; keep it out of logs
impl fmt::Debug for SourceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceConfig")
            .field("base_url", &self.base_url)
            .field("list_path", &self.list_path)
            .field("cookie_name", &self.cookie_name)
            .field("auth_cookie", &if self.auth_cookie.is_empty() { "<unset>" } else { "<redacted>" })
            .field("page_size", &self.page_size)
            .field("request_timeout_seconds", &self.request_timeout_seconds)
            .field("immediate_retries", &self.immediate_retries)
            .field("user_agent", &self.user_agent)
            .field("origin", &self.origin)
            .field("referer", &self.referer)
            .finish()
    }
}

impl SourceConfig {
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }
}

/// How far the incremental early-stop rule trusts the source ordering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderingPolicy {
    /// Assume strictly newest-first ids, never check
    Trust,
    /// Check id ordering while paging; fall back to a full scan on violation
    Verify,
}

/// Sync orchestrator settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Feature flag: when false, sync triggers are refused
    pub enabled: bool,
    /// Records per durable commit
    pub batch_size: usize,
    /// Safety cap on pages per run
    pub max_pages: u32,
    /// Politeness delay between page fetches
    pub page_delay_ms: u64,
    pub consecutive_failure_threshold: u32,
    pub retry_base_delay_ms: u64,
    pub retry_max_delay_ms: u64,
    pub ordering_policy: OrderingPolicy,
}

impl SyncConfig {
    pub const fn page_delay(&self) -> Duration {
        Duration::from_millis(self.page_delay_ms)
    }
}

/// Logging configuration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: "error", "warn", "info", "debug", "trace"
    pub level: String,
    /// Enable JSON formatted logs
    pub json_format: bool,
    pub console_output: bool,
    pub file_output: bool,
    /// Directory for log files; defaults to `<data dir>/lead-sync/logs`
    pub log_dir: Option<PathBuf>,
    pub file_name: String,
    /// Module-specific log level filters (e.g., "sqlx": "warn", "reqwest": "info")
    pub module_filters: HashMap<String, String>,
}

/// Default configuration values
pub mod defaults {
    pub const DATABASE_URL: &str = "sqlite:data/leads.db";
    pub const DB_MAX_CONNECTIONS: u32 = 5;

    pub const SOURCE_BASE_URL: &str = "https://bellevie.life";
    pub const SOURCE_LIST_PATH: &str = "/dapi/marketplace/order-leads/list";
    pub const SOURCE_COOKIE_NAME: &str = "bGH_6fJF77c";
    pub const SOURCE_ORIGIN: &str = "https://brand.bellevie.life";
    pub const SOURCE_REFERER: &str = "https://brand.bellevie.life/";
    pub const USER_AGENT: &str =
        "Mozilla/5.0 (Macintosh; Intel Mac OS X 10.15; rv:137.0) Gecko/20100101 Firefox/137.0";

    /// Records requested per page
    pub const PAGE_SIZE: u32 = 100;
    pub const REQUEST_TIMEOUT_SECONDS: u64 = 30;
    pub const IMMEDIATE_RETRIES: u32 = 1;

    pub const BATCH_SIZE: usize = 100;
    pub const MAX_PAGES: u32 = 1000;
    pub const PAGE_DELAY_MS: u64 = 300;
    pub const CONSECUTIVE_FAILURE_THRESHOLD: u32 = 3;
    pub const RETRY_BASE_DELAY_MS: u64 = 1000;
    pub const RETRY_MAX_DELAY_MS: u64 = 30_000;

    pub const LOG_LEVEL: &str = "info";
    pub const LOG_FILE_NAME: &str = "lead-sync.log";

    /// Environment prefix for layered overrides
    pub const ENV_PREFIX: &str = "LEAD_SYNC";
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: defaults::DATABASE_URL.to_string(),
            max_connections: defaults::DB_MAX_CONNECTIONS,
        }
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            base_url: defaults::SOURCE_BASE_URL.to_string(),
            list_path: defaults::SOURCE_LIST_PATH.to_string(),
            cookie_name: defaults::SOURCE_COOKIE_NAME.to_string(),
            auth_cookie: String::new(),
            page_size: defaults::PAGE_SIZE,
            request_timeout_seconds: defaults::REQUEST_TIMEOUT_SECONDS,
            immediate_retries: defaults::IMMEDIATE_RETRIES,
            user_agent: defaults::USER_AGENT.to_string(),
            origin: Some(defaults::SOURCE_ORIGIN.to_string()),
            referer: Some(defaults::SOURCE_REFERER.to_string()),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            batch_size: defaults::BATCH_SIZE,
            max_pages: defaults::MAX_PAGES,
            page_delay_ms: defaults::PAGE_DELAY_MS,
            consecutive_failure_threshold: defaults::CONSECUTIVE_FAILURE_THRESHOLD,
            retry_base_delay_ms: defaults::RETRY_BASE_DELAY_MS,
            retry_max_delay_ms: defaults::RETRY_MAX_DELAY_MS,
            ordering_policy: OrderingPolicy::Verify,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        let mut module_filters = HashMap::new();
        module_filters.insert("sqlx".to_string(), "warn".to_string());
        module_filters.insert("reqwest".to_string(), "info".to_string());

        Self {
            level: defaults::LOG_LEVEL.to_string(),
            json_format: false,
            console_output: true,
            file_output: false,
            log_dir: None,
            file_name: defaults::LOG_FILE_NAME.to_string(),
            module_filters,
        }
    }
}

impl AppConfig {
    /// Load configuration from defaults, an optional file and the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_with_env(path, None)
    }

    /// Same as [`AppConfig::load`] but reads variables from `env` instead of the
    /// process environment when given.
    pub fn load_with_env(
        path: Option<&Path>,
        env: Option<HashMap<String, String>>,
    ) -> Result<Self, ConfigError> {
        let lookup = |key: &str| match &env {
            Some(map) => map.get(key).cloned(),
            None => std::env::var(key).ok(),
        };
        let database_url = lookup("DATABASE_URL").filter(|v| !v.trim().is_empty());
        let auth_cookie = lookup("SOURCE_AUTH_COOKIE").filter(|v| !v.trim().is_empty());

        let mut builder =
            config::Config::builder().add_source(config::Config::try_from(&Self::default())?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }

        let config: Self = builder
            .add_source(
                config::Environment::with_prefix(defaults::ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true)
                    .source(env.clone()),
            )
            .set_override_option("database.url", database_url)?
            .set_override_option("source.auth_cookie", auth_cookie)?
            .build()?
            .try_deserialize()?;

        config.validate()?;
        info!(
            "✅ Config loaded: database={}, source={}, batch_size={}, sync enabled={}",
            config.database.url, config.source.base_url, config.sync.batch_size, config.sync.enabled
        );
        Ok(config)
    }

    /// Fail fast on settings the engine cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |message: &str| {
            Err(ConfigError::Validation {
                message: message.to_string(),
            })
        };

        if self.database.url.trim().is_empty() {
            return invalid("database.url must not be empty");
        }
        if self.database.max_connections == 0 {
            return invalid("database.max_connections must be greater than 0");
        }
        if url::Url::parse(&self.source.base_url).is_err() {
            return Err(ConfigError::Validation {
                message: format!("source.base_url is not a valid url: {}", self.source.base_url),
            });
        }
        if self.source.page_size == 0 {
            return invalid("source.page_size must be greater than 0");
        }
        if self.sync.batch_size == 0 {
            return invalid("sync.batch_size must be greater than 0");
        }
        if self.sync.max_pages == 0 {
            return invalid("sync.max_pages must be greater than 0");
        }
        if self.sync.consecutive_failure_threshold == 0 {
            return invalid("sync.consecutive_failure_threshold must be greater than 0");
        }
        if self.sync.retry_base_delay_ms > self.sync.retry_max_delay_ms {
            return invalid("sync.retry_base_delay_ms cannot be greater than sync.retry_max_delay_ms");
        }
        if self.source.auth_cookie.is_empty() {
            warn!("⚠️ source.auth_cookie is not set; the marketplace will reject requests with 401");
        }
        Ok(())
    }
}

/// Locates the per-user config file, mirroring the desktop layout.
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    /// Get the application configuration directory
    pub fn get_config_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("lead-sync"))
    }

    /// Get application data directory
    pub fn get_app_data_dir() -> Option<PathBuf> {
        dirs::data_local_dir().map(|dir| dir.join("lead-sync"))
    }

    pub fn new() -> Option<Self> {
        Self::get_config_dir().map(|dir| Self {
            config_path: dir.join("lead_sync.toml"),
        })
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Load the explicit file if one is given, else the per-user file when it exists.
    pub fn load_config(explicit: Option<&Path>) -> Result<AppConfig, ConfigError> {
        if let Some(path) = explicit {
            return AppConfig::load(Some(path));
        }
        match Self::new().filter(|m| m.config_path.exists()) {
            Some(manager) => {
                info!("📁 Using config file: {:?}", manager.config_path);
                AppConfig::load(Some(&manager.config_path))
            }
            None => AppConfig::load(None),
        }
    }
}
