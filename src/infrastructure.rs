//! Infrastructure layer for storage, the marketplace source and process setup
//!
//! This module provides the SQLite connection and schema, the event and
//! projection writers, the read-only query repository, the marketplace HTTP
//! client, retry backoff, configuration and logging.

pub mod config; // Layered configuration
pub mod database_connection;
pub mod event_ingester;
pub mod lead_query_repository;
pub mod logging; // Logging infrastructure
pub mod marketplace_client;
pub mod projection_updater;
pub mod retry_policy;
pub mod watermark_tracker;

// Re-export commonly used items
pub use config::{AppConfig, ConfigError, ConfigManager, OrderingPolicy, SourceConfig, SyncConfig};
pub use database_connection::DatabaseConnection;
pub use event_ingester::{EventIngester, IngestOutcome};
pub use lead_query_repository::{DatabaseStats, FilterOptions, LeadFilter, LeadQueryRepository};
pub use marketplace_client::{MarketplaceClient, MarketplaceClientConfig};
pub use projection_updater::{ProjectionOutcome, ProjectionUpdater};
pub use retry_policy::RetryPolicy;
pub use watermark_tracker::WatermarkTracker;
