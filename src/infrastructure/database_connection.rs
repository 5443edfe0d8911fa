// Database connection and pool management
// This module handles SQLite database connections using sqlx

use std::str::FromStr;
use std::time::Duration;

use anyhow::Result;
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use tracing::info;

use crate::infrastructure::config::DatabaseConfig;

pub struct DatabaseConnection {
    pool: SqlitePool,
}

impl DatabaseConnection {
    pub async fn new(database_url: &str) -> Result<Self> {
        Self::with_max_connections(database_url, crate::infrastructure::config::defaults::DB_MAX_CONNECTIONS)
            .await
    }

    pub async fn from_config(config: &DatabaseConfig) -> Result<Self> {
        Self::with_max_connections(&config.url, config.max_connections).await
    }

    pub async fn with_max_connections(database_url: &str, max_connections: u32) -> Result<Self> {
        let in_memory = database_url.contains(":memory:") || database_url.contains("mode=memory");

        let mut options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5));

        if in_memory {
            // 메모리 DB는 연결마다 별도 DB가 되므로 단일 연결로 고정
            return Self::connect(options, 1).await;
        }

        // Create database file directory if it doesn't exist
        if let Some(parent) = options.get_filename().parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        options = options
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        Self::connect(options, max_connections).await
    }

    async fn connect(options: SqliteConnectOptions, max_connections: u32) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect_with(options)
            .await?;

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Creates the event log and projection tables. Safe to run repeatedly.
    pub async fn migrate(&self) -> Result<()> {
        let create_events_sql = r#"
            CREATE TABLE IF NOT EXISTS lead_events (
                event_key TEXT PRIMARY KEY,
                entity_id INTEGER NOT NULL,
                first_name TEXT,
                last_name TEXT,
                email TEXT,
                phone TEXT,
                status TEXT,
                vendor_id TEXT,
                service_id TEXT,
                service_name TEXT,
                category_id TEXT,
                category_name TEXT,
                sub_category_id TEXT,
                sub_category_name TEXT,
                rate_card_name TEXT,
                observed_at_ms INTEGER NOT NULL,
                ingested_at TEXT NOT NULL
            )
        "#;

        let create_projections_sql = r#"
            CREATE TABLE IF NOT EXISTS lead_projections (
                entity_id INTEGER PRIMARY KEY,
                latest_status TEXT,
                previous_status TEXT,
                first_name TEXT,
                last_name TEXT,
                email TEXT,
                phone TEXT,
                vendor_id TEXT,
                service_id TEXT,
                service_name TEXT,
                category_name TEXT,
                sub_category_name TEXT,
                rate_card_name TEXT,
                last_updated_ms INTEGER NOT NULL,
                event_count INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
        "#;

        let create_indexes_sql = [
            "CREATE INDEX IF NOT EXISTS idx_lead_events_entity_id ON lead_events (entity_id)",
            "CREATE INDEX IF NOT EXISTS idx_lead_events_status ON lead_events (status)",
            "CREATE INDEX IF NOT EXISTS idx_lead_events_service_name ON lead_events (service_name)",
            "CREATE INDEX IF NOT EXISTS idx_lead_projections_status ON lead_projections (latest_status)",
            "CREATE INDEX IF NOT EXISTS idx_lead_projections_service_name ON lead_projections (service_name)",
        ];

        sqlx::query(create_events_sql).execute(&self.pool).await?;
        sqlx::query(create_projections_sql).execute(&self.pool).await?;
        for sql in create_indexes_sql {
            sqlx::query(sql).execute(&self.pool).await?;
        }

        info!("✅ Database schema ready (lead_events, lead_projections)");
        Ok(())
    }
}
