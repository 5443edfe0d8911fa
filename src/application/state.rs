//! Application state management
//!
//! This module defines the process-wide state handed to every command:
//! configuration, the database pool, the orchestrator and the handle of the
//! run currently in flight.

use std::sync::Arc;

use anyhow::Result;
use sqlx::SqlitePool;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::application::dto::StartResult;
use crate::application::job_tracker::JobTracker;
use crate::application::sync_orchestrator::{StartOutcome, SyncOrchestrator, SyncSettings};
use crate::domain::lead_source::LeadSource;
use crate::domain::sync::SyncMode;
use crate::infrastructure::config::AppConfig;
use crate::infrastructure::database_connection::DatabaseConnection;
use crate::infrastructure::lead_query_repository::LeadQueryRepository;
use crate::infrastructure::marketplace_client::MarketplaceClient;

/// Background run spawned by a trigger
struct RunHandle {
    handle: JoinHandle<()>,
    cancel: CancellationToken,
}

/// Global application state
pub struct AppState {
    /// Application configuration
    pub config: Arc<AppConfig>,
    pool: SqlitePool,
    orchestrator: Arc<SyncOrchestrator>,
    queries: LeadQueryRepository,
    current_run: Mutex<Option<RunHandle>>,
}

impl AppState {
    /// Connect the database, apply the schema and build the marketplace client.
    pub async fn initialize(config: AppConfig) -> Result<Self> {
        let db = DatabaseConnection::from_config(&config.database).await?;
        db.migrate().await?;
        let source = Arc::new(MarketplaceClient::from_source_config(&config.source)?);
        info!("✅ Application state initialized");
        Ok(Self::new(config, db.pool().clone(), source))
    }

    /// Create a new application state
    pub fn new(config: AppConfig, pool: SqlitePool, source: Arc<dyn LeadSource>) -> Self {
        let settings = SyncSettings::from_config(&config.sync);
        let orchestrator = Arc::new(SyncOrchestrator::new(
            pool.clone(),
            source,
            JobTracker::new(),
            settings,
        ));

        Self {
            config: Arc::new(config),
            queries: LeadQueryRepository::new(pool.clone()),
            pool,
            orchestrator,
            current_run: Mutex::new(None),
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn tracker(&self) -> &JobTracker {
        self.orchestrator.tracker()
    }

    pub fn queries(&self) -> &LeadQueryRepository {
        &self.queries
    }

    /// Trigger a run; an accepted run keeps its handle here.
    pub async fn start_sync(&self, mode: SyncMode) -> StartResult {
        let cancel = CancellationToken::new();
        match self.orchestrator.trigger(mode, cancel.clone()).await {
            StartOutcome::Accepted(handle) => {
                *self.current_run.lock().await = Some(RunHandle { handle, cancel });
                StartResult::Accepted
            }
            StartOutcome::AlreadyRunning => StartResult::AlreadyRunning,
            StartOutcome::Disabled => StartResult::Disabled,
        }
    }

    /// Ask the current run to stop at the next page or batch boundary.
    pub async fn cancel_sync(&self) -> bool {
        match self.current_run.lock().await.as_ref() {
            Some(run) if !run.handle.is_finished() => {
                info!("🛑 Cancellation requested for the running sync");
                run.cancel.cancel();
                true
            }
            _ => false,
        }
    }

    /// Wait for the current run, if any, to reach a terminal state.
    pub async fn wait_for_current_run(&self) -> Result<()> {
        let run = self.current_run.lock().await.take();
        if let Some(run) = run {
            run.handle.await?;
        }
        Ok(())
    }
}
