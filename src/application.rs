//! Application layer module
//!
//! This module contains the job tracker, the sync orchestrator, the shared
//! application state and the data transfer objects the commands return.

pub mod dto;
pub mod job_tracker;
pub mod state;
pub mod sync_orchestrator;

pub use dto::{StartResult, StartSyncRequest, StartSyncResponse, SyncStatusResponse};
pub use job_tracker::JobTracker;
pub use state::AppState;
pub use sync_orchestrator::{StartOutcome, SyncOrchestrator, SyncSettings};
