//! Data Transfer Objects for the sync interface
//!
//! Contains DTOs for data exchange between the application layer and the
//! command surface (HTTP front door / CLI).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::sync::{JobStatus, SyncJobSnapshot, SyncMode, SyncSummary};

// ============================================================================
// Trigger DTOs
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StartResult {
    Accepted,
    AlreadyRunning,
    Disabled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartSyncRequest {
    #[serde(default = "default_mode")]
    pub mode: SyncMode,
}

fn default_mode() -> SyncMode {
    SyncMode::Incremental
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartSyncResponse {
    pub result: StartResult,
    pub mode: SyncMode,
    pub message: String,
}

impl StartSyncResponse {
    pub fn new(result: StartResult, mode: SyncMode) -> Self {
        let message = match result {
            StartResult::Accepted => format!("{} sync started", mode),
            StartResult::AlreadyRunning => "A sync is already running".to_string(),
            StartResult::Disabled => "Sync is disabled by configuration".to_string(),
        };
        Self { result, mode, message }
    }
}

// ============================================================================
// Status DTOs
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncStatusResponse {
    pub running: bool,
    pub processed: u64,
    pub total: u64,
    pub message: String,
    pub eta_seconds: u64,
    pub status: JobStatus,
    pub mode: Option<SyncMode>,
    pub started_at: Option<DateTime<Utc>>,
    pub estimated_completion: Option<DateTime<Utc>>,
    pub last_summary: Option<SyncSummary>,
}

impl From<SyncJobSnapshot> for SyncStatusResponse {
    fn from(snapshot: SyncJobSnapshot) -> Self {
        Self {
            running: snapshot.running,
            processed: snapshot.processed,
            total: snapshot.total,
            message: snapshot.message,
            eta_seconds: snapshot.eta_seconds,
            status: snapshot.status,
            mode: snapshot.mode,
            started_at: snapshot.started_at,
            estimated_completion: snapshot.estimated_completion,
            last_summary: snapshot.last_summary,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_start_response_wire_shape() {
        let response = StartSyncResponse::new(StartResult::AlreadyRunning, SyncMode::Full);
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["result"], json!("already_running"));
        assert_eq!(value["mode"], json!("full"));
    }

    #[test]
    fn test_request_defaults_to_incremental() {
        let request: StartSyncRequest = serde_json::from_value(json!({})).unwrap();
        assert_eq!(request.mode, SyncMode::Incremental);
    }

    #[test]
    fn test_idle_status_response() {
        let status = SyncStatusResponse::from(SyncJobSnapshot::default());
        assert!(!status.running);
        assert_eq!(status.eta_seconds, 0);
        assert_eq!(status.status, JobStatus::Idle);
    }
}
