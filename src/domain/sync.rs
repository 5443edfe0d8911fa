//! Sync run types shared between the orchestrator, the job tracker and the
//! status interface exposed to the HTTP front door.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::lead::EntityId;

/// How far a run pages through the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    /// Page through the entire source regardless of the watermark
    Full,
    /// Stop once a page holds nothing newer than the watermark
    Incremental,
}

impl fmt::Display for SyncMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Full => write!(f, "full"),
            Self::Incremental => write!(f, "incremental"),
        }
    }
}

impl FromStr for SyncMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "full" => Ok(Self::Full),
            "incremental" | "incr" => Ok(Self::Incremental),
            other => Err(format!("unknown sync mode: {other}")),
        }
    }
}

/// Lifecycle of the process-wide sync job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Idle,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub const fn is_running(self) -> bool {
        matches!(self, Self::Running)
    }
}

/// Why a run stopped paging without a fatal error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The source returned an empty page
    SourceExhausted,
    /// Incremental early-stop: a page held nothing above the watermark
    WatermarkReached,
    /// The configured `max_pages` safety cap was hit
    PageCapReached,
    Cancelled,
}

/// Counters for a single fetched page.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageStats {
    pub records: u64,
    pub inserted: u64,
    pub duplicates: u64,
    pub projections_created: u64,
    pub projections_updated: u64,
    /// Older-than-current observations that left the projection untouched
    pub projections_stale: u64,
    /// Records above the watermark (every record when there is none)
    pub new_records: u64,
    pub malformed: u64,
    pub storage_errors: u64,
}

impl PageStats {
    pub const fn errors(&self) -> u64 {
        self.malformed + self.storage_errors
    }

    pub const fn processed(&self) -> u64 {
        self.inserted + self.duplicates
    }

    pub fn absorb(&mut self, other: &Self) {
        self.records += other.records;
        self.inserted += other.inserted;
        self.duplicates += other.duplicates;
        self.projections_created += other.projections_created;
        self.projections_updated += other.projections_updated;
        self.projections_stale += other.projections_stale;
        self.new_records += other.new_records;
        self.malformed += other.malformed;
        self.storage_errors += other.storage_errors;
    }
}

/// Final result of one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncSummary {
    pub mode: SyncMode,
    pub stop_reason: StopReason,
    pub pages_fetched: u32,
    pub totals: PageStats,
    pub watermark_before: Option<EntityId>,
    pub watermark_after: Option<EntityId>,
    /// Set when id ordering could not be confirmed and early stop was disabled
    pub ordering_fallback: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: u64,
}

impl SyncSummary {
    /// One-line human readable description used as the final job message.
    pub fn describe(&self) -> String {
        format!(
            "{} sync finished ({:?}): {} pages, {} inserted, {} duplicates, {} errors in {:.1}s",
            self.mode,
            self.stop_reason,
            self.pages_fetched,
            self.totals.inserted,
            self.totals.duplicates,
            self.totals.errors(),
            self.duration_ms as f64 / 1000.0
        )
    }
}

/// Read-only view of the job tracker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncJobSnapshot {
    pub status: JobStatus,
    pub running: bool,
    pub mode: Option<SyncMode>,
    pub processed: u64,
    pub total: u64,
    pub message: String,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub eta_seconds: u64,
    pub estimated_completion: Option<DateTime<Utc>>,
    pub last_summary: Option<SyncSummary>,
}

impl Default for SyncJobSnapshot {
    fn default() -> Self {
        Self {
            status: JobStatus::Idle,
            running: false,
            mode: None,
            processed: 0,
            total: 0,
            message: "No sync has run yet".to_string(),
            started_at: None,
            finished_at: None,
            eta_seconds: 0,
            estimated_completion: None,
            last_summary: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_mode_parses_case_insensitively() {
        assert_eq!("FULL".parse::<SyncMode>(), Ok(SyncMode::Full));
        assert_eq!(" incremental ".parse::<SyncMode>(), Ok(SyncMode::Incremental));
        assert!("weekly".parse::<SyncMode>().is_err());
    }

    #[test]
    fn page_stats_absorb_sums_every_counter() {
        let mut total = PageStats::default();
        let page = PageStats {
            records: 10,
            inserted: 7,
            duplicates: 2,
            malformed: 1,
            ..PageStats::default()
        };
        total.absorb(&page);
        total.absorb(&page);
        assert_eq!(total.records, 20);
        assert_eq!(total.processed(), 18);
        assert_eq!(total.errors(), 2);
    }
}
