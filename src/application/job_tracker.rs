//! Process-wide sync job state
//!
//! A cloneable handle around a single `RwLock`ed record. The orchestrator is
//! the only writer; status queries take read locks and get a snapshot copy.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::domain::sync::{JobStatus, SyncJobSnapshot, SyncMode, SyncSummary};

#[derive(Debug, Clone)]
struct SyncJob {
    status: JobStatus,
    mode: Option<SyncMode>,
    processed: u64,
    total: u64,
    message: String,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
    last_summary: Option<SyncSummary>,
}

impl Default for SyncJob {
    fn default() -> Self {
        let idle = SyncJobSnapshot::default();
        Self {
            status: idle.status,
            mode: None,
            processed: 0,
            total: 0,
            message: idle.message,
            started_at: None,
            finished_at: None,
            last_summary: None,
        }
    }
}

#[derive(Clone, Default)]
pub struct JobTracker {
    job: Arc<RwLock<SyncJob>>,
}

impl JobTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check-and-set under one write lock. Returns false if a run is active.
    pub async fn start(&self, mode: SyncMode) -> bool {
        let mut job = self.job.write().await;
        if job.status.is_running() {
            warn!("⚠️ Sync already running, refusing {} trigger", mode);
            return false;
        }

        let last_summary = job.last_summary.take();
        *job = SyncJob {
            status: JobStatus::Running,
            mode: Some(mode),
            message: format!("Starting {} sync", mode),
            started_at: Some(Utc::now()),
            last_summary,
            ..SyncJob::default()
        };
        info!("🚀 Sync job started (mode: {})", mode);
        true
    }

    pub async fn update(&self, processed: u64, total: u64, message: impl Into<String>) {
        let mut job = self.job.write().await;
        if !job.status.is_running() {
            return;
        }
        job.processed = processed;
        job.total = total.max(processed);
        job.message = message.into();
    }

    pub async fn finish(&self, summary: SyncSummary, message: impl Into<String>) {
        let mut job = self.job.write().await;
        job.status = JobStatus::Completed;
        job.message = message.into();
        job.finished_at = Some(Utc::now());
        job.last_summary = Some(summary);
    }

    pub async fn fail(&self, message: impl Into<String>) {
        let mut job = self.job.write().await;
        job.status = JobStatus::Failed;
        job.message = message.into();
        job.finished_at = Some(Utc::now());
    }

    pub async fn is_running(&self) -> bool {
        self.job.read().await.status.is_running()
    }

    pub async fn status(&self) -> SyncJobSnapshot {
        let job = self.job.read().await.clone();
        let now = Utc::now();

        let eta_seconds = match (job.status, job.started_at) {
            (JobStatus::Running, Some(started)) => {
                let elapsed = (now - started).num_milliseconds().max(0) as f64 / 1000.0;
                estimate_remaining_seconds(elapsed, job.processed, job.total)
            }
            _ => 0,
        };
        let estimated_completion = (job.status.is_running() && eta_seconds > 0)
            .then(|| now + chrono::Duration::seconds(eta_seconds as i64));

        SyncJobSnapshot {
            status: job.status,
            running: job.status.is_running(),
            mode: job.mode,
            processed: job.processed,
            total: job.total,
            message: job.message,
            started_at: job.started_at,
            finished_at: job.finished_at,
            eta_seconds,
            estimated_completion,
            last_summary: job.last_summary,
        }
    }
}

/// `elapsed / processed * remaining`, 0 when nothing has been processed yet.
pub fn estimate_remaining_seconds(elapsed_seconds: f64, processed: u64, total: u64) -> u64 {
    if processed == 0 || total <= processed {
        return 0;
    }
    let per_record = elapsed_seconds / processed as f64;
    (per_record * (total - processed) as f64).round() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::sync::{PageStats, StopReason};
    use rstest::rstest;

    fn summary() -> SyncSummary {
        let now = Utc::now();
        SyncSummary {
            mode: SyncMode::Full,
            stop_reason: StopReason::SourceExhausted,
            pages_fetched: 1,
            totals: PageStats::default(),
            watermark_before: None,
            watermark_after: None,
            ordering_fallback: false,
            started_at: now,
            finished_at: now,
            duration_ms: 0,
        }
    }

    #[rstest]
    #[case(10.0, 0, 100, 0)]
    #[case(10.0, 50, 100, 10)]
    #[case(30.0, 25, 100, 90)]
    #[case(10.0, 100, 100, 0)]
    fn test_eta(#[case] elapsed: f64, #[case] processed: u64, #[case] total: u64, #[case] expected: u64) {
        assert_eq!(estimate_remaining_seconds(elapsed, processed, total), expected);
    }

    #[tokio::test]
    async fn test_second_start_is_refused_while_running() {
        let tracker = JobTracker::new();
        assert!(tracker.start(SyncMode::Full).await);
        tracker.update(10, 100, "page 1").await;

        assert!(!tracker.start(SyncMode::Incremental).await);
        let snapshot = tracker.status().await;
        assert!(snapshot.running);
        assert_eq!(snapshot.mode, Some(SyncMode::Full));
        assert_eq!(snapshot.processed, 10);
        assert_eq!(snapshot.message, "page 1");
    }

    #[tokio::test]
    async fn test_terminal_states_clear_running_and_allow_restart() {
        let tracker = JobTracker::new();
        assert_eq!(tracker.status().await.status, JobStatus::Idle);

        tracker.start(SyncMode::Full).await;
        tracker.fail("source authentication expired").await;
        let failed = tracker.status().await;
        assert_eq!(failed.status, JobStatus::Failed);
        assert!(!failed.running);
        assert_eq!(failed.eta_seconds, 0);

        assert!(tracker.start(SyncMode::Incremental).await);
        tracker.finish(summary(), "done").await;
        let done = tracker.status().await;
        assert_eq!(done.status, JobStatus::Completed);
        assert!(done.last_summary.is_some());
        assert!(done.finished_at.is_some());
    }

    #[tokio::test]
    async fn test_updates_after_finish_are_ignored() {
        let tracker = JobTracker::new();
        tracker.start(SyncMode::Full).await;
        tracker.finish(summary(), "done").await;
        tracker.update(999, 999, "late").await;
        assert_eq!(tracker.status().await.message, "done");
    }
}
