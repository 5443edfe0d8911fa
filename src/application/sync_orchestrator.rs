//! Sync orchestrator - pages through the lead source and applies every record
//!
//! 실행 흐름:
//! 1. read the watermark once
//! 2. fetch pages strictly in order (politeness delay, page-level retry)
//! 3. per record: ingest event + update projection inside one savepoint
//! 4. commit every `batch_size` records and at the end of each page
//! 5. stop on an empty page, the watermark (incremental), the page cap or cancellation

#![allow(clippy::uninlined_format_args)]

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use sqlx::{Connection, SqliteConnection, SqlitePool};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::application::job_tracker::JobTracker;
use crate::domain::errors::{SourceError, StorageError, SyncError};
use crate::domain::lead::{EntityId, LeadRecord};
use crate::domain::lead_source::{LeadPage, LeadSource};
use crate::domain::sync::{PageStats, StopReason, SyncMode, SyncSummary};
use crate::infrastructure::config::{OrderingPolicy, SyncConfig};
use crate::infrastructure::event_ingester::{EventIngester, IngestOutcome};
use crate::infrastructure::projection_updater::{ProjectionOutcome, ProjectionUpdater};
use crate::infrastructure::retry_policy::RetryPolicy;
use crate::infrastructure::watermark_tracker::WatermarkTracker;

/// Run-time knobs of the orchestrator, resolved from [`SyncConfig`].
#[derive(Debug, Clone)]
pub struct SyncSettings {
    pub enabled: bool,
    pub batch_size: usize,
    pub max_pages: u32,
    pub page_delay: Duration,
    pub ordering_policy: OrderingPolicy,
    pub retry: RetryPolicy,
}

impl SyncSettings {
    pub fn from_config(config: &SyncConfig) -> Self {
        Self {
            enabled: config.enabled,
            batch_size: config.batch_size.max(1),
            max_pages: config.max_pages,
            page_delay: config.page_delay(),
            ordering_policy: config.ordering_policy,
            retry: RetryPolicy::from_config(config),
        }
    }
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self::from_config(&SyncConfig::default())
    }
}

/// Result of a trigger attempt.
#[derive(Debug)]
pub enum StartOutcome {
    Accepted(JoinHandle<()>),
    AlreadyRunning,
    Disabled,
}

pub struct SyncOrchestrator {
    pool: SqlitePool,
    source: Arc<dyn LeadSource>,
    tracker: JobTracker,
    watermark: WatermarkTracker,
    ingester: EventIngester,
    updater: ProjectionUpdater,
    settings: SyncSettings,
}

/// Progress carried across pages of one run
struct RunProgress {
    totals: PageStats,
    fetched: u64,
}

impl SyncOrchestrator {
    pub fn new(
        pool: SqlitePool,
        source: Arc<dyn LeadSource>,
        tracker: JobTracker,
        settings: SyncSettings,
    ) -> Self {
        Self {
            watermark: WatermarkTracker::new(pool.clone()),
            pool,
            source,
            tracker,
            ingester: EventIngester,
            updater: ProjectionUpdater,
            settings,
        }
    }

    pub fn tracker(&self) -> &JobTracker {
        &self.tracker
    }

    pub fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    /// Claims the job slot and spawns the run in the background.
    pub async fn trigger(self: &Arc<Self>, mode: SyncMode, cancel: CancellationToken) -> StartOutcome {
        if !self.settings.enabled {
            info!("⏸️ Sync trigger ignored: sync is disabled by configuration");
            return StartOutcome::Disabled;
        }
        if !self.tracker.start(mode).await {
            return StartOutcome::AlreadyRunning;
        }

        let orchestrator = Arc::clone(self);
        let tracker = self.tracker.clone();
        let handle = tokio::spawn(async move {
            // 정상 종료/실패는 execute가 JobTracker에 기록함; 여기서는 패닉만 처리
            let run = tokio::spawn(async move { orchestrator.execute(mode, cancel).await });
            if let Err(join_error) = run.await {
                error!("💥 {} sync task aborted: {}", mode, join_error);
                tracker
                    .fail(format!("{} sync failed: task aborted ({})", mode, join_error))
                    .await;
            }
        });
        StartOutcome::Accepted(handle)
    }

    /// Runs one sync and records the terminal state in the job tracker.
    ///
    /// The caller must already hold the job slot via [`JobTracker::start`].
    pub async fn execute(&self, mode: SyncMode, cancel: CancellationToken) -> Result<SyncSummary, SyncError> {
        match self.run(mode, &cancel).await {
            Ok(summary) => {
                info!("✅ {}", summary.describe());
                self.tracker.finish(summary.clone(), summary.describe()).await;
                Ok(summary)
            }
            Err(err) => {
                error!("❌ {} sync aborted: {}", mode, err);
                self.tracker.fail(format!("{} sync failed: {}", mode, err)).await;
                Err(err)
            }
        }
    }

    /// The paging loop itself. Does not touch the job slot, only progress.
    pub async fn run(&self, mode: SyncMode, cancel: &CancellationToken) -> Result<SyncSummary, SyncError> {
        let started_at = Utc::now();
        let clock = Instant::now();

        let watermark_before = self.watermark.current_watermark().await?;
        let mut early_stop = mode == SyncMode::Incremental;
        let mut ordering_fallback = false;
        let mut last_seen: Option<EntityId> = None;
        let mut progress = RunProgress {
            totals: PageStats::default(),
            fetched: 0,
        };
        let mut pages_fetched = 0u32;
        let mut page_number = 1u32;

        info!(
            "🔄 Starting {} sync (watermark: {}, page size: {})",
            mode,
            watermark_before.map_or_else(|| "none".to_string(), |w| w.to_string()),
            self.source.page_size()
        );

        let stop_reason = loop {
            if cancel.is_cancelled() {
                break StopReason::Cancelled;
            }
            if page_number > self.settings.max_pages {
                warn!("⚠️ Page cap reached ({} pages), stopping", self.settings.max_pages);
                break StopReason::PageCapReached;
            }
            if page_number > 1 && !self.settings.page_delay.is_zero() {
                let cancelled = tokio::select! {
                    _ = tokio::time::sleep(self.settings.page_delay) => false,
                    _ = cancel.cancelled() => true,
                };
                if cancelled {
                    break StopReason::Cancelled;
                }
            }

            let Some(page) = self.fetch_with_retry(page_number, cancel).await? else {
                break StopReason::Cancelled;
            };
            pages_fetched += 1;

            if !page.has_more() {
                info!("🏁 Page {} is empty, source exhausted", page_number);
                break StopReason::SourceExhausted;
            }

            if self.settings.ordering_policy == OrderingPolicy::Verify && early_stop {
                if let Some((previous, next)) = find_ordering_violation(&page, last_seen) {
                    warn!(
                        "⚠️ Source ordering violated on page {} (id {} after {}); early stop disabled for this run",
                        page_number, next, previous
                    );
                    ordering_fallback = true;
                    early_stop = false;
                }
            }
            if let Some(last) = page.valid_records().last() {
                last_seen = Some(last.entity_id);
            }

            if early_stop && !WatermarkTracker::page_has_new(&page, watermark_before) {
                info!("🛑 Page {} holds nothing above the watermark, stopping", page_number);
                break StopReason::WatermarkReached;
            }

            progress.fetched += page.records.len() as u64;
            let (stats, cancelled) = self.apply_page(&page, watermark_before, &progress, cancel).await?;
            progress.totals.absorb(&stats);

            info!(
                page = page_number,
                inserted = stats.inserted,
                duplicates = stats.duplicates,
                errors = stats.errors(),
                "📄 Page {} applied",
                page_number
            );
            self.tracker
                .update(
                    progress.totals.processed(),
                    progress.fetched,
                    format!("Page {} done: {} records processed", page_number, progress.totals.processed()),
                )
                .await;

            if cancelled {
                break StopReason::Cancelled;
            }
            page_number += 1;
        };

        let watermark_after = self.watermark.current_watermark().await?;
        Ok(SyncSummary {
            mode,
            stop_reason,
            pages_fetched,
            totals: progress.totals,
            watermark_before,
            watermark_after,
            ordering_fallback,
            started_at,
            finished_at: Utc::now(),
            duration_ms: clock.elapsed().as_millis() as u64,
        })
    }

    /// `Ok(None)` means the run was cancelled while waiting to retry.
    async fn fetch_with_retry(
        &self,
        page_number: u32,
        cancel: &CancellationToken,
    ) -> Result<Option<LeadPage>, SyncError> {
        let retry = &self.settings.retry;
        let mut failures = 0u32;

        loop {
            let err = match self.source.fetch_page(page_number).await {
                Ok(page) => return Ok(Some(page)),
                Err(err @ SourceError::AuthExpired { .. }) => return Err(SyncError::AuthExpired(err)),
                Err(err) => err,
            };

            failures += 1;
            if !retry.should_retry(&err, failures) {
                return Err(SyncError::SourceUnavailable { failures, last: err });
            }

            let delay = retry.delay_for(failures);
            warn!(
                "🔄 Page {} failed ({}/{}): {} - retrying in {:?}",
                page_number, failures, retry.max_consecutive_failures, err, delay
            );
            let cancelled = tokio::select! {
                _ = tokio::time::sleep(delay) => false,
                _ = cancel.cancelled() => true,
            };
            if cancelled {
                return Ok(None);
            }
        }
    }

    /// Applies one page in batches. The flag is true when cancellation was
    /// observed at a batch boundary.
    async fn apply_page(
        &self,
        page: &LeadPage,
        watermark: Option<EntityId>,
        progress: &RunProgress,
        cancel: &CancellationToken,
    ) -> Result<(PageStats, bool), SyncError> {
        let mut stats = PageStats {
            records: page.records.len() as u64,
            ..PageStats::default()
        };
        let mut in_batch = 0usize;
        let mut tx = self.pool.begin().await.map_err(StorageError::from)?;

        for entry in &page.records {
            let record = match entry {
                Ok(record) => record,
                Err(malformed) => {
                    warn!("⚠️ Skipping record on page {}: {}", page.page_number, malformed);
                    stats.malformed += 1;
                    continue;
                }
            };

            if WatermarkTracker::is_new(record.entity_id, watermark) {
                stats.new_records += 1;
            }

            match self.apply_record(&mut tx, record).await {
                Ok((ingest, projection)) => {
                    match ingest {
                        IngestOutcome::Inserted => stats.inserted += 1,
                        IngestOutcome::Duplicate => stats.duplicates += 1,
                    }
                    match projection {
                        ProjectionOutcome::Created => stats.projections_created += 1,
                        ProjectionOutcome::Updated => stats.projections_updated += 1,
                        ProjectionOutcome::Stale => stats.projections_stale += 1,
                    }
                }
                Err(err) => {
                    warn!("⚠️ Failed to store entity {}: {}", record.entity_id, err);
                    stats.storage_errors += 1;
                }
            }

            in_batch += 1;
            if in_batch >= self.settings.batch_size {
                tx.commit().await.map_err(StorageError::from)?;
                debug!("💾 Batch committed ({} records) on page {}", in_batch, page.page_number);
                in_batch = 0;

                let processed = progress.totals.processed() + stats.processed();
                self.tracker
                    .update(
                        processed,
                        progress.fetched,
                        format!("Page {}: {} records processed", page.page_number, processed),
                    )
                    .await;

                if cancel.is_cancelled() {
                    return Ok((stats, true));
                }
                tx = self.pool.begin().await.map_err(StorageError::from)?;
            }
        }

        tx.commit().await.map_err(StorageError::from)?;
        if in_batch > 0 {
            debug!("💾 Batch committed ({} records) on page {}", in_batch, page.page_number);
        }
        Ok((stats, cancel.is_cancelled()))
    }

    /// Event insert + projection update for one record, all or nothing.
    async fn apply_record(
        &self,
        conn: &mut SqliteConnection,
        record: &LeadRecord,
    ) -> Result<(IngestOutcome, ProjectionOutcome), StorageError> {
        let mut savepoint = Connection::begin(conn).await?;
        let now = Utc::now();

        let outcome = match self.ingester.ingest(&mut savepoint, record, now).await {
            Ok(ingest) => self
                .updater
                .apply(&mut savepoint, record, now)
                .await
                .map(|projection| (ingest, projection)),
            Err(err) => Err(err),
        };

        match outcome {
            Ok(outcome) => {
                savepoint.commit().await?;
                Ok(outcome)
            }
            Err(err) => {
                savepoint.rollback().await?;
                Err(err)
            }
        }
    }
}

/// First place where ids increase, continuing from the previous page's last id.
fn find_ordering_violation(page: &LeadPage, last_seen: Option<EntityId>) -> Option<(EntityId, EntityId)> {
    let mut previous = last_seen;
    for record in page.valid_records() {
        if let Some(prev) = previous {
            if record.entity_id > prev {
                return Some((prev, record.entity_id));
            }
        }
        previous = Some(record.entity_id);
    }
    None
}
