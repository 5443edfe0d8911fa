//! Sync frontier derived from the projection table.
//!
//! The watermark is never stored; it is always `MAX(entity_id)` over
//! `lead_projections`, so it can only move once a batch has committed.

use sqlx::SqlitePool;

use crate::domain::errors::StorageError;
use crate::domain::lead::EntityId;
use crate::domain::lead_source::LeadPage;

#[derive(Clone)]
pub struct WatermarkTracker {
    pool: SqlitePool,
}

impl WatermarkTracker {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Highest durably ingested entity id, `None` before the first run.
    pub async fn current_watermark(&self) -> Result<Option<EntityId>, StorageError> {
        let max: Option<i64> = sqlx::query_scalar("SELECT MAX(entity_id) FROM lead_projections")
            .fetch_one(&self.pool)
            .await?;
        Ok(max.map(EntityId::new))
    }

    pub fn is_new(entity_id: EntityId, watermark: Option<EntityId>) -> bool {
        watermark.is_none_or(|w| entity_id > w)
    }

    /// Number of valid records on `page` above the watermark.
    pub fn count_new(page: &LeadPage, watermark: Option<EntityId>) -> usize {
        page.valid_records()
            .filter(|r| Self::is_new(r.entity_id, watermark))
            .count()
    }

    /// Early-stop predicate: false only when the page holds valid records and
    /// none of them is above the watermark. Without a watermark every record is new.
    pub fn page_has_new(page: &LeadPage, watermark: Option<EntityId>) -> bool {
        let Some(watermark) = watermark else {
            return true;
        };
        let mut valid = page.valid_records().peekable();
        valid.peek().is_none() || valid.any(|r| r.entity_id > watermark)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::{EventIngester, ProjectionUpdater};
    use crate::test_utils::{TestDatabase, descending_page, lead, malformed};
    use chrono::Utc;

    #[tokio::test]
    async fn test_watermark_is_max_projected_id() -> anyhow::Result<()> {
        let db = TestDatabase::new().await?;
        let tracker = WatermarkTracker::new(db.pool());
        assert_eq!(tracker.current_watermark().await?, None);

        let mut conn = db.pool().acquire().await?;
        for id in [5, 42, 17] {
            let record = lead(id, 100, Some("NEW"));
            EventIngester.ingest(&mut conn, &record, Utc::now()).await?;
            ProjectionUpdater.apply(&mut conn, &record, Utc::now()).await?;
        }
        drop(conn);

        assert_eq!(tracker.current_watermark().await?, Some(EntityId::new(42)));
        Ok(())
    }

    #[test]
    fn test_page_has_new() {
        let page = descending_page(2, 101, 200);
        assert!(WatermarkTracker::page_has_new(&page, None));
        assert!(!WatermarkTracker::page_has_new(&page, Some(EntityId::new(200))));
        assert!(WatermarkTracker::page_has_new(&page, Some(EntityId::new(199))));
        assert_eq!(WatermarkTracker::count_new(&page, Some(EntityId::new(150))), 50);
    }

    #[test]
    fn test_page_without_valid_records_is_not_a_stop_signal() {
        let page = LeadPage::new(1, vec![malformed("a"), malformed("b")]);
        assert_eq!(WatermarkTracker::count_new(&page, Some(EntityId::new(10))), 0);
        assert!(WatermarkTracker::page_has_new(&page, Some(EntityId::new(10))));
        assert!(WatermarkTracker::page_has_new(&page, None));
    }
}
