//! Append-only writer for `lead_events`.

use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;

use crate::domain::errors::StorageError;
use crate::domain::lead::LeadRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    Inserted,
    /// The event key was already stored; nothing was written
    Duplicate,
}

/// Inserts events keyed by [`EventKey`](crate::domain::EventKey), never overwriting.
///
/// Works on a borrowed connection so the caller decides the transaction
/// boundary (the orchestrator runs it inside a per-record savepoint).
#[derive(Debug, Clone, Copy, Default)]
pub struct EventIngester;

impl EventIngester {
    pub async fn ingest(
        &self,
        conn: &mut SqliteConnection,
        record: &LeadRecord,
        ingested_at: DateTime<Utc>,
    ) -> Result<IngestOutcome, StorageError> {
        let event_key = record.event_key();
        let service = &record.service;

        let result = sqlx::query(
            r#"
            INSERT INTO lead_events (
                event_key, entity_id, first_name, last_name, email, phone, status, vendor_id,
                service_id, service_name, category_id, category_name,
                sub_category_id, sub_category_name, rate_card_name,
                observed_at_ms, ingested_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(event_key) DO NOTHING
            "#,
        )
        .bind(event_key.as_str())
        .bind(record.entity_id.get())
        .bind(&record.first_name)
        .bind(&record.last_name)
        .bind(&record.email)
        .bind(&record.phone)
        .bind(&record.status)
        .bind(&record.vendor_id)
        .bind(&service.service_id)
        .bind(&service.service_name)
        .bind(&service.category_id)
        .bind(&service.category_name)
        .bind(&service.sub_category_id)
        .bind(&service.sub_category_name)
        .bind(&service.rate_card_name)
        .bind(record.observed_at_ms)
        .bind(ingested_at)
        .execute(&mut *conn)
        .await?;

        Ok(if result.rows_affected() == 0 {
            IngestOutcome::Duplicate
        } else {
            IngestOutcome::Inserted
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{TestDatabase, lead};

    #[tokio::test]
    async fn test_same_record_twice_is_duplicate() -> anyhow::Result<()> {
        let db = TestDatabase::new().await?;
        let mut conn = db.pool().acquire().await?;
        let record = lead(10, 5_000, Some("NEW"));

        let first = EventIngester.ingest(&mut conn, &record, Utc::now()).await?;
        let second = EventIngester.ingest(&mut conn, &record, Utc::now()).await?;
        assert_eq!(first, IngestOutcome::Inserted);
        assert_eq!(second, IngestOutcome::Duplicate);

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM lead_events")
            .fetch_one(&mut *conn)
            .await?;
        assert_eq!(count, 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_new_observation_of_same_entity_is_inserted() -> anyhow::Result<()> {
        let db = TestDatabase::new().await?;
        let mut conn = db.pool().acquire().await?;

        EventIngester.ingest(&mut conn, &lead(10, 5_000, Some("NEW")), Utc::now()).await?;
        let outcome = EventIngester
            .ingest(&mut conn, &lead(10, 6_000, Some("CONTACTED")), Utc::now())
            .await?;
        assert_eq!(outcome, IngestOutcome::Inserted);

        let status: Option<String> = sqlx::query_scalar(
            "SELECT status FROM lead_events WHERE entity_id = 10 ORDER BY observed_at_ms DESC LIMIT 1",
        )
        .fetch_one(&mut *conn)
        .await?;
        assert_eq!(status.as_deref(), Some("CONTACTED"));
        Ok(())
    }
}
