//! Maintains `lead_projections`, the current state of every entity.
//!
//! The only writer of the projection table. Rules applied per record:
//! - first event of an entity creates the row
//! - an observation at least as new as `last_updated_ms` overwrites the fields
//! - `previous_status` moves only when the status actually changes
//! - `event_count` is recounted from `lead_events`, so replays never inflate it

use chrono::{DateTime, Utc};
use sqlx::{Row, SqliteConnection};
use tracing::debug;

use crate::domain::errors::StorageError;
use crate::domain::lead::LeadRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectionOutcome {
    Created,
    Updated,
    /// Older than the stored state; only the event count was refreshed
    Stale,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ProjectionUpdater;

impl ProjectionUpdater {
    pub async fn apply(
        &self,
        conn: &mut SqliteConnection,
        record: &LeadRecord,
        now: DateTime<Utc>,
    ) -> Result<ProjectionOutcome, StorageError> {
        let entity_id = record.entity_id.get();

        let event_count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM lead_events WHERE entity_id = ?")
                .bind(entity_id)
                .fetch_one(&mut *conn)
                .await?;

        let current = sqlx::query(
            "SELECT latest_status, previous_status, last_updated_ms FROM lead_projections WHERE entity_id = ?",
        )
        .bind(entity_id)
        .fetch_optional(&mut *conn)
        .await?;

        let Some(row) = current else {
            self.insert(conn, record, event_count, now).await?;
            debug!("🆕 Projection created for entity {}", entity_id);
            return Ok(ProjectionOutcome::Created);
        };

        let latest_status: Option<String> = row.try_get("latest_status")?;
        let previous_status: Option<String> = row.try_get("previous_status")?;
        let last_updated_ms: i64 = row.try_get("last_updated_ms")?;

        if record.observed_at_ms < last_updated_ms {
            sqlx::query("UPDATE lead_projections SET event_count = ? WHERE entity_id = ?")
                .bind(event_count)
                .bind(entity_id)
                .execute(&mut *conn)
                .await?;
            debug!(
                "⏪ Stale observation for entity {} ({} < {})",
                entity_id, record.observed_at_ms, last_updated_ms
            );
            return Ok(ProjectionOutcome::Stale);
        }

        let previous_status = if record.status != latest_status {
            latest_status
        } else {
            previous_status
        };

        let service = &record.service;
        sqlx::query(
            r#"
            UPDATE lead_projections SET
                latest_status = ?, previous_status = ?,
                first_name = ?, last_name = ?, email = ?, phone = ?, vendor_id = ?,
                service_id = ?, service_name = ?, category_name = ?,
                sub_category_name = ?, rate_card_name = ?,
                last_updated_ms = ?, event_count = ?, updated_at = ?
            WHERE entity_id = ?
            "#,
        )
        .bind(&record.status)
        .bind(&previous_status)
        .bind(&record.first_name)
        .bind(&record.last_name)
        .bind(&record.email)
        .bind(&record.phone)
        .bind(&record.vendor_id)
        .bind(&service.service_id)
        .bind(&service.service_name)
        .bind(&service.category_name)
        .bind(&service.sub_category_name)
        .bind(&service.rate_card_name)
        .bind(record.observed_at_ms)
        .bind(event_count)
        .bind(now)
        .bind(entity_id)
        .execute(&mut *conn)
        .await?;

        Ok(ProjectionOutcome::Updated)
    }

    async fn insert(
        &self,
        conn: &mut SqliteConnection,
        record: &LeadRecord,
        event_count: i64,
        now: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        let service = &record.service;
        sqlx::query(
            r#"
            INSERT INTO lead_projections (
                entity_id, latest_status, previous_status,
                first_name, last_name, email, phone, vendor_id,
                service_id, service_name, category_name, sub_category_name, rate_card_name,
                last_updated_ms, event_count, created_at, updated_at
            ) VALUES (?, ?, NULL, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(record.entity_id.get())
        .bind(&record.status)
        .bind(&record.first_name)
        .bind(&record.last_name)
        .bind(&record.email)
        .bind(&record.phone)
        .bind(&record.vendor_id)
        .bind(&service.service_id)
        .bind(&service.service_name)
        .bind(&service.category_name)
        .bind(&service.sub_category_name)
        .bind(&service.rate_card_name)
        .bind(record.observed_at_ms)
        .bind(event_count)
        .bind(now)
        .bind(now)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }
}
