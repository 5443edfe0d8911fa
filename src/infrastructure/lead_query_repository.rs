//! Read-only queries over the event log and projection table
//!
//! Used by the stats / filter commands and by export consumers. Nothing in
//! this module writes.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};

use crate::domain::errors::StorageError;
use crate::domain::lead::{EntityId, LeadEvent, LeadProjection, LeadRecord, ServiceClassification};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseStats {
    /// One projection row per customer
    pub unique_customers: i64,
    pub total_events: i64,
    pub watermark: Option<EntityId>,
    pub latest_observed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterOptions {
    pub statuses: Vec<String>,
    pub services: Vec<String>,
}

/// Optional status / service filters plus paging.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeadFilter {
    pub status: Option<String>,
    pub service: Option<String>,
    pub limit: u32,
    pub offset: u32,
}

impl Default for LeadFilter {
    fn default() -> Self {
        Self {
            status: None,
            service: None,
            limit: 100,
            offset: 0,
        }
    }
}

impl LeadFilter {
    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    pub fn with_service(mut self, service: impl Into<String>) -> Self {
        self.service = Some(service.into());
        self
    }
}

#[derive(Clone)]
pub struct LeadQueryRepository {
    pool: SqlitePool,
}

impl LeadQueryRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn database_stats(&self) -> Result<DatabaseStats, StorageError> {
        let unique_customers: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM lead_projections")
            .fetch_one(&self.pool)
            .await?;
        let total_events: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM lead_events")
            .fetch_one(&self.pool)
            .await?;
        let watermark: Option<i64> = sqlx::query_scalar("SELECT MAX(entity_id) FROM lead_projections")
            .fetch_one(&self.pool)
            .await?;
        let latest_ms: Option<i64> = sqlx::query_scalar("SELECT MAX(observed_at_ms) FROM lead_events")
            .fetch_one(&self.pool)
            .await?;

        Ok(DatabaseStats {
            unique_customers,
            total_events,
            watermark: watermark.map(EntityId::new),
            latest_observed_at: latest_ms.and_then(|ms| Utc.timestamp_millis_opt(ms).single()),
        })
    }

    /// Distinct non-null statuses and service names currently projected.
    pub async fn filter_options(&self) -> Result<FilterOptions, StorageError> {
        let statuses: Vec<String> = sqlx::query_scalar(
            "SELECT DISTINCT latest_status FROM lead_projections WHERE latest_status IS NOT NULL ORDER BY latest_status",
        )
        .fetch_all(&self.pool)
        .await?;
        let services: Vec<String> = sqlx::query_scalar(
            "SELECT DISTINCT service_name FROM lead_projections WHERE service_name IS NOT NULL ORDER BY service_name",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(FilterOptions { statuses, services })
    }

    /// Current state of each lead, most recently observed first.
    pub async fn list_projections(&self, filter: &LeadFilter) -> Result<Vec<LeadProjection>, StorageError> {
        let mut query = QueryBuilder::<Sqlite>::new(
            r#"SELECT entity_id, latest_status, previous_status, first_name, last_name, email, phone,
                   vendor_id, service_id, service_name, category_name, sub_category_name,
                   rate_card_name, last_updated_ms, event_count, created_at, updated_at
               FROM lead_projections WHERE 1 = 1"#,
        );
        if let Some(status) = &filter.status {
            query.push(" AND latest_status = ").push_bind(status.clone());
        }
        if let Some(service) = &filter.service {
            query.push(" AND service_name = ").push_bind(service.clone());
        }
        query
            .push(" ORDER BY last_updated_ms DESC, entity_id DESC LIMIT ")
            .push_bind(i64::from(filter.limit))
            .push(" OFFSET ")
            .push_bind(i64::from(filter.offset));

        let rows = query.build().fetch_all(&self.pool).await?;
        rows.iter().map(projection_from_row).collect()
    }

    /// Full event history, newest observation first.
    pub async fn list_events(&self, filter: &LeadFilter) -> Result<Vec<LeadEvent>, StorageError> {
        let mut query = QueryBuilder::<Sqlite>::new(
            r#"SELECT event_key, entity_id, first_name, last_name, email, phone, status, vendor_id,
                   service_id, service_name, category_id, category_name, sub_category_id,
                   sub_category_name, rate_card_name, observed_at_ms, ingested_at
               FROM lead_events WHERE 1 = 1"#,
        );
        if let Some(status) = &filter.status {
            query.push(" AND status = ").push_bind(status.clone());
        }
        if let Some(service) = &filter.service {
            query.push(" AND service_name = ").push_bind(service.clone());
        }
        query
            .push(" ORDER BY observed_at_ms DESC, entity_id DESC LIMIT ")
            .push_bind(i64::from(filter.limit))
            .push(" OFFSET ")
            .push_bind(i64::from(filter.offset));

        let rows = query.build().fetch_all(&self.pool).await?;
        rows.iter().map(event_from_row).collect()
    }
}

fn projection_from_row(row: &SqliteRow) -> Result<LeadProjection, StorageError> {
    Ok(LeadProjection {
        entity_id: EntityId::new(row.try_get("entity_id")?),
        latest_status: row.try_get("latest_status")?,
        previous_status: row.try_get("previous_status")?,
        first_name: row.try_get("first_name")?,
        last_name: row.try_get("last_name")?,
        email: row.try_get("email")?,
        phone: row.try_get("phone")?,
        vendor_id: row.try_get("vendor_id")?,
        service_id: row.try_get("service_id")?,
        service_name: row.try_get("service_name")?,
        category_name: row.try_get("category_name")?,
        sub_category_name: row.try_get("sub_category_name")?,
        rate_card_name: row.try_get("rate_card_name")?,
        last_updated_ms: row.try_get("last_updated_ms")?,
        event_count: row.try_get("event_count")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn event_from_row(row: &SqliteRow) -> Result<LeadEvent, StorageError> {
    let record = LeadRecord {
        entity_id: EntityId::new(row.try_get("entity_id")?),
        first_name: row.try_get("first_name")?,
        last_name: row.try_get("last_name")?,
        email: row.try_get("email")?,
        phone: row.try_get("phone")?,
        status: row.try_get("status")?,
        vendor_id: row.try_get("vendor_id")?,
        service: ServiceClassification {
            service_id: row.try_get("service_id")?,
            service_name: row.try_get("service_name")?,
            category_id: row.try_get("category_id")?,
            category_name: row.try_get("category_name")?,
            sub_category_id: row.try_get("sub_category_id")?,
            sub_category_name: row.try_get("sub_category_name")?,
            rate_card_name: row.try_get("rate_card_name")?,
        },
        observed_at_ms: row.try_get("observed_at_ms")?,
    };

    let stored_key: String = row.try_get("event_key")?;
    let event = LeadEvent::from_record(record, row.try_get("ingested_at")?);
    if event.event_key.as_str() != stored_key {
        return Err(StorageError::Corrupt(format!(
            "event key {stored_key} does not match entity {} at {}",
            event.record.entity_id, event.record.observed_at_ms
        )));
    }
    Ok(event)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::{EventIngester, ProjectionUpdater};
    use crate::test_utils::{TestDatabase, lead};

    async fn seed(db: &TestDatabase) -> anyhow::Result<()> {
        let mut conn = db.pool().acquire().await?;
        let mut records = vec![
            lead(1, 1_000, Some("NEW")),
            lead(1, 2_000, Some("HIRED")),
            lead(2, 1_500, Some("NEW")),
            lead(3, 1_200, None),
        ];
        records[2].service.service_name = Some("Moving".to_string());
        for record in &records {
            EventIngester.ingest(&mut conn, record, Utc::now()).await?;
            ProjectionUpdater.apply(&mut conn, record, Utc::now()).await?;
        }
        Ok(())
    }

    #[tokio::test]
    async fn test_database_stats() -> anyhow::Result<()> {
        let db = TestDatabase::new().await?;
        let repo = LeadQueryRepository::new(db.pool());

        let empty = repo.database_stats().await?;
        assert_eq!(empty.unique_customers, 0);
        assert_eq!(empty.watermark, None);

        seed(&db).await?;
        let stats = repo.database_stats().await?;
        assert_eq!(stats.unique_customers, 3);
        assert_eq!(stats.total_events, 4);
        assert_eq!(stats.watermark, Some(EntityId::new(3)));
        assert_eq!(stats.latest_observed_at.map(|t| t.timestamp_millis()), Some(2_000));
        Ok(())
    }

    #[tokio::test]
    async fn test_filter_options_skip_missing_values() -> anyhow::Result<()> {
        let db = TestDatabase::new().await?;
        seed(&db).await?;
        let options = LeadQueryRepository::new(db.pool()).filter_options().await?;
        assert_eq!(options.statuses, vec!["HIRED", "NEW"]);
        assert_eq!(options.services, vec!["Cleaning", "Moving"]);
        Ok(())
    }

    #[tokio::test]
    async fn test_list_projections_and_events_with_filters() -> anyhow::Result<()> {
        let db = TestDatabase::new().await?;
        seed(&db).await?;
        let repo = LeadQueryRepository::new(db.pool());

        let all = repo.list_projections(&LeadFilter::default()).await?;
        let ids: Vec<i64> = all.iter().map(|p| p.entity_id.get()).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(all[0].previous_status.as_deref(), Some("NEW"));

        let moving = repo
            .list_projections(&LeadFilter::default().with_service("Moving"))
            .await?;
        assert_eq!(moving.len(), 1);
        assert_eq!(moving[0].entity_id, EntityId::new(2));

        let new_events = repo.list_events(&LeadFilter::default().with_status("NEW")).await?;
        assert_eq!(new_events.len(), 2);
        assert_eq!(new_events[0].record.entity_id, EntityId::new(2));
        assert_eq!(new_events[0].event_key, new_events[0].record.event_key());
        Ok(())
    }
}
