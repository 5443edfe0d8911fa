//! Test utilities for lead-sync
//!
//! Provides common testing infrastructure: a throwaway SQLite database with the
//! schema applied, record builders, and a scripted in-process [`LeadSource`].

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};

use anyhow::Result;
use async_trait::async_trait;
use tempfile::TempDir;

use crate::domain::{EntityId, LeadPage, LeadRecord, LeadSource, MalformedLead, SourceError};
use crate::infrastructure::DatabaseConnection;

/// Test database configuration
pub struct TestDatabase {
    pub connection: DatabaseConnection,
    // Keeps the database file alive for the duration of the test
    _dir: TempDir,
}

impl TestDatabase {
    /// Create a fresh file-backed database in a temp directory
    pub async fn new() -> Result<Self> {
        let dir = tempfile::tempdir()?;
        let url = format!("sqlite:{}", dir.path().join("leads.db").display());
        let connection = DatabaseConnection::with_max_connections(&url, 4).await?;
        connection.migrate().await?;
        Ok(Self {
            connection,
            _dir: dir,
        })
    }

    /// Get the database pool for use in repositories
    pub fn pool(&self) -> sqlx::SqlitePool {
        self.connection.pool().clone()
    }
}

/// Valid record with the given id, observation time and status.
pub fn lead(id: i64, observed_at_ms: i64, status: Option<&str>) -> LeadRecord {
    LeadRecord {
        entity_id: EntityId::new(id),
        first_name: Some(format!("First{id}")),
        last_name: Some("Tester".to_string()),
        email: Some(format!("lead{id}@example.com")),
        phone: None,
        status: status.map(str::to_string),
        vendor_id: Some("77".to_string()),
        service: crate::domain::ServiceClassification {
            service_name: Some("Cleaning".to_string()),
            ..Default::default()
        },
        observed_at_ms,
    }
}

/// Page of valid records with ids `from..=to` in descending order.
pub fn descending_page(page_number: u32, from: i64, to: i64) -> LeadPage {
    let records = (from..=to)
        .rev()
        .map(|id| Ok(lead(id, 1_000 + id, Some("NEW"))))
        .collect();
    LeadPage::new(page_number, records)
}

pub fn malformed(raw_id: &str) -> Result<LeadRecord, MalformedLead> {
    Err(MalformedLead::new("submittedAt", "is missing", Some(raw_id.to_string())))
}

/// Scripted source: each fetch pops the next response, then serves empty pages.
pub struct ScriptedSource {
    responses: Mutex<VecDeque<Result<LeadPage, SourceError>>>,
    calls: AtomicU32,
    page_size: u32,
}

impl ScriptedSource {
    pub fn new(responses: Vec<Result<LeadPage, SourceError>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            calls: AtomicU32::new(0),
            page_size: 100,
        }
    }

    /// Serve the given pages in order, then an empty page.
    pub fn pages(pages: Vec<LeadPage>) -> Self {
        Self::new(pages.into_iter().map(Ok).collect())
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LeadSource for ScriptedSource {
    async fn fetch_page(&self, page_number: u32) -> Result<LeadPage, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self.responses.lock().expect("script lock").pop_front();
        match next {
            Some(Ok(mut page)) => {
                page.page_number = page_number;
                Ok(page)
            }
            Some(Err(err)) => Err(err),
            None => Ok(LeadPage::new(page_number, Vec::new())),
        }
    }

    fn page_size(&self) -> u32 {
        self.page_size
    }
}
