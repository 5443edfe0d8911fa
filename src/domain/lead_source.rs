//! Seam between the sync engine and the external lead marketplace.

use async_trait::async_trait;

use crate::domain::errors::SourceError;
use crate::domain::lead::{LeadRecord, MalformedLead};

/// One page as returned by the source, already mapped and validated per element.
#[derive(Debug, Clone, Default)]
pub struct LeadPage {
    pub page_number: u32,
    pub records: Vec<Result<LeadRecord, MalformedLead>>,
}

impl LeadPage {
    pub const fn new(page_number: u32, records: Vec<Result<LeadRecord, MalformedLead>>) -> Self {
        Self {
            page_number,
            records,
        }
    }

    /// An empty page is the only pagination termination signal the source gives.
    pub fn has_more(&self) -> bool {
        !self.records.is_empty()
    }

    pub fn valid_records(&self) -> impl Iterator<Item = &LeadRecord> {
        self.records.iter().filter_map(|r| r.as_ref().ok())
    }
}

/// Paginated pull interface; implementations are stateless across calls.
#[async_trait]
pub trait LeadSource: Send + Sync {
    /// Fetch one 1-based page.
    async fn fetch_page(&self, page_number: u32) -> Result<LeadPage, SourceError>;

    /// Fixed page size the source is queried with.
    fn page_size(&self) -> u32;
}
