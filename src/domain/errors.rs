//! Error taxonomy of the sync engine.
//!
//! Per-record problems (`MalformedLead`, `StorageError` on a single record)
//! are absorbed into run statistics; `SourceError` is retried at page level;
//! `SyncError` is what terminates a run.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SourceError {
    /// Transport failure, timeout, non-success status or undecodable page
    #[error("source unavailable while fetching page {page}: {reason}")]
    Unavailable { page: u32, reason: String },

    /// The session credential was rejected; retrying without a new one is pointless
    #[error("source authentication expired (HTTP {status}): refresh the session credential")]
    AuthExpired { status: u16 },
}

impl SourceError {
    pub fn unavailable(page: u32, reason: impl Into<String>) -> Self {
        Self::Unavailable {
            page,
            reason: reason.into(),
        }
    }

    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("stored row is inconsistent: {0}")]
    Corrupt(String),
}

#[derive(Error, Debug)]
pub enum SyncError {
    #[error(transparent)]
    AuthExpired(SourceError),

    #[error("giving up after {failures} consecutive page failures: {last}")]
    SourceUnavailable { failures: u32, last: SourceError },

    #[error("storage failure: {0}")]
    Storage(#[from] StorageError),
}

impl From<sqlx::Error> for SyncError {
    fn from(err: sqlx::Error) -> Self {
        Self::Storage(StorageError::Database(err))
    }
}
