//! Domain module - Core lead sync entities
//!
//! This module contains the lead entities, the sync run types and the
//! source seam the engine pulls from.
//!
//! Modern Rust module organization (Rust 2018+ style):
//! - Each module is its own file in the domain/ directory
//! - Public exports are defined here for convenience

pub mod errors;
pub mod lead;
pub mod lead_source;
pub mod sync;

pub use errors::{SourceError, StorageError, SyncError};
pub use lead::{
    EntityId, EventKey, LeadEvent, LeadProjection, LeadRecord, MalformedLead, RawLead,
    ServiceClassification,
};
pub use lead_source::{LeadPage, LeadSource};
pub use sync::{JobStatus, PageStats, StopReason, SyncJobSnapshot, SyncMode, SyncSummary};
