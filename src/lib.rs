//! lead-sync - Incremental lead synchronization engine
//!
//! Pulls paginated lead records from the marketplace API into a local
//! append-only event log plus a per-lead current-state projection.

// Module declarations
pub mod application;
pub mod commands;
pub mod domain;
pub mod infrastructure;

#[cfg(test)]
pub(crate) mod test_utils;

pub use application::AppState;
pub use domain::{SyncMode, SyncSummary};
