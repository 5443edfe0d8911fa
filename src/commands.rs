//! Command surface for the HTTP front door and the CLI
//!
//! Every command takes the shared [`AppState`] and returns a serde-serializable
//! response. Errors are flattened to strings at this edge.

use tracing::{error, info};

use crate::application::AppState;
use crate::application::dto::{StartSyncResponse, SyncStatusResponse};
use crate::domain::lead::{LeadEvent, LeadProjection};
use crate::domain::sync::SyncMode;
use crate::infrastructure::lead_query_repository::{DatabaseStats, FilterOptions, LeadFilter};

/// Trigger a sync run; never blocks on the run itself.
pub async fn start_sync(state: &AppState, mode: SyncMode) -> StartSyncResponse {
    let result = state.start_sync(mode).await;
    info!("📥 start_sync({}) -> {:?}", mode, result);
    StartSyncResponse::new(result, mode)
}

pub async fn get_sync_status(state: &AppState) -> SyncStatusResponse {
    state.tracker().status().await.into()
}

/// Request cooperative cancellation of the running sync.
pub async fn cancel_sync(state: &AppState) -> bool {
    state.cancel_sync().await
}

pub async fn get_database_stats(state: &AppState) -> Result<DatabaseStats, String> {
    state.queries().database_stats().await.map_err(|e| {
        error!("Failed to load database stats: {}", e);
        format!("Failed to load database stats: {e}")
    })
}

pub async fn get_filter_options(state: &AppState) -> Result<FilterOptions, String> {
    state
        .queries()
        .filter_options()
        .await
        .map_err(|e| format!("Failed to load filter options: {e}"))
}

pub async fn list_leads(state: &AppState, filter: LeadFilter) -> Result<Vec<LeadProjection>, String> {
    state
        .queries()
        .list_projections(&filter)
        .await
        .map_err(|e| format!("Failed to list leads: {e}"))
}

pub async fn list_lead_events(state: &AppState, filter: LeadFilter) -> Result<Vec<LeadEvent>, String> {
    state
        .queries()
        .list_events(&filter)
        .await
        .map_err(|e| format!("Failed to list lead events: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::application::dto::StartResult;
    use crate::infrastructure::config::AppConfig;
    use crate::test_utils::{ScriptedSource, TestDatabase, descending_page};

    #[tokio::test]
    async fn test_sync_then_query_through_commands() -> anyhow::Result<()> {
        let db = TestDatabase::new().await?;
        let mut config = AppConfig::default();
        config.sync.page_delay_ms = 0;
        let source = Arc::new(ScriptedSource::pages(vec![
            descending_page(1, 11, 20),
            descending_page(2, 1, 10),
        ]));
        let state = AppState::new(config, db.pool(), source);

        let response = start_sync(&state, SyncMode::Full).await;
        assert_eq!(response.result, StartResult::Accepted);
        state.wait_for_current_run().await?;

        let status = get_sync_status(&state).await;
        assert!(!status.running);
        assert_eq!(status.processed, 20);
        assert_eq!(status.total, 20);

        let stats = get_database_stats(&state).await.map_err(anyhow::Error::msg)?;
        assert_eq!(stats.unique_customers, 20);
        assert_eq!(stats.watermark.map(|w| w.get()), Some(20));

        let options = get_filter_options(&state).await.map_err(anyhow::Error::msg)?;
        assert_eq!(options.statuses, vec!["NEW"]);

        let leads = list_leads(&state, LeadFilter { limit: 5, ..LeadFilter::default() })
            .await
            .map_err(anyhow::Error::msg)?;
        assert_eq!(leads.len(), 5);
        assert_eq!(leads[0].entity_id.get(), 20);

        let events = list_lead_events(&state, LeadFilter::default().with_status("NEW"))
            .await
            .map_err(anyhow::Error::msg)?;
        assert_eq!(events.len(), 20);
        Ok(())
    }
}
