//! End-to-end sync runs against a mocked marketplace API.

use std::ops::RangeInclusive;
use std::sync::Arc;

use lead_sync_lib::application::{AppState, StartResult};
use lead_sync_lib::commands;
use lead_sync_lib::domain::{JobStatus, StopReason, SyncMode};
use lead_sync_lib::infrastructure::{AppConfig, DatabaseConnection, LeadFilter, MarketplaceClient};
use serde_json::{Value, json};
use tempfile::TempDir;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const LIST_PATH: &str = "/dapi/marketplace/order-leads/list";

/// Newest-first page body holding the given ids.
fn leads(ids: RangeInclusive<i64>) -> Value {
    let items: Vec<Value> = ids
        .rev()
        .map(|id| {
            json!({
                "customerId": id,
                "firstName": format!("Lead {id}"),
                "email": format!("lead{id}@example.com"),
                "status": "NEW",
                "vendorId": "V-1",
                "submittedAt": 1_700_000_000_000_i64 + id,
                "services": {
                    "serviceId": 3,
                    "serviceName": "Home Cleaning",
                    "categoryName": "Cleaning"
                }
            })
        })
        .collect();
    json!({ "data": { "data": items } })
}

fn empty() -> Value {
    json!({ "data": { "data": [] } })
}

async fn mount_page(server: &MockServer, page: u32, body: Value, expected_calls: Option<u64>) {
    let mock = Mock::given(method("POST"))
        .and(path(LIST_PATH))
        .and(body_string_contains(format!("pageNumber={page}&")))
        .respond_with(ResponseTemplate::new(200).set_body_json(body));
    let mock = match expected_calls {
        Some(n) => mock.expect(n),
        None => mock,
    };
    mock.mount(server).await;
}

async fn state_for(server: &MockServer, dir: &TempDir) -> anyhow::Result<AppState> {
    let mut config = AppConfig::default();
    config.database.url = format!("sqlite:{}", dir.path().join("leads.db").display());
    config.source.base_url = server.uri();
    config.source.auth_cookie = "test-session".to_string();
    config.source.immediate_retries = 0;
    config.sync.page_delay_ms = 0;
    config.sync.retry_base_delay_ms = 0;
    config.sync.retry_max_delay_ms = 0;
    config.validate()?;

    let db = DatabaseConnection::from_config(&config.database).await?;
    db.migrate().await?;
    let source = Arc::new(MarketplaceClient::from_source_config(&config.source)?);
    Ok(AppState::new(config, db.pool().clone(), source))
}

async fn sync_to_completion(state: &AppState, mode: SyncMode) -> anyhow::Result<()> {
    let response = commands::start_sync(state, mode).await;
    assert_eq!(response.result, StartResult::Accepted);
    state.wait_for_current_run().await
}

#[tokio::test]
async fn incremental_run_stops_at_watermark_after_full_run() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let server = MockServer::start().await;
    mount_page(&server, 1, leads(101..=200), None).await;
    mount_page(&server, 2, leads(1..=100), None).await;
    mount_page(&server, 3, empty(), None).await;

    let state = state_for(&server, &dir).await?;
    sync_to_completion(&state, SyncMode::Full).await?;

    let stats = commands::get_database_stats(&state).await.map_err(anyhow::Error::msg)?;
    assert_eq!(stats.unique_customers, 200);
    assert_eq!(stats.watermark.map(|w| w.get()), Some(200));

    // 250 leads now, newest first; page 3 must never be requested
    server.reset().await;
    mount_page(&server, 1, leads(201..=250), Some(1)).await;
    mount_page(&server, 2, leads(101..=200), Some(1)).await;
    mount_page(&server, 3, leads(1..=100), Some(0)).await;

    sync_to_completion(&state, SyncMode::Incremental).await?;

    let status = commands::get_sync_status(&state).await;
    assert_eq!(status.status, JobStatus::Completed);
    assert_eq!(status.processed, 50);
    let summary = status.last_summary.expect("summary recorded");
    assert_eq!(summary.stop_reason, StopReason::WatermarkReached);
    assert_eq!(summary.totals.inserted, 50);
    assert_eq!(summary.watermark_after.map(|w| w.get()), Some(250));

    let stats = commands::get_database_stats(&state).await.map_err(anyhow::Error::msg)?;
    assert_eq!(stats.unique_customers, 250);
    assert_eq!(stats.total_events, 250);
    server.verify().await;
    Ok(())
}

#[tokio::test]
async fn repeated_full_runs_do_not_duplicate_events() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let server = MockServer::start().await;
    mount_page(&server, 1, leads(41..=80), None).await;
    mount_page(&server, 2, leads(1..=40), None).await;
    mount_page(&server, 3, empty(), None).await;

    let state = state_for(&server, &dir).await?;
    sync_to_completion(&state, SyncMode::Full).await?;
    let before = commands::list_leads(&state, LeadFilter::default())
        .await
        .map_err(anyhow::Error::msg)?;

    sync_to_completion(&state, SyncMode::Full).await?;
    let after = commands::list_leads(&state, LeadFilter::default())
        .await
        .map_err(anyhow::Error::msg)?;

    let summary = commands::get_sync_status(&state).await.last_summary.expect("summary");
    assert_eq!(summary.totals.inserted, 0);
    assert_eq!(summary.totals.duplicates, 80);

    let stats = commands::get_database_stats(&state).await.map_err(anyhow::Error::msg)?;
    assert_eq!(stats.total_events, 80);
    let strip = |rows: &[lead_sync_lib::domain::LeadProjection]| {
        rows.iter()
            .map(|p| (p.entity_id, p.latest_status.clone(), p.previous_status.clone(), p.event_count))
            .collect::<Vec<_>>()
    };
    assert_eq!(strip(&before), strip(&after));

    let options = commands::get_filter_options(&state).await.map_err(anyhow::Error::msg)?;
    assert_eq!(options.services, vec!["Home Cleaning"]);
    Ok(())
}

#[tokio::test]
async fn expired_session_fails_the_job_with_readable_message() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(LIST_PATH))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;

    let state = state_for(&server, &dir).await?;
    sync_to_completion(&state, SyncMode::Incremental).await?;

    let status = commands::get_sync_status(&state).await;
    assert_eq!(status.status, JobStatus::Failed);
    assert!(!status.running);
    assert!(status.message.contains("authentication expired"), "{}", status.message);
    Ok(())
}

#[tokio::test]
async fn persistent_server_errors_abort_after_threshold() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(LIST_PATH))
        .respond_with(ResponseTemplate::new(502))
        .expect(3)
        .mount(&server)
        .await;

    let state = state_for(&server, &dir).await?;
    sync_to_completion(&state, SyncMode::Full).await?;

    let status = commands::get_sync_status(&state).await;
    assert_eq!(status.status, JobStatus::Failed);
    assert!(status.message.contains("3 consecutive page failures"), "{}", status.message);
    Ok(())
}
