//! HTTP client for the lead marketplace list endpoint
//!
//! Implements [`LeadSource`] on top of reqwest. Each page is a form POST
//! authenticated with the session cookie; elements of the returned array are
//! decoded one by one so a single bad lead never fails the page.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{ACCEPT, COOKIE, HeaderMap, HeaderValue, ORIGIN, REFERER};
use reqwest::{Client, ClientBuilder, StatusCode};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::domain::errors::SourceError;
use crate::domain::lead::{LeadRecord, MalformedLead, RawLead};
use crate::domain::lead_source::{LeadPage, LeadSource};
use crate::infrastructure::config::SourceConfig;

/// Configuration for the marketplace client
#[derive(Debug, Clone)]
pub struct MarketplaceClientConfig {
    /// Full list endpoint, base url joined with the list path
    pub endpoint: String,
    pub cookie_name: String,
    pub auth_cookie: String,
    pub page_size: u32,
    /// Request timeout in seconds
    pub timeout_seconds: u64,
    /// Extra attempts on transport/5xx failures, without delay
    pub immediate_retries: u32,
    pub user_agent: String,
    pub origin: Option<String>,
    pub referer: Option<String>,
}

impl MarketplaceClientConfig {
    /// Create MarketplaceClientConfig from SourceConfig
    pub fn from_source_config(source: &SourceConfig) -> Self {
        Self {
            endpoint: join_url(&source.base_url, &source.list_path),
            cookie_name: source.cookie_name.clone(),
            auth_cookie: source.auth_cookie.clone(),
            page_size: source.page_size,
            timeout_seconds: source.request_timeout_seconds,
            immediate_retries: source.immediate_retries,
            user_agent: source.user_agent.clone(),
            origin: source.origin.clone(),
            referer: source.referer.clone(),
        }
    }
}

impl Default for MarketplaceClientConfig {
    fn default() -> Self {
        Self::from_source_config(&SourceConfig::default())
    }
}

pub struct MarketplaceClient {
    client: Client,
    config: MarketplaceClientConfig,
}

impl MarketplaceClient {
    pub fn new(config: MarketplaceClientConfig) -> Result<Self, SourceError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json, text/plain, */*"));
        if let Some(origin) = config.origin.as_deref().and_then(|v| HeaderValue::from_str(v).ok()) {
            headers.insert(ORIGIN, origin);
        }
        if let Some(referer) = config.referer.as_deref().and_then(|v| HeaderValue::from_str(v).ok()) {
            headers.insert(REFERER, referer);
        }

        let client = ClientBuilder::new()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .user_agent(&config.user_agent)
            .default_headers(headers)
            .gzip(true)
            .build()
            .map_err(|e| SourceError::unavailable(0, format!("failed to build HTTP client: {e}")))?;

        info!("🌐 Marketplace client ready: {}", config.endpoint);
        Ok(Self { client, config })
    }

    pub fn from_source_config(source: &SourceConfig) -> Result<Self, SourceError> {
        Self::new(MarketplaceClientConfig::from_source_config(source))
    }

    async fn fetch_once(&self, page_number: u32) -> Result<LeadPage, SourceError> {
        let form = [
            ("pageNumber", page_number.to_string()),
            ("pageSize", self.config.page_size.to_string()),
        ];

        let response = self
            .client
            .post(&self.config.endpoint)
            .header(COOKIE, format!("{}={}", self.config.cookie_name, self.config.auth_cookie))
            .form(&form)
            .send()
            .await
            .map_err(|e| SourceError::unavailable(page_number, describe_transport_error(&e)))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(SourceError::AuthExpired {
                status: status.as_u16(),
            });
        }
        if !status.is_success() {
            return Err(SourceError::unavailable(page_number, format!("HTTP {status}")));
        }

        let body = response
            .text()
            .await
            .map_err(|e| SourceError::unavailable(page_number, describe_transport_error(&e)))?;
        let payload: Value = serde_json::from_str(&body)
            .map_err(|e| SourceError::unavailable(page_number, format!("invalid JSON body: {e}")))?;

        parse_page(page_number, &payload)
    }
}

#[async_trait]
impl LeadSource for MarketplaceClient {
    async fn fetch_page(&self, page_number: u32) -> Result<LeadPage, SourceError> {
        let mut attempt = 0;
        loop {
            match self.fetch_once(page_number).await {
                Ok(page) => {
                    debug!("📄 Page {} fetched: {} elements", page_number, page.records.len());
                    return Ok(page);
                }
                Err(err) if err.is_retryable() && attempt < self.config.immediate_retries => {
                    attempt += 1;
                    warn!("🔄 Page {} fetch failed ({}), immediate retry {}", page_number, err, attempt);
                }
                Err(err) => return Err(err),
            }
        }
    }

    fn page_size(&self) -> u32 {
        self.config.page_size
    }
}

/// Maps the `{ "data": { "data": [...] } }` envelope into a page.
///
/// A missing envelope means the source has nothing more to give.
pub fn parse_page(page_number: u32, payload: &Value) -> Result<LeadPage, SourceError> {
    let items = match payload.get("data").and_then(|d| d.get("data")) {
        None | Some(Value::Null) => return Ok(LeadPage::new(page_number, Vec::new())),
        Some(Value::Array(items)) => items,
        Some(other) => {
            return Err(SourceError::unavailable(
                page_number,
                format!("expected an array of leads, got {}", json_type(other)),
            ));
        }
    };

    let records = items.iter().map(decode_lead).collect();
    Ok(LeadPage::new(page_number, records))
}

fn decode_lead(value: &Value) -> Result<LeadRecord, MalformedLead> {
    let raw: RawLead =
        serde_json::from_value(value.clone()).map_err(|e| MalformedLead::undecodable(value, &e))?;
    LeadRecord::try_from(raw)
}

fn join_url(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}

fn describe_transport_error(err: &reqwest::Error) -> String {
    if err.is_timeout() {
        format!("request timed out: {err}")
    } else if err.is_connect() {
        format!("connection failed: {err}")
    } else {
        err.to_string()
    }
}

const fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
