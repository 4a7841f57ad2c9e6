use async_trait::async_trait;
use reqwest::header::ACCEPT;
use thiserror::Error;
use tracing::debug;

use crate::ME_ACTIVITIES_URL;
use crate::config::SettingsConfig;
use crate::retry::{Backoff, RateLimited, retry_rate_limited};
use crate::types::{SaleEvent, SalesResponse};

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("rate limited (HTTP 429)")]
    RateLimited,
    #[error("not found (HTTP 404), check the collection name")]
    NotFound,
    #[error("unexpected HTTP status {0}")]
    Status(u16),
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("malformed response: {0}")]
    Decode(#[from] serde_json::Error),
}

impl RateLimited for FetchError {
    fn is_rate_limited(&self) -> bool {
        matches!(self, FetchError::RateLimited)
    }
}

/// Map an HTTP status code to the fetch outcome it implies.
pub fn classify_status(status: u16) -> Result<(), FetchError> {
    match status {
        200..=299 => Ok(()),
        429 => Err(FetchError::RateLimited),
        404 => Err(FetchError::NotFound),
        other => Err(FetchError::Status(other)),
    }
}

/// Parameters for one page of the activities feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SalesQuery {
    pub collection: String,
    pub limit: u32,
    pub sale_type: Option<String>,
    pub offset: u32,
}

impl SalesQuery {
    /// First page for the configured collection.
    pub fn first_page(settings: &SettingsConfig) -> Self {
        Self {
            collection: settings.collection.clone(),
            limit: settings.limit,
            sale_type: settings.sale_type.clone().filter(|t| !t.is_empty()),
            offset: 0,
        }
    }

    pub fn next_page(&self) -> Self {
        Self {
            offset: self.offset + self.limit,
            ..self.clone()
        }
    }

    /// Query-string pairs in the order the endpoint documents them.
    pub fn params(&self) -> Vec<(&'static str, String)> {
        let mut params = Vec::with_capacity(4);
        if let Some(sale_type) = &self.sale_type {
            params.push(("type", sale_type.clone()));
        }
        params.push(("limit", self.limit.to_string()));
        params.push(("collectionName", self.collection.clone()));
        if self.offset > 0 {
            params.push(("offset", self.offset.to_string()));
        }
        params
    }
}

/// Anything that can serve pages of recent sales.
#[async_trait]
pub trait SalesSource: Send + Sync {
    async fn fetch_page(&self, query: &SalesQuery) -> Result<Vec<SaleEvent>, FetchError>;
}

/// HTTP client for the Magic Eden ordinals activities feed.
pub struct MarketplaceClient {
    http: reqwest::Client,
    url: String,
}

impl MarketplaceClient {
    pub fn new(http: reqwest::Client) -> Self {
        Self::with_url(http, ME_ACTIVITIES_URL)
    }

    pub fn with_url(http: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            http,
            url: url.into(),
        }
    }
}

#[async_trait]
impl SalesSource for MarketplaceClient {
    async fn fetch_page(&self, query: &SalesQuery) -> Result<Vec<SaleEvent>, FetchError> {
        let resp = self
            .http
            .get(&self.url)
            .header(ACCEPT, "application/json")
            .query(&query.params())
            .send()
            .await?;
        classify_status(resp.status().as_u16())?;
        let body = resp.text().await?;
        let events = serde_json::from_str::<SalesResponse>(&body)?.into_events();
        Ok(events)
    }
}

/// Fetch the most recent sales for the configured collection.
///
/// Each page is retried through the rate-limit backoff. A full page triggers the
/// next one until `max_pages` is reached. Any non-retryable failure fails the
/// whole fetch.
pub async fn fetch_recent_sales<S: SalesSource + ?Sized>(
    source: &S,
    backoff: &mut Backoff,
    settings: &SettingsConfig,
) -> Result<Vec<SaleEvent>, FetchError> {
    let mut all = Vec::new();
    let mut query = SalesQuery::first_page(settings);

    for page_no in 0..settings.max_pages {
        let page = {
            let q = &query;
            retry_rate_limited(backoff, "sales fetch", move || source.fetch_page(q)).await?
        };
        let count = page.len();
        all.extend(page);

        if count < query.limit as usize || page_no + 1 == settings.max_pages {
            break;
        }
        query = query.next_page();
    }

    debug!("Fetched {} sale event(s)", all.len());
    Ok(all)
}
