use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tracing::{debug, info};

use crate::TWITTER_API_BASE;
use crate::auth::{OAuthSigner, SignError};
use crate::config::Credentials;
use crate::retry::RateLimited;

#[derive(Debug, Error)]
pub enum PostError {
    #[error("rate limited (HTTP 429)")]
    RateLimited,
    #[error("rejected with HTTP {status}: {body}")]
    Rejected { status: u16, body: String },
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("malformed response: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("signing failed: {0}")]
    Sign(#[from] SignError),
}

impl RateLimited for PostError {
    fn is_rate_limited(&self) -> bool {
        matches!(self, PostError::RateLimited)
    }
}

/// Anything that can publish an alert. Returns the id of the created post, if
/// the destination assigns one.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, text: &str) -> Result<Option<String>, PostError>;
}

#[derive(Debug, Deserialize)]
struct VerifiedAccount {
    screen_name: String,
}

#[derive(Debug, Deserialize)]
struct CreatedPost {
    data: CreatedPostData,
}

#[derive(Debug, Deserialize)]
struct CreatedPostData {
    id: String,
}

/// Map a non-success status and its body to a `PostError`.
fn status_error(status: u16, body: String) -> PostError {
    if status == 429 {
        PostError::RateLimited
    } else {
        PostError::Rejected { status, body }
    }
}

/// User-context X API client.
pub struct TwitterClient {
    http: reqwest::Client,
    signer: OAuthSigner,
    base_url: String,
}

impl TwitterClient {
    pub fn new(http: reqwest::Client, credentials: Credentials) -> Self {
        Self::with_base_url(http, credentials, TWITTER_API_BASE)
    }

    pub fn with_base_url(
        http: reqwest::Client,
        credentials: Credentials,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            http,
            signer: OAuthSigner::new(credentials),
            base_url: base_url.into(),
        }
    }

    /// Check the credentials against the account endpoint, returning the screen name.
    pub async fn verify_credentials(&self) -> Result<String, PostError> {
        let url = format!("{}/1.1/account/verify_credentials.json", self.base_url);
        let auth = self.signer.authorization_header("GET", &url, &[])?;
        let resp = self.http.get(&url).header(AUTHORIZATION, auth).send().await?;
        let status = resp.status();
        let body = resp.text().await?;
        if !status.is_success() {
            return Err(status_error(status.as_u16(), body));
        }
        let account: VerifiedAccount = serde_json::from_str(&body)?;
        Ok(account.screen_name)
    }

    /// Create a post, returning its id.
    pub async fn post(&self, text: &str) -> Result<String, PostError> {
        let url = format!("{}/2/tweets", self.base_url);
        let auth = self.signer.authorization_header("POST", &url, &[])?;
        let resp = self
            .http
            .post(&url)
            .header(AUTHORIZATION, auth)
            .json(&json!({ "text": text }))
            .send()
            .await?;
        let status = resp.status();
        let body = resp.text().await?;
        if !status.is_success() {
            return Err(status_error(status.as_u16(), body));
        }
        let created: CreatedPost = serde_json::from_str(&body)?;
        debug!("Created post {}", created.data.id);
        Ok(created.data.id)
    }
}

#[async_trait]
impl Publisher for TwitterClient {
    async fn publish(&self, text: &str) -> Result<Option<String>, PostError> {
        self.post(text).await.map(Some)
    }
}

/// Writes alerts to the log instead of posting them.
pub struct LogPublisher;

#[async_trait]
impl Publisher for LogPublisher {
    async fn publish(&self, text: &str) -> Result<Option<String>, PostError> {
        info!("[dry-run] would post:\n{text}");
        Ok(None)
    }
}
