use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::COLLECTION_NAME;
use crate::state::DEFAULT_SEEN_CAP;

/// Environment variables holding the X (Twitter) OAuth 1.0a credentials.
pub const ENV_API_KEY: &str = "TWITTER_API_KEY";
pub const ENV_API_SECRET: &str = "TWITTER_API_SECRET";
pub const ENV_ACCESS_TOKEN: &str = "TWITTER_ACCESS_TOKEN";
pub const ENV_ACCESS_TOKEN_SECRET: &str = "TWITTER_ACCESS_TOKEN_SECRET";
pub const ENV_BEARER_TOKEN: &str = "TWITTER_BEARER_TOKEN";

/// Largest page the activities endpoint serves.
pub const MAX_LIMIT: u32 = 100;

/// Top-level application config deserialized from the optional settings file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub settings: SettingsConfig,
}

/// Runtime settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettingsConfig {
    /// Marketplace collection symbol to watch.
    #[serde(default = "default_collection")]
    pub collection: String,
    /// Events requested per page.
    #[serde(default = "default_limit")]
    pub limit: u32,
    /// Activity type filter passed to the feed; an empty string fetches every kind.
    #[serde(default = "default_sale_type")]
    pub sale_type: Option<String>,
    /// Pages fetched per cycle while pages come back full.
    #[serde(default = "default_max_pages")]
    pub max_pages: u32,
    /// Pause between successful cycles.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    /// Pause after a cycle that failed.
    #[serde(default = "default_error_pause")]
    pub error_pause_secs: u64,
    /// Seen-set size above which it is cleared.
    #[serde(default = "default_seen_cap")]
    pub seen_cap: usize,
}

fn default_collection() -> String {
    COLLECTION_NAME.to_string()
}

fn default_limit() -> u32 {
    20
}

fn default_sale_type() -> Option<String> {
    Some("buyNow".to_string())
}

fn default_max_pages() -> u32 {
    1
}

fn default_poll_interval() -> u64 {
    30
}

fn default_error_pause() -> u64 {
    60
}

fn default_seen_cap() -> usize {
    DEFAULT_SEEN_CAP
}

impl Default for SettingsConfig {
    fn default() -> Self {
        Self {
            collection: default_collection(),
            limit: default_limit(),
            sale_type: default_sale_type(),
            max_pages: default_max_pages(),
            poll_interval_secs: default_poll_interval(),
            error_pause_secs: default_error_pause(),
            seen_cap: default_seen_cap(),
        }
    }
}

impl SettingsConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn error_pause(&self) -> Duration {
        Duration::from_secs(self.error_pause_secs)
    }

    fn validate(&self) -> Result<()> {
        if self.collection.trim().is_empty() {
            anyhow::bail!("settings.collection must not be empty");
        }
        if !(1..=MAX_LIMIT).contains(&self.limit) {
            anyhow::bail!("settings.limit must be between 1 and {MAX_LIMIT}");
        }
        if self.max_pages == 0 {
            anyhow::bail!("settings.max_pages must be at least 1");
        }
        if self.poll_interval_secs == 0 {
            anyhow::bail!("settings.poll_interval_secs must be at least 1");
        }
        if self.error_pause_secs == 0 {
            anyhow::bail!("settings.error_pause_secs must be at least 1");
        }
        Ok(())
    }
}

impl AppConfig {
    /// Load config from the given TOML file path.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::parse(&contents).with_context(|| format!("invalid config {}", path.display()))
    }

    /// Parse and validate config from TOML text.
    pub fn parse(contents: &str) -> Result<Self> {
        let config: Self = toml::from_str(contents).context("failed to parse TOML")?;
        config.settings.validate()?;
        Ok(config)
    }
}

/// OAuth 1.0a credentials for the posting account.
#[derive(Clone)]
pub struct Credentials {
    pub api_key: String,
    pub api_secret: String,
    pub access_token: String,
    pub access_token_secret: String,
    /// App-only token; accepted but not needed for user-context posting.
    pub bearer_token: Option<String>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &self.api_key)
            .field("api_secret", &"<redacted>")
            .field("access_token", &self.access_token)
            .field("access_token_secret", &"<redacted>")
            .field("bearer_token", &self.bearer_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl Credentials {
    /// Read credentials from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build credentials from any variable lookup. Blank values count as missing;
    /// the error lists every missing variable.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let api_key = get(ENV_API_KEY);
        let api_secret = get(ENV_API_SECRET);
        let access_token = get(ENV_ACCESS_TOKEN);
        let access_token_secret = get(ENV_ACCESS_TOKEN_SECRET);

        match (api_key, api_secret, access_token, access_token_secret) {
            (Some(api_key), Some(api_secret), Some(access_token), Some(access_token_secret)) => {
                Ok(Self {
                    api_key,
                    api_secret,
                    access_token,
                    access_token_secret,
                    bearer_token: get(ENV_BEARER_TOKEN),
                })
            }
            _ => {
                let missing: Vec<&str> = [
                    ENV_API_KEY,
                    ENV_API_SECRET,
                    ENV_ACCESS_TOKEN,
                    ENV_ACCESS_TOKEN_SECRET,
                ]
                .into_iter()
                .filter(|&name| get(name).is_none())
                .collect();
                anyhow::bail!("missing credentials: {}", missing.join(", "))
            }
        }
    }
}
