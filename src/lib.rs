pub mod api;
pub mod auth;
pub mod config;
pub mod engine;
pub mod reporter;
pub mod retry;
pub mod state;
pub mod twitter;
pub mod types;

#[cfg(test)]
mod test_support;

/// Collection watched when no settings file overrides it.
pub const COLLECTION_NAME: &str = "fukuhedrons";

/// Magic Eden ordinals activities endpoint (public, no auth required)
pub const ME_ACTIVITIES_URL: &str = "https://api-mainnet.magiceden.dev/v2/ordinals/activities";

/// Inscription viewer; the inscription id is appended as the last path segment.
pub const INSCRIPTION_VIEWER_BASE: &str = "https://ordinals.com/inscription";

/// X (Twitter) REST API base URL
pub const TWITTER_API_BASE: &str = "https://api.twitter.com";
