use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info, warn};

use ordinals_sales_bot::api::MarketplaceClient;
use ordinals_sales_bot::config::{AppConfig, Credentials};
use ordinals_sales_bot::engine::SalesBot;
use ordinals_sales_bot::retry::{Backoff, retry_rate_limited};
use ordinals_sales_bot::twitter::{LogPublisher, TwitterClient};

#[derive(Parser)]
#[command(name = "sales-bot", about = "Posts new ordinals collection sales to X")]
struct Args {
    /// Optional TOML settings file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log alerts instead of posting them (no credentials needed)
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    if dotenvy::dotenv().is_ok() {
        info!("Loaded environment from .env");
    }

    let config = match &args.config {
        Some(path) => {
            let config = AppConfig::load(path)?;
            info!("Loaded config from {}", path.display());
            config
        }
        None => AppConfig::default(),
    };
    let settings = config.settings;

    let http = reqwest::Client::new();
    let source = MarketplaceClient::new(http.clone());

    let mode = if args.dry_run { "dry-run" } else { "live" };
    info!(
        "Starting sales bot ({mode}): collection={} limit={} type={} pages={} poll={}s",
        settings.collection,
        settings.limit,
        settings.sale_type.as_deref().filter(|t| !t.is_empty()).unwrap_or("any"),
        settings.max_pages,
        settings.poll_interval_secs,
    );

    if args.dry_run {
        let mut bot = SalesBot::new(source, LogPublisher, settings);
        info!("Monitoring sales. Press Ctrl+C to stop.");
        bot.run_until(shutdown_signal()).await;
        return Ok(());
    }

    let credentials = match Credentials::from_env() {
        Ok(credentials) => credentials,
        Err(e) => {
            error!("{e}");
            return Err(e);
        }
    };

    let twitter = TwitterClient::new(http, credentials);
    info!("Verifying X credentials...");
    let mut backoff = Backoff::default();
    let client = &twitter;
    let screen_name = retry_rate_limited(&mut backoff, "credential check", move || {
        client.verify_credentials()
    })
    .await
    .inspect_err(|e| error!("Credential verification failed: {e}"))
    .context("credential verification failed")?;
    info!("Authenticated as @{screen_name}");

    let mut bot = SalesBot::new(source, twitter, settings);
    info!("Monitoring sales. Press Ctrl+C to stop.");
    bot.run_until(shutdown_signal()).await;

    Ok(())
}

/// Resolves on Ctrl+C. If the handler cannot be installed, never resolves.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl+C: {e}");
        std::future::pending::<()>().await;
    }
}
