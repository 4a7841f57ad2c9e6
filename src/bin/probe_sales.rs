//! Probe: Magic Eden ordinals activities feed
//!
//! Hits GET https://api-mainnet.magiceden.dev/v2/ordinals/activities and documents:
//! - Response shape (bare array vs `activities` wrapper) and fields
//! - Which dedup key is present (id / signature / txId)
//! - Pagination (limit/offset)
//! - Whether every returned record parses as a `SaleEvent`

use std::collections::HashSet;
use std::time::Instant;

use anyhow::Result;
use clap::Parser;
use serde_json::Value;

use ordinals_sales_bot::api::SalesQuery;
use ordinals_sales_bot::config::SettingsConfig;
use ordinals_sales_bot::types::{SaleEvent, SalesResponse};
use ordinals_sales_bot::{COLLECTION_NAME, ME_ACTIVITIES_URL};

#[derive(Parser)]
#[command(name = "probe_sales", about = "Dump the raw sales feed for a collection")]
struct Args {
    #[arg(long, default_value = COLLECTION_NAME)]
    collection: String,

    #[arg(long, default_value_t = 20)]
    limit: u32,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let client = reqwest::Client::new();
    let settings = SettingsConfig {
        collection: args.collection.clone(),
        limit: args.limit,
        ..SettingsConfig::default()
    };
    let first = SalesQuery::first_page(&settings);

    println!("=== Probe: ordinals sales feed ===");
    println!("Collection: {}", args.collection);
    println!();

    // 1. First page
    println!("--- 1. First page (limit={}) ---", args.limit);
    let start = Instant::now();
    let resp = client
        .get(ME_ACTIVITIES_URL)
        .header("accept", "application/json")
        .query(&first.params())
        .send()
        .await?;
    let latency = start.elapsed();
    let status = resp.status();
    let body: Value = resp.json().await?;
    println!("Status: {}", status);
    println!("Latency: {:?}", latency);

    let records = match &body {
        Value::Array(arr) => {
            println!("Shape: bare array");
            arr.clone()
        }
        Value::Object(obj) => match obj.get("activities").and_then(Value::as_array) {
            Some(arr) => {
                println!("Shape: {{ activities: [...] }}");
                arr.clone()
            }
            None => {
                println!("Unexpected object:");
                println!("{}", serde_json::to_string_pretty(&body)?);
                return Ok(());
            }
        },
        other => {
            println!("Unexpected body: {other}");
            return Ok(());
        }
    };
    println!("Record count: {}", records.len());

    if let Some(first_record) = records.first() {
        println!("\nSample record (first):");
        println!("{}", serde_json::to_string_pretty(first_record)?);
        if let Some(obj) = first_record.as_object() {
            println!("\nFields present:");
            for key in obj.keys() {
                println!("  - {}", key);
            }
        }
    }
    println!();

    // 2. Dedup key coverage
    println!("--- 2. Dedup keys ---");
    let parsed: Vec<SaleEvent> = serde_json::from_value::<SalesResponse>(body)?.into_events();
    let ids: Vec<&str> = parsed.iter().filter_map(SaleEvent::event_id).collect();
    let unique: HashSet<&str> = ids.iter().copied().collect();
    println!(
        "Parsed {} record(s): {} with an id, {} unique",
        parsed.len(),
        ids.len(),
        unique.len()
    );
    println!();

    // 3. Second page
    println!("--- 3. Pagination: offset={} ---", args.limit);
    let start = Instant::now();
    let resp = client
        .get(ME_ACTIVITIES_URL)
        .header("accept", "application/json")
        .query(&first.next_page().params())
        .send()
        .await?;
    let latency = start.elapsed();
    let status = resp.status();
    let page: Vec<SaleEvent> = match serde_json::from_str::<SalesResponse>(&resp.text().await?) {
        Ok(r) => r.into_events(),
        Err(e) => {
            println!("Status: {} (unparseable: {e})", status);
            return Ok(());
        }
    };
    let overlap = page
        .iter()
        .filter_map(SaleEvent::event_id)
        .filter(|id| unique.contains(id))
        .count();
    println!(
        "Status: {}, {} record(s), {} overlapping page 1 (latency: {:?})",
        status,
        page.len(),
        overlap,
        latency
    );

    Ok(())
}
