use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

/// Keys that may carry the dedup id, in order of preference.
const ID_KEYS: [&str; 3] = ["id", "signature", "txId"];
const PRICE_KEYS: [&str; 2] = ["price", "listedPrice"];
const INSCRIPTION_KEYS: [&str; 2] = ["inscriptionId", "tokenId"];
const SELLER_KEYS: [&str; 2] = ["seller", "oldOwner"];
const BUYER_KEYS: [&str; 2] = ["buyer", "newOwner"];

/// One completed sale as returned by the marketplace activities feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaleEvent {
    /// Transaction signature; older feed versions call it `signature`, newer ones `txId`.
    pub id: Option<String>,
    /// Sale price in sats.
    pub price: u64,
    pub inscription_id: Option<String>,
    pub seller: Option<String>,
    pub buyer: Option<String>,
}

/// First non-blank string among `keys`.
fn first_str(obj: &serde_json::Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|k| obj.get(*k).and_then(Value::as_str))
        .map(str::trim)
        .find(|v| !v.is_empty())
        .map(str::to_string)
}

/// First usable price among `keys`: a non-negative integer or an integer string.
fn first_sats(obj: &serde_json::Map<String, Value>, keys: &[&str]) -> Option<u64> {
    keys.iter().filter_map(|k| obj.get(*k)).find_map(|v| match v {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    })
}

impl SaleEvent {
    /// Read one feed record. Unusable fields fall back to their defaults; only a
    /// record that is not a JSON object is rejected.
    pub fn from_record(record: &Value) -> Option<Self> {
        let obj = record.as_object()?;
        Some(Self {
            id: first_str(obj, &ID_KEYS),
            price: first_sats(obj, &PRICE_KEYS).unwrap_or(0),
            inscription_id: first_str(obj, &INSCRIPTION_KEYS),
            seller: first_str(obj, &SELLER_KEYS),
            buyer: first_str(obj, &BUYER_KEYS),
        })
    }

    /// Dedup key for this event, or `None` if the feed left it blank.
    pub fn event_id(&self) -> Option<&str> {
        self.id.as_deref().map(str::trim).filter(|id| !id.is_empty())
    }

    pub fn inscription_or_unknown(&self) -> &str {
        self.inscription_id.as_deref().unwrap_or("Unknown")
    }
}

/// The activities endpoint returns either a bare array or an `activities` wrapper.
///
/// Records stay raw here so one malformed entry cannot fail the whole page.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum SalesResponse {
    List(Vec<Value>),
    Wrapped { activities: Vec<Value> },
}

impl SalesResponse {
    pub fn into_events(self) -> Vec<SaleEvent> {
        let records = match self {
            Self::List(records) => records,
            Self::Wrapped { activities } => activities,
        };
        records
            .iter()
            .filter_map(|record| {
                let event = SaleEvent::from_record(record);
                if event.is_none() {
                    debug!("Skipping non-object feed record: {record}");
                }
                event
            })
            .collect()
    }
}

/// A formatted alert ready for publishing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alert {
    pub event_id: String,
    pub inscription_id: String,
    /// Price in BTC rendered with 8 decimals.
    pub price_btc: String,
    pub text: String,
}

/// Line emitted on stdout for every alert that was published.
#[derive(Debug, Clone, Serialize)]
pub struct AlertRecord {
    pub timestamp: String,
    pub event_id: String,
    pub inscription_id: String,
    pub price_btc: String,
    /// Id assigned by the social-media API (absent in dry-run).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub post_id: Option<String>,
    pub seen_count: usize,
}
