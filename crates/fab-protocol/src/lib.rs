use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Discriminator carried by results broadcasts on the page channel.
pub const RESULTS_BROADCAST_KIND: &str = "FAB_ENTITLEMENTS_RESULTS";

/// Error string returned for commands the store does not recognize.
pub const ERR_UNKNOWN_MESSAGE_TYPE: &str = "unknown_message_type";

// -------- Commands (surface -> store) --------

/// Commands accepted by the bridge server, discriminated by `type`.
///
/// The discriminators keep the UPPER_SNAKE wire spelling expected by
/// pre-existing clients of the command channel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum Command {
    #[serde(rename = "SAVE_ENTITLEMENTS")]
    SaveEntitlements {
        #[serde(default, deserialize_with = "array_or_empty")]
        items: Vec<Value>,
    },
    #[serde(rename = "GET_ENTITLEMENTS")]
    GetEntitlements,
    #[serde(rename = "CLEAR_ENTITLEMENTS")]
    ClearEntitlements,
    #[serde(rename = "PING")]
    Ping,
    #[serde(rename = "LOG")]
    Log {
        level: String,
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data: Option<Value>,
    },
    #[serde(rename = "GET_LOGS")]
    GetLogs,
    #[serde(rename = "CLEAR_LOGS")]
    ClearLogs,
}

/// Malformed `items` payloads are coerced to an empty batch rather than
/// rejected; an empty batch is a no-op downstream.
fn array_or_empty<'de, D>(deserializer: D) -> Result<Vec<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Array(items)) => items,
        _ => Vec::new(),
    })
}

// -------- Replies (store -> surface) --------

/// Replies produced by the command channel. Every variant carries `ok`;
/// the remaining fields keep the original wire shapes, so the enum is
/// untagged and variants are tried most-specific first.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Reply {
    Saved { ok: bool, saved: u64 },
    Data { ok: bool, data: Vec<Value> },
    Logs { ok: bool, logs: Vec<DiagEntry> },
    Pong { ok: bool, timestamp: i64 },
    Err { ok: bool, error: String },
    Ack { ok: bool },
}

impl Reply {
    pub fn ack() -> Self {
        Reply::Ack { ok: true }
    }

    pub fn saved(saved: u64) -> Self {
        Reply::Saved { ok: true, saved }
    }

    pub fn data(data: Vec<Value>) -> Self {
        Reply::Data { ok: true, data }
    }

    pub fn logs(logs: Vec<DiagEntry>) -> Self {
        Reply::Logs { ok: true, logs }
    }

    pub fn pong(timestamp: i64) -> Self {
        Reply::Pong {
            ok: true,
            timestamp,
        }
    }

    pub fn err(error: impl Into<String>) -> Self {
        Reply::Err {
            ok: false,
            error: error.into(),
        }
    }

    pub fn is_ok(&self) -> bool {
        match self {
            Reply::Saved { ok, .. }
            | Reply::Data { ok, .. }
            | Reply::Logs { ok, .. }
            | Reply::Pong { ok, .. }
            | Reply::Err { ok, .. }
            | Reply::Ack { ok } => *ok,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            Reply::Err { error, .. } => Some(error.as_str()),
            _ => None,
        }
    }
}

/// One diagnostic log entry as kept (and served) by the store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DiagEntry {
    pub timestamp: String,
    pub level: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

// -------- Entitlement records --------

/// Identity of a record for storage purposes: the top-level `uid` string.
/// Records without one cannot be keyed and are rejected per item.
pub fn record_uid(record: &Value) -> Option<&str> {
    match record.get("uid") {
        Some(Value::String(uid)) if !uid.is_empty() => Some(uid.as_str()),
        _ => None,
    }
}

/// Public listing page for an entitlement uid.
pub fn listing_url(uid: &str) -> String {
    format!("https://www.fab.com/listings/{uid}")
}

/// Display projection of a raw entitlement record.
///
/// Upstream payload shapes drift, so every field is extracted with the
/// same fallback chains the capture clients rely on. Missing fields stay
/// `None`; presentation decides how to render gaps.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordSummary {
    pub uid: Option<String>,
    pub title: Option<String>,
    pub price: Option<f64>,
    pub currency: Option<String>,
    pub seller: Option<String>,
    pub created_at: Option<String>,
    pub saved_at: Option<String>,
    pub thumbnail_url: Option<String>,
}

impl RecordSummary {
    pub fn from_record(record: &Value) -> Self {
        let listing = record.get("listing");
        RecordSummary {
            uid: str_at(record, "uid").or_else(|| str_at(record, "id")),
            title: listing
                .and_then(|l| str_at(l, "title"))
                .or_else(|| str_at(record, "title")),
            price: starting_price(record).and_then(|p| p.get("price")).and_then(Value::as_f64),
            currency: starting_price(record)
                .and_then(|p| str_at(p, "currencyCode")),
            seller: listing
                .and_then(|l| l.get("user"))
                .and_then(|u| str_at(u, "sellerName")),
            created_at: str_at(record, "createdAt"),
            saved_at: str_at(record, "savedAt"),
            thumbnail_url: largest_thumbnail(record),
        }
    }
}

fn str_at(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(Value::as_str).map(str::to_string)
}

fn starting_price(record: &Value) -> Option<&Value> {
    record
        .get("listing")
        .and_then(|l| l.get("startingPrice"))
        .or_else(|| record.get("startingPrice"))
}

/// Highest-resolution image of the first thumbnail set, by `size`.
fn largest_thumbnail(record: &Value) -> Option<String> {
    let images = record
        .get("listing")?
        .get("thumbnails")?
        .as_array()?
        .first()?
        .get("images")?
        .as_array()?;
    images
        .iter()
        .max_by_key(|img| img.get("size").and_then(Value::as_u64).unwrap_or(0))
        .and_then(|img| str_at(img, "url"))
}

// -------- Export surface --------

pub const EXPORT_VERSION: &str = "1.0";
pub const EXPORT_SOURCE: &str = "fab-bridge";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExportMetadata {
    #[serde(rename = "exportDate")]
    pub export_date: String,
    pub version: String,
    pub source: String,
    #[serde(rename = "itemCount")]
    pub item_count: u64,
}

/// Self-describing export of the full store contents.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExportDocument {
    pub metadata: ExportMetadata,
    pub entitlements: Vec<Value>,
}

impl ExportDocument {
    pub fn new(entitlements: Vec<Value>) -> Self {
        ExportDocument {
            metadata: ExportMetadata {
                export_date: chrono::Utc::now()
                    .to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
                version: EXPORT_VERSION.to_string(),
                source: EXPORT_SOURCE.to_string(),
                item_count: entitlements.len() as u64,
            },
            entitlements,
        }
    }
}

/// Dated default filename for an export written on `date`.
pub fn export_filename_for(date: chrono::NaiveDate) -> String {
    format!("fab-entitlements-{}.json", date.format("%Y-%m-%d"))
}

/// Default filename for an export written today (UTC).
pub fn export_filename_today() -> String {
    export_filename_for(chrono::Utc::now().date_naive())
}
