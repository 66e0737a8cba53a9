use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Market snapshot schema
// ---------------------------------------------------------------------------

pub const COIN_ID: &str = "coin_id";
pub const COIN_SYMBOL: &str = "coin_symbol";
pub const PRICE_USD: &str = "price_usd";
pub const MARKET_CAP_USD: &str = "market_cap_usd";
pub const VOLUME_24H_USD: &str = "volume_24h_usd";
pub const SOURCE_TIMESTAMP: &str = "source_timestamp";
pub const LOAD_DATE: &str = "load_date";

/// Columns of `fact_market_data`, in table order.
pub const SNAPSHOT_COLUMNS: [&str; 7] = [
    COIN_ID,
    COIN_SYMBOL,
    PRICE_USD,
    MARKET_CAP_USD,
    VOLUME_24H_USD,
    SOURCE_TIMESTAMP,
    LOAD_DATE,
];

/// Columns coerced to UTC timestamps before insert.
pub const TIMESTAMP_COLUMNS: [&str; 2] = [SOURCE_TIMESTAMP, LOAD_DATE];

/// A batch is rejected if any of these is NULL in every row.
pub const METRIC_COLUMNS: [&str; 3] = [PRICE_USD, MARKET_CAP_USD, VOLUME_24H_USD];

/// One row per (coin, observation time), as stored in the warehouse.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketSnapshotRecord {
    pub coin_id: String,
    pub coin_symbol: Option<String>,
    pub price_usd: Option<f64>,
    pub market_cap_usd: Option<f64>,
    pub volume_24h_usd: Option<f64>,
    pub source_timestamp: Option<DateTime<Utc>>,
    pub load_date: Option<DateTime<Utc>>,
}

/// Result of a `load` run that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// No processed files under the prefix. No connection was opened.
    NothingToLoad,
    Loaded { files: usize, rows: u64 },
}

impl LoadOutcome {
    pub fn rows_inserted(&self) -> u64 {
        match self {
            LoadOutcome::NothingToLoad => 0,
            LoadOutcome::Loaded { rows, .. } => *rows,
        }
    }
}
