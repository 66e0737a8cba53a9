use chrono::NaiveDateTime;

use crate::types::MarketSnapshotRecord;

/// Row of `fact_market_data` as sqlx reads it. Timestamps are stored as UTC
/// wall-clock values without a zone.
#[derive(Debug, sqlx::FromRow)]
pub struct SnapshotRow {
    pub coin_id: Option<String>,
    pub coin_symbol: Option<String>,
    pub price_usd: Option<f64>,
    pub market_cap_usd: Option<f64>,
    pub volume_24h_usd: Option<f64>,
    pub source_timestamp: Option<NaiveDateTime>,
    pub load_date: Option<NaiveDateTime>,
}

impl From<SnapshotRow> for MarketSnapshotRecord {
    fn from(row: SnapshotRow) -> Self {
        Self {
            coin_id: row.coin_id.unwrap_or_default(),
            coin_symbol: row.coin_symbol,
            price_usd: row.price_usd,
            market_cap_usd: row.market_cap_usd,
            volume_24h_usd: row.volume_24h_usd,
            source_timestamp: row.source_timestamp.map(|t| t.and_utc()),
            load_date: row.load_date.map(|t| t.and_utc()),
        }
    }
}
