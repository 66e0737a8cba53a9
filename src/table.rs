//! Column-oriented in-memory table staged between object storage and the
//! warehouse.
//!
//! Every cell is an `Option`: a missing value is always `None`, never a
//! placeholder, so nothing but SQL NULL can reach the insert path for an
//! absent value.

use std::ops::Range;

use chrono::{DateTime, SecondsFormat, Utc};
use polars::prelude::{DataFrame, DataType, Series, TimeUnit};

use crate::error::{AppError, Result};

#[derive(Debug, Clone, PartialEq)]
pub enum ColumnData {
    Text(Vec<Option<String>>),
    Float(Vec<Option<f64>>),
    Int(Vec<Option<i64>>),
    Bool(Vec<Option<bool>>),
    Timestamp(Vec<Option<DateTime<Utc>>>),
}

impl ColumnData {
    pub fn len(&self) -> usize {
        match self {
            ColumnData::Text(v) => v.len(),
            ColumnData::Float(v) => v.len(),
            ColumnData::Int(v) => v.len(),
            ColumnData::Bool(v) => v.len(),
            ColumnData::Timestamp(v) => v.len(),
        }
    }

    pub fn is_null(&self, row: usize) -> bool {
        match self {
            ColumnData::Text(v) => v[row].is_none(),
            ColumnData::Float(v) => v[row].is_none(),
            ColumnData::Int(v) => v[row].is_none(),
            ColumnData::Bool(v) => v[row].is_none(),
            ColumnData::Timestamp(v) => v[row].is_none(),
        }
    }

    pub fn null_count(&self) -> usize {
        (0..self.len()).filter(|&i| self.is_null(i)).count()
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ColumnData::Text(_) => "text",
            ColumnData::Float(_) => "float",
            ColumnData::Int(_) => "int",
            ColumnData::Bool(_) => "bool",
            ColumnData::Timestamp(_) => "timestamp",
        }
    }

    /// An all-NULL column of the same kind.
    fn nulls_like(&self, len: usize) -> ColumnData {
        match self {
            ColumnData::Text(_) => ColumnData::Text(vec![None; len]),
            ColumnData::Float(_) => ColumnData::Float(vec![None; len]),
            ColumnData::Int(_) => ColumnData::Int(vec![None; len]),
            ColumnData::Bool(_) => ColumnData::Bool(vec![None; len]),
            ColumnData::Timestamp(_) => ColumnData::Timestamp(vec![None; len]),
        }
    }

    /// Appends `other` below `self`. Integer and float columns widen to float,
    /// an all-NULL side adopts the other side's kind, and text mixed with
    /// timestamps becomes text. Any other kind mismatch is an error.
    fn extend(self, other: ColumnData, name: &str) -> Result<ColumnData> {
        Ok(match (self, other) {
            (ColumnData::Text(mut a), ColumnData::Text(b)) => {
                a.extend(b);
                ColumnData::Text(a)
            }
            (ColumnData::Float(mut a), ColumnData::Float(b)) => {
                a.extend(b);
                ColumnData::Float(a)
            }
            (ColumnData::Int(mut a), ColumnData::Int(b)) => {
                a.extend(b);
                ColumnData::Int(a)
            }
            (ColumnData::Bool(mut a), ColumnData::Bool(b)) => {
                a.extend(b);
                ColumnData::Bool(a)
            }
            (ColumnData::Timestamp(mut a), ColumnData::Timestamp(b)) => {
                a.extend(b);
                ColumnData::Timestamp(a)
            }
            (ColumnData::Int(a), ColumnData::Float(b)) => {
                ColumnData::Float(widen(a).chain(b).collect())
            }
            (ColumnData::Float(mut a), ColumnData::Int(b)) => {
                a.extend(widen(b));
                ColumnData::Float(a)
            }
            // A side with no values takes the other side's kind.
            (a, b) if a.is_all_null() => b.nulls_like(a.len()).extend(b, name)?,
            (a, b) if b.is_all_null() => {
                let pad = a.nulls_like(b.len());
                a.extend(pad, name)?
            }
            // Mixed text and native timestamps stay text; timestamp columns
            // are parsed value by value afterwards.
            (ColumnData::Text(mut a), ColumnData::Timestamp(b)) => {
                a.extend(b.into_iter().map(|t| t.map(|t| rfc3339(&t))));
                ColumnData::Text(a)
            }
            (ColumnData::Timestamp(a), ColumnData::Text(b)) => {
                let mut out: Vec<Option<String>> = a.into_iter().map(|t| t.map(|t| rfc3339(&t))).collect();
                out.extend(b);
                ColumnData::Text(out)
            }
            (a, b) => {
                return Err(AppError::SourceUnavailable(format!(
                    "column '{name}' is {} in one file and {} in another",
                    a.kind(),
                    b.kind()
                )))
            }
        })
    }

    fn is_all_null(&self) -> bool {
        self.null_count() == self.len()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub data: ColumnData,
}

impl Column {
    pub fn new(name: impl Into<String>, data: ColumnData) -> Self {
        Self { name: name.into(), data }
    }
}

/// Ordered set of equally long, uniquely named columns.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StagedTable {
    columns: Vec<Column>,
    rows: usize,
}

impl StagedTable {
    pub fn new(columns: Vec<Column>) -> Result<Self> {
        let rows = columns.first().map_or(0, |c| c.data.len());
        for (i, col) in columns.iter().enumerate() {
            if col.data.len() != rows {
                return Err(AppError::SourceUnavailable(format!(
                    "column '{}' has {} rows, expected {rows}",
                    col.name,
                    col.data.len()
                )));
            }
            if columns[..i].iter().any(|c| c.name == col.name) {
                return Err(AppError::SourceUnavailable(format!(
                    "duplicate column '{}'",
                    col.name
                )));
            }
        }
        Ok(Self { columns, rows })
    }

    pub fn len(&self) -> usize {
        self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_mut(&mut self, name: &str) -> Option<&mut Column> {
        self.columns.iter_mut().find(|c| c.name == name)
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Concatenates `other` below `self`, matching columns by name.
    ///
    /// A column present on only one side is NULL for the other side's rows.
    /// Column order is first-seen order. An empty table is the identity.
    pub fn append(self, other: StagedTable) -> Result<StagedTable> {
        if self.columns.is_empty() {
            return Ok(other);
        }
        if other.columns.is_empty() {
            return Ok(self);
        }

        let (top_rows, bottom_rows) = (self.rows, other.rows);
        let mut bottom = other.columns;
        let mut merged = Vec::with_capacity(self.columns.len().max(bottom.len()));

        for top in self.columns {
            let data = match bottom.iter().position(|c| c.name == top.name) {
                Some(idx) => {
                    let b = bottom.remove(idx);
                    top.data.extend(b.data, &top.name)?
                }
                None => {
                    let pad = top.data.nulls_like(bottom_rows);
                    top.data.extend(pad, &top.name)?
                }
            };
            merged.push(Column::new(top.name, data));
        }

        for b in bottom {
            let data = b.data.nulls_like(top_rows).extend(b.data, &b.name)?;
            merged.push(Column::new(b.name, data));
        }

        StagedTable::new(merged)
    }

    /// Contiguous row ranges of at most `size` rows covering the table.
    pub fn chunk_ranges(&self, size: usize) -> impl Iterator<Item = Range<usize>> {
        let size = size.max(1);
        let rows = self.rows;
        (0..rows).step_by(size).map(move |start| start..(start + size).min(rows))
    }

    /// Converts a decoded Parquet frame. Columns keep their order; unsupported
    /// polars types are rendered as text.
    pub fn from_dataframe(df: &DataFrame) -> Result<Self> {
        let columns = df
            .get_columns()
            .iter()
            .map(|c| {
                let series = c.as_materialized_series();
                Ok(Column::new(series.name().as_str(), series_to_column(series)?))
            })
            .collect::<Result<Vec<_>>>()?;
        StagedTable::new(columns)
    }
}

fn series_to_column(s: &Series) -> Result<ColumnData> {
    let data = match s.dtype() {
        // Written for columns that were entirely None.
        DataType::Null => ColumnData::Text(vec![None; s.len()]),
        DataType::String => ColumnData::Text(
            s.str()?.into_iter().map(|v| v.map(str::to_string)).collect(),
        ),
        DataType::Boolean => ColumnData::Bool(s.bool()?.into_iter().collect()),
        DataType::Float32 | DataType::Float64 => {
            let f = s.cast(&DataType::Float64)?;
            ColumnData::Float(f.f64()?.into_iter().collect())
        }
        DataType::Int8
        | DataType::Int16
        | DataType::Int32
        | DataType::Int64
        | DataType::UInt8
        | DataType::UInt16
        | DataType::UInt32 => {
            let i = s.cast(&DataType::Int64)?;
            ColumnData::Int(i.i64()?.into_iter().collect())
        }
        DataType::UInt64 => {
            let f = s.cast(&DataType::Float64)?;
            ColumnData::Float(f.f64()?.into_iter().collect())
        }
        DataType::Datetime(unit, _) => {
            let unit = *unit;
            let raw = s.cast(&DataType::Int64)?;
            ColumnData::Timestamp(
                raw.i64()?
                    .into_iter()
                    .map(|v| v.and_then(|v| epoch_to_utc(v, unit)))
                    .collect(),
            )
        }
        DataType::Date => {
            let as_ms = s.cast(&DataType::Datetime(TimeUnit::Milliseconds, None))?;
            let raw = as_ms.cast(&DataType::Int64)?;
            ColumnData::Timestamp(
                raw.i64()?
                    .into_iter()
                    .map(|v| v.and_then(|v| epoch_to_utc(v, TimeUnit::Milliseconds)))
                    .collect(),
            )
        }
        _ => {
            let t = s.cast(&DataType::String)?;
            ColumnData::Text(t.str()?.into_iter().map(|v| v.map(str::to_string)).collect())
        }
    };
    Ok(data)
}

fn widen(ints: Vec<Option<i64>>) -> impl Iterator<Item = Option<f64>> {
    ints.into_iter().map(|x| x.map(|i| i as f64))
}

/// Same layout `parse_timestamp` reads back, nanoseconds kept.
fn rfc3339(t: &DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

/// Physical polars datetime value to a UTC instant. Tz-aware columns store
/// UTC already; naive columns are taken as UTC.
fn epoch_to_utc(value: i64, unit: TimeUnit) -> Option<DateTime<Utc>> {
    match unit {
        TimeUnit::Nanoseconds => Some(DateTime::from_timestamp_nanos(value)),
        TimeUnit::Microseconds => DateTime::from_timestamp_micros(value),
        TimeUnit::Milliseconds => DateTime::from_timestamp_millis(value),
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use crate::types::*;

    pub fn snapshot_table(records: &[MarketSnapshotRecord]) -> StagedTable {
        StagedTable::new(vec![
            Column::new(COIN_ID, ColumnData::Text(records.iter().map(|r| Some(r.coin_id.clone())).collect())),
            Column::new(COIN_SYMBOL, ColumnData::Text(records.iter().map(|r| r.coin_symbol.clone()).collect())),
            Column::new(PRICE_USD, ColumnData::Float(records.iter().map(|r| r.price_usd).collect())),
            Column::new(MARKET_CAP_USD, ColumnData::Float(records.iter().map(|r| r.market_cap_usd).collect())),
            Column::new(VOLUME_24H_USD, ColumnData::Float(records.iter().map(|r| r.volume_24h_usd).collect())),
            Column::new(SOURCE_TIMESTAMP, ColumnData::Timestamp(records.iter().map(|r| r.source_timestamp).collect())),
            Column::new(LOAD_DATE, ColumnData::Timestamp(records.iter().map(|r| r.load_date).collect())),
        ])
        .unwrap()
    }

    pub fn record(coin_id: &str, price: Option<f64>) -> MarketSnapshotRecord {
        MarketSnapshotRecord {
            coin_id: coin_id.to_string(),
            coin_symbol: Some(coin_id.chars().take(3).collect()),
            price_usd: price,
            market_cap_usd: price.map(|p| p * 1_000.0),
            volume_24h_usd: price.map(|p| p * 10.0),
            source_timestamp: DateTime::from_timestamp(1_704_067_200, 0),
            load_date: DateTime::from_timestamp(1_704_070_800, 0),
        }
    }

    /// `n` well-formed rows.
    pub fn rows(n: usize) -> StagedTable {
        let records: Vec<_> = (0..n).map(|i| record(&format!("coin-{i}"), Some(i as f64 + 1.0))).collect();
        snapshot_table(&records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use polars::prelude::NamedFrom;

    fn text(values: &[Option<&str>]) -> ColumnData {
        ColumnData::Text(values.iter().map(|v| v.map(str::to_string)).collect())
    }

    #[test]
    fn new_rejects_ragged_columns() {
        let err = StagedTable::new(vec![
            Column::new("a", ColumnData::Int(vec![Some(1), Some(2)])),
            Column::new("b", ColumnData::Int(vec![Some(1)])),
        ])
        .unwrap_err();
        assert!(matches!(err, AppError::SourceUnavailable(_)));
    }

    #[test]
    fn append_keeps_order_and_pads_missing_columns() {
        let first = StagedTable::new(vec![
            Column::new("coin_id", text(&[Some("bitcoin")])),
            Column::new("price_usd", ColumnData::Float(vec![Some(1.0)])),
        ])
        .unwrap();
        let second = StagedTable::new(vec![
            Column::new("coin_id", text(&[Some("ethereum"), Some("solana")])),
            Column::new("coin_symbol", text(&[Some("eth"), Some("sol")])),
        ])
        .unwrap();

        let merged = first.append(second).unwrap();
        assert_eq!(merged.len(), 3);
        assert_eq!(merged.column_names(), vec!["coin_id", "price_usd", "coin_symbol"]);
        assert_eq!(
            merged.column("coin_id").unwrap().data,
            text(&[Some("bitcoin"), Some("ethereum"), Some("solana")])
        );
        assert_eq!(
            merged.column("price_usd").unwrap().data,
            ColumnData::Float(vec![Some(1.0), None, None])
        );
        assert_eq!(
            merged.column("coin_symbol").unwrap().data,
            text(&[None, Some("eth"), Some("sol")])
        );
    }

    #[test]
    fn append_widens_int_to_float() {
        let a = StagedTable::new(vec![Column::new("v", ColumnData::Int(vec![Some(2)]))]).unwrap();
        let b = StagedTable::new(vec![Column::new("v", ColumnData::Float(vec![Some(2.5)]))]).unwrap();
        let merged = a.append(b).unwrap();
        assert_eq!(merged.column("v").unwrap().data, ColumnData::Float(vec![Some(2.0), Some(2.5)]));
    }

    #[test]
    fn append_rejects_incompatible_kinds() {
        let a = StagedTable::new(vec![Column::new("v", text(&[Some("x")]))]).unwrap();
        let b = StagedTable::new(vec![Column::new("v", ColumnData::Bool(vec![Some(true)]))]).unwrap();
        assert!(a.append(b).is_err());
    }

    #[test]
    fn empty_table_is_append_identity() {
        let t = fixtures::rows(2);
        let merged = StagedTable::default().append(t.clone()).unwrap();
        assert_eq!(merged, t);
    }

    #[test]
    fn chunk_ranges_cover_all_rows() {
        let t = fixtures::rows(2500);
        let ranges: Vec<_> = t.chunk_ranges(1000).collect();
        assert_eq!(ranges, vec![0..1000, 1000..2000, 2000..2500]);
        assert_eq!(StagedTable::default().chunk_ranges(1000).count(), 0);
    }

    #[test]
    fn dataframe_columns_map_to_typed_columns() {
        let df = polars::df!(
            "coin_id" => &["bitcoin", "ethereum"],
            "price_usd" => &[Some(42_000.5), None],
            "rank" => &[1i32, 2],
            "active" => &[true, false]
        )
        .unwrap();

        let t = StagedTable::from_dataframe(&df).unwrap();
        assert_eq!(t.len(), 2);
        assert_eq!(t.column("coin_id").unwrap().data, text(&[Some("bitcoin"), Some("ethereum")]));
        assert_eq!(t.column("price_usd").unwrap().data, ColumnData::Float(vec![Some(42_000.5), None]));
        assert_eq!(t.column("rank").unwrap().data, ColumnData::Int(vec![Some(1), Some(2)]));
        assert_eq!(t.column("active").unwrap().data, ColumnData::Bool(vec![Some(true), Some(false)]));
    }

    #[test]
    fn datetime_columns_become_utc_instants() {
        let millis = Series::new("load_date".into(), &[Some(1_704_067_200_000i64), None])
            .cast(&DataType::Datetime(TimeUnit::Milliseconds, None))
            .unwrap();
        let df = DataFrame::new(vec![millis.into()]).unwrap();

        let t = StagedTable::from_dataframe(&df).unwrap();
        assert_eq!(
            t.column("load_date").unwrap().data,
            ColumnData::Timestamp(vec![DateTime::from_timestamp(1_704_067_200, 0), None])
        );
    }

    #[test]
    fn zoned_datetime_columns_keep_their_instant() {
        let berlin = Series::new("source_timestamp".into(), &[Some(1_704_067_200_000i64), None])
            .cast(&DataType::Datetime(TimeUnit::Milliseconds, Some("Europe/Berlin".into())))
            .unwrap();
        let df = DataFrame::new(vec![berlin.into()]).unwrap();

        let t = StagedTable::from_dataframe(&df).unwrap();
        assert_eq!(
            t.column("source_timestamp").unwrap().data,
            ColumnData::Timestamp(vec![DateTime::from_timestamp(1_704_067_200, 0), None])
        );
    }

    #[test]
    fn null_typed_column_adopts_the_other_files_kind() {
        let nulls = DataFrame::new(vec![Series::new_null("price_usd".into(), 2).into()]).unwrap();
        let a = StagedTable::from_dataframe(&nulls).unwrap();
        let b = StagedTable::new(vec![Column::new("price_usd", ColumnData::Float(vec![Some(3.0)]))]).unwrap();

        let merged = a.append(b).unwrap();
        assert_eq!(merged.column("price_usd").unwrap().data, ColumnData::Float(vec![None, None, Some(3.0)]));
    }

    #[test]
    fn text_and_timestamp_widen_to_text() {
        let a = StagedTable::new(vec![Column::new("load_date", text(&[Some("2024-01-01")]))]).unwrap();
        let b = StagedTable::new(vec![Column::new(
            "load_date",
            ColumnData::Timestamp(vec![DateTime::from_timestamp(1_704_070_800, 0), None]),
        )])
        .unwrap();

        let merged = a.append(b).unwrap();
        assert_eq!(
            merged.column("load_date").unwrap().data,
            text(&[Some("2024-01-01"), Some("2024-01-01T01:00:00Z"), None])
        );
    }
}
