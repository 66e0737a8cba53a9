use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use tracing::{error, info, warn};

use crate::table::{ColumnData, StagedTable};
use crate::types::{METRIC_COLUMNS, TIMESTAMP_COLUMNS};

/// Naive layouts tried after RFC 3339. All are read as UTC.
const NAIVE_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

const OFFSET_DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S%.f%:z", "%Y-%m-%d %H:%M:%S%.f%z"];

#[derive(Debug, Clone, PartialEq)]
pub enum Validation {
    /// Ready to insert. Empty when the input was empty.
    Clean(StagedTable),
    /// A metric column is NULL in every row; nothing may be loaded.
    Rejected { columns: Vec<String> },
}

/// Coerces timestamp columns, rejects batches with an all-NULL metric column
/// and replaces absent-value sentinels with NULL.
pub fn validate_and_clean(mut table: StagedTable) -> Validation {
    if table.is_empty() {
        return Validation::Clean(table);
    }
    info!("SCHEMA CHECK - columns found: {:?}", table.column_names());

    for name in TIMESTAMP_COLUMNS {
        if let Some(col) = table.column_mut(name) {
            let before = non_null(&col.data);
            col.data = coerce_timestamps(std::mem::replace(&mut col.data, ColumnData::Timestamp(Vec::new())));
            let lost = before - non_null(&col.data);
            if lost > 0 {
                warn!(column = name, values = lost, "unparseable timestamps set to NULL");
            }
        }
    }

    let all_null: Vec<String> = METRIC_COLUMNS
        .iter()
        .filter(|name| table.column(name).map_or(true, |col| absent_everywhere(&col.data)))
        .map(|name| name.to_string())
        .collect();

    if !all_null.is_empty() {
        error!("DATA INTEGRITY ERROR: columns {all_null:?} are entirely NULL");
        return Validation::Rejected { columns: all_null };
    }

    normalize_absent(&mut table);
    info!("Data preparation complete ({} rows)", table.len());
    Validation::Clean(table)
}

fn non_null(data: &ColumnData) -> usize {
    data.len() - data.null_count()
}

/// NaN counts as absent, the same as NULL.
fn absent_everywhere(data: &ColumnData) -> bool {
    match data {
        ColumnData::Float(v) => v.iter().all(|x| x.map_or(true, f64::is_nan)),
        other => other.null_count() == other.len(),
    }
}

/// Float NaN becomes NULL so it is stored as SQL NULL, not as `'NaN'`.
fn normalize_absent(table: &mut StagedTable) {
    let names: Vec<String> = table.column_names().into_iter().map(str::to_string).collect();
    for name in names {
        if let Some(col) = table.column_mut(&name) {
            if let ColumnData::Float(values) = &mut col.data {
                for v in values.iter_mut() {
                    if v.is_some_and(f64::is_nan) {
                        *v = None;
                    }
                }
            }
        }
    }
}

/// Converts any column kind to UTC timestamps. Values that cannot be read as
/// an instant become `None`.
pub fn coerce_timestamps(data: ColumnData) -> ColumnData {
    let values = match data {
        ColumnData::Timestamp(v) => v,
        ColumnData::Text(v) => v.iter().map(|s| s.as_deref().and_then(parse_timestamp)).collect(),
        // Integers are epoch nanoseconds.
        ColumnData::Int(v) => v.into_iter().map(|n| n.map(DateTime::from_timestamp_nanos)).collect(),
        ColumnData::Float(v) => v
            .into_iter()
            .map(|f| {
                f.filter(|f| f.is_finite() && f.abs() < i64::MAX as f64)
                    .map(|f| DateTime::from_timestamp_nanos(f as i64))
            })
            .collect(),
        ColumnData::Bool(v) => vec![None; v.len()],
    };
    ColumnData::Timestamp(values)
}

pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in OFFSET_DATETIME_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(s, fmt) {
            return Some(dt.with_timezone(&Utc));
        }
    }
    for fmt in NAIVE_DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt.and_utc());
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::fixtures::{record, rows, snapshot_table};
    use crate::table::Column;
    use crate::types::*;

    fn utc(secs: i64) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(secs, 0)
    }

    fn text(values: &[Option<&str>]) -> ColumnData {
        ColumnData::Text(values.iter().map(|v| v.map(str::to_string)).collect())
    }

    fn clean(v: Validation) -> StagedTable {
        match v {
            Validation::Clean(t) => t,
            Validation::Rejected { columns } => panic!("unexpected rejection of {columns:?}"),
        }
    }

    #[test]
    fn parses_common_timestamp_layouts() {
        let expected = utc(1_704_110_400); // 2024-01-01 12:00:00 UTC
        assert_eq!(parse_timestamp("2024-01-01T12:00:00Z"), expected);
        assert_eq!(parse_timestamp("2024-01-01T14:00:00+02:00"), expected);
        assert_eq!(parse_timestamp("2024-01-01 12:00:00"), expected);
        assert_eq!(parse_timestamp("2024-01-01T12:00:00.000"), expected);
        assert_eq!(parse_timestamp("2024-01-01 12:00:00+00:00"), expected);
        assert_eq!(parse_timestamp("2024-01-01"), utc(1_704_067_200));
    }

    #[test]
    fn unparseable_timestamps_become_none() {
        assert_eq!(parse_timestamp("yesterday"), None);
        assert_eq!(parse_timestamp(""), None);
        assert_eq!(parse_timestamp("2024-13-45"), None);
        assert_eq!(parse_timestamp("NaT"), None);
    }

    #[test]
    fn clean_keeps_rows_and_only_nulls_bad_timestamps() {
        let table = StagedTable::new(vec![
            Column::new(COIN_ID, text(&[Some("bitcoin"), Some("ethereum"), Some("solana")])),
            Column::new(PRICE_USD, ColumnData::Float(vec![Some(1.0), None, Some(3.0)])),
            Column::new(MARKET_CAP_USD, ColumnData::Float(vec![Some(1.0), Some(2.0), None])),
            Column::new(VOLUME_24H_USD, ColumnData::Float(vec![None, Some(2.0), Some(3.0)])),
            Column::new(
                SOURCE_TIMESTAMP,
                text(&[Some("2024-01-01T12:00:00Z"), Some("garbage"), None]),
            ),
            Column::new(LOAD_DATE, ColumnData::Timestamp(vec![utc(10), utc(20), utc(30)])),
        ])
        .unwrap();

        let cleaned = clean(validate_and_clean(table.clone()));
        assert_eq!(cleaned.len(), 3);
        assert_eq!(
            cleaned.column(SOURCE_TIMESTAMP).unwrap().data,
            ColumnData::Timestamp(vec![utc(1_704_110_400), None, None])
        );
        assert_eq!(cleaned.column(LOAD_DATE).unwrap().data, table.column(LOAD_DATE).unwrap().data);
        assert_eq!(cleaned.column(PRICE_USD).unwrap().data, table.column(PRICE_USD).unwrap().data);
        assert_eq!(cleaned.column(COIN_ID).unwrap().data, table.column(COIN_ID).unwrap().data);
    }

    #[test]
    fn all_metrics_null_is_rejected() {
        let records = vec![record("bitcoin", None), record("ethereum", None)];
        let table = snapshot_table(&records);

        match validate_and_clean(table) {
            Validation::Rejected { columns } => {
                assert_eq!(columns, vec![PRICE_USD, MARKET_CAP_USD, VOLUME_24H_USD]);
            }
            Validation::Clean(_) => panic!("all-NULL metrics must be rejected"),
        }
    }

    #[test]
    fn a_single_all_null_metric_rejects_the_batch() {
        let mut records = vec![record("bitcoin", Some(1.0)), record("ethereum", Some(2.0))];
        for r in &mut records {
            r.volume_24h_usd = None;
        }

        match validate_and_clean(snapshot_table(&records)) {
            Validation::Rejected { columns } => assert_eq!(columns, vec![VOLUME_24H_USD]),
            Validation::Clean(_) => panic!("expected rejection"),
        }
    }

    #[test]
    fn missing_metric_column_counts_as_all_null() {
        let table = StagedTable::new(vec![
            Column::new(COIN_ID, text(&[Some("bitcoin")])),
            Column::new(PRICE_USD, ColumnData::Float(vec![Some(1.0)])),
            Column::new(MARKET_CAP_USD, ColumnData::Float(vec![Some(1.0)])),
        ])
        .unwrap();

        assert_eq!(
            validate_and_clean(table),
            Validation::Rejected { columns: vec![VOLUME_24H_USD.to_string()] }
        );
    }

    #[test]
    fn a_row_with_all_metrics_null_passes_when_others_are_populated() {
        let records = vec![
            record("bitcoin", Some(1.0)),
            record("ethereum", None),
            record("solana", Some(3.0)),
        ];
        let cleaned = clean(validate_and_clean(snapshot_table(&records)));
        assert_eq!(cleaned.len(), 3);
    }

    #[test]
    fn nan_metrics_become_null_and_count_as_absent() {
        let table = StagedTable::new(vec![
            Column::new(PRICE_USD, ColumnData::Float(vec![Some(f64::NAN), Some(2.0)])),
            Column::new(MARKET_CAP_USD, ColumnData::Float(vec![Some(1.0), Some(2.0)])),
            Column::new(VOLUME_24H_USD, ColumnData::Float(vec![Some(1.0), Some(f64::NAN)])),
        ])
        .unwrap();
        let cleaned = clean(validate_and_clean(table));
        assert_eq!(cleaned.column(PRICE_USD).unwrap().data, ColumnData::Float(vec![None, Some(2.0)]));
        assert_eq!(cleaned.column(VOLUME_24H_USD).unwrap().data, ColumnData::Float(vec![Some(1.0), None]));

        let all_nan = StagedTable::new(vec![
            Column::new(PRICE_USD, ColumnData::Float(vec![Some(f64::NAN), None])),
            Column::new(MARKET_CAP_USD, ColumnData::Float(vec![Some(1.0), Some(2.0)])),
            Column::new(VOLUME_24H_USD, ColumnData::Float(vec![Some(1.0), Some(2.0)])),
        ])
        .unwrap();
        assert_eq!(
            validate_and_clean(all_nan),
            Validation::Rejected { columns: vec![PRICE_USD.to_string()] }
        );
    }

    #[test]
    fn empty_input_is_clean_and_empty() {
        assert_eq!(validate_and_clean(StagedTable::default()), Validation::Clean(StagedTable::default()));
    }

    #[test]
    fn integer_timestamps_are_epoch_nanoseconds() {
        let coerced = coerce_timestamps(ColumnData::Int(vec![Some(1_704_067_200_000_000_000), None]));
        assert_eq!(coerced, ColumnData::Timestamp(vec![utc(1_704_067_200), None]));
    }

    #[test]
    fn well_formed_batch_is_unchanged() {
        let table = rows(10);
        assert_eq!(clean(validate_and_clean(table.clone())), table);
    }
}
