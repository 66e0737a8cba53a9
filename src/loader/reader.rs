use std::io::Cursor;

use polars::prelude::{ParquetReader, SerReader};
use tracing::{debug, info, warn};

use crate::config::PARQUET_SUFFIX;
use crate::error::{AppError, Result};
use crate::storage::ObjectSource;
use crate::table::StagedTable;

/// Lists `prefix`, reads every Parquet object in listing order and stacks
/// them into one table. Returns the table and the number of files read.
///
/// No matching files gives an empty table. Any listing, fetch or decode
/// failure aborts the whole read.
pub async fn list_and_read<S: ObjectSource>(
    source: &S,
    bucket: &str,
    prefix: &str,
) -> Result<(StagedTable, usize)> {
    let keys: Vec<String> = source
        .list_keys(bucket, prefix)
        .await?
        .into_iter()
        .filter(|k| k.ends_with(PARQUET_SUFFIX))
        .collect();

    if keys.is_empty() {
        warn!("No files found in s3://{bucket}/{prefix}");
        return Ok((StagedTable::default(), 0));
    }
    info!("Reading {} Parquet file(s) from s3://{bucket}/{prefix}", keys.len());

    let mut table = StagedTable::default();
    for key in &keys {
        let bytes = source.get_object(bucket, key).await?;
        let part = decode_parquet(key, bytes)?;
        debug!(key = %key, rows = part.len(), "decoded processed file");
        table = table.append(part).map_err(|e| in_file(key, e))?;
    }

    info!(
        "Staged {} rows from {} file(s), columns: {:?}",
        table.len(),
        keys.len(),
        table.column_names()
    );
    Ok((table, keys.len()))
}

fn decode_parquet(key: &str, bytes: Vec<u8>) -> Result<StagedTable> {
    let df = ParquetReader::new(Cursor::new(bytes))
        .finish()
        .map_err(|e| AppError::SourceUnavailable(format!("decoding {key} failed: {e}")))?;
    StagedTable::from_dataframe(&df).map_err(|e| in_file(key, e))
}

/// Prefixes the failing key without repeating the variant's own label.
fn in_file(key: &str, err: AppError) -> AppError {
    match err {
        AppError::SourceUnavailable(msg) => AppError::SourceUnavailable(format!("{key}: {msg}")),
        other => AppError::SourceUnavailable(format!("{key}: {other}")),
    }
}
