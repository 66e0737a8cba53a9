use std::ops::Range;

use tracing::{error, info, warn};

use crate::error::{AppError, Result};
use crate::table::StagedTable;

/// `INSERT INTO "<table>" ("c1", "c2", ...) ` for one table's columns.
/// The writer appends `VALUES` and the row tuples per chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsertStatement {
    pub prefix: String,
    pub columns: Vec<String>,
}

impl InsertStatement {
    pub fn for_table(target_table: &str, table: &StagedTable) -> Self {
        let columns: Vec<String> = table.column_names().into_iter().map(str::to_string).collect();
        let column_list = columns
            .iter()
            .map(|c| quote_ident(c))
            .collect::<Vec<_>>()
            .join(", ");
        Self {
            prefix: format!("INSERT INTO {} ({column_list}) ", quote_qualified(target_table)),
            columns,
        }
    }
}

/// Double-quotes an identifier, doubling embedded quotes.
pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Quotes each dot-separated part: `public.t` becomes `"public"."t"`.
pub fn quote_qualified(name: &str) -> String {
    name.split('.').map(quote_ident).collect::<Vec<_>>().join(".")
}

/// Sink that inserts and commits one chunk of rows at a time.
#[allow(async_fn_in_trait)]
pub trait ChunkWriter {
    /// Inserts `rows` of `table` and commits them in one transaction. On
    /// error the transaction is rolled back and nothing from this chunk is
    /// persisted.
    async fn write_chunk(
        &mut self,
        stmt: &InsertStatement,
        table: &StagedTable,
        rows: Range<usize>,
    ) -> Result<()>;
}

/// Inserts `table` in contiguous chunks of `batch_size`, committing each.
///
/// Not atomic across chunks: when a chunk fails, earlier chunks stay
/// committed, no later chunk is tried, and the error reports how many rows
/// made it in.
pub async fn insert_in_batches<W: ChunkWriter>(
    writer: &mut W,
    table: &StagedTable,
    target_table: &str,
    batch_size: usize,
) -> Result<u64> {
    if table.is_empty() {
        warn!("No data to insert.");
        return Ok(0);
    }
    if batch_size == 0 {
        return Err(AppError::Config("batch size must be at least 1".to_string()));
    }

    let stmt = InsertStatement::for_table(target_table, table);
    let total = table.len();
    let mut rows_inserted: u64 = 0;

    for range in table.chunk_ranges(batch_size) {
        let chunk_rows = range.len() as u64;
        if let Err(e) = writer.write_chunk(&stmt, table, range).await {
            error!("Batch insertion failed after {rows_inserted}/{total} rows: {e}");
            return Err(AppError::InsertFailure {
                rows_committed: rows_inserted,
                source: Box::new(e),
            });
        }
        rows_inserted += chunk_rows;
        info!("Inserted {rows_inserted}/{total} rows...");
    }

    Ok(rows_inserted)
}
