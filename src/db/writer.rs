use std::ops::Range;

use sqlx::postgres::{PgConnection, Postgres};
use sqlx::{Connection, QueryBuilder};
use tracing::{debug, warn};

use crate::config::PG_MAX_BIND_PARAMS;
use crate::error::Result;
use crate::loader::{ChunkWriter, InsertStatement};
use crate::table::{ColumnData, StagedTable};

/// Writes chunks over one exclusive PostgreSQL connection, one transaction
/// per chunk.
pub struct PgChunkWriter {
    conn: PgConnection,
}

impl PgChunkWriter {
    pub fn new(conn: PgConnection) -> Self {
        Self { conn }
    }

    pub fn into_inner(self) -> PgConnection {
        self.conn
    }
}

/// Rows per statement so that rows * columns stays under the bind limit.
pub fn rows_per_statement(columns: usize) -> usize {
    (PG_MAX_BIND_PARAMS / columns.max(1)).max(1)
}

impl ChunkWriter for PgChunkWriter {
    async fn write_chunk(
        &mut self,
        stmt: &InsertStatement,
        table: &StagedTable,
        rows: Range<usize>,
    ) -> Result<()> {
        let step = rows_per_statement(stmt.columns.len());
        let mut tx = self.conn.begin().await?;

        let mut start = rows.start;
        while start < rows.end {
            let end = (start + step).min(rows.end);

            let mut qb: QueryBuilder<'_, Postgres> = QueryBuilder::new(stmt.prefix.as_str());
            qb.push_values(start..end, |mut b, row| {
                for col in table.columns() {
                    match &col.data {
                        ColumnData::Text(v) => b.push_bind(v[row].clone()),
                        ColumnData::Float(v) => b.push_bind(v[row]),
                        ColumnData::Int(v) => b.push_bind(v[row]),
                        ColumnData::Bool(v) => b.push_bind(v[row]),
                        // TIMESTAMP columns hold UTC wall-clock time.
                        ColumnData::Timestamp(v) => b.push_bind(v[row].map(|t| t.naive_utc())),
                    };
                }
            });

            if let Err(e) = qb.build().execute(&mut *tx).await {
                if let Err(rb) = tx.rollback().await {
                    warn!("Rollback after failed insert also failed: {rb}");
                }
                return Err(e.into());
            }
            debug!(rows = end - start, "statement executed");
            start = end;
        }

        tx.commit().await?;
        Ok(())
    }
}
