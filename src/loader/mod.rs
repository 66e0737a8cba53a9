//! Batch loader: processed Parquet files in object storage → warehouse table.
//!
//! One run is strictly sequential: read every file, validate the stacked
//! table, then insert it chunk by chunk over a single connection. There are
//! two early exits (nothing to load, failed integrity check) and no retries.

pub mod clean;
pub mod insert;
pub mod reader;

pub use clean::{validate_and_clean, Validation};
pub use insert::{insert_in_batches, ChunkWriter, InsertStatement};
pub use reader::list_and_read;

use tracing::{error, info, warn};

use crate::config::Config;
use crate::error::{AppError, Result};
use crate::storage::ObjectSource;
use crate::types::LoadOutcome;

/// Opens the exclusive connection a run inserts through.
#[allow(async_fn_in_trait)]
pub trait Warehouse {
    type Writer: ChunkWriter;

    async fn connect(&self) -> Result<Self::Writer>;

    async fn release(&self, writer: Self::Writer) -> Result<()>;
}

/// Runs one load. The connection is only opened once there is validated data
/// to insert, and is released whether or not the insert succeeds.
pub async fn run_load<S, W>(cfg: &Config, source: &S, warehouse: &W) -> Result<LoadOutcome>
where
    S: ObjectSource,
    W: Warehouse,
{
    info!(
        "Starting load: s3://{}/{} -> {}",
        cfg.s3_bucket, cfg.s3_prefix, cfg.warehouse_table
    );

    let (table, files) = list_and_read(source, &cfg.s3_bucket, &cfg.s3_prefix).await?;
    if table.is_empty() {
        info!("Nothing to load ({files} file(s), 0 rows)");
        return Ok(LoadOutcome::NothingToLoad);
    }

    let table = match validate_and_clean(table) {
        Validation::Clean(t) => t,
        Validation::Rejected { columns } => {
            error!("Stopping: data failed integrity check.");
            return Err(AppError::IntegrityViolation { columns });
        }
    };

    let mut writer = warehouse.connect().await?;
    let inserted = insert_in_batches(&mut writer, &table, &cfg.warehouse_table, cfg.batch_size).await;
    if let Err(e) = warehouse.release(writer).await {
        warn!("Closing warehouse connection failed: {e}");
    }
    info!("Resources cleaned up.");

    let rows = inserted?;
    info!("Load succeeded: {rows} rows loaded into {}", cfg.warehouse_table);
    Ok(LoadOutcome::Loaded { files, rows })
}
