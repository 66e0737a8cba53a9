use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    /// Object listing, fetch or Parquet decode failed. Nothing was staged.
    #[error("Source unavailable: {0}")]
    SourceUnavailable(String),

    /// A metric column was null in every row of a non-empty batch.
    #[error("Data integrity error: columns {columns:?} are entirely NULL")]
    IntegrityViolation { columns: Vec<String> },

    /// A chunk insert failed. Chunks before it stay committed.
    #[error("Batch insert failed after {rows_committed} committed rows: {source}")]
    InsertFailure {
        rows_committed: u64,
        #[source]
        source: Box<AppError>,
    },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Parquet error: {0}")]
    Parquet(#[from] polars::error::PolarsError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, AppError>;
