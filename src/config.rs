use std::fmt;
use std::time::Duration;

use crate::error::{AppError, Result};

pub const S3_BUCKET: &str = "crypto-etl-bucket";
pub const S3_PREFIX: &str = "processed/fact_market_data/";

/// Only keys with this suffix are treated as processed files. Spark also
/// drops `_SUCCESS` markers and `.crc` sidecars under the same prefix.
pub const PARQUET_SUFFIX: &str = ".parquet";

pub const WAREHOUSE_TABLE: &str = "fact_market_data";

/// Rows per committed insert chunk.
pub const DEFAULT_BATCH_SIZE: usize = 1000;

pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// PostgreSQL rejects statements with more bind parameters than this.
pub const PG_MAX_BIND_PARAMS: usize = 65_535;

/// Rows shown by `verify` when `--limit` is not given.
pub const VERIFY_DEFAULT_LIMIT: i64 = 5;

/// Database password. `Debug` never prints the value.
#[derive(Clone)]
pub struct Password(String);

impl Password {
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Password {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Password(***)")
    }
}

#[derive(Debug, Clone)]
pub struct DbConfig {
    pub host: String,
    pub port: u16,
    pub name: String,
    pub user: String,
    pub password: Password,
    pub connect_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    /// Bucket holding the processed files (S3_BUCKET)
    pub s3_bucket: String,
    /// Key prefix of the processed files (S3_PREFIX)
    pub s3_prefix: String,
    pub db: DbConfig,
    /// Target table, optionally schema-qualified (WAREHOUSE_TABLE)
    pub warehouse_table: String,
    /// Rows per committed chunk (BATCH_SIZE), always >= 1
    pub batch_size: usize,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let password = var("DB_PASSWORD").ok_or_else(|| {
            AppError::Config("DB_PASSWORD environment variable is required but not set".to_string())
        })?;

        let port = var("DB_PORT")
            .unwrap_or_else(|| "5432".to_string())
            .parse::<u16>()
            .map_err(|_| AppError::Config("DB_PORT must be a valid port number".to_string()))?;

        let connect_timeout_secs = match var("DB_CONNECT_TIMEOUT_SECS") {
            Some(v) => v.parse::<u64>().map_err(|_| {
                AppError::Config("DB_CONNECT_TIMEOUT_SECS must be a whole number of seconds".to_string())
            })?,
            None => DEFAULT_CONNECT_TIMEOUT_SECS,
        };

        let batch_size = match var("BATCH_SIZE") {
            Some(v) => v
                .parse::<usize>()
                .map_err(|_| AppError::Config("BATCH_SIZE must be a positive integer".to_string()))?,
            None => DEFAULT_BATCH_SIZE,
        };
        if batch_size == 0 {
            return Err(AppError::Config("BATCH_SIZE must be at least 1".to_string()));
        }

        let warehouse_table = var("WAREHOUSE_TABLE").unwrap_or_else(|| WAREHOUSE_TABLE.to_string());
        if warehouse_table.split('.').any(|part| part.is_empty()) || warehouse_table.split('.').count() > 2 {
            return Err(AppError::Config(format!(
                "WAREHOUSE_TABLE must be `table` or `schema.table`, got {warehouse_table:?}"
            )));
        }

        Ok(Self {
            log_level: var("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            s3_bucket: var("S3_BUCKET").unwrap_or_else(|| S3_BUCKET.to_string()),
            s3_prefix: var("S3_PREFIX").unwrap_or_else(|| S3_PREFIX.to_string()),
            db: DbConfig {
                host: var("DB_HOST").unwrap_or_else(|| "localhost".to_string()),
                port,
                name: var("DB_NAME").unwrap_or_else(|| "postgres".to_string()),
                user: var("DB_USER").unwrap_or_else(|| "postgres".to_string()),
                password: Password(password),
                connect_timeout: Duration::from_secs(connect_timeout_secs),
            },
            warehouse_table,
            batch_size,
        })
    }
}
