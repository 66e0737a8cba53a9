use sqlx::postgres::PgConnection;
use tracing::info;

use crate::error::{AppError, Result};
use crate::loader::insert::quote_qualified;

/// DDL for the warehouse table. No key or uniqueness: inserts only append.
pub fn create_table_sql(table: &str) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {} (
    coin_id VARCHAR(255),
    coin_symbol VARCHAR(50),
    price_usd DOUBLE PRECISION,
    market_cap_usd DOUBLE PRECISION,
    volume_24h_usd DOUBLE PRECISION,
    source_timestamp TIMESTAMP,
    load_date TIMESTAMP
)",
        quote_qualified(table)
    )
}

/// Round-trips `SELECT 1` to prove the session is usable.
pub async fn verify_connection(conn: &mut PgConnection) -> Result<()> {
    let one: i32 = sqlx::query_scalar("SELECT 1").fetch_one(&mut *conn).await?;
    if one != 1 {
        return Err(AppError::Database(sqlx::Error::Protocol(format!(
            "SELECT 1 returned {one}"
        ))));
    }
    info!("Connection verified");
    Ok(())
}

/// Creates the warehouse table if it does not exist yet. Safe to re-run.
pub async fn ensure_table(conn: &mut PgConnection, table: &str) -> Result<()> {
    let ddl = create_table_sql(table);
    sqlx::query(&ddl).execute(&mut *conn).await?;
    info!("Table {table} created (or already exists)");
    Ok(())
}
