pub mod models;
pub mod schema;
pub mod verify;
pub mod writer;

pub use writer::PgChunkWriter;

use std::io;

use sqlx::postgres::{PgConnectOptions, PgConnection};
use sqlx::Connection;
use tracing::info;

use crate::config::DbConfig;
use crate::error::{AppError, Result};
use crate::loader::Warehouse;

/// Opens one PostgreSQL connection, failing after `connect_timeout`.
pub async fn connect(db: &DbConfig) -> Result<PgConnection> {
    info!("Attempting to connect to database: {} at {}:{}", db.name, db.host, db.port);
    let opts = PgConnectOptions::new()
        .host(&db.host)
        .port(db.port)
        .database(&db.name)
        .username(&db.user)
        .password(db.password.expose());

    let conn = tokio::time::timeout(db.connect_timeout, PgConnection::connect_with(&opts))
        .await
        .map_err(|_| {
            AppError::Database(sqlx::Error::Io(io::Error::new(
                io::ErrorKind::TimedOut,
                format!("no connection to {}:{} within {:?}", db.host, db.port, db.connect_timeout),
            )))
        })??;

    info!("Successfully connected to database: {}", db.name);
    Ok(conn)
}

/// PostgreSQL warehouse. Each run gets its own connection.
pub struct PgWarehouse {
    db: DbConfig,
}

impl PgWarehouse {
    pub fn new(db: DbConfig) -> Self {
        Self { db }
    }
}

impl Warehouse for PgWarehouse {
    type Writer = PgChunkWriter;

    async fn connect(&self) -> Result<PgChunkWriter> {
        Ok(PgChunkWriter::new(connect(&self.db).await?))
    }

    async fn release(&self, writer: PgChunkWriter) -> Result<()> {
        writer.into_inner().close().await?;
        Ok(())
    }
}
