mod config;
mod db;
mod error;
mod loader;
mod storage;
mod table;
mod types;

use clap::{Parser, Subcommand};
use sqlx::Connection;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::{Config, VERIFY_DEFAULT_LIMIT};
use crate::db::PgWarehouse;
use crate::error::Result;
use crate::loader::run_load;
use crate::storage::S3Source;
use crate::types::LoadOutcome;

#[derive(Parser)]
#[command(
    name = "market-loader",
    about = "Loads processed market snapshots from S3 into the fact_market_data warehouse table"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Read processed Parquet files and insert them into the warehouse (default).
    Load,
    /// Create the warehouse table if it does not exist.
    InitDb,
    /// Show the most recently loaded rows.
    Verify {
        /// Number of rows to show.
        #[arg(long, default_value_t = VERIFY_DEFAULT_LIMIT, value_parser = clap::value_parser!(i64).range(1..))]
        limit: i64,

        /// Print one JSON object per row instead of a grid.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let cfg = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Config error: {e}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&cfg.log_level))
        .init();

    let result = match cli.command.unwrap_or(Commands::Load) {
        Commands::Load => load(&cfg).await,
        Commands::InitDb => init_db(&cfg).await,
        Commands::Verify { limit, json } => verify(&cfg, limit, json).await,
    };

    if let Err(e) = result {
        error!("FAILED: {e}");
        std::process::exit(1);
    }
}

async fn load(cfg: &Config) -> Result<()> {
    let source = S3Source::from_env().await;
    let warehouse = PgWarehouse::new(cfg.db.clone());

    let outcome = run_load(cfg, &source, &warehouse).await?;
    let files = match outcome {
        LoadOutcome::NothingToLoad => 0,
        LoadOutcome::Loaded { files, .. } => files,
    };
    info!(
        files,
        rows = outcome.rows_inserted(),
        table = %cfg.warehouse_table,
        "SUCCESS: pipeline finished"
    );
    Ok(())
}

async fn init_db(cfg: &Config) -> Result<()> {
    let mut conn = db::connect(&cfg.db).await?;
    db::schema::verify_connection(&mut conn).await?;
    let created = db::schema::ensure_table(&mut conn, &cfg.warehouse_table).await;
    close(conn).await;
    created
}

async fn verify(cfg: &Config, limit: i64, json: bool) -> Result<()> {
    let mut conn = db::connect(&cfg.db).await?;
    let fetched = db::verify::recent_snapshots(&mut conn, &cfg.warehouse_table, limit).await;
    close(conn).await;
    let records = fetched?;

    if records.is_empty() {
        println!("The table is empty.");
    } else if json {
        print!("{}", db::verify::render_json_lines(&records)?);
    } else {
        println!("\n--- Recent Records in {} ---", cfg.warehouse_table);
        print!("{}", db::verify::render_grid(&records));
    }
    Ok(())
}

async fn close(conn: sqlx::PgConnection) {
    if let Err(e) = conn.close().await {
        warn!("Closing database connection failed: {e}");
    }
}
