use sqlx::postgres::PgConnection;

use crate::db::models::SnapshotRow;
use crate::error::Result;
use crate::loader::insert::quote_qualified;
use crate::types::{MarketSnapshotRecord, SNAPSHOT_COLUMNS};

/// Most recently loaded rows, newest `load_date` first. Read-only.
pub async fn recent_snapshots(
    conn: &mut PgConnection,
    table: &str,
    limit: i64,
) -> Result<Vec<MarketSnapshotRecord>> {
    let sql = format!(
        "SELECT {} FROM {} ORDER BY load_date DESC LIMIT $1",
        SNAPSHOT_COLUMNS.join(", "),
        quote_qualified(table)
    );
    let rows: Vec<SnapshotRow> = sqlx::query_as(&sql).bind(limit).fetch_all(&mut *conn).await?;
    Ok(rows.into_iter().map(MarketSnapshotRecord::from).collect())
}

/// One JSON object per line.
pub fn render_json_lines(records: &[MarketSnapshotRecord]) -> Result<String> {
    let mut out = String::new();
    for r in records {
        out.push_str(&serde_json::to_string(r)?);
        out.push('\n');
    }
    Ok(out)
}

/// Boxed text grid with a header row, e.g.
///
/// ```text
/// +---------+-----------+
/// | coin_id | price_usd |
/// +=========+===========+
/// | bitcoin | 64000.5   |
/// +---------+-----------+
/// ```
pub fn render_grid(records: &[MarketSnapshotRecord]) -> String {
    let cells: Vec<[String; 7]> = records.iter().map(row_cells).collect();

    let mut widths: Vec<usize> = SNAPSHOT_COLUMNS.iter().map(|h| h.len()).collect();
    for row in &cells {
        for (w, cell) in widths.iter_mut().zip(row.iter()) {
            *w = (*w).max(cell.chars().count());
        }
    }

    let mut out = grid_rule(&widths, '-');
    out.push_str(&grid_line(SNAPSHOT_COLUMNS.iter().copied(), &widths));
    out.push_str(&grid_rule(&widths, '='));
    for row in &cells {
        out.push_str(&grid_line(row.iter().map(String::as_str), &widths));
        out.push_str(&grid_rule(&widths, '-'));
    }
    out
}

fn grid_rule(widths: &[usize], fill: char) -> String {
    let mut line = String::from("+");
    for &w in widths {
        line.extend(std::iter::repeat(fill).take(w + 2));
        line.push('+');
    }
    line.push('\n');
    line
}

fn grid_line<'a>(values: impl Iterator<Item = &'a str>, widths: &[usize]) -> String {
    let mut line = String::from("|");
    for (value, &w) in values.zip(widths) {
        line.push_str(&format!(" {value:<w$} |"));
    }
    line.push('\n');
    line
}

fn row_cells(r: &MarketSnapshotRecord) -> [String; 7] {
    let opt = |v: Option<String>| v.unwrap_or_default();
    [
        r.coin_id.clone(),
        opt(r.coin_symbol.clone()),
        opt(r.price_usd.map(|v| v.to_string())),
        opt(r.market_cap_usd.map(|v| v.to_string())),
        opt(r.volume_24h_usd.map(|v| v.to_string())),
        opt(r.source_timestamp.map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())),
        opt(r.load_date.map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())),
    ]
}
