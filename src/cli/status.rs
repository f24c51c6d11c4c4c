use std::collections::HashSet;

use comfy_table::{Cell, Table};

use crate::config::DatabaseConfig;
use crate::db::Database;
use crate::error::Result;
use crate::fmt::format_bytes;
use crate::schema::{quote_ident, table_columns, table_exists, TRANSACTIONS_SCHEMA, TRANSACTIONS_TABLE};

pub fn run() -> Result<()> {
    let config = DatabaseConfig::from_env()?;
    let db_path = config.path();

    println!("Database:   {}", config.descriptor());
    println!("File:       {}", db_path.display());

    if !db_path.exists() {
        println!();
        println!("Database not found. Run `finsync sync` to create it.");
        return Ok(());
    }

    let size = std::fs::metadata(&db_path)?.len();
    println!("DB size:    {}", format_bytes(size));

    let mut db = Database::open(&config)?;
    let conn = db.conn()?;
    if !table_exists(conn, TRANSACTIONS_TABLE)? {
        println!("Table:      {TRANSACTIONS_TABLE} (missing)");
        return Ok(());
    }

    let rows: i64 = conn.query_row(
        &format!("SELECT count(*) FROM {}", quote_ident(TRANSACTIONS_TABLE)),
        [],
        |r| r.get(0),
    )?;
    println!("Table:      {TRANSACTIONS_TABLE}");
    println!("Rows:       {rows}");

    let columns = table_columns(conn, TRANSACTIONS_TABLE)?;
    let defined: HashSet<&str> = TRANSACTIONS_SCHEMA.iter().map(|c| c.name).collect();
    let mut table = Table::new();
    table.set_header(vec!["Column", "State"]);
    for column in &columns {
        let state = if defined.contains(column.as_str()) { "ok" } else { "extra" };
        table.add_row(vec![Cell::new(column), Cell::new(state)]);
    }
    for def in TRANSACTIONS_SCHEMA {
        if !columns.iter().any(|c| c == def.name) {
            table.add_row(vec![Cell::new(def.name), Cell::new("missing")]);
        }
    }
    println!("{table}");

    Ok(())
}
