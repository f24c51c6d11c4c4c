use std::collections::HashSet;

use rusqlite::Connection;
use tracing::info;

use crate::error::{FinsyncError, Result};
use crate::models;

pub const TRANSACTIONS_TABLE: &str = "transactions";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    DateTime,
    String,
    Decimal,
    Integer,
}

impl ColumnType {
    /// Type name as written into DDL.
    pub fn compile(&self) -> &'static str {
        match self {
            Self::DateTime => "DATETIME",
            Self::String => "VARCHAR(255)",
            Self::Decimal => "DECIMAL(10, 2)",
            Self::Integer => "INTEGER",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnDef {
    pub name: &'static str,
    pub ty: ColumnType,
    pub primary_key: bool,
}

const fn col(name: &'static str, ty: ColumnType) -> ColumnDef {
    ColumnDef { name, ty, primary_key: false }
}

pub const TRANSACTIONS_SCHEMA: &[ColumnDef] = &[
    col(models::MODIFIED_DATE, ColumnType::DateTime),
    col(models::CREATED_DATE, ColumnType::DateTime),
    col(models::CREATED_BY, ColumnType::String),
    col(models::ESTIMATED_DATE, ColumnType::DateTime),
    col(models::RECIPIENT_REF, ColumnType::String),
    col(models::STATUS, ColumnType::String),
    col(models::AMOUNT, ColumnType::Decimal),
    col(models::YEAR_REF, ColumnType::Integer),
    col(models::PAYMENT_DATE, ColumnType::DateTime),
    col(models::TRANSACTION_TYPE, ColumnType::String),
    col(models::USER_REF, ColumnType::String),
    col(models::COD_REF, ColumnType::String),
    col(models::MONTH_REF, ColumnType::Integer),
    col(models::FREQUENCY_TYPE, ColumnType::String),
    ColumnDef { name: models::ID, ty: ColumnType::String, primary_key: true },
];

/// Quote an identifier for SQLite; column names contain spaces and dashes.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

pub fn table_exists(conn: &Connection, table: &str) -> Result<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1)",
        [table],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

/// Column names of `table` in declaration order; empty when the table is absent.
pub fn table_columns(conn: &Connection, table: &str) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", quote_ident(table)))?;
    let columns = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(columns)
}

pub fn create_table_sql(table: &str, schema: &[ColumnDef]) -> String {
    let columns: Vec<String> = schema
        .iter()
        .map(|c| {
            if c.primary_key {
                format!("    {} {} NOT NULL PRIMARY KEY", quote_ident(c.name), c.ty.compile())
            } else {
                format!("    {} {}", quote_ident(c.name), c.ty.compile())
            }
        })
        .collect();
    format!("CREATE TABLE {} (\n{}\n)", quote_ident(table), columns.join(",\n"))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reconciled {
    Created,
    Altered(Vec<String>),
    Unchanged,
}

/// Make sure `table` carries every column in `schema`. Only ever adds
/// columns; existing columns and rows are left alone. Not guarded against a
/// second process reconciling the same table at the same time.
pub fn reconcile(conn: &mut Connection, table: &str, schema: &[ColumnDef]) -> Result<Reconciled> {
    if !table_exists(conn, table)? {
        info!(table, "creating table");
        conn.execute_batch(&create_table_sql(table, schema))?;
        return Ok(Reconciled::Created);
    }

    info!(table, "checking existing table structure");
    let existing: HashSet<String> = table_columns(conn, table)?.into_iter().collect();
    let missing: Vec<&ColumnDef> = schema
        .iter()
        .filter(|c| !existing.contains(c.name))
        .collect();
    if missing.is_empty() {
        return Ok(Reconciled::Unchanged);
    }

    let tx = conn.transaction()?;
    for column in &missing {
        let ty = column.ty.compile();
        info!(column = column.name, ty, "adding column");
        tx.execute_batch(&format!(
            "ALTER TABLE {} ADD COLUMN {} {}",
            quote_ident(table),
            quote_ident(column.name),
            ty
        ))
        .map_err(|e| FinsyncError::Schema(format!("adding column `{}` to `{table}`: {e}", column.name)))?;
    }
    tx.commit()?;

    Ok(Reconciled::Altered(missing.iter().map(|c| c.name.to_string()).collect()))
}
