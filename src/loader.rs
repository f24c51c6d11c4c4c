use std::time::{Duration, Instant};

use rusqlite::{ffi, params_from_iter, Connection, ErrorCode};
use tracing::{info, warn};

use crate::error::{FinsyncError, Result};
use crate::models::{RecordSet, Transaction};
use crate::schema::{quote_ident, table_columns};

pub const DEFAULT_CHUNK_SIZE: usize = 1000;
pub const MAX_ERROR_EXAMPLES: usize = 3;

// Default SQLITE_MAX_VARIABLE_NUMBER of the bundled library.
const MAX_BOUND_PARAMETERS: usize = 32_766;

/// What to do when the batch attempt fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fallback {
    /// Retry every record on its own and classify each outcome.
    RowByRow,
    /// Return the batch error.
    Abort,
}

#[derive(Debug, Clone, Copy)]
pub struct LoadOptions {
    pub chunk_size: usize,
    pub on_batch_error: Fallback,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            on_batch_error: Fallback::RowByRow,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowOutcome {
    Inserted,
    Duplicate,
    Failed(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FallbackStats {
    pub success: usize,
    pub duplicates: usize,
    pub errors: usize,
    /// The first few error messages, for the summary.
    pub error_examples: Vec<String>,
}

impl FallbackStats {
    pub fn record(&mut self, outcome: RowOutcome) {
        match outcome {
            RowOutcome::Inserted => self.success += 1,
            RowOutcome::Duplicate => self.duplicates += 1,
            RowOutcome::Failed(message) => {
                self.errors += 1;
                if self.error_examples.len() < MAX_ERROR_EXAMPLES {
                    self.error_examples.push(message);
                }
            }
        }
    }

    pub fn attempted(&self) -> usize {
        self.success + self.duplicates + self.errors
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum LoadReport {
    /// Nothing was fetched, so nothing was written.
    Empty,
    Batch { rows: usize, elapsed: Duration },
    Fallback { batch_error: String, stats: FallbackStats },
}

impl LoadReport {
    pub fn inserted(&self) -> usize {
        match self {
            Self::Empty => 0,
            Self::Batch { rows, .. } => *rows,
            Self::Fallback { stats, .. } => stats.success,
        }
    }
}

/// Fields present both in the record set and in the table, in record-set order.
pub fn usable_columns(fields: &[String], table_columns: &[String]) -> Vec<String> {
    fields
        .iter()
        .filter(|f| table_columns.contains(*f))
        .cloned()
        .collect()
}

fn insert_sql(table: &str, columns: &[String], rows: usize) -> String {
    let column_list: Vec<String> = columns.iter().map(|c| quote_ident(c)).collect();
    let row = format!("({})", vec!["?"; columns.len()].join(", "));
    format!(
        "INSERT INTO {} ({}) VALUES {}",
        quote_ident(table),
        column_list.join(", "),
        vec![row.as_str(); rows].join(", ")
    )
}

fn is_duplicate(err: &rusqlite::Error) -> bool {
    let rusqlite::Error::SqliteFailure(e, message) = err else {
        return false;
    };
    if e.code != ErrorCode::ConstraintViolation {
        return false;
    }
    if e.extended_code == ffi::SQLITE_CONSTRAINT_PRIMARYKEY
        || e.extended_code == ffi::SQLITE_CONSTRAINT_UNIQUE
    {
        return true;
    }
    message.as_deref().is_some_and(|m| {
        let m = m.to_lowercase();
        m.contains("duplicate") || m.contains("unique constraint failed")
    })
}

/// Sort a failed row insert into duplicate vs. any other failure.
pub fn classify(err: &rusqlite::Error) -> RowOutcome {
    if is_duplicate(err) {
        RowOutcome::Duplicate
    } else {
        RowOutcome::Failed(err.to_string())
    }
}

/// All-or-nothing multi-row insert. Each chunk is one `INSERT ... VALUES`
/// statement; the whole load shares one transaction. A record holding a value
/// its column cannot store fails the batch before anything is written.
pub fn insert_batch(
    conn: &mut Connection,
    table: &str,
    columns: &[String],
    transactions: &[Transaction],
    chunk_size: usize,
) -> Result<usize> {
    if let Some(problem) = transactions.iter().find_map(|t| t.problem(columns)) {
        return Err(FinsyncError::InvalidValue(problem));
    }
    let rows_per_statement = chunk_size
        .min(MAX_BOUND_PARAMETERS / columns.len().max(1))
        .max(1);
    let tx = conn.transaction()?;
    for chunk in transactions.chunks(rows_per_statement) {
        let sql = insert_sql(table, columns, chunk.len());
        let values = chunk
            .iter()
            .flat_map(|t| columns.iter().map(move |c| t.value(c)));
        tx.prepare_cached(&sql)?.execute(params_from_iter(values))?;
    }
    tx.commit()?;
    Ok(transactions.len())
}

/// Insert each record on its own, in autocommit mode. Never stops early.
pub fn insert_rows(
    conn: &Connection,
    table: &str,
    columns: &[String],
    transactions: &[Transaction],
) -> FallbackStats {
    let sql = insert_sql(table, columns, 1);
    let mut stats = FallbackStats::default();
    for txn in transactions {
        let outcome = match txn.problem(columns) {
            Some(problem) => RowOutcome::Failed(problem),
            None => {
                let result = conn.prepare_cached(&sql).and_then(|mut stmt| {
                    stmt.execute(params_from_iter(columns.iter().map(|c| txn.value(c))))
                });
                match result {
                    Ok(_) => RowOutcome::Inserted,
                    Err(e) => classify(&e),
                }
            }
        };
        if let RowOutcome::Failed(message) = &outcome {
            tracing::debug!(id = %txn.label(), error = %message, "row insert failed");
        }
        stats.record(outcome);
    }
    stats
}

fn log_summary(stats: &FallbackStats) {
    info!(
        attempted = stats.attempted(),
        success = stats.success,
        duplicates = stats.duplicates,
        errors = stats.errors,
        "row-by-row insert summary"
    );
    if stats.errors > 0 {
        warn!(examples = ?stats.error_examples, "example insert errors");
    }
}

/// Append the record set to `table`: batch first, then per-row if the batch
/// fails and the options allow it.
pub fn load(
    conn: &mut Connection,
    records: &RecordSet,
    table: &str,
    options: &LoadOptions,
) -> Result<LoadReport> {
    if records.is_empty() {
        info!("no records to load");
        return Ok(LoadReport::Empty);
    }

    let existing = table_columns(conn, table)?;
    let columns = usable_columns(&records.fields, &existing);
    if columns.is_empty() {
        return Err(FinsyncError::SchemaMismatch(table.to_string()));
    }
    let ignored = records.fields.len() - columns.len();
    if ignored > 0 {
        info!(ignored, "fields without a matching column are skipped");
    }

    info!(rows = records.len(), columns = columns.len(), "starting batch insert");
    let start = Instant::now();
    match insert_batch(conn, table, &columns, &records.transactions, options.chunk_size) {
        Ok(rows) => {
            let elapsed = start.elapsed();
            info!(rows, elapsed_secs = elapsed.as_secs_f64(), "batch insert finished");
            Ok(LoadReport::Batch { rows, elapsed })
        }
        Err(e) if options.on_batch_error == Fallback::Abort => Err(e),
        Err(e) => {
            warn!(error = %e, "batch insert failed; falling back to row-by-row inserts");
            let stats = insert_rows(conn, table, &columns, &records.transactions);
            log_summary(&stats);
            Ok(LoadReport::Fallback {
                batch_error: e.to_string(),
                stats,
            })
        }
    }
}
