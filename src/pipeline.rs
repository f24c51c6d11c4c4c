use std::time::{Duration, Instant};

use tracing::info;

use crate::api::ApiClient;
use crate::config::Config;
use crate::db::Database;
use crate::error::Result;
use crate::loader::{self, LoadOptions, LoadReport};
use crate::normalize::normalize;
use crate::schema::{self, Reconciled, TRANSACTIONS_SCHEMA, TRANSACTIONS_TABLE};

#[derive(Debug, Clone, PartialEq)]
pub struct SyncSummary {
    pub fetched: usize,
    pub schema: Reconciled,
    pub report: LoadReport,
    pub elapsed: Duration,
}

/// Fetch every transaction, bring the table up to the expected shape, and
/// append the records. Stops at the first stage that fails.
pub fn run_sync(config: &Config, options: &LoadOptions) -> Result<SyncSummary> {
    let start = Instant::now();
    info!("sync started");

    let client = ApiClient::new(&config.api)?;
    let records = client.fetch_records()?;
    let fetched = records.len();
    let record_set = normalize(records);

    let mut db = Database::open(&config.database)?;
    let conn = db.conn()?;
    let schema = schema::reconcile(conn, TRANSACTIONS_TABLE, TRANSACTIONS_SCHEMA)?;
    let report = loader::load(conn, &record_set, TRANSACTIONS_TABLE, options)?;

    let elapsed = start.elapsed();
    info!(
        fetched,
        inserted = report.inserted(),
        elapsed_secs = elapsed.as_secs_f64(),
        "sync completed"
    );
    Ok(SyncSummary {
        fetched,
        schema,
        report,
        elapsed,
    })
}
