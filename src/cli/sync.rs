use crate::config::Config;
use crate::error::Result;
use crate::fmt::seconds;
use crate::loader::{Fallback, LoadOptions, LoadReport};
use crate::pipeline::{run_sync, SyncSummary};
use crate::schema::Reconciled;

pub fn run(chunk_size: usize, no_fallback: bool) -> Result<()> {
    let config = Config::from_env()?;
    let options = LoadOptions {
        chunk_size,
        on_batch_error: if no_fallback { Fallback::Abort } else { Fallback::RowByRow },
    };
    let summary = run_sync(&config, &options)?;
    print_summary(&summary);
    Ok(())
}

fn print_summary(summary: &SyncSummary) {
    println!("Fetched:     {}", summary.fetched);
    match &summary.schema {
        Reconciled::Created => println!("Table:       created"),
        Reconciled::Altered(added) => println!("Table:       added {}", added.join(", ")),
        Reconciled::Unchanged => println!("Table:       up to date"),
    }
    match &summary.report {
        LoadReport::Empty => println!("Inserted:    0 (nothing to load)"),
        LoadReport::Batch { rows, elapsed } => {
            println!("Inserted:    {rows} (batch, {})", seconds(*elapsed));
        }
        LoadReport::Fallback { stats, .. } => {
            println!("Inserted:    {} (row by row)", stats.success);
            println!("Duplicates:  {}", stats.duplicates);
            println!("Errors:      {}", stats.errors);
        }
    }
    println!("Elapsed:     {}", seconds(summary.elapsed));
}
