pub mod export;
pub mod status;
pub mod sync;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::loader::DEFAULT_CHUNK_SIZE;

#[derive(Parser)]
#[command(
    name = "finsync",
    version,
    about = "Sync financial transactions from the MyFinance API into a local database."
)]
pub struct Cli {
    /// Load environment variables from this file instead of ./.env
    #[arg(long = "env-file", global = true)]
    pub env_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Fetch all transactions and append them to the database (default).
    Sync {
        /// Rows per multi-row INSERT statement
        #[arg(long = "chunk-size", default_value_t = DEFAULT_CHUNK_SIZE)]
        chunk_size: usize,
        /// Fail instead of retrying row by row when the batch insert fails
        #[arg(long = "no-fallback")]
        no_fallback: bool,
    },
    /// Fetch all transactions and write them to a spreadsheet.
    Export {
        /// Output path (default: $EXPORT_PATH or FTransactions.xlsx)
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Show the database location and the state of the transactions table.
    Status,
}
