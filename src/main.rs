mod api;
mod cli;
mod config;
mod db;
mod error;
mod export;
mod fmt;
mod loader;
mod models;
mod normalize;
mod pipeline;
mod schema;

use std::io::IsTerminal;

use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Commands};

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_ansi(std::io::stderr().is_terminal())
        .init();
}

fn main() {
    let cli = Cli::parse();

    // Read the dotenv file before the subscriber so RUST_LOG in it applies.
    let env_loaded = config::load_env_file(cli.env_file.as_deref());
    init_tracing();

    let result = env_loaded.and_then(|()| match cli.command {
        None => cli::sync::run(loader::DEFAULT_CHUNK_SIZE, false),
        Some(Commands::Sync {
            chunk_size,
            no_fallback,
        }) => cli::sync::run(chunk_size, no_fallback),
        Some(Commands::Export { output }) => cli::export::run(output),
        Some(Commands::Status) => cli::status::run(),
    });

    if let Err(e) = result {
        error!("{e}");
        std::process::exit(1);
    }
}
