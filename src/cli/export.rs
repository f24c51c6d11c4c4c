use std::path::PathBuf;

use crate::api::ApiClient;
use crate::config::{export_path_from_env, ApiConfig};
use crate::error::Result;
use crate::export::export_records;

pub fn run(output: Option<PathBuf>) -> Result<()> {
    let api = ApiConfig::from_env()?;
    let path = output.unwrap_or_else(export_path_from_env);
    let records = ApiClient::new(&api)?.fetch_records()?;
    let summary = export_records(&records, &path)?;
    println!(
        "Wrote {} ({} rows, {} columns)",
        summary.path.display(),
        summary.rows,
        summary.columns
    );
    Ok(())
}
