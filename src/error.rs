use thiserror::Error;

#[derive(Error, Debug)]
pub enum FinsyncError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("API returned HTTP {0}")]
    HttpStatus(u16),

    #[error("API rejected the token (HTTP {0})")]
    Auth(u16),

    #[error("Unexpected API response: {0}")]
    Decode(String),

    #[error("Database connection error: {0}")]
    Connection(String),

    #[error("Schema error: {0}")]
    Schema(String),

    #[error("No matching columns between fetched records and table `{0}`")]
    SchemaMismatch(String),

    #[error("Invalid value in record {0}")]
    InvalidValue(String),

    #[error("Database error: {0}")]
    Db(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Spreadsheet error: {0}")]
    Export(#[from] rust_xlsxwriter::XlsxError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, FinsyncError>;
