use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{FinsyncError, Result};

pub const DEFAULT_API_URL: &str =
    "https://myfin-financial-management.bubbleapps.io/api/1.1/obj/transactions";
pub const DEFAULT_EXPORT_PATH: &str = "FTransactions.xlsx";

const DEFAULT_API_TIMEOUT_SECS: u64 = 30;
const DEFAULT_POOL_RECYCLE_SECS: u64 = 3600;
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5000;

/// Everything a sync run needs, resolved once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub api: ApiConfig,
    pub database: DatabaseConfig,
}

#[derive(Clone)]
pub struct ApiConfig {
    pub url: String,
    pub token: String,
    pub timeout: Duration,
}

#[derive(Clone)]
pub struct DatabaseConfig {
    pub user: String,
    pub password: String,
    pub host: String,
    pub name: String,
    /// A connection idle for longer than this is reopened before use.
    pub pool_recycle: Duration,
    pub busy_timeout: Duration,
}

impl fmt::Debug for ApiConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiConfig")
            .field("url", &self.url)
            .field("token", &"<redacted>")
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("host", &self.host)
            .field("name", &self.name)
            .field("pool_recycle", &self.pool_recycle)
            .field("busy_timeout", &self.busy_timeout)
            .finish()
    }
}

impl DatabaseConfig {
    /// SQLite file backing the database: `<host>/<name>.db`.
    pub fn path(&self) -> PathBuf {
        PathBuf::from(&self.host).join(format!("{}.db", self.name))
    }

    /// Connection descriptor safe for logs (no password).
    pub fn descriptor(&self) -> String {
        format!("sqlite://{}@{}/{}", self.user, self.host, self.name)
    }
}

/// Load a dotenv file into the process environment. An explicit path must
/// exist; the default `.env` is optional.
pub fn load_env_file(env_file: Option<&Path>) -> Result<()> {
    match env_file {
        Some(path) => {
            dotenvy::from_path(path)
                .map_err(|e| FinsyncError::Config(format!("cannot read {}: {e}", path.display())))?;
        }
        None => match dotenvy::dotenv() {
            Ok(_) => {}
            Err(e) if e.not_found() => {}
            Err(e) => return Err(FinsyncError::Config(format!("cannot read .env: {e}"))),
        },
    }
    Ok(())
}

fn process_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(&process_env)
    }

    pub fn from_lookup(lookup: &dyn Fn(&str) -> Option<String>) -> Result<Self> {
        Ok(Self {
            api: ApiConfig::from_lookup(lookup)?,
            database: DatabaseConfig::from_lookup(lookup)?,
        })
    }
}

impl ApiConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(&process_env)
    }

    pub fn from_lookup(lookup: &dyn Fn(&str) -> Option<String>) -> Result<Self> {
        Ok(Self {
            url: lookup("API_URL")
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_API_URL.to_string()),
            token: required(lookup, "API_TOKEN", false)?,
            timeout: Duration::from_secs(optional_u64(lookup, "API_TIMEOUT_SECS", DEFAULT_API_TIMEOUT_SECS)?),
        })
    }
}

impl DatabaseConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(&process_env)
    }

    pub fn from_lookup(lookup: &dyn Fn(&str) -> Option<String>) -> Result<Self> {
        Ok(Self {
            user: required(lookup, "DB_USER", false)?,
            password: required(lookup, "DB_PASSWORD", true)?,
            host: required(lookup, "DB_HOST", false)?,
            name: required(lookup, "DB_NAME", false)?,
            pool_recycle: Duration::from_secs(optional_u64(
                lookup,
                "DB_POOL_RECYCLE_SECS",
                DEFAULT_POOL_RECYCLE_SECS,
            )?),
            busy_timeout: Duration::from_millis(optional_u64(
                lookup,
                "DB_BUSY_TIMEOUT_MS",
                DEFAULT_BUSY_TIMEOUT_MS,
            )?),
        })
    }
}

/// `EXPORT_PATH` from the process environment, or the default file name.
pub fn export_path_from_env() -> PathBuf {
    export_path(&process_env)
}

pub fn export_path(lookup: &dyn Fn(&str) -> Option<String>) -> PathBuf {
    lookup("EXPORT_PATH")
        .filter(|v| !v.trim().is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_EXPORT_PATH))
}

fn required(lookup: &dyn Fn(&str) -> Option<String>, key: &str, allow_empty: bool) -> Result<String> {
    match lookup(key) {
        Some(v) if allow_empty || !v.trim().is_empty() => Ok(v),
        Some(_) => Err(FinsyncError::Config(format!("{key} is set but empty"))),
        None => Err(FinsyncError::Config(format!("{key} is not set"))),
    }
}

fn optional_u64(lookup: &dyn Fn(&str) -> Option<String>, key: &str, default: u64) -> Result<u64> {
    match lookup(key) {
        Some(v) if !v.trim().is_empty() => v
            .trim()
            .parse()
            .map_err(|_| FinsyncError::Config(format!("{key} must be a non-negative integer, got `{v}`"))),
        _ => Ok(default),
    }
}
