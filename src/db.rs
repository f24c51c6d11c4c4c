use std::path::Path;
use std::time::{Duration, Instant};

use rusqlite::Connection;
use tracing::{debug, info, warn};

use crate::config::DatabaseConfig;
use crate::error::{FinsyncError, Result};

pub fn get_connection(db_path: &Path, password: &str, busy_timeout: Duration) -> Result<Connection> {
    let conn = Connection::open(db_path)
        .map_err(|e| FinsyncError::Connection(format!("opening {}: {e}", db_path.display())))?;
    apply_key(&conn, password)?;
    conn.busy_timeout(busy_timeout)?;
    conn.execute_batch("PRAGMA journal_mode=WAL;")
        .map_err(|e| FinsyncError::Connection(format!("initializing {}: {e}", db_path.display())))?;
    Ok(conn)
}

#[cfg(feature = "encryption")]
fn apply_key(conn: &Connection, password: &str) -> Result<()> {
    if !password.is_empty() {
        conn.pragma_update(None, "key", password)?;
    }
    Ok(())
}

#[cfg(not(feature = "encryption"))]
fn apply_key(_conn: &Connection, password: &str) -> Result<()> {
    if !password.is_empty() {
        warn!("DB_PASSWORD is set but this build has no encryption support; ignoring it");
    }
    Ok(())
}

fn ping(conn: &Connection) -> bool {
    conn.query_row("SELECT 1", [], |r| r.get::<_, i64>(0)).is_ok()
}

/// The single destination connection. Validated before every hand-out and
/// reopened once it has sat idle longer than the configured recycle window.
pub struct Database {
    config: DatabaseConfig,
    conn: Connection,
    last_used: Instant,
}

impl Database {
    pub fn open(config: &DatabaseConfig) -> Result<Self> {
        let path = config.path();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                FinsyncError::Connection(format!("creating {}: {e}", parent.display()))
            })?;
        }
        let conn = get_connection(&path, &config.password, config.busy_timeout)?;
        if !ping(&conn) {
            return Err(FinsyncError::Connection(format!(
                "{} did not answer a test query",
                config.descriptor()
            )));
        }
        info!(db = %config.descriptor(), "database connection established");
        Ok(Self {
            config: config.clone(),
            conn,
            last_used: Instant::now(),
        })
    }

    /// Borrow the live connection, recycling it first if it went stale.
    pub fn conn(&mut self) -> Result<&mut Connection> {
        let idle = self.last_used.elapsed();
        if idle > self.config.pool_recycle {
            debug!(idle_secs = idle.as_secs(), "recycling idle connection");
            self.reopen()?;
        } else if !ping(&self.conn) {
            warn!("connection failed validation; reopening");
            self.reopen()?;
        }
        self.last_used = Instant::now();
        Ok(&mut self.conn)
    }

    fn reopen(&mut self) -> Result<()> {
        self.conn = get_connection(&self.config.path(), &self.config.password, self.config.busy_timeout)?;
        Ok(())
    }
}
