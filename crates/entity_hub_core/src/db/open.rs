//! Connection bootstrap for the reference entity store.
//!
//! # Invariants
//! - Returned connections have `foreign_keys=ON` so parent rows must exist
//!   before children and outlive them.
//! - Returned connections have migrations fully applied.

use super::migrations::apply_migrations;
use super::{DbError, DbResult};
use log::{error, info};
use rusqlite::Connection;
use std::path::Path;
use std::time::{Duration, Instant};

/// Opens a store database file and applies all pending migrations.
///
/// # Side effects
/// - Emits `store_open` logging events with duration and status.
///
/// # Errors
/// - `DbError::Open` naming the path when SQLite cannot open it.
pub fn open_db(path: impl AsRef<Path>) -> DbResult<Connection> {
    let path = path.as_ref();
    open_with("file", path.display().to_string(), || Connection::open(path))
}

/// Opens an in-memory store database and applies all pending migrations.
pub fn open_db_in_memory() -> DbResult<Connection> {
    open_with("memory", ":memory:".to_string(), Connection::open_in_memory)
}

fn open_with(
    mode: &'static str,
    location: String,
    open: impl FnOnce() -> rusqlite::Result<Connection>,
) -> DbResult<Connection> {
    let started_at = Instant::now();
    info!("event=store_open module=db status=start mode={mode} location={location}");

    let mut conn = match open() {
        Ok(conn) => conn,
        Err(source) => {
            error!(
                "event=store_open module=db status=error mode={mode} location={location} duration_ms={} error_code=db_open_failed error={source}",
                started_at.elapsed().as_millis()
            );
            return Err(DbError::Open { location, source });
        }
    };

    if let Err(err) = bootstrap_connection(&mut conn) {
        error!(
            "event=store_open module=db status=error mode={mode} location={location} duration_ms={} error_code=db_bootstrap_failed error={err}",
            started_at.elapsed().as_millis()
        );
        return Err(err);
    }

    info!(
        "event=store_open module=db status=ok mode={mode} duration_ms={}",
        started_at.elapsed().as_millis()
    );
    Ok(conn)
}

fn bootstrap_connection(conn: &mut Connection) -> DbResult<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(Duration::from_secs(5))?;
    apply_migrations(conn)?;
    Ok(())
}
