//! Connection bootstrap utilities for SQLite.
//!
//! # Responsibility
//! - Open the writer connection (file or in-memory) and migrate it.
//! - Open read-only snapshot connections against a migrated file.
//!
//! # Invariants
//! - Returned connections have `foreign_keys=ON`.
//! - Writer connections have migrations fully applied before return.
//! - File writers run in WAL mode so readers never wait on a writer.

use super::migrations::{apply_migrations, current_user_version, latest_version};
use super::{DbError, DbResult};
use log::{error, info};
use rusqlite::{Connection, OpenFlags};
use std::path::Path;
use std::time::{Duration, Instant};

/// Opens the writer connection for a database file and applies migrations.
///
/// # Side effects
/// - Creates the file when missing.
/// - Switches the database to WAL journaling.
/// - Emits `db_open` logging events with duration and status.
pub fn open_db(path: impl AsRef<Path>, busy_timeout: Duration) -> DbResult<Connection> {
    let started_at = Instant::now();
    info!("event=db_open module=db status=start mode=file role=writer");

    let result = Connection::open(path.as_ref())
        .map_err(DbError::from)
        .and_then(|mut conn| {
            enable_wal(&conn)?;
            bootstrap_writer(&mut conn, busy_timeout)?;
            Ok(conn)
        });
    log_open_result("file", "writer", started_at, &result);
    result
}

/// Opens an in-memory writer connection and applies migrations.
pub fn open_db_in_memory() -> DbResult<Connection> {
    let started_at = Instant::now();
    info!("event=db_open module=db status=start mode=memory role=writer");

    let result = Connection::open_in_memory()
        .map_err(DbError::from)
        .and_then(|mut conn| {
            bootstrap_writer(&mut conn, Duration::ZERO)?;
            Ok(conn)
        });
    log_open_result("memory", "writer", started_at, &result);
    result
}

/// Opens a read-only connection to a database file already migrated by a
/// writer.
pub fn open_reader(path: impl AsRef<Path>, busy_timeout: Duration) -> DbResult<Connection> {
    let started_at = Instant::now();
    let result = Connection::open_with_flags(
        path.as_ref(),
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .map_err(DbError::from)
    .and_then(|conn| {
        conn.busy_timeout(busy_timeout)?;
        let actual = current_user_version(&conn)?;
        let expected = latest_version();
        if actual != expected {
            return Err(DbError::SchemaNotReady { expected, actual });
        }
        Ok(conn)
    });
    log_open_result("file", "reader", started_at, &result);
    result
}

fn bootstrap_writer(conn: &mut Connection, busy_timeout: Duration) -> DbResult<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(busy_timeout)?;
    apply_migrations(conn)?;
    Ok(())
}

fn enable_wal(conn: &Connection) -> DbResult<()> {
    let actual: String = conn.query_row("PRAGMA journal_mode = WAL;", [], |row| row.get(0))?;
    if !actual.eq_ignore_ascii_case("wal") {
        return Err(DbError::JournalMode {
            requested: "wal",
            actual,
        });
    }
    Ok(())
}

fn log_open_result(
    mode: &str,
    role: &str,
    started_at: Instant,
    result: &DbResult<Connection>,
) {
    match result {
        Ok(_) => info!(
            "event=db_open module=db status=ok mode={} role={} duration_ms={}",
            mode,
            role,
            started_at.elapsed().as_millis()
        ),
        Err(err) => error!(
            "event=db_open module=db status=error mode={} role={} duration_ms={} error={}",
            mode,
            role,
            started_at.elapsed().as_millis(),
            err
        ),
    }
}
