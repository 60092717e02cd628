//! Opening the catalog database.
//!
//! # Responsibility
//! - Turn a file path into a connection onto the current catalog schema.
//! - Hold the pragmas every service connection needs.
//!
//! # Invariants
//! - Every connection enforces `foreign_keys=ON`; the deferred price
//!   references are otherwise never checked.
//! - A database file is switched to WAL once, at open, so the page query and
//!   the count query of one listing can run beside an in-flight write.
//! - Nothing is handed out before the catalog migrations have run.

use super::migrations::apply_migrations;
use super::DbResult;
use log::{error, info};
use rusqlite::Connection;
use std::path::Path;
use std::time::{Duration, Instant};

/// How long a statement waits on another writer's lock before failing.
pub(crate) const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    File,
    Memory,
}

impl Mode {
    fn as_str(self) -> &'static str {
        match self {
            Self::File => "file",
            Self::Memory => "memory",
        }
    }
}

/// Opens the catalog database at `path`, creating and migrating it as needed.
///
/// Emits `db_open` events with duration and status.
pub fn open_db(path: impl AsRef<Path>) -> DbResult<Connection> {
    open_with(Mode::File, || Connection::open(path))
}

/// Opens a private in-memory catalog.
///
/// Only one connection can see an in-memory database, so this is meant for
/// schema checks and single-connection tests; services use [`super::SqliteClient`].
pub fn open_db_in_memory() -> DbResult<Connection> {
    open_with(Mode::Memory, Connection::open_in_memory)
}

fn open_with<F>(mode: Mode, connect: F) -> DbResult<Connection>
where
    F: FnOnce() -> rusqlite::Result<Connection>,
{
    let started_at = Instant::now();
    info!("event=db_open module=db status=start mode={}", mode.as_str());

    let (error_code, err) = match connect() {
        Ok(mut conn) => match prepare(mode, &mut conn) {
            Ok(()) => {
                info!(
                    "event=db_open module=db status=ok mode={} duration_ms={}",
                    mode.as_str(),
                    started_at.elapsed().as_millis()
                );
                return Ok(conn);
            }
            Err(err) => ("db_bootstrap_failed", err),
        },
        Err(err) => ("db_open_failed", err.into()),
    };

    error!(
        "event=db_open module=db status=error mode={} duration_ms={} error_code={} error={}",
        mode.as_str(),
        started_at.elapsed().as_millis(),
        error_code,
        err
    );
    Err(err)
}

fn prepare(mode: Mode, conn: &mut Connection) -> DbResult<()> {
    if mode == Mode::File {
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))?;
    }
    configure_connection(conn, DEFAULT_BUSY_TIMEOUT)?;
    apply_migrations(conn)
}

/// Applies per-connection pragmas without touching the schema.
pub(crate) fn configure_connection(conn: &Connection, busy_timeout: Duration) -> DbResult<()> {
    conn.pragma_update(None, "foreign_keys", true)?;
    conn.busy_timeout(busy_timeout)?;
    Ok(())
}
