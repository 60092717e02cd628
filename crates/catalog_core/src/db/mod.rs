//! SQLite storage bootstrap, schema migrations and the async SQL substrate.
//!
//! # Responsibility
//! - Open and configure SQLite connections for the catalog core.
//! - Apply schema migrations in deterministic order.
//! - Expose an asynchronous query/update/transaction surface to services.
//!
//! # Invariants
//! - Migration version is tracked via `PRAGMA user_version`.
//! - Core code must not read/write application data before migrations succeed.
//! - A connection handed out by [`SqlClient::get_connection`] is owned by one
//!   caller and is closed exactly once.

use std::error::Error;
use std::fmt::{Display, Formatter};

mod client;
pub mod migrations;
mod open;
mod result;
mod sqlite;
mod statement;
mod table_info;

pub use client::{release, SqlClient, SqlConnection};
pub use open::{open_db, open_db_in_memory};
pub use result::{ResultSet, UpdateResult};
pub use sqlite::{SqliteClient, SqliteConnection};
pub use statement::{quote_ident, Statement};
pub use table_info::{describe_table, ColumnInfo};

pub type DbResult<T> = Result<T, DbError>;

#[derive(Debug)]
pub enum DbError {
    Sqlite(rusqlite::Error),
    UnsupportedSchemaVersion {
        db_version: u32,
        latest_supported: u32,
    },
    /// The blocking worker running a statement panicked or was cancelled.
    Worker(String),
    /// The connection was already closed or its lock was poisoned.
    ConnectionUnavailable,
    /// A statement arrived after the connection's transaction was committed
    /// or rolled back.
    TransactionEnded,
    /// A result shape did not match what the caller asked for.
    UnexpectedResult(String),
}

impl Display for DbError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "{err}"),
            Self::UnsupportedSchemaVersion {
                db_version,
                latest_supported,
            } => write!(
                f,
                "database schema version {db_version} is newer than supported {latest_supported}"
            ),
            Self::Worker(details) => write!(f, "database worker failed: {details}"),
            Self::ConnectionUnavailable => write!(f, "database connection is no longer available"),
            Self::TransactionEnded => {
                write!(f, "statement refused: the connection's transaction already ended")
            }
            Self::UnexpectedResult(details) => write!(f, "unexpected query result: {details}"),
        }
    }
}

impl Error for DbError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite(err) => Some(err),
            _ => None,
        }
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}
