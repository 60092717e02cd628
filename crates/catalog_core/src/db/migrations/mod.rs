//! Catalog schema versions.
//!
//! # Responsibility
//! - Create the catalog tables: `units`, `products` with their
//!   `productUnitPrices` child rows, then the `users` table.
//! - Bring an older database file up to the schema this build expects.
//!
//! # Invariants
//! - Price rows reference products and units through deferred foreign keys,
//!   so a product and its prices can be written in either order inside one
//!   transaction and are only checked at commit.
//! - All pending versions are applied in one transaction; a file is never
//!   left half-migrated.
//! - The schema version lives in `PRAGMA user_version`; a file written by a
//!   newer build is refused rather than downgraded.

use crate::db::{DbError, DbResult};
use log::{debug, info};
use rusqlite::Connection;

#[derive(Debug, Clone, Copy)]
struct Migration {
    version: u32,
    name: &'static str,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "catalog",
        sql: include_str!("0001_catalog.sql"),
    },
    Migration {
        version: 2,
        name: "users",
        sql: include_str!("0002_users.sql"),
    },
];

/// Schema version of a freshly created catalog database.
pub fn latest_version() -> u32 {
    MIGRATIONS.last().map_or(0, |migration| migration.version)
}

/// Upgrades the catalog schema on `conn` to [`latest_version`].
pub fn apply_migrations(conn: &mut Connection) -> DbResult<()> {
    let current_version = current_user_version(conn)?;
    let latest = latest_version();

    if current_version > latest {
        return Err(DbError::UnsupportedSchemaVersion {
            db_version: current_version,
            latest_supported: latest,
        });
    }

    if current_version == latest {
        return Ok(());
    }

    let tx = conn.transaction()?;
    for migration in MIGRATIONS
        .iter()
        .filter(|migration| migration.version > current_version)
    {
        debug!(
            "event=db_migrate module=db status=step version={} name={}",
            migration.version, migration.name
        );
        tx.execute_batch(migration.sql)?;
        tx.pragma_update(None, "user_version", migration.version)?;
    }
    tx.commit()?;

    info!(
        "event=db_migrate module=db status=ok from_version={} to_version={}",
        current_version, latest
    );
    Ok(())
}

fn current_user_version(conn: &Connection) -> DbResult<u32> {
    let version = conn.query_row("PRAGMA user_version;", [], |row| row.get::<_, u32>(0))?;
    Ok(version)
}
