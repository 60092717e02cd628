//! Identifier allocation for entities whose ids the store does not generate.
//!
//! # Invariants
//! - Ids are strictly increasing and never handed out twice.
//! - An allocated id is consumed even if the write using it fails; gaps are
//!   accepted.

use crate::db::{quote_ident, DbResult, SqlClient, Statement};
use log::info;
use std::sync::atomic::{AtomicI64, Ordering};

/// Source of fresh identifiers for one entity type.
pub trait IdSequence: Send + Sync {
    /// Returns a never-before-returned id.
    fn next_id(&self) -> i64;
}

/// Process-wide counter seeded from the highest persisted id.
#[derive(Debug)]
pub struct AtomicIdSequence {
    next: AtomicI64,
}

impl AtomicIdSequence {
    /// First id handed out is `max_id + 1`.
    pub fn starting_after(max_id: i64) -> Self {
        Self {
            next: AtomicI64::new(max_id.saturating_add(1)),
        }
    }

    /// Seeds the counter from `MAX(id_field)` of `table`; an empty table starts at 1.
    pub async fn load<C: SqlClient>(client: &C, table: &str, id_field: &str) -> DbResult<Self> {
        let max_id = client
            .query(Statement::new(format!(
                "SELECT MAX({}) FROM {}",
                quote_ident(id_field),
                quote_ident(table)
            )))
            .await?
            .first_i64()?
            .unwrap_or(0);
        info!(
            "event=id_sequence_load module=write status=ok table={} next_id={}",
            table,
            max_id.saturating_add(1)
        );
        Ok(Self::starting_after(max_id))
    }

    /// Next id that will be returned, without consuming it.
    pub fn peek(&self) -> i64 {
        self.next.load(Ordering::SeqCst)
    }
}

impl IdSequence for AtomicIdSequence {
    fn next_id(&self) -> i64 {
        self.next.fetch_add(1, Ordering::SeqCst)
    }
}
