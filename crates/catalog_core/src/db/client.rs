//! Asynchronous SQL substrate contracts.
//!
//! # Responsibility
//! - Describe what services need from a relational store: one-shot
//!   queries/updates, and owned connections with explicit transactions.
//!
//! # Invariants
//! - Every call is a suspension point; results arrive by completion, never
//!   by direct return from a blocking call.
//! - `SqlConnection::close` consumes the connection, so it can run at most
//!   once per acquired connection.

use super::{DbResult, ResultSet, Statement, UpdateResult};
use async_trait::async_trait;
use log::warn;

/// A connection source, shared by all operations of a service.
#[async_trait]
pub trait SqlClient: Send + Sync + 'static {
    type Connection: SqlConnection;

    /// Acquires a dedicated connection with auto-commit enabled.
    async fn get_connection(&self) -> DbResult<Self::Connection>;

    /// Runs one auto-committed query on a short-lived connection.
    async fn query(&self, statement: Statement) -> DbResult<ResultSet> {
        let conn = self.get_connection().await?;
        let result = conn.query(statement).await;
        release(conn).await;
        result
    }

    /// Runs one auto-committed update on a short-lived connection.
    async fn update(&self, statement: Statement) -> DbResult<UpdateResult> {
        let conn = self.get_connection().await?;
        let result = conn.update(statement).await;
        release(conn).await;
        result
    }
}

/// One exclusively owned connection.
///
/// Statement methods take `&self` so that independent statements can be
/// issued together and joined; implementations serialize them internally.
#[async_trait]
pub trait SqlConnection: Send + Sync + Sized + 'static {
    /// `false` opens an explicit transaction; `true` returns to auto-commit.
    async fn set_auto_commit(&self, enabled: bool) -> DbResult<()>;

    async fn query(&self, statement: Statement) -> DbResult<ResultSet>;

    async fn update(&self, statement: Statement) -> DbResult<UpdateResult>;

    /// Executes each statement in order and stops at the first failure.
    async fn batch(&self, statements: Vec<Statement>) -> DbResult<Vec<UpdateResult>> {
        let mut results = Vec::with_capacity(statements.len());
        for statement in statements {
            results.push(self.update(statement).await?);
        }
        Ok(results)
    }

    async fn commit(&self) -> DbResult<()>;

    async fn rollback(&self) -> DbResult<()>;

    /// Returns the connection to the store. Uncommitted work is rolled back.
    async fn close(self) -> DbResult<()>;
}

/// Closes `conn`, logging instead of propagating a close failure.
pub async fn release<C: SqlConnection>(conn: C) {
    if let Err(err) = conn.close().await {
        warn!("event=connection_release module=db status=error error={}", err);
    }
}
