//! SQLite implementation of the async SQL substrate.
//!
//! # Responsibility
//! - Hand out one `rusqlite::Connection` per acquire, opened against a
//!   migrated database file.
//! - Run every blocking SQLite call on the blocking pool so awaiting tasks
//!   only resume when the call completes.
//!
//! # Invariants
//! - `set_auto_commit(false)` starts `BEGIN IMMEDIATE`; the write lock is
//!   taken up front so two writers never deadlock on lock upgrade.
//! - Once a transaction is committed or rolled back, statements on that
//!   connection are refused with `DbError::TransactionEnded` until
//!   `set_auto_commit` is called again. A statement still queued on the
//!   blocking pool can never run in autocommit after its transaction ended.
//! - `close` rolls back an open transaction before closing.

use super::open::{configure_connection, open_db, DEFAULT_BUSY_TIMEOUT};
use super::{DbError, DbResult, ResultSet, SqlClient, SqlConnection, Statement, UpdateResult};
use async_trait::async_trait;
use log::{debug, warn};
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{params_from_iter, Connection};
use serde_json::{Number, Value};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Connection source for one SQLite database file.
#[derive(Debug, Clone)]
pub struct SqliteClient {
    path: PathBuf,
    busy_timeout: Duration,
}

impl SqliteClient {
    /// Opens (and migrates) the database at `path`, then returns a client for it.
    pub async fn open(path: impl AsRef<Path>) -> DbResult<Self> {
        let path = path.as_ref().to_path_buf();
        let bootstrap_path = path.clone();
        run_blocking(move || open_db(bootstrap_path).map(drop)).await?;
        Ok(Self {
            path,
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
        })
    }

    pub fn with_busy_timeout(mut self, busy_timeout: Duration) -> Self {
        self.busy_timeout = busy_timeout;
        self
    }
}

#[async_trait]
impl SqlClient for SqliteClient {
    type Connection = SqliteConnection;

    async fn get_connection(&self) -> DbResult<SqliteConnection> {
        let path = self.path.clone();
        let busy_timeout = self.busy_timeout;
        let conn = run_blocking(move || {
            let conn = Connection::open(path)?;
            configure_connection(&conn, busy_timeout)?;
            Ok(conn)
        })
        .await?;
        Ok(SqliteConnection {
            inner: Arc::new(Mutex::new(Slot {
                conn: Some(conn),
                txn: TxnState::AutoCommit,
            })),
        })
    }
}

/// One acquired SQLite connection.
pub struct SqliteConnection {
    inner: Arc<Mutex<Slot>>,
}

struct Slot {
    conn: Option<Connection>,
    txn: TxnState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TxnState {
    AutoCommit,
    Open,
    Ended,
}

impl SqliteConnection {
    async fn with_slot<T, F>(&self, f: F) -> DbResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection, &mut TxnState) -> DbResult<T> + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        run_blocking(move || {
            let mut guard = inner.lock().map_err(|_| DbError::ConnectionUnavailable)?;
            let Slot { conn, txn } = &mut *guard;
            let conn = conn.as_mut().ok_or(DbError::ConnectionUnavailable)?;
            f(conn, txn)
        })
        .await
    }

    /// Runs a data statement; the transaction state is checked under the same lock.
    async fn with_conn<T, F>(&self, f: F) -> DbResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> DbResult<T> + Send + 'static,
    {
        self.with_slot(move |conn, txn| {
            if *txn == TxnState::Ended {
                debug!("event=sql_statement module=db status=refused reason=transaction_ended");
                return Err(DbError::TransactionEnded);
            }
            f(conn)
        })
        .await
    }
}

#[async_trait]
impl SqlConnection for SqliteConnection {
    async fn set_auto_commit(&self, enabled: bool) -> DbResult<()> {
        self.with_slot(move |conn, txn| {
            match (enabled, conn.is_autocommit()) {
                (false, true) => conn.execute_batch("BEGIN IMMEDIATE;")?,
                (true, false) => conn.execute_batch("COMMIT;")?,
                _ => {}
            }
            *txn = if enabled {
                TxnState::AutoCommit
            } else {
                TxnState::Open
            };
            Ok(())
        })
        .await
    }

    async fn query(&self, statement: Statement) -> DbResult<ResultSet> {
        self.with_conn(move |conn| run_query(conn, &statement)).await
    }

    async fn update(&self, statement: Statement) -> DbResult<UpdateResult> {
        self.with_conn(move |conn| run_update(conn, &statement))
            .await
    }

    async fn batch(&self, statements: Vec<Statement>) -> DbResult<Vec<UpdateResult>> {
        self.with_conn(move |conn| {
            statements
                .iter()
                .map(|statement| run_update(conn, statement))
                .collect()
        })
        .await
    }

    async fn commit(&self) -> DbResult<()> {
        self.with_slot(|conn, txn| {
            if *txn == TxnState::Ended {
                return Err(DbError::TransactionEnded);
            }
            conn.execute_batch("COMMIT;")?;
            if *txn == TxnState::Open {
                *txn = TxnState::Ended;
            }
            Ok(())
        })
        .await
    }

    async fn rollback(&self) -> DbResult<()> {
        self.with_slot(|conn, txn| {
            if *txn == TxnState::Open {
                *txn = TxnState::Ended;
            }
            if !conn.is_autocommit() {
                conn.execute_batch("ROLLBACK;")?;
            }
            Ok(())
        })
        .await
    }

    async fn close(self) -> DbResult<()> {
        let inner = self.inner;
        run_blocking(move || {
            let conn = inner
                .lock()
                .map_err(|_| DbError::ConnectionUnavailable)?
                .conn
                .take()
                .ok_or(DbError::ConnectionUnavailable)?;
            if !conn.is_autocommit() {
                debug!("event=connection_release module=db status=rollback reason=open_transaction");
                if let Err(err) = conn.execute_batch("ROLLBACK;") {
                    warn!(
                        "event=connection_release module=db status=error stage=rollback error={}",
                        err
                    );
                }
            }
            conn.close().map_err(|(_, err)| DbError::Sqlite(err))
        })
        .await
    }
}

async fn run_blocking<T, F>(f: F) -> DbResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> DbResult<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|err| DbError::Worker(err.to_string()))?
}

fn run_query(conn: &Connection, statement: &Statement) -> DbResult<ResultSet> {
    let mut stmt = conn.prepare(&statement.sql)?;
    let columns = stmt
        .column_names()
        .into_iter()
        .map(str::to_string)
        .collect::<Vec<_>>();
    let width = columns.len();

    let mut rows = stmt.query(params_from_iter(statement.params.iter().map(to_sql_value)))?;
    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        let mut values = Vec::with_capacity(width);
        for idx in 0..width {
            values.push(from_sql_value(row.get_ref(idx)?));
        }
        out.push(values);
    }

    Ok(ResultSet::new(columns, out))
}

fn run_update(conn: &Connection, statement: &Statement) -> DbResult<UpdateResult> {
    let updated = conn.execute(
        &statement.sql,
        params_from_iter(statement.params.iter().map(to_sql_value)),
    )?;
    let generated_key = statement.is_insert().then(|| conn.last_insert_rowid());
    Ok(UpdateResult {
        updated,
        generated_key,
    })
}

fn to_sql_value(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(flag) => SqlValue::Integer(i64::from(*flag)),
        Value::Number(number) => match number.as_i64() {
            Some(int) => SqlValue::Integer(int),
            None => number.as_f64().map_or(SqlValue::Null, SqlValue::Real),
        },
        Value::String(text) => SqlValue::Text(text.clone()),
        nested @ (Value::Array(_) | Value::Object(_)) => SqlValue::Text(nested.to_string()),
    }
}

fn from_sql_value(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(int) => Value::from(int),
        ValueRef::Real(real) => Number::from_f64(real).map_or(Value::Null, Value::Number),
        ValueRef::Text(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => Value::Array(bytes.iter().map(|b| Value::from(*b)).collect()),
    }
}

#[cfg(test)]
mod tests {
    use super::{from_sql_value, to_sql_value};
    use rusqlite::types::{Value as SqlValue, ValueRef};
    use serde_json::json;

    #[test]
    fn json_values_bind_to_sqlite_affinities() {
        assert_eq!(to_sql_value(&json!(true)), SqlValue::Integer(1));
        assert_eq!(to_sql_value(&json!(7)), SqlValue::Integer(7));
        assert_eq!(to_sql_value(&json!(2.5)), SqlValue::Real(2.5));
        assert_eq!(to_sql_value(&json!(null)), SqlValue::Null);
        assert_eq!(
            to_sql_value(&json!({"a": 1})),
            SqlValue::Text("{\"a\":1}".to_string())
        );
    }

    #[test]
    fn sqlite_values_read_back_as_json() {
        assert_eq!(from_sql_value(ValueRef::Integer(4)), json!(4));
        assert_eq!(from_sql_value(ValueRef::Real(1.5)), json!(1.5));
        assert_eq!(from_sql_value(ValueRef::Text(b"kg")), json!("kg"));
        assert_eq!(from_sql_value(ValueRef::Null), json!(null));
    }
}
