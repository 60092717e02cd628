//! Transactional write coordinator.
//!
//! # Responsibility
//! - Run one parent write plus its child writes in a single explicit
//!   transaction on a dedicated connection.
//! - Announce the change on the event bus once, after commit.
//!
//! # Invariants
//! - Steps run in order: acquire, begin, (clear children), execute, commit,
//!   publish, release. The parent write and the child batch are issued
//!   together; both must finish before commit or rollback is decided, and
//!   both must succeed.
//! - Any failure after begin rolls back explicitly; nothing is committed.
//! - An acquired connection is released exactly once on every path; a
//!   release failure is logged and never replaces the primary outcome.
//! - No event is published unless commit succeeded.

mod sequence;

pub use sequence::{AtomicIdSequence, IdSequence};

use crate::db::{release, DbError, SqlClient, SqlConnection, Statement};
use crate::events::{ChangeEvent, ChangeKind, EntityKind, EventBus};
use crate::model::actor::Actor;
use crate::model::document::Document;
use log::{error, info, warn};
use serde_json::Value;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;
use std::time::Instant;

pub type WriteResult<T> = Result<T, WriteError>;

/// Failure of one coordinated write, tagged with the step that failed.
#[derive(Debug)]
pub enum WriteError {
    /// No connection could be obtained; nothing was started.
    Acquire(DbError),
    /// The transaction could not be opened.
    Begin(DbError),
    /// A parent or child statement failed; the transaction was rolled back.
    Execute(DbError),
    /// Commit failed; the transaction was rolled back.
    Commit(DbError),
    /// An update/delete matched no parent row; the transaction was rolled back.
    NotFound(Value),
    /// The store did not report a generated key for the parent insert.
    MissingGeneratedKey,
}

impl WriteError {
    pub fn stage(&self) -> &'static str {
        match self {
            Self::Acquire(_) => "acquire",
            Self::Begin(_) => "begin",
            Self::Execute(_) | Self::NotFound(_) | Self::MissingGeneratedKey => "execute",
            Self::Commit(_) => "commit",
        }
    }
}

impl Display for WriteError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Acquire(err) => write!(f, "failed to acquire connection: {err}"),
            Self::Begin(err) => write!(f, "failed to begin transaction: {err}"),
            Self::Execute(err) => write!(f, "write failed: {err}"),
            Self::Commit(err) => write!(f, "commit failed: {err}"),
            Self::NotFound(key) => write!(f, "no row matches identity {key}"),
            Self::MissingGeneratedKey => write!(f, "store returned no generated key"),
        }
    }
}

impl Error for WriteError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Acquire(err) | Self::Begin(err) | Self::Execute(err) | Self::Commit(err) => {
                Some(err)
            }
            Self::NotFound(_) | Self::MissingGeneratedKey => None,
        }
    }
}

/// Where the parent identity comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum Identity {
    /// Allocated by the caller (or the key of an update/delete).
    Known(Value),
    /// Generated by the store on insert.
    Generated,
}

/// Everything one coordinated write does.
#[derive(Debug, Clone)]
pub struct WritePlan {
    entity: EntityKind,
    change: ChangeKind,
    identity: Identity,
    parent: Statement,
    require_parent_row: bool,
    clear_children: Option<Statement>,
    children: Vec<Statement>,
    id_field: String,
    document: Document,
    actor: Actor,
}

impl WritePlan {
    fn with_change(entity: EntityKind, change: ChangeKind, parent: Statement, identity: Identity) -> Self {
        Self {
            entity,
            change,
            identity,
            parent,
            require_parent_row: change != ChangeKind::Created,
            clear_children: None,
            children: Vec::new(),
            id_field: "id".to_string(),
            document: Document::new(),
            actor: Actor::system(),
        }
    }

    /// Insert of a new parent row.
    pub fn create(entity: EntityKind, parent: Statement, identity: Identity) -> Self {
        Self::with_change(entity, ChangeKind::Created, parent, identity)
    }

    /// Update of an existing parent row; zero matched rows is `NotFound`.
    pub fn update(entity: EntityKind, parent: Statement, key: Value) -> Self {
        Self::with_change(entity, ChangeKind::Updated, parent, Identity::Known(key))
    }

    /// Delete of an existing parent row; zero matched rows is `NotFound`.
    pub fn delete(entity: EntityKind, parent: Statement, key: Value) -> Self {
        Self::with_change(entity, ChangeKind::Deleted, parent, Identity::Known(key))
    }

    /// Statement removing the current children before the new set is written.
    pub fn replacing_children(mut self, clear: Statement) -> Self {
        self.clear_children = Some(clear);
        self
    }

    pub fn with_children(mut self, children: Vec<Statement>) -> Self {
        self.children = children;
        self
    }

    /// Document and actor carried by the change event; `id_field` receives
    /// the final identity.
    pub fn announcing(mut self, id_field: &str, document: Document, actor: Actor) -> Self {
        self.id_field = id_field.to_string();
        self.document = document;
        self.actor = actor;
        self
    }

    pub fn entity(&self) -> EntityKind {
        self.entity
    }

    pub fn change(&self) -> ChangeKind {
        self.change
    }
}

/// Runs [`WritePlan`]s against a [`SqlClient`] and publishes their events.
pub struct WriteCoordinator<C: SqlClient> {
    client: Arc<C>,
    events: EventBus,
}

impl<C: SqlClient> WriteCoordinator<C> {
    pub fn new(client: Arc<C>, events: EventBus) -> Self {
        Self { client, events }
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Executes `plan` atomically and returns the parent identity.
    pub async fn write(&self, plan: WritePlan) -> WriteResult<Value> {
        let started_at = Instant::now();
        let entity = plan.entity.as_str();
        let change = plan.change.as_str();
        info!(
            "event=write_txn module=write status=start entity={} change={} children={}",
            entity,
            change,
            plan.children.len()
        );

        let conn = match self.client.get_connection().await {
            Ok(conn) => conn,
            Err(err) => {
                error!(
                    "event=write_txn module=write status=error stage=acquire entity={} change={} duration_ms={} error={}",
                    entity,
                    change,
                    started_at.elapsed().as_millis(),
                    err
                );
                return Err(WriteError::Acquire(err));
            }
        };

        let WritePlan {
            entity: entity_kind,
            change: change_kind,
            identity,
            parent,
            require_parent_row,
            clear_children,
            children,
            id_field,
            mut document,
            actor,
        } = plan;

        let outcome = run_transaction(
            &conn,
            identity,
            parent,
            require_parent_row,
            clear_children,
            children,
        )
        .await;

        match &outcome {
            Ok(identity) => {
                info!(
                    "event=write_txn module=write status=ok entity={} change={} id={} duration_ms={}",
                    entity,
                    change,
                    identity,
                    started_at.elapsed().as_millis()
                );
                if !id_field.is_empty() {
                    document.insert(id_field, identity.clone());
                }
                self.events
                    .publish(ChangeEvent::new(entity_kind, change_kind, document, actor));
            }
            Err(err) => {
                error!(
                    "event=write_txn module=write status=error stage={} entity={} change={} duration_ms={} error={}",
                    err.stage(),
                    entity,
                    change,
                    started_at.elapsed().as_millis(),
                    err
                );
            }
        }

        release(conn).await;
        outcome
    }
}

async fn run_transaction<K: SqlConnection>(
    conn: &K,
    identity: Identity,
    parent: Statement,
    require_parent_row: bool,
    clear_children: Option<Statement>,
    children: Vec<Statement>,
) -> WriteResult<Value> {
    conn.set_auto_commit(false)
        .await
        .map_err(WriteError::Begin)?;

    let executed = execute(
        conn,
        identity,
        parent,
        require_parent_row,
        clear_children,
        children,
    )
    .await;

    match executed {
        Ok(identity) => match conn.commit().await {
            Ok(()) => Ok(identity),
            Err(err) => {
                rollback_quietly(conn).await;
                Err(WriteError::Commit(err))
            }
        },
        Err(err) => {
            rollback_quietly(conn).await;
            Err(err)
        }
    }
}

async fn execute<K: SqlConnection>(
    conn: &K,
    identity: Identity,
    parent: Statement,
    require_parent_row: bool,
    clear_children: Option<Statement>,
    children: Vec<Statement>,
) -> WriteResult<Value> {
    if let Some(clear) = clear_children {
        conn.update(clear).await.map_err(WriteError::Execute)?;
    }

    // Wait for both sides even when one fails; a dropped statement may still
    // be queued on the connection and must not outlive the transaction.
    let (parent_result, children_result) =
        tokio::join!(conn.update(parent), conn.batch(children));
    let parent_result = parent_result.map_err(WriteError::Execute)?;
    children_result.map_err(WriteError::Execute)?;

    match identity {
        Identity::Known(key) => {
            if require_parent_row && parent_result.updated == 0 {
                return Err(WriteError::NotFound(key));
            }
            Ok(key)
        }
        Identity::Generated => parent_result
            .generated_key
            .map(Value::from)
            .ok_or(WriteError::MissingGeneratedKey),
    }
}

async fn rollback_quietly<K: SqlConnection>(conn: &K) {
    if let Err(err) = conn.rollback().await {
        warn!(
            "event=write_txn module=write status=error stage=rollback error={}",
            err
        );
    }
}
