//! Post-commit change notifications.
//!
//! # Responsibility
//! - Define the immutable [`ChangeEvent`] announced after a write commits.
//! - Fan events out to any number of subscribers without blocking writers.
//!
//! # Invariants
//! - Publishing never fails the caller: no subscribers, lagging subscribers
//!   and dropped receivers are all absorbed here.

use crate::model::actor::Actor;
use crate::model::document::Document;
use chrono::{DateTime, Utc};
use log::{debug, info};
use serde::Serialize;
use std::fmt::{Display, Formatter};
use tokio::sync::broadcast;

/// Entity kinds that publish change events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Product,
    User,
}

impl EntityKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Product => "product",
            Self::User => "user",
        }
    }
}

/// What happened to the entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Created,
    Updated,
    Deleted,
}

impl ChangeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Deleted => "deleted",
        }
    }
}

/// Notification that a write became durable.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeEvent {
    pub entity: EntityKind,
    pub change: ChangeKind,
    /// Full persisted document, including children.
    pub document: Document,
    pub actor: Actor,
    pub occurred_at: DateTime<Utc>,
}

impl ChangeEvent {
    pub fn new(entity: EntityKind, change: ChangeKind, document: Document, actor: Actor) -> Self {
        Self {
            entity,
            change,
            document,
            actor,
            occurred_at: Utc::now(),
        }
    }

    /// Topic name, e.g. `product.created`.
    pub fn topic(&self) -> String {
        format!("{}.{}", self.entity.as_str(), self.change.as_str())
    }
}

impl Display for ChangeEvent {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} by {}", self.topic(), self.actor.id)
    }
}

/// In-process fan-out of change events.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<ChangeEvent>,
}

impl EventBus {
    /// `capacity` bounds how far a slow subscriber may lag before it starts
    /// missing events. Must be at least 1.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.sender.subscribe()
    }

    /// Fire-and-forget publish. Returns how many subscribers received it.
    pub fn publish(&self, event: ChangeEvent) -> usize {
        let topic = event.topic();
        match self.sender.send(event) {
            Ok(receivers) => {
                info!(
                    "event=event_publish module=events status=ok topic={} receivers={}",
                    topic, receivers
                );
                receivers
            }
            Err(broadcast::error::SendError(_)) => {
                debug!(
                    "event=event_publish module=events status=ok topic={} receivers=0",
                    topic
                );
                0
            }
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
