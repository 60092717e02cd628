//! Acting user attached to writes and change events.

use serde::{Deserialize, Serialize};

/// Authenticated user performing a write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: i64,
    #[serde(default)]
    pub username: String,
}

impl Actor {
    pub fn new(id: i64, username: impl Into<String>) -> Self {
        Self {
            id,
            username: username.into(),
        }
    }

    /// Actor used for internal/system writes.
    pub fn system() -> Self {
        Self::new(0, "system")
    }
}
