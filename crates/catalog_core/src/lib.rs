//! Catalog core: products, unit prices and users over SQLite.
//!
//! Reads fold flat join rows into nested documents; writes run through a
//! transactional coordinator that publishes change events after commit.

pub mod config;
pub mod db;
pub mod events;
pub mod fold;
pub mod logging;
pub mod messages;
pub mod model;
pub mod pagination;
pub mod pipeline;
pub mod service;
pub mod write;

pub use config::{CatalogConfig, ConfigError};
pub use db::{DbError, SqlClient, SqlConnection, SqliteClient, Statement};
pub use events::{ChangeEvent, ChangeKind, EntityKind, EventBus};
pub use fold::{fold, flatten, FieldSchema, FoldError, FoldLayout};
pub use logging::{default_log_level, init_from_config, init_logging, logging_status, LoggingError};
pub use messages::{ErrorCode, MessageBundle};
pub use model::actor::Actor;
pub use model::document::Document;
pub use pagination::{Page, PageRequest, Pagination};
pub use service::{FailureReply, ProductService, ServiceError, ServiceResult, UserService};
pub use write::{AtomicIdSequence, IdSequence, WriteCoordinator, WriteError, WritePlan};

use std::sync::Arc;

/// Product and user services sharing one client and one event bus.
pub struct Catalog<C: SqlClient> {
    pub products: ProductService<C>,
    pub users: UserService<C>,
    events: EventBus,
}

impl<C: SqlClient> Catalog<C> {
    pub async fn open(client: Arc<C>, config: &CatalogConfig) -> ServiceResult<Self> {
        let events = EventBus::new(config.event_buffer);
        let (products, users) = tokio::try_join!(
            ProductService::open(Arc::clone(&client), events.clone()),
            UserService::open(Arc::clone(&client), events.clone()),
        )?;
        Ok(Self {
            products: products.with_page_size(config.product_page_size),
            users: users.with_page_size(config.user_page_size),
            events,
        })
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }
}

impl Catalog<SqliteClient> {
    /// Opens (and migrates) the configured database file.
    pub async fn open_sqlite(config: &CatalogConfig) -> ServiceResult<Self> {
        let client = SqliteClient::open(&config.database_path)
            .await?
            .with_busy_timeout(config.busy_timeout());
        Self::open(Arc::new(client), config).await
    }
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::core_version;

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
