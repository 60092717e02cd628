//! Catalog use-case services.
//!
//! # Responsibility
//! - Turn list/detail/create/update/delete requests into folded reads and
//!   coordinated writes.
//! - Convert every failure into one terminal [`ServiceError`].

pub mod error;
pub mod product_service;
pub mod user_service;

pub use error::{FailureReply, ServiceError, ServiceResult};
pub use product_service::{ProductService, DEFAULT_PRODUCT_PAGE_SIZE};
pub use user_service::{UserService, DEFAULT_USER_PAGE_SIZE};

use chrono::Utc;
use log::{error, warn};

/// Audit timestamp text, `YYYY-MM-DD HH:MM:SS` in UTC.
pub(crate) fn now_text() -> String {
    Utc::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Logs a terminal failure and hands it back. Structured failures are
/// warnings; everything else is an error.
pub(crate) fn log_failure(event: &str, err: ServiceError) -> ServiceError {
    match err.error_code() {
        Some(code) => warn!(
            "event={} module=service status=error error_code={} error={}",
            event,
            code.as_str(),
            err
        ),
        None => error!(
            "event={} module=service status=error error_code=internal error={}",
            event, err
        ),
    }
    err
}
