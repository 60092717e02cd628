//! Catalog core configuration.
//!
//! ```toml
//! database_path = "/var/lib/catalog/catalog.db"
//! log_level = "info"
//! log_dir = "/var/log/catalog"
//! product_page_size = 1000
//! user_page_size = 100
//! event_buffer = 256
//! busy_timeout_ms = 5000
//! ```
//!
//! Every key is optional; missing keys take the defaults shown above.

use crate::service::{DEFAULT_PRODUCT_PAGE_SIZE, DEFAULT_USER_PAGE_SIZE};
use serde::Deserialize;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CatalogConfig {
    /// SQLite database file.
    pub database_path: PathBuf,
    pub log_level: String,
    /// Absolute directory for rolling log files; `None` disables file logging.
    pub log_dir: Option<PathBuf>,
    pub product_page_size: u32,
    pub user_page_size: u32,
    /// How many change events a slow subscriber may lag behind.
    pub event_buffer: usize,
    pub busy_timeout_ms: u64,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("catalog.db"),
            log_level: "info".to_string(),
            log_dir: None,
            product_page_size: DEFAULT_PRODUCT_PAGE_SIZE,
            user_page_size: DEFAULT_USER_PAGE_SIZE,
            event_buffer: 256,
            busy_timeout_ms: 5000,
        }
    }
}

impl CatalogConfig {
    /// Reads and validates a TOML config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text)
    }

    /// Parses and validates TOML text.
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("product_page_size", u64::from(self.product_page_size)),
            ("user_page_size", u64::from(self.user_page_size)),
            ("event_buffer", self.event_buffer as u64),
        ];
        for (key, value) in positive {
            if value < 1 {
                return Err(ConfigError::Invalid {
                    key,
                    reason: "must be at least 1".to_string(),
                });
            }
        }
        if self.database_path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid {
                key: "database_path",
                reason: "must not be empty".to_string(),
            });
        }
        Ok(())
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse(toml::de::Error),
    Invalid {
        key: &'static str,
        reason: String,
    },
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Read { path, source } => {
                write!(f, "failed to read config `{}`: {source}", path.display())
            }
            Self::Parse(err) => write!(f, "invalid config: {err}"),
            Self::Invalid { key, reason } => write!(f, "invalid config value `{key}`: {reason}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Read { source, .. } => Some(source),
            Self::Parse(err) => Some(err),
            Self::Invalid { .. } => None,
        }
    }
}
