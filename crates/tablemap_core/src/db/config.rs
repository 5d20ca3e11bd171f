//! Connection configuration.
//!
//! A `ConnectionConfig` is handed to [`super::Connection::new`] by whatever
//! assembles the application; nothing is opened until first use.

use super::Provider;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// Where the physical database lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageTarget {
    Memory,
    File { path: PathBuf },
}

/// Configured-but-closed connection settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    #[serde(default)]
    pub provider: Provider,
    pub target: StorageTarget,
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    #[serde(default = "default_foreign_keys")]
    pub foreign_keys: bool,
    /// SQL batch run once right after the handle is opened.
    #[serde(default)]
    pub init_sql: Option<String>,
}

impl ConnectionConfig {
    pub fn memory() -> Self {
        Self::with_target(StorageTarget::Memory)
    }

    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self::with_target(StorageTarget::File { path: path.into() })
    }

    pub fn init_sql(mut self, sql: impl Into<String>) -> Self {
        self.init_sql = Some(sql.into());
        self
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }

    /// Short label for log lines.
    pub fn mode(&self) -> &'static str {
        match self.target {
            StorageTarget::Memory => "memory",
            StorageTarget::File { .. } => "file",
        }
    }

    fn with_target(target: StorageTarget) -> Self {
        Self {
            provider: Provider::Sqlite,
            target,
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            foreign_keys: default_foreign_keys(),
            init_sql: None,
        }
    }
}

fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

fn default_foreign_keys() -> bool {
    true
}
