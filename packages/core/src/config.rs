//! Configuration for the hierarchy store

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Default wait for SQLite's write lock (5 seconds)
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5000;

/// Default wait for the in-process mutation lock (5 seconds)
const DEFAULT_LOCK_TIMEOUT_MS: u64 = 5000;

/// Store configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreConfig {
    /// Path to the database file (created if missing)
    pub database_path: PathBuf,

    /// How long a connection waits on a locked database before `SQLITE_BUSY`
    pub busy_timeout_ms: u64,

    /// How long a structural mutation waits for its turn inside this process
    pub lock_timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("orgunits.db"),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            lock_timeout_ms: DEFAULT_LOCK_TIMEOUT_MS,
        }
    }
}

impl StoreConfig {
    pub fn new(database_path: impl Into<PathBuf>) -> Self {
        Self {
            database_path: database_path.into(),
            ..Self::default()
        }
    }

    pub fn with_busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.database_path.as_os_str().is_empty() {
            return Err("database_path cannot be empty".to_string());
        }

        if self.busy_timeout_ms == 0 {
            return Err("busy_timeout_ms must be greater than 0".to_string());
        }

        // Zero would turn every contended mutation into an immediate conflict
        if self.lock_timeout_ms == 0 {
            return Err("lock_timeout_ms must be greater than 0".to_string());
        }

        Ok(())
    }
}
