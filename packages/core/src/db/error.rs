//! Database Error Types
//!
//! This module defines error types for database operations, providing
//! clear error handling for connection, initialization, and query failures.

use std::path::PathBuf;
use thiserror::Error;

/// SQLite primary result code for `SQLITE_BUSY`
const SQLITE_BUSY: i32 = 5;

/// SQLite primary result code for `SQLITE_LOCKED`
const SQLITE_LOCKED: i32 = 6;

/// Database operation errors
///
/// Covers connection, initialization, and statement failures. Hierarchy
/// semantics (not found, cycles, ...) live in the service-layer error type.
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// Failed to establish database connection
    #[error("Failed to connect to database at {path}: {source}")]
    ConnectionFailed {
        path: PathBuf,
        source: libsql::Error,
    },

    /// Failed to initialize database schema
    #[error("Failed to initialize database schema: {0}")]
    InitializationFailed(String),

    /// Permission denied when accessing database
    #[error("Permission denied for database path: {path}")]
    PermissionDenied { path: PathBuf },

    /// Failed to create parent directory
    #[error("Failed to create parent directory for database: {0}")]
    DirectoryCreationFailed(#[from] std::io::Error),

    /// libsql operation error
    #[error("Database operation failed: {0}")]
    LibsqlError(#[from] libsql::Error),

    /// SQL execution error with context
    #[error("SQL execution failed: {context}")]
    SqlExecutionError { context: String },

    /// The write lock could not be obtained within the busy timeout
    #[error("Database is locked: {context}")]
    Busy { context: String },
}

impl DatabaseError {
    /// Create a connection failed error
    pub fn connection_failed(path: PathBuf, source: libsql::Error) -> Self {
        Self::ConnectionFailed { path, source }
    }

    /// Create an initialization failed error
    pub fn initialization_failed(msg: impl Into<String>) -> Self {
        Self::InitializationFailed(msg.into())
    }

    /// Create a permission denied error
    pub fn permission_denied(path: PathBuf) -> Self {
        Self::PermissionDenied { path }
    }

    /// Create a SQL execution error with context
    pub fn sql_execution(context: impl Into<String>) -> Self {
        Self::SqlExecutionError {
            context: context.into(),
        }
    }

    /// Wrap a libsql error raised while running `what`
    ///
    /// Lock contention (`SQLITE_BUSY` / `SQLITE_LOCKED`) is kept apart as
    /// [`DatabaseError::Busy`] so callers can tell a retryable conflict from
    /// a genuine storage failure.
    pub fn from_libsql(what: &str, err: libsql::Error) -> Self {
        if is_busy(&err) {
            Self::Busy {
                context: format!("{}: {}", what, err),
            }
        } else {
            Self::sql_execution(format!("{}: {}", what, err))
        }
    }

    /// Whether the error is lock contention that may succeed on retry
    pub fn is_busy(&self) -> bool {
        match self {
            Self::Busy { .. } => true,
            Self::LibsqlError(err) => is_busy(err),
            _ => false,
        }
    }
}

fn is_busy(err: &libsql::Error) -> bool {
    match err {
        libsql::Error::SqliteFailure(code, _) => {
            let primary = code & 0xff;
            primary == SQLITE_BUSY || primary == SQLITE_LOCKED
        }
        other => other.to_string().contains("database is locked"),
    }
}
