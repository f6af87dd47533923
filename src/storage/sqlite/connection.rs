//! Shared connection handling for the `SQLite` backend.
//!
//! This module provides utilities for managing `SQLite` connections with proper
//! mutex handling, poison recovery, and performance configuration.

use crate::models::EntryId;
use crate::{Error, Result};
use rusqlite::{Connection, ErrorCode, ffi};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// Helper to acquire mutex lock with poison recovery.
///
/// If the mutex is poisoned (due to a panic in a previous critical section),
/// we recover the inner value and log a warning. This prevents cascading
/// failures when one operation panics.
pub fn acquire_lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            tracing::warn!("SQLite mutex was poisoned, recovering");
            metrics::counter!("sqlite_mutex_poison_recovery_total").increment(1);
            poisoned.into_inner()
        },
    }
}

/// Opens a connection to a database file, creating parent directories.
///
/// # Errors
///
/// Returns [`Error::OperationFailed`] if the directory or database cannot be created.
pub fn open_connection(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| Error::OperationFailed {
            operation: "create_sqlite_dir".to_string(),
            cause: format!("{}: {e}", parent.display()),
        })?;
    }
    let conn = Connection::open(path).map_err(|e| Error::OperationFailed {
        operation: "open_sqlite".to_string(),
        cause: e.to_string(),
    })?;
    configure_connection(&conn);
    Ok(conn)
}

/// Configures a `SQLite` connection for concurrent use.
///
/// # Configuration Applied
///
/// - **WAL mode**: Enables Write-Ahead Logging for better concurrent read performance
/// - **NORMAL synchronous**: Balances durability with performance
/// - **`busy_timeout`**: Waits up to 5 seconds for locks instead of failing immediately
///
/// In-memory databases ignore WAL and report the `memory` journal mode.
pub fn configure_connection(conn: &Connection) {
    // journal_mode returns a row ("wal"), so pragma results are ignored
    let _ = conn.pragma_update(None, "journal_mode", "WAL");
    let _ = conn.pragma_update(None, "synchronous", "NORMAL");
    let _ = conn.pragma_update(None, "busy_timeout", "5000");
}

/// Maps a driver error, turning unique violations on `id` into [`Error::AlreadyExists`].
///
/// Other constraint failures (`NOT NULL`, `CHECK`) map like any other error.
pub fn store_error(err: &rusqlite::Error, id: EntryId) -> Error {
    if let rusqlite::Error::SqliteFailure(failure, _) = err
        && failure.code == ErrorCode::ConstraintViolation
        && matches!(
            failure.extended_code,
            ffi::SQLITE_CONSTRAINT_UNIQUE | ffi::SQLITE_CONSTRAINT_PRIMARYKEY
        )
    {
        return Error::AlreadyExists(id);
    }
    query_error("sqlite_store", err)
}

/// Maps a driver error to [`Error::OperationFailed`].
pub fn query_error(operation: &str, err: impl std::fmt::Display) -> Error {
    Error::OperationFailed {
        operation: operation.to_string(),
        cause: err.to_string(),
    }
}
