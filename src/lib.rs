//! # auditlog
//!
//! Storage and filtering engine for immutable audit-log entries.
//!
//! Entries are persisted through interchangeable [`StorageBackend`]s
//! (in-memory, `SQLite`, and PostgreSQL behind the `postgres` feature) and
//! queried with paginated scans or composable [`Filter`] predicates that every
//! backend evaluates identically. A constructor-injected [`Registry`] binds
//! entries to per-type [`Definition`](registry::Definition)s for display.
//!
//! ## Example
//!
//! ```rust
//! use auditlog::{Entry, Filter, Level, Registry};
//!
//! let registry = Registry::new();
//! let backend = registry.backend();
//! backend.store(Entry::new("user.login", Level::Info).with_user_id("alice"))?;
//! backend.store(Entry::new("user.logout", Level::Debug).with_user_id("alice"))?;
//!
//! let logins = backend.entry_filter(&[Filter::types(["user.login"])], 10, 0)?;
//! assert_eq!(logins.len(), 1);
//! # Ok::<(), auditlog::Error>(())
//! ```

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]
#![forbid(unsafe_code)]
#![allow(clippy::multiple_crate_versions)]

use thiserror::Error as ThisError;

pub mod config;
pub mod models;
pub mod observability;
pub mod registry;
pub mod storage;

pub use config::AuditConfig;
pub use models::{ContentType, Entry, EntryId, Filter, FilterName, Level};
pub use registry::{BoundDefinition, ContentTypes, Definition, HookScope, Registry, RequestContext};
pub use storage::{BatchReport, StorageBackend};

/// Error type for audit-log operations.
///
/// # Error Variant Triggers
///
/// | Variant | Raised When |
/// |---------|-------------|
/// | `NotFound` | `retrieve` is called with an identifier no entry has |
/// | `AlreadyExists` | An entry is stored with an identifier already in use |
/// | `InvalidScanType` | A SQL row names a content type missing from the table |
/// | `Decode` | A SQL column cannot be decoded back into its field |
/// | `InvalidInput` | Malformed identifiers, levels, filter values, table names |
/// | `OperationFailed` | Driver, connection, pool, or I/O failures |
/// | `FeatureNotEnabled` | A backend is configured whose feature was not compiled in |
#[derive(Debug, ThisError)]
pub enum Error {
    /// No entry has the requested identifier.
    #[error("entry not found: {0}")]
    NotFound(EntryId),

    /// An entry with this identifier is already stored.
    #[error("entry already exists: {0}")]
    AlreadyExists(EntryId),

    /// A stored content type key is not registered.
    #[error("invalid scan type: content type '{key}' is not registered")]
    InvalidScanType {
        /// The unresolved content type key.
        key: String,
    },

    /// A stored column could not be decoded.
    #[error("failed to decode column '{column}': {cause}")]
    Decode {
        /// The column that failed.
        column: &'static str,
        /// The underlying cause.
        cause: String,
    },

    /// Invalid input was provided.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// An operation failed.
    ///
    /// Raised when:
    /// - `SQLite` or PostgreSQL statements fail
    /// - A connection pool or runtime cannot be created
    /// - Configuration or log files cannot be read
    #[error("operation '{operation}' failed: {cause}")]
    OperationFailed {
        /// The operation that failed.
        operation: String,
        /// The underlying cause.
        cause: String,
    },

    /// Feature not enabled (requires feature flag).
    #[error("feature not enabled: {0} (compile with --features {0})")]
    FeatureNotEnabled(String),
}

impl Error {
    /// Returns `true` for [`Error::NotFound`].
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// Result type alias for audit-log operations.
pub type Result<T> = std::result::Result<T, Error>;
