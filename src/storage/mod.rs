//! Storage layer.
//!
//! - [`StorageBackend`]: the contract every backend implements
//! - [`MemoryBackend`], [`SqliteBackend`], and `PostgresBackend` (feature `postgres`)
//! - [`open_backend`]: construction from [`crate::config::StorageConfig`]
//!
//! The SQL backends share one row codec ([`codec`]) and one filter
//! translation ([`sql`]), so every backend answers a query identically.

// Allow significant_drop_tightening - dropping database connections slightly early
// provides no meaningful benefit.
#![allow(clippy::significant_drop_tightening)]

pub mod codec;
mod factory;
pub mod metrics;
pub mod persistence;
pub mod sql;
pub mod sqlite;
pub mod traits;

pub use factory::open_backend;
#[cfg(feature = "postgres")]
pub use persistence::PostgresBackend;
pub use persistence::{MemoryBackend, SqliteBackend};
pub use traits::{BatchReport, StorageBackend};
