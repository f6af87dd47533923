//! Storage backend implementations.

mod memory;
mod postgresql;
mod sqlite;

pub use memory::MemoryBackend;
pub use sqlite::SqliteBackend;

// PostgreSQL backend available with feature flag
#[cfg(feature = "postgres")]
pub use postgresql::PostgresBackend;
