//! Backend construction from configuration.

use crate::config::{BackendKind, StorageConfig};
use crate::registry::ContentTypes;
use crate::storage::persistence::{MemoryBackend, SqliteBackend};
use crate::storage::traits::StorageBackend;
use crate::{Error, Result};
use std::sync::Arc;

/// Opens the backend selected by `config`.
///
/// SQL backends create their schema before returning.
///
/// # Errors
///
/// Returns [`Error::FeatureNotEnabled`] for PostgreSQL without the `postgres`
/// feature, [`Error::InvalidInput`] for a missing URL or invalid table name,
/// or the backend's connection error.
pub fn open_backend(
    config: &StorageConfig,
    content_types: Arc<ContentTypes>,
) -> Result<Arc<dyn StorageBackend>> {
    tracing::debug!(
        backend = config.backend.as_str(),
        table = %config.table,
        "opening storage backend"
    );
    match config.backend {
        BackendKind::Memory => Ok(Arc::new(MemoryBackend::new())),
        BackendKind::Sqlite => Ok(Arc::new(SqliteBackend::open(
            &config.sqlite_path,
            &config.table,
            content_types,
        )?)),
        BackendKind::Postgres => open_postgres(config, content_types),
    }
}

#[cfg(feature = "postgres")]
fn open_postgres(
    config: &StorageConfig,
    content_types: Arc<ContentTypes>,
) -> Result<Arc<dyn StorageBackend>> {
    let url = config
        .postgres_url
        .as_deref()
        .ok_or_else(|| Error::InvalidInput("postgres backend requires postgres_url".to_string()))?;
    Ok(Arc::new(crate::storage::persistence::PostgresBackend::connect(
        url,
        &config.table,
        config.pool_max_size,
        content_types,
    )?))
}

#[cfg(not(feature = "postgres"))]
fn open_postgres(
    _config: &StorageConfig,
    _content_types: Arc<ContentTypes>,
) -> Result<Arc<dyn StorageBackend>> {
    Err(Error::FeatureNotEnabled("postgres".to_string()))
}
