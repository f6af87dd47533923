//! PostgreSQL-based storage backend.
//!
//! Provides shared, server-backed storage. Available with the `postgres`
//! feature; without it the factory reports [`crate::Error::FeatureNotEnabled`].

#[cfg(feature = "postgres")]
mod implementation {
    use crate::models::{Entry, EntryId, Filter};
    use crate::registry::ContentTypes;
    use crate::storage::codec::{COLUMNS, EntryRow, scan_row, serialize_row};
    use crate::storage::metrics::{record_operation_metrics, timed};
    use crate::storage::sql::{
        Dialect, ORDER_BY, SqlParam, build_where, to_sql_int, validate_table_name,
    };
    use crate::storage::traits::StorageBackend;
    use crate::{Error, Result};
    use deadpool_postgres::{Config, Pool, Runtime};
    use std::sync::Arc;
    use std::time::Instant;
    use tokio::runtime::{Handle, RuntimeFlavor};
    use tokio_postgres::NoTls;
    use tokio_postgres::error::SqlState;
    use tokio_postgres::types::ToSql;
    use tracing::instrument;

    const BACKEND: &str = "postgres";

    type BoxedParam = Box<dyn ToSql + Sync>;

    /// PostgreSQL-based storage backend.
    ///
    /// # Concurrency Model
    ///
    /// Connections come from a deadpool pool driven by a runtime owned by the
    /// backend. Synchronous trait calls block on that runtime; inside a
    /// multi-threaded tokio runtime they go through `block_in_place`. Calls
    /// from a current-thread runtime are rejected rather than deadlocking.
    pub struct PostgresBackend {
        /// Connection pool.
        pool: Pool,
        /// Runtime driving pooled connections. Always `Some` until drop.
        runtime: Option<tokio::runtime::Runtime>,
        /// Table name for entries.
        table_name: String,
        content_types: Arc<ContentTypes>,
    }

    /// Helper to map pool errors.
    fn pool_error(e: impl std::fmt::Display) -> Error {
        Error::OperationFailed {
            operation: "postgres_get_client".to_string(),
            cause: e.to_string(),
        }
    }

    /// Helper to map query errors.
    fn query_error(op: &str, e: impl std::fmt::Display) -> Error {
        Error::OperationFailed {
            operation: op.to_string(),
            cause: e.to_string(),
        }
    }

    fn store_error(e: &tokio_postgres::Error, id: EntryId) -> Error {
        if e.code() == Some(&SqlState::UNIQUE_VIOLATION) {
            return Error::AlreadyExists(id);
        }
        query_error("postgres_store", e)
    }

    impl PostgresBackend {
        /// Default maximum connections in pool.
        pub const DEFAULT_POOL_MAX_SIZE: usize = 20;

        /// Connects to PostgreSQL and creates the schema.
        ///
        /// # Arguments
        ///
        /// * `connection_url` - PostgreSQL connection URL
        /// * `table_name` - Name of the table for storing entries
        /// * `pool_max_size` - Maximum connections in pool (defaults to 20)
        /// * `content_types` - Table used to resolve stored content type keys
        ///
        /// # Errors
        ///
        /// Returns an error if the URL or table name is invalid, or the pool
        /// or schema cannot be initialized.
        pub fn connect(
            connection_url: &str,
            table_name: impl Into<String>,
            pool_max_size: Option<usize>,
            content_types: Arc<ContentTypes>,
        ) -> Result<Self> {
            let table_name = table_name.into();
            validate_table_name(&table_name)?;
            let config = Self::parse_connection_url(connection_url)?;
            let cfg = Self::build_pool_config(&config, pool_max_size);

            let runtime = tokio::runtime::Builder::new_multi_thread()
                .worker_threads(1)
                .thread_name("auditlog-postgres")
                .enable_all()
                .build()
                .map_err(|e| query_error("postgres_create_runtime", e))?;

            let pool = {
                let _guard = runtime.enter();
                cfg.create_pool(Some(Runtime::Tokio1), NoTls)
                    .map_err(|e| query_error("postgres_create_pool", e))?
            };

            let backend = Self {
                pool,
                runtime: Some(runtime),
                table_name,
                content_types,
            };
            backend.setup()?;
            Ok(backend)
        }

        /// Returns the table name.
        #[must_use]
        pub fn table(&self) -> &str {
            &self.table_name
        }

        /// Parses the connection URL into a tokio-postgres config.
        fn parse_connection_url(url: &str) -> Result<tokio_postgres::Config> {
            url.parse::<tokio_postgres::Config>()
                .map_err(|e| query_error("postgres_parse_url", e))
        }

        /// Extracts host string from tokio-postgres Host.
        #[cfg(unix)]
        fn host_to_string(h: &tokio_postgres::config::Host) -> String {
            match h {
                tokio_postgres::config::Host::Tcp(s) => s.clone(),
                tokio_postgres::config::Host::Unix(p) => p.to_string_lossy().to_string(),
            }
        }

        /// Extracts host string from tokio-postgres Host (Windows: Tcp only).
        #[cfg(not(unix))]
        fn host_to_string(h: &tokio_postgres::config::Host) -> String {
            let tokio_postgres::config::Host::Tcp(s) = h;
            s.clone()
        }

        /// Builds a deadpool config from tokio-postgres config.
        ///
        /// - Configurable max connections (defaults to 20)
        /// - 5 second wait, create, and recycle timeouts
        fn build_pool_config(
            config: &tokio_postgres::Config,
            pool_max_size: Option<usize>,
        ) -> Config {
            let mut cfg = Config::new();
            cfg.host = config.get_hosts().first().map(Self::host_to_string);
            cfg.port = config.get_ports().first().copied();
            cfg.user = config.get_user().map(String::from);
            cfg.password = config
                .get_password()
                .map(|p| String::from_utf8_lossy(p).to_string());
            cfg.dbname = config.get_dbname().map(String::from);

            let max_size = pool_max_size.unwrap_or(Self::DEFAULT_POOL_MAX_SIZE);
            cfg.pool = Some(deadpool_postgres::PoolConfig {
                max_size,
                timeouts: deadpool_postgres::Timeouts {
                    wait: Some(std::time::Duration::from_secs(5)),
                    create: Some(std::time::Duration::from_secs(5)),
                    recycle: Some(std::time::Duration::from_secs(5)),
                },
                ..Default::default()
            });

            cfg.manager = Some(deadpool_postgres::ManagerConfig {
                recycling_method: deadpool_postgres::RecyclingMethod::Fast,
            });

            cfg
        }

        /// Runs a future on the backend's runtime from synchronous code.
        fn block_on<F, T>(&self, f: F) -> Result<T>
        where
            F: std::future::Future<Output = Result<T>>,
        {
            let Some(runtime) = self.runtime.as_ref() else {
                return Err(query_error("postgres_block_on", "runtime already shut down"));
            };
            match Handle::try_current() {
                Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
                    tokio::task::block_in_place(|| runtime.block_on(f))
                },
                Ok(_) => Err(query_error(
                    "postgres_block_on",
                    "cannot block inside a current-thread runtime",
                )),
                Err(_) => runtime.block_on(f),
            }
        }

        async fn setup_async(&self) -> Result<()> {
            let client = self.pool.get().await.map_err(pool_error)?;
            let ddl = Dialect::Postgres.create_table(&self.table_name).join(";\n");
            client
                .batch_execute(&ddl)
                .await
                .map_err(|e| query_error("postgres_create_table", e))
        }

        async fn insert_async(
            &self,
            client: &deadpool_postgres::Client,
            entry: Entry,
        ) -> Result<EntryId> {
            let entry = if entry.id().is_nil() {
                entry.with_id(EntryId::generate())
            } else {
                entry
            };
            let id = entry.id();
            let row = serialize_row(&entry)?;

            let query = format!(
                "INSERT INTO {} ({COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
                self.table_name
            );
            client
                .execute(
                    &query,
                    &[
                        &row.id,
                        &row.entry_type,
                        &row.level,
                        &row.occurred_at,
                        &row.user_id,
                        &row.object_id,
                        &row.content_type,
                        &row.data,
                    ],
                )
                .await
                .map_err(|e| store_error(&e, id))?;
            Ok(id)
        }

        async fn store_async(&self, entry: Entry) -> Result<EntryId> {
            let client = self.pool.get().await.map_err(pool_error)?;
            self.insert_async(&client, entry).await
        }

        async fn store_many_async(&self, entries: Vec<Entry>) -> crate::storage::BatchReport {
            let mut report = crate::storage::BatchReport::with_capacity(entries.len());
            let client = match self.pool.get().await {
                Ok(client) => client,
                Err(e) => {
                    report.push(Err(pool_error(e)));
                    return report;
                },
            };
            for entry in entries {
                let start = Instant::now();
                let result = self.insert_async(&client, entry).await;
                let failed = result.is_err();
                let status = if failed { "error" } else { "success" };
                record_operation_metrics(BACKEND, "store", start, status);
                report.push(result);
                if failed {
                    let stored = report.stored_ids().len();
                    tracing::warn!(stored, "batch store stopped at first failure");
                    break;
                }
            }
            report
        }

        async fn retrieve_async(&self, id: EntryId) -> Result<Entry> {
            let client = self.pool.get().await.map_err(pool_error)?;
            let query = format!("SELECT {COLUMNS} FROM {} WHERE id = $1", self.table_name);
            let row = client
                .query_opt(&query, &[&id.as_bytes().to_vec()])
                .await
                .map_err(|e| query_error("postgres_retrieve", e))?
                .ok_or(Error::NotFound(id))?;
            scan_row(read_row(&row)?, &self.content_types)
        }

        async fn select_async(
            &self,
            filters: &[Filter],
            amount: usize,
            offset: usize,
        ) -> Result<Vec<Entry>> {
            let mut clause = build_where(filters, Dialect::Postgres)?;
            let limit = clause.next_index();
            clause.params.push(SqlParam::Int(to_sql_int(amount)));
            clause.params.push(SqlParam::Int(to_sql_int(offset)));
            let query = format!(
                "SELECT {COLUMNS} FROM {}{} {ORDER_BY} LIMIT ${limit} OFFSET ${}",
                self.table_name,
                clause.sql,
                limit + 1
            );

            let params = bind_values(clause.params);
            let client = self.pool.get().await.map_err(pool_error)?;
            let rows = client
                .query(&query, &param_refs(&params))
                .await
                .map_err(|e| query_error("postgres_select", e))?;

            rows.iter()
                .map(|row| scan_row(read_row(row)?, &self.content_types))
                .collect()
        }

        async fn count_async(&self, filters: &[Filter]) -> Result<usize> {
            let clause = build_where(filters, Dialect::Postgres)?;
            let query = format!("SELECT COUNT(*) FROM {}{}", self.table_name, clause.sql);
            let params = bind_values(clause.params);
            let client = self.pool.get().await.map_err(pool_error)?;
            let row = client
                .query_one(&query, &param_refs(&params))
                .await
                .map_err(|e| query_error("postgres_count", e))?;
            let count: i64 = row
                .try_get(0)
                .map_err(|e| query_error("postgres_count", e))?;
            usize::try_from(count).map_err(|e| query_error("postgres_count", e))
        }
    }

    impl Drop for PostgresBackend {
        fn drop(&mut self) {
            if let Some(runtime) = self.runtime.take() {
                runtime.shutdown_background();
            }
        }
    }

    fn bind_values(params: Vec<SqlParam>) -> Vec<BoxedParam> {
        params
            .into_iter()
            .map(|param| -> BoxedParam {
                match param {
                    SqlParam::Blob(bytes) => Box::new(bytes),
                    SqlParam::Text(text) => Box::new(text),
                    SqlParam::Int(int) => Box::new(int),
                }
            })
            .collect()
    }

    fn param_refs(params: &[BoxedParam]) -> Vec<&(dyn ToSql + Sync)> {
        params.iter().map(AsRef::as_ref).collect()
    }

    fn read_row(row: &tokio_postgres::Row) -> Result<EntryRow> {
        let get_err = |e: tokio_postgres::Error| query_error("postgres_read_row", e);
        Ok(EntryRow {
            id: row.try_get("id").map_err(get_err)?,
            entry_type: row.try_get("type").map_err(get_err)?,
            level: row.try_get("level").map_err(get_err)?,
            occurred_at: row.try_get("occurred_at").map_err(get_err)?,
            user_id: row.try_get("user_id").map_err(get_err)?,
            object_id: row.try_get("object_id").map_err(get_err)?,
            content_type: row.try_get("content_type").map_err(get_err)?,
            data: row.try_get("data").map_err(get_err)?,
        })
    }

    impl StorageBackend for PostgresBackend {
        fn name(&self) -> &'static str {
            BACKEND
        }

        #[instrument(
            skip(self),
            fields(operation = "setup", backend = BACKEND, table = %self.table_name)
        )]
        fn setup(&self) -> Result<()> {
            timed(BACKEND, "setup", || self.block_on(self.setup_async()))
        }

        #[instrument(
            skip(self, entry),
            fields(operation = "store", backend = BACKEND, entry.type = %entry.entry_type())
        )]
        fn store(&self, entry: Entry) -> Result<EntryId> {
            timed(BACKEND, "store", || self.block_on(self.store_async(entry)))
        }

        #[instrument(
            skip(self, entries),
            fields(operation = "store_many", backend = BACKEND, batch.size = entries.len())
        )]
        fn store_many(&self, entries: Vec<Entry>) -> crate::storage::BatchReport {
            let submitted = entries.len();
            match self.block_on(async { Ok(self.store_many_async(entries).await) }) {
                Ok(report) => report,
                Err(e) => {
                    let mut report = crate::storage::BatchReport::with_capacity(submitted);
                    report.push(Err(e));
                    report
                },
            }
        }

        #[instrument(skip(self), fields(operation = "retrieve", backend = BACKEND, entry.id = %id))]
        fn retrieve(&self, id: EntryId) -> Result<Entry> {
            timed(BACKEND, "retrieve", || self.block_on(self.retrieve_async(id)))
        }

        #[instrument(skip(self), fields(operation = "retrieve_many", backend = BACKEND))]
        fn retrieve_many(&self, amount: usize, offset: usize) -> Result<Vec<Entry>> {
            timed(BACKEND, "retrieve_many", || {
                self.block_on(self.select_async(&[], amount, offset))
            })
        }

        #[instrument(skip(self), fields(operation = "retrieve_typed", backend = BACKEND))]
        fn retrieve_typed(
            &self,
            entry_type: &str,
            amount: usize,
            offset: usize,
        ) -> Result<Vec<Entry>> {
            let filters = [Filter::types([entry_type])];
            timed(BACKEND, "retrieve_typed", || {
                self.block_on(self.select_async(&filters, amount, offset))
            })
        }

        #[instrument(
            skip(self, filters),
            fields(operation = "entry_filter", backend = BACKEND, filters = filters.len())
        )]
        fn entry_filter(
            &self,
            filters: &[Filter],
            amount: usize,
            offset: usize,
        ) -> Result<Vec<Entry>> {
            timed(BACKEND, "entry_filter", || {
                self.block_on(self.select_async(filters, amount, offset))
            })
        }

        #[instrument(
            skip(self, filters),
            fields(operation = "count_filter", backend = BACKEND, filters = filters.len())
        )]
        fn count_filter(&self, filters: &[Filter]) -> Result<usize> {
            timed(BACKEND, "count_filter", || self.block_on(self.count_async(filters)))
        }
    }

}

#[cfg(feature = "postgres")]
pub use implementation::PostgresBackend;
