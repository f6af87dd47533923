//! `SQLite`-based storage backend.
//!
//! Provides durable embedded storage. Filters are translated to SQL by
//! [`build_where`] and evaluated by the database.

use crate::models::{Entry, EntryId, Filter};
use crate::registry::ContentTypes;
use crate::storage::codec::{COLUMNS, EntryRow, scan_row, serialize_row};
use crate::storage::metrics::timed;
use crate::storage::sql::{
    DEFAULT_TABLE, Dialect, ORDER_BY, SqlParam, build_where, to_sql_int, validate_table_name,
};
use crate::storage::sqlite::{
    acquire_lock, configure_connection, open_connection, query_error, store_error,
};
use crate::storage::traits::{BatchReport, StorageBackend};
use crate::{Error, Result};
use rusqlite::types::Value;
use rusqlite::{Connection, OptionalExtension, params, params_from_iter};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::instrument;

const BACKEND: &str = "sqlite";

/// `SQLite`-based storage backend.
///
/// # Concurrency Model
///
/// Uses a `Mutex<Connection>` for thread-safe access. `SQLite`'s WAL mode and
/// `busy_timeout` pragma mitigate contention:
///
/// - **WAL mode**: Allows concurrent readers with a single writer
/// - **`busy_timeout`**: Waits up to 5 seconds for locks instead of failing immediately
/// - **NORMAL synchronous**: Balances durability with performance
///
/// # Schema
///
/// One table (default `audit_logs`) with an autoincrement `seq` column that
/// records insertion order, a unique `id`, and one column per entry field.
/// See [`crate::storage::codec`] for the column encodings.
pub struct SqliteBackend {
    /// Protected by Mutex because `rusqlite::Connection` is not `Sync`.
    conn: Mutex<Connection>,
    /// Path to the database (None for in-memory).
    db_path: Option<PathBuf>,
    table: String,
    content_types: Arc<ContentTypes>,
}

impl SqliteBackend {
    /// Opens (or creates) a database file and its schema.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for an invalid table name, or an
    /// error if the database cannot be opened or initialized.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use auditlog::ContentTypes;
    /// use auditlog::storage::SqliteBackend;
    /// use std::sync::Arc;
    ///
    /// let content_types = Arc::new(ContentTypes::new());
    /// let backend = SqliteBackend::open("./audit.db", "audit_logs", content_types)?;
    /// # Ok::<(), auditlog::Error>(())
    /// ```
    pub fn open(
        db_path: impl Into<PathBuf>,
        table: impl Into<String>,
        content_types: Arc<ContentTypes>,
    ) -> Result<Self> {
        let db_path = db_path.into();
        let table = table.into();
        validate_table_name(&table)?;
        let conn = open_connection(&db_path)?;

        let backend = Self {
            conn: Mutex::new(conn),
            db_path: Some(db_path),
            table,
            content_types,
        };
        backend.setup()?;
        Ok(backend)
    }

    /// Creates an in-memory database using the default table (useful for testing).
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be initialized.
    pub fn in_memory(content_types: Arc<ContentTypes>) -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| query_error("open_sqlite_in_memory", e))?;
        configure_connection(&conn);

        let backend = Self {
            conn: Mutex::new(conn),
            db_path: None,
            table: DEFAULT_TABLE.to_string(),
            content_types,
        };
        backend.setup()?;
        Ok(backend)
    }

    /// Returns the database path (None for in-memory).
    #[must_use]
    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    /// Returns the table name.
    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }

    fn insert(&self, conn: &Connection, entry: Entry) -> Result<EntryId> {
        let entry = if entry.id().is_nil() {
            entry.with_id(EntryId::generate())
        } else {
            entry
        };
        let id = entry.id();
        let row = serialize_row(&entry)?;

        conn.execute(
            &format!(
                "INSERT INTO {} ({COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                self.table
            ),
            params![
                row.id,
                row.entry_type,
                row.level,
                row.occurred_at,
                row.user_id,
                row.object_id,
                row.content_type,
                row.data
            ],
        )
        .map_err(|e| store_error(&e, id))?;
        Ok(id)
    }

    fn select(&self, filters: &[Filter], amount: usize, offset: usize) -> Result<Vec<Entry>> {
        let mut clause = build_where(filters, Dialect::Sqlite)?;
        let limit = clause.next_index();
        clause.params.push(SqlParam::Int(to_sql_int(amount)));
        clause.params.push(SqlParam::Int(to_sql_int(offset)));

        let sql = format!(
            "SELECT {COLUMNS} FROM {}{} {ORDER_BY} LIMIT ?{limit} OFFSET ?{}",
            self.table,
            clause.sql,
            limit + 1
        );

        let rows = {
            let conn = acquire_lock(&self.conn);
            let mut stmt = conn
                .prepare(&sql)
                .map_err(|e| query_error("prepare_select", e))?;
            stmt.query_map(params_from_iter(bind_values(clause.params)), read_row)
                .map_err(|e| query_error("select_entries", e))?
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(|e| query_error("select_entries", e))?
        };

        rows.into_iter()
            .map(|row| scan_row(row, &self.content_types))
            .collect()
    }
}

impl StorageBackend for SqliteBackend {
    fn name(&self) -> &'static str {
        BACKEND
    }

    #[instrument(skip(self), fields(operation = "setup", backend = BACKEND, table = %self.table))]
    fn setup(&self) -> Result<()> {
        timed(BACKEND, "setup", || {
            let conn = acquire_lock(&self.conn);
            for statement in Dialect::Sqlite.create_table(&self.table) {
                conn.execute(&statement, [])
                    .map_err(|e| query_error("create_audit_table", e))?;
            }
            Ok(())
        })
    }

    #[instrument(
        skip(self, entry),
        fields(operation = "store", backend = BACKEND, entry.type = %entry.entry_type())
    )]
    fn store(&self, entry: Entry) -> Result<EntryId> {
        timed(BACKEND, "store", || {
            let conn = acquire_lock(&self.conn);
            self.insert(&conn, entry)
        })
    }

    #[instrument(
        skip(self, entries),
        fields(operation = "store_many", backend = BACKEND, batch.size = entries.len())
    )]
    fn store_many(&self, entries: Vec<Entry>) -> BatchReport {
        let mut report = BatchReport::with_capacity(entries.len());
        let conn = acquire_lock(&self.conn);
        for entry in entries {
            let result = timed(BACKEND, "store", || self.insert(&conn, entry));
            let failed = result.is_err();
            report.push(result);
            if failed {
                let stored = report.stored_ids().len();
                tracing::warn!(stored, "batch store stopped at first failure");
                break;
            }
        }
        report
    }

    #[instrument(skip(self), fields(operation = "retrieve", backend = BACKEND, entry.id = %id))]
    fn retrieve(&self, id: EntryId) -> Result<Entry> {
        timed(BACKEND, "retrieve", || {
            let row = {
                let conn = acquire_lock(&self.conn);
                conn.query_row(
                    &format!("SELECT {COLUMNS} FROM {} WHERE id = ?1", self.table),
                    params![id.as_bytes().to_vec()],
                    read_row,
                )
                .optional()
                .map_err(|e| query_error("retrieve_entry", e))?
            };
            let row = row.ok_or(Error::NotFound(id))?;
            scan_row(row, &self.content_types)
        })
    }

    #[instrument(skip(self), fields(operation = "retrieve_many", backend = BACKEND))]
    fn retrieve_many(&self, amount: usize, offset: usize) -> Result<Vec<Entry>> {
        timed(BACKEND, "retrieve_many", || self.select(&[], amount, offset))
    }

    #[instrument(skip(self), fields(operation = "retrieve_typed", backend = BACKEND))]
    fn retrieve_typed(
        &self,
        entry_type: &str,
        amount: usize,
        offset: usize,
    ) -> Result<Vec<Entry>> {
        timed(BACKEND, "retrieve_typed", || {
            self.select(&[Filter::types([entry_type])], amount, offset)
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
        timed(BACKEND, "entry_filter", || self.select(filters, amount, offset))
    }

    #[instrument(
        skip(self, filters),
        fields(operation = "count_filter", backend = BACKEND, filters = filters.len())
    )]
    fn count_filter(&self, filters: &[Filter]) -> Result<usize> {
        timed(BACKEND, "count_filter", || {
            let clause = build_where(filters, Dialect::Sqlite)?;
            let sql = format!("SELECT COUNT(*) FROM {}{}", self.table, clause.sql);
            let conn = acquire_lock(&self.conn);
            let count: i64 = conn
                .query_row(&sql, params_from_iter(bind_values(clause.params)), |row| {
                    row.get(0)
                })
                .map_err(|e| query_error("count_entries", e))?;
            usize::try_from(count).map_err(|e| query_error("count_entries", e))
        })
    }
}

fn bind_values(params: Vec<SqlParam>) -> impl Iterator<Item = Value> {
    params.into_iter().map(|param| match param {
        SqlParam::Blob(bytes) => Value::Blob(bytes),
        SqlParam::Text(text) => Value::Text(text),
        SqlParam::Int(int) => Value::Integer(int),
    })
}

fn read_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<EntryRow> {
    Ok(EntryRow {
        id: row.get(0)?,
        entry_type: row.get(1)?,
        level: row.get(2)?,
        occurred_at: row.get(3)?,
        user_id: row.get(4)?,
        object_id: row.get(5)?,
        content_type: row.get(6)?,
        data: row.get(7)?,
    })
}
