//! Storage backend trait.
//!
//! Every backend persists immutable [`Entry`] records and answers the same
//! queries with the same results. Backends differ only in durability and
//! concurrency characteristics.
//!
//! # Available Implementations
//!
//! | Backend | Use Case | Durability |
//! |---------|----------|------------|
//! | `MemoryBackend` | Default; tests, low volume | Process lifetime |
//! | `SqliteBackend` | Embedded deployments | File (WAL) |
//! | `PostgresBackend` | Shared deployments | Server |
//!
//! # Ordering
//!
//! All read operations return entries newest first: `timestamp` descending,
//! ties broken by insertion order descending. `offset` and `amount` apply to
//! that ordered sequence (after filtering, for the filter operations), so
//! consecutive pages never overlap or skip entries.
//!
//! # Error Modes
//!
//! | Error | Raised By |
//! |-------|-----------|
//! | `Error::NotFound` | `retrieve` with an unknown identifier |
//! | `Error::AlreadyExists` | `store` with an identifier already in use |
//! | `Error::InvalidScanType` / `Error::Decode` | SQL rows that cannot be read back |
//! | `Error::OperationFailed` | Driver and connection failures, passed through once |
//!
//! No operation retries, and `store_many` is not transactional.

use crate::Result;
use crate::models::{Entry, EntryId, Filter};

/// Trait for audit-log storage backends.
///
/// # Implementor Notes
///
/// - Methods use `&self` to enable sharing via `Arc<dyn StorageBackend>`
/// - Use interior mutability (e.g., `RwLock`, `Mutex<Connection>`) for state
/// - `store` must assign [`EntryId::generate`] when the entry's id is nil
/// - Filter operations must agree with [`crate::models::matches_all`]
pub trait StorageBackend: Send + Sync {
    /// Short backend name used in logs and metrics.
    fn name(&self) -> &'static str;

    /// Creates the schema. Safe to call on every start.
    ///
    /// # Errors
    ///
    /// Returns an error if the schema cannot be created.
    fn setup(&self) -> Result<()>;

    /// Persists one entry and returns its effective identifier.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::AlreadyExists`] if the identifier is taken, or
    /// the underlying storage error.
    fn store(&self, entry: Entry) -> Result<EntryId>;

    /// Persists entries in order, stopping at the first failure.
    ///
    /// The report holds one result per attempted entry; entries after a
    /// failure are not attempted.
    fn store_many(&self, entries: Vec<Entry>) -> BatchReport {
        let mut report = BatchReport::with_capacity(entries.len());
        for entry in entries {
            let result = self.store(entry);
            let failed = result.is_err();
            report.push(result);
            if failed {
                break;
            }
        }
        report
    }

    /// Retrieves one entry by identifier.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::NotFound`] if no entry has this identifier.
    fn retrieve(&self, id: EntryId) -> Result<Entry>;

    /// Returns up to `amount` entries starting at `offset`.
    ///
    /// # Errors
    ///
    /// Returns an error if the scan fails.
    fn retrieve_many(&self, amount: usize, offset: usize) -> Result<Vec<Entry>>;

    /// Returns up to `amount` entries of one type starting at `offset`.
    ///
    /// # Errors
    ///
    /// Returns an error if the scan fails.
    fn retrieve_typed(&self, entry_type: &str, amount: usize, offset: usize)
    -> Result<Vec<Entry>>;

    /// Returns up to `amount` entries matching every filter, starting at
    /// `offset` within the matching entries.
    ///
    /// # Errors
    ///
    /// Returns an error if the scan fails.
    fn entry_filter(&self, filters: &[Filter], amount: usize, offset: usize)
    -> Result<Vec<Entry>>;

    /// Counts entries matching every filter.
    ///
    /// # Errors
    ///
    /// Returns an error if the count fails.
    fn count_filter(&self, filters: &[Filter]) -> Result<usize>;

    /// Counts all entries.
    ///
    /// # Errors
    ///
    /// Returns an error if the count fails.
    fn count(&self) -> Result<usize> {
        self.count_filter(&[])
    }
}

/// Outcome of [`StorageBackend::store_many`].
///
/// Holds one result per attempted entry, in input order. A batch stops at its
/// first failure, so a report with a failure may cover fewer entries than
/// were submitted.
#[derive(Debug, Default)]
pub struct BatchReport {
    results: Vec<Result<EntryId>>,
    submitted: usize,
}

impl BatchReport {
    /// Creates an empty report for a batch of `submitted` entries.
    #[must_use]
    pub fn with_capacity(submitted: usize) -> Self {
        Self {
            results: Vec::with_capacity(submitted),
            submitted,
        }
    }

    /// Records the result of the next entry.
    pub fn push(&mut self, result: Result<EntryId>) {
        self.results.push(result);
    }

    /// Returns the per-entry results.
    #[must_use]
    pub fn results(&self) -> &[Result<EntryId>] {
        &self.results
    }

    /// Returns the identifiers of the entries that were stored.
    #[must_use]
    pub fn stored_ids(&self) -> Vec<EntryId> {
        self.results
            .iter()
            .filter_map(|r| r.as_ref().ok().copied())
            .collect()
    }

    /// Returns the index and error of the failed entry, if any.
    #[must_use]
    pub fn failure(&self) -> Option<(usize, &crate::Error)> {
        self.results
            .iter()
            .enumerate()
            .find_map(|(idx, r)| r.as_ref().err().map(|e| (idx, e)))
    }

    /// Returns the number of entries that were never attempted.
    #[must_use]
    pub fn unattempted(&self) -> usize {
        self.submitted.saturating_sub(self.results.len())
    }

    /// Returns `true` if every submitted entry was stored.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.results.len() == self.submitted && self.results.iter().all(Result::is_ok)
    }

    /// Converts the report into the stored identifiers, or the first error.
    ///
    /// # Errors
    ///
    /// Returns the error of the failed entry.
    pub fn into_result(self) -> Result<Vec<EntryId>> {
        self.results.into_iter().collect()
    }
}
