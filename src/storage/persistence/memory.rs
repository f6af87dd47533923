//! In-memory storage backend.
//!
//! The reference implementation of [`StorageBackend`] and the default backend
//! of a [`Registry`](crate::Registry). Data lives for the lifetime of the
//! process; it is meant for tests and low-volume deployments, not as a
//! durable audit trail.

use crate::models::{Entry, EntryId, Filter, matches_all};
use crate::storage::metrics::timed;
use crate::storage::traits::{BatchReport, StorageBackend};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::instrument;

const BACKEND: &str = "memory";

/// Position of an entry in the canonical newest-first order.
type OrderKey = (Reverse<DateTime<Utc>>, Reverse<u64>);

/// In-memory storage backend.
///
/// Entries are keyed by identifier, with an ordered index on
/// `(timestamp, insertion sequence)` so every scan walks entries newest first
/// without sorting.
///
/// # Concurrency Model
///
/// A single `RwLock` guards all state. Reads share the lock; `store` and
/// `store_many` take it exclusively, the latter for the whole batch. There is
/// no finer-grained locking, so heavy concurrent writes serialize fully.
///
/// # Complexity
///
/// Scans are O(n) in the number of stored entries (filters are evaluated
/// linearly); `retrieve` is O(1); `store` is O(log n).
#[derive(Debug, Default)]
pub struct MemoryBackend {
    inner: RwLock<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    entries: HashMap<EntryId, Entry>,
    order: BTreeMap<OrderKey, EntryId>,
    next_seq: u64,
}

impl Inner {
    fn insert(&mut self, entry: Entry) -> Result<EntryId> {
        let entry = if entry.id().is_nil() {
            entry.with_id(EntryId::generate())
        } else {
            entry
        };
        let id = entry.id();
        if self.entries.contains_key(&id) {
            return Err(Error::AlreadyExists(id));
        }

        let seq = self.next_seq;
        self.next_seq += 1;
        self.order.insert((Reverse(entry.timestamp()), Reverse(seq)), id);
        self.entries.insert(id, entry);
        Ok(id)
    }

    /// Walks entries newest first, skipping `offset` matches and keeping up to `amount`.
    fn scan(&self, amount: usize, offset: usize, predicate: impl Fn(&Entry) -> bool) -> Vec<Entry> {
        self.ordered()
            .filter(|entry| predicate(entry))
            .skip(offset)
            .take(amount)
            .cloned()
            .collect()
    }

    fn ordered(&self) -> impl Iterator<Item = &Entry> {
        self.order.values().filter_map(|id| self.entries.get(id))
    }
}

impl MemoryBackend {
    /// Creates an empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.read().entries.len()
    }

    /// Returns `true` if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(|poisoned| {
            tracing::warn!("memory backend lock was poisoned, recovering");
            metrics::counter!("memory_backend_poison_recovery_total").increment(1);
            poisoned.into_inner()
        })
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(|poisoned| {
            tracing::warn!("memory backend lock was poisoned, recovering");
            metrics::counter!("memory_backend_poison_recovery_total").increment(1);
            poisoned.into_inner()
        })
    }
}

impl StorageBackend for MemoryBackend {
    fn name(&self) -> &'static str {
        BACKEND
    }

    fn setup(&self) -> Result<()> {
        Ok(())
    }

    #[instrument(
        skip(self, entry),
        fields(operation = "store", backend = BACKEND, entry.type = %entry.entry_type())
    )]
    fn store(&self, entry: Entry) -> Result<EntryId> {
        timed(BACKEND, "store", || self.write().insert(entry))
    }

    #[instrument(
        skip(self, entries),
        fields(operation = "store_many", backend = BACKEND, batch.size = entries.len())
    )]
    fn store_many(&self, entries: Vec<Entry>) -> BatchReport {
        let mut report = BatchReport::with_capacity(entries.len());
        let mut inner = self.write();
        for entry in entries {
            let result = timed(BACKEND, "store", || inner.insert(entry));
            if let Err(e) = &result {
                let stored = report.results().len();
                tracing::warn!(error = %e, stored, "batch store stopped at first failure");
                report.push(result);
                break;
            }
            report.push(result);
        }
        report
    }

    #[instrument(skip(self), fields(operation = "retrieve", backend = BACKEND, entry.id = %id))]
    fn retrieve(&self, id: EntryId) -> Result<Entry> {
        timed(BACKEND, "retrieve", || {
            self.read()
                .entries
                .get(&id)
                .cloned()
                .ok_or(Error::NotFound(id))
        })
    }

    #[instrument(skip(self), fields(operation = "retrieve_many", backend = BACKEND))]
    fn retrieve_many(&self, amount: usize, offset: usize) -> Result<Vec<Entry>> {
        timed(BACKEND, "retrieve_many", || {
            Ok(self.read().scan(amount, offset, |_| true))
        })
    }

    #[instrument(skip(self), fields(operation = "retrieve_typed", backend = BACKEND))]
    fn retrieve_typed(
        &self,
        entry_type: &str,
        amount: usize,
        offset: usize,
    ) -> Result<Vec<Entry>> {
        timed(BACKEND, "retrieve_typed", || {
            Ok(self
                .read()
                .scan(amount, offset, |e| e.entry_type() == entry_type))
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
            Ok(self
                .read()
                .scan(amount, offset, |e| matches_all(filters, e)))
        })
    }

    #[instrument(
        skip(self, filters),
        fields(operation = "count_filter", backend = BACKEND, filters = filters.len())
    )]
    fn count_filter(&self, filters: &[Filter]) -> Result<usize> {
        timed(BACKEND, "count_filter", || {
            Ok(self
                .read()
                .ordered()
                .filter(|e| matches_all(filters, e))
                .count())
        })
    }

    fn count(&self) -> Result<usize> {
        Ok(self.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Level;
    use chrono::{Duration, TimeZone};
    use std::sync::Arc;
    use std::thread;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn test_store_assigns_id() {
        let backend = MemoryBackend::new();
        let id = backend.store(Entry::new("a", Level::Info)).unwrap();
        assert!(!id.is_nil());
        assert_eq!(backend.retrieve(id).unwrap().id(), id);
    }

    #[test]
    fn test_store_preserves_id_and_rejects_duplicates() {
        let backend = MemoryBackend::new();
        let id = EntryId::generate();
        assert_eq!(backend.store(Entry::new("a", Level::Info).with_id(id)).unwrap(), id);
        let err = backend.store(Entry::new("b", Level::Info).with_id(id)).unwrap_err();
        assert!(matches!(err, Error::AlreadyExists(dup) if dup == id));
        assert_eq!(backend.len(), 1);
    }

    #[test]
    fn test_retrieve_unknown_id() {
        let backend = MemoryBackend::new();
        let err = backend.retrieve(EntryId::generate()).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_scans_are_newest_first_regardless_of_store_order() {
        let backend = MemoryBackend::new();
        for secs in [5, 1, 9, 3] {
            backend
                .store(Entry::new(format!("t{secs}"), Level::Info).with_timestamp(at(secs)))
                .unwrap();
        }
        let types: Vec<_> = backend
            .retrieve_many(10, 0)
            .unwrap()
            .iter()
            .map(|e| e.entry_type().to_string())
            .collect();
        assert_eq!(types, ["t9", "t5", "t3", "t1"]);
    }

    #[test]
    fn test_equal_timestamps_newest_insert_first() {
        let backend = MemoryBackend::new();
        let a = backend.store(Entry::new("a", Level::Info).with_timestamp(at(0))).unwrap();
        let b = backend.store(Entry::new("b", Level::Info).with_timestamp(at(0))).unwrap();
        let ids: Vec<_> = backend.retrieve_many(2, 0).unwrap().iter().map(Entry::id).collect();
        assert_eq!(ids, [b, a]);
    }

    #[test]
    fn test_offset_applies_to_matches() {
        let backend = MemoryBackend::new();
        for i in 0..10 {
            let kind = if i % 2 == 0 { "even" } else { "odd" };
            backend
                .store(Entry::new(kind, Level::Info).with_timestamp(at(i)))
                .unwrap();
        }
        let page = backend.retrieve_typed("even", 2, 1).unwrap();
        let stamps: Vec<_> = page.iter().map(Entry::timestamp).collect();
        assert_eq!(stamps, [at(6), at(4)]);

        let filtered = backend
            .entry_filter(&[Filter::types(["odd"])], 10, 4)
            .unwrap();
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].timestamp(), at(1));
    }

    #[test]
    fn test_store_many_stops_at_first_failure() {
        let backend = MemoryBackend::new();
        let taken = backend.store(Entry::new("x", Level::Info)).unwrap();
        let batch = vec![
            Entry::new("a", Level::Info),
            Entry::new("b", Level::Info).with_id(taken),
            Entry::new("c", Level::Info),
        ];
        let report = backend.store_many(batch);
        assert_eq!(report.stored_ids().len(), 1);
        assert_eq!(report.failure().map(|(idx, _)| idx), Some(1));
        assert_eq!(report.unattempted(), 1);
        assert_eq!(backend.len(), 2);
    }

    #[test]
    fn test_count_filter() {
        let backend = MemoryBackend::new();
        let base = at(0);
        for i in 0..6 {
            backend
                .store(
                    Entry::new("t", Level::ALL[i % 5])
                        .with_timestamp(base + Duration::seconds(i64::try_from(i).unwrap())),
                )
                .unwrap();
        }
        assert_eq!(backend.count().unwrap(), 6);
        assert_eq!(backend.count_filter(&[Filter::level_gt(Level::Warn)]).unwrap(), 2);
        assert_eq!(backend.count_filter(&[Filter::Type(Vec::new())]).unwrap(), 0);
    }

    #[test]
    fn test_concurrent_writers_and_readers() {
        let backend = Arc::new(MemoryBackend::new());
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let backend = Arc::clone(&backend);
                thread::spawn(move || {
                    for _ in 0..25 {
                        backend.store(Entry::new(format!("w{t}"), Level::Info)).unwrap();
                        let _ = backend.retrieve_many(5, 0).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(backend.len(), 200);
        assert_eq!(backend.retrieve_typed("w3", 100, 0).unwrap().len(), 25);
    }
}
