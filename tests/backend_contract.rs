//! Behaviour every storage backend must share.
//!
//! Each test runs against the in-memory and `SQLite` backends; results must be
//! identical, including ordering and pagination.

// Integration tests use expect/unwrap for simplicity - panics are acceptable in tests
#![allow(clippy::expect_used, clippy::unwrap_used)]

use auditlog::storage::{MemoryBackend, SqliteBackend};
use auditlog::{ContentType, ContentTypes, Entry, EntryId, Error, Filter, Level, StorageBackend};
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::{Map, Value, json};
use std::sync::Arc;
use test_case::test_case;

#[derive(Debug, Clone, Copy)]
enum Kind {
    Memory,
    Sqlite,
}

fn content_types() -> Arc<ContentTypes> {
    let types = ContentTypes::new();
    types.register_key(ContentType::new("shop", "Order"));
    types.register_key(ContentType::new("auth", "User"));
    types.register_key(ContentType::new("acme.shop", "Order"));
    Arc::new(types)
}

fn backend(kind: Kind) -> Box<dyn StorageBackend> {
    match kind {
        Kind::Memory => Box::new(MemoryBackend::new()),
        Kind::Sqlite => Box::new(SqliteBackend::in_memory(content_types()).unwrap()),
    }
}

fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()
}

fn level_of(i: usize) -> Level {
    Level::ALL[i % Level::ALL.len()]
}

/// Stores 24 entries, one second apart, `type-{i}` with level `i % 5`.
fn seed(backend: &dyn StorageBackend) -> Vec<EntryId> {
    (0..24)
        .map(|i| {
            let entry = Entry::new(format!("type-{i}"), level_of(i))
                .with_timestamp(base_time() + Duration::seconds(i64::try_from(i).unwrap()))
                .with_user_id(format!("user-{}", i % 3))
                .with_field("n", i);
            backend.store(entry).unwrap()
        })
        .collect()
}

fn types_of(entries: &[Entry]) -> Vec<String> {
    entries.iter().map(|e| e.entry_type().to_string()).collect()
}

#[test_case(Kind::Memory ; "memory")]
#[test_case(Kind::Sqlite ; "sqlite")]
fn stored_entry_round_trips(kind: Kind) {
    let backend = backend(kind);
    let mut data = Map::new();
    data.insert("total".to_string(), json!(12.5));
    data.insert("items".to_string(), json!(["a", "b"]));
    data.insert("meta".to_string(), json!({"source": "web", "retry": null}));

    let entry = Entry::new("order.paid", Level::Warn)
        .with_timestamp(base_time())
        .with_user_id(json!({"id": 7, "kind": "staff"}))
        .with_object_id(42)
        .with_content_type(ContentType::new("shop", "Order"))
        .with_data(data);

    let id = backend.store(entry.clone()).unwrap();
    let stored = backend.retrieve(id).unwrap();

    assert_eq!(stored, entry.with_id(id));
    assert_eq!(stored.object_id_as::<i64>().unwrap(), Some(42));
}

#[test_case(Kind::Memory ; "memory")]
#[test_case(Kind::Sqlite ; "sqlite")]
fn store_assigns_and_keeps_ids(kind: Kind) {
    let backend = backend(kind);
    let assigned = backend.store(Entry::new("a", Level::Info)).unwrap();
    assert!(!assigned.is_nil());

    let explicit = EntryId::generate();
    let kept = backend
        .store(Entry::new("b", Level::Info).with_id(explicit))
        .unwrap();
    assert_eq!(kept, explicit);
    assert_eq!(backend.retrieve(explicit).unwrap().entry_type(), "b");
}

#[test_case(Kind::Memory ; "memory")]
#[test_case(Kind::Sqlite ; "sqlite")]
fn duplicate_id_is_rejected(kind: Kind) {
    let backend = backend(kind);
    let id = EntryId::generate();
    backend.store(Entry::new("a", Level::Info).with_id(id)).unwrap();

    let err = backend
        .store(Entry::new("b", Level::Info).with_id(id))
        .unwrap_err();
    assert!(matches!(err, Error::AlreadyExists(dup) if dup == id));
    assert_eq!(backend.retrieve(id).unwrap().entry_type(), "a");
    assert_eq!(backend.count().unwrap(), 1);
}

#[test_case(Kind::Memory ; "memory")]
#[test_case(Kind::Sqlite ; "sqlite")]
fn retrieve_unknown_id_is_not_found(kind: Kind) {
    let backend = backend(kind);
    seed(backend.as_ref());
    let err = backend.retrieve(EntryId::generate()).unwrap_err();
    assert!(err.is_not_found());
}

#[test_case(Kind::Memory ; "memory")]
#[test_case(Kind::Sqlite ; "sqlite")]
fn retrieve_many_is_newest_first(kind: Kind) {
    let backend = backend(kind);
    seed(backend.as_ref());

    let page = backend.retrieve_many(3, 0).unwrap();
    assert_eq!(types_of(&page), ["type-23", "type-22", "type-21"]);

    let page = backend.retrieve_many(3, 22).unwrap();
    assert_eq!(types_of(&page), ["type-1", "type-0"]);

    assert!(backend.retrieve_many(3, 24).unwrap().is_empty());
    assert!(backend.retrieve_many(0, 0).unwrap().is_empty());
}

#[test_case(Kind::Memory ; "memory")]
#[test_case(Kind::Sqlite ; "sqlite")]
fn pages_concatenate_to_full_scan(kind: Kind) {
    let backend = backend(kind);
    seed(backend.as_ref());

    let all = backend.retrieve_many(100, 0).unwrap();
    assert_eq!(all.len(), 24);

    let mut paged = Vec::new();
    for offset in (0..24).step_by(5) {
        paged.extend(backend.retrieve_many(5, offset).unwrap());
    }
    assert_eq!(paged, all);
}

#[test_case(Kind::Memory ; "memory")]
#[test_case(Kind::Sqlite ; "sqlite")]
fn equal_timestamps_break_ties_by_insertion(kind: Kind) {
    let backend = backend(kind);
    for name in ["first", "second", "third"] {
        backend
            .store(Entry::new(name, Level::Info).with_timestamp(base_time()))
            .unwrap();
    }
    let page = backend.retrieve_many(10, 0).unwrap();
    assert_eq!(types_of(&page), ["third", "second", "first"]);
}

#[test_case(Kind::Memory ; "memory")]
#[test_case(Kind::Sqlite ; "sqlite")]
fn retrieve_typed_offsets_within_type(kind: Kind) {
    let backend = backend(kind);
    for i in 0..6 {
        let entry_type = if i % 2 == 0 { "even" } else { "odd" };
        backend
            .store(
                Entry::new(entry_type, Level::Info)
                    .with_timestamp(base_time() + Duration::minutes(i))
                    .with_field("i", i),
            )
            .unwrap();
    }

    let odd = backend.retrieve_typed("odd", 2, 1).unwrap();
    let indices: Vec<_> = odd.iter().map(|e| e.data()["i"].clone()).collect();
    assert_eq!(indices, [json!(3), json!(1)]);
    assert!(backend.retrieve_typed("none", 10, 0).unwrap().is_empty());
}

#[test_case(Kind::Memory ; "memory")]
#[test_case(Kind::Sqlite ; "sqlite")]
fn filters_or_values_and_filters(kind: Kind) {
    let backend = backend(kind);
    seed(backend.as_ref());

    let filters = [
        Filter::types(["type-1", "type-2", "type-7"]),
        Filter::level_gt(Level::Info),
    ];
    let matched = backend.entry_filter(&filters, 10, 0).unwrap();
    assert_eq!(types_of(&matched), ["type-7", "type-2"]);
    assert_eq!(backend.count_filter(&filters).unwrap(), 2);

    let second = backend.entry_filter(&filters, 1, 1).unwrap();
    assert_eq!(types_of(&second), ["type-2"]);
}

#[test_case(Kind::Memory ; "memory")]
#[test_case(Kind::Sqlite ; "sqlite")]
fn filter_predicates(kind: Kind) {
    let backend = backend(kind);
    let ids = seed(backend.as_ref());
    let count = |filters: &[Filter]| backend.count_filter(filters).unwrap();

    assert_eq!(count(&[Filter::ids([ids[0], ids[5]])]), 2);
    assert_eq!(count(&[Filter::user_ids(["user-1"])]), 8);
    assert_eq!(count(&[Filter::level_eq([Level::Critical])]), 4);
    assert_eq!(count(&[Filter::level_lt(Level::Info)]), 5);
    assert_eq!(count(&[Filter::level_gt(Level::Error)]), 4);
    assert_eq!(count(&[Filter::timestamps([base_time() + Duration::seconds(4)])]), 1);
    assert_eq!(count(&[Filter::before(base_time() + Duration::seconds(4))]), 4);
    assert_eq!(count(&[Filter::after(base_time() + Duration::seconds(20))]), 3);

    let mut payload = Map::new();
    payload.insert("n".to_string(), json!(9));
    let found = backend.entry_filter(&[Filter::data([payload])], 10, 0).unwrap();
    assert_eq!(types_of(&found), ["type-9"]);
}

#[test_case(Kind::Memory ; "memory")]
#[test_case(Kind::Sqlite ; "sqlite")]
fn comparison_filters_or_over_values(kind: Kind) {
    let backend = backend(kind);
    seed(backend.as_ref());

    let filters = [Filter::TimestampBefore(vec![base_time() + Duration::seconds(2)])];
    assert_eq!(backend.count_filter(&filters).unwrap(), 2);
    let either = [Filter::TimestampAfter(vec![
        base_time() + Duration::seconds(21),
        base_time() + Duration::seconds(100),
    ])];
    assert_eq!(backend.count_filter(&either).unwrap(), 2);
}

#[test_case(Kind::Memory ; "memory")]
#[test_case(Kind::Sqlite ; "sqlite")]
fn absent_subject_matches_null(kind: Kind) {
    let backend = backend(kind);
    backend.store(Entry::new("anonymous", Level::Info)).unwrap();
    backend
        .store(Entry::new("named", Level::Info).with_user_id("alice"))
        .unwrap();

    let found = backend
        .entry_filter(&[Filter::user_ids([Value::Null])], 10, 0)
        .unwrap();
    assert_eq!(types_of(&found), ["anonymous"]);

    let typed = backend
        .entry_filter(&[Filter::object_ids([json!(1)])], 10, 0)
        .unwrap();
    assert!(typed.is_empty());
}

#[test_case(Kind::Memory ; "memory")]
#[test_case(Kind::Sqlite ; "sqlite")]
fn content_type_filter(kind: Kind) {
    let backend = backend(kind);
    backend
        .store(Entry::new("a", Level::Info).with_content_type(ContentType::new("shop", "Order")))
        .unwrap();
    backend
        .store(Entry::new("b", Level::Info).with_content_type(ContentType::new("auth", "User")))
        .unwrap();
    backend.store(Entry::new("c", Level::Info)).unwrap();

    let orders = backend
        .entry_filter(&[Filter::content_types([ContentType::new("shop", "Order")])], 10, 0)
        .unwrap();
    assert_eq!(types_of(&orders), ["a"]);
    assert_eq!(
        orders[0].content_type().map(ContentType::key).as_deref(),
        Some("shop.Order")
    );
}

#[test_case(Kind::Memory ; "memory")]
#[test_case(Kind::Sqlite ; "sqlite")]
fn content_type_filter_compares_keys(kind: Kind) {
    let backend = backend(kind);
    backend
        .store(
            Entry::new("a", Level::Info).with_content_type(ContentType::new("acme.shop", "Order")),
        )
        .unwrap();

    let same_key = [Filter::content_types([ContentType::new("acme", "shop.Order")])];
    assert_eq!(backend.count_filter(&same_key).unwrap(), 1);
    assert_eq!(types_of(&backend.entry_filter(&same_key, 10, 0).unwrap()), ["a"]);
}

#[test_case(Kind::Memory ; "memory")]
#[test_case(Kind::Sqlite ; "sqlite")]
fn negative_zero_matches_zero(kind: Kind) {
    let backend = backend(kind);
    backend
        .store(
            Entry::new("signed", Level::Info)
                .with_user_id(-0.0)
                .with_field("x", -0.0),
        )
        .unwrap();

    let mut payload = Map::new();
    payload.insert("x".to_string(), json!(0.0));
    assert_eq!(backend.count_filter(&[Filter::data([payload])]).unwrap(), 1);
    assert_eq!(backend.count_filter(&[Filter::user_ids([0.0])]).unwrap(), 1);
    assert_eq!(backend.count_filter(&[Filter::user_ids([0])]).unwrap(), 0);
}

#[test_case(Kind::Memory ; "memory")]
#[test_case(Kind::Sqlite ; "sqlite")]
fn empty_filter_set_and_empty_filter(kind: Kind) {
    let backend = backend(kind);
    seed(backend.as_ref());

    assert_eq!(backend.count_filter(&[]).unwrap(), 24);
    assert_eq!(backend.entry_filter(&[], 100, 0).unwrap().len(), 24);

    let none = [Filter::Type(Vec::new())];
    assert_eq!(backend.count_filter(&none).unwrap(), 0);
    assert!(backend.entry_filter(&none, 100, 0).unwrap().is_empty());
}

#[test_case(Kind::Memory ; "memory")]
#[test_case(Kind::Sqlite ; "sqlite")]
fn store_many_stops_at_first_failure(kind: Kind) {
    let backend = backend(kind);
    let taken = backend.store(Entry::new("existing", Level::Info)).unwrap();

    let report = backend.store_many(vec![
        Entry::new("one", Level::Info),
        Entry::new("clash", Level::Info).with_id(taken),
        Entry::new("never", Level::Info),
    ]);

    assert_eq!(report.stored_ids().len(), 1);
    assert_eq!(report.unattempted(), 1);
    let (index, err) = report.failure().unwrap();
    assert_eq!(index, 1);
    assert!(matches!(err, Error::AlreadyExists(_)));
    assert_eq!(backend.count().unwrap(), 2);
    assert!(report.into_result().is_err());
}

#[test_case(Kind::Memory ; "memory")]
#[test_case(Kind::Sqlite ; "sqlite")]
fn store_many_complete_batch(kind: Kind) {
    let backend = backend(kind);
    let report = backend.store_many(
        (0..5)
            .map(|i| Entry::new(format!("t{i}"), Level::Debug))
            .collect(),
    );
    assert!(report.is_complete());
    let ids = report.into_result().unwrap();
    assert_eq!(ids.len(), 5);
    assert_eq!(backend.count().unwrap(), 5);
}
