//! Storage backend traits.

mod backend;

pub use backend::{BatchReport, StorageBackend};
