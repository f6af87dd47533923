//! Data models for the audit log.
//!
//! This module contains the entry record, its identifier and level, content
//! type descriptors, and the filter predicates used to query backends.

mod content_type;
mod entry;
mod filter;

pub use content_type::ContentType;
pub use entry::{Entry, EntryId, Level};
pub use filter::{Filter, FilterName, loose_json, matches_all};
