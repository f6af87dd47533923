//! Filter predicates for entry queries.
//!
//! A [`Filter`] names one predicate and carries a list of candidate values. A
//! filter matches an entry when ANY of its values satisfies the predicate; a
//! filter set matches when ALL of its filters match. Every backend must return
//! the same result set for the same filters, so the in-memory evaluator below
//! is the reference the SQL translation in [`crate::storage::sql`] mirrors.

use super::{ContentType, Entry, EntryId, Level};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::fmt;

/// Predicate names understood by every backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterName {
    /// Identifier equals.
    Id,
    /// Type equals.
    Type,
    /// Acting subject equals.
    UserId,
    /// Affected object equals.
    ObjectId,
    /// Content type key equals.
    ContentType,
    /// Level equals.
    Level,
    /// Level strictly greater than.
    LevelGreaterThan,
    /// Level strictly less than.
    LevelLessThan,
    /// Timestamp equals (microsecond precision).
    Timestamp,
    /// Timestamp strictly before.
    TimestampBefore,
    /// Timestamp strictly after.
    TimestampAfter,
    /// Payload deep-equals.
    Data,
}

impl FilterName {
    /// All predicate names.
    pub const ALL: [Self; 12] = [
        Self::Id,
        Self::Type,
        Self::UserId,
        Self::ObjectId,
        Self::ContentType,
        Self::Level,
        Self::LevelGreaterThan,
        Self::LevelLessThan,
        Self::Timestamp,
        Self::TimestampBefore,
        Self::TimestampAfter,
        Self::Data,
    ];

    /// Returns the canonical predicate name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::Type => "type",
            Self::UserId => "user_id",
            Self::ObjectId => "object_id",
            Self::ContentType => "content_type",
            Self::Level => "level",
            Self::LevelGreaterThan => "level_gt",
            Self::LevelLessThan => "level_lt",
            Self::Timestamp => "timestamp",
            Self::TimestampBefore => "timestamp_before",
            Self::TimestampAfter => "timestamp_after",
            Self::Data => "data",
        }
    }

    /// Parses a predicate name (case-insensitive, `-` accepted for `_`).
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        let normalized = s.trim().to_lowercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|name| name.as_str() == normalized)
    }
}

impl fmt::Display for FilterName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A named predicate with its OR-matched candidate values.
///
/// The variant is the predicate; its payload is the candidate list, typed so
/// that a value can never be of the wrong kind for its predicate.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Identifier is one of.
    Id(Vec<EntryId>),
    /// Type is one of.
    Type(Vec<String>),
    /// Acting subject is one of (`null` matches an absent subject).
    UserId(Vec<Value>),
    /// Affected object is one of (`null` matches an absent object).
    ObjectId(Vec<Value>),
    /// Content type is one of.
    ContentType(Vec<ContentType>),
    /// Level is one of.
    Level(Vec<Level>),
    /// Level is greater than any of.
    LevelGreaterThan(Vec<Level>),
    /// Level is less than any of.
    LevelLessThan(Vec<Level>),
    /// Timestamp is one of.
    Timestamp(Vec<DateTime<Utc>>),
    /// Timestamp is before any of.
    TimestampBefore(Vec<DateTime<Utc>>),
    /// Timestamp is after any of.
    TimestampAfter(Vec<DateTime<Utc>>),
    /// Payload equals one of.
    Data(Vec<Map<String, Value>>),
}

impl Filter {
    /// Matches entries with any of the given identifiers.
    pub fn ids(ids: impl IntoIterator<Item = EntryId>) -> Self {
        Self::Id(ids.into_iter().collect())
    }

    /// Matches entries with any of the given types.
    pub fn types<S: Into<String>>(types: impl IntoIterator<Item = S>) -> Self {
        Self::Type(types.into_iter().map(Into::into).collect())
    }

    /// Matches entries whose acting subject equals any of the values.
    pub fn user_ids<V: Into<Value>>(values: impl IntoIterator<Item = V>) -> Self {
        Self::UserId(values.into_iter().map(Into::into).collect())
    }

    /// Matches entries whose affected object equals any of the values.
    pub fn object_ids<V: Into<Value>>(values: impl IntoIterator<Item = V>) -> Self {
        Self::ObjectId(values.into_iter().map(Into::into).collect())
    }

    /// Matches entries with any of the given content types.
    pub fn content_types(content_types: impl IntoIterator<Item = ContentType>) -> Self {
        Self::ContentType(content_types.into_iter().collect())
    }

    /// Matches entries whose level is any of the given levels.
    pub fn level_eq(levels: impl IntoIterator<Item = Level>) -> Self {
        Self::Level(levels.into_iter().collect())
    }

    /// Matches entries whose level is strictly greater than `level`.
    #[must_use]
    pub fn level_gt(level: Level) -> Self {
        Self::LevelGreaterThan(vec![level])
    }

    /// Matches entries whose level is strictly less than `level`.
    #[must_use]
    pub fn level_lt(level: Level) -> Self {
        Self::LevelLessThan(vec![level])
    }

    /// Matches entries stamped at any of the given instants.
    pub fn timestamps(instants: impl IntoIterator<Item = DateTime<Utc>>) -> Self {
        Self::Timestamp(instants.into_iter().collect())
    }

    /// Matches entries stamped strictly before `instant`.
    #[must_use]
    pub fn before(instant: DateTime<Utc>) -> Self {
        Self::TimestampBefore(vec![instant])
    }

    /// Matches entries stamped strictly after `instant`.
    #[must_use]
    pub fn after(instant: DateTime<Utc>) -> Self {
        Self::TimestampAfter(vec![instant])
    }

    /// Matches entries whose payload deep-equals any of the maps.
    pub fn data(payloads: impl IntoIterator<Item = Map<String, Value>>) -> Self {
        Self::Data(payloads.into_iter().collect())
    }

    /// Returns the predicate name.
    #[must_use]
    pub const fn name(&self) -> FilterName {
        match self {
            Self::Id(_) => FilterName::Id,
            Self::Type(_) => FilterName::Type,
            Self::UserId(_) => FilterName::UserId,
            Self::ObjectId(_) => FilterName::ObjectId,
            Self::ContentType(_) => FilterName::ContentType,
            Self::Level(_) => FilterName::Level,
            Self::LevelGreaterThan(_) => FilterName::LevelGreaterThan,
            Self::LevelLessThan(_) => FilterName::LevelLessThan,
            Self::Timestamp(_) => FilterName::Timestamp,
            Self::TimestampBefore(_) => FilterName::TimestampBefore,
            Self::TimestampAfter(_) => FilterName::TimestampAfter,
            Self::Data(_) => FilterName::Data,
        }
    }

    /// Returns the number of candidate values.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Id(v) => v.len(),
            Self::Type(v) => v.len(),
            Self::UserId(v) | Self::ObjectId(v) => v.len(),
            Self::ContentType(v) => v.len(),
            Self::Level(v) | Self::LevelGreaterThan(v) | Self::LevelLessThan(v) => v.len(),
            Self::Timestamp(v) | Self::TimestampBefore(v) | Self::TimestampAfter(v) => v.len(),
            Self::Data(v) => v.len(),
        }
    }

    /// Returns `true` if the filter has no candidate values (and so matches nothing).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns `true` if any candidate value satisfies the predicate for `entry`.
    #[must_use]
    pub fn matches(&self, entry: &Entry) -> bool {
        let micros = entry.timestamp().timestamp_micros();
        match self {
            Self::Id(ids) => ids.contains(&entry.id()),
            Self::Type(types) => types.iter().any(|t| t == entry.entry_type()),
            Self::UserId(values) => values.iter().any(|v| optional_eq(v, entry.user_id())),
            Self::ObjectId(values) => values.iter().any(|v| optional_eq(v, entry.object_id())),
            Self::ContentType(cts) => entry
                .content_type()
                .is_some_and(|ct| cts.iter().any(|c| c.key() == ct.key())),
            Self::Level(levels) => levels.contains(&entry.level()),
            Self::LevelGreaterThan(levels) => levels.iter().any(|l| entry.level() > *l),
            Self::LevelLessThan(levels) => levels.iter().any(|l| entry.level() < *l),
            Self::Timestamp(instants) => instants.iter().any(|t| t.timestamp_micros() == micros),
            Self::TimestampBefore(instants) => {
                instants.iter().any(|t| micros < t.timestamp_micros())
            },
            Self::TimestampAfter(instants) => {
                instants.iter().any(|t| micros > t.timestamp_micros())
            },
            Self::Data(payloads) => payloads.iter().any(|p| p == entry.data()),
        }
    }

    /// Builds a filter from a predicate name and textual values.
    ///
    /// Values are interpreted per predicate: UUIDs for `id`, level names or
    /// integers for the level predicates, RFC 3339 instants for the timestamp
    /// predicates, `namespace.Name` keys for `content_type`, JSON objects for
    /// `data`. Subject and object values are parsed as JSON when possible and
    /// fall back to plain strings.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if a value cannot be parsed for the predicate.
    pub fn parse_values<S: AsRef<str>>(name: FilterName, values: &[S]) -> Result<Self> {
        let values = values.iter().map(AsRef::as_ref);
        let filter = match name {
            FilterName::Id => Self::Id(values.map(str::parse::<EntryId>).collect::<Result<_>>()?),
            FilterName::Type => Self::types(values),
            FilterName::UserId => Self::UserId(values.map(loose_json).collect()),
            FilterName::ObjectId => Self::ObjectId(values.map(loose_json).collect()),
            FilterName::ContentType => Self::ContentType(
                values
                    .map(|v| {
                        ContentType::parse(v).ok_or_else(|| {
                            Error::InvalidInput(format!("invalid content type '{v}'"))
                        })
                    })
                    .collect::<Result<_>>()?,
            ),
            FilterName::Level => Self::Level(parse_levels(values)?),
            FilterName::LevelGreaterThan => Self::LevelGreaterThan(parse_levels(values)?),
            FilterName::LevelLessThan => Self::LevelLessThan(parse_levels(values)?),
            FilterName::Timestamp => Self::Timestamp(parse_instants(values)?),
            FilterName::TimestampBefore => Self::TimestampBefore(parse_instants(values)?),
            FilterName::TimestampAfter => Self::TimestampAfter(parse_instants(values)?),
            FilterName::Data => Self::Data(
                values
                    .map(|v| {
                        serde_json::from_str::<Map<String, Value>>(v).map_err(|e| {
                            Error::InvalidInput(format!("data filter must be a JSON object: {e}"))
                        })
                    })
                    .collect::<Result<_>>()?,
            ),
        };
        Ok(filter)
    }
}

/// Returns `true` if every filter in the set matches `entry`.
///
/// Each filter contributes at most one hit, so the entry is included exactly
/// when the hit count equals the number of filters. An empty set matches
/// every entry.
#[must_use]
pub fn matches_all(filters: &[Filter], entry: &Entry) -> bool {
    let hits = filters.iter().filter(|f| f.matches(entry)).count();
    hits == filters.len()
}

fn optional_eq(candidate: &Value, actual: Option<&Value>) -> bool {
    actual.map_or(candidate.is_null(), |v| v == candidate)
}

/// Parses text as JSON, falling back to a plain string.
///
/// This is how subject and object values are read from the command line:
/// `42` is a number, `"42"` and `alice` are strings.
#[must_use]
pub fn loose_json(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

fn parse_levels<'a>(values: impl Iterator<Item = &'a str>) -> Result<Vec<Level>> {
    values
        .map(|v| Level::parse(v).ok_or_else(|| Error::InvalidInput(format!("invalid level '{v}'"))))
        .collect()
}

fn parse_instants<'a>(values: impl Iterator<Item = &'a str>) -> Result<Vec<DateTime<Utc>>> {
    values
        .map(|v| {
            DateTime::parse_from_rfc3339(v.trim())
                .map(|t| t.with_timezone(&Utc))
                .map_err(|e| Error::InvalidInput(format!("invalid timestamp '{v}': {e}")))
        })
        .collect()
}
