//! Row codec shared by the SQL backends.
//!
//! Structured entry fields are flattened into primitive columns on write and
//! rebuilt on read:
//!
//! | Field | Column | Encoding |
//! |-------|--------|----------|
//! | `id` | `id` | 16 raw bytes |
//! | `type` | `type` | text |
//! | `level` | `level` | integer |
//! | `timestamp` | `occurred_at` | integer microseconds since the Unix epoch |
//! | `user_id` / `object_id` | `user_id` / `object_id` | JSON text, `NULL` when absent |
//! | `content_type` | `content_type` | canonical key, `NULL` when absent |
//! | `data` | `data` | JSON object text |
//!
//! Decoding failures name the column that failed.

use crate::models::{Entry, EntryId, Level};
use crate::registry::ContentTypes;
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde_json::{Map, Number, Value};

/// Column list in the order every SQL statement selects them.
pub const COLUMNS: &str = "id, type, level, occurred_at, user_id, object_id, content_type, data";

/// Flat representation of an entry as stored in a SQL row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryRow {
    /// Raw identifier bytes.
    pub id: Vec<u8>,
    /// Type discriminator.
    pub entry_type: String,
    /// Level as integer.
    pub level: i64,
    /// Microseconds since the Unix epoch.
    pub occurred_at: i64,
    /// JSON-encoded acting subject.
    pub user_id: Option<String>,
    /// JSON-encoded affected object.
    pub object_id: Option<String>,
    /// Content type key.
    pub content_type: Option<String>,
    /// JSON-encoded payload.
    pub data: Option<String>,
}

/// Flattens an entry into a row.
///
/// # Errors
///
/// Returns [`Error::Decode`] naming the field that could not be encoded.
pub fn serialize_row(entry: &Entry) -> Result<EntryRow> {
    Ok(EntryRow {
        id: entry.id().as_bytes().to_vec(),
        entry_type: entry.entry_type().to_string(),
        level: entry.level().as_i64(),
        occurred_at: entry.timestamp().timestamp_micros(),
        user_id: entry.user_id().map(|v| encode_json("user_id", v)).transpose()?,
        object_id: entry
            .object_id()
            .map(|v| encode_json("object_id", v))
            .transpose()?,
        content_type: entry.content_type().map(crate::models::ContentType::key),
        data: Some(encode_json("data", entry.data())?),
    })
}

/// Rebuilds an entry from a row.
///
/// The content type key is resolved through `content_types`.
///
/// # Errors
///
/// Returns [`Error::InvalidScanType`] if the content type key is not
/// registered, or [`Error::Decode`] naming the column that could not be read.
pub fn scan_row(row: EntryRow, content_types: &ContentTypes) -> Result<Entry> {
    let id = EntryId::from_slice(&row.id).map_err(|e| Error::Decode {
        column: "id",
        cause: e.to_string(),
    })?;
    let level = Level::try_from(row.level).map_err(|e| Error::Decode {
        column: "level",
        cause: e.to_string(),
    })?;
    let timestamp =
        DateTime::<Utc>::from_timestamp_micros(row.occurred_at).ok_or_else(|| Error::Decode {
            column: "occurred_at",
            cause: format!("timestamp out of range: {}", row.occurred_at),
        })?;

    let mut entry = Entry::new(row.entry_type, level)
        .with_id(id)
        .with_timestamp(timestamp);

    if let Some(raw) = row.user_id {
        entry = entry.with_user_id(decode_json::<Value>("user_id", &raw)?);
    }
    if let Some(raw) = row.object_id {
        entry = entry.with_object_id(decode_json::<Value>("object_id", &raw)?);
    }
    if let Some(key) = row.content_type {
        let content_type = content_types
            .resolve(&key)
            .ok_or(Error::InvalidScanType { key })?;
        entry = entry.with_content_type(content_type);
    }
    if let Some(raw) = row.data {
        entry = entry.with_data(decode_json::<Map<String, Value>>("data", &raw)?);
    }

    Ok(entry)
}

/// Encodes a value as JSON text for a SQL column.
///
/// Equal [`Value`]s must encode to equal text, since the SQL filter
/// translation compares encoded text. `serde_json` maps keep keys sorted, and
/// negative zero is written as `0.0` because it compares equal to zero.
///
/// # Errors
///
/// Returns [`Error::Decode`] naming `column` if encoding fails.
pub fn encode_json<T: serde::Serialize + ?Sized>(
    column: &'static str,
    value: &T,
) -> Result<String> {
    let encode_error = |e: serde_json::Error| Error::Decode {
        column,
        cause: e.to_string(),
    };
    let mut value = serde_json::to_value(value).map_err(encode_error)?;
    normalize_zero(&mut value);
    serde_json::to_string(&value).map_err(encode_error)
}

fn normalize_zero(value: &mut Value) {
    match value {
        Value::Number(n) if n.as_f64().is_some_and(|f| f.to_bits() == (-0.0_f64).to_bits()) => {
            if let Some(zero) = Number::from_f64(0.0) {
                *n = zero;
            }
        },
        Value::Array(items) => items.iter_mut().for_each(normalize_zero),
        Value::Object(map) => map.values_mut().for_each(normalize_zero),
        _ => {},
    }
}

fn decode_json<T: serde::de::DeserializeOwned>(column: &'static str, raw: &str) -> Result<T> {
    serde_json::from_str(raw).map_err(|e| Error::Decode {
        column,
        cause: e.to_string(),
    })
}
