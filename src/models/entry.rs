//! Audit entries and their identifiers.

use super::ContentType;
use crate::{Error, Result};
use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Unique 128-bit identifier of an entry.
///
/// The nil UUID is the "unassigned" value: backends replace it with a freshly
/// generated identifier when the entry is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryId(Uuid);

impl EntryId {
    /// The unassigned identifier.
    pub const NIL: Self = Self(Uuid::nil());

    /// Generates a new time-ordered identifier.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::now_v7())
    }

    /// Wraps an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Builds an identifier from its 16-byte representation.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if `bytes` is not exactly 16 bytes long.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        Uuid::from_slice(bytes)
            .map(Self)
            .map_err(|e| Error::InvalidInput(format!("entry id: {e}")))
    }

    /// Returns `true` if this is the unassigned identifier.
    #[must_use]
    pub fn is_nil(&self) -> bool {
        self.0.is_nil()
    }

    /// Returns the 16-byte representation.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }

    /// Returns the wrapped UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for EntryId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Uuid::parse_str(s.trim())
            .map(Self)
            .map_err(|e| Error::InvalidInput(format!("invalid entry id '{s}': {e}")))
    }
}

impl From<Uuid> for EntryId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// Severity of an entry.
///
/// Levels are totally ordered and persisted as their integer value.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    /// Diagnostic detail.
    Debug = 0,
    /// Routine event.
    #[default]
    Info = 1,
    /// Something unexpected but handled.
    Warn = 2,
    /// A failed operation.
    Error = 3,
    /// A failure requiring immediate attention.
    Critical = 4,
}

impl Level {
    /// All levels in ascending order.
    pub const ALL: [Self; 5] = [
        Self::Debug,
        Self::Info,
        Self::Warn,
        Self::Error,
        Self::Critical,
    ];

    /// Returns the integer value stored by SQL backends.
    #[must_use]
    pub const fn as_i64(self) -> i64 {
        self as i64
    }

    /// Returns the lowercase level name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
            Self::Critical => "critical",
        }
    }

    /// Parses a level name or its integer value (case-insensitive).
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        if let Ok(value) = s.parse::<i64>() {
            return Self::try_from(value).ok();
        }
        match s.to_lowercase().as_str() {
            "debug" => Some(Self::Debug),
            "info" => Some(Self::Info),
            "warn" | "warning" => Some(Self::Warn),
            "error" => Some(Self::Error),
            "critical" => Some(Self::Critical),
            _ => None,
        }
    }
}

impl TryFrom<i64> for Level {
    type Error = Error;

    fn try_from(value: i64) -> Result<Self> {
        usize::try_from(value)
            .ok()
            .and_then(|idx| Self::ALL.get(idx).copied())
            .ok_or_else(|| Error::InvalidInput(format!("level out of range: {value}")))
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One immutable audit record.
///
/// Entries are assembled with the `with_*` builders and handed to a
/// [`StorageBackend`](crate::storage::StorageBackend); once stored they are
/// never mutated. Fields are read through accessors only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    id: EntryId,
    #[serde(rename = "type")]
    entry_type: String,
    level: Level,
    timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    user_id: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    object_id: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    content_type: Option<ContentType>,
    #[serde(default)]
    data: Map<String, Value>,
}

impl Entry {
    /// Creates an unassigned entry of the given type and level, stamped now.
    ///
    /// Timestamps are kept at microsecond precision, the resolution every
    /// backend persists.
    #[must_use]
    pub fn new(entry_type: impl Into<String>, level: Level) -> Self {
        Self {
            id: EntryId::NIL,
            entry_type: entry_type.into(),
            level,
            timestamp: Utc::now().trunc_subsecs(6),
            user_id: None,
            object_id: None,
            content_type: None,
            data: Map::new(),
        }
    }

    /// Sets the identifier.
    #[must_use]
    pub fn with_id(mut self, id: EntryId) -> Self {
        self.id = id;
        self
    }

    /// Sets the time the event occurred.
    #[must_use]
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp.trunc_subsecs(6);
        self
    }

    /// Sets the acting subject. JSON `null` clears it.
    #[must_use]
    pub fn with_user_id(mut self, user_id: impl Into<Value>) -> Self {
        self.user_id = non_null(user_id.into());
        self
    }

    /// Sets the affected object. JSON `null` clears it.
    #[must_use]
    pub fn with_object_id(mut self, object_id: impl Into<Value>) -> Self {
        self.object_id = non_null(object_id.into());
        self
    }

    /// Sets the affected object's content type.
    #[must_use]
    pub fn with_content_type(mut self, content_type: ContentType) -> Self {
        self.content_type = Some(content_type);
        self
    }

    /// Replaces the payload.
    #[must_use]
    pub fn with_data(mut self, data: Map<String, Value>) -> Self {
        self.data = data;
        self
    }

    /// Adds one payload field.
    #[must_use]
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    /// Returns the identifier (nil until stored).
    #[must_use]
    pub const fn id(&self) -> EntryId {
        self.id
    }

    /// Returns the type discriminator.
    #[must_use]
    pub fn entry_type(&self) -> &str {
        &self.entry_type
    }

    /// Returns the level.
    #[must_use]
    pub const fn level(&self) -> Level {
        self.level
    }

    /// Returns when the event occurred.
    #[must_use]
    pub const fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Returns the acting subject, if any.
    #[must_use]
    pub const fn user_id(&self) -> Option<&Value> {
        self.user_id.as_ref()
    }

    /// Returns the affected object, if any.
    #[must_use]
    pub const fn object_id(&self) -> Option<&Value> {
        self.object_id.as_ref()
    }

    /// Returns the affected object's content type, if any.
    #[must_use]
    pub const fn content_type(&self) -> Option<&ContentType> {
        self.content_type.as_ref()
    }

    /// Returns the payload.
    #[must_use]
    pub const fn data(&self) -> &Map<String, Value> {
        &self.data
    }

    /// Decodes the acting subject into `T`.
    ///
    /// Returns `Ok(None)` when no subject is set.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Decode`] if the stored value does not fit `T`.
    pub fn user_id_as<T: serde::de::DeserializeOwned>(&self) -> Result<Option<T>> {
        decode_view("user_id", self.user_id.as_ref())
    }

    /// Decodes the affected object into `T`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Decode`] if the stored value does not fit `T`.
    pub fn object_id_as<T: serde::de::DeserializeOwned>(&self) -> Result<Option<T>> {
        decode_view("object_id", self.object_id.as_ref())
    }
}

fn non_null(value: Value) -> Option<Value> {
    if value.is_null() { None } else { Some(value) }
}

fn decode_view<T: serde::de::DeserializeOwned>(
    column: &'static str,
    value: Option<&Value>,
) -> Result<Option<T>> {
    value
        .map(|v| {
            T::deserialize(v).map_err(|e| Error::Decode {
                column,
                cause: e.to_string(),
            })
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_entry_id_nil_and_generate() {
        assert!(EntryId::NIL.is_nil());
        assert!(EntryId::default().is_nil());
        let a = EntryId::generate();
        let b = EntryId::generate();
        assert!(!a.is_nil());
        assert_ne!(a, b);
    }

    #[test]
    fn test_entry_id_parse_and_bytes() {
        let id = EntryId::generate();
        let parsed: EntryId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
        assert_eq!(EntryId::from_slice(id.as_bytes()).unwrap(), id);
        assert!(EntryId::from_slice(&[1, 2, 3]).is_err());
        assert!("not-a-uuid".parse::<EntryId>().is_err());
    }

    #[test]
    fn test_level_ordering_and_conversion() {
        assert!(Level::Debug < Level::Info);
        assert!(Level::Error < Level::Critical);
        assert_eq!(Level::try_from(2).unwrap(), Level::Warn);
        assert!(Level::try_from(5).is_err());
        assert!(Level::try_from(-1).is_err());
        assert_eq!(Level::Critical.as_i64(), 4);
    }

    #[test]
    fn test_level_parse() {
        assert_eq!(Level::parse("WARNING"), Some(Level::Warn));
        assert_eq!(Level::parse("3"), Some(Level::Error));
        assert_eq!(Level::parse("loud"), None);
    }

    #[test]
    fn test_entry_builders() {
        let entry = Entry::new("user.login", Level::Info)
            .with_user_id("alice")
            .with_object_id(42)
            .with_content_type(ContentType::new("auth", "User"))
            .with_field("ip", "10.0.0.1");

        assert!(entry.id().is_nil());
        assert_eq!(entry.entry_type(), "user.login");
        assert_eq!(entry.user_id(), Some(&json!("alice")));
        assert_eq!(entry.object_id(), Some(&json!(42)));
        assert_eq!(entry.content_type().map(ContentType::key).as_deref(), Some("auth.User"));
        assert_eq!(entry.data().get("ip"), Some(&json!("10.0.0.1")));
    }

    #[test]
    fn test_null_subject_is_absent() {
        let entry = Entry::new("t", Level::Debug).with_user_id(Value::Null);
        assert!(entry.user_id().is_none());
    }

    #[test]
    fn test_typed_views() {
        let entry = Entry::new("t", Level::Debug).with_user_id(7).with_object_id("x");
        assert_eq!(entry.user_id_as::<u32>().unwrap(), Some(7));
        assert!(matches!(
            entry.object_id_as::<u32>(),
            Err(Error::Decode { column: "object_id", .. })
        ));
        let bare = Entry::new("t", Level::Debug);
        assert_eq!(bare.user_id_as::<u32>().unwrap(), None);
    }

    #[test]
    fn test_timestamp_truncated_to_micros() {
        let precise = DateTime::<Utc>::from_timestamp(1_700_000_000, 123_456_789).unwrap();
        let entry = Entry::new("t", Level::Info).with_timestamp(precise);
        assert_eq!(entry.timestamp().timestamp_subsec_nanos(), 123_456_000);
        assert_eq!(Entry::new("t", Level::Info).timestamp().timestamp_subsec_nanos() % 1000, 0);
    }

    #[test]
    fn test_entry_json_shape() {
        let entry = Entry::new("order.paid", Level::Warn).with_field("amount", 12);
        let value = serde_json::to_value(&entry).unwrap();
        assert_eq!(value["type"], json!("order.paid"));
        assert_eq!(value["level"], json!("warn"));
        assert!(value.get("user_id").is_none());
        let back: Entry = serde_json::from_value(value).unwrap();
        assert_eq!(back, entry);
    }
}
