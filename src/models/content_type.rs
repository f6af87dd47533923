//! Content type descriptors.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Identifies the kind of object an entry refers to.
///
/// A content type is a namespace (application or package path) plus a type
/// name. Its canonical key is `"<namespace>.<name>"`, which is what SQL
/// backends persist and what the [`ContentTypes`](crate::registry::ContentTypes)
/// table resolves on read.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentType {
    namespace: String,
    name: String,
}

impl ContentType {
    /// Creates a content type from its namespace and type name.
    #[must_use]
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Parses a canonical key.
    ///
    /// The key is split on the last `.`, so namespaces may themselves contain
    /// dots (`github.com/acme/blog.Post`). Returns `None` when either half is
    /// empty or there is no separator.
    #[must_use]
    pub fn parse(key: &str) -> Option<Self> {
        let (namespace, name) = key.rsplit_once('.')?;
        if namespace.is_empty() || name.is_empty() {
            return None;
        }
        Some(Self::new(namespace, name))
    }

    /// Returns the namespace part.
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Returns the type name part.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the canonical `"<namespace>.<name>"` key.
    #[must_use]
    pub fn key(&self) -> String {
        format!("{}.{}", self.namespace, self.name)
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.namespace, self.name)
    }
}

impl Serialize for ContentType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.key())
    }
}

impl<'de> Deserialize<'de> for ContentType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let key = String::deserialize(deserializer)?;
        Self::parse(&key)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid content type key '{key}'")))
    }
}
