//! Explicit content type table.
//!
//! Maps a content type key (`namespace.Name`) to its descriptor and a factory
//! producing a default instance of the registered Rust type. SQL backends use
//! the table to resolve stored keys on scan.

use crate::models::ContentType;
use crate::{Error, Result};
use serde_json::{Map, Value};
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// A default instance produced by a registered factory.
pub type Instance = Box<dyn Any + Send + Sync>;

type Factory = Box<dyn Fn() -> Instance + Send + Sync>;

struct Registration {
    content_type: ContentType,
    factory: Factory,
}

/// Registration table of content types.
///
/// Registration normally happens at startup; lookups take a shared lock.
#[derive(Default)]
pub struct ContentTypes {
    entries: RwLock<HashMap<String, Registration>>,
}

impl fmt::Debug for ContentTypes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys = self.keys();
        keys.sort();
        f.debug_struct("ContentTypes").field("keys", &keys).finish()
    }
}

impl ContentTypes {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `T` under `content_type`, replacing any previous registration.
    pub fn register<T>(&self, content_type: ContentType)
    where
        T: Default + Any + Send + Sync,
    {
        self.insert(content_type, Box::new(|| Box::new(T::default()) as Instance));
    }

    /// Registers a key without a Rust type; its factory yields an empty JSON object.
    pub fn register_key(&self, content_type: ContentType) {
        self.insert(
            content_type,
            Box::new(|| Box::new(Value::Object(Map::new())) as Instance),
        );
    }

    /// Parses and registers untyped keys.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for the first key that is not of the
    /// form `namespace.Name`; earlier keys stay registered.
    pub fn register_keys<S: AsRef<str>>(&self, keys: impl IntoIterator<Item = S>) -> Result<()> {
        for key in keys {
            let key = key.as_ref();
            let content_type = ContentType::parse(key)
                .ok_or_else(|| Error::InvalidInput(format!("invalid content type key '{key}'")))?;
            self.register_key(content_type);
        }
        Ok(())
    }

    /// Resolves a stored key to its descriptor.
    #[must_use]
    pub fn resolve(&self, key: &str) -> Option<ContentType> {
        self.read().get(key).map(|r| r.content_type.clone())
    }

    /// Returns `true` if `key` is registered.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.read().contains_key(key)
    }

    /// Produces a default instance of the type registered under `key`.
    #[must_use]
    pub fn new_instance(&self, key: &str) -> Option<Instance> {
        self.read().get(key).map(|r| (r.factory)())
    }

    /// Returns the registered keys in no particular order.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.read().keys().cloned().collect()
    }

    /// Returns the number of registrations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// Returns `true` if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn insert(&self, content_type: ContentType, factory: Factory) {
        let key = content_type.key();
        tracing::debug!(content_type = %key, "registering content type");
        self.write().insert(
            key,
            Registration {
                content_type,
                factory,
            },
        );
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Registration>> {
        self.entries
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Registration>> {
        self.entries
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}
