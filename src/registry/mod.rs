//! Registry binding entries to backends, hooks, and display definitions.
//!
//! A [`Registry`] is an ordinary value: construct one at startup and pass it
//! (usually behind an `Arc`) to whatever records or displays entries.
//!
//! ```rust
//! use auditlog::registry::{Definition, HookScope, Registry, RequestContext};
//! use auditlog::{Entry, Level};
//!
//! struct Login;
//!
//! impl Definition for Login {
//!     fn label(&self, _ctx: &RequestContext, entry: &Entry) -> String {
//!         format!("Login by {}", entry.user_id().map_or("?".into(), ToString::to_string))
//!     }
//! }
//!
//! let registry = Registry::new();
//! registry.register_definition("user.login", Login);
//! registry.add_filter(HookScope::Global, |entry: &Entry| entry.level() > Level::Debug);
//!
//! let id = registry.log(Entry::new("user.login", Level::Info).with_user_id("alice"))?;
//! assert!(id.is_some());
//! assert!(registry.log(Entry::new("user.login", Level::Debug))?.is_none());
//!
//! let entry = registry.backend().retrieve(id.unwrap_or_default())?;
//! let bound = registry.define(&RequestContext::new(), entry);
//! assert_eq!(bound.label(), "Login by \"alice\"");
//! # Ok::<(), auditlog::Error>(())
//! ```

mod content_types;
mod definition;

pub use content_types::{ContentTypes, Instance};
pub use definition::{Action, BoundDefinition, DefaultDefinition, Definition, RequestContext};

use crate::config::AuditConfig;
use crate::models::{ContentType, Entry, EntryId};
use crate::storage::{MemoryBackend, StorageBackend, open_backend};
use crate::Result;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

/// Predicate deciding whether an entry is recorded.
pub type LogFilter = Arc<dyn Fn(&Entry) -> bool + Send + Sync>;

/// Callback run after an entry is recorded.
pub type LogHandler = Arc<dyn Fn(&Entry) + Send + Sync>;

/// Which entries a hook applies to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum HookScope {
    /// Every entry.
    Global,
    /// Entries of one type.
    Type(String),
    /// Entries whose content type has this key.
    ContentType(String),
}

impl HookScope {
    /// Scope for one entry type.
    #[must_use]
    pub fn entry_type(entry_type: impl Into<String>) -> Self {
        Self::Type(entry_type.into())
    }

    /// Scope for one content type.
    #[must_use]
    pub fn content_type(content_type: &ContentType) -> Self {
        Self::ContentType(content_type.key())
    }

    fn applies_to(&self, entry: &Entry) -> bool {
        match self {
            Self::Global => true,
            Self::Type(t) => entry.entry_type() == t,
            Self::ContentType(key) => entry.content_type().is_some_and(|ct| ct.key() == *key),
        }
    }

    /// Hooks run global first, then type, then content type.
    const fn rank(&self) -> u8 {
        match self {
            Self::Global => 0,
            Self::Type(_) => 1,
            Self::ContentType(_) => 2,
        }
    }
}

/// Backend, hooks, content types, and definitions for one application.
///
/// All registration methods take `&self`; they are meant for startup but are
/// safe to call concurrently with logging.
pub struct Registry {
    backend: RwLock<Arc<dyn StorageBackend>>,
    content_types: Arc<ContentTypes>,
    definitions: RwLock<HashMap<String, Arc<dyn Definition>>>,
    filters: RwLock<Vec<(HookScope, LogFilter)>>,
    handlers: RwLock<Vec<(HookScope, LogHandler)>>,
    fallback: Arc<dyn Definition>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("backend", &self.backend().name())
            .field("content_types", &self.content_types)
            .finish_non_exhaustive()
    }
}

impl Registry {
    /// Creates a registry backed by a fresh [`MemoryBackend`].
    #[must_use]
    pub fn new() -> Self {
        Self::with_backend(Arc::new(MemoryBackend::new()), Arc::new(ContentTypes::new()))
    }

    /// Creates a registry around an existing backend and content type table.
    ///
    /// SQL backends should share `content_types` so stored keys resolve.
    #[must_use]
    pub fn with_backend(
        backend: Arc<dyn StorageBackend>,
        content_types: Arc<ContentTypes>,
    ) -> Self {
        Self {
            backend: RwLock::new(backend),
            content_types,
            definitions: RwLock::new(HashMap::new()),
            filters: RwLock::new(Vec::new()),
            handlers: RwLock::new(Vec::new()),
            fallback: Arc::new(DefaultDefinition),
        }
    }

    /// Registers the configured content types and opens the configured backend.
    ///
    /// # Errors
    ///
    /// Returns an error if a content type key is invalid or the backend
    /// cannot be opened.
    pub fn from_config(config: &AuditConfig) -> Result<Self> {
        let content_types = Arc::new(ContentTypes::new());
        content_types.register_keys(&config.content_types)?;
        let backend = open_backend(&config.storage, Arc::clone(&content_types))?;
        Ok(Self::with_backend(backend, content_types))
    }

    /// Replaces the backend. Intended for startup, not under load.
    pub fn register_backend(&self, backend: Arc<dyn StorageBackend>) {
        tracing::info!(backend = backend.name(), "registering storage backend");
        *self.backend.write().unwrap_or_else(PoisonError::into_inner) = backend;
    }

    /// Returns the active backend.
    #[must_use]
    pub fn backend(&self) -> Arc<dyn StorageBackend> {
        self.backend
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Returns the content type table.
    #[must_use]
    pub const fn content_types(&self) -> &Arc<ContentTypes> {
        &self.content_types
    }

    /// Registers `T` as a content type.
    pub fn register_content_type<T>(&self, content_type: ContentType)
    where
        T: Default + Any + Send + Sync,
    {
        self.content_types.register::<T>(content_type);
    }

    /// Registers the definition for one entry type, replacing any previous one.
    pub fn register_definition(
        &self,
        entry_type: impl Into<String>,
        definition: impl Definition + 'static,
    ) {
        self.definitions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(entry_type.into(), Arc::new(definition));
    }

    /// Returns the definition for `entry_type`, or the fallback.
    #[must_use]
    pub fn definition(&self, entry_type: &str) -> Arc<dyn Definition> {
        self.definitions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(entry_type)
            .map_or_else(|| Arc::clone(&self.fallback), Arc::clone)
    }

    /// Adds a filter; an entry is recorded only if every applicable filter accepts it.
    pub fn add_filter(
        &self,
        scope: HookScope,
        filter: impl Fn(&Entry) -> bool + Send + Sync + 'static,
    ) {
        self.filters
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push((scope, Arc::new(filter)));
    }

    /// Adds a handler run after an applicable entry is recorded.
    pub fn add_handler(&self, scope: HookScope, handler: impl Fn(&Entry) + Send + Sync + 'static) {
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push((scope, Arc::new(handler)));
    }

    /// Records an entry through the filters, backend, and handlers.
    ///
    /// Returns `Ok(None)` if a filter rejected the entry. Handlers see the
    /// entry with its effective identifier.
    ///
    /// # Errors
    ///
    /// Returns the backend's store error; handlers do not run in that case.
    pub fn log(&self, entry: Entry) -> Result<Option<EntryId>> {
        let filters = applicable(&self.filters, &entry);
        if let Some(position) = filters.iter().position(|filter| !filter(&entry)) {
            tracing::debug!(
                entry.type = %entry.entry_type(),
                filter = position,
                "entry rejected by filter"
            );
            return Ok(None);
        }

        let entry = if entry.id().is_nil() {
            entry.with_id(EntryId::generate())
        } else {
            entry
        };
        let id = self.backend().store(entry.clone())?;

        for handler in applicable(&self.handlers, &entry) {
            handler(&entry);
        }
        Ok(Some(id))
    }

    /// Binds `entry` to the definition registered for its type.
    #[must_use]
    pub fn define(&self, ctx: &RequestContext, entry: Entry) -> BoundDefinition {
        BoundDefinition::new(self.definition(entry.entry_type()), ctx.clone(), entry)
    }

    /// Binds each entry in order.
    #[must_use]
    pub fn define_many(&self, ctx: &RequestContext, entries: Vec<Entry>) -> Vec<BoundDefinition> {
        entries.into_iter().map(|e| self.define(ctx, e)).collect()
    }
}

/// Clones the hooks applying to `entry`, ordered by scope, so none run under the lock.
fn applicable<H: Clone>(hooks: &RwLock<Vec<(HookScope, H)>>, entry: &Entry) -> Vec<H> {
    let hooks = hooks.read().unwrap_or_else(PoisonError::into_inner);
    let mut matched: Vec<_> = hooks
        .iter()
        .filter(|(scope, _)| scope.applies_to(entry))
        .collect();
    matched.sort_by_key(|(scope, _)| scope.rank());
    matched.into_iter().map(|(_, hook)| hook.clone()).collect()
}
