//! Per-type display definitions.

use crate::models::Entry;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock};

/// Request-scoped context handed to definitions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestContext {
    locale: Option<String>,
    attributes: HashMap<String, String>,
}

impl RequestContext {
    /// Creates an empty context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the locale (e.g. `en-GB`).
    #[must_use]
    pub fn with_locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = Some(locale.into());
        self
    }

    /// Adds an attribute.
    #[must_use]
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Returns the locale, if any.
    #[must_use]
    pub fn locale(&self) -> Option<&str> {
        self.locale.as_deref()
    }

    /// Returns an attribute value.
    #[must_use]
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }
}

/// A link offered next to an entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Action {
    /// Display text.
    pub label: String,
    /// Target URL.
    pub url: String,
    /// Optional icon name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
}

impl Action {
    /// Creates an action without an icon.
    #[must_use]
    pub fn new(label: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            url: url.into(),
            icon: None,
        }
    }

    /// Sets the icon.
    #[must_use]
    pub fn with_icon(mut self, icon: impl Into<String>) -> Self {
        self.icon = Some(icon.into());
        self
    }
}

/// Formats entries of one type for display.
///
/// Only [`label`](Definition::label) is required; message and actions
/// default to empty.
pub trait Definition: Send + Sync {
    /// Short title for the entry.
    fn label(&self, ctx: &RequestContext, entry: &Entry) -> String;

    /// Longer human-readable description.
    fn message(&self, _ctx: &RequestContext, _entry: &Entry) -> String {
        String::new()
    }

    /// Links offered next to the entry.
    fn actions(&self, _ctx: &RequestContext, _entry: &Entry) -> Vec<Action> {
        Vec::new()
    }
}

/// Definition used for types without a registered one: `"<type> (<id>)"`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultDefinition;

impl Definition for DefaultDefinition {
    fn label(&self, _ctx: &RequestContext, entry: &Entry) -> String {
        format!("{} ({})", entry.entry_type(), entry.id())
    }
}

/// A definition bound to one entry and request context.
///
/// Each part is computed on first access and cached.
pub struct BoundDefinition {
    definition: Arc<dyn Definition>,
    ctx: RequestContext,
    entry: Entry,
    label: OnceLock<String>,
    message: OnceLock<String>,
    actions: OnceLock<Vec<Action>>,
}

impl BoundDefinition {
    /// Binds `definition` to `entry` under `ctx`.
    #[must_use]
    pub fn new(definition: Arc<dyn Definition>, ctx: RequestContext, entry: Entry) -> Self {
        Self {
            definition,
            ctx,
            entry,
            label: OnceLock::new(),
            message: OnceLock::new(),
            actions: OnceLock::new(),
        }
    }

    /// Returns the label.
    pub fn label(&self) -> &str {
        self.label
            .get_or_init(|| self.definition.label(&self.ctx, &self.entry))
    }

    /// Returns the message.
    pub fn message(&self) -> &str {
        self.message
            .get_or_init(|| self.definition.message(&self.ctx, &self.entry))
    }

    /// Returns the actions.
    pub fn actions(&self) -> &[Action] {
        self.actions
            .get_or_init(|| self.definition.actions(&self.ctx, &self.entry))
    }

    /// Returns the bound entry.
    #[must_use]
    pub const fn entry(&self) -> &Entry {
        &self.entry
    }

    /// Returns the request context.
    #[must_use]
    pub const fn context(&self) -> &RequestContext {
        &self.ctx
    }

    /// Consumes the binding, returning the entry.
    #[must_use]
    pub fn into_entry(self) -> Entry {
        self.entry
    }
}

impl fmt::Debug for BoundDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundDefinition")
            .field("entry", &self.entry.id())
            .field("label", &self.label.get())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EntryId, Level};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting {
        calls: AtomicUsize,
    }

    impl Definition for Counting {
        fn label(&self, ctx: &RequestContext, entry: &Entry) -> String {
            self.calls.fetch_add(1, Ordering::SeqCst);
            format!("{}:{}", ctx.locale().unwrap_or("-"), entry.entry_type())
        }

        fn actions(&self, _ctx: &RequestContext, entry: &Entry) -> Vec<Action> {
            vec![Action::new("Open", format!("/logs/{}", entry.id())).with_icon("eye")]
        }
    }

    #[test]
    fn test_default_definition() {
        let id = EntryId::generate();
        let entry = Entry::new("user.login", Level::Info).with_id(id);
        let bound = BoundDefinition::new(Arc::new(DefaultDefinition), RequestContext::new(), entry);
        assert_eq!(bound.label(), format!("user.login ({id})"));
        assert_eq!(bound.message(), "");
        assert!(bound.actions().is_empty());
    }

    #[test]
    fn test_parts_computed_once() {
        let definition = Arc::new(Counting {
            calls: AtomicUsize::new(0),
        });
        let ctx = RequestContext::new().with_locale("de");
        let bound = BoundDefinition::new(definition.clone(), ctx, Entry::new("x", Level::Info));
        assert_eq!(definition.calls.load(Ordering::SeqCst), 0);
        assert_eq!(bound.label(), "de:x");
        assert_eq!(bound.label(), "de:x");
        assert_eq!(definition.calls.load(Ordering::SeqCst), 1);
        assert_eq!(bound.actions()[0].icon.as_deref(), Some("eye"));
    }

    #[test]
    fn test_request_context_attributes() {
        let ctx = RequestContext::new().with_attribute("tz", "UTC");
        assert_eq!(ctx.attribute("tz"), Some("UTC"));
        assert_eq!(ctx.attribute("missing"), None);
        assert_eq!(ctx.locale(), None);
    }
}
