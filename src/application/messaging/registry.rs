//! Handler registry - Maps (kind, key) to handlers, plus the hook slots

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::middleware::{AfterHook, BeforeHook, Handler, Hooks};

/// Which routing table a handler lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandlerKind {
    /// Keyed by the command text or payload name, e.g. `/start`
    Command,
    /// Keyed by the pending action stored for the sender
    Action,
    /// Keyed by the event tag: `read`, `delivery`, `reaction`, `optin`
    Event,
}

impl HandlerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            HandlerKind::Command => "command",
            HandlerKind::Action => "action",
            HandlerKind::Event => "event",
        }
    }
}

impl fmt::Display for HandlerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Registry of handlers, built at startup and read-only once handed to the
/// dispatcher. Registering an existing (kind, key) replaces the handler.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<HandlerKind, HashMap<String, Arc<dyn Handler>>>,
    hooks: Hooks,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<H: Handler + 'static>(&mut self, kind: HandlerKind, key: impl Into<String>, handler: H) {
        let key = key.into();
        let replaced = self
            .handlers
            .entry(kind)
            .or_default()
            .insert(key.clone(), Arc::new(handler))
            .is_some();
        if replaced {
            tracing::debug!("Replaced {} handler '{}'", kind, key);
        }
    }

    pub fn lookup(&self, kind: HandlerKind, key: &str) -> Option<Arc<dyn Handler>> {
        self.handlers.get(&kind)?.get(key).cloned()
    }

    pub fn set_before<H: BeforeHook + 'static>(&mut self, hook: H) {
        self.hooks.set_before(hook);
    }

    pub fn set_after<H: AfterHook + 'static>(&mut self, hook: H) {
        self.hooks.set_after(hook);
    }

    pub fn hooks(&self) -> &Hooks {
        &self.hooks
    }

    /// Registered keys of one kind, sorted
    pub fn keys(&self, kind: HandlerKind) -> Vec<&str> {
        let mut keys: Vec<&str> = self
            .handlers
            .get(&kind)
            .map(|m| m.keys().map(String::as_str).collect())
            .unwrap_or_default();
        keys.sort_unstable();
        keys
    }

    pub fn with_command<H: Handler + 'static>(mut self, key: impl Into<String>, handler: H) -> Self {
        self.register(HandlerKind::Command, key, handler);
        self
    }

    pub fn with_action<H: Handler + 'static>(mut self, key: impl Into<String>, handler: H) -> Self {
        self.register(HandlerKind::Action, key, handler);
        self
    }

    pub fn with_event<H: Handler + 'static>(mut self, key: impl Into<String>, handler: H) -> Self {
        self.register(HandlerKind::Event, key, handler);
        self
    }

    pub fn with_before<H: BeforeHook + 'static>(mut self, hook: H) -> Self {
        self.set_before(hook);
        self
    }

    pub fn with_after<H: AfterHook + 'static>(mut self, hook: H) -> Self {
        self.set_after(hook);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::messaging::middleware::{handler_fn, Context};
    use crate::domain::entities::{Command, SourceTag};
    use crate::infrastructure::storage::DocumentStore;
    use serde_json::Value;

    fn reply(text: &'static str) -> impl Handler {
        handler_fn(move |_ctx: Context| async move { Ok(text.to_string()) })
    }

    #[tokio::test]
    async fn last_registration_wins() {
        let registry = HandlerRegistry::new()
            .with_command("/start", reply("first"))
            .with_command("/start", reply("second"));

        let ctx = Context::new(
            "U1",
            Command::new("/start", SourceTag::Text),
            Value::Null,
            Arc::new(DocumentStore::in_memory()),
        );
        let handler = registry.lookup(HandlerKind::Command, "/start").unwrap();
        assert_eq!(handler.handle(&ctx).await.unwrap(), "second");
        assert_eq!(registry.keys(HandlerKind::Command), vec!["/start"]);
    }

    #[test]
    fn kinds_are_separate_tables() {
        let registry = HandlerRegistry::new()
            .with_action("ask_name", reply("action"))
            .with_event("read", reply("event"));

        assert!(registry.lookup(HandlerKind::Action, "ask_name").is_some());
        assert!(registry.lookup(HandlerKind::Command, "ask_name").is_none());
        assert!(registry.lookup(HandlerKind::Event, "read").is_some());
        assert!(registry.lookup(HandlerKind::Event, "delivery").is_none());
    }
}
