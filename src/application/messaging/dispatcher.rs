//! Message dispatcher - Routes normalized webhook events to handlers

use std::sync::Arc;

use serde_json::Value;

use super::middleware::{Context, Handler, Outcome};
use super::parser;
use super::registry::{HandlerKind, HandlerRegistry};
use crate::application::errors::BotError;
use crate::domain::entities::Payload;
use crate::domain::traits::ConversationStore;

/// Command key used when nothing more specific matches
pub const FALLBACK_COMMAND: &str = "/";

/// What happened to one webhook payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    /// Nothing in the payload was recognised
    NoEvent,
    /// An event was recognised but no handler applies
    Unrouted { sender_id: String },
    Handled {
        kind: HandlerKind,
        key: String,
        outcome: Outcome,
    },
}

/// Message dispatcher - normalizes payloads, keeps conversation state
/// current and runs the matching handler through the hooks
pub struct MessageDispatcher {
    registry: Arc<HandlerRegistry>,
    store: Arc<dyn ConversationStore>,
}

impl MessageDispatcher {
    pub fn new(registry: HandlerRegistry, store: Arc<dyn ConversationStore>) -> Self {
        Self {
            registry: Arc::new(registry),
            store,
        }
    }

    /// Process one webhook payload
    pub async fn dispatch(&self, payload: &Value) -> Result<Dispatch, BotError> {
        let event = parser::normalize(payload);
        if event.command.is_empty() {
            tracing::debug!("No actionable event in payload");
            return Ok(Dispatch::NoEvent);
        }
        let Some(sender_id) = event.sender_id else {
            tracing::debug!("Event without sender id, ignoring");
            return Ok(Dispatch::NoEvent);
        };

        let source = event.command.source();
        tracing::debug!(
            "[{}] {} {}",
            sender_id,
            source.map(|s| s.as_str()).unwrap_or("-"),
            event.command.body().chars().take(50).collect::<String>()
        );

        self.store.touch(&sender_id).await?;
        let lang = self.store.get_lang(&sender_id).await?;
        let raw = event.raw.cloned().unwrap_or(Value::Null);
        let ctx = Context::new(sender_id.clone(), event.command, raw, self.store.clone()).with_lang(lang);

        if let Some(tag) = source.filter(|s| s.is_event()) {
            return match self.registry.lookup(HandlerKind::Event, tag.as_str()) {
                Some(handler) => self.run(HandlerKind::Event, tag.as_str(), handler, &ctx).await,
                None => Ok(self.unrouted(sender_id)),
            };
        }

        if let Some((key, handler)) = self.find_command(&ctx.payload) {
            return self.run(HandlerKind::Command, &key, handler, &ctx).await;
        }

        if let Some(stored) = self.store.get_action(&sender_id).await? {
            let action = Payload::decode(&stored);
            if let Some(handler) = self.registry.lookup(HandlerKind::Action, &action.name) {
                // Consumed before running so the handler can set the next one
                self.store.set_action(&sender_id, None).await?;
                let mut ctx = ctx;
                for (key, value) in action.params {
                    ctx.payload.params.entry(key).or_insert(value);
                }
                return self.run(HandlerKind::Action, &action.name, handler, &ctx).await;
            }
            tracing::warn!("[{}] No handler for pending action '{}'", sender_id, action.name);
        }

        match self.registry.lookup(HandlerKind::Command, FALLBACK_COMMAND) {
            Some(handler) => self.run(HandlerKind::Command, FALLBACK_COMMAND, handler, &ctx).await,
            None => Ok(self.unrouted(sender_id)),
        }
    }

    /// Exact payload name first, then its first word
    fn find_command(&self, payload: &Payload) -> Option<(String, Arc<dyn Handler>)> {
        let name = payload.name.as_str();
        let first_word = name.split_whitespace().next().unwrap_or_default();
        [name, first_word]
            .into_iter()
            .filter(|key| !key.is_empty())
            .find_map(|key| {
                self.registry
                    .lookup(HandlerKind::Command, key)
                    .map(|h| (key.to_string(), h))
            })
    }

    async fn run(
        &self,
        kind: HandlerKind,
        key: &str,
        handler: Arc<dyn Handler>,
        ctx: &Context,
    ) -> Result<Dispatch, BotError> {
        tracing::debug!("[{}] -> {} '{}'", ctx.sender_id, kind, key);
        let outcome = self.registry.hooks().run(handler.as_ref(), ctx).await?;
        Ok(Dispatch::Handled {
            kind,
            key: key.to_string(),
            outcome,
        })
    }

    fn unrouted(&self, sender_id: String) -> Dispatch {
        tracing::warn!("[{}] No handler matched", sender_id);
        Dispatch::Unrouted { sender_id }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::messaging::middleware::handler_fn;
    use crate::infrastructure::storage::DocumentStore;
    use serde_json::json;

    fn text(sender: &str, body: &str) -> Value {
        json!({ "entry": [ { "messaging": [ { "sender": { "id": sender }, "message": { "text": body } } ] } ] })
    }

    fn echo(prefix: &'static str) -> impl Handler {
        handler_fn(move |ctx: Context| async move { Ok(format!("{}:{}", prefix, ctx.command.body())) })
    }

    #[tokio::test]
    async fn empty_payload_does_not_touch_store() {
        let store = Arc::new(DocumentStore::in_memory());
        let dispatcher = MessageDispatcher::new(HandlerRegistry::new(), store.clone());

        let result = dispatcher.dispatch(&json!({ "entry": [] })).await.unwrap();

        assert_eq!(result, Dispatch::NoEvent);
        assert!(store.get_action("U1").await.is_err());
    }

    #[tokio::test]
    async fn command_matches_first_word() {
        let registry = HandlerRegistry::new().with_command("/search", echo("search"));
        let dispatcher = MessageDispatcher::new(registry, Arc::new(DocumentStore::in_memory()));

        let result = dispatcher.dispatch(&text("U1", "/search rust books")).await.unwrap();

        assert_eq!(
            result,
            Dispatch::Handled {
                kind: HandlerKind::Command,
                key: "/search".to_string(),
                outcome: Outcome::Executed("search:/search rust books".to_string()),
            }
        );
    }

    #[tokio::test]
    async fn item_without_sender_is_dropped() {
        let store = Arc::new(DocumentStore::in_memory());
        let registry = HandlerRegistry::new().with_command("/", echo("fallback"));
        let dispatcher = MessageDispatcher::new(registry, store.clone());

        let payload = json!({ "entry": [ { "messaging": [ { "message": { "text": "hi" } } ] } ] });
        let result = dispatcher.dispatch(&payload).await.unwrap();

        assert_eq!(result, Dispatch::NoEvent);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn unrouted_without_fallback() {
        let dispatcher = MessageDispatcher::new(HandlerRegistry::new(), Arc::new(DocumentStore::in_memory()));
        let result = dispatcher.dispatch(&text("U1", "hello")).await.unwrap();
        assert_eq!(result, Dispatch::Unrouted { sender_id: "U1".to_string() });
    }
}
