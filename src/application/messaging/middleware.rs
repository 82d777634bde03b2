//! Handler contracts and the before/after hook runner wrapped around every
//! dispatched handler

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::application::errors::BotError;
use crate::domain::entities::{Command, Payload};
use crate::domain::traits::ConversationStore;

/// Handler result
pub type HandlerResult = Result<String, BotError>;

/// Everything a handler gets to see about one inbound event
#[derive(Clone)]
pub struct Context {
    pub sender_id: String,
    pub command: Command,
    /// Route name and parameters decoded from the command body
    pub payload: Payload,
    /// The messaging item the command came from, untouched
    pub raw: Value,
    pub lang: Option<String>,
    pub store: Arc<dyn ConversationStore>,
}

impl Context {
    pub fn new(
        sender_id: impl Into<String>,
        command: Command,
        raw: Value,
        store: Arc<dyn ConversationStore>,
    ) -> Self {
        let payload = Payload::decode(command.body());
        Self {
            sender_id: sender_id.into(),
            command,
            payload,
            raw,
            lang: None,
            store,
        }
    }

    pub fn with_lang(mut self, lang: Option<String>) -> Self {
        self.lang = lang;
        self
    }

    /// Parameter from the decoded payload
    pub fn param(&self, key: &str) -> Option<&Value> {
        self.payload.param(key)
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("sender_id", &self.sender_id)
            .field("command", &self.command)
            .field("payload", &self.payload)
            .field("lang", &self.lang)
            .field("store", &self.store.backend())
            .finish_non_exhaustive()
    }
}

/// What the hook runner reports back
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Executed(String),
    /// The before hook declined; the handler was skipped
    NotExecuted,
}

impl Outcome {
    pub fn reply(&self) -> Option<&str> {
        match self {
            Outcome::Executed(reply) => Some(reply),
            Outcome::NotExecuted => None,
        }
    }
}

/// A registered command, action or event handler
#[async_trait]
pub trait Handler: Send + Sync {
    async fn handle(&self, ctx: &Context) -> HandlerResult;
}

/// Runs before every handler; returning `false` skips the handler.
#[async_trait]
pub trait BeforeHook: Send + Sync {
    async fn before(&self, ctx: &Context) -> Result<bool, BotError>;
}

/// Runs after every handler, whether it ran or not.
#[async_trait]
pub trait AfterHook: Send + Sync {
    async fn after(&self, ctx: &Context, outcome: &Outcome) -> Result<(), BotError>;
}

/// Adapter turning an async closure into a [`Handler`]
pub struct FnHandler<F>(F);

pub fn handler_fn<F, Fut>(f: F) -> FnHandler<F>
where
    F: Fn(Context) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    FnHandler(f)
}

#[async_trait]
impl<F, Fut> Handler for FnHandler<F>
where
    F: Fn(Context) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    async fn handle(&self, ctx: &Context) -> HandlerResult {
        (self.0)(ctx.clone()).await
    }
}

pub struct FnBefore<F>(F);

pub fn before_fn<F, Fut>(f: F) -> FnBefore<F>
where
    F: Fn(Context) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<bool, BotError>> + Send + 'static,
{
    FnBefore(f)
}

#[async_trait]
impl<F, Fut> BeforeHook for FnBefore<F>
where
    F: Fn(Context) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<bool, BotError>> + Send + 'static,
{
    async fn before(&self, ctx: &Context) -> Result<bool, BotError> {
        (self.0)(ctx.clone()).await
    }
}

pub struct FnAfter<F>(F);

pub fn after_fn<F, Fut>(f: F) -> FnAfter<F>
where
    F: Fn(Context, Outcome) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), BotError>> + Send + 'static,
{
    FnAfter(f)
}

#[async_trait]
impl<F, Fut> AfterHook for FnAfter<F>
where
    F: Fn(Context, Outcome) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), BotError>> + Send + 'static,
{
    async fn after(&self, ctx: &Context, outcome: &Outcome) -> Result<(), BotError> {
        (self.0)(ctx.clone(), outcome.clone()).await
    }
}

/// The before/after pair applied to every dispatched handler
#[derive(Clone, Default)]
pub struct Hooks {
    before: Option<Arc<dyn BeforeHook>>,
    after: Option<Arc<dyn AfterHook>>,
}

impl Hooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_before<H: BeforeHook + 'static>(&mut self, hook: H) {
        self.before = Some(Arc::new(hook));
    }

    pub fn set_after<H: AfterHook + 'static>(&mut self, hook: H) {
        self.after = Some(Arc::new(hook));
    }

    /// Run `handler` between the hooks. Errors from any of the three are
    /// returned as they are.
    pub async fn run(&self, handler: &dyn Handler, ctx: &Context) -> Result<Outcome, BotError> {
        let proceed = match &self.before {
            Some(before) => before.before(ctx).await?,
            None => true,
        };

        let outcome = if proceed {
            Outcome::Executed(handler.handle(ctx).await?)
        } else {
            tracing::debug!("[{}] before hook declined", ctx.sender_id);
            Outcome::NotExecuted
        };

        if let Some(after) = &self.after {
            after.after(ctx, &outcome).await?;
        }

        Ok(outcome)
    }
}
