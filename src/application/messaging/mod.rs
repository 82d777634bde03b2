//! Message handling - Webhook normalization, handler registry and dispatch

pub mod dispatcher;
pub mod middleware;
pub mod parser;
pub mod registry;

pub use dispatcher::{Dispatch, MessageDispatcher, FALLBACK_COMMAND};
pub use middleware::{
    after_fn, before_fn, handler_fn, AfterHook, BeforeHook, Context, Handler, HandlerResult, Hooks, Outcome,
};
pub use parser::{normalize, Event};
pub use registry::{HandlerKind, HandlerRegistry};
