//! hookline - Webhook event normalization, handler dispatch and
//! per-conversation state for messaging-platform bots

pub mod application;
pub mod domain;
pub mod infrastructure;

pub use application::errors::{BotError, ConfigError, StorageError};
pub use application::messaging::{
    after_fn, before_fn, handler_fn, normalize, Context, Dispatch, HandlerKind, HandlerRegistry, MessageDispatcher,
    Outcome,
};
pub use domain::entities::{Command, Field, Payload, SourceTag};
pub use domain::traits::ConversationStore;
pub use infrastructure::config::{Adapter, Config, StorageConfig};
pub use infrastructure::storage::open_store;
