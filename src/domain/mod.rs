//! Domain layer - Core business logic with no external dependencies
//! 
//! This layer contains:
//! - Entities: Core business objects (Command, Payload, Field)
//! - Traits: Abstractions for infrastructure (ConversationStore)

pub mod entities;
pub mod traits;
