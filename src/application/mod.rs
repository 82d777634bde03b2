//! Application layer - Use cases and business logic
//! 
//! This layer contains:
//! - Errors: Domain-specific errors
//! - Messaging: Webhook normalization, handler registry, hooks, dispatching

pub mod errors;
pub mod messaging;
