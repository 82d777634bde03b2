//! Domain entities - Core business objects with no external dependencies

pub mod command;
pub mod conversation;
pub mod payload;

pub use command::{Command, SourceTag};
pub use conversation::Field;
pub use payload::Payload;
