use async_trait::async_trait;
use serde_json::Value;

use crate::application::errors::StorageError;
use crate::domain::entities::{Field, Payload};

/// Per-sender conversation state, independent of the backend holding it.
///
/// Absent values are `None`. Reads of `action`, `lang` and primary fields fail
/// with [`StorageError::NotFound`] when the sender has no record; only
/// [`touch`](ConversationStore::touch), [`set_action`](ConversationStore::set_action)
/// and [`set_attr`](ConversationStore::set_attr) create one.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Create the sender's record, or bump its `last_use` if it exists.
    /// Implementations must do this as a single upsert.
    async fn touch(&self, sender_id: &str) -> Result<(), StorageError>;

    async fn get_action(&self, sender_id: &str) -> Result<Option<String>, StorageError>;
    async fn set_action(&self, sender_id: &str, action: Option<&str>) -> Result<(), StorageError>;

    /// Store a structured payload as the pending action.
    async fn set_action_payload(&self, sender_id: &str, payload: &Payload) -> Result<(), StorageError> {
        let encoded = payload.encode();
        self.set_action(sender_id, Some(&encoded)).await
    }

    async fn get_lang(&self, sender_id: &str) -> Result<Option<String>, StorageError>;
    async fn set_lang(&self, sender_id: &str, lang: Option<&str>) -> Result<(), StorageError>;

    // Ephemeral attributes
    async fn get_attr(&self, sender_id: &str, key: &str) -> Result<Option<Value>, StorageError>;
    async fn set_attr(&self, sender_id: &str, key: &str, value: Value) -> Result<(), StorageError>;
    async fn del_attr(&self, sender_id: &str, key: &str) -> Result<(), StorageError>;

    /// Raw primary field values, in the order requested. Timestamps are
    /// rendered as text.
    async fn get_fields(&self, sender_id: &str, fields: &[Field]) -> Result<Vec<Option<String>>, StorageError>;

    /// Backend name, for logs
    fn backend(&self) -> &'static str;
}
