//! Document backend: one JSON document per sender, with ephemeral attributes
//! nested under `attrs`

use std::path::PathBuf;

use async_trait::async_trait;
use serde_json::{Map, Value};

use super::{now_timestamp, Documents, JsonCollection};
use crate::application::errors::StorageError;
use crate::domain::entities::Field;
use crate::domain::traits::ConversationStore;

const ATTRS: &str = "attrs";

pub struct DocumentStore {
    docs: JsonCollection,
}

impl DocumentStore {
    pub fn in_memory() -> Self {
        Self {
            docs: JsonCollection::in_memory(),
        }
    }

    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        Ok(Self {
            docs: JsonCollection::open(path).await?,
        })
    }

    /// Number of sender documents
    pub async fn len(&self) -> usize {
        self.docs.read(|docs| docs.len()).await
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    async fn field(&self, sender_id: &str, field: Field) -> Result<Option<String>, StorageError> {
        let mut values = self.get_fields(sender_id, &[field]).await?;
        Ok(values.pop().flatten())
    }
}

fn upsert<'a>(docs: &'a mut Documents, sender_id: &str) -> &'a mut Map<String, Value> {
    docs.entry(sender_id.to_string()).or_insert_with(|| {
        let mut doc = Map::new();
        doc.insert(Field::SenderId.column().into(), Value::String(sender_id.to_string()));
        doc.insert(Field::LastUse.column().into(), Value::String(now_timestamp()));
        doc
    })
}

fn optional(value: Option<&str>) -> Value {
    value.map_or(Value::Null, |v| Value::String(v.to_string()))
}

fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

#[async_trait]
impl ConversationStore for DocumentStore {
    async fn touch(&self, sender_id: &str) -> Result<(), StorageError> {
        self.docs
            .write(|docs| {
                upsert(docs, sender_id).insert(Field::LastUse.column().into(), Value::String(now_timestamp()));
            })
            .await
    }

    async fn get_action(&self, sender_id: &str) -> Result<Option<String>, StorageError> {
        self.field(sender_id, Field::Action).await
    }

    async fn set_action(&self, sender_id: &str, action: Option<&str>) -> Result<(), StorageError> {
        self.docs
            .write(|docs| {
                upsert(docs, sender_id).insert(Field::Action.column().into(), optional(action));
            })
            .await
    }

    async fn get_lang(&self, sender_id: &str) -> Result<Option<String>, StorageError> {
        self.field(sender_id, Field::Lang).await
    }

    async fn set_lang(&self, sender_id: &str, lang: Option<&str>) -> Result<(), StorageError> {
        self.docs
            .write(|docs| {
                if let Some(doc) = docs.get_mut(sender_id) {
                    doc.insert(Field::Lang.column().into(), optional(lang));
                }
            })
            .await
    }

    async fn get_attr(&self, sender_id: &str, key: &str) -> Result<Option<Value>, StorageError> {
        Ok(self
            .docs
            .read(|docs| {
                docs.get(sender_id)
                    .and_then(|doc| doc.get(ATTRS))
                    .and_then(|attrs| attrs.get(key))
                    .cloned()
            })
            .await)
    }

    async fn set_attr(&self, sender_id: &str, key: &str, value: Value) -> Result<(), StorageError> {
        self.docs
            .write(|docs| {
                let doc = upsert(docs, sender_id);
                let attrs = doc
                    .entry(ATTRS)
                    .or_insert_with(|| Value::Object(Map::new()));
                if !attrs.is_object() {
                    *attrs = Value::Object(Map::new());
                }
                if let Value::Object(attrs) = attrs {
                    attrs.insert(key.to_string(), value);
                }
            })
            .await
    }

    async fn del_attr(&self, sender_id: &str, key: &str) -> Result<(), StorageError> {
        self.docs
            .write(|docs| {
                if let Some(Value::Object(attrs)) = docs.get_mut(sender_id).and_then(|doc| doc.get_mut(ATTRS)) {
                    attrs.remove(key);
                }
            })
            .await
    }

    async fn get_fields(&self, sender_id: &str, fields: &[Field]) -> Result<Vec<Option<String>>, StorageError> {
        self.docs
            .read(|docs| {
                docs.get(sender_id).map(|doc| {
                    fields
                        .iter()
                        .map(|f| doc.get(f.column()).and_then(as_text))
                        .collect::<Vec<_>>()
                })
            })
            .await
            .ok_or_else(|| StorageError::NotFound(sender_id.to_string()))
    }

    fn backend(&self) -> &'static str {
        "document"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn attrs_do_not_leak_into_fields() {
        let store = DocumentStore::in_memory();
        store.set_attr("U1", "action", json!("shadow")).await.unwrap();

        assert_eq!(store.get_action("U1").await.unwrap(), None);
        assert_eq!(store.get_attr("U1", "action").await.unwrap(), Some(json!("shadow")));
    }

    #[tokio::test]
    async fn failed_flush_creates_no_document() {
        let dir = tempfile::tempdir().unwrap();
        let store = DocumentStore::open(dir.path().join("conversations.json")).await.unwrap();
        std::fs::create_dir(dir.path().join("conversations.tmp")).unwrap();

        assert!(store.touch("U1").await.is_err());
        assert!(store.is_empty().await);
        assert!(matches!(store.get_action("U1").await, Err(StorageError::NotFound(_))));
    }

    #[tokio::test]
    async fn set_lang_ignores_unknown_senders() {
        let store = DocumentStore::in_memory();
        store.set_lang("ghost", Some("fr")).await.unwrap();
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn documents_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("conversations.json");

        let store = DocumentStore::open(&path).await.unwrap();
        store.touch("U1").await.unwrap();
        store.set_lang("U1", Some("fr")).await.unwrap();
        store.set_attr("U1", "step", json!(3)).await.unwrap();
        drop(store);

        let store = DocumentStore::open(&path).await.unwrap();
        assert_eq!(store.len().await, 1);
        assert_eq!(store.get_lang("U1").await.unwrap().as_deref(), Some("fr"));
        assert_eq!(store.get_attr("U1", "step").await.unwrap(), Some(json!(3)));
    }
}
