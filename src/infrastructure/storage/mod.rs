//! File-based storage implementation

mod document;

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value};
use tokio::sync::RwLock;

use crate::application::errors::{BotError, StorageError};
use crate::domain::traits::ConversationStore;
use crate::infrastructure::config::{Adapter, StorageConfig};
use crate::infrastructure::database::{MySqlStore, PostgresStore, SqliteStore};

pub use document::DocumentStore;

/// Documents keyed by sender id
pub type Documents = BTreeMap<String, Map<String, Value>>;

/// Current time as stored in `last_use`
pub(crate) fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// JSON file holding one document per sender.
///
/// Every mutation runs under a single write lock on a copy of the documents.
/// The copy replaces the live map only once it is on disk (temp file +
/// rename), so a failed write leaves memory and file unchanged.
pub struct JsonCollection {
    path: Option<PathBuf>,
    docs: RwLock<Documents>,
}

impl JsonCollection {
    pub fn in_memory() -> Self {
        Self {
            path: None,
            docs: RwLock::new(Documents::new()),
        }
    }

    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let docs = match tokio::fs::read(&path).await {
            Ok(bytes) if bytes.is_empty() => Documents::new(),
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Documents::new(),
            Err(e) => {
                return Err(StorageError::Unavailable(format!("{}: {}", path.display(), e)));
            }
        };

        Ok(Self {
            path: Some(path),
            docs: RwLock::new(docs),
        })
    }

    pub async fn read<T>(&self, f: impl FnOnce(&Documents) -> T) -> T {
        let docs = self.docs.read().await;
        f(&docs)
    }

    pub async fn write<T: Send>(&self, f: impl FnOnce(&mut Documents) -> T + Send) -> Result<T, StorageError> {
        let mut docs = self.docs.write().await;
        let mut next = docs.clone();
        let out = f(&mut next);
        self.persist(&next).await?;
        *docs = next;
        Ok(out)
    }

    async fn persist(&self, docs: &Documents) -> Result<(), StorageError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let bytes = serde_json::to_vec_pretty(docs)?;
        let tmp = path.with_extension("tmp");
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }
}

/// Ephemeral per-sender attributes, for backends without schemaless fields
pub struct AttrStore {
    docs: JsonCollection,
}

impl AttrStore {
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

    pub async fn get(&self, sender_id: &str, key: &str) -> Option<Value> {
        self.docs
            .read(|docs| docs.get(sender_id).and_then(|doc| doc.get(key)).cloned())
            .await
    }

    pub async fn set(&self, sender_id: &str, key: &str, value: Value) -> Result<(), StorageError> {
        self.docs
            .write(|docs| {
                docs.entry(sender_id.to_string())
                    .or_default()
                    .insert(key.to_string(), value);
            })
            .await
    }

    pub async fn delete(&self, sender_id: &str, key: &str) -> Result<(), StorageError> {
        self.docs
            .write(|docs| {
                if let Some(doc) = docs.get_mut(sender_id) {
                    doc.remove(key);
                }
            })
            .await
    }
}

/// Open the one backend the configuration selects
pub async fn open_store(config: &StorageConfig) -> Result<Arc<dyn ConversationStore>, BotError> {
    let store: Arc<dyn ConversationStore> = match config.adapter {
        Adapter::Sqlite => {
            let attrs = AttrStore::open(&config.attr_file).await?;
            Arc::new(SqliteStore::open(&config.file, attrs).await?)
        }
        Adapter::Postgres => {
            let options = PostgresStore::options(config)?;
            let attrs = AttrStore::open(&config.attr_file).await?;
            Arc::new(PostgresStore::connect(options, config.max_connections, attrs).await?)
        }
        Adapter::Mysql => {
            let options = MySqlStore::options(config)?;
            let attrs = AttrStore::open(&config.attr_file).await?;
            Arc::new(MySqlStore::connect(options, config.max_connections, attrs).await?)
        }
        Adapter::Document => Arc::new(DocumentStore::open(&config.documents).await?),
    };
    tracing::info!("Conversation store ready: {}", store.backend());
    Ok(store)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn attrs_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("private").join("attrs.json");

        let attrs = AttrStore::open(&path).await.unwrap();
        attrs.set("U1", "cart", json!(["apple"])).await.unwrap();
        attrs.set("U1", "step", json!(2)).await.unwrap();
        attrs.delete("U1", "step").await.unwrap();
        drop(attrs);

        let reopened = AttrStore::open(&path).await.unwrap();
        assert_eq!(reopened.get("U1", "cart").await, Some(json!(["apple"])));
        assert_eq!(reopened.get("U1", "step").await, None);
        assert_eq!(reopened.get("U2", "cart").await, None);
    }

    #[tokio::test]
    async fn failed_write_leaves_no_trace() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("attrs.json");

        let attrs = AttrStore::open(&path).await.unwrap();
        attrs.set("U1", "kept", json!(1)).await.unwrap();

        // A directory where the temp file goes makes every flush fail
        std::fs::create_dir(dir.path().join("attrs.tmp")).unwrap();
        assert!(attrs.set("U1", "lost", json!("v")).await.is_err());
        assert!(attrs.delete("U1", "kept").await.is_err());

        assert_eq!(attrs.get("U1", "lost").await, None);
        assert_eq!(attrs.get("U1", "kept").await, Some(json!(1)));

        let reopened = AttrStore::open(&path).await.unwrap();
        assert_eq!(reopened.get("U1", "lost").await, None);
        assert_eq!(reopened.get("U1", "kept").await, Some(json!(1)));
    }

    #[tokio::test]
    async fn corrupt_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("attrs.json");
        std::fs::write(&path, b"{ not json").unwrap();

        let err = AttrStore::open(&path).await.err().unwrap();
        assert!(matches!(err, StorageError::Serialization(_)));
    }
}
