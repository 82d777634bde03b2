//! Relational conversation stores

mod mysql;
mod postgres;

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use rusqlite::{Connection, OptionalExtension};
use serde_json::Value;

use crate::application::errors::StorageError;
use crate::domain::entities::Field;
use crate::domain::traits::ConversationStore;
use crate::infrastructure::storage::AttrStore;

pub use mysql::MySqlStore;
pub use postgres::PostgresStore;

pub const TABLE: &str = "conversation_state";

/// SQL flavour of a relational backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlDialect {
    Sqlite,
    Postgres,
    MySql,
}

impl SqlDialect {
    pub fn placeholder(&self, n: usize) -> String {
        match self {
            SqlDialect::Sqlite => format!("?{}", n),
            SqlDialect::Postgres => format!("${}", n),
            SqlDialect::MySql => "?".to_string(),
        }
    }

    pub fn create_table(&self) -> &'static str {
        match self {
            SqlDialect::Sqlite => {
                "CREATE TABLE IF NOT EXISTS conversation_state (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    sender_id TEXT NOT NULL UNIQUE,
                    action TEXT,
                    last_use TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
                    lang TEXT
                )"
            }
            SqlDialect::Postgres => {
                "CREATE TABLE IF NOT EXISTS conversation_state (
                    id SERIAL PRIMARY KEY,
                    sender_id VARCHAR NOT NULL UNIQUE,
                    action TEXT,
                    last_use TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                    lang VARCHAR
                )"
            }
            SqlDialect::MySql => {
                "CREATE TABLE IF NOT EXISTS conversation_state (
                    id INT NOT NULL AUTO_INCREMENT PRIMARY KEY,
                    sender_id VARCHAR(255) NOT NULL UNIQUE,
                    action TEXT,
                    last_use DATETIME(3) NOT NULL DEFAULT CURRENT_TIMESTAMP(3),
                    lang VARCHAR(16)
                )"
            }
        }
    }

    fn now(&self) -> &'static str {
        match self {
            SqlDialect::Sqlite => "strftime('%Y-%m-%dT%H:%M:%fZ', 'now')",
            SqlDialect::Postgres => "NOW()",
            SqlDialect::MySql => "NOW(3)",
        }
    }

    /// `ON CONFLICT` clause that sets `assignment` when the sender exists
    fn on_conflict(&self, assignment: &str) -> String {
        match self {
            SqlDialect::MySql => format!("ON DUPLICATE KEY UPDATE {}", assignment),
            _ => format!("ON CONFLICT (sender_id) DO UPDATE SET {}", assignment),
        }
    }

    /// The value a conflicting insert tried to write to `column`
    fn inserted(&self, column: &str) -> String {
        match self {
            SqlDialect::MySql => format!("VALUES({})", column),
            _ => format!("excluded.{}", column),
        }
    }

    /// Insert the sender, or bump `last_use` if the sender already exists.
    /// Binds the sender id.
    pub fn touch(&self) -> String {
        format!(
            "INSERT INTO {t} (sender_id) VALUES ({p1}) {conflict}",
            t = TABLE,
            p1 = self.placeholder(1),
            conflict = self.on_conflict(&format!("last_use = {}", self.now())),
        )
    }

    /// Insert the sender with `field` set, or overwrite `field`.
    /// Binds the sender id, then the value.
    pub fn upsert_field(&self, field: Field) -> String {
        let column = field.column();
        format!(
            "INSERT INTO {t} (sender_id, {c}) VALUES ({p1}, {p2}) {conflict}",
            t = TABLE,
            c = column,
            p1 = self.placeholder(1),
            p2 = self.placeholder(2),
            conflict = self.on_conflict(&format!("{} = {}", column, self.inserted(column))),
        )
    }

    /// Overwrite `field` of an existing sender. Binds the value, then the id.
    pub fn update_field(&self, field: Field) -> String {
        format!(
            "UPDATE {t} SET {c} = {p1} WHERE sender_id = {p2}",
            t = TABLE,
            c = field.column(),
            p1 = self.placeholder(1),
            p2 = self.placeholder(2),
        )
    }

    /// Select `fields` as text, in order. Binds the sender id.
    pub fn select_fields(&self, fields: &[Field]) -> String {
        let text = match self {
            SqlDialect::MySql => "CHAR",
            _ => "TEXT",
        };
        let columns = if fields.is_empty() {
            "1".to_string()
        } else {
            fields
                .iter()
                .map(|f| format!("CAST({} AS {})", f.column(), text))
                .collect::<Vec<_>>()
                .join(", ")
        };
        format!(
            "SELECT {} FROM {} WHERE sender_id = {}",
            columns,
            TABLE,
            self.placeholder(1)
        )
    }
}

/// SQLite-backed store. Opens a fresh connection for every operation and
/// keeps ephemeral attributes in a side [`AttrStore`].
pub struct SqliteStore {
    path: PathBuf,
    attrs: AttrStore,
}

impl SqliteStore {
    const DIALECT: SqlDialect = SqlDialect::Sqlite;

    pub async fn open(path: impl AsRef<Path>, attrs: AttrStore) -> Result<Self, StorageError> {
        let store = Self {
            path: path.as_ref().to_path_buf(),
            attrs,
        };
        store
            .with_conn(|conn| {
                conn.execute_batch(Self::DIALECT.create_table())?;
                Ok(())
            })
            .await?;
        tracing::info!("SQLite store opened at {}", store.path.display());
        Ok(store)
    }

    fn connect(path: &Path) -> Result<Connection, StorageError> {
        let conn = Connection::open(path)
            .map_err(|e| StorageError::Unavailable(format!("{}: {}", path.display(), e)))?;
        conn.busy_timeout(Duration::from_secs(5))?;
        Ok(conn)
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T, StorageError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, StorageError> + Send + 'static,
    {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || {
            let conn = Self::connect(&path)?;
            f(&conn)
        })
        .await
        .map_err(|e| StorageError::Backend(format!("blocking task failed: {}", e)))?
    }

    async fn upsert(&self, sender_id: &str, field: Field, value: Option<&str>) -> Result<(), StorageError> {
        let sender_id = sender_id.to_string();
        let value = value.map(str::to_string);
        self.with_conn(move |conn| {
            conn.execute(&Self::DIALECT.upsert_field(field), rusqlite::params![sender_id, value])?;
            Ok(())
        })
        .await
    }

    async fn field(&self, sender_id: &str, field: Field) -> Result<Option<String>, StorageError> {
        let mut values = self.get_fields(sender_id, &[field]).await?;
        Ok(values.pop().flatten())
    }
}

#[async_trait]
impl ConversationStore for SqliteStore {
    async fn touch(&self, sender_id: &str) -> Result<(), StorageError> {
        let sender_id = sender_id.to_string();
        self.with_conn(move |conn| {
            conn.execute(&Self::DIALECT.touch(), [&sender_id])?;
            Ok(())
        })
        .await
    }

    async fn get_action(&self, sender_id: &str) -> Result<Option<String>, StorageError> {
        self.field(sender_id, Field::Action).await
    }

    async fn set_action(&self, sender_id: &str, action: Option<&str>) -> Result<(), StorageError> {
        self.upsert(sender_id, Field::Action, action).await
    }

    async fn get_lang(&self, sender_id: &str) -> Result<Option<String>, StorageError> {
        self.field(sender_id, Field::Lang).await
    }

    async fn set_lang(&self, sender_id: &str, lang: Option<&str>) -> Result<(), StorageError> {
        let sender_id = sender_id.to_string();
        let lang = lang.map(str::to_string);
        self.with_conn(move |conn| {
            conn.execute(
                &Self::DIALECT.update_field(Field::Lang),
                rusqlite::params![lang, sender_id],
            )?;
            Ok(())
        })
        .await
    }

    async fn get_attr(&self, sender_id: &str, key: &str) -> Result<Option<Value>, StorageError> {
        Ok(self.attrs.get(sender_id, key).await)
    }

    async fn set_attr(&self, sender_id: &str, key: &str, value: Value) -> Result<(), StorageError> {
        self.attrs.set(sender_id, key, value).await
    }

    async fn del_attr(&self, sender_id: &str, key: &str) -> Result<(), StorageError> {
        self.attrs.delete(sender_id, key).await
    }

    async fn get_fields(&self, sender_id: &str, fields: &[Field]) -> Result<Vec<Option<String>>, StorageError> {
        let sender_id = sender_id.to_string();
        let fields = fields.to_vec();
        self.with_conn(move |conn| {
            let sql = Self::DIALECT.select_fields(&fields);
            let row = conn
                .query_row(&sql, [&sender_id], |row| {
                    (0..fields.len())
                        .map(|i| row.get::<_, Option<String>>(i))
                        .collect::<rusqlite::Result<Vec<_>>>()
                })
                .optional()?;
            row.ok_or(StorageError::NotFound(sender_id))
        })
        .await
    }

    fn backend(&self) -> &'static str {
        "sqlite"
    }
}
