use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use sqlx::Row;

use super::SqlDialect;
use crate::application::errors::{ConfigError, StorageError};
use crate::domain::entities::Field;
use crate::domain::traits::ConversationStore;
use crate::infrastructure::config::StorageConfig;
use crate::infrastructure::storage::AttrStore;

/// PostgreSQL-backed store on a connection pool
pub struct PostgresStore {
    pool: PgPool,
    attrs: AttrStore,
}

impl PostgresStore {
    const DIALECT: SqlDialect = SqlDialect::Postgres;

    /// Connection options from the storage section of the config
    pub fn options(config: &StorageConfig) -> Result<PgConnectOptions, ConfigError> {
        let (host, name) = config.server()?;

        let mut options = PgConnectOptions::new().host(host).database(name);
        if let Some(port) = config.port {
            options = options.port(port);
        }
        if let Some(user) = config.user.as_deref() {
            options = options.username(user);
        }
        if let Some(password) = config.password.as_deref() {
            options = options.password(password);
        }
        Ok(options)
    }

    pub async fn connect(options: PgConnectOptions, max_connections: u32, attrs: AttrStore) -> Result<Self, StorageError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect_with(options)
            .await
            .map_err(|e| StorageError::Unavailable(e.to_string()))?;

        sqlx::query(Self::DIALECT.create_table()).execute(&pool).await?;
        tracing::info!("PostgreSQL store connected");
        Ok(Self { pool, attrs })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn field(&self, sender_id: &str, field: Field) -> Result<Option<String>, StorageError> {
        let mut values = self.get_fields(sender_id, &[field]).await?;
        Ok(values.pop().flatten())
    }
}

#[async_trait]
impl ConversationStore for PostgresStore {
    async fn touch(&self, sender_id: &str) -> Result<(), StorageError> {
        sqlx::query(&Self::DIALECT.touch())
            .bind(sender_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get_action(&self, sender_id: &str) -> Result<Option<String>, StorageError> {
        self.field(sender_id, Field::Action).await
    }

    async fn set_action(&self, sender_id: &str, action: Option<&str>) -> Result<(), StorageError> {
        sqlx::query(&Self::DIALECT.upsert_field(Field::Action))
            .bind(sender_id)
            .bind(action)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get_lang(&self, sender_id: &str) -> Result<Option<String>, StorageError> {
        self.field(sender_id, Field::Lang).await
    }

    async fn set_lang(&self, sender_id: &str, lang: Option<&str>) -> Result<(), StorageError> {
        sqlx::query(&Self::DIALECT.update_field(Field::Lang))
            .bind(lang)
            .bind(sender_id)
            .execute(&self.pool)
            .await?;
        Ok(())
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
        let sql = Self::DIALECT.select_fields(fields);
        let row = sqlx::query(&sql)
            .bind(sender_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StorageError::NotFound(sender_id.to_string()))?;

        (0..fields.len())
            .map(|i| row.try_get::<Option<String>, _>(i).map_err(StorageError::from))
            .collect()
    }

    fn backend(&self) -> &'static str {
        "postgres"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::config::Adapter;

    #[test]
    fn options_require_host_and_name() {
        let mut config = StorageConfig {
            adapter: Adapter::Postgres,
            ..StorageConfig::default()
        };
        assert!(matches!(PostgresStore::options(&config), Err(ConfigError::MissingField(f)) if f == "storage.host"));

        config.host = Some("db.internal".to_string());
        assert!(matches!(PostgresStore::options(&config), Err(ConfigError::MissingField(f)) if f == "storage.name"));

        config.name = Some("hookline".to_string());
        config.port = Some(6543);
        config.user = Some("bot".to_string());
        let options = PostgresStore::options(&config).unwrap();
        assert_eq!(options.get_host(), "db.internal");
        assert_eq!(options.get_port(), 6543);
        assert_eq!(options.get_database(), Some("hookline"));
        assert_eq!(options.get_username(), "bot");
    }
}
