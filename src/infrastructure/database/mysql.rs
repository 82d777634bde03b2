use async_trait::async_trait;
use serde_json::Value;
use sqlx::mysql::{MySqlConnectOptions, MySqlPool, MySqlPoolOptions};
use sqlx::Row;

use super::SqlDialect;
use crate::application::errors::{ConfigError, StorageError};
use crate::domain::entities::Field;
use crate::domain::traits::ConversationStore;
use crate::infrastructure::config::StorageConfig;
use crate::infrastructure::storage::AttrStore;

/// MySQL-backed store on a connection pool
pub struct MySqlStore {
    pool: MySqlPool,
    attrs: AttrStore,
}

impl MySqlStore {
    const DIALECT: SqlDialect = SqlDialect::MySql;

    pub fn options(config: &StorageConfig) -> Result<MySqlConnectOptions, ConfigError> {
        let (host, name) = config.server()?;

        let mut options = MySqlConnectOptions::new().host(host).database(name);
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

    pub async fn connect(options: MySqlConnectOptions, max_connections: u32, attrs: AttrStore) -> Result<Self, StorageError> {
        let pool = MySqlPoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect_with(options)
            .await
            .map_err(|e| StorageError::Unavailable(e.to_string()))?;

        sqlx::query(Self::DIALECT.create_table()).execute(&pool).await?;
        tracing::info!("MySQL store connected");
        Ok(Self { pool, attrs })
    }

    pub fn pool(&self) -> &MySqlPool {
        &self.pool
    }

    async fn field(&self, sender_id: &str, field: Field) -> Result<Option<String>, StorageError> {
        let mut values = self.get_fields(sender_id, &[field]).await?;
        Ok(values.pop().flatten())
    }
}

#[async_trait]
impl ConversationStore for MySqlStore {
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
        "mysql"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::config::Adapter;

    #[test]
    fn options_need_a_server() {
        let mut config = StorageConfig {
            adapter: Adapter::Mysql,
            host: Some("db.internal".to_string()),
            ..StorageConfig::default()
        };
        assert!(matches!(MySqlStore::options(&config), Err(ConfigError::MissingField(f)) if f == "storage.name"));

        config.name = Some("hookline".to_string());
        config.port = Some(3307);
        let options = MySqlStore::options(&config).unwrap();
        assert_eq!(options.get_host(), "db.internal");
        assert_eq!(options.get_port(), 3307);
        assert_eq!(options.get_database(), Some("hookline"));
    }
}
