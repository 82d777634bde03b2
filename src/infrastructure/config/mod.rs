//! Configuration management

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::application::errors::ConfigError;

/// Application configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct Config {
    pub bot: BotConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct BotConfig {
    pub name: String,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            name: "hookline".to_string(),
        }
    }
}

/// Primary storage backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Adapter {
    #[default]
    Sqlite,
    Postgres,
    Mysql,
    Document,
}

impl FromStr for Adapter {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sqlite" => Ok(Adapter::Sqlite),
            "postgres" | "postgresql" => Ok(Adapter::Postgres),
            "mysql" => Ok(Adapter::Mysql),
            "document" => Ok(Adapter::Document),
            other => Err(ConfigError::InvalidValue(format!("unknown storage adapter '{}'", other))),
        }
    }
}

impl fmt::Display for Adapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Adapter::Sqlite => "sqlite",
            Adapter::Postgres => "postgres",
            Adapter::Mysql => "mysql",
            Adapter::Document => "document",
        })
    }
}

/// Storage settings. Only the fields of the selected adapter are read.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct StorageConfig {
    pub adapter: Adapter,
    /// SQLite database file
    pub file: PathBuf,
    /// Ephemeral attributes for the relational adapters
    pub attr_file: PathBuf,
    /// Document adapter file
    pub documents: PathBuf,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub name: Option<String>,
    pub max_connections: u32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            adapter: Adapter::Sqlite,
            file: PathBuf::from("hookline.db"),
            attr_file: PathBuf::from("assets/private/_db.json"),
            documents: PathBuf::from("assets/private/conversations.json"),
            host: None,
            port: None,
            user: None,
            password: None,
            name: None,
            max_connections: 5,
        }
    }
}

impl StorageConfig {
    /// Host and database name of a server adapter
    pub fn server(&self) -> Result<(&str, &str), ConfigError> {
        let host = self
            .host
            .as_deref()
            .ok_or_else(|| ConfigError::MissingField("storage.host".to_string()))?;
        let name = self
            .name
            .as_deref()
            .ok_or_else(|| ConfigError::MissingField("storage.name".to_string()))?;
        Ok((host, name))
    }
}

impl Config {
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let content = std::fs::read_to_string(&path)
            .map_err(|e| ConfigError::Parse(format!("Failed to read config: {}", e)))?;

        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(content)
            .map_err(|e| ConfigError::Parse(format!("Failed to parse config: {}", e)))
    }

    /// Defaults overridden by `DB_*` environment variables
    pub fn load_env() -> Result<Self, ConfigError> {
        let mut config = Config::default();
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        let storage = &mut self.storage;

        if let Some(adapter) = var("DB_ADAPTER") {
            storage.adapter = adapter.parse()?;
        }
        if let Some(file) = var("DB_FILE") {
            storage.file = PathBuf::from(file);
        }
        if let Some(file) = var("DB_ATTR_FILE") {
            storage.attr_file = PathBuf::from(file);
        }
        if let Some(port) = var("DB_PORT") {
            let port = port
                .parse::<u16>()
                .map_err(|_| ConfigError::InvalidValue(format!("DB_PORT '{}' is not a port", port)))?;
            storage.port = Some(port);
        }
        storage.host = var("DB_HOST").or(storage.host.take());
        storage.user = var("DB_USER").or(storage.user.take());
        storage.password = var("DB_PASSWORD").or(storage.password.take());
        storage.name = var("DB_NAME").or(storage.name.take());

        Ok(())
    }

    pub fn default_yaml() -> Result<String, ConfigError> {
        serde_yaml::to_string(&Config::default())
            .map_err(|e| ConfigError::Parse(format!("Failed to serialize config: {}", e)))
    }
}
