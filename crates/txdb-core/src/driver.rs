//! Database driver trait definition

use crate::{Database, Result, TxdbError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

/// Capabilities that a driver may support
#[derive(Debug, Clone, Default)]
pub struct DriverCapabilities {
    /// Supports `SAVEPOINT` / `ROLLBACK TO SAVEPOINT` inside a transaction
    pub supports_savepoints: bool,
}

/// Trait implemented by the real database drivers txdb runs on top of
#[async_trait]
pub trait DatabaseDriver: Send + Sync {
    /// Unique identifier for this driver (e.g., "sqlite")
    fn name(&self) -> &'static str;

    /// Human-readable name (e.g., "SQLite")
    fn display_name(&self) -> &'static str {
        self.name()
    }

    /// Supported features/capabilities
    fn capabilities(&self) -> DriverCapabilities;

    /// Open the real database described by `config`
    async fn connect(&self, config: &ConnectionConfig) -> Result<Arc<dyn Database>>;

    /// Parse a connection string into a configuration
    fn parse_connection_string(&self, _conn_str: &str) -> Result<ConnectionConfig> {
        Err(TxdbError::NotSupported(format!(
            "connection string parsing is not implemented for the {} driver",
            self.name()
        )))
    }

    /// Build a connection string from configuration
    fn build_connection_string(&self, config: &ConnectionConfig) -> String;
}

/// Connection configuration for the real database
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// Driver ID (e.g., "sqlite")
    pub driver: String,
    /// Database name or file path
    pub database: Option<String>,
    /// Additional connection parameters
    pub params: HashMap<String, String>,
}

impl ConnectionConfig {
    /// Create a new configuration with default values
    pub fn new(driver: &str) -> Self {
        Self {
            driver: driver.to_string(),
            database: None,
            params: HashMap::new(),
        }
    }

    /// Create a SQLite configuration
    pub fn new_sqlite(database_path: &str) -> Self {
        let mut config = Self::new("sqlite");
        config.database = Some(database_path.to_string());
        config
    }

    /// Set a connection parameter
    pub fn with_param(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        let str_val = match value.into() {
            serde_json::Value::String(s) => s,
            other => other.to_string(),
        };
        self.params.insert(key.to_string(), str_val);
        self
    }

    /// Get a string parameter
    pub fn get_string(&self, key: &str) -> Option<String> {
        if let Some(val) = self.params.get(key) {
            return Some(val.clone());
        }
        match key {
            "database" | "path" => self.database.clone(),
            _ => None,
        }
    }

    /// Get a parameter parsed as an unsigned integer
    pub fn get_u64(&self, key: &str) -> Result<Option<u64>> {
        self.get_string(key)
            .map(|raw| {
                raw.parse::<u64>().map_err(|_| {
                    TxdbError::Configuration(format!(
                        "parameter '{}' must be a non-negative integer, got '{}'",
                        key, raw
                    ))
                })
            })
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sqlite_config() {
        let config = ConnectionConfig::new_sqlite("/tmp/test.db");
        assert_eq!(config.driver, "sqlite");
        assert_eq!(config.get_string("path").as_deref(), Some("/tmp/test.db"));
        assert_eq!(config.get_string("database").as_deref(), Some("/tmp/test.db"));
        assert_eq!(config.get_string("host"), None);
    }

    #[test]
    fn test_params_override_fields() {
        let config = ConnectionConfig::new_sqlite("/tmp/a.db").with_param("path", "/tmp/b.db");
        assert_eq!(config.get_string("path").as_deref(), Some("/tmp/b.db"));
    }

    #[test]
    fn test_numeric_params() {
        let config = ConnectionConfig::new("mock")
            .with_param("busy_timeout_ms", 250)
            .with_param("bad", "soon");
        assert_eq!(config.get_u64("busy_timeout_ms").unwrap(), Some(250));
        assert_eq!(config.get_u64("missing").unwrap(), None);
        assert!(config.get_u64("bad").is_err());
    }
}
