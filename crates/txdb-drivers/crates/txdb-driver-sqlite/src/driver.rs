//! SQLite driver implementation

use async_trait::async_trait;
use std::sync::Arc;
use txdb_core::{ConnectionConfig, Database, DatabaseDriver, DriverCapabilities, Result, TxdbError};

use crate::{SqliteDatabase, SqliteSettings};

/// SQLite database driver
pub struct SqliteDriver;

impl SqliteDriver {
    /// Create a new SQLite driver instance
    pub fn new() -> Self {
        tracing::debug!("SQLite driver initialized");
        Self
    }
}

impl Default for SqliteDriver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DatabaseDriver for SqliteDriver {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn display_name(&self) -> &'static str {
        "SQLite"
    }

    fn capabilities(&self) -> DriverCapabilities {
        DriverCapabilities {
            supports_savepoints: true,
        }
    }

    #[tracing::instrument(skip(self, config), fields(path = config.get_string("path").as_deref()))]
    async fn connect(&self, config: &ConnectionConfig) -> Result<Arc<dyn Database>> {
        let path = config.get_string("path").ok_or_else(|| {
            TxdbError::Configuration(
                "SQLite requires a 'path' or 'database' parameter. Example: /path/to/database.db"
                    .into(),
            )
        })?;
        let settings = SqliteSettings::from_config(config)?;

        let db = SqliteDatabase::open(&path, settings).map_err(|e| {
            tracing::error!(error = %e, "failed to connect to SQLite database");
            e
        })?;

        tracing::info!(path = %db.path(), "SQLite database ready for shared transactions");
        Ok(Arc::new(db))
    }

    /// Accepts a plain file path, a `sqlite://` prefixed path, or a `file:`
    /// URI. Plain paths may carry driver parameters after a `?`, for example
    /// `/tmp/app.db?busy_timeout_ms=1000&journal_mode=wal`.
    fn parse_connection_string(&self, conn_str: &str) -> Result<ConnectionConfig> {
        let conn_str = conn_str.trim();
        if conn_str.starts_with("file:") {
            return Ok(ConnectionConfig::new_sqlite(conn_str));
        }

        let conn_str = conn_str.strip_prefix("sqlite://").unwrap_or(conn_str);
        let (path, query) = match conn_str.split_once('?') {
            Some((path, query)) => (path, Some(query)),
            None => (conn_str, None),
        };
        if path.is_empty() {
            return Err(TxdbError::Configuration(
                "SQLite connection string has no database path".into(),
            ));
        }

        let mut config = ConnectionConfig::new_sqlite(path);
        for pair in query.into_iter().flat_map(|q| q.split('&')).filter(|p| !p.is_empty()) {
            let (key, value) = pair.split_once('=').ok_or_else(|| {
                TxdbError::Configuration(format!(
                    "invalid SQLite connection parameter '{}', expected key=value",
                    pair
                ))
            })?;
            config.params.insert(key.to_string(), value.to_string());
        }
        Ok(config)
    }

    fn build_connection_string(&self, config: &ConnectionConfig) -> String {
        let path = config.get_string("path").unwrap_or_default();
        let mut params: Vec<_> = config
            .params
            .iter()
            .filter(|(key, _)| key.as_str() != "path" && key.as_str() != "database")
            .map(|(key, value)| format!("{}={}", key, value))
            .collect();
        if params.is_empty() || path.starts_with("file:") {
            return path;
        }
        params.sort();
        format!("{}?{}", path, params.join("&"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_plain_path() {
        let config = SqliteDriver::new().parse_connection_string("/tmp/app.db").unwrap();
        assert_eq!(config.driver, "sqlite");
        assert_eq!(config.get_string("path").as_deref(), Some("/tmp/app.db"));
        assert!(config.params.is_empty());
    }

    #[test]
    fn test_parse_with_params() {
        let config = SqliteDriver::new()
            .parse_connection_string("sqlite:///tmp/app.db?busy_timeout_ms=100&journal_mode=wal")
            .unwrap();
        assert_eq!(config.get_string("path").as_deref(), Some("/tmp/app.db"));
        assert_eq!(config.get_u64("busy_timeout_ms").unwrap(), Some(100));
        assert_eq!(config.get_string("journal_mode").as_deref(), Some("wal"));
    }

    #[test]
    fn test_parse_uri_untouched() {
        let uri = "file:/tmp/app.db?mode=rwc";
        let config = SqliteDriver::new().parse_connection_string(uri).unwrap();
        assert_eq!(config.get_string("path").as_deref(), Some(uri));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        let driver = SqliteDriver::new();
        assert!(driver.parse_connection_string("").is_err());
        assert!(driver.parse_connection_string("/tmp/a.db?oops").is_err());
    }

    #[test]
    fn test_build_connection_string() {
        let driver = SqliteDriver::new();
        let config = ConnectionConfig::new_sqlite("/tmp/app.db")
            .with_param("journal_mode", "wal")
            .with_param("busy_timeout_ms", 100);
        assert_eq!(
            driver.build_connection_string(&config),
            "/tmp/app.db?busy_timeout_ms=100&journal_mode=wal"
        );
        let parsed = driver
            .parse_connection_string(&driver.build_connection_string(&config))
            .unwrap();
        assert_eq!(parsed, config);
    }

    #[tokio::test]
    async fn test_connect_requires_path() {
        let err = SqliteDriver::new()
            .connect(&ConnectionConfig::new("sqlite"))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, TxdbError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_connect_and_begin() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("driver.db");
        let config = ConnectionConfig::new_sqlite(path.to_str().unwrap());

        let db = SqliteDriver::new().connect(&config).await.unwrap();
        assert_eq!(db.driver_name(), "sqlite");
        db.ping().await.unwrap();

        let mut tx = db.begin().await.unwrap();
        tx.execute("CREATE TABLE t (x INTEGER)", txdb_core::Params::NONE)
            .await
            .unwrap();
        tx.rollback().await.unwrap();
    }
}
