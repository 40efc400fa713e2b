//! txdb configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};
use txdb_core::{Result, TxdbError, is_valid_savepoint_prefix};

const DEFAULT_SAVEPOINT_PREFIX: &str = "txdb";

/// Configuration shared by every transaction a [`crate::TxDriver`] opens.
///
/// Can be built in code with the `with_*` methods or loaded from TOML:
///
/// ```toml
/// savepoint_prefix = "pgtxdb"
/// statement_timeout_ms = 5000
/// max_buffered_rows = 100000
/// ping_on_connect = true
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TxdbConfig {
    /// Prefix of savepoint names, which are `<prefix>_<id>`
    savepoint_prefix: String,
    /// Deadline in milliseconds applied to statements that don't carry their own
    statement_timeout_ms: Option<u64>,
    /// Most rows a single query may buffer across all its result sets
    max_buffered_rows: Option<usize>,
    /// Ping the real database right after connecting to it
    ping_on_connect: bool,
}

impl TxdbConfig {
    /// Create the default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a configuration from TOML and validate it
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let config: Self = toml::from_str(source)
            .map_err(|e| TxdbError::Configuration(format!("invalid txdb config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Set the savepoint name prefix
    pub fn with_savepoint_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.savepoint_prefix = prefix.into();
        self
    }

    /// Set the default statement timeout in milliseconds
    pub fn with_statement_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.statement_timeout_ms = Some(timeout_ms);
        self
    }

    /// Limit how many rows one query may buffer
    pub fn with_max_buffered_rows(mut self, max_rows: usize) -> Self {
        self.max_buffered_rows = Some(max_rows);
        self
    }

    /// Ping the real database when it is first connected
    pub fn with_ping_on_connect(mut self, ping: bool) -> Self {
        self.ping_on_connect = ping;
        self
    }

    /// Get the savepoint name prefix
    pub fn savepoint_prefix(&self) -> &str {
        &self.savepoint_prefix
    }

    /// Get the default statement timeout as a Duration if set
    pub fn statement_timeout(&self) -> Option<Duration> {
        self.statement_timeout_ms.map(Duration::from_millis)
    }

    /// Get the buffered row limit if set
    pub fn max_buffered_rows(&self) -> Option<usize> {
        self.max_buffered_rows
    }

    pub fn ping_on_connect(&self) -> bool {
        self.ping_on_connect
    }

    /// Check the configuration for values txdb can't work with
    pub fn validate(&self) -> Result<()> {
        if !is_valid_savepoint_prefix(&self.savepoint_prefix) {
            return Err(TxdbError::Configuration(format!(
                "savepoint prefix '{}' must be a plain SQL identifier",
                self.savepoint_prefix
            )));
        }
        if self.statement_timeout_ms == Some(0) {
            return Err(TxdbError::Configuration(
                "statement_timeout_ms must be greater than 0".into(),
            ));
        }
        if self.max_buffered_rows == Some(0) {
            return Err(TxdbError::Configuration(
                "max_buffered_rows must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}

impl Default for TxdbConfig {
    /// Defaults:
    /// - savepoint_prefix: "txdb"
    /// - statement_timeout: None
    /// - max_buffered_rows: None (unbounded)
    /// - ping_on_connect: false
    fn default() -> Self {
        Self {
            savepoint_prefix: DEFAULT_SAVEPOINT_PREFIX.to_string(),
            statement_timeout_ms: None,
            max_buffered_rows: None,
            ping_on_connect: false,
        }
    }
}
