//! Driver registry for looking up real database drivers by name

use std::collections::HashMap;
use std::sync::Arc;
use txdb_core::{ConnectionConfig, DatabaseDriver, Result, TxdbError};

/// Registry of available database drivers
#[derive(Clone)]
pub struct DriverRegistry {
    drivers: HashMap<String, Arc<dyn DatabaseDriver>>,
}

impl DriverRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            drivers: HashMap::new(),
        }
    }

    /// Create a registry with all built-in drivers registered
    pub fn with_defaults() -> Self {
        #[allow(unused_mut)]
        let mut registry = Self::new();

        #[cfg(feature = "sqlite")]
        registry.register(Arc::new(crate::sqlite::SqliteDriver::new()));

        registry
    }

    /// Register a driver, replacing any driver with the same name
    pub fn register(&mut self, driver: Arc<dyn DatabaseDriver>) {
        let name = driver.name().to_string();
        tracing::info!(driver = %name, "registering database driver");
        self.drivers.insert(name, driver);
    }

    /// Get a driver by name
    pub fn get(&self, name: &str) -> Option<Arc<dyn DatabaseDriver>> {
        let driver = self.drivers.get(name).cloned();
        if driver.is_none() {
            tracing::warn!(driver = %name, "driver not found in registry");
        }
        driver
    }

    /// List all registered driver names
    pub fn list(&self) -> Vec<&str> {
        self.drivers.keys().map(|s| s.as_str()).collect()
    }

    /// Check if a driver is registered
    pub fn has(&self, name: &str) -> bool {
        self.drivers.contains_key(name)
    }

    /// Look up a driver and parse a data source name with it
    pub fn resolve(
        &self,
        name: &str,
        dsn: &str,
    ) -> Result<(Arc<dyn DatabaseDriver>, ConnectionConfig)> {
        let driver = self.get(name).ok_or_else(|| {
            TxdbError::Configuration(format!("unknown database driver '{}'", name))
        })?;
        let config = driver.parse_connection_string(dsn)?;
        Ok((driver, config))
    }
}

impl Default for DriverRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}
