//! The txdb driver

use std::sync::Arc;

use txdb_core::{ConnectionConfig, DatabaseDriver, Result};
use txdb_drivers::DriverRegistry;

use crate::{SharedTransactionRegistry, TxConnection, TxdbConfig};

/// Opens logical connections that share one transaction per identifier.
///
/// Cloning the driver is cheap and every clone shares the same shared
/// transactions and the same lazily connected real database.
#[derive(Clone)]
pub struct TxDriver {
    registry: Arc<SharedTransactionRegistry>,
}

impl TxDriver {
    /// Create a driver on top of a real database driver
    pub fn new(
        driver: Arc<dyn DatabaseDriver>,
        connection: ConnectionConfig,
        config: TxdbConfig,
    ) -> Result<Self> {
        config.validate()?;
        tracing::debug!(driver = driver.name(), "txdb driver created");
        Ok(Self {
            registry: Arc::new(SharedTransactionRegistry::new(driver, connection, config)),
        })
    }

    /// Create a driver for a built-in real driver and a connection string
    pub fn from_dsn(driver_name: &str, dsn: &str) -> Result<Self> {
        Self::from_dsn_with_config(driver_name, dsn, TxdbConfig::default())
    }

    /// Create a driver for a built-in real driver with a custom configuration
    pub fn from_dsn_with_config(driver_name: &str, dsn: &str, config: TxdbConfig) -> Result<Self> {
        let (driver, connection) = DriverRegistry::with_defaults().resolve(driver_name, dsn)?;
        Self::new(driver, connection, config)
    }

    /// Open a logical connection under `identifier`.
    ///
    /// The first open of an identifier starts its shared transaction; later
    /// opens join it until the last connection under it is closed.
    pub async fn open(&self, identifier: &str) -> Result<TxConnection> {
        let shared = self.registry.open(identifier).await?;
        Ok(TxConnection::new(shared, self.registry.clone()))
    }

    /// Get the name of the real driver
    pub fn driver_name(&self) -> &'static str {
        self.registry.driver_name()
    }

    pub fn config(&self) -> &TxdbConfig {
        self.registry.config()
    }

    /// The registry of shared transactions behind this driver
    pub fn registry(&self) -> &SharedTransactionRegistry {
        &self.registry
    }

    /// Number of logical connections open under `identifier`
    pub async fn open_count(&self, identifier: &str) -> usize {
        self.registry.open_count(identifier).await
    }

    /// Number of nested transactions open under `identifier`, if it is live
    pub async fn savepoint_depth(&self, identifier: &str) -> Option<usize> {
        self.registry.savepoint_depth(identifier).await
    }

    /// Number of live shared transactions
    pub async fn live_transactions(&self) -> usize {
        self.registry.len().await
    }
}

impl std::fmt::Debug for TxDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TxDriver")
            .field("driver", &self.driver_name())
            .field("config", self.config())
            .finish()
    }
}
