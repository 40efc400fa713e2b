//! Process-wide registration of txdb drivers by name

use std::collections::HashMap;

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use txdb_core::{Result, TxdbError};

use crate::{TxConnection, TxDriver, TxdbConfig};

static DRIVERS: Lazy<RwLock<HashMap<String, TxDriver>>> = Lazy::new(|| RwLock::new(HashMap::new()));

/// Register a txdb driver under `name` for the built-in real driver
/// `driver_name` and the connection string `dsn`.
///
/// Nothing is connected until the first [`open`]. Registering a name that is
/// already taken keeps the first registration.
pub fn register(name: &str, driver_name: &str, dsn: &str) -> Result<()> {
    register_with_config(name, driver_name, dsn, TxdbConfig::default())
}

/// Like [`register`], with a custom configuration
pub fn register_with_config(
    name: &str,
    driver_name: &str,
    dsn: &str,
    config: TxdbConfig,
) -> Result<()> {
    if DRIVERS.read().contains_key(name) {
        tracing::debug!(
            name = %name,
            "txdb driver already registered, keeping the first registration"
        );
        return Ok(());
    }

    let driver = TxDriver::from_dsn_with_config(driver_name, dsn, config)?;
    register_driver(name, driver);
    Ok(())
}

/// Register an already built driver. Returns `false`, leaving the existing
/// registration in place, if the name is taken.
pub fn register_driver(name: &str, driver: TxDriver) -> bool {
    let mut drivers = DRIVERS.write();
    if drivers.contains_key(name) {
        return false;
    }
    tracing::info!(name = %name, driver = driver.driver_name(), "registering txdb driver");
    drivers.insert(name.to_string(), driver);
    true
}

/// Get the driver registered under `name`
pub fn registered(name: &str) -> Option<TxDriver> {
    DRIVERS.read().get(name).cloned()
}

/// Open a logical connection through the driver registered under `name`
pub async fn open(name: &str, identifier: &str) -> Result<TxConnection> {
    let driver = registered(name).ok_or_else(|| {
        TxdbError::NotFound(format!("no txdb driver registered as '{}'", name))
    })?;
    driver.open(identifier).await
}
