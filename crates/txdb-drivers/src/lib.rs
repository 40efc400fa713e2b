//! txdb drivers - real database drivers for shared transactions
//!
//! This crate collects the implementations of the driver traits defined in
//! `txdb-core` and offers a [`DriverRegistry`] to look them up by name.

#[cfg(feature = "sqlite")]
pub use txdb_driver_sqlite as sqlite;

mod registry;

pub use registry::DriverRegistry;

/// Re-export commonly used types from txdb-core
pub use txdb_core::{
    ConnectionConfig, Database, DatabaseDriver, DriverCapabilities, Result, TransactionHandle,
    TxdbError, Value,
};
