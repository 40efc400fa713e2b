//! txdb - a single-transaction database driver for isolated tests
//!
//! Every logical connection opened under the same identifier is routed onto
//! one real database transaction. The transaction is rolled back when the last
//! of those connections closes, so nothing a test writes ever persists.
//! Nested `begin` / `commit` / `rollback` calls are emulated with savepoints on
//! that one transaction, and query results are read into memory before they
//! are returned so that an open result never blocks the transaction.
//!
//! ```no_run
//! use txdb::{Connection, TransactionControl, TxDriver, Value};
//!
//! # async fn example() -> txdb::Result<()> {
//! let driver = TxDriver::from_dsn("sqlite", "/tmp/app.db")?;
//! let conn = driver.open("test_user_signup").await?;
//!
//! conn.begin().await?;
//! conn.execute("INSERT INTO users (name) VALUES (?)", &[Value::from("jane")]).await?;
//! conn.rollback().await?;
//!
//! conn.close().await?;
//! # Ok(())
//! # }
//! ```

mod config;
mod connection;
mod driver;
mod materialize;
mod registration;
mod registry;
mod savepoint;
mod shared;
mod statement;
mod transaction;


pub use config::TxdbConfig;
pub use connection::TxConnection;
pub use driver::TxDriver;
pub use registration::{open, register, register_driver, register_with_config, registered};
pub use registry::SharedTransactionRegistry;
pub use statement::TxStatement;
pub use transaction::NestedTransaction;

/// Re-export the types callers work with from txdb-core
pub use txdb_core::{
    ColumnMeta, Connection, ConnectionConfig, DatabaseDriver, ExecResult, Params,
    PreparedStatement, Result, ResultSet, Row, Rows, SavepointAction, Transaction,
    TransactionControl, TxdbError, Value,
};

/// First characters of a statement, for log fields
pub(crate) fn sql_preview(sql: &str) -> String {
    sql.chars().take(100).collect()
}
