//! txdb core - shared types and traits for the single-transaction driver
//!
//! This crate provides the vocabulary that the real database drivers, the
//! `txdb` multiplexing layer and its callers agree on:
//!
//! - `DatabaseDriver` / `Database` - opening the one real database
//! - `TransactionHandle` - a live transaction on that database
//! - `Cursor` - an active, possibly multi-set, query result
//! - `Connection` / `TransactionControl` / `Transaction` / `PreparedStatement` -
//!   what callers of txdb see
//! - Common types like `Value`, `Row`, `Rows`, `Params` and `ExecResult`
//! - `TxdbError`, the error type shared by every crate in the workspace

mod connection;
mod database;
mod driver;
mod error;
mod result;
pub mod transaction;
mod types;

pub use connection::*;
pub use database::*;
pub use driver::*;
pub use error::*;
pub use result::*;
pub use transaction::*;
pub use types::*;
