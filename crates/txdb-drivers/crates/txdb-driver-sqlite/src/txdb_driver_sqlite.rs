//! SQLite driver implementation
//!
//! Every transaction handed out by [`SqliteDatabase::begin`] runs on its own
//! rusqlite connection to the same database file, so the database must be
//! file-backed. The file is switched to WAL journaling on connect so that a
//! transaction holding uncommitted writes does not block readers in other
//! transactions.

mod connection;
mod convert;
mod driver;
mod transaction;

pub use connection::{SqliteCancelHandle, SqliteDatabase, SqliteSettings};
pub use driver::SqliteDriver;
pub use transaction::{SqliteCursor, SqliteTransaction};
