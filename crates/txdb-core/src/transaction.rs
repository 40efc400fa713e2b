//! Transaction-related types
//!
//! Nested transactions are emulated with savepoints on the one real
//! transaction. This module provides the naming and SQL for them.

mod savepoint;

pub use savepoint::*;
