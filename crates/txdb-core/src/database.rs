//! Traits for the real database underneath the shared transactions

use crate::{ColumnMeta, ExecResult, Params, Result, StatementInfo, Value};
use async_trait::async_trait;
use std::sync::Arc;

/// Handle for cancelling a running statement from any thread.
///
/// The handle is safe to call from any thread and can be called multiple
/// times (subsequent calls are no-ops).
pub trait QueryCancelHandle: Send + Sync {
    /// Cancel the statement currently running on the associated transaction.
    ///
    /// If no statement is running, this is a no-op.
    fn cancel(&self);
}

/// The real database that shared transactions are started on.
///
/// One `Database` is opened lazily per txdb driver instance and every
/// identifier gets its own transaction from it. It is closed when the last
/// shared transaction ends.
#[async_trait]
pub trait Database: Send + Sync {
    /// Get the driver name (e.g., "sqlite")
    fn driver_name(&self) -> &str;

    /// Start a new transaction on a dedicated connection
    async fn begin(&self) -> Result<Box<dyn TransactionHandle>>;

    /// Verify the database is reachable
    async fn ping(&self) -> Result<()>;

    /// Close the database
    async fn close(&self) -> Result<()>;

    /// Check if the database is closed
    fn is_closed(&self) -> bool;
}

/// A live transaction on the real database.
///
/// A transaction handle runs one statement at a time, which is why every
/// method takes `&mut self`. Callers that share a handle must serialize access
/// to it.
#[async_trait]
pub trait TransactionHandle: Send {
    /// Execute a statement that does not return rows
    async fn execute(&mut self, sql: &str, params: Params<'_>) -> Result<ExecResult>;

    /// Run a query and return a cursor over its result sets.
    ///
    /// The cursor may borrow the handle; the handle can't run anything else
    /// until the cursor is dropped.
    async fn query<'a>(
        &'a mut self,
        sql: &'a str,
        params: Params<'a>,
    ) -> Result<Box<dyn Cursor + 'a>>;

    /// Prepare a statement for repeated execution within this transaction
    async fn prepare(&mut self, sql: &str) -> Result<StatementInfo>;

    /// Release a statement previously prepared with [`TransactionHandle::prepare`]
    async fn close_statement(&mut self, _sql: &str) -> Result<()> {
        Ok(())
    }

    /// Roll back the whole transaction. The handle is unusable afterwards.
    async fn rollback(&mut self) -> Result<()>;

    /// Get a handle that can interrupt a statement running on this transaction.
    ///
    /// Returns `None` if the driver does not support cancellation.
    fn cancel_handle(&self) -> Option<Arc<dyn QueryCancelHandle>> {
        None
    }
}

/// An active query result, positioned on one of possibly several result sets.
#[async_trait]
pub trait Cursor: Send {
    /// Columns of the current result set
    fn columns(&self) -> &[ColumnMeta];

    /// Read the next row of the current result set, `None` at its end
    async fn next_row(&mut self) -> Result<Option<Vec<Value>>>;

    /// Advance to the next result set. Returns `false` when there is none.
    async fn next_result_set(&mut self) -> Result<bool>;
}
