//! Connection, transaction and prepared statement traits seen by callers

use async_trait::async_trait;
use std::time::Duration;

use crate::{ExecResult, Params, Result, Rows, Value};

/// A logical database connection.
///
/// Statements may be given a deadline. When it passes, the statement is
/// interrupted if the driver supports it and the call fails with
/// [`crate::TxdbError::Timeout`].
#[async_trait]
pub trait Connection: Send + Sync {
    /// Identifier the connection was opened under
    fn identifier(&self) -> &str;

    /// Execute a statement that does not return rows
    async fn execute_with(
        &self,
        sql: &str,
        params: Params<'_>,
        timeout: Option<Duration>,
    ) -> Result<ExecResult>;

    /// Run a query and buffer every result set it produces
    async fn query_with(
        &self,
        sql: &str,
        params: Params<'_>,
        timeout: Option<Duration>,
    ) -> Result<Rows>;

    /// Execute a statement with positional parameters
    async fn execute(&self, sql: &str, params: &[Value]) -> Result<ExecResult> {
        self.execute_with(sql, Params::Positional(params), None).await
    }

    /// Run a query with positional parameters
    async fn query(&self, sql: &str, params: &[Value]) -> Result<Rows> {
        self.query_with(sql, Params::Positional(params), None).await
    }

    /// Execute a statement with named parameters
    async fn execute_named(&self, sql: &str, params: &[(String, Value)]) -> Result<ExecResult> {
        self.execute_with(sql, Params::Named(params), None).await
    }

    /// Run a query with named parameters
    async fn query_named(&self, sql: &str, params: &[(String, Value)]) -> Result<Rows> {
        self.query_with(sql, Params::Named(params), None).await
    }

    async fn execute_with_timeout(
        &self,
        sql: &str,
        params: &[Value],
        timeout: Duration,
    ) -> Result<ExecResult> {
        self.execute_with(sql, Params::Positional(params), Some(timeout))
            .await
    }

    async fn query_with_timeout(
        &self,
        sql: &str,
        params: &[Value],
        timeout: Duration,
    ) -> Result<Rows> {
        self.query_with(sql, Params::Positional(params), Some(timeout))
            .await
    }

    /// Prepare a statement for repeated execution
    async fn prepare(&self, sql: &str) -> Result<Box<dyn PreparedStatement>>;

    /// Verify the database behind the connection is reachable
    async fn ping(&self) -> Result<()>;

    /// Close the connection
    async fn close(&self) -> Result<()>;

    /// Check if the connection is closed
    fn is_closed(&self) -> bool;
}

/// Transaction control on a logical connection.
///
/// `begin`, `commit` and `rollback` nest: each `begin` opens a level that the
/// next `commit` or `rollback` finishes.
#[async_trait]
pub trait TransactionControl: Send + Sync {
    /// Begin a (possibly nested) transaction
    async fn begin(&self) -> Result<()>;

    /// Commit the innermost transaction
    async fn commit(&self) -> Result<()>;

    /// Roll back the innermost transaction
    async fn rollback(&self) -> Result<()>;

    /// Begin a transaction and return an object that finishes it
    async fn begin_transaction(&self) -> Result<Box<dyn Transaction>>;
}

/// A database transaction
#[async_trait]
pub trait Transaction: Send + Sync {
    /// Commit the transaction
    async fn commit(self: Box<Self>) -> Result<()>;

    /// Rollback the transaction
    async fn rollback(self: Box<Self>) -> Result<()>;

    /// Execute a query within the transaction
    async fn query(&self, sql: &str, params: &[Value]) -> Result<Rows>;

    /// Execute a statement within the transaction
    async fn execute(&self, sql: &str, params: &[Value]) -> Result<ExecResult>;
}

/// A prepared statement
#[async_trait]
pub trait PreparedStatement: Send + Sync {
    /// SQL text of the statement
    fn sql(&self) -> &str;

    /// Number of parameters the statement expects, if known
    fn param_count(&self) -> Option<usize>;

    /// Execute the prepared statement with any kind of parameters
    async fn execute_with(&self, params: Params<'_>) -> Result<ExecResult>;

    /// Query the prepared statement with any kind of parameters
    async fn query_with(&self, params: Params<'_>) -> Result<Rows>;

    /// Execute the prepared statement with parameters
    async fn execute(&self, params: &[Value]) -> Result<ExecResult> {
        self.execute_with(Params::Positional(params)).await
    }

    /// Query the prepared statement with parameters
    async fn query(&self, params: &[Value]) -> Result<Rows> {
        self.query_with(Params::Positional(params)).await
    }

    /// Close/deallocate the prepared statement
    async fn close(self: Box<Self>) -> Result<()>;
}
