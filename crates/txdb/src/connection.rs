//! Logical connections onto a shared transaction

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use txdb_core::{
    Connection, ExecResult, Params, PreparedStatement, Result, Rows, Transaction,
    TransactionControl, TxdbError,
};

use crate::registry::SharedTransactionRegistry;
use crate::shared::SharedTransaction;
use crate::{NestedTransaction, TxStatement};

/// A logical connection returned by [`crate::TxDriver::open`].
///
/// Every connection opened under the same identifier talks to the same real
/// transaction. Closing the connection gives up its reference; the real
/// transaction is rolled back when the last one is closed. A connection
/// dropped without [`Connection::close`] keeps its reference forever.
pub struct TxConnection {
    identifier: Arc<str>,
    shared: Arc<SharedTransaction>,
    registry: Arc<SharedTransactionRegistry>,
    closed: AtomicBool,
}

impl TxConnection {
    pub(crate) fn new(
        shared: Arc<SharedTransaction>,
        registry: Arc<SharedTransactionRegistry>,
    ) -> Self {
        Self {
            identifier: shared.identifier().clone(),
            shared,
            registry,
            closed: AtomicBool::new(false),
        }
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(TxdbError::Closed);
        }
        Ok(())
    }

    /// Number of nested transactions currently open on the shared transaction
    pub async fn savepoint_depth(&self) -> usize {
        self.shared.savepoint_depth().await
    }
}

impl std::fmt::Debug for TxConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TxConnection")
            .field("identifier", &self.identifier)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Drop for TxConnection {
    fn drop(&mut self) {
        if !self.is_closed() {
            tracing::warn!(
                identifier = %self.identifier,
                "connection dropped without close, the shared transaction stays open"
            );
        }
    }
}

#[async_trait]
impl Connection for TxConnection {
    fn identifier(&self) -> &str {
        &self.identifier
    }

    #[tracing::instrument(skip(self, sql, params), fields(identifier = %self.identifier, sql_preview = %crate::sql_preview(sql)))]
    async fn execute_with(
        &self,
        sql: &str,
        params: Params<'_>,
        timeout: Option<Duration>,
    ) -> Result<ExecResult> {
        self.ensure_open()?;
        let result = self.shared.execute(sql, params, timeout).await?;
        tracing::debug!(affected_rows = result.affected_rows, "statement executed");
        Ok(result)
    }

    #[tracing::instrument(skip(self, sql, params), fields(identifier = %self.identifier, sql_preview = %crate::sql_preview(sql)))]
    async fn query_with(
        &self,
        sql: &str,
        params: Params<'_>,
        timeout: Option<Duration>,
    ) -> Result<Rows> {
        self.ensure_open()?;
        self.shared.query(sql, params, timeout).await
    }

    #[tracing::instrument(skip(self, sql), fields(identifier = %self.identifier, sql_preview = %crate::sql_preview(sql)))]
    async fn prepare(&self, sql: &str) -> Result<Box<dyn PreparedStatement>> {
        self.ensure_open()?;
        let info = self.shared.prepare(sql).await?;
        Ok(Box::new(TxStatement::new(self.shared.clone(), info)))
    }

    async fn ping(&self) -> Result<()> {
        self.ensure_open()?;
        self.shared.ping().await
    }

    #[tracing::instrument(skip(self), fields(identifier = %self.identifier))]
    async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.registry.close(&self.identifier).await
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TransactionControl for TxConnection {
    #[tracing::instrument(skip(self), fields(identifier = %self.identifier))]
    async fn begin(&self) -> Result<()> {
        self.ensure_open()?;
        self.shared.begin_savepoint().await?;
        Ok(())
    }

    #[tracing::instrument(skip(self), fields(identifier = %self.identifier))]
    async fn commit(&self) -> Result<()> {
        self.ensure_open()?;
        self.shared.commit_savepoint(None).await?;
        Ok(())
    }

    #[tracing::instrument(skip(self), fields(identifier = %self.identifier))]
    async fn rollback(&self) -> Result<()> {
        self.ensure_open()?;
        self.shared.rollback_savepoint(None).await?;
        Ok(())
    }

    async fn begin_transaction(&self) -> Result<Box<dyn Transaction>> {
        self.ensure_open()?;
        let savepoint = self.shared.begin_savepoint().await?;
        Ok(Box::new(NestedTransaction::new(self.shared.clone(), savepoint)))
    }
}
