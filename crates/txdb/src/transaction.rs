//! Transaction objects over the savepoint stack

use std::sync::Arc;

use async_trait::async_trait;
use txdb_core::{ExecResult, Params, Result, Rows, Savepoint, Transaction, Value};

use crate::shared::SharedTransaction;

/// A nested transaction returned by
/// [`TransactionControl::begin_transaction`](txdb_core::TransactionControl::begin_transaction).
///
/// It remembers the savepoint it was opened with. Committing releases that
/// level and any level opened inside it without writing anything; rolling
/// back undoes everything since the matching begin, inner levels included.
/// Neither ever finishes the real transaction. Once its savepoint is gone,
/// because an enclosing level was finished first, both fail with
/// [`TxdbError::NoActiveSavepoint`](txdb_core::TxdbError::NoActiveSavepoint).
pub struct NestedTransaction {
    shared: Arc<SharedTransaction>,
    savepoint: Savepoint,
    finished: bool,
}

impl NestedTransaction {
    pub(crate) fn new(shared: Arc<SharedTransaction>, savepoint: Savepoint) -> Self {
        Self {
            shared,
            savepoint,
            finished: false,
        }
    }

    /// Name of the savepoint backing this transaction
    pub fn savepoint_name(&self) -> &str {
        self.savepoint.name()
    }
}

impl Drop for NestedTransaction {
    fn drop(&mut self) {
        if !self.finished {
            tracing::warn!(
                identifier = %self.shared.identifier(),
                savepoint = self.savepoint.name(),
                "nested transaction dropped without commit or rollback, its savepoint stays open"
            );
        }
    }
}

#[async_trait]
impl Transaction for NestedTransaction {
    async fn commit(mut self: Box<Self>) -> Result<()> {
        self.finished = true;
        self.shared.commit_savepoint(Some(&self.savepoint)).await?;
        Ok(())
    }

    async fn rollback(mut self: Box<Self>) -> Result<()> {
        self.finished = true;
        self.shared.rollback_savepoint(Some(&self.savepoint)).await?;
        Ok(())
    }

    async fn query(&self, sql: &str, params: &[Value]) -> Result<Rows> {
        self.shared.query(sql, Params::Positional(params), None).await
    }

    async fn execute(&self, sql: &str, params: &[Value]) -> Result<ExecResult> {
        self.shared
            .execute(sql, Params::Positional(params), None)
            .await
    }
}
