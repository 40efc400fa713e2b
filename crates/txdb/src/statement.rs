//! Prepared statements on a shared transaction

use std::sync::Arc;

use async_trait::async_trait;
use txdb_core::{ExecResult, Params, PreparedStatement, Result, Rows, StatementInfo};

use crate::shared::SharedTransaction;

/// A statement prepared on a shared transaction.
///
/// Runs under the same statement lock as everything else on the transaction,
/// and stops working once the last connection of its identifier closes.
pub struct TxStatement {
    shared: Arc<SharedTransaction>,
    info: StatementInfo,
}

impl TxStatement {
    pub(crate) fn new(shared: Arc<SharedTransaction>, info: StatementInfo) -> Self {
        Self { shared, info }
    }
}

#[async_trait]
impl PreparedStatement for TxStatement {
    fn sql(&self) -> &str {
        &self.info.sql
    }

    fn param_count(&self) -> Option<usize> {
        self.info.param_count
    }

    #[tracing::instrument(skip(self, params), fields(identifier = %self.shared.identifier(), sql_preview = %crate::sql_preview(&self.info.sql)))]
    async fn execute_with(&self, params: Params<'_>) -> Result<ExecResult> {
        self.shared.execute(&self.info.sql, params, None).await
    }

    #[tracing::instrument(skip(self, params), fields(identifier = %self.shared.identifier(), sql_preview = %crate::sql_preview(&self.info.sql)))]
    async fn query_with(&self, params: Params<'_>) -> Result<Rows> {
        self.shared.query(&self.info.sql, params, None).await
    }

    async fn close(self: Box<Self>) -> Result<()> {
        tracing::trace!(
            sql_preview = %crate::sql_preview(&self.info.sql),
            "closing prepared statement"
        );
        self.shared.close_statement(&self.info.sql).await
    }
}
