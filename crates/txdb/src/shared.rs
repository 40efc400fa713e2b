//! The one real transaction behind an identifier

use std::future::Future;
use std::sync::Arc;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Mutex as AsyncMutex;
use txdb_core::{
    Database, ExecResult, Params, QueryCancelHandle, Result, Rows, Savepoint, SavepointAction,
    StatementInfo, TransactionHandle, TxdbError,
};

use crate::TxdbConfig;
use crate::materialize::materialize;
use crate::savepoint::SavepointStack;

/// State guarded by the statement lock. The handle is `None` once the shared
/// transaction has been rolled back for good.
struct TxState {
    handle: Option<Box<dyn TransactionHandle>>,
    savepoints: SavepointStack,
}

impl TxState {
    fn handle_mut(&mut self) -> Result<&mut (dyn TransactionHandle + 'static)> {
        self.handle.as_deref_mut().ok_or(TxdbError::Closed)
    }
}

/// A live transaction shared by every logical connection of one identifier.
///
/// All statements, including savepoint commands, run one at a time under a
/// single async lock. The lock is only held for the round trip to the
/// database and for buffering the result.
pub(crate) struct SharedTransaction {
    identifier: Arc<str>,
    database: Arc<dyn Database>,
    state: AsyncMutex<TxState>,
    supports_savepoints: bool,
    statement_timeout: Option<Duration>,
    max_buffered_rows: Option<usize>,
}

impl SharedTransaction {
    /// Start the real transaction for `identifier`
    pub(crate) async fn begin(
        identifier: Arc<str>,
        database: Arc<dyn Database>,
        config: &TxdbConfig,
        supports_savepoints: bool,
    ) -> Result<Self> {
        let handle = database.begin().await.map_err(|e| {
            if e.is_connection() {
                e
            } else {
                TxdbError::Connection(format!("Failed to begin shared transaction: {}", e))
            }
        })?;

        tracing::debug!(identifier = %identifier, "shared transaction started");
        Ok(Self {
            identifier,
            database,
            state: AsyncMutex::new(TxState {
                handle: Some(handle),
                savepoints: SavepointStack::new(config.savepoint_prefix()),
            }),
            supports_savepoints,
            statement_timeout: config.statement_timeout(),
            max_buffered_rows: config.max_buffered_rows(),
        })
    }

    pub(crate) fn identifier(&self) -> &Arc<str> {
        &self.identifier
    }

    pub(crate) async fn execute(
        &self,
        sql: &str,
        params: Params<'_>,
        timeout: Option<Duration>,
    ) -> Result<ExecResult> {
        let timeout = timeout.or(self.statement_timeout);
        let mut state = self.state.lock().await;
        let handle = state.handle_mut()?;
        let cancel = timeout.and_then(|_| handle.cancel_handle());

        with_deadline(handle.execute(sql, params), timeout, cancel).await
    }

    pub(crate) async fn query(
        &self,
        sql: &str,
        params: Params<'_>,
        timeout: Option<Duration>,
    ) -> Result<Rows> {
        let timeout = timeout.or(self.statement_timeout);
        let limit = self.max_buffered_rows;
        let mut state = self.state.lock().await;
        let handle = state.handle_mut()?;
        let cancel = timeout.and_then(|_| handle.cancel_handle());

        let read = async move {
            let cursor = handle.query(sql, params).await?;
            materialize(cursor, limit).await
        };
        with_deadline(read, timeout, cancel).await
    }

    pub(crate) async fn prepare(&self, sql: &str) -> Result<StatementInfo> {
        let mut state = self.state.lock().await;
        state.handle_mut()?.prepare(sql).await
    }

    pub(crate) async fn close_statement(&self, sql: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        state.handle_mut()?.close_statement(sql).await
    }

    pub(crate) async fn ping(&self) -> Result<()> {
        self.database.ping().await
    }

    /// Open a nested transaction by creating a savepoint.
    ///
    /// The savepoint is only pushed once the database has accepted it.
    pub(crate) async fn begin_savepoint(&self) -> Result<Savepoint> {
        if !self.supports_savepoints {
            return Err(TxdbError::NotSupported(format!(
                "the {} driver has no savepoints, nested transactions are unavailable",
                self.database.driver_name()
            )));
        }

        let mut state = self.state.lock().await;
        let TxState { handle, savepoints } = &mut *state;
        let handle = handle.as_deref_mut().ok_or(TxdbError::Closed)?;
        let savepoint = savepoints.allocate();
        let cancel = self.statement_timeout.and_then(|_| handle.cancel_handle());

        with_deadline(
            handle.execute(&savepoint.create_sql(), Params::NONE),
            self.statement_timeout,
            cancel,
        )
        .await
        .map_err(|e| TxdbError::savepoint(SavepointAction::Create, &savepoint, e))?;

        savepoints.push(&savepoint);
        tracing::debug!(
            identifier = %self.identifier,
            savepoint = savepoint.name(),
            depth = savepoints.depth(),
            "savepoint created"
        );
        Ok(savepoint)
    }

    /// Finish a nested transaction without touching the database.
    ///
    /// With no `target` the innermost level is finished, and at the base level
    /// this is a no-op. With a `target` every level down to and including it
    /// is finished; a target that is no longer open is an error. The real
    /// transaction is never committed.
    pub(crate) async fn commit_savepoint(&self, target: Option<&Savepoint>) -> Result<usize> {
        let mut state = self.state.lock().await;
        state.handle_mut()?;
        let popped = match target {
            Some(target) => Some(
                state
                    .savepoints
                    .pop_through(target.id())
                    .ok_or(TxdbError::NoActiveSavepoint)?,
            ),
            None => state.savepoints.pop(),
        };
        if let Some(savepoint) = popped {
            tracing::debug!(
                identifier = %self.identifier,
                savepoint = savepoint.name(),
                depth = state.savepoints.depth(),
                "savepoint committed"
            );
        }
        Ok(state.savepoints.depth())
    }

    /// Undo a nested transaction: the innermost one with no `target`, or
    /// `target` together with every level opened inside it.
    ///
    /// The savepoints are popped before the rollback is issued and stay
    /// popped if the database rejects it.
    pub(crate) async fn rollback_savepoint(&self, target: Option<&Savepoint>) -> Result<usize> {
        let mut state = self.state.lock().await;
        let TxState { handle, savepoints } = &mut *state;
        let handle = handle.as_deref_mut().ok_or(TxdbError::Closed)?;
        let savepoint = match target {
            Some(target) => savepoints.pop_through(target.id()),
            None => savepoints.pop(),
        }
        .ok_or(TxdbError::NoActiveSavepoint)?;
        let cancel = self.statement_timeout.and_then(|_| handle.cancel_handle());

        with_deadline(
            handle.execute(&savepoint.rollback_sql(), Params::NONE),
            self.statement_timeout,
            cancel,
        )
        .await
        .map_err(|e| TxdbError::savepoint(SavepointAction::RollbackTo, &savepoint, e))?;

        tracing::debug!(
            identifier = %self.identifier,
            savepoint = savepoint.name(),
            depth = savepoints.depth(),
            "rolled back to savepoint"
        );
        Ok(savepoints.depth())
    }

    /// Number of open nested transactions
    pub(crate) async fn savepoint_depth(&self) -> usize {
        self.state.lock().await.savepoints.depth()
    }

    /// Roll back the real transaction and release it. Later calls do nothing.
    pub(crate) async fn finish(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        let Some(mut handle) = state.handle.take() else {
            return Ok(());
        };

        handle.rollback().await.map_err(|e| match e {
            TxdbError::Rollback(_) => e,
            other => TxdbError::Rollback(other.to_string()),
        })?;
        tracing::debug!(identifier = %self.identifier, "shared transaction rolled back");
        Ok(())
    }
}

/// Run a statement future, giving up once `timeout` passes.
///
/// A timer future alone can't stop a driver that blocks inside the call, so a
/// watchdog on the blocking pool also fires the driver's cancel handle at the
/// deadline. Either way the caller gets [`TxdbError::Timeout`] and the guard
/// over the transaction is released when the caller's future completes.
async fn with_deadline<T, F>(
    statement: F,
    timeout: Option<Duration>,
    cancel: Option<Arc<dyn QueryCancelHandle>>,
) -> Result<T>
where
    F: Future<Output = Result<T>> + Send,
{
    let Some(limit) = timeout else {
        return statement.await;
    };

    let _watchdog = cancel.map(|cancel| Watchdog::arm(limit, cancel));
    match tokio::time::timeout(limit, statement).await {
        Ok(Err(TxdbError::Cancelled)) | Err(_) => Err(TxdbError::Timeout(format!(
            "statement did not finish within {}ms",
            limit.as_millis()
        ))),
        Ok(result) => result,
    }
}

/// Cancels a statement unless dropped before the deadline.
///
/// `done` is held while the cancel handle fires, and dropping the watchdog
/// sets it under the same lock. A statement that finishes right at the
/// deadline is therefore either cancelled before the guard over the
/// transaction is released or not at all, never the statement after it.
struct Watchdog {
    disarm: mpsc::Sender<()>,
    done: Arc<Mutex<bool>>,
}

impl Watchdog {
    fn arm(limit: Duration, cancel: Arc<dyn QueryCancelHandle>) -> Self {
        let (disarm, disarmed) = mpsc::channel::<()>();
        let done = Arc::new(Mutex::new(false));
        let watched = done.clone();
        tokio::task::spawn_blocking(move || {
            if let Err(RecvTimeoutError::Timeout) = disarmed.recv_timeout(limit)
                && cancel_unless_done(&watched, cancel.as_ref())
            {
                tracing::debug!(
                    limit_ms = limit.as_millis() as u64,
                    "statement deadline passed, cancelled"
                );
            }
        });
        Self { disarm, done }
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        *self.done.lock() = true;
        let _ = self.disarm.send(());
    }
}

fn cancel_unless_done(done: &Mutex<bool>, cancel: &dyn QueryCancelHandle) -> bool {
    let done = done.lock();
    if *done {
        return false;
    }
    cancel.cancel();
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingCancel {
        cancels: AtomicUsize,
    }

    impl QueryCancelHandle for CountingCancel {
        fn cancel(&self) {
            self.cancels.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_watchdog_fires_at_deadline() {
        let cancel = Arc::new(CountingCancel::default());
        let watchdog = Watchdog::arm(Duration::from_millis(20), cancel.clone());
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(cancel.cancels.load(Ordering::SeqCst), 1);
        drop(watchdog);
    }

    #[tokio::test]
    async fn test_dropped_watchdog_never_fires() {
        let cancel = Arc::new(CountingCancel::default());
        drop(Watchdog::arm(Duration::from_millis(20), cancel.clone()));
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(cancel.cancels.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_finished_statement_is_not_cancelled() {
        let cancel = CountingCancel::default();
        let done = Mutex::new(false);
        assert!(cancel_unless_done(&done, &cancel));
        assert_eq!(cancel.cancels.load(Ordering::SeqCst), 1);

        // the statement finished while the watchdog thread was waking up
        *done.lock() = true;
        assert!(!cancel_unless_done(&done, &cancel));
        assert_eq!(cancel.cancels.load(Ordering::SeqCst), 1);
    }
}
