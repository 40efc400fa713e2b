//! SQLite transaction and cursor

use async_trait::async_trait;
use rusqlite::{Batch, Connection as RusqliteConnection, InterruptHandle, Statement};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::runtime::{Handle, RuntimeFlavor};
use txdb_core::{
    ColumnMeta, Cursor, ExecResult, Params, QueryCancelHandle, Result, StatementInfo,
    TransactionHandle, TxdbError, Value,
};

use crate::SqliteCancelHandle;
use crate::convert::{bind_params, query_error, rusqlite_to_value};

/// A transaction on its own SQLite connection.
///
/// Issues raw `BEGIN DEFERRED` / `ROLLBACK` SQL rather than using
/// `rusqlite::Transaction`, so the transaction can own its connection and
/// live as long as the shared transaction that wraps it.
pub struct SqliteTransaction {
    conn: RusqliteConnection,
    interrupt_handle: Arc<InterruptHandle>,
    rolled_back: bool,
}

impl SqliteTransaction {
    pub(crate) fn begin(conn: RusqliteConnection) -> Result<Self> {
        conn.execute_batch("BEGIN DEFERRED")
            .map_err(|e| TxdbError::Connection(format!("Failed to begin transaction: {}", e)))?;

        let interrupt_handle = Arc::new(conn.get_interrupt_handle());
        Ok(Self {
            conn,
            interrupt_handle,
            rolled_back: false,
        })
    }

    fn ensure_active(&self) -> Result<()> {
        if self.rolled_back {
            return Err(TxdbError::Closed);
        }
        Ok(())
    }

    /// Run every statement of a parameterless SQL string, returning the row
    /// count of the last one.
    fn execute_batch(&self, sql: &str) -> Result<ExecResult> {
        let mut batch = Batch::new(&self.conn, sql);
        let mut affected = 0;
        while let Some(mut stmt) = batch.next().map_err(query_error)? {
            bind_params(&mut stmt, Params::NONE)?;
            affected = run_to_completion(&mut stmt)?;
        }
        Ok(self.exec_result(affected))
    }

    fn execute_prepared(&self, sql: &str, params: Params<'_>) -> Result<ExecResult> {
        let mut stmt = self.conn.prepare_cached(sql).map_err(query_error)?;
        bind_params(&mut stmt, params)?;
        let affected = run_to_completion(&mut stmt)?;
        Ok(self.exec_result(affected))
    }

    fn exec_result(&self, affected: usize) -> ExecResult {
        let rowid = self.conn.last_insert_rowid();
        ExecResult {
            affected_rows: affected as u64,
            last_insert_id: (rowid != 0).then_some(rowid),
        }
    }

    /// Read each statement of a parameterless SQL string that returns rows as
    /// its own result set. Statements without columns are run for effect.
    fn query_batch(&self, sql: &str) -> Result<VecDeque<ResultSetBuffer>> {
        let mut batch = Batch::new(&self.conn, sql);
        let mut sets = VecDeque::new();
        while let Some(mut stmt) = batch.next().map_err(query_error)? {
            bind_params(&mut stmt, Params::NONE)?;
            if stmt.column_count() == 0 {
                run_to_completion(&mut stmt)?;
            } else {
                sets.push_back(read_result_set(&mut stmt)?);
            }
        }
        Ok(sets)
    }

    fn query_prepared(&self, sql: &str, params: Params<'_>) -> Result<VecDeque<ResultSetBuffer>> {
        let mut stmt = self.conn.prepare_cached(sql).map_err(query_error)?;
        bind_params(&mut stmt, params)?;
        let mut sets = VecDeque::new();
        if stmt.column_count() == 0 {
            run_to_completion(&mut stmt)?;
        } else {
            sets.push_back(read_result_set(&mut stmt)?);
        }
        Ok(sets)
    }
}

impl Drop for SqliteTransaction {
    fn drop(&mut self) {
        // Closing the connection discards the transaction anyway; rolling back
        // first keeps the intent visible in the logs.
        if !self.rolled_back {
            tracing::warn!(
                "SQLite transaction dropped without rollback, issuing automatic rollback"
            );
            if let Err(e) = self.conn.execute_batch("ROLLBACK") {
                tracing::error!(error = %e, "automatic rollback on drop failed");
            }
        }
    }
}

#[async_trait]
impl TransactionHandle for SqliteTransaction {
    async fn execute(&mut self, sql: &str, params: Params<'_>) -> Result<ExecResult> {
        tracing::debug!(
            sql_preview = %sql.chars().take(100).collect::<String>(),
            "executing statement in SQLite transaction"
        );
        self.ensure_active()?;

        let result = blocking(|| {
            if params.is_empty() {
                self.execute_batch(sql)
            } else {
                self.execute_prepared(sql, params)
            }
        })?;

        tracing::debug!(
            affected_rows = result.affected_rows,
            "statement executed in SQLite transaction"
        );
        Ok(result)
    }

    async fn query<'a>(
        &'a mut self,
        sql: &'a str,
        params: Params<'a>,
    ) -> Result<Box<dyn Cursor + 'a>> {
        tracing::debug!(
            sql_preview = %sql.chars().take(100).collect::<String>(),
            "executing query in SQLite transaction"
        );
        self.ensure_active()?;

        let sets = blocking(|| {
            if params.is_empty() {
                self.query_batch(sql)
            } else {
                self.query_prepared(sql, params)
            }
        })?;

        Ok(Box::new(SqliteCursor::new(sets)))
    }

    async fn prepare(&mut self, sql: &str) -> Result<StatementInfo> {
        self.ensure_active()?;
        // The statement goes back into the connection's cache when dropped and
        // later executions of the same SQL pick it up from there.
        let stmt = self.conn.prepare_cached(sql).map_err(query_error)?;
        Ok(StatementInfo {
            sql: sql.to_string(),
            param_count: Some(stmt.parameter_count()),
        })
    }

    async fn close_statement(&mut self, sql: &str) -> Result<()> {
        self.ensure_active()?;
        // discarding instead of dropping finalizes it and keeps it out of the cache
        let stmt = self.conn.prepare_cached(sql).map_err(query_error)?;
        stmt.discard();
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        tracing::debug!("rolling back SQLite transaction");
        if self.rolled_back {
            return Ok(());
        }

        self.rolled_back = true;
        blocking(|| self.conn.execute_batch("ROLLBACK"))
            .map_err(|e| TxdbError::Rollback(format!("Failed to rollback transaction: {}", e)))?;

        tracing::debug!("SQLite transaction rolled back successfully");
        Ok(())
    }

    fn cancel_handle(&self) -> Option<Arc<dyn QueryCancelHandle>> {
        Some(Arc::new(SqliteCancelHandle::new(self.interrupt_handle.clone())))
    }
}

/// Run a blocking rusqlite call.
///
/// A statement waiting on another connection's write lock sleeps inside
/// SQLite for up to the busy timeout. On a multi-threaded runtime the worker
/// hands its other tasks off first, so only the waiting statement stalls.
fn blocking<T>(call: impl FnOnce() -> T) -> T {
    match Handle::try_current() {
        Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
            tokio::task::block_in_place(call)
        }
        _ => call(),
    }
}

/// Step a statement until it is done, discarding any rows it returns
fn run_to_completion(stmt: &mut Statement<'_>) -> Result<usize> {
    if stmt.column_count() == 0 {
        return stmt.raw_execute().map_err(query_error);
    }
    let mut rows = stmt.raw_query();
    while rows.next().map_err(query_error)?.is_some() {}
    Ok(0)
}

fn read_result_set(stmt: &mut Statement<'_>) -> Result<ResultSetBuffer> {
    let columns: Vec<ColumnMeta> = stmt
        .columns()
        .iter()
        .enumerate()
        .map(|(idx, col)| {
            let meta = ColumnMeta::new(col.name(), idx);
            match col.decl_type() {
                Some(data_type) => meta.with_data_type(data_type),
                None => meta,
            }
        })
        .collect();

    let column_count = columns.len();
    let mut rows = VecDeque::new();
    let mut query_rows = stmt.raw_query();
    while let Some(row) = query_rows.next().map_err(query_error)? {
        let mut values = Vec::with_capacity(column_count);
        for idx in 0..column_count {
            values.push(rusqlite_to_value(row, idx)?);
        }
        rows.push_back(values);
    }

    Ok(ResultSetBuffer { columns, rows })
}

#[derive(Debug, Default)]
struct ResultSetBuffer {
    columns: Vec<ColumnMeta>,
    rows: VecDeque<Vec<Value>>,
}

/// Cursor over the result sets of one SQLite query.
///
/// SQLite statements are stepped to completion before the cursor is handed
/// out, so reading from the cursor never touches the connection.
#[derive(Debug)]
pub struct SqliteCursor {
    current: ResultSetBuffer,
    remaining: VecDeque<ResultSetBuffer>,
}

impl SqliteCursor {
    fn new(mut sets: VecDeque<ResultSetBuffer>) -> Self {
        let current = sets.pop_front().unwrap_or_default();
        Self {
            current,
            remaining: sets,
        }
    }
}

#[async_trait]
impl Cursor for SqliteCursor {
    fn columns(&self) -> &[ColumnMeta] {
        &self.current.columns
    }

    async fn next_row(&mut self) -> Result<Option<Vec<Value>>> {
        Ok(self.current.rows.pop_front())
    }

    async fn next_result_set(&mut self) -> Result<bool> {
        match self.remaining.pop_front() {
            Some(next) => {
                self.current = next;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{SqliteDatabase, SqliteSettings};
    use pretty_assertions::assert_eq;
    use txdb_core::Database;

    async fn setup() -> (tempfile::TempDir, SqliteDatabase) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tx.db");
        let conn = rusqlite::Connection::open(&path).unwrap();
        conn.execute_batch("CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT NOT NULL)")
            .unwrap();
        drop(conn);

        let db = SqliteDatabase::open(path.to_str().unwrap(), SqliteSettings::default()).unwrap();
        (dir, db)
    }

    async fn collect(cursor: &mut Box<dyn Cursor + '_>) -> Vec<Vec<Value>> {
        let mut rows = Vec::new();
        while let Some(row) = cursor.next_row().await.unwrap() {
            rows.push(row);
        }
        rows
    }

    #[tokio::test]
    async fn test_execute_and_query_with_params() {
        let (_dir, db) = setup().await;
        let mut tx = db.begin().await.unwrap();

        let values = [Value::from("alice")];
        let result = tx
            .execute("INSERT INTO users (name) VALUES (?1)", Params::from(&values))
            .await
            .unwrap();
        assert_eq!(result.affected_rows, 1);
        assert_eq!(result.last_insert_id, Some(1));

        let named = vec![(String::from("name"), Value::from("alice"))];
        let mut cursor = tx
            .query(
                "SELECT id, name FROM users WHERE name = :name",
                Params::from(named.as_slice()),
            )
            .await
            .unwrap();
        let names: Vec<_> = cursor.columns().iter().map(|c| c.name.clone()).collect();
        assert_eq!(names, vec!["id", "name"]);
        assert_eq!(cursor.columns()[1].data_type.as_deref(), Some("TEXT"));
        assert_eq!(
            collect(&mut cursor).await,
            vec![vec![Value::Int64(1), Value::from("alice")]]
        );
        assert!(!cursor.next_result_set().await.unwrap());
    }

    #[tokio::test]
    async fn test_multiple_result_sets() {
        let (_dir, db) = setup().await;
        let mut tx = db.begin().await.unwrap();

        let mut cursor = tx
            .query(
                "INSERT INTO users (name) VALUES ('bob'); SELECT 1 AS a; SELECT name FROM users",
                Params::NONE,
            )
            .await
            .unwrap();
        assert_eq!(cursor.columns()[0].name, "a");
        assert_eq!(collect(&mut cursor).await, vec![vec![Value::Int64(1)]]);

        assert!(cursor.next_result_set().await.unwrap());
        assert_eq!(cursor.columns()[0].name, "name");
        assert_eq!(collect(&mut cursor).await, vec![vec![Value::from("bob")]]);
        assert!(!cursor.next_result_set().await.unwrap());
    }

    #[tokio::test]
    async fn test_rollback_discards_writes() {
        let (dir, db) = setup().await;
        let mut tx = db.begin().await.unwrap();
        tx.execute("INSERT INTO users (name) VALUES ('carol')", Params::NONE)
            .await
            .unwrap();
        tx.rollback().await.unwrap();
        // second rollback is a no-op
        tx.rollback().await.unwrap();
        assert!(matches!(
            tx.execute("SELECT 1", Params::NONE).await,
            Err(TxdbError::Closed)
        ));

        let conn = rusqlite::Connection::open(dir.path().join("tx.db")).unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn test_savepoint_rollback() {
        let (_dir, db) = setup().await;
        let mut tx = db.begin().await.unwrap();
        tx.execute("INSERT INTO users (name) VALUES ('dave')", Params::NONE)
            .await
            .unwrap();
        tx.execute("SAVEPOINT txdb_1", Params::NONE).await.unwrap();
        tx.execute("INSERT INTO users (name) VALUES ('erin')", Params::NONE)
            .await
            .unwrap();
        tx.execute("ROLLBACK TO SAVEPOINT txdb_1", Params::NONE)
            .await
            .unwrap();

        let mut cursor = tx.query("SELECT name FROM users", Params::NONE).await.unwrap();
        assert_eq!(collect(&mut cursor).await, vec![vec![Value::from("dave")]]);
    }

    #[tokio::test]
    async fn test_prepare_reports_param_count() {
        let (_dir, db) = setup().await;
        let mut tx = db.begin().await.unwrap();
        let info = tx
            .prepare("INSERT INTO users (id, name) VALUES (?, ?)")
            .await
            .unwrap();
        assert_eq!(info.param_count, Some(2));
        assert!(tx.prepare("SELEC nonsense").await.is_err());
    }

    #[tokio::test]
    async fn test_closed_statement_can_be_prepared_again() {
        let (_dir, db) = setup().await;
        let mut tx = db.begin().await.unwrap();
        let sql = "INSERT INTO users (name) VALUES (?)";
        tx.prepare(sql).await.unwrap();
        tx.close_statement(sql).await.unwrap();

        let values = [Value::from("frank")];
        let result = tx.execute(sql, Params::from(&values)).await.unwrap();
        assert_eq!(result.affected_rows, 1);
        tx.close_statement(sql).await.unwrap();

        tx.rollback().await.unwrap();
        assert!(matches!(tx.close_statement(sql).await, Err(TxdbError::Closed)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_statements_run_on_multi_thread_runtime() {
        let (_dir, db) = setup().await;
        let mut tx = db.begin().await.unwrap();
        tx.execute("INSERT INTO users (name) VALUES ('gina')", Params::NONE)
            .await
            .unwrap();
        let mut cursor = tx.query("SELECT name FROM users", Params::NONE).await.unwrap();
        assert_eq!(collect(&mut cursor).await, vec![vec![Value::from("gina")]]);
        drop(cursor);
        tx.rollback().await.unwrap();
    }

    #[tokio::test]
    async fn test_missing_params_rejected() {
        let (_dir, db) = setup().await;
        let mut tx = db.begin().await.unwrap();
        let err = tx
            .query("SELECT name FROM users WHERE id = ?", Params::NONE)
            .await
            .err()
            .unwrap();
        assert!(err.to_string().contains("expects 1 parameters, got 0"));
    }
}
