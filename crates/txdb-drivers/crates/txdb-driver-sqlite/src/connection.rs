//! SQLite database handle

use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::{Connection as RusqliteConnection, InterruptHandle, OpenFlags};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use txdb_core::{
    ConnectionConfig, Database, QueryCancelHandle, Result, TransactionHandle, TxdbError,
};

use crate::SqliteTransaction;

/// Default time a transaction waits on a locked database file
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// Cancel handle for SQLite statements.
///
/// This wraps the rusqlite `InterruptHandle` and can be called from any thread
/// to interrupt a running statement. The interrupted statement returns
/// SQLITE_INTERRUPT, which the driver reports as [`TxdbError::Cancelled`].
pub struct SqliteCancelHandle {
    interrupt_handle: Arc<InterruptHandle>,
}

impl SqliteCancelHandle {
    pub(crate) fn new(interrupt_handle: Arc<InterruptHandle>) -> Self {
        Self { interrupt_handle }
    }
}

impl QueryCancelHandle for SqliteCancelHandle {
    fn cancel(&self) {
        tracing::debug!("interrupting SQLite statement");
        self.interrupt_handle.interrupt();
    }
}

/// Settings applied to every connection opened on the database file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqliteSettings {
    /// How long a statement waits for a lock held by another transaction
    pub busy_timeout: Duration,
    /// Journal mode set when the database is opened
    pub journal_mode: String,
    /// Whether foreign key constraints are enforced
    pub foreign_keys: bool,
}

impl Default for SqliteSettings {
    fn default() -> Self {
        Self {
            busy_timeout: Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS),
            journal_mode: "WAL".to_string(),
            foreign_keys: true,
        }
    }
}

impl SqliteSettings {
    /// Read settings from connection parameters.
    ///
    /// Recognized keys: `busy_timeout_ms`, `journal_mode` and `foreign_keys`.
    pub fn from_config(config: &ConnectionConfig) -> Result<Self> {
        let mut settings = Self::default();
        if let Some(ms) = config.get_u64("busy_timeout_ms")? {
            settings.busy_timeout = Duration::from_millis(ms);
        }
        if let Some(mode) = config.get_string("journal_mode") {
            settings.journal_mode = mode.to_ascii_uppercase();
        }
        if let Some(flag) = config.get_string("foreign_keys") {
            settings.foreign_keys = match flag.to_ascii_lowercase().as_str() {
                "1" | "on" | "true" | "yes" => true,
                "0" | "off" | "false" | "no" => false,
                other => {
                    return Err(TxdbError::Configuration(format!(
                        "parameter 'foreign_keys' must be on or off, got '{}'",
                        other
                    )));
                }
            };
        }
        Ok(settings)
    }
}

/// A file-backed SQLite database.
///
/// The database keeps one primary connection, used to set up the file and to
/// answer pings. Each call to [`Database::begin`] opens a further connection
/// that belongs to the returned transaction alone.
///
/// SQLite allows one writer per file. Transactions read in parallel under
/// WAL, but once one transaction has written, a write from any other
/// transaction waits for up to the busy timeout and then fails with
/// "database is locked", because the first writer only lets go when it
/// rolls back. Tests that write under different identifiers at the same
/// time need a database file each, or a short busy timeout and a retry.
pub struct SqliteDatabase {
    path: String,
    settings: SqliteSettings,
    primary: Mutex<Option<RusqliteConnection>>,
    closed: AtomicBool,
}

impl std::fmt::Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteDatabase")
            .field("path", &self.path)
            .field("settings", &self.settings)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl SqliteDatabase {
    /// Open a SQLite database file
    pub fn open(path: &str, settings: SqliteSettings) -> Result<Self> {
        tracing::info!(path = %path, "opening SQLite database");
        if is_memory_path(path) {
            return Err(TxdbError::Configuration(
                "in-memory SQLite databases are not supported: every transaction opens its own connection, so the database must be a file".into(),
            ));
        }

        let path = expand_path(path)?;
        let conn = open_connection(&path, &settings)?;

        let mode: String = conn
            .pragma_update_and_check(None, "journal_mode", &settings.journal_mode, |row| {
                row.get(0)
            })
            .map_err(|e| TxdbError::Connection(format!("Failed to set journal mode: {}", e)))?;
        if !mode.eq_ignore_ascii_case(&settings.journal_mode) {
            tracing::warn!(
                requested = %settings.journal_mode,
                actual = %mode,
                "SQLite did not accept the requested journal mode"
            );
        }

        tracing::info!(path = %path, journal_mode = %mode, "SQLite database opened");
        Ok(Self {
            path,
            settings,
            primary: Mutex::new(Some(conn)),
            closed: AtomicBool::new(false),
        })
    }

    /// Absolute path of the database file
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Settings every transaction connection is opened with
    pub fn settings(&self) -> &SqliteSettings {
        &self.settings
    }
}

#[async_trait]
impl Database for SqliteDatabase {
    fn driver_name(&self) -> &str {
        "sqlite"
    }

    #[tracing::instrument(skip(self), fields(path = %self.path))]
    async fn begin(&self) -> Result<Box<dyn TransactionHandle>> {
        if self.is_closed() {
            return Err(TxdbError::Closed);
        }

        let conn = open_connection(&self.path, &self.settings)?;
        let tx = SqliteTransaction::begin(conn)?;
        tracing::debug!("SQLite transaction started");
        Ok(Box::new(tx))
    }

    async fn ping(&self) -> Result<()> {
        let guard = self.primary.lock();
        let conn = guard.as_ref().ok_or(TxdbError::Closed)?;
        conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
            .map_err(|e| TxdbError::Connection(format!("SQLite ping failed: {}", e)))?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        let conn = self.primary.lock().take();
        if let Some(conn) = conn {
            conn.close().map_err(|(_, e)| {
                TxdbError::Connection(format!("Failed to close SQLite database: {}", e))
            })?;
            tracing::debug!(path = %self.path, "SQLite database closed");
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Open one connection to the database file with the session settings applied
fn open_connection(path: &str, settings: &SqliteSettings) -> Result<RusqliteConnection> {
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_CREATE
        | OpenFlags::SQLITE_OPEN_URI
        | OpenFlags::SQLITE_OPEN_NO_MUTEX;

    if !path.starts_with("file:")
        && let Some(parent) = Path::new(path).parent()
        && !parent.exists()
    {
        return Err(TxdbError::Connection(format!(
            "Parent directory does not exist: {}",
            parent.display()
        )));
    }

    let conn = RusqliteConnection::open_with_flags(path, flags).map_err(|e| {
        TxdbError::Connection(format!(
            "Failed to open SQLite database at '{}': {}",
            path, e
        ))
    })?;

    conn.busy_timeout(settings.busy_timeout)
        .map_err(|e| TxdbError::Connection(format!("Failed to set busy timeout: {}", e)))?;

    let foreign_keys = if settings.foreign_keys { "ON" } else { "OFF" };
    conn.pragma_update(None, "foreign_keys", foreign_keys)
        .map_err(|e| TxdbError::Connection(format!("Failed to set foreign keys: {}", e)))?;

    Ok(conn)
}

fn is_memory_path(path: &str) -> bool {
    path.is_empty() || path == ":memory:" || path.contains("mode=memory")
}

/// Expand path to handle ~ (home directory) and relative paths
fn expand_path(path: &str) -> Result<String> {
    if path.starts_with("file:") {
        return Ok(path.to_string());
    }

    let expanded = if let Some(rest) = path.strip_prefix("~/") {
        let home = std::env::var_os("HOME").ok_or_else(|| {
            TxdbError::Configuration("Unable to determine HOME directory".into())
        })?;
        PathBuf::from(home).join(rest)
    } else if path.starts_with('~') {
        return Err(TxdbError::Configuration(
            "User-specific home directories (~user) are not supported".into(),
        ));
    } else {
        PathBuf::from(path)
    };

    let absolute = if expanded.is_relative() {
        std::env::current_dir()?.join(expanded)
    } else {
        expanded
    };

    Ok(absolute.to_string_lossy().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_memory_paths_rejected() {
        for path in [":memory:", "", "file:shared?mode=memory&cache=shared"] {
            let err = SqliteDatabase::open(path, SqliteSettings::default()).unwrap_err();
            assert!(matches!(err, TxdbError::Configuration(_)), "{path}: {err}");
        }
    }

    #[test]
    fn test_expand_path_keeps_uris_and_absolute_paths() {
        assert_eq!(expand_path("file:/tmp/a.db?mode=rwc").unwrap(), "file:/tmp/a.db?mode=rwc");
        assert_eq!(expand_path("/tmp/a.db").unwrap(), "/tmp/a.db");
        assert!(Path::new(&expand_path("a.db").unwrap()).is_absolute());
        assert!(expand_path("~other/a.db").is_err());
    }

    #[test]
    fn test_settings_from_config() {
        let config = ConnectionConfig::new_sqlite("/tmp/a.db")
            .with_param("busy_timeout_ms", 250)
            .with_param("journal_mode", "delete")
            .with_param("foreign_keys", "off");
        let settings = SqliteSettings::from_config(&config).unwrap();
        assert_eq!(settings.busy_timeout, Duration::from_millis(250));
        assert_eq!(settings.journal_mode, "DELETE");
        assert!(!settings.foreign_keys);

        let bad = ConnectionConfig::new_sqlite("/tmp/a.db").with_param("foreign_keys", "maybe");
        assert!(SqliteSettings::from_config(&bad).is_err());
    }

    #[test]
    fn test_missing_parent_directory() {
        let err = SqliteDatabase::open("/definitely/not/here/a.db", SqliteSettings::default())
            .unwrap_err();
        assert!(err.is_connection());
    }

    #[tokio::test]
    async fn test_open_ping_close() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ping.db");
        let db = SqliteDatabase::open(path.to_str().unwrap(), SqliteSettings::default()).unwrap();

        db.ping().await.unwrap();
        assert!(!db.is_closed());

        db.close().await.unwrap();
        assert!(db.is_closed());
        assert!(matches!(db.ping().await, Err(TxdbError::Closed)));
        assert!(matches!(db.begin().await, Err(TxdbError::Closed)));
    }
}
