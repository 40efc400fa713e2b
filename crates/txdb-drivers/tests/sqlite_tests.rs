#![cfg(feature = "sqlite")]

/// Integration tests for the SQLite driver
use std::path::{Path, PathBuf};
use std::sync::Arc;
use txdb_core::{Cursor, Params, TxdbError, Value};
use txdb_drivers::{ConnectionConfig, Database, DriverRegistry};

/// Helper to create a database file with a seeded `users` table
fn setup_test_database(dir: &tempfile::TempDir) -> PathBuf {
    let db_path = dir.path().join("drivers.db");
    let conn = rusqlite::Connection::open(&db_path).expect("Failed to create test database");
    conn.execute_batch(
        r#"
        CREATE TABLE users (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            username TEXT NOT NULL,
            email TEXT NOT NULL UNIQUE
        );
        INSERT INTO users (username, email) VALUES
            ('gopher', 'gopher@go.com'),
            ('john', 'john@doe.com'),
            ('jane', 'jane@doe.com');
        "#,
    )
    .expect("Failed to seed test database");
    db_path
}

async fn open(path: &Path) -> Arc<dyn Database> {
    let registry = DriverRegistry::with_defaults();
    let (driver, config) = registry
        .resolve("sqlite", path.to_str().unwrap())
        .expect("sqlite driver is registered");
    assert_eq!(config, ConnectionConfig::new_sqlite(path.to_str().unwrap()));
    driver.connect(&config).await.expect("Failed to connect")
}

async fn first_i64(cursor: &mut Box<dyn Cursor + '_>) -> i64 {
    let row = cursor.next_row().await.unwrap().expect("one row");
    row[0].as_i64().expect("integer column")
}

#[tokio::test]
async fn test_transactions_are_isolated() {
    let dir = tempfile::tempdir().unwrap();
    let path = setup_test_database(&dir);
    let db = open(&path).await;

    let mut writer = db.begin().await.unwrap();
    let mut reader = db.begin().await.unwrap();

    let values = [Value::from("mike"), Value::from("mike@doe.com")];
    writer
        .execute(
            "INSERT INTO users (username, email) VALUES (?, ?)",
            Params::from(&values),
        )
        .await
        .unwrap();

    let mut cursor = writer.query("SELECT COUNT(*) FROM users", Params::NONE).await.unwrap();
    assert_eq!(first_i64(&mut cursor).await, 4);
    drop(cursor);

    let mut cursor = reader.query("SELECT COUNT(*) FROM users", Params::NONE).await.unwrap();
    assert_eq!(first_i64(&mut cursor).await, 3);
    drop(cursor);

    writer.rollback().await.unwrap();
    reader.rollback().await.unwrap();
}

#[tokio::test]
async fn test_rollback_leaves_file_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let path = setup_test_database(&dir);
    let db = open(&path).await;

    let mut tx = db.begin().await.unwrap();
    tx.execute("DELETE FROM users", Params::NONE).await.unwrap();
    tx.rollback().await.unwrap();
    drop(tx);

    let conn = rusqlite::Connection::open(&path).unwrap();
    let count: i64 = conn
        .query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))
        .unwrap();
    assert_eq!(count, 3);
}

#[tokio::test]
async fn test_constraint_violation_is_query_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = setup_test_database(&dir);
    let db = open(&path).await;

    let mut tx = db.begin().await.unwrap();
    let err = tx
        .execute(
            "INSERT INTO users (username, email) VALUES ('taro', 'john@doe.com')",
            Params::NONE,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, TxdbError::Query(ref msg) if msg.contains("UNIQUE")), "{err}");

    // the transaction stays usable after a failed statement
    let mut cursor = tx.query("SELECT COUNT(*) FROM users", Params::NONE).await.unwrap();
    assert_eq!(first_i64(&mut cursor).await, 3);
    drop(cursor);
    tx.rollback().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_cancel_handle_interrupts_statement() {
    let dir = tempfile::tempdir().unwrap();
    let path = setup_test_database(&dir);
    let db = open(&path).await;

    let mut tx = db.begin().await.unwrap();
    let cancel = tx.cancel_handle().expect("sqlite supports cancellation");

    let canceller = std::thread::spawn(move || {
        std::thread::sleep(std::time::Duration::from_millis(100));
        cancel.cancel();
    });

    let err = tx
        .query(
            "WITH RECURSIVE c(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM c) SELECT COUNT(*) FROM c",
            Params::NONE,
        )
        .await
        .err()
        .expect("statement is interrupted");
    assert!(matches!(err, TxdbError::Cancelled), "{err}");
    canceller.join().unwrap();

    tx.rollback().await.unwrap();
}
