use iconrepo_core::db::{bootstrap_schema, open_connection, RetryPolicy, TABLES};
use iconrepo_core::{DbError, RepoError, SqliteIconRepository};
use rusqlite::Connection;
use std::path::Path;
use std::time::{Duration, Instant};

const BUSY_TIMEOUT: Duration = Duration::from_millis(2_000);

fn quick_policy(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        delay: Duration::from_millis(10),
    }
}

fn table_names(conn: &Connection) -> Vec<String> {
    let mut stmt = conn
        .prepare("SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name;")
        .unwrap();
    stmt.query_map([], |row| row.get::<_, String>(0))
        .unwrap()
        .collect::<Result<Vec<_>, _>>()
        .unwrap()
}

#[test]
fn bootstrap_creates_every_table_in_wal_mode() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("meta.sqlite3");

    bootstrap_schema(&db_path, BUSY_TIMEOUT, quick_policy(1)).unwrap();

    let conn = open_connection(&db_path, BUSY_TIMEOUT).unwrap();
    let mut expected: Vec<String> = TABLES.iter().map(|t| t.name.to_string()).collect();
    expected.sort();
    assert_eq!(table_names(&conn), expected);

    let mode: String = conn
        .query_row("PRAGMA journal_mode;", [], |row| row.get(0))
        .unwrap();
    assert_eq!(mode.to_ascii_lowercase(), "wal");

    let foreign_keys: i64 = conn
        .query_row("PRAGMA foreign_keys;", [], |row| row.get(0))
        .unwrap();
    assert_eq!(foreign_keys, 1);
}

#[test]
fn rerunning_bootstrap_drops_existing_rows() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("meta.sqlite3");
    bootstrap_schema(&db_path, BUSY_TIMEOUT, quick_policy(1)).unwrap();

    let conn = open_connection(&db_path, BUSY_TIMEOUT).unwrap();
    conn.execute(
        "INSERT INTO icon (name, modified_by) VALUES ('arrow', 'ux');",
        [],
    )
    .unwrap();
    conn.execute("INSERT INTO tag (text) VALUES ('outline');", [])
        .unwrap();
    drop(conn);

    bootstrap_schema(&db_path, BUSY_TIMEOUT, quick_policy(1)).unwrap();

    let conn = open_connection(&db_path, BUSY_TIMEOUT).unwrap();
    for table in TABLES {
        let count: i64 = conn
            .query_row(&format!("SELECT count(*) FROM {};", table.name), [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(count, 0, "table {} should be empty", table.name);
    }
}

#[test]
fn unreachable_database_is_retried_until_the_bound() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("no-such-dir").join("meta.sqlite3");

    let started_at = Instant::now();
    let err = bootstrap_schema(&db_path, BUSY_TIMEOUT, quick_policy(3)).unwrap_err();

    match err {
        DbError::RetriesExhausted { attempts, .. } => assert_eq!(attempts, 3),
        other => panic!("expected retries to be exhausted, got {other:?}"),
    }
    assert!(started_at.elapsed() >= Duration::from_millis(20));
}

#[test]
fn non_transient_error_aborts_without_retry() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("garbage.sqlite3");
    std::fs::write(&db_path, vec![0x5a_u8; 8192]).unwrap();

    let policy = RetryPolicy {
        max_attempts: 30,
        delay: Duration::from_secs(5),
    };
    let started_at = Instant::now();
    let err = bootstrap_schema(&db_path, BUSY_TIMEOUT, policy).unwrap_err();

    assert!(matches!(err, DbError::Sqlite(_)), "got {err:?}");
    assert!(started_at.elapsed() < Duration::from_secs(5));
}

#[test]
fn repository_requires_a_bootstrapped_schema() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("empty.sqlite3");

    let err = SqliteIconRepository::try_new(&db_path, BUSY_TIMEOUT).unwrap_err();
    assert!(matches!(err, RepoError::MissingRequiredTable("icon")));

    bootstrap_schema(&db_path, BUSY_TIMEOUT, quick_policy(1)).unwrap();
    let repo = SqliteIconRepository::try_new(&db_path, BUSY_TIMEOUT).unwrap();
    assert_eq!(repo.path(), Path::new(&db_path));
}
