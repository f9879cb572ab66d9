//! Declarative schema and idempotent (re)creation.
//!
//! # Invariants
//! - `TABLES` lists parents before the tables referencing them.
//! - Recreation runs in one transaction: either every table is fresh or
//!   none was touched.

use super::open::open_connection;
use super::{DbError, DbResult};
use log::{info, warn};
use rusqlite::{Connection, ErrorCode};
use std::path::Path;
use std::thread;
use std::time::Duration;

const DEFAULT_MAX_ATTEMPTS: u32 = 30;
const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(2);

/// One column: name and SQL type/constraint clause.
#[derive(Debug, Clone, Copy)]
pub struct ColumnSpec {
    pub name: &'static str,
    pub definition: &'static str,
}

/// One table: columns in declaration order plus table constraints.
#[derive(Debug, Clone, Copy)]
pub struct TableSpec {
    pub name: &'static str,
    pub columns: &'static [ColumnSpec],
    pub constraints: &'static [&'static str],
}

impl TableSpec {
    pub fn create_sql(&self) -> String {
        let mut clauses: Vec<String> = self
            .columns
            .iter()
            .map(|column| format!("{} {}", column.name, column.definition))
            .collect();
        clauses.extend(self.constraints.iter().map(|c| (*c).to_string()));
        format!("CREATE TABLE {} ({});", self.name, clauses.join(", "))
    }

    pub fn drop_sql(&self) -> String {
        format!("DROP TABLE IF EXISTS {};", self.name)
    }
}

const fn column(name: &'static str, definition: &'static str) -> ColumnSpec {
    ColumnSpec { name, definition }
}

pub const ICON_TABLE: TableSpec = TableSpec {
    name: "icon",
    columns: &[
        column("id", "INTEGER PRIMARY KEY AUTOINCREMENT"),
        column("name", "TEXT NOT NULL"),
        column("modified_by", "TEXT NOT NULL"),
        column(
            "modified_at",
            "INTEGER NOT NULL DEFAULT (CAST(strftime('%s', 'now') AS INTEGER) * 1000)",
        ),
    ],
    constraints: &["UNIQUE (name)"],
};

pub const ICON_FILE_TABLE: TableSpec = TableSpec {
    name: "icon_file",
    columns: &[
        column("id", "INTEGER PRIMARY KEY AUTOINCREMENT"),
        column(
            "icon_id",
            "INTEGER NOT NULL REFERENCES icon(id) ON DELETE CASCADE",
        ),
        column("file_format", "TEXT NOT NULL"),
        column("icon_size", "TEXT NOT NULL"),
        column("content", "BLOB NOT NULL"),
    ],
    constraints: &["UNIQUE (icon_id, file_format, icon_size)"],
};

pub const TAG_TABLE: TableSpec = TableSpec {
    name: "tag",
    columns: &[
        column("id", "INTEGER PRIMARY KEY AUTOINCREMENT"),
        column("text", "TEXT NOT NULL"),
    ],
    constraints: &["UNIQUE (text)"],
};

pub const ICON_TO_TAGS_TABLE: TableSpec = TableSpec {
    name: "icon_to_tags",
    columns: &[
        column(
            "icon_id",
            "INTEGER NOT NULL REFERENCES icon(id) ON DELETE CASCADE",
        ),
        column("tag_id", "INTEGER NOT NULL REFERENCES tag(id) ON DELETE CASCADE"),
    ],
    constraints: &["UNIQUE (icon_id, tag_id)"],
};

/// Every table of the schema, in dependency order.
pub const TABLES: &[TableSpec] = &[ICON_TABLE, ICON_FILE_TABLE, TAG_TABLE, ICON_TO_TAGS_TABLE];

/// Fixed-delay retry bound for schema bootstrap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            delay: DEFAULT_RETRY_DELAY,
        }
    }
}

/// Drops and recreates every table at `path`.
///
/// Transient errors (database cannot be opened, busy or locked) are retried
/// up to `policy.max_attempts` with a fixed sleep between attempts; any
/// other error aborts at once.
pub fn bootstrap_schema(path: &Path, busy_timeout: Duration, policy: RetryPolicy) -> DbResult<()> {
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;
        let err = match open_connection(path, busy_timeout).and_then(|mut conn| recreate(&mut conn))
        {
            Ok(()) => {
                info!(
                    "event=schema_bootstrap module=db status=ok attempt={} tables={}",
                    attempt,
                    TABLES.len()
                );
                return Ok(());
            }
            Err(DbError::Sqlite(err)) if is_transient(&err) => err,
            Err(err) => return Err(err),
        };

        warn!(
            "event=schema_bootstrap module=db status=retry attempt={} max_attempts={} error={}",
            attempt, max_attempts, err
        );
        if attempt >= max_attempts {
            return Err(DbError::RetriesExhausted {
                attempts: attempt,
                source: err,
            });
        }
        thread::sleep(policy.delay);
    }
}

/// Whether `err` means the database is not reachable yet.
pub fn is_transient(err: &rusqlite::Error) -> bool {
    matches!(
        err.sqlite_error_code(),
        Some(ErrorCode::CannotOpen | ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked)
    )
}

fn recreate(conn: &mut Connection) -> DbResult<()> {
    // Journal mode is persistent in the file; readers then never block on
    // the single writer.
    let _mode: String = conn.query_row("PRAGMA journal_mode = WAL;", [], |row| row.get(0))?;

    let tx = conn.transaction()?;
    for table in TABLES.iter().rev() {
        tx.execute_batch(&table.drop_sql())?;
    }
    for table in TABLES {
        tx.execute_batch(&table.create_sql())?;
    }
    tx.commit()?;
    Ok(())
}
