//! Connection bootstrap for SQLite.

use super::DbResult;
use log::{debug, error};
use rusqlite::Connection;
use std::path::Path;
use std::time::{Duration, Instant};

/// Opens a connection to the metadata database at `path`.
///
/// Every operation opens its own connection, so concurrent callers never
/// share one. The busy timeout makes writers wait for the database lock
/// instead of failing with `SQLITE_BUSY`.
pub fn open_connection(path: &Path, busy_timeout: Duration) -> DbResult<Connection> {
    let started_at = Instant::now();

    let result = Connection::open(path).and_then(|conn| {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.busy_timeout(busy_timeout)?;
        Ok(conn)
    });

    match result {
        Ok(conn) => {
            debug!(
                "event=db_open module=db status=ok duration_ms={}",
                started_at.elapsed().as_millis()
            );
            Ok(conn)
        }
        Err(err) => {
            error!(
                "event=db_open module=db status=error path={} duration_ms={} error={}",
                path.display(),
                started_at.elapsed().as_millis(),
                err
            );
            Err(err.into())
        }
    }
}
