//! Two-step metadata write handle.
//!
//! A mutating metadata operation leaves its statements pending inside an
//! open `BEGIN IMMEDIATE` transaction and hands back a [`PreparedWrite`].
//! The caller then finishes it explicitly, optionally running a side effect
//! between the statements and the commit.

use super::{RepoError, RepoResult};
use log::{error, warn};
use rusqlite::Connection;
use std::error::Error;
use std::time::Instant;

/// Error type accepted from side effects.
pub type SideEffectError = Box<dyn Error + Send + Sync>;

/// Pending metadata transaction on its own connection.
///
/// Dropping an unfinished handle rolls the transaction back.
pub struct PreparedWrite {
    conn: Connection,
    operation: String,
    started_at: Instant,
    finished: bool,
}

impl PreparedWrite {
    pub(crate) fn begin(conn: Connection, operation: impl Into<String>) -> RepoResult<Self> {
        conn.execute_batch("BEGIN IMMEDIATE;")?;
        Ok(Self {
            conn,
            operation: operation.into(),
            started_at: Instant::now(),
            finished: false,
        })
    }

    pub(crate) fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Human-readable description of the pending operation.
    pub fn operation(&self) -> &str {
        &self.operation
    }

    /// Commits the pending statements.
    pub fn commit(mut self) -> RepoResult<()> {
        self.conn.execute_batch("COMMIT;")?;
        self.finished = true;
        Ok(())
    }

    /// Runs `side_effect`, then commits; rolls back if the side effect fails.
    ///
    /// # Errors
    /// - `RepoError::SideEffectFailed` wrapping the side-effect error; the
    ///   metadata statements are rolled back.
    /// - A commit error after a successful side effect. The side effect is
    ///   not undone in that case.
    pub fn commit_after<F>(self, side_effect: F) -> RepoResult<()>
    where
        F: FnOnce() -> Result<(), SideEffectError>,
    {
        if let Err(source) = side_effect() {
            let operation = self.operation.clone();
            self.rollback();
            return Err(RepoError::SideEffectFailed { operation, source });
        }

        let operation = self.operation.clone();
        let elapsed_ms = self.started_at.elapsed().as_millis();
        self.commit().map_err(|err| {
            error!(
                "event=metadata_commit module=repo status=error side_effect=applied operation={:?} duration_ms={} error={}",
                operation, elapsed_ms, err
            );
            err
        })
    }

    /// Discards the pending statements.
    pub fn rollback(mut self) {
        self.finish_with_rollback();
    }

    fn finish_with_rollback(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;
        if let Err(err) = self.conn.execute_batch("ROLLBACK;") {
            warn!(
                "event=metadata_rollback module=repo status=error operation={:?} error={}",
                self.operation, err
            );
        }
    }
}

impl Drop for PreparedWrite {
    fn drop(&mut self) {
        self.finish_with_rollback();
    }
}
