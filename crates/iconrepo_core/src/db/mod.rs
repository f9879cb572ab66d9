//! SQLite storage bootstrap for the metadata store.
//!
//! # Responsibility
//! - Open and configure SQLite connections.
//! - Drop and recreate the icon schema, retrying while the database is not
//!   yet reachable.
//!
//! # Invariants
//! - Returned connections have `foreign_keys=ON` and a busy timeout.
//! - Tables are created parents first and dropped children first.

mod open;
pub mod schema;

pub use open::open_connection;
pub use schema::{bootstrap_schema, is_transient, RetryPolicy, TableSpec, TABLES};

use thiserror::Error;

pub type DbResult<T> = Result<T, DbError>;

#[derive(Debug, Error)]
pub enum DbError {
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
    #[error("schema bootstrap gave up after {attempts} attempts: {source}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        source: rusqlite::Error,
    },
}

impl DbError {
    /// Returns the underlying SQLite error, if any.
    pub fn sqlite_error(&self) -> &rusqlite::Error {
        match self {
            Self::Sqlite(err) => err,
            Self::RetriesExhausted { source, .. } => source,
        }
    }
}
