//! Metadata store contracts and the SQLite implementation.
//!
//! # Responsibility
//! - Transactional CRUD over icon, iconfile, tag and association rows.
//! - Return semantic errors (`IconNotFound`, `IconfileNotFound`) in addition
//!   to database transport errors.
//!
//! # Invariants
//! - Mutations that must be paired with a content-store change return a
//!   [`PreparedWrite`]; nothing is committed until the caller finishes it.
//! - Removing the last iconfile of an icon removes the icon.

pub mod icon_repo;
pub mod prepared;

pub use icon_repo::SqliteIconRepository;
pub use prepared::{PreparedWrite, SideEffectError};

use crate::db::DbError;
use crate::model::icon::{IconDescriptor, Iconfile, IconfileDescriptor};
use rusqlite::ErrorCode;
use thiserror::Error;

pub type RepoResult<T> = Result<T, RepoError>;

#[derive(Debug, Error)]
pub enum RepoError {
    #[error(transparent)]
    Db(#[from] DbError),
    #[error("icon not found: {0}")]
    IconNotFound(String),
    #[error("iconfile {descriptor} of icon {icon_name} not found")]
    IconfileNotFound {
        icon_name: String,
        descriptor: IconfileDescriptor,
    },
    #[error("expected one iconfile {descriptor} for icon {icon_name}, found {count}")]
    TooManyRows {
        icon_name: String,
        descriptor: IconfileDescriptor,
        count: usize,
    },
    #[error("metadata schema is missing table `{0}`")]
    MissingRequiredTable(&'static str),
    #[error("failed iconfile operation: {operation}")]
    SideEffectFailed {
        operation: String,
        #[source]
        source: SideEffectError,
    },
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

impl RepoError {
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::IconNotFound(_) | Self::IconfileNotFound { .. }
        )
    }

    /// Whether this is a uniqueness/foreign-key violation, e.g. a duplicate
    /// `(icon, format, size)` insert.
    pub fn is_constraint_violation(&self) -> bool {
        match self {
            Self::Db(err) => {
                err.sqlite_error().sqlite_error_code() == Some(ErrorCode::ConstraintViolation)
            }
            _ => false,
        }
    }
}

/// Metadata store operations used by the write coordinator.
pub trait MetadataStore: Send + Sync {
    /// Inserts the icon row and its first iconfile row.
    fn create_icon(
        &self,
        icon_name: &str,
        iconfile: &Iconfile,
        modified_by: &str,
    ) -> RepoResult<PreparedWrite>;

    /// Inserts one iconfile row for an existing icon and records the writer.
    fn add_iconfile_to_icon(
        &self,
        icon_name: &str,
        iconfile: &Iconfile,
        modified_by: &str,
    ) -> RepoResult<PreparedWrite>;

    /// Deletes every iconfile row, and thereby the icon.
    ///
    /// Returns the icon as it was before deletion, read inside the same
    /// transaction.
    fn delete_icon(
        &self,
        icon_name: &str,
        modified_by: &str,
    ) -> RepoResult<(PreparedWrite, IconDescriptor)>;

    /// Deletes one iconfile row; deletes the icon when it was the last one.
    fn delete_iconfile(
        &self,
        icon_name: &str,
        descriptor: &IconfileDescriptor,
        modified_by: &str,
    ) -> RepoResult<PreparedWrite>;

    /// Associates `tag` with the icon, creating the tag on first use.
    fn add_tag(&self, icon_name: &str, tag: &str, modified_by: &str) -> RepoResult<()>;

    /// Removes the association; the tag itself is kept.
    fn remove_tag(&self, icon_name: &str, tag: &str, modified_by: &str) -> RepoResult<()>;

    /// Every tag ever created, sorted by text.
    fn get_existing_tags(&self) -> RepoResult<Vec<String>>;

    fn describe_icon(&self, icon_name: &str) -> RepoResult<IconDescriptor>;

    /// Every icon, sorted by name.
    fn describe_all_icons(&self) -> RepoResult<Vec<IconDescriptor>>;

    fn get_icon_file(
        &self,
        icon_name: &str,
        descriptor: &IconfileDescriptor,
    ) -> RepoResult<Vec<u8>>;
}
