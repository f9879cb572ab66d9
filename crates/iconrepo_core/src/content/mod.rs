//! Version-controlled content store for iconfile bytes.
//!
//! # Responsibility
//! - Map `(name, format, size)` to a working-tree path.
//! - Write/remove iconfiles and commit or discard working-tree changes.
//!
//! # Invariants
//! - HEAD of the store is the authoritative committed state.
//! - `stage_and_commit` stages everything, so the working tree must hold no
//!   unrelated dirty state when it runs. Callers reach the store only
//!   through the mutation queue, which guarantees this.
//! - A failed change job leaves the working tree at HEAD.

pub mod command;
mod git;
pub mod layout;

pub use command::{run_command, CommandError};
pub use git::{GitContentStore, SIMULATE_COMMIT_FAILURE_ENV};
pub use layout::{commit_author, iconfile_path, ContentChange};

use crate::model::icon::{Iconfile, IconfileDescriptor};
use log::{debug, error, info};
use std::io;
use std::path::{Path, PathBuf};
use std::time::Instant;
use thiserror::Error;

pub type ContentResult<T> = Result<T, ContentError>;

/// Content-store failure.
#[derive(Debug, Error)]
pub enum ContentError {
    #[error("content store location `{}` exists but is not a directory", .0.display())]
    NotADirectory(PathBuf),
    #[error("failed to initialize content store at `{}`", location.display())]
    Init {
        location: PathBuf,
        #[source]
        source: Box<ContentError>,
    },
    #[error("{operation} failed for `{}`: {source}", path.display())]
    Io {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("iconfile {descriptor} of icon {icon_name} not found in content store")]
    IconfileNotFound {
        icon_name: String,
        descriptor: IconfileDescriptor,
    },
    #[error("failed to commit {paths:?}: {source}")]
    Commit {
        paths: Vec<String>,
        #[source]
        source: CommandError,
    },
    #[error(transparent)]
    Command(#[from] CommandError),
}

impl ContentError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::IconfileNotFound { .. })
    }
}

/// Capability interface over a history-tracked file store.
///
/// Kept narrow so another backend can replace the git implementation without
/// changing the coordinator.
pub trait ContentStore: Send + 'static {
    /// Root of the working tree.
    fn location(&self) -> &Path;

    /// Writes iconfile bytes to the derived path; returns the repo-relative path.
    fn write_file(&self, icon_name: &str, iconfile: &Iconfile) -> ContentResult<String>;

    /// Removes the iconfile at the derived path; returns the repo-relative path.
    fn remove_file(&self, icon_name: &str, descriptor: &IconfileDescriptor)
        -> ContentResult<String>;

    /// Stages every working-tree change and commits it as one unit.
    fn stage_and_commit(
        &self,
        changed_paths: &[String],
        change: &ContentChange,
        author: &str,
    ) -> ContentResult<()>;

    /// Discards uncommitted changes. Best effort: failures are logged only.
    fn rollback(&self);

    /// Runs a store command in the working tree and returns stdout.
    fn run_command(&self, args: &[&str]) -> ContentResult<String>;
}

/// Applies one content change as a unit: mutate, stage, commit.
///
/// Any failure triggers [`ContentStore::rollback`] before returning, so the
/// working tree is back at HEAD when this returns an error.
pub fn apply_change<S, F>(
    store: &S,
    change: &ContentChange,
    author: &str,
    mutate: F,
) -> ContentResult<Vec<String>>
where
    S: ContentStore + ?Sized,
    F: FnOnce(&S) -> ContentResult<Vec<String>>,
{
    let started_at = Instant::now();
    debug!(
        "event=content_change module=content status=start change={}",
        change.label()
    );

    let result = mutate(store).and_then(|paths| {
        store.stage_and_commit(&paths, change, author)?;
        Ok(paths)
    });

    match &result {
        Ok(paths) => info!(
            "event=content_change module=content status=ok change={} paths={} duration_ms={}",
            change.label(),
            paths.len(),
            started_at.elapsed().as_millis()
        ),
        Err(err) => {
            error!(
                "event=content_change module=content status=error change={} duration_ms={} error={}",
                change.label(),
                started_at.elapsed().as_millis(),
                err
            );
            store.rollback();
        }
    }

    result
}
