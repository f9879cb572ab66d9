//! Dual-store write coordinator.
//!
//! # Responsibility
//! - Validate input, stage metadata statements, then run the content change
//!   on the mutation queue as the side effect gating the metadata commit.
//! - Serve reads straight from the metadata store.
//!
//! # Invariants
//! - A failed content change leaves both stores as they were: the metadata
//!   transaction rolls back and the working tree is reset to HEAD.
//! - The content store is reachable only through the queue.
//! - Metadata writers are admitted one at a time, in arrival order, and
//!   hold the admission until their transaction is finished. SQLite's write
//!   lock is therefore never contended inside one coordinator, and the busy
//!   timeout only applies to other processes.
//! - If git commits but the metadata commit then fails, the content store
//!   is ahead. Committed history is never rewritten to hide that.

use crate::config::{ConfigError, RepoConfig};
use crate::content::{apply_change, ContentChange, ContentError, ContentStore, GitContentStore};
use crate::model::icon::{
    validate_icon_name, IconDescriptor, IconValidationError, Iconfile, IconfileDescriptor,
};
use crate::queue::{MutationQueue, QueueError};
use crate::repo::{MetadataStore, PreparedWrite, RepoError, SqliteIconRepository};
use log::{debug, error, info};
use parking_lot::{FairMutex, FairMutexGuard};
use std::error::Error;
use std::time::Instant;
use thiserror::Error;

pub type CoordinatorResult<T> = Result<T, CoordinatorError>;

#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error(transparent)]
    Validation(#[from] IconValidationError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("{operation}: {source}")]
    Metadata {
        operation: String,
        #[source]
        source: RepoError,
    },
    #[error("{operation}: {source}")]
    Content {
        operation: String,
        #[source]
        source: ContentError,
    },
    #[error(transparent)]
    Queue(#[from] QueueError),
}

impl CoordinatorError {
    /// Whether the icon or iconfile asked for does not exist in either store.
    pub fn is_not_found(&self) -> bool {
        let mut current: Option<&(dyn Error + 'static)> = Some(self);
        while let Some(err) = current {
            if err
                .downcast_ref::<RepoError>()
                .is_some_and(RepoError::is_not_found)
                || err
                    .downcast_ref::<ContentError>()
                    .is_some_and(ContentError::is_not_found)
            {
                return true;
            }
            current = err.source();
        }
        false
    }

    /// Whether the metadata store rejected a duplicate or dangling row.
    pub fn is_constraint_violation(&self) -> bool {
        matches!(self, Self::Metadata { source, .. } if source.is_constraint_violation())
    }
}

/// Coordinates writes across a metadata store and a queued content store.
pub struct WriteCoordinator<M = SqliteIconRepository, S = GitContentStore>
where
    M: MetadataStore,
    S: ContentStore,
{
    metadata: M,
    content: MutationQueue<S>,
    write_gate: FairMutex<()>,
}

impl WriteCoordinator {
    /// Opens both stores from `config`.
    ///
    /// The content store is initialized when absent; the metadata schema
    /// must already be bootstrapped.
    pub fn from_config(config: &RepoConfig) -> CoordinatorResult<Self> {
        config.validate()?;

        let content = GitContentStore::initialize(&config.content_store_location).map_err(
            |source| CoordinatorError::Content {
                operation: "initialize content store".to_string(),
                source,
            },
        )?;
        let metadata = SqliteIconRepository::try_new(&config.database_path, config.busy_timeout())
            .map_err(|source| CoordinatorError::Metadata {
                operation: "open metadata store".to_string(),
                source,
            })?;

        Self::new(metadata, content)
    }
}

impl<M, S> WriteCoordinator<M, S>
where
    M: MetadataStore,
    S: ContentStore,
{
    /// Takes ownership of both stores; the content store moves onto the
    /// queue worker.
    pub fn new(metadata: M, content: S) -> CoordinatorResult<Self> {
        Ok(Self {
            metadata,
            content: MutationQueue::start(content)?,
            write_gate: FairMutex::new(()),
        })
    }

    pub fn metadata(&self) -> &M {
        &self.metadata
    }

    /// Creates `icon_name` with its first iconfile.
    pub fn create_icon(
        &self,
        icon_name: &str,
        iconfile: Iconfile,
        modified_by: &str,
    ) -> CoordinatorResult<IconDescriptor> {
        validate_icon_name(icon_name)?;
        iconfile.descriptor().validate()?;

        let started_at = Instant::now();
        let _admission = self.admit_writer();
        let operation = format!("create icon {icon_name}");
        let pending = self
            .metadata
            .create_icon(icon_name, &iconfile, modified_by)
            .map_err(|source| metadata_error(&operation, source))?;

        let name = icon_name.to_string();
        self.finish(&operation, pending, ContentChange::IconfilesAdded, modified_by, move |store| {
            Ok(vec![store.write_file(&name, &iconfile)?])
        })?;

        log_write("icon_create", icon_name, started_at);
        self.describe_icon(icon_name)
    }

    /// Adds one iconfile to an existing icon.
    pub fn add_iconfile(
        &self,
        icon_name: &str,
        iconfile: Iconfile,
        modified_by: &str,
    ) -> CoordinatorResult<IconfileDescriptor> {
        validate_icon_name(icon_name)?;
        let descriptor = iconfile.descriptor();
        descriptor.validate()?;

        let started_at = Instant::now();
        let _admission = self.admit_writer();
        let operation = format!("add iconfile {descriptor} to icon {icon_name}");
        let pending = self
            .metadata
            .add_iconfile_to_icon(icon_name, &iconfile, modified_by)
            .map_err(|source| metadata_error(&operation, source))?;

        let name = icon_name.to_string();
        self.finish(&operation, pending, ContentChange::IconfilesAdded, modified_by, move |store| {
            Ok(vec![store.write_file(&name, &iconfile)?])
        })?;

        log_write("iconfile_add", icon_name, started_at);
        Ok(descriptor)
    }

    /// Deletes one iconfile; deleting the last one deletes the icon.
    pub fn delete_iconfile(
        &self,
        icon_name: &str,
        descriptor: &IconfileDescriptor,
        modified_by: &str,
    ) -> CoordinatorResult<()> {
        validate_icon_name(icon_name)?;
        descriptor.validate()?;

        let started_at = Instant::now();
        let _admission = self.admit_writer();
        let operation = format!("delete iconfile {descriptor} of icon {icon_name}");
        let pending = self
            .metadata
            .delete_iconfile(icon_name, descriptor, modified_by)
            .map_err(|source| metadata_error(&operation, source))?;

        let name = icon_name.to_string();
        let descriptor = descriptor.clone();
        let change = ContentChange::IconfileDeleted {
            icon_name: name.clone(),
        };
        self.finish(&operation, pending, change, modified_by, move |store| {
            Ok(vec![store.remove_file(&name, &descriptor)?])
        })?;

        log_write("iconfile_delete", icon_name, started_at);
        Ok(())
    }

    /// Deletes the icon together with every iconfile it has.
    pub fn delete_icon(&self, icon_name: &str, modified_by: &str) -> CoordinatorResult<()> {
        validate_icon_name(icon_name)?;

        let started_at = Instant::now();
        let _admission = self.admit_writer();
        let operation = format!("delete icon {icon_name}");
        let (pending, icon) = self
            .metadata
            .delete_icon(icon_name, modified_by)
            .map_err(|source| metadata_error(&operation, source))?;

        let name = icon_name.to_string();
        let change = ContentChange::IconDeleted {
            icon_name: name.clone(),
        };
        self.finish(&operation, pending, change, modified_by, move |store| {
            icon.iconfiles
                .iter()
                .map(|descriptor| store.remove_file(&name, descriptor))
                .collect()
        })?;

        log_write("icon_delete", icon_name, started_at);
        Ok(())
    }

    pub fn add_tag(&self, icon_name: &str, tag: &str, modified_by: &str) -> CoordinatorResult<()> {
        let _admission = self.admit_writer();
        self.metadata
            .add_tag(icon_name, tag, modified_by)
            .map_err(|source| metadata_error(&format!("add tag {tag} to icon {icon_name}"), source))
    }

    pub fn remove_tag(
        &self,
        icon_name: &str,
        tag: &str,
        modified_by: &str,
    ) -> CoordinatorResult<()> {
        let _admission = self.admit_writer();
        self.metadata
            .remove_tag(icon_name, tag, modified_by)
            .map_err(|source| {
                metadata_error(&format!("remove tag {tag} from icon {icon_name}"), source)
            })
    }

    pub fn get_tags(&self) -> CoordinatorResult<Vec<String>> {
        self.metadata
            .get_existing_tags()
            .map_err(|source| metadata_error("list tags", source))
    }

    pub fn describe_icon(&self, icon_name: &str) -> CoordinatorResult<IconDescriptor> {
        self.metadata
            .describe_icon(icon_name)
            .map_err(|source| metadata_error(&format!("describe icon {icon_name}"), source))
    }

    pub fn describe_all_icons(&self) -> CoordinatorResult<Vec<IconDescriptor>> {
        self.metadata
            .describe_all_icons()
            .map_err(|source| metadata_error("describe all icons", source))
    }

    pub fn get_icon_file(
        &self,
        icon_name: &str,
        descriptor: &IconfileDescriptor,
    ) -> CoordinatorResult<Vec<u8>> {
        self.metadata
            .get_icon_file(icon_name, descriptor)
            .map_err(|source| {
                metadata_error(
                    &format!("get iconfile {descriptor} of icon {icon_name}"),
                    source,
                )
            })
    }

    /// Runs `inspect` against the content store on the queue worker.
    ///
    /// For read-only queries such as HEAD or status; queued behind any
    /// pending change.
    pub fn with_content_store<T, F>(&self, inspect: F) -> CoordinatorResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&S) -> T + Send + 'static,
    {
        Ok(self.content.enqueue_and_wait(inspect)?)
    }

    /// Waits for this caller's turn to open a metadata write transaction.
    fn admit_writer(&self) -> FairMutexGuard<'_, ()> {
        let waited_at = Instant::now();
        let guard = self.write_gate.lock();
        debug!(
            "event=writer_admitted module=service wait_ms={}",
            waited_at.elapsed().as_millis()
        );
        guard
    }

    /// Runs the content change as the side effect of `pending`.
    fn finish<F>(
        &self,
        operation: &str,
        pending: PreparedWrite,
        change: ContentChange,
        modified_by: &str,
        mutate: F,
    ) -> CoordinatorResult<()>
    where
        F: FnOnce(&S) -> Result<Vec<String>, ContentError> + Send + 'static,
    {
        let author = modified_by.to_string();
        pending
            .commit_after(|| {
                self.content
                    .enqueue_and_wait(move |store: &S| {
                        apply_change(store, &change, &author, mutate)
                    })??;
                Ok(())
            })
            .map_err(|source| {
                error!(
                    "event=dual_write module=service status=error operation={:?} error={}",
                    operation, source
                );
                metadata_error(operation, source)
            })
    }
}

fn metadata_error(operation: &str, source: RepoError) -> CoordinatorError {
    CoordinatorError::Metadata {
        operation: operation.to_string(),
        source,
    }
}

fn log_write(event: &str, icon_name: &str, started_at: Instant) {
    info!(
        "event={} module=service status=ok icon={} duration_ms={}",
        event,
        icon_name,
        started_at.elapsed().as_millis()
    );
}
