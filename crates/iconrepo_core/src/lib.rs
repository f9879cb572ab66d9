//! Core of the icon repository.
//! Keeps iconfile bytes in a git working tree and icon metadata in SQLite,
//! and makes every write land in both stores or in neither.

pub mod config;
pub mod content;
pub mod db;
pub mod logging;
pub mod model;
pub mod queue;
pub mod repo;
pub mod service;

pub use config::{ConfigError, RepoConfig};
pub use content::{ContentChange, ContentError, ContentStore, GitContentStore};
pub use db::{bootstrap_schema, DbError, RetryPolicy};
pub use logging::{default_log_level, init_logging, LoggingError};
pub use model::icon::{
    validate_icon_name, IconDescriptor, IconValidationError, Iconfile, IconfileDescriptor,
};
pub use queue::{MutationQueue, QueueError};
pub use repo::{MetadataStore, PreparedWrite, RepoError, RepoResult, SqliteIconRepository};
pub use service::{CoordinatorError, CoordinatorResult, WriteCoordinator};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::core_version;

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
