//! Pure path derivation and commit-message policy.
//!
//! Nothing here touches the filesystem, so both functions are always
//! recomputable from `(name, format, size)` and the changed-path list.

use crate::model::icon::IconfileDescriptor;

/// Author domain tag embedded in commit author lines.
pub const AUTHOR_DOMAIN_TAG: &str = "IconRepoServer";

/// Repo-relative path of an iconfile: `<format>/<size>/<name>@<size>.<format>`.
pub fn iconfile_path(icon_name: &str, descriptor: &IconfileDescriptor) -> String {
    format!(
        "{format}/{size}/{icon_name}@{size}.{format}",
        format = descriptor.format,
        size = descriptor.size
    )
}

/// Kind of content change a commit records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentChange {
    /// One or more iconfiles written.
    IconfilesAdded,
    /// One iconfile of `icon_name` removed.
    IconfileDeleted { icon_name: String },
    /// Every iconfile of `icon_name` removed.
    IconDeleted { icon_name: String },
}

impl ContentChange {
    /// Short label used in log events.
    pub fn label(&self) -> &'static str {
        match self {
            Self::IconfilesAdded => "add_iconfile",
            Self::IconfileDeleted { .. } => "delete_iconfile",
            Self::IconDeleted { .. } => "delete_icon",
        }
    }

    /// Builds the commit message for `changed_paths` written by `author`.
    pub fn commit_message(&self, changed_paths: &[String], author: &str) -> String {
        let file_list = changed_paths.join("\n");
        let base = match self {
            Self::IconfilesAdded => format!("{file_list} icon file(s) added"),
            Self::IconfileDeleted { icon_name } => {
                format!("iconfile for icon \"{icon_name}\" deleted:\n\n{file_list}")
            }
            Self::IconDeleted { icon_name } => {
                format!("all file(s) for icon \"{icon_name}\" deleted:\n\n{file_list}")
            }
        };
        format!("{base} by {author}")
    }
}

/// Author argument value: `<identity>@IconRepoServer <<identity>>`.
pub fn commit_author(identity: &str) -> String {
    format!("{identity}@{AUTHOR_DOMAIN_TAG} <{identity}>")
}
