//! Git-backed content store.
//!
//! Shells out to the `git` binary with the store location as working
//! directory. Not safe for concurrent use; see `crate::queue`.

use super::command::{run_command, CommandError};
use super::layout::{commit_author, iconfile_path, ContentChange};
use super::{ContentError, ContentResult, ContentStore};
use crate::model::icon::{Iconfile, IconfileDescriptor};
use log::{info, warn};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

/// When set to `true`, commits run a non-existent git subcommand and fail.
pub const SIMULATE_COMMIT_FAILURE_ENV: &str = "ICONREPO_SIMULATE_COMMIT_FAILURE";

const GIT: &str = "git";
const COMMIT_SUBCOMMAND: &str = "commit";
const SIMULATED_COMMIT_SUBCOMMAND: &str = "procyon-lotor";
const REPO_USER_NAME: &str = "Icon Repo Server";
const REPO_USER_EMAIL: &str = "IconRepoServer@UIToolBox";
const FILE_MODE: u32 = 0o700;

/// Content store persisting iconfiles as commits in a git working tree.
#[derive(Debug)]
pub struct GitContentStore {
    location: PathBuf,
    simulate_commit_failure: AtomicBool,
}

impl GitContentStore {
    /// Creates a handle without touching the filesystem.
    ///
    /// Reads [`SIMULATE_COMMIT_FAILURE_ENV`] once.
    pub fn new(location: impl Into<PathBuf>) -> Self {
        let simulate = std::env::var(SIMULATE_COMMIT_FAILURE_ENV)
            .map(|value| value.trim().eq_ignore_ascii_case("true"))
            .unwrap_or(false);
        Self {
            location: location.into(),
            simulate_commit_failure: AtomicBool::new(simulate),
        }
    }

    /// Opens the store at `location`, creating and configuring a repository
    /// when none exists yet.
    ///
    /// # Errors
    /// - `location` exists and is not a directory.
    /// - Any bootstrap command fails.
    pub fn initialize(location: impl Into<PathBuf>) -> ContentResult<Self> {
        let store = Self::new(location);
        store
            .init_repository()
            .map_err(|source| ContentError::Init {
                location: store.location.clone(),
                source: Box::new(source),
            })?;
        Ok(store)
    }

    /// Makes every following commit fail until switched off again.
    pub fn set_simulated_commit_failure(&self, enabled: bool) {
        self.simulate_commit_failure.store(enabled, Ordering::SeqCst);
    }

    pub fn with_simulated_commit_failure(self, enabled: bool) -> Self {
        self.set_simulated_commit_failure(enabled);
        self
    }

    /// Absolute path of an iconfile in the working tree.
    pub fn absolute_path(&self, icon_name: &str, descriptor: &IconfileDescriptor) -> PathBuf {
        self.location.join(iconfile_path(icon_name, descriptor))
    }

    /// SHA of HEAD, or `None` before the first commit.
    pub fn head_commit(&self) -> ContentResult<Option<String>> {
        if self.commit_count()? == 0 {
            return Ok(None);
        }
        let sha = self.run_command(&["rev-parse", "HEAD"])?;
        Ok(Some(sha.trim().to_string()))
    }

    /// Number of commits reachable from any ref.
    pub fn commit_count(&self) -> ContentResult<usize> {
        let out = self.run_command(&["rev-list", "--all", "--count"])?;
        out.trim().parse::<usize>().map_err(|err| ContentError::Io {
            operation: "parse commit count",
            path: self.location.clone(),
            source: io::Error::new(io::ErrorKind::InvalidData, err),
        })
    }

    /// Porcelain status lines; empty when the working tree is clean.
    pub fn status(&self) -> ContentResult<Vec<String>> {
        let out = self.run_command(&["status", "--porcelain", "--untracked-files=all"])?;
        Ok(out
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(str::to_string)
            .collect())
    }

    /// Full message of the HEAD commit.
    pub fn last_commit_message(&self) -> ContentResult<String> {
        let out = self.run_command(&["log", "-1", "--format=%B"])?;
        Ok(out.trim_end().to_string())
    }

    /// Author line (`name <email>`) of the HEAD commit.
    pub fn last_commit_author(&self) -> ContentResult<String> {
        let out = self.run_command(&["log", "-1", "--format=%an <%ae>"])?;
        Ok(out.trim_end().to_string())
    }

    fn init_repository(&self) -> ContentResult<()> {
        match fs::metadata(&self.location) {
            Ok(meta) if !meta.is_dir() => {
                return Err(ContentError::NotADirectory(self.location.clone()));
            }
            Ok(_) if self.location.join(".git").is_dir() => {
                info!(
                    "event=content_init module=content status=ok mode=existing location={}",
                    self.location.display()
                );
                return Ok(());
            }
            Ok(_) => {}
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                create_private_dir_all(&self.location).map_err(|source| ContentError::Io {
                    operation: "create content store directory",
                    path: self.location.clone(),
                    source,
                })?;
            }
            Err(source) => {
                return Err(ContentError::Io {
                    operation: "inspect content store location",
                    path: self.location.clone(),
                    source,
                });
            }
        }

        for args in [
            vec!["init"],
            vec!["config", "user.name", REPO_USER_NAME],
            vec!["config", "user.email", REPO_USER_EMAIL],
            vec!["config", "commit.gpgsign", "false"],
        ] {
            self.run_command(&args)?;
        }

        info!(
            "event=content_init module=content status=ok mode=created location={}",
            self.location.display()
        );
        Ok(())
    }

    fn commit_subcommand(&self) -> &'static str {
        if self.simulate_commit_failure.load(Ordering::SeqCst) {
            SIMULATED_COMMIT_SUBCOMMAND
        } else {
            COMMIT_SUBCOMMAND
        }
    }
}

impl ContentStore for GitContentStore {
    fn location(&self) -> &Path {
        &self.location
    }

    fn write_file(&self, icon_name: &str, iconfile: &Iconfile) -> ContentResult<String> {
        let relative = iconfile_path(icon_name, &iconfile.descriptor());
        let target = self.location.join(&relative);
        if let Some(parent) = target.parent() {
            create_private_dir_all(parent).map_err(|source| ContentError::Io {
                operation: "create iconfile directory",
                path: parent.to_path_buf(),
                source,
            })?;
        }
        write_private_file(&target, &iconfile.content).map_err(|source| ContentError::Io {
            operation: "write iconfile",
            path: target.clone(),
            source,
        })?;
        Ok(relative)
    }

    fn remove_file(
        &self,
        icon_name: &str,
        descriptor: &IconfileDescriptor,
    ) -> ContentResult<String> {
        let relative = iconfile_path(icon_name, descriptor);
        let target = self.location.join(&relative);
        match fs::remove_file(&target) {
            Ok(()) => Ok(relative),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                Err(ContentError::IconfileNotFound {
                    icon_name: icon_name.to_string(),
                    descriptor: descriptor.clone(),
                })
            }
            Err(source) => Err(ContentError::Io {
                operation: "remove iconfile",
                path: target,
                source,
            }),
        }
    }

    fn stage_and_commit(
        &self,
        changed_paths: &[String],
        change: &ContentChange,
        author: &str,
    ) -> ContentResult<()> {
        let commit_err = |source: CommandError| ContentError::Commit {
            paths: changed_paths.to_vec(),
            source,
        };

        run_command(GIT, &["add", "-A"], &self.location).map_err(commit_err)?;

        let message = change.commit_message(changed_paths, author);
        let author_arg = format!("--author={}", commit_author(author));
        run_command(
            GIT,
            &[
                self.commit_subcommand(),
                "-m",
                message.as_str(),
                author_arg.as_str(),
            ],
            &self.location,
        )
        .map_err(commit_err)?;
        Ok(())
    }

    fn rollback(&self) {
        let has_head = matches!(self.commit_count(), Ok(count) if count > 0);
        let reset: &[&str] = if has_head {
            &["reset", "--hard", "HEAD"]
        } else {
            // Unborn HEAD: nothing to reset to, only the index to clear.
            &["read-tree", "--empty"]
        };
        let clean: &[&str] = &["clean", "-qfdx"];

        for args in [reset, clean] {
            if let Err(err) = self.run_command(args) {
                warn!(
                    "event=content_rollback module=content status=error args={:?} error={}",
                    args, err
                );
            }
        }
        info!(
            "event=content_rollback module=content status=done location={}",
            self.location.display()
        );
    }

    fn run_command(&self, args: &[&str]) -> ContentResult<String> {
        Ok(run_command(GIT, args, &self.location)?)
    }
}

#[cfg(unix)]
fn create_private_dir_all(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::DirBuilderExt;
    fs::DirBuilder::new()
        .recursive(true)
        .mode(FILE_MODE)
        .create(path)
}

#[cfg(not(unix))]
fn create_private_dir_all(path: &Path) -> io::Result<()> {
    fs::create_dir_all(path)
}

#[cfg(unix)]
fn write_private_file(path: &Path, content: &[u8]) -> io::Result<()> {
    use std::os::unix::fs::OpenOptionsExt;
    let mut file = fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(FILE_MODE)
        .open(path)?;
    file.write_all(content)?;
    file.sync_all()
}

#[cfg(not(unix))]
fn write_private_file(path: &Path, content: &[u8]) -> io::Result<()> {
    let mut file = fs::File::create(path)?;
    file.write_all(content)?;
    file.sync_all()
}
