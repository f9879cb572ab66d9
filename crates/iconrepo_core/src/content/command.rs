//! External command execution.
//!
//! Every content-store operation that touches history is built on
//! [`run_command`]. Output is captured; stderr is kept only for errors.

use log::debug;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};
use std::time::Instant;
use thiserror::Error;

/// Failure to run an external command or a non-zero exit.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("failed to spawn `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("`{program} {args}` exited with {status} in {}: {stderr}", .cwd.display())]
    Failed {
        program: String,
        args: String,
        cwd: PathBuf,
        status: ExitStatus,
        stderr: String,
    },
}

impl CommandError {
    /// Returns the exit code when the command ran and failed.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Self::Failed { status, .. } => status.code(),
            Self::Spawn { .. } => None,
        }
    }
}

/// Runs `program args..` inside `cwd` and returns captured stdout.
pub fn run_command(program: &str, args: &[&str], cwd: &Path) -> Result<String, CommandError> {
    let started_at = Instant::now();
    let output = Command::new(program)
        .args(args)
        .current_dir(cwd)
        .output()
        .map_err(|source| CommandError::Spawn {
            program: program.to_string(),
            source,
        })?;

    debug!(
        "event=command_run module=content program={} args={:?} exit={:?} duration_ms={}",
        program,
        args,
        output.status.code(),
        started_at.elapsed().as_millis()
    );

    if !output.status.success() {
        return Err(CommandError::Failed {
            program: program.to_string(),
            args: args.join(" "),
            cwd: cwd.to_path_buf(),
            status: output.status,
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

#[cfg(test)]
mod tests {
    use super::{run_command, CommandError};

    #[test]
    fn captures_stdout_of_successful_command() {
        let dir = tempfile::tempdir().unwrap();
        let out = run_command("git", &["--version"], dir.path()).unwrap();
        assert!(out.starts_with("git version"));
    }

    #[test]
    fn reports_non_zero_exit_with_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let err = run_command("git", &["procyon-lotor"], dir.path()).unwrap_err();
        match &err {
            CommandError::Failed { stderr, .. } => assert!(!stderr.is_empty()),
            other => panic!("unexpected error: {other}"),
        }
        assert!(err.exit_code().is_some());
    }

    #[test]
    fn reports_missing_program_as_spawn_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = run_command("iconrepo-no-such-binary", &[], dir.path()).unwrap_err();
        assert!(matches!(err, CommandError::Spawn { .. }));
    }
}
