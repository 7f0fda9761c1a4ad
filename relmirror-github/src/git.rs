//! Commits the ledger back into the working tree's repository.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use relmirror_sync::{CommitError, CommitOutcome, LedgerCommitter};

pub const BOT_NAME: &str = "github-actions[bot]";
pub const BOT_EMAIL: &str = "github-actions[bot]@users.noreply.github.com";

/// Drives the `git` executable in `workdir`.
#[derive(Debug, Clone)]
pub struct GitCommitter {
    workdir: PathBuf,
    user_name: String,
    user_email: String,
    push: bool,
}

impl GitCommitter {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
            user_name: BOT_NAME.to_string(),
            user_email: BOT_EMAIL.to_string(),
            push: true,
        }
    }

    pub fn with_identity(mut self, name: impl Into<String>, email: impl Into<String>) -> Self {
        self.user_name = name.into();
        self.user_email = email.into();
        self
    }

    /// Skip `git push`; the commit stays local.
    pub fn without_push(mut self) -> Self {
        self.push = false;
        self
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    fn git<I, S>(&self, step: &str, args: I) -> Result<Output, CommitError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<std::ffi::OsStr>,
    {
        let output = Command::new("git")
            .current_dir(&self.workdir)
            .args(args)
            .output()
            .map_err(|e| CommitError {
                step: step.to_string(),
                message: e.to_string(),
            })?;
        if !output.status.success() {
            return Err(CommitError {
                step: step.to_string(),
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(output)
    }

    /// Paths that exist, made relative to the working tree when possible.
    fn tracked_paths(&self, paths: &[PathBuf]) -> Vec<PathBuf> {
        paths
            .iter()
            .filter(|p| self.workdir.join(p).exists())
            .map(|p| p.strip_prefix(&self.workdir).unwrap_or(p).to_path_buf())
            .collect()
    }
}

pub fn commit_message(marker: &str) -> String {
    format!("sync ledger: release {marker} updated")
}

impl LedgerCommitter for GitCommitter {
    fn commit(&self, paths: &[PathBuf], marker: &str) -> Result<CommitOutcome, CommitError> {
        let paths = self.tracked_paths(paths);
        if paths.is_empty() {
            return Ok(CommitOutcome::Unchanged);
        }

        self.git("git config user.email", ["config", "user.email", self.user_email.as_str()])?;
        self.git("git config user.name", ["config", "user.name", self.user_name.as_str()])?;

        let mut status_args: Vec<std::ffi::OsString> = vec!["status".into(), "--porcelain".into(), "--".into()];
        status_args.extend(paths.iter().map(|p| p.as_os_str().to_os_string()));
        let status = self.git("git status", &status_args)?;
        if String::from_utf8_lossy(&status.stdout).trim().is_empty() {
            tracing::debug!(marker, "ledger files clean in git");
            return Ok(CommitOutcome::Unchanged);
        }

        let mut add_args: Vec<std::ffi::OsString> = vec!["add".into(), "--".into()];
        add_args.extend(paths.iter().map(|p| p.as_os_str().to_os_string()));
        self.git("git add", &add_args)?;
        self.git("git commit", ["commit", "-m", commit_message(marker).as_str()])?;
        tracing::info!(marker, "ledger committed");

        if self.push {
            self.git("git push", ["push"])?;
            tracing::info!(marker, "ledger pushed");
        }
        Ok(CommitOutcome::Committed)
    }
}
