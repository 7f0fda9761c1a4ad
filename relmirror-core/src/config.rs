//! Mirror configuration, built once at startup and passed by reference.
//!
//! Nothing in the engine reads the process environment; the binary resolves
//! flags and environment variables into a [`MirrorConfig`] up front.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;
use crate::ledger::LedgerStore;
use crate::types::RepoSlug;

pub const DEFAULT_LEDGER_FILE: &str = "synced_data.json";
pub const DEFAULT_RETRY_COUNT: u32 = 3;
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(10);

/// Bounded, fixed-delay retry policy for uploads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total upload attempts per artifact (not retries after the first).
    pub count: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            count: DEFAULT_RETRY_COUNT,
            delay: DEFAULT_RETRY_DELAY,
        }
    }
}

impl RetryPolicy {
    pub fn new(count: u32, delay: Duration) -> Result<Self, ConfigError> {
        if count == 0 {
            return Err(ConfigError::ZeroRetries);
        }
        Ok(Self { count, delay })
    }
}

/// Everything the engine needs to know about a run.
#[derive(Debug, Clone)]
pub struct MirrorConfig {
    pub source: RepoSlug,
    pub target: RepoSlug,
    pub ledger_path: PathBuf,
    /// Directory holding `temp_*` staging files.
    pub staging_dir: PathBuf,
    pub retry: RetryPolicy,
    /// Commit the ledger to version control after releases that changed.
    pub commit_ledger: bool,
}

impl MirrorConfig {
    pub fn new(source: RepoSlug, target: RepoSlug) -> Self {
        Self {
            source,
            target,
            ledger_path: PathBuf::from(DEFAULT_LEDGER_FILE),
            staging_dir: PathBuf::from("."),
            retry: RetryPolicy::default(),
            commit_ledger: true,
        }
    }

    pub fn with_ledger_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.ledger_path = path.into();
        self
    }

    pub fn with_staging_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.staging_dir = dir.into();
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_commit_ledger(mut self, commit: bool) -> Self {
        self.commit_ledger = commit;
        self
    }

    pub fn ledger_store(&self) -> LedgerStore {
        LedgerStore::new(&self.ledger_path)
    }

    /// Staging path for an artifact; all staging files share the `temp_` prefix.
    /// Path separators in the stem (tags like `release/1.0`) are flattened so
    /// every staging file sits directly in the staging directory.
    pub fn staging_path(&self, file_stem: &str) -> PathBuf {
        staging_path_in(&self.staging_dir, file_stem)
    }
}

pub(crate) fn staging_path_in(dir: &Path, file_stem: &str) -> PathBuf {
    let flat = file_stem.replace(&['/', '\\'][..], "_");
    dir.join(format!("{STAGING_PREFIX}{flat}"))
}

pub const STAGING_PREFIX: &str = "temp_";
