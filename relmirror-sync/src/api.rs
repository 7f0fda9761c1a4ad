//! Collaborator seams consumed by the mirroring engine.
//!
//! The engine only talks to hosting platforms, the network, version control,
//! and wall-clock time through these traits. `relmirror-github` provides the
//! production implementations; tests substitute in-memory fakes.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};

use relmirror_core::{
    ArchiveKind, AssetDescriptor, NewRelease, ReleaseDescriptor, TargetRelease,
};

use crate::error::{ApiError, CommitError};

/// Read-only view of the repository being mirrored.
pub trait SourceRepository {
    fn list_releases(&self) -> Result<Vec<ReleaseDescriptor>, ApiError>;

    fn list_assets(&self, release: &ReleaseDescriptor) -> Result<Vec<AssetDescriptor>, ApiError>;

    /// Download locator for a generated source archive of `tag`.
    fn archive_url(&self, tag: &str, kind: ArchiveKind) -> String;
}

/// Writable view of the mirror destination.
pub trait TargetRepository {
    fn list_releases(&self) -> Result<Vec<TargetRelease>, ApiError>;

    fn tag_exists(&self, tag: &str) -> Result<bool, ApiError>;

    /// Commit sha at the tip of the default branch.
    fn default_branch_tip(&self) -> Result<String, ApiError>;

    fn create_tag(&self, tag: &str, sha: &str) -> Result<(), ApiError>;

    fn create_release(&self, release: &NewRelease) -> Result<TargetRelease, ApiError>;

    fn list_assets(&self, release: &TargetRelease) -> Result<Vec<AssetDescriptor>, ApiError>;

    fn delete_asset(&self, release: &TargetRelease, asset: &AssetDescriptor)
        -> Result<(), ApiError>;

    /// Upload `path` as a new asset. A duplicate name must surface as
    /// [`ApiError::Conflict`].
    fn upload_asset(
        &self,
        release: &TargetRelease,
        path: &Path,
        name: &str,
        content_type: &str,
    ) -> Result<AssetDescriptor, ApiError>;
}

/// Streamed URL → file download. Returns the number of bytes written.
pub trait Downloader {
    fn download(&self, url: &str, dest: &Path) -> Result<u64, ApiError>;
}

/// Result of asking version control to record the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    Committed,
    /// The working tree showed no change for the ledger paths.
    Unchanged,
}

/// Persists the ledger files into a tracked repository.
pub trait LedgerCommitter {
    /// `marker` is a human-readable label (the release tag).
    fn commit(&self, paths: &[PathBuf], marker: &str) -> Result<CommitOutcome, CommitError>;
}

/// Wall-clock time and blocking waits.
pub trait Clock {
    fn now(&self) -> DateTime<Utc>;
    fn sleep(&self, duration: Duration);
}

/// Real time, real sleeping.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            std::thread::sleep(duration);
        }
    }
}

/// The set of collaborators one run uses.
#[derive(Clone, Copy)]
pub struct Collaborators<'a> {
    pub source: &'a dyn SourceRepository,
    pub target: &'a dyn TargetRepository,
    pub downloader: &'a dyn Downloader,
    /// `None` disables the external ledger commit.
    pub committer: Option<&'a dyn LedgerCommitter>,
    pub clock: &'a dyn Clock,
}
