//! Artifact staging and upload with bounded retries.
//!
//! ## Upload protocol (per attempt, up to `RetryPolicy::count`)
//!
//! 1. Delete any target asset already carrying the name.
//! 2. Upload the staged file.
//! 3. Success → return the uploaded descriptor.
//! 4. Name conflict → delete the clashing asset, next attempt immediately.
//! 5. Other failure → wait `RetryPolicy::delay`, next attempt.

use std::io::ErrorKind as IoErrorKind;
use std::path::{Path, PathBuf};

use relmirror_core::{AssetDescriptor, RetryPolicy, TargetRelease, STAGING_PREFIX};

use crate::api::{Clock, Downloader, TargetRepository};
use crate::error::{ApiError, MirrorError};

// ---------------------------------------------------------------------------
// Staging
// ---------------------------------------------------------------------------

/// A downloaded artifact on local disk. Removed when dropped.
#[derive(Debug)]
pub struct StagedFile {
    path: PathBuf,
}

impl StagedFile {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => tracing::debug!(path = %self.path.display(), "removed staged file"),
            Err(err) if err.kind() == IoErrorKind::NotFound => {}
            Err(err) => {
                tracing::warn!(path = %self.path.display(), error = %err, "could not remove staged file")
            }
        }
    }
}

/// Fetch `url` into `path`, reusing a file left there by an earlier run.
pub fn stage(
    downloader: &dyn Downloader,
    url: &str,
    path: PathBuf,
) -> Result<StagedFile, MirrorError> {
    if path.exists() {
        tracing::info!(path = %path.display(), "staged file already present, skipping download");
        return Ok(StagedFile { path });
    }

    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).map_err(|source| MirrorError::Download {
            url: url.to_string(),
            source: ApiError::Io {
                path: dir.to_path_buf(),
                source,
            },
        })?;
    }

    tracing::info!(url, "downloading");
    match downloader.download(url, &path) {
        Ok(bytes) => {
            tracing::info!(path = %path.display(), bytes, "download complete");
            Ok(StagedFile { path })
        }
        Err(source) => {
            // A partial file must not be mistaken for a resumable one next run.
            match std::fs::remove_file(&path) {
                Ok(()) => {}
                Err(err) if err.kind() == IoErrorKind::NotFound => {}
                Err(err) => tracing::warn!(
                    path = %path.display(),
                    error = %err,
                    "could not remove partial download"
                ),
            }
            tracing::warn!(url, error = %source, "download failed");
            Err(MirrorError::Download {
                url: url.to_string(),
                source,
            })
        }
    }
}

/// Remove every `temp_*` file in `dir`. Returns how many were removed.
pub fn cleanup_staging(dir: &Path) -> usize {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == IoErrorKind::NotFound => return 0,
        Err(err) => {
            tracing::warn!(dir = %dir.display(), error = %err, "cannot scan staging directory");
            return 0;
        }
    };

    let mut removed = 0;
    for entry in entries.filter_map(Result::ok) {
        let name = entry.file_name();
        let is_staged = name.to_string_lossy().starts_with(STAGING_PREFIX);
        if !is_staged || !entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
            continue;
        }
        match std::fs::remove_file(entry.path()) {
            Ok(()) => removed += 1,
            Err(err) => {
                tracing::warn!(path = %entry.path().display(), error = %err, "could not remove leftover staging file")
            }
        }
    }
    if removed > 0 {
        tracing::info!(removed, "cleaned leftover staging files");
    }
    removed
}

/// Sweeps the staging directory when dropped, however the run ends.
#[derive(Debug)]
pub struct StagingSweep {
    dir: PathBuf,
}

impl StagingSweep {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl Drop for StagingSweep {
    fn drop(&mut self) {
        cleanup_staging(&self.dir);
    }
}

// ---------------------------------------------------------------------------
// Upload
// ---------------------------------------------------------------------------

/// Uploads staged files to one target repository.
pub struct Uploader<'a> {
    target: &'a dyn TargetRepository,
    retry: RetryPolicy,
    clock: &'a dyn Clock,
}

impl<'a> Uploader<'a> {
    pub fn new(target: &'a dyn TargetRepository, retry: RetryPolicy, clock: &'a dyn Clock) -> Self {
        Self {
            target,
            retry,
            clock,
        }
    }

    /// Delete every asset named `name` on `release`. Absence is not an error;
    /// failures are logged and reported as `false`.
    pub fn delete_existing(&self, release: &TargetRelease, name: &str) -> bool {
        let assets = match self.target.list_assets(release) {
            Ok(assets) => assets,
            Err(err) => {
                tracing::warn!(asset = name, error = %err, "could not list target assets before delete");
                return false;
            }
        };

        let mut ok = true;
        for asset in assets.iter().filter(|a| a.name == name) {
            tracing::info!(asset = name, "deleting existing target asset");
            if let Err(err) = self.target.delete_asset(release, asset) {
                tracing::warn!(asset = name, error = %err, "delete failed");
                ok = false;
            }
        }
        ok
    }

    /// Upload `path` as `name`, retrying per the policy.
    pub fn upload(
        &self,
        release: &TargetRelease,
        path: &Path,
        name: &str,
        content_type: &str,
    ) -> Result<AssetDescriptor, MirrorError> {
        let attempts = self.retry.count.max(1);
        let mut last_err: Option<ApiError> = None;

        for attempt in 1..=attempts {
            self.delete_existing(release, name);
            tracing::info!(asset = name, attempt, of = attempts, "uploading");

            match self.target.upload_asset(release, path, name, content_type) {
                Ok(uploaded) => return Ok(uploaded),
                Err(err) if err.is_conflict() => {
                    tracing::warn!(asset = name, attempt, "name conflict, deleting and retrying");
                    self.delete_existing(release, name);
                    last_err = Some(err);
                }
                Err(err) => {
                    let is_last = attempt == attempts;
                    if is_last {
                        tracing::warn!(asset = name, attempt, error = %err, "upload failed");
                    } else {
                        tracing::warn!(
                            asset = name,
                            attempt,
                            error = %err,
                            "upload failed, retrying in {}s",
                            self.retry.delay.as_secs()
                        );
                        self.clock.sleep(self.retry.delay);
                    }
                    last_err = Some(err);
                }
            }
        }

        tracing::error!(asset = name, attempts, "upload retries exhausted, giving up");
        Err(MirrorError::UploadExhausted {
            name: name.to_string(),
            attempts,
            last: last_err.unwrap_or_else(|| ApiError::Transport("no upload attempted".into())),
        })
    }
}
