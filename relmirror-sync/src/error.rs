//! Error types for relmirror-sync.
//!
//! Every [`MirrorError`] carries an [`ErrorKind`] so callers decide between
//! retry, skip, and abort without inspecting message text.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use relmirror_core::LedgerError;

/// Failures reported by a hosting API, downloader, or uploader.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Upload rejected because an asset with the same name already exists.
    #[error("asset '{name}' already exists on the target")]
    Conflict { name: String },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("HTTP {status}: {message}")]
    Status { status: u16, message: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("failed to decode response: {0}")]
    Decode(String),

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ApiError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, ApiError::Conflict { .. })
    }
}

/// Failure of the external "commit the ledger" step.
#[derive(Debug, Error)]
#[error("{step} failed: {message}")]
pub struct CommitError {
    pub step: String,
    pub message: String,
}

/// Failure taxonomy, ordered from narrowest to widest scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Network or server failure while moving bytes; retried, then the
    /// artifact is abandoned for this run.
    TransientTransfer,
    /// Duplicate asset name on upload; resolved by delete-and-retry.
    NamingConflict,
    /// Tag or release could not be created; the release is skipped.
    ReleaseProvisioning,
    /// Ledger write or ledger commit failed; the run continues.
    Persistence,
    /// Anything else; ends the run without panicking.
    FatalUnexpected,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ErrorKind::TransientTransfer => "transient-transfer",
            ErrorKind::NamingConflict => "naming-conflict",
            ErrorKind::ReleaseProvisioning => "release-provisioning",
            ErrorKind::Persistence => "persistence",
            ErrorKind::FatalUnexpected => "fatal-unexpected",
        })
    }
}

/// All errors that can arise while mirroring.
#[derive(Debug, Error)]
pub enum MirrorError {
    #[error("download of {url} failed: {source}")]
    Download {
        url: String,
        #[source]
        source: ApiError,
    },

    #[error("upload of '{name}' gave up after {attempts} attempt(s): {last}")]
    UploadExhausted {
        name: String,
        attempts: u32,
        #[source]
        last: ApiError,
    },

    #[error("could not list {what}: {source}")]
    Listing {
        what: String,
        #[source]
        source: ApiError,
    },

    #[error("could not provision release {tag}: {source}")]
    Provision {
        tag: String,
        #[source]
        source: ApiError,
    },

    #[error("ledger persistence failed: {0}")]
    Ledger(#[from] LedgerError),

    #[error("ledger commit failed: {0}")]
    Commit(#[from] CommitError),

    #[error("{context}: {source}")]
    Unexpected {
        context: String,
        #[source]
        source: ApiError,
    },
}

impl MirrorError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            MirrorError::Download { .. } | MirrorError::Listing { .. } => {
                ErrorKind::TransientTransfer
            }
            MirrorError::UploadExhausted { last, .. } if last.is_conflict() => {
                ErrorKind::NamingConflict
            }
            MirrorError::UploadExhausted { .. } => ErrorKind::TransientTransfer,
            MirrorError::Provision { .. } => ErrorKind::ReleaseProvisioning,
            MirrorError::Ledger(_) | MirrorError::Commit(_) => ErrorKind::Persistence,
            MirrorError::Unexpected { .. } => ErrorKind::FatalUnexpected,
        }
    }
}
