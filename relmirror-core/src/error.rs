//! Error types for relmirror-core.

use std::path::PathBuf;

use thiserror::Error;

/// Errors from persisting the sync ledger.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// JSON serialization error on the write path.
    #[error("ledger JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// JSON parse error on load, with the file that failed.
    #[error("failed to parse ledger at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Invalid mirror configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid repository '{0}'; expected owner/name")]
    InvalidRepo(String),

    #[error("retry count must be at least 1")]
    ZeroRetries,

    #[error("missing required setting: {0}")]
    Missing(&'static str),
}

/// Convenience constructor for [`LedgerError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> LedgerError {
    LedgerError::Io {
        path: path.into(),
        source,
    }
}
