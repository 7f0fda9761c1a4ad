//! # relmirror-sync
//!
//! The mirroring engine: change detection, staged transfers with bounded
//! retries, and the per-release orchestrator.
//!
//! Call [`pipeline::run`] with a [`MirrorConfig`](relmirror_core::MirrorConfig)
//! and a set of [`Collaborators`] to mirror every source release once.

pub mod api;
pub mod detector;
pub mod error;
pub mod mirror;
pub mod pipeline;
pub mod transfer;

pub use api::{
    Clock, Collaborators, CommitOutcome, Downloader, LedgerCommitter, SourceRepository,
    SystemClock, TargetRepository,
};
pub use detector::{check_archive, check_asset, ArchiveSignal, ChangeSignal, TargetIndex};
pub use error::{ApiError, CommitError, ErrorKind, MirrorError};
pub use mirror::{ArtifactTally, CommitStatus, ReleaseMirror, ReleaseOutcome, ReleasePhase, RunReport};
pub use transfer::{cleanup_staging, stage, StagedFile, StagingSweep, Uploader};
