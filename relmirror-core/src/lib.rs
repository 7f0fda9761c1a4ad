//! relmirror core library: domain types, sync ledger persistence, config.
//!
//! - [`types`]: descriptors and the [`AssetKey`] identity
//! - [`ledger`]: [`SyncLedger`] and its backup-protected [`LedgerStore`]
//! - [`config`]: [`MirrorConfig`] and [`RetryPolicy`]
//! - [`error`]: [`LedgerError`], [`ConfigError`]

pub mod config;
pub mod error;
pub mod ledger;
pub mod types;

pub use config::{MirrorConfig, RetryPolicy, STAGING_PREFIX};
pub use error::{ConfigError, LedgerError};
pub use ledger::{LedgerStore, LedgerTotals, LoadSource, SyncLedger};
pub use types::{
    ArchiveKind, AssetDescriptor, AssetKey, NewRelease, ReleaseDescriptor, RepoSlug,
    TargetRelease,
};
