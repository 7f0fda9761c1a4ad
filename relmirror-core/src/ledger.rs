//! Sync ledger, the persisted record of what has been mirrored.
//!
//! # Storage layout
//!
//! ```text
//! <ledger>        primary JSON document
//! <ledger>.bak    previous primary, rotated on every save
//! <ledger>.tmp    in-flight write, never left behind
//! ```
//!
//! Loading never fails: a corrupt primary falls back to the backup, and a
//! corrupt backup falls back to an empty ledger. An empty ledger only means
//! "nothing recorded yet", which the change detector treats as "needs sync".

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{io_err, LedgerError};
use crate::types::{AssetDescriptor, AssetKey};

// ---------------------------------------------------------------------------
// Ledger document
// ---------------------------------------------------------------------------

/// A release whose artifacts have all been evaluated at least once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseEntry {
    pub tag_name: String,
    #[serde(deserialize_with = "timestamp::deserialize")]
    pub fully_synced_at: DateTime<Utc>,
}

/// A binary asset recorded after a successful upload.
///
/// `size` and `updated_at` describe the uploaded target copy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetEntry {
    pub name: String,
    pub size: u64,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(deserialize_with = "timestamp::deserialize")]
    pub synced_at: DateTime<Utc>,
}

/// A generated source archive known to exist on the target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceCodeEntry {
    pub exists: bool,
    #[serde(deserialize_with = "timestamp::deserialize")]
    pub synced_at: DateTime<Utc>,
}

/// Sync stamps are written as RFC 3339, but ledgers produced by earlier
/// mirror scripts carry naive local `YYYY-MM-DD HH:MM:SS[.ffffff]` strings.
/// Those are read as UTC so a legacy ledger is still honoured.
mod timestamp {
    use super::*;

    pub(super) fn parse(raw: &str) -> Option<DateTime<Utc>> {
        let raw = raw.trim();
        if let Ok(at) = DateTime::parse_from_rfc3339(raw) {
            return Some(at.with_timezone(&Utc));
        }
        NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f")
            .ok()
            .map(|naive| Utc.from_utc_datetime(&naive))
    }

    pub(super) fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        parse(&raw)
            .ok_or_else(|| serde::de::Error::custom(format!("unrecognised timestamp '{raw}'")))
    }
}

/// Release id → asset key → entry.
pub type AssetMap = BTreeMap<String, BTreeMap<AssetKey, AssetEntry>>;

/// Tag → archive filename → entry.
pub type SourceCodeMap = BTreeMap<String, BTreeMap<String, SourceCodeEntry>>;

/// On-disk ledger payload. Every mapping defaults to empty so hand-trimmed
/// documents still load.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncLedger {
    #[serde(default)]
    pub releases: BTreeMap<String, ReleaseEntry>,
    #[serde(default)]
    pub assets: AssetMap,
    #[serde(default)]
    pub source_codes: SourceCodeMap,
}

impl SyncLedger {
    pub fn asset_entry(&self, release_id: &str, key: &AssetKey) -> Option<&AssetEntry> {
        self.assets.get(release_id).and_then(|m| m.get(key))
    }

    /// Record a successful upload under the *source* identity `key`, with the
    /// uploaded descriptor's size and timestamp.
    pub fn record_asset(
        &mut self,
        release_id: &str,
        key: AssetKey,
        uploaded: &AssetDescriptor,
        now: DateTime<Utc>,
    ) {
        self.assets.entry(release_id.to_string()).or_default().insert(
            key,
            AssetEntry {
                name: uploaded.name.clone(),
                size: uploaded.size,
                updated_at: uploaded.updated_at,
                synced_at: now,
            },
        );
    }

    pub fn has_source_code(&self, tag: &str, filename: &str) -> bool {
        self.source_codes
            .get(tag)
            .is_some_and(|m| m.contains_key(filename))
    }

    pub fn record_source_code(&mut self, tag: &str, filename: &str, now: DateTime<Utc>) {
        self.source_codes.entry(tag.to_string()).or_default().insert(
            filename.to_string(),
            SourceCodeEntry {
                exists: true,
                synced_at: now,
            },
        );
    }

    pub fn mark_release_synced(&mut self, release_id: &str, tag: &str, now: DateTime<Utc>) {
        self.releases.insert(
            release_id.to_string(),
            ReleaseEntry {
                tag_name: tag.to_string(),
                fully_synced_at: now,
            },
        );
    }

    pub fn totals(&self) -> LedgerTotals {
        LedgerTotals {
            releases: self.releases.len(),
            assets: self.assets.values().map(BTreeMap::len).sum(),
            source_codes: self.source_codes.values().map(BTreeMap::len).sum(),
        }
    }
}

/// Entry counts across the three mappings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LedgerTotals {
    pub releases: usize,
    pub assets: usize,
    pub source_codes: usize,
}

// ---------------------------------------------------------------------------
// State store
// ---------------------------------------------------------------------------

/// Where a loaded ledger came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadSource {
    Primary,
    Backup,
    Fresh,
}

/// File-backed ledger store with backup rotation.
#[derive(Debug, Clone)]
pub struct LedgerStore {
    path: PathBuf,
}

impl LedgerStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `<ledger>.bak`
    pub fn backup_path(&self) -> PathBuf {
        suffixed(&self.path, "bak")
    }

    /// `<ledger>.tmp`
    pub fn tmp_path(&self) -> PathBuf {
        suffixed(&self.path, "tmp")
    }

    /// Load the ledger, degrading to the backup and then to an empty ledger.
    pub fn load(&self) -> SyncLedger {
        self.load_with_source().0
    }

    /// Like [`load`](Self::load) but also reports which file was used.
    pub fn load_with_source(&self) -> (SyncLedger, LoadSource) {
        match read_ledger(&self.path) {
            Ok(Some(ledger)) => return (ledger, LoadSource::Primary),
            Ok(None) => {
                tracing::debug!(path = %self.path.display(), "no ledger file yet");
            }
            Err(err) => {
                tracing::warn!(error = %err, "primary ledger unreadable, trying backup");
            }
        }

        let backup = self.backup_path();
        match read_ledger(&backup) {
            Ok(Some(ledger)) => {
                tracing::info!(path = %backup.display(), "restored ledger from backup");
                (ledger, LoadSource::Backup)
            }
            Ok(None) => (SyncLedger::default(), LoadSource::Fresh),
            Err(err) => {
                tracing::warn!(error = %err, "backup ledger unreadable too, starting empty");
                (SyncLedger::default(), LoadSource::Fresh)
            }
        }
    }

    /// Persist `ledger` atomically.
    ///
    /// Writes `<ledger>.tmp`, rotates the current primary to `<ledger>.bak`,
    /// then renames the temp file onto the primary path. On failure the temp
    /// file is removed and the error is logged before being returned.
    pub fn save(&self, ledger: &SyncLedger) -> Result<(), LedgerError> {
        let tmp = self.tmp_path();
        let result = self.save_via(ledger, &tmp);
        match &result {
            Ok(()) => tracing::debug!(path = %self.path.display(), "ledger saved (with backup)"),
            Err(err) => {
                if let Err(rm) = std::fs::remove_file(&tmp) {
                    if rm.kind() != ErrorKind::NotFound {
                        tracing::warn!(path = %tmp.display(), error = %rm, "could not remove temp ledger");
                    }
                }
                tracing::error!(error = %err, "failed to save ledger");
            }
        }
        result
    }

    fn save_via(&self, ledger: &SyncLedger, tmp: &Path) -> Result<(), LedgerError> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;
        }

        let json = serde_json::to_string_pretty(ledger)?;
        std::fs::write(tmp, json).map_err(|e| io_err(tmp, e))?;

        if self.path.exists() {
            let backup = self.backup_path();
            std::fs::rename(&self.path, &backup).map_err(|e| io_err(&backup, e))?;
        }
        std::fs::rename(tmp, &self.path).map_err(|e| io_err(&self.path, e))?;
        Ok(())
    }
}

/// `Ok(None)` when the file does not exist.
fn read_ledger(path: &Path) -> Result<Option<SyncLedger>, LedgerError> {
    let contents = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(io_err(path, err)),
    };
    serde_json::from_str(&contents)
        .map(Some)
        .map_err(|source| LedgerError::Parse {
            path: path.to_path_buf(),
            source,
        })
}

fn suffixed(path: &Path, suffix: &str) -> PathBuf {
    let mut os = path.as_os_str().to_owned();
    os.push(".");
    os.push(suffix);
    PathBuf::from(os)
}
