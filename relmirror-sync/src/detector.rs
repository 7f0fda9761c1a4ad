//! Per-artifact change detection.
//!
//! Signal precedence for binary assets (first match wins):
//! 1. `NotRecorded` (no ledger entry for the name+size identity)
//! 2. `MissingFromTarget` (no target asset with that name)
//! 3. `SizeMismatch` (source and target sizes differ)
//! 4. `SourceNewer` (both timestamps known, source strictly later)
//! 5. `Current`
//!
//! Source archives only check presence by filename; a cut tag's archive is
//! treated as immutable.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use relmirror_core::{ledger::AssetEntry, AssetDescriptor};

/// Sync decision for one binary asset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeSignal {
    NotRecorded,
    MissingFromTarget,
    SizeMismatch { source: u64, target: u64 },
    SourceNewer {
        source: DateTime<Utc>,
        target: DateTime<Utc>,
    },
    Current,
}

impl ChangeSignal {
    pub fn needs_sync(&self) -> bool {
        !matches!(self, ChangeSignal::Current)
    }

    /// Human-readable reason, used in progress logs.
    pub fn reason(&self) -> String {
        match self {
            ChangeSignal::NotRecorded => "not recorded locally".to_string(),
            ChangeSignal::MissingFromTarget => "missing from target".to_string(),
            ChangeSignal::SizeMismatch { source, target } => {
                format!("size mismatch (source={source}B target={target}B)")
            }
            ChangeSignal::SourceNewer { source, target } => format!(
                "source newer (source={} target={})",
                source.to_rfc3339(),
                target.to_rfc3339()
            ),
            ChangeSignal::Current => "up to date".to_string(),
        }
    }
}

/// Decide whether `source` must be re-mirrored.
///
/// `recorded` is the ledger entry for `source.key()`; `target` is the live
/// target asset with the same name, if any.
pub fn check_asset(
    source: &AssetDescriptor,
    recorded: Option<&AssetEntry>,
    target: Option<&AssetDescriptor>,
) -> ChangeSignal {
    if recorded.is_none() {
        return ChangeSignal::NotRecorded;
    }
    let Some(target) = target else {
        return ChangeSignal::MissingFromTarget;
    };
    if source.size != target.size {
        return ChangeSignal::SizeMismatch {
            source: source.size,
            target: target.size,
        };
    }
    if let (Some(src), Some(dst)) = (source.updated_at, target.updated_at) {
        if src > dst {
            return ChangeSignal::SourceNewer {
                source: src,
                target: dst,
            };
        }
    }
    ChangeSignal::Current
}

/// Presence of a generated source archive on the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveSignal {
    Present,
    Missing,
}

pub fn check_archive(filename: &str, target: &TargetIndex<'_>) -> ArchiveSignal {
    if target.get(filename).is_some() {
        ArchiveSignal::Present
    } else {
        ArchiveSignal::Missing
    }
}

/// Live target assets keyed by name.
#[derive(Debug, Default)]
pub struct TargetIndex<'a> {
    by_name: HashMap<&'a str, &'a AssetDescriptor>,
}

impl<'a> TargetIndex<'a> {
    pub fn new(assets: &'a [AssetDescriptor]) -> Self {
        Self {
            by_name: assets.iter().map(|a| (a.name.as_str(), a)).collect(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&'a AssetDescriptor> {
        self.by_name.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}
