//! Release mirror orchestration.
//!
//! ## Per-release phases
//!
//! 1. `Located`: source release picked up (oldest first).
//! 2. `ReleaseReady`: matching target release found or created.
//! 3. `ArtifactsEvaluated`: source archives, then binary assets, checked and
//!    transferred where needed; the ledger is saved after every transfer.
//! 4. `Committed` when anything was transferred, otherwise `SkippedNoChange`.
//!
//! A release whose target cannot be provisioned ends as `Abandoned` and the
//! run moves on to the next one.

use relmirror_core::{
    ArchiveKind, AssetDescriptor, LedgerStore, LedgerTotals, MirrorConfig, NewRelease,
    ReleaseDescriptor, SyncLedger, TargetRelease,
};

use crate::api::{Collaborators, CommitOutcome};
use crate::detector::{check_archive, check_asset, ArchiveSignal, TargetIndex};
use crate::error::{ErrorKind, MirrorError};
use crate::transfer::{stage, Uploader};

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleasePhase {
    Located,
    ReleaseReady,
    ArtifactsEvaluated,
    Committed,
    SkippedNoChange,
    Abandoned,
}

/// What happened to the external ledger commit for a release.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitStatus {
    /// Nothing changed, so no commit was requested.
    NotNeeded,
    /// Something changed but ledger commits are switched off.
    Disabled,
    Done(CommitOutcome),
    Failed(String),
}

/// Transfer counts for one group of artifacts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ArtifactTally {
    pub transferred: usize,
    pub current: usize,
    pub failed: usize,
}

impl ArtifactTally {
    fn absorb(&mut self, other: ArtifactTally) {
        self.transferred += other.transferred;
        self.current += other.current;
        self.failed += other.failed;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseOutcome {
    pub release_id: String,
    pub tag: String,
    pub phase: ReleasePhase,
    pub archives: ArtifactTally,
    pub assets: ArtifactTally,
    pub commit: CommitStatus,
    /// Why the release was abandoned, if it was.
    pub skipped_reason: Option<String>,
}

impl ReleaseOutcome {
    pub fn transferred(&self) -> usize {
        self.archives.transferred + self.assets.transferred
    }

    pub fn failed(&self) -> usize {
        self.archives.failed + self.assets.failed
    }
}

/// Summary of a whole run.
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub releases: Vec<ReleaseOutcome>,
    pub persistence_failures: usize,
    /// Top-level failure that ended the run early, with its kind.
    pub fatal: Option<(ErrorKind, String)>,
    pub totals: LedgerTotals,
}

impl RunReport {
    pub fn transferred(&self) -> usize {
        self.releases.iter().map(ReleaseOutcome::transferred).sum()
    }

    pub fn failed(&self) -> usize {
        self.releases.iter().map(ReleaseOutcome::failed).sum()
    }

    pub fn abandoned(&self) -> usize {
        self.releases
            .iter()
            .filter(|r| r.phase == ReleasePhase::Abandoned)
            .count()
    }
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// Mirrors every source release into the target, one at a time.
pub struct ReleaseMirror<'a> {
    config: &'a MirrorConfig,
    parts: Collaborators<'a>,
    store: LedgerStore,
    ledger: SyncLedger,
    persistence_failures: usize,
}

impl<'a> ReleaseMirror<'a> {
    /// Load the ledger and prepare a run.
    pub fn new(config: &'a MirrorConfig, parts: Collaborators<'a>) -> Self {
        let store = config.ledger_store();
        let ledger = store.load();
        Self {
            config,
            parts,
            store,
            ledger,
            persistence_failures: 0,
        }
    }

    pub fn ledger(&self) -> &SyncLedger {
        &self.ledger
    }

    /// Mirror every source release. Never returns an error: a top-level
    /// failure is logged and recorded in the report.
    pub fn run(&mut self) -> RunReport {
        let mut report = RunReport::default();
        if let Err(err) = self.mirror_all(&mut report.releases) {
            tracing::error!(kind = %err.kind(), error = ?err, "mirror run aborted: {err}");
            report.fatal = Some((err.kind(), err.to_string()));
        }
        report.persistence_failures = self.persistence_failures;
        report.totals = self.ledger.totals();
        report
    }

    fn mirror_all(&mut self, outcomes: &mut Vec<ReleaseOutcome>) -> Result<(), MirrorError> {
        let mut releases =
            self.parts
                .source
                .list_releases()
                .map_err(|source| MirrorError::Unexpected {
                    context: format!("listing releases of {}", self.config.source),
                    source,
                })?;
        releases.sort_by_key(|r| r.created_at);
        tracing::info!(count = releases.len(), "found source releases");

        for release in &releases {
            outcomes.push(self.mirror_release(release));
        }
        Ok(())
    }

    /// Drive one release through its phases.
    pub fn mirror_release(&mut self, release: &ReleaseDescriptor) -> ReleaseOutcome {
        let tag = release.tag_name.as_str();
        let release_id = release.ledger_id();
        tracing::info!(tag, release_id = %release_id, "processing release");

        let mut outcome = ReleaseOutcome {
            release_id: release_id.clone(),
            tag: tag.to_string(),
            phase: ReleasePhase::Located,
            archives: ArtifactTally::default(),
            assets: ArtifactTally::default(),
            commit: CommitStatus::NotNeeded,
            skipped_reason: None,
        };

        let target_release = match self.ensure_target_release(release) {
            Ok(r) => r,
            Err(err) => {
                tracing::warn!(tag, kind = %err.kind(), error = %err, "cannot get or create target release, skipping");
                outcome.phase = ReleasePhase::Abandoned;
                outcome.skipped_reason = Some(err.to_string());
                return outcome;
            }
        };
        outcome.phase = ReleasePhase::ReleaseReady;

        outcome.archives = self.sync_source_archives(tag, &target_release);
        outcome.assets = self.sync_release_assets(release, &target_release);
        outcome.phase = ReleasePhase::ArtifactsEvaluated;

        let now = self.parts.clock.now();
        self.ledger.mark_release_synced(&release_id, tag, now);
        self.persist();

        if outcome.transferred() > 0 {
            tracing::info!(tag, transferred = outcome.transferred(), "release has updates, committing ledger");
            outcome.commit = self.commit_ledger(tag);
            outcome.phase = ReleasePhase::Committed;
        } else {
            tracing::info!(tag, "release unchanged, skipping ledger commit");
            outcome.phase = ReleasePhase::SkippedNoChange;
        }
        outcome
    }

    // -- Located → ReleaseReady ---------------------------------------------

    fn ensure_target_release(
        &self,
        release: &ReleaseDescriptor,
    ) -> Result<TargetRelease, MirrorError> {
        let tag = release.tag_name.as_str();
        if let Some(existing) = self.find_target_release(tag)? {
            tracing::info!(tag, "found existing target release");
            return Ok(existing);
        }

        tracing::info!(tag, "creating target release");
        match self.create_target_release(release) {
            Ok(created) => Ok(created),
            Err(source) => {
                tracing::warn!(tag, error = %source, "release creation failed, looking again");
                // A concurrent creator may have won the race.
                match self.find_target_release(tag) {
                    Ok(Some(existing)) => {
                        tracing::info!(tag, "found target release on second lookup");
                        Ok(existing)
                    }
                    _ => Err(MirrorError::Provision {
                        tag: tag.to_string(),
                        source,
                    }),
                }
            }
        }
    }

    fn find_target_release(&self, tag: &str) -> Result<Option<TargetRelease>, MirrorError> {
        let releases =
            self.parts
                .target
                .list_releases()
                .map_err(|source| MirrorError::Provision {
                    tag: tag.to_string(),
                    source,
                })?;
        Ok(releases.into_iter().find(|r| r.tag_name == tag))
    }

    fn create_target_release(
        &self,
        release: &ReleaseDescriptor,
    ) -> Result<TargetRelease, crate::error::ApiError> {
        let target = self.parts.target;
        let tag = release.tag_name.as_str();
        if !target.tag_exists(tag)? {
            let sha = target.default_branch_tip()?;
            tracing::info!(tag, sha = %sha, "creating tag from default branch tip");
            target.create_tag(tag, &sha)?;
        }
        target.create_release(&NewRelease::from(release))
    }

    // -- ReleaseReady → ArtifactsEvaluated ----------------------------------

    fn sync_source_archives(&mut self, tag: &str, target_release: &TargetRelease) -> ArtifactTally {
        let mut tally = ArtifactTally::default();
        let target_assets = match self.parts.target.list_assets(target_release) {
            Ok(assets) => assets,
            Err(source) => {
                let err = MirrorError::Listing {
                    what: format!("target assets of {tag}"),
                    source,
                };
                tracing::error!(tag, kind = %err.kind(), error = %err, "skipping source archives");
                tally.failed += ArchiveKind::all().len();
                return tally;
            }
        };
        let index = TargetIndex::new(&target_assets);

        for &kind in ArchiveKind::all() {
            let filename = kind.asset_name(tag);
            match check_archive(&filename, &index) {
                ArchiveSignal::Present => {
                    tracing::info!(tag, archive = %filename, "already on target, skipping");
                    tally.current += 1;
                    if !self.ledger.has_source_code(tag, &filename) {
                        let now = self.parts.clock.now();
                        self.ledger.record_source_code(tag, &filename, now);
                        self.persist();
                    }
                }
                ArchiveSignal::Missing => {
                    tracing::info!(tag, archive = %filename, "missing on target, syncing");
                    let url = self.parts.source.archive_url(tag, kind);
                    match self.transfer(target_release, &url, &filename, &filename, kind.content_type()) {
                        Ok(_) => {
                            let now = self.parts.clock.now();
                            self.ledger.record_source_code(tag, &filename, now);
                            self.persist();
                            tracing::info!(tag, archive = %filename, "archive synced");
                            tally.transferred += 1;
                        }
                        Err(err) => {
                            tracing::warn!(tag, archive = %filename, kind = %err.kind(), error = %err, "archive not synced this run");
                            tally.failed += 1;
                        }
                    }
                }
            }
        }
        tally
    }

    fn sync_release_assets(
        &mut self,
        release: &ReleaseDescriptor,
        target_release: &TargetRelease,
    ) -> ArtifactTally {
        let tag = release.tag_name.as_str();
        let release_id = release.ledger_id();
        let mut tally = ArtifactTally::default();

        let source_assets = match self.parts.source.list_assets(release) {
            Ok(assets) => assets,
            Err(source) => {
                let err = MirrorError::Listing {
                    what: format!("source assets of {tag}"),
                    source,
                };
                tracing::error!(tag, kind = %err.kind(), error = %err, "skipping release assets");
                tally.failed += 1;
                return tally;
            }
        };
        let target_assets = match self.parts.target.list_assets(target_release) {
            Ok(assets) => assets,
            Err(source) => {
                let err = MirrorError::Listing {
                    what: format!("target assets of {tag}"),
                    source,
                };
                tracing::error!(tag, kind = %err.kind(), error = %err, "skipping release assets");
                tally.failed += source_assets.len().max(1);
                return tally;
            }
        };
        let index = TargetIndex::new(&target_assets);
        tracing::info!(tag, count = source_assets.len(), "syncing release assets");

        for asset in &source_assets {
            let key = asset.key();
            let signal = check_asset(
                asset,
                self.ledger.asset_entry(&release_id, &key),
                index.get(&asset.name),
            );
            if !signal.needs_sync() {
                tracing::info!(tag, asset = %asset.name, "asset up to date");
                tally.current += 1;
                continue;
            }
            tracing::info!(tag, asset = %asset.name, size = asset.size, reason = %signal.reason(), "asset needs sync");

            let stem = format!("{}_{}", asset.id, asset.name);
            match self.transfer_asset(target_release, asset, &stem) {
                Ok(uploaded) => {
                    let now = self.parts.clock.now();
                    self.ledger.record_asset(&release_id, key, &uploaded, now);
                    self.persist();
                    tracing::info!(tag, asset = %asset.name, size = uploaded.size, "asset synced");
                    tally.transferred += 1;
                }
                Err(err) => {
                    tracing::warn!(tag, asset = %asset.name, kind = %err.kind(), error = %err, "asset not synced this run");
                    tally.failed += 1;
                }
            }
        }
        tally
    }

    fn transfer_asset(
        &self,
        target_release: &TargetRelease,
        asset: &AssetDescriptor,
        stem: &str,
    ) -> Result<AssetDescriptor, MirrorError> {
        self.transfer(
            target_release,
            &asset.download_url,
            stem,
            &asset.name,
            asset.content_type_or_default(),
        )
    }

    /// Stage `url` under `temp_{stem}`, upload it as `name`, then drop the
    /// staged file whatever happened.
    fn transfer(
        &self,
        target_release: &TargetRelease,
        url: &str,
        stem: &str,
        name: &str,
        content_type: &str,
    ) -> Result<AssetDescriptor, MirrorError> {
        let staged = stage(self.parts.downloader, url, self.config.staging_path(stem))?;
        let uploader = Uploader::new(self.parts.target, self.config.retry, self.parts.clock);
        uploader.upload(target_release, staged.path(), name, content_type)
    }

    // -- ArtifactsEvaluated → Committed -------------------------------------

    fn commit_ledger(&self, tag: &str) -> CommitStatus {
        let committer = match self.parts.committer {
            Some(c) if self.config.commit_ledger => c,
            _ => {
                tracing::debug!(tag, "ledger commit disabled");
                return CommitStatus::Disabled;
            }
        };
        let paths = [self.store.path().to_path_buf(), self.store.backup_path()];
        match committer.commit(&paths, tag) {
            Ok(outcome) => {
                match outcome {
                    CommitOutcome::Committed => tracing::info!(tag, "ledger committed"),
                    CommitOutcome::Unchanged => tracing::info!(tag, "ledger unchanged in working tree, nothing to commit"),
                }
                CommitStatus::Done(outcome)
            }
            Err(err) => {
                let err = MirrorError::from(err);
                tracing::warn!(tag, kind = %err.kind(), error = %err, "ledger commit failed");
                CommitStatus::Failed(err.to_string())
            }
        }
    }

    fn persist(&mut self) {
        // The store logs the failure; the in-memory ledger stays authoritative
        // and the next successful save catches up.
        if self.store.save(&self.ledger).is_err() {
            self.persistence_failures += 1;
        }
    }
}
