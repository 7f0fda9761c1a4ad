//! In-memory hosting platform used by the mirror integration tests.

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use relmirror_core::{
    ArchiveKind, AssetDescriptor, MirrorConfig, NewRelease, ReleaseDescriptor, RepoSlug,
    RetryPolicy, TargetRelease,
};
use relmirror_sync::{
    ApiError, Clock, Collaborators, CommitError, CommitOutcome, Downloader, LedgerCommitter,
    SourceRepository, TargetRepository,
};
use tempfile::TempDir;

pub fn day(month: u32, day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, month, day, 0, 0, 0).unwrap()
}

// ---------------------------------------------------------------------------
// Source
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct FakeSource {
    pub releases: RefCell<Vec<ReleaseDescriptor>>,
    pub assets: RefCell<HashMap<u64, Vec<AssetDescriptor>>>,
    pub fail_listing: Cell<bool>,
}

impl SourceRepository for FakeSource {
    fn list_releases(&self) -> Result<Vec<ReleaseDescriptor>, ApiError> {
        if self.fail_listing.get() {
            return Err(ApiError::Status {
                status: 401,
                message: "bad credentials".into(),
            });
        }
        Ok(self.releases.borrow().clone())
    }

    fn list_assets(&self, release: &ReleaseDescriptor) -> Result<Vec<AssetDescriptor>, ApiError> {
        Ok(self
            .assets
            .borrow()
            .get(&release.id)
            .cloned()
            .unwrap_or_default())
    }

    fn archive_url(&self, tag: &str, kind: ArchiveKind) -> String {
        format!("mem://archive/{tag}.{}", kind.extension())
    }
}

// ---------------------------------------------------------------------------
// Target
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct TargetState {
    pub releases: Vec<TargetRelease>,
    pub tags: HashSet<String>,
    pub assets: HashMap<u64, Vec<AssetDescriptor>>,
    pub next_id: u64,
    /// Tags whose release creation fails outright.
    pub refuse_release: HashSet<String>,
    /// Tags whose release gets created but the call still reports failure.
    pub racy_release: HashSet<String>,
    /// Remaining forced upload failures per asset name.
    pub failing_uploads: HashMap<String, usize>,
    pub uploads: Vec<String>,
    pub deletes: Vec<String>,
    pub created_tags: Vec<(String, String)>,
}

pub struct FakeTarget {
    pub state: RefCell<TargetState>,
    /// `updated_at` stamped on every uploaded asset.
    pub upload_stamp: Cell<DateTime<Utc>>,
}

impl Default for FakeTarget {
    fn default() -> Self {
        Self {
            state: RefCell::new(TargetState {
                next_id: 1000,
                ..TargetState::default()
            }),
            upload_stamp: Cell::new(day(6, 1)),
        }
    }
}

impl FakeTarget {
    pub fn uploads(&self) -> Vec<String> {
        self.state.borrow().uploads.clone()
    }

    pub fn deletes(&self) -> Vec<String> {
        self.state.borrow().deletes.clone()
    }

    pub fn release_tags(&self) -> Vec<String> {
        self.state
            .borrow()
            .releases
            .iter()
            .map(|r| r.tag_name.clone())
            .collect()
    }

    /// Pre-existing target release holding the given `(name, size)` assets.
    pub fn seed_release(&self, tag: &str, assets: &[(&str, u64)]) {
        let mut state = self.state.borrow_mut();
        state.next_id += 1;
        let id = state.next_id;
        state.tags.insert(tag.to_string());
        state.releases.push(TargetRelease {
            id,
            tag_name: tag.to_string(),
            upload_url: format!("mem://upload/{id}"),
        });
        let stamp = self.upload_stamp.get();
        let seeded = assets
            .iter()
            .enumerate()
            .map(|(i, (name, size))| AssetDescriptor {
                id: id * 100 + i as u64,
                name: name.to_string(),
                size: *size,
                content_type: None,
                updated_at: Some(stamp),
                download_url: format!("mem://target/{name}"),
            })
            .collect();
        state.assets.insert(id, seeded);
    }

    fn push_release(state: &mut TargetState, tag: &str) -> TargetRelease {
        state.next_id += 1;
        let release = TargetRelease {
            id: state.next_id,
            tag_name: tag.to_string(),
            upload_url: format!("mem://upload/{}", state.next_id),
        };
        state.releases.push(release.clone());
        release
    }
}

impl TargetRepository for FakeTarget {
    fn list_releases(&self) -> Result<Vec<TargetRelease>, ApiError> {
        Ok(self.state.borrow().releases.clone())
    }

    fn tag_exists(&self, tag: &str) -> Result<bool, ApiError> {
        Ok(self.state.borrow().tags.contains(tag))
    }

    fn default_branch_tip(&self) -> Result<String, ApiError> {
        Ok("c0ffee".to_string())
    }

    fn create_tag(&self, tag: &str, sha: &str) -> Result<(), ApiError> {
        let mut state = self.state.borrow_mut();
        state.tags.insert(tag.to_string());
        state.created_tags.push((tag.to_string(), sha.to_string()));
        Ok(())
    }

    fn create_release(&self, release: &NewRelease) -> Result<TargetRelease, ApiError> {
        let mut state = self.state.borrow_mut();
        let tag = release.tag_name.as_str();
        if state.refuse_release.contains(tag) {
            return Err(ApiError::Status {
                status: 403,
                message: "resource not accessible".into(),
            });
        }
        let created = Self::push_release(&mut state, tag);
        if state.racy_release.contains(tag) {
            return Err(ApiError::Status {
                status: 422,
                message: "already_exists".into(),
            });
        }
        Ok(created)
    }

    fn list_assets(&self, release: &TargetRelease) -> Result<Vec<AssetDescriptor>, ApiError> {
        Ok(self
            .state
            .borrow()
            .assets
            .get(&release.id)
            .cloned()
            .unwrap_or_default())
    }

    fn delete_asset(&self, release: &TargetRelease, asset: &AssetDescriptor) -> Result<(), ApiError> {
        let mut state = self.state.borrow_mut();
        state.deletes.push(asset.name.clone());
        if let Some(list) = state.assets.get_mut(&release.id) {
            list.retain(|a| a.id != asset.id);
        }
        Ok(())
    }

    fn upload_asset(
        &self,
        release: &TargetRelease,
        path: &Path,
        name: &str,
        content_type: &str,
    ) -> Result<AssetDescriptor, ApiError> {
        let size = fs::metadata(path)
            .map_err(|source| ApiError::Io {
                path: path.to_path_buf(),
                source,
            })?
            .len();
        let mut state = self.state.borrow_mut();
        if let Some(remaining) = state.failing_uploads.get_mut(name) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(ApiError::Status {
                    status: 502,
                    message: "bad gateway".into(),
                });
            }
        }
        let list = state.assets.entry(release.id).or_default();
        if list.iter().any(|a| a.name == name) {
            return Err(ApiError::Conflict { name: name.into() });
        }
        let id = 5000 + list.len() as u64;
        let uploaded = AssetDescriptor {
            id,
            name: name.to_string(),
            size,
            content_type: Some(content_type.to_string()),
            updated_at: Some(self.upload_stamp.get()),
            download_url: format!("mem://target/{name}"),
        };
        list.push(uploaded.clone());
        state.uploads.push(name.to_string());
        Ok(uploaded)
    }
}

// ---------------------------------------------------------------------------
// Downloader, committer, clock
// ---------------------------------------------------------------------------

/// Writes `size` zero bytes for every registered URL.
#[derive(Default)]
pub struct FakeDownloader {
    pub sizes: RefCell<HashMap<String, u64>>,
    pub calls: RefCell<Vec<String>>,
}

impl Downloader for FakeDownloader {
    fn download(&self, url: &str, dest: &Path) -> Result<u64, ApiError> {
        self.calls.borrow_mut().push(url.to_string());
        let size = *self
            .sizes
            .borrow()
            .get(url)
            .ok_or_else(|| ApiError::NotFound(url.to_string()))?;
        fs::write(dest, vec![0u8; size as usize]).map_err(|source| ApiError::Io {
            path: dest.to_path_buf(),
            source,
        })?;
        Ok(size)
    }
}

#[derive(Default)]
pub struct RecordingCommitter {
    pub calls: RefCell<Vec<(Vec<PathBuf>, String)>>,
    pub fail: Cell<bool>,
}

impl LedgerCommitter for RecordingCommitter {
    fn commit(&self, paths: &[PathBuf], marker: &str) -> Result<CommitOutcome, CommitError> {
        self.calls
            .borrow_mut()
            .push((paths.to_vec(), marker.to_string()));
        if self.fail.get() {
            return Err(CommitError {
                step: "git push".into(),
                message: "remote rejected".into(),
            });
        }
        Ok(CommitOutcome::Committed)
    }
}

pub struct FakeClock {
    pub now: Cell<DateTime<Utc>>,
    pub sleeps: RefCell<Vec<Duration>>,
}

impl Default for FakeClock {
    fn default() -> Self {
        Self {
            now: Cell::new(day(9, 1)),
            sleeps: RefCell::new(Vec::new()),
        }
    }
}

impl Clock for FakeClock {
    fn now(&self) -> DateTime<Utc> {
        self.now.get()
    }

    fn sleep(&self, duration: Duration) {
        self.sleeps.borrow_mut().push(duration);
    }
}

// ---------------------------------------------------------------------------
// World
// ---------------------------------------------------------------------------

pub struct World {
    pub dir: TempDir,
    pub config: MirrorConfig,
    pub source: FakeSource,
    pub target: FakeTarget,
    pub downloader: FakeDownloader,
    pub committer: RecordingCommitter,
    pub clock: FakeClock,
}

impl World {
    pub fn new() -> Self {
        let dir = TempDir::new().expect("tempdir");
        let config = MirrorConfig::new(
            "upstream/tool".parse::<RepoSlug>().expect("source slug"),
            "mirror/tool".parse::<RepoSlug>().expect("target slug"),
        )
        .with_ledger_path(dir.path().join("synced_data.json"))
        .with_staging_dir(dir.path().join("staging"))
        .with_retry(RetryPolicy::new(3, Duration::from_secs(10)).expect("retry"));
        Self {
            dir,
            config,
            source: FakeSource::default(),
            target: FakeTarget::default(),
            downloader: FakeDownloader::default(),
            committer: RecordingCommitter::default(),
            clock: FakeClock::default(),
        }
    }

    pub fn parts(&self) -> Collaborators<'_> {
        Collaborators {
            source: &self.source,
            target: &self.target,
            downloader: &self.downloader,
            committer: Some(&self.committer),
            clock: &self.clock,
        }
    }

    /// Add a source release together with downloadable archives.
    pub fn add_release(&self, id: u64, tag: &str, created: DateTime<Utc>) {
        self.source.releases.borrow_mut().push(ReleaseDescriptor {
            id,
            tag_name: tag.to_string(),
            name: Some(format!("Release {tag}")),
            body: Some("notes".to_string()),
            draft: false,
            prerelease: false,
            created_at: created,
        });
        for &kind in ArchiveKind::all() {
            self.downloader
                .sizes
                .borrow_mut()
                .insert(self.source.archive_url(tag, kind), 10);
        }
    }

    pub fn add_asset(&self, release_id: u64, name: &str, size: u64, updated: DateTime<Utc>) {
        let url = format!("mem://asset/{release_id}/{name}/{size}");
        self.downloader.sizes.borrow_mut().insert(url.clone(), size);
        let mut assets = self.source.assets.borrow_mut();
        let list = assets.entry(release_id).or_default();
        let id = release_id * 10 + list.len() as u64;
        list.push(AssetDescriptor {
            id,
            name: name.to_string(),
            size,
            content_type: Some("application/x-binary".to_string()),
            updated_at: Some(updated),
            download_url: url,
        });
    }

    /// Replace an existing source asset's size and timestamp.
    pub fn change_asset(&self, release_id: u64, name: &str, size: u64, updated: DateTime<Utc>) {
        let url = format!("mem://asset/{release_id}/{name}/{size}");
        self.downloader.sizes.borrow_mut().insert(url.clone(), size);
        let mut assets = self.source.assets.borrow_mut();
        let asset = assets
            .get_mut(&release_id)
            .and_then(|list| list.iter_mut().find(|a| a.name == name))
            .expect("asset to change");
        asset.size = size;
        asset.updated_at = Some(updated);
        asset.download_url = url;
    }

    pub fn staging_dir(&self) -> PathBuf {
        self.config.staging_dir.clone()
    }
}
