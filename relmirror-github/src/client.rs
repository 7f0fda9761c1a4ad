//! Blocking GitHub REST client implementing both repository seams.

use std::fs::File;
use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use relmirror_core::{
    ArchiveKind, AssetDescriptor, NewRelease, ReleaseDescriptor, RepoSlug, TargetRelease,
};
use relmirror_sync::{ApiError, SourceRepository, TargetRepository};

use crate::error::GithubError;

pub const DEFAULT_API_URL: &str = "https://api.github.com";
const PER_PAGE: usize = 100;
const USER_AGENT: &str = concat!("relmirror/", env!("CARGO_PKG_VERSION"));

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct WireRelease {
    id: u64,
    tag_name: String,
    name: Option<String>,
    body: Option<String>,
    #[serde(default)]
    draft: bool,
    #[serde(default)]
    prerelease: bool,
    created_at: DateTime<Utc>,
    #[serde(default)]
    upload_url: String,
}

impl WireRelease {
    fn into_descriptor(self) -> ReleaseDescriptor {
        ReleaseDescriptor {
            id: self.id,
            tag_name: self.tag_name,
            name: self.name,
            body: self.body,
            draft: self.draft,
            prerelease: self.prerelease,
            created_at: self.created_at,
        }
    }

    fn into_target(self) -> TargetRelease {
        TargetRelease {
            id: self.id,
            tag_name: self.tag_name,
            upload_url: self.upload_url,
        }
    }
}

#[derive(Debug, Deserialize)]
struct WireAsset {
    id: u64,
    name: String,
    size: u64,
    content_type: Option<String>,
    updated_at: Option<DateTime<Utc>>,
    browser_download_url: String,
}

impl From<WireAsset> for AssetDescriptor {
    fn from(a: WireAsset) -> Self {
        AssetDescriptor {
            id: a.id,
            name: a.name,
            size: a.size,
            content_type: a.content_type.filter(|c| !c.is_empty()),
            updated_at: a.updated_at,
            download_url: a.browser_download_url,
        }
    }
}

#[derive(Debug, Deserialize)]
struct WireRepo {
    default_branch: String,
}

#[derive(Debug, Deserialize)]
struct WireBranch {
    commit: WireCommit,
}

#[derive(Debug, Deserialize)]
struct WireCommit {
    sha: String,
}

#[derive(Debug, Serialize)]
struct CreateRef<'a> {
    #[serde(rename = "ref")]
    reference: String,
    sha: &'a str,
}

#[derive(Debug, Serialize)]
struct CreateRelease<'a> {
    tag_name: &'a str,
    name: &'a str,
    body: &'a str,
    draft: bool,
    prerelease: bool,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// One repository on one GitHub API host.
#[derive(Clone)]
pub struct GithubClient {
    agent: ureq::Agent,
    api_base: String,
    repo: RepoSlug,
    token: Option<String>,
}

impl GithubClient {
    pub fn new(repo: RepoSlug, token: Option<String>) -> Self {
        Self::with_api_url(repo, token, DEFAULT_API_URL)
    }

    pub fn with_api_url(repo: RepoSlug, token: Option<String>, api_url: &str) -> Self {
        let agent = ureq::AgentBuilder::new()
            .user_agent(USER_AGENT)
            .timeout_connect(Duration::from_secs(30))
            .timeout_read(Duration::from_secs(600))
            .timeout_write(Duration::from_secs(600))
            .build();
        Self {
            agent,
            api_base: api_url.trim_end_matches('/').to_string(),
            repo,
            token: token.filter(|t| !t.is_empty()),
        }
    }

    pub fn repo(&self) -> &RepoSlug {
        &self.repo
    }

    fn repo_url(&self, path: &str) -> String {
        let root = format!("{}/repos/{}/{}", self.api_base, self.repo.owner, self.repo.name);
        match path.trim_start_matches('/') {
            "" => root,
            rest => format!("{root}/{rest}"),
        }
    }

    fn request(&self, method: &str, url: &str) -> ureq::Request {
        let req = self
            .agent
            .request(method, url)
            .set("Accept", "application/vnd.github+json")
            .set("X-GitHub-Api-Version", "2022-11-28");
        match &self.token {
            Some(token) => req.set("Authorization", &format!("Bearer {token}")),
            None => req,
        }
    }

    fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, GithubError> {
        let response = self
            .request("GET", url)
            .call()
            .map_err(|e| GithubError::from_ureq("GET", url, e))?;
        response.into_json().map_err(|source| GithubError::Decode {
            what: url.to_string(),
            source,
        })
    }

    fn post_json<B: Serialize, T: DeserializeOwned>(
        &self,
        url: &str,
        body: &B,
    ) -> Result<T, GithubError> {
        let response = self
            .request("POST", url)
            .send_json(body)
            .map_err(|e| GithubError::from_ureq("POST", url, e))?;
        response.into_json().map_err(|source| GithubError::Decode {
            what: url.to_string(),
            source,
        })
    }

    /// Follow `page=N` until a short page comes back.
    fn get_paginated<T: DeserializeOwned>(&self, path: &str) -> Result<Vec<T>, GithubError> {
        let base = self.repo_url(path);
        let mut items = Vec::new();
        for page in 1.. {
            let url = paged_url(&base, page);
            let batch: Vec<T> = self.get_json(&url)?;
            let done = batch.len() < PER_PAGE;
            items.extend(batch);
            if done {
                break;
            }
        }
        Ok(items)
    }

    fn releases(&self) -> Result<Vec<WireRelease>, GithubError> {
        self.get_paginated("releases")
    }

    fn release_assets(&self, release_id: u64) -> Result<Vec<AssetDescriptor>, GithubError> {
        let wire: Vec<WireAsset> = self.get_paginated(&format!("releases/{release_id}/assets"))?;
        Ok(wire.into_iter().map(AssetDescriptor::from).collect())
    }
}

fn paged_url(base: &str, page: usize) -> String {
    let sep = if base.contains('?') { '&' } else { '?' };
    format!("{base}{sep}per_page={PER_PAGE}&page={page}")
}

/// Strip the RFC 6570 `{?name,label}` suffix GitHub appends to `upload_url`.
fn upload_endpoint(upload_url: &str) -> &str {
    upload_url
        .split_once('{')
        .map_or(upload_url, |(base, _)| base)
}

/// Public download locator for a generated source archive.
pub fn archive_url(repo: &RepoSlug, tag: &str, kind: ArchiveKind) -> String {
    format!(
        "https://github.com/{}/{}/archive/refs/tags/{tag}.{}",
        repo.owner,
        repo.name,
        kind.extension()
    )
}

impl SourceRepository for GithubClient {
    fn list_releases(&self) -> Result<Vec<ReleaseDescriptor>, ApiError> {
        let releases = self.releases()?;
        Ok(releases.into_iter().map(WireRelease::into_descriptor).collect())
    }

    fn list_assets(&self, release: &ReleaseDescriptor) -> Result<Vec<AssetDescriptor>, ApiError> {
        Ok(self.release_assets(release.id)?)
    }

    fn archive_url(&self, tag: &str, kind: ArchiveKind) -> String {
        archive_url(&self.repo, tag, kind)
    }
}

impl TargetRepository for GithubClient {
    fn list_releases(&self) -> Result<Vec<TargetRelease>, ApiError> {
        let releases = self.releases()?;
        Ok(releases.into_iter().map(WireRelease::into_target).collect())
    }

    fn tag_exists(&self, tag: &str) -> Result<bool, ApiError> {
        let url = self.repo_url(&format!("git/ref/tags/{tag}"));
        match self.request("GET", &url).call() {
            Ok(_) => Ok(true),
            Err(ureq::Error::Status(404, _)) => Ok(false),
            Err(err) => Err(GithubError::from_ureq("GET", &url, err).into()),
        }
    }

    fn default_branch_tip(&self) -> Result<String, ApiError> {
        let repo: WireRepo = self.get_json(&self.repo_url(""))?;
        let branch: WireBranch =
            self.get_json(&self.repo_url(&format!("branches/{}", repo.default_branch)))?;
        tracing::debug!(branch = %repo.default_branch, sha = %branch.commit.sha, "resolved default branch tip");
        Ok(branch.commit.sha)
    }

    fn create_tag(&self, tag: &str, sha: &str) -> Result<(), ApiError> {
        let body = CreateRef {
            reference: format!("refs/tags/{tag}"),
            sha,
        };
        let _: serde_json::Value = self.post_json(&self.repo_url("git/refs"), &body)?;
        Ok(())
    }

    fn create_release(&self, release: &NewRelease) -> Result<TargetRelease, ApiError> {
        let body = CreateRelease {
            tag_name: &release.tag_name,
            name: &release.name,
            body: &release.body,
            draft: release.draft,
            prerelease: release.prerelease,
        };
        let created: WireRelease = self.post_json(&self.repo_url("releases"), &body)?;
        Ok(created.into_target())
    }

    fn list_assets(&self, release: &TargetRelease) -> Result<Vec<AssetDescriptor>, ApiError> {
        Ok(self.release_assets(release.id)?)
    }

    fn delete_asset(&self, _release: &TargetRelease, asset: &AssetDescriptor) -> Result<(), ApiError> {
        let url = self.repo_url(&format!("releases/assets/{}", asset.id));
        self.request("DELETE", &url)
            .call()
            .map_err(|e| GithubError::from_ureq("DELETE", &url, e))?;
        Ok(())
    }

    fn upload_asset(
        &self,
        release: &TargetRelease,
        path: &Path,
        name: &str,
        content_type: &str,
    ) -> Result<AssetDescriptor, ApiError> {
        let io = |source| GithubError::Io {
            path: path.to_path_buf(),
            source,
        };
        let file = File::open(path).map_err(io)?;
        let len = file.metadata().map_err(io)?.len();

        let url = upload_endpoint(&release.upload_url).to_string();
        if url.is_empty() {
            return Err(GithubError::Unexpected {
                url: format!("release {}", release.id),
                message: "release has no upload_url".into(),
            }
            .into());
        }
        let response = self
            .request("POST", &url)
            .query("name", name)
            .set("Content-Type", content_type)
            .set("Content-Length", &len.to_string())
            .send(file);
        match response {
            Ok(response) => {
                let wire: WireAsset = response.into_json().map_err(|source| GithubError::Decode {
                    what: format!("upload response for {name}"),
                    source,
                })?;
                Ok(wire.into())
            }
            Err(ureq::Error::Status(422, _)) => Err(ApiError::Conflict { name: name.into() }),
            Err(err) => Err(GithubError::from_ureq("POST", &url, err).into()),
        }
    }
}
