//! Domain types shared by the mirroring engine and its adapters.
//!
//! Descriptors are read-only snapshots of what a hosting API reported during
//! the current run; nothing here is cached across runs.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::ConfigError;

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// A hosted repository addressed as `owner/name`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RepoSlug {
    pub owner: String,
    pub name: String,
}

impl fmt::Display for RepoSlug {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

impl FromStr for RepoSlug {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let Some((owner, name)) = trimmed.split_once('/') else {
            return Err(ConfigError::InvalidRepo(s.to_string()));
        };
        if owner.is_empty() || name.is_empty() || name.contains('/') {
            return Err(ConfigError::InvalidRepo(s.to_string()));
        }
        Ok(Self {
            owner: owner.to_string(),
            name: name.to_string(),
        })
    }
}

/// Composite identity of a binary asset in the ledger: name plus byte size.
///
/// A size change yields a different key, so a resized asset is always looked
/// up as a brand-new artifact. On disk the key is the string `"{name}_{size}"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AssetKey {
    pub name: String,
    pub size: u64,
}

impl AssetKey {
    pub fn new(name: impl Into<String>, size: u64) -> Self {
        Self {
            name: name.into(),
            size,
        }
    }
}

impl fmt::Display for AssetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.name, self.size)
    }
}

impl FromStr for AssetKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Asset names may contain underscores; the size is always the last segment.
        let (name, size) = s
            .rsplit_once('_')
            .ok_or_else(|| format!("asset key '{s}' has no size suffix"))?;
        let size = size
            .parse::<u64>()
            .map_err(|_| format!("asset key '{s}' has a non-numeric size suffix"))?;
        if name.is_empty() {
            return Err(format!("asset key '{s}' has an empty name"));
        }
        Ok(Self::new(name, size))
    }
}

impl Serialize for AssetKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for AssetKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// Descriptors
// ---------------------------------------------------------------------------

/// A release as reported by the source repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseDescriptor {
    pub id: u64,
    pub tag_name: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub draft: bool,
    #[serde(default)]
    pub prerelease: bool,
    /// Only used to order releases oldest-first.
    pub created_at: DateTime<Utc>,
}

impl ReleaseDescriptor {
    /// Ledger key for this release (the numeric id as a string).
    pub fn ledger_id(&self) -> String {
        self.id.to_string()
    }

    /// Display name for the mirrored release; falls back to the tag.
    pub fn display_name(&self) -> &str {
        match self.name.as_deref() {
            Some(name) if !name.trim().is_empty() => name,
            _ => &self.tag_name,
        }
    }
}

/// An asset attached to a release, on either side of the mirror.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetDescriptor {
    pub id: u64,
    pub name: String,
    pub size: u64,
    #[serde(default)]
    pub content_type: Option<String>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    /// Where the bytes can be fetched from.
    pub download_url: String,
}

impl AssetDescriptor {
    pub const DEFAULT_CONTENT_TYPE: &'static str = "application/octet-stream";

    pub fn key(&self) -> AssetKey {
        AssetKey::new(self.name.clone(), self.size)
    }

    pub fn content_type_or_default(&self) -> &str {
        self.content_type
            .as_deref()
            .filter(|ct| !ct.is_empty())
            .unwrap_or(Self::DEFAULT_CONTENT_TYPE)
    }
}

/// Handle on a release in the target repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetRelease {
    pub id: u64,
    pub tag_name: String,
    /// Upload locator for new assets (platform specific).
    #[serde(default)]
    pub upload_url: String,
}

/// Release metadata to create on the target, copied from the source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewRelease {
    pub tag_name: String,
    pub name: String,
    pub body: String,
    pub draft: bool,
    pub prerelease: bool,
}

impl From<&ReleaseDescriptor> for NewRelease {
    fn from(source: &ReleaseDescriptor) -> Self {
        Self {
            tag_name: source.tag_name.clone(),
            name: source.display_name().to_string(),
            body: source.body.clone().unwrap_or_default(),
            draft: source.draft,
            prerelease: source.prerelease,
        }
    }
}

/// The two generated source-code archives every tagged release carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArchiveKind {
    Zip,
    TarGz,
}

impl ArchiveKind {
    /// Archives in the order they are mirrored.
    pub fn all() -> &'static [ArchiveKind] {
        &[ArchiveKind::Zip, ArchiveKind::TarGz]
    }

    pub fn extension(self) -> &'static str {
        match self {
            ArchiveKind::Zip => "zip",
            ArchiveKind::TarGz => "tar.gz",
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            ArchiveKind::Zip => "application/zip",
            ArchiveKind::TarGz => "application/gzip",
        }
    }

    /// Asset name the archive is uploaded under, e.g. `SourceCode_v1.0.zip`.
    pub fn asset_name(self, tag: &str) -> String {
        format!("SourceCode_{tag}.{}", self.extension())
    }
}

impl fmt::Display for ArchiveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("app.bin_50", "app.bin", 50)]
    #[case("my_tool_linux_amd64_1024", "my_tool_linux_amd64", 1024)]
    #[case("x_0", "x", 0)]
    fn asset_key_parses_last_underscore(
        #[case] raw: &str,
        #[case] name: &str,
        #[case] size: u64,
    ) {
        let key: AssetKey = raw.parse().expect("parse");
        assert_eq!(key, AssetKey::new(name, size));
        assert_eq!(key.to_string(), raw);
    }

    #[rstest]
    #[case("nosize")]
    #[case("app.bin_big")]
    #[case("_12")]
    fn asset_key_rejects_malformed(#[case] raw: &str) {
        assert!(raw.parse::<AssetKey>().is_err());
    }

    #[test]
    fn size_change_is_a_different_identity() {
        assert_ne!(AssetKey::new("asset_v1", 100), AssetKey::new("asset_v1", 200));
    }

    #[rstest]
    #[case("octo/hello", "octo", "hello")]
    #[case("  octo/hello ", "octo", "hello")]
    fn repo_slug_parses(#[case] raw: &str, #[case] owner: &str, #[case] name: &str) {
        let slug: RepoSlug = raw.parse().expect("parse");
        assert_eq!(slug.owner, owner);
        assert_eq!(slug.name, name);
        assert_eq!(slug.to_string(), format!("{owner}/{name}"));
    }

    #[rstest]
    #[case("octo")]
    #[case("/hello")]
    #[case("octo/")]
    #[case("a/b/c")]
    fn repo_slug_rejects_malformed(#[case] raw: &str) {
        let err = raw.parse::<RepoSlug>().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidRepo(_)));
    }

    #[test]
    fn new_release_defaults_name_to_tag() {
        let source = ReleaseDescriptor {
            id: 7,
            tag_name: "v1.0".into(),
            name: Some("  ".into()),
            body: None,
            draft: false,
            prerelease: true,
            created_at: Utc::now(),
        };
        let new = NewRelease::from(&source);
        assert_eq!(new.name, "v1.0");
        assert_eq!(new.body, "");
        assert!(new.prerelease);
    }

    #[test]
    fn archive_names_follow_tag() {
        assert_eq!(ArchiveKind::Zip.asset_name("v2"), "SourceCode_v2.zip");
        assert_eq!(ArchiveKind::TarGz.asset_name("v2"), "SourceCode_v2.tar.gz");
    }

    #[test]
    fn empty_content_type_falls_back() {
        let asset = AssetDescriptor {
            id: 1,
            name: "a".into(),
            size: 1,
            content_type: Some(String::new()),
            updated_at: None,
            download_url: String::new(),
        };
        assert_eq!(asset.content_type_or_default(), "application/octet-stream");
    }
}
