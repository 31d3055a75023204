//! Github Release struct and conversion to Release struct
use crate::metadata::Release;
use serde::{Deserialize, Serialize};

/// Github release asset
#[derive(Deserialize, Serialize, Default, Debug, Clone)]
pub struct AssetGithub {
    /// Asset name
    pub name: String,

    /// Download URL
    pub browser_download_url: String,
}

/// Github Release, as returned by the API
#[derive(Deserialize, Serialize, Default, Debug, Clone)]
pub struct ReleaseGithub {
    /// Tag name
    pub tag_name: String,

    /// Release name
    pub name: Option<String>,

    /// Release notes
    pub body: Option<String>,

    /// Draft status
    pub draft: bool,

    /// Prerelease status
    pub prerelease: bool,

    /// Attached assets
    #[serde(default)]
    pub assets: Vec<AssetGithub>,
}

impl From<ReleaseGithub> for Release {
    fn from(release: ReleaseGithub) -> Self {
        Release {
            name: release.name.unwrap_or_else(|| release.tag_name.clone()),
            tag: release.tag_name,
            body: release.body.unwrap_or_default(),
            is_draft: release.draft,
            is_prerelease: release.prerelease,
            asset_refs: release
                .assets
                .into_iter()
                .map(|a| a.browser_download_url)
                .collect(),
        }
    }
}

/// Release creation payload
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct NewReleaseGithub<'a> {
    /// Tag name
    pub tag_name: &'a str,

    /// Release name
    pub name: &'a str,

    /// Release notes
    pub body: &'a str,

    /// Draft status
    pub draft: bool,

    /// Prerelease status
    pub prerelease: bool,
}

impl<'a> From<&'a Release> for NewReleaseGithub<'a> {
    fn from(release: &'a Release) -> Self {
        Self {
            tag_name: &release.tag,
            name: &release.name,
            body: &release.body,
            draft: release.is_draft,
            prerelease: release.is_prerelease,
        }
    }
}
