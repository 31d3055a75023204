//! Github repository location and repository payloads
use serde::{Deserialize, Serialize};
use url::Url;

use crate::metadata::{MetadataError, MetadataErrorKind};

/// Github Repo, only the fields that are migrated
#[derive(Deserialize, Serialize, Default, Debug, Clone)]
pub struct RepoGithub {
    /// Repository name
    pub name: String,

    /// Repository description
    pub description: Option<String>,
}

/// Owner and name of a repository
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoPath {
    /// Owner (user or organisation)
    pub owner: String,

    /// Repository name, without `.git`
    pub name: String,
}

impl RepoPath {
    /// Extract owner and name from an https, ssh or scp-like remote location
    /// # Errors
    /// `NotFound` if the location has no owner/name pair
    pub fn parse(location: &str) -> Result<Self, MetadataError> {
        let path = match Url::parse(location) {
            Ok(url) if url.has_host() => url.path().to_string(),
            _ => match location.split_once(':') {
                Some((_, path)) => path.to_string(),
                None => location.to_string(),
            },
        };
        let mut parts = path
            .trim_end_matches('/')
            .rsplit('/')
            .filter(|p| !p.is_empty());
        match (parts.next(), parts.next()) {
            (Some(name), Some(owner)) => Ok(Self {
                owner: owner.to_string(),
                name: name.trim_end_matches(".git").to_string(),
            }),
            _ => Err(MetadataError::new(
                MetadataErrorKind::NotFound,
                format!("'{location}' does not designate an owner/repository"),
            )),
        }
    }
}

impl std::fmt::Display for RepoPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}
