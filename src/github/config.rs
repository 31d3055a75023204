//! Github configuration
use super::{platform::GithubMetadata, GITHUB_API_URL};
use serde::{Deserialize, Serialize};

use crate::config::GitMigratorConfig;

/// Github configuration
#[derive(Deserialize, Serialize, Default, Debug, Clone)]
pub struct GithubConfig {
    /// Github token
    pub token: Option<String>,

    /// Github API URL, for GitHub Enterprise instances
    pub api_url: Option<String>,
}

impl GithubConfig {
    /// Get the github metadata client
    pub fn get_client(config: &GitMigratorConfig) -> GithubMetadata {
        let api_url = config
            .config_data
            .github
            .as_ref()
            .and_then(|c| c.api_url.clone())
            .unwrap_or_else(|| GITHUB_API_URL.to_string());
        GithubMetadata::new(api_url)
    }
}
