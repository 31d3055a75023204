//! GitHub API module.
pub(crate) mod config;
pub(crate) mod platform;
pub(crate) mod release;
pub(crate) mod repo;

/// GitHub API URL
pub(crate) const GITHUB_API_URL: &str = "https://api.github.com";

/// GitHub API Header
const GITHUB_API_HEADER: &str = "X-GitHub-Api-Version";

/// GitHub API Version
const GITHUB_API_VERSION: &str = "2022-11-28";

/// Releases requested per page
const PER_PAGE: usize = 100;

/// Longest wait accepted from a rate limit response
const MAX_RATE_LIMIT_WAIT_SECS: u64 = 60;
