//! Hosting API metadata: releases and repository description
use std::{fmt, future::Future, pin::Pin, time::Duration};

use serde::{Deserialize, Serialize};

use crate::retry::{RetryDecision, Retryable};

/// Future returned by [`MetadataApi`] calls
pub type MetadataFuture<'a, T> =
    Pin<Box<dyn Future<Output = Result<T, MetadataError>> + Send + 'a>>;

/// Release metadata, binary assets are not transferred
#[derive(Deserialize, Serialize, Debug, Default, PartialEq, Eq, Clone)]
pub struct Release {
    /// Tag the release points to
    pub tag: String,

    /// Release title
    pub name: String,

    /// Release notes
    pub body: String,

    /// Draft release
    pub is_draft: bool,

    /// Pre-release
    pub is_prerelease: bool,

    /// Download URLs of the attached assets
    pub asset_refs: Vec<String>,
}

/// Result of a release creation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateOutcome {
    /// The release was created
    Created,

    /// A release with the same tag already exists
    AlreadyExists,
}

/// Remote API for repository metadata
pub trait MetadataApi: Sync + Send {
    /// Releases of the source, newest first
    fn list_releases(&self, source_url: &str, token: &str) -> MetadataFuture<'_, Vec<Release>>;

    /// Create a release on the target
    fn create_release(
        &self,
        target_url: &str,
        token: &str,
        release: &Release,
    ) -> MetadataFuture<'_, CreateOutcome>;

    /// Description of the source
    fn get_description(&self, source_url: &str, token: &str) -> MetadataFuture<'_, String>;

    /// Replace the description of the target
    fn set_description(
        &self,
        target_url: &str,
        token: &str,
        text: &str,
    ) -> MetadataFuture<'_, ()>;

    /// Offline check that `url` designates a repository of this API
    /// # Errors
    /// `NotFound` if the location can't be resolved to a repository
    fn check_location(&self, url: &str) -> Result<(), MetadataError>;
}

/// Kind of metadata failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MetadataErrorKind {
    /// Missing or invalid token, or insufficient scope
    Unauthorized,

    /// API rate limit hit
    RateLimited,

    /// Repository unreachable through the API
    NotFound,

    /// Server side or connection failure
    TransientServerError,

    /// Request refused for another reason
    Rejected,

    /// Response could not be understood
    InvalidResponse,
}

/// Metadata failure with the API error body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataError {
    /// Failure kind
    pub kind: MetadataErrorKind,

    /// API error body or diagnostic
    pub message: String,

    /// Wait requested by the API before retrying
    pub retry_after: Option<Duration>,
}

impl MetadataError {
    /// Create a new metadata error
    pub fn new<S: Into<String>>(kind: MetadataErrorKind, message: S) -> Self {
        Self {
            kind,
            message: message.into(),
            retry_after: None,
        }
    }

    /// Attach the wait requested by the API
    pub fn with_retry_after(mut self, wait: Option<Duration>) -> Self {
        self.retry_after = wait;
        self
    }
}

impl fmt::Display for MetadataError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

impl std::error::Error for MetadataError {}

impl Retryable for MetadataError {
    fn retry_decision(&self) -> RetryDecision {
        match (self.kind, self.retry_after) {
            (MetadataErrorKind::RateLimited, Some(wait)) => RetryDecision::RetryAfter(wait),
            (MetadataErrorKind::RateLimited | MetadataErrorKind::TransientServerError, _) => {
                RetryDecision::Retry
            }
            _ => RetryDecision::Stop,
        }
    }
}

impl From<reqwest::Error> for MetadataError {
    fn from(e: reqwest::Error) -> Self {
        let kind = if e.is_timeout() || e.is_connect() || e.is_request() {
            MetadataErrorKind::TransientServerError
        } else {
            MetadataErrorKind::InvalidResponse
        };
        Self::new(kind, e.to_string())
    }
}

impl From<serde_json::Error> for MetadataError {
    fn from(e: serde_json::Error) -> Self {
        Self::new(MetadataErrorKind::InvalidResponse, e.to_string())
    }
}
