//! Github metadata client
use super::{
    release::{NewReleaseGithub, ReleaseGithub},
    repo::{RepoGithub, RepoPath},
    GITHUB_API_HEADER, GITHUB_API_URL, GITHUB_API_VERSION, MAX_RATE_LIMIT_WAIT_SECS, PER_PAGE,
};
use crate::{
    metadata::{
        CreateOutcome, MetadataApi, MetadataError, MetadataErrorKind, MetadataFuture, Release,
    },
    retry::RetryPolicy,
};
use reqwest::{
    header::{HeaderMap, ACCEPT, AUTHORIZATION, RETRY_AFTER, USER_AGENT},
    Method, RequestBuilder, StatusCode,
};
use serde_json::json;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use urlencoding::encode;

/// Remaining requests header
const RATE_LIMIT_REMAINING: &str = "x-ratelimit-remaining";

/// Rate limit reset (epoch seconds) header
const RATE_LIMIT_RESET: &str = "x-ratelimit-reset";

/// Github metadata client
#[derive(Debug, Clone)]
pub struct GithubMetadata {
    /// Base API URL
    api_url: String,

    /// Reqwest client
    client: reqwest::Client,

    /// Retry schedule for rate limits and server errors
    retry: RetryPolicy,
}

impl Default for GithubMetadata {
    fn default() -> Self {
        Self::new(GITHUB_API_URL)
    }
}

impl GithubMetadata {
    /// Create a new GithubMetadata
    pub fn new<S: Into<String>>(api_url: S) -> Self {
        Self {
            api_url: api_url.into().trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
            retry: RetryPolicy::metadata(),
        }
    }

    /// Override the retry schedule
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Authenticated request to an API path
    fn request(&self, method: Method, path: &str, token: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}{}", self.api_url, path))
            .header(AUTHORIZATION, format!("Bearer {token}"))
            .header(ACCEPT, "application/vnd.github+json")
            .header(USER_AGENT, env!("CARGO_PKG_NAME"))
            .header(GITHUB_API_HEADER, GITHUB_API_VERSION)
    }

    /// Send a request and return the body of a successful response
    async fn send(&self, request: RequestBuilder) -> Result<String, MetadataError> {
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response.text().await?);
        }
        let headers = response.headers().clone();
        let body = response.text().await.unwrap_or_default();
        Err(error_from_status(status, &headers, &body))
    }
}

/// Map an API failure to the metadata taxonomy
fn error_from_status(status: StatusCode, headers: &HeaderMap, body: &str) -> MetadataError {
    let exhausted = headers
        .get(RATE_LIMIT_REMAINING)
        .and_then(|v| v.to_str().ok())
        == Some("0");
    let wait = rate_limit_wait(headers, exhausted);
    let kind = match status {
        StatusCode::TOO_MANY_REQUESTS => MetadataErrorKind::RateLimited,
        StatusCode::FORBIDDEN if exhausted || wait.is_some() => MetadataErrorKind::RateLimited,
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => MetadataErrorKind::Unauthorized,
        StatusCode::NOT_FOUND => MetadataErrorKind::NotFound,
        s if s.is_server_error() => MetadataErrorKind::TransientServerError,
        _ => MetadataErrorKind::Rejected,
    };
    let message = match body.trim() {
        "" => status.to_string(),
        body => format!("{status}: {body}"),
    };
    MetadataError::new(kind, message).with_retry_after(wait)
}

/// Wait requested by the API, capped
fn rate_limit_wait(headers: &HeaderMap, exhausted: bool) -> Option<Duration> {
    let header_secs = |name| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
    };
    let secs = match header_secs(RETRY_AFTER.as_str()) {
        Some(secs) => secs,
        None if exhausted => {
            let reset = header_secs(RATE_LIMIT_RESET)?;
            let now = SystemTime::now().duration_since(UNIX_EPOCH).ok()?.as_secs();
            reset.saturating_sub(now)
        }
        None => return None,
    };
    Some(Duration::from_secs(secs.min(MAX_RATE_LIMIT_WAIT_SECS)))
}

impl MetadataApi for GithubMetadata {
    fn list_releases(&self, source_url: &str, token: &str) -> MetadataFuture<'_, Vec<Release>> {
        let source_url = source_url.to_string();
        let token = token.to_string();
        Box::pin(async move {
            let repo = RepoPath::parse(&source_url)?;
            let path = format!("/repos/{}/{}/releases", repo.owner, repo.name);
            let mut page: usize = 1;
            let mut all_releases = vec![];
            loop {
                let (this, path, token) = (self, &path, &token);
                let text = self
                    .retry
                    .run("list releases", move || {
                        this.send(this.request(Method::GET, path, token).query(&[
                            ("per_page", PER_PAGE.to_string()),
                            ("page", page.to_string()),
                        ]))
                    })
                    .await?;
                let releases: Vec<ReleaseGithub> = serde_json::from_str(&text)?;
                let count = releases.len();
                log::debug!("Requested github {repo} releases (page {page}): {count}");
                all_releases.extend(releases.into_iter().map(Release::from));
                if count < PER_PAGE {
                    break;
                }
                page += 1;
            }
            Ok(all_releases)
        })
    }

    fn create_release(
        &self,
        target_url: &str,
        token: &str,
        release: &Release,
    ) -> MetadataFuture<'_, CreateOutcome> {
        let target_url = target_url.to_string();
        let token = token.to_string();
        let release = release.clone();
        Box::pin(async move {
            let repo = RepoPath::parse(&target_url)?;
            let path = format!("/repos/{}/{}/releases", repo.owner, repo.name);
            let payload = NewReleaseGithub::from(&release);
            let (this, path_ref, token_ref, payload) = (self, &path, &token, &payload);
            let created = self
                .retry
                .run("create release", move || {
                    this.send(
                        this.request(Method::POST, path_ref, token_ref)
                            .json(payload),
                    )
                })
                .await;
            match created {
                Ok(_) => Ok(CreateOutcome::Created),
                Err(e) if e.kind == MetadataErrorKind::Rejected => {
                    let tag_path = format!("{path}/tags/{}", encode(&release.tag));
                    match self
                        .send(self.request(Method::GET, &tag_path, &token))
                        .await
                    {
                        Ok(_) => Ok(CreateOutcome::AlreadyExists),
                        Err(_) => Err(e),
                    }
                }
                Err(e) => Err(e),
            }
        })
    }

    fn get_description(&self, source_url: &str, token: &str) -> MetadataFuture<'_, String> {
        let source_url = source_url.to_string();
        let token = token.to_string();
        Box::pin(async move {
            let repo = RepoPath::parse(&source_url)?;
            let path = format!("/repos/{}/{}", repo.owner, repo.name);
            let (this, path, token) = (self, &path, &token);
            let text = self
                .retry
                .run("get description", move || {
                    this.send(this.request(Method::GET, path, token))
                })
                .await?;
            let repo: RepoGithub = serde_json::from_str(&text)?;
            Ok(repo.description.unwrap_or_default())
        })
    }

    fn set_description(
        &self,
        target_url: &str,
        token: &str,
        text: &str,
    ) -> MetadataFuture<'_, ()> {
        let target_url = target_url.to_string();
        let token = token.to_string();
        let body = json!({ "description": text });
        Box::pin(async move {
            let repo = RepoPath::parse(&target_url)?;
            let path = format!("/repos/{}/{}", repo.owner, repo.name);
            let (this, path, token, body) = (self, &path, &token, &body);
            self.retry
                .run("set description", move || {
                    this.send(this.request(Method::PATCH, path, token).json(body))
                })
                .await?;
            Ok(())
        })
    }

    fn check_location(&self, url: &str) -> Result<(), MetadataError> {
        RepoPath::parse(url).map(|_| ())
    }
}
