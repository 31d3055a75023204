//! Bounded retry with a fixed backoff schedule
use std::{fmt::Display, future::Future, time::Duration};

/// What to do after a failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Terminal failure
    Stop,

    /// Retry after the policy delay
    Retry,

    /// Retry after a delay imposed by the remote
    RetryAfter(Duration),
}

/// Errors that know whether they are worth retrying
pub trait Retryable {
    /// Decision for this error
    fn retry_decision(&self) -> RetryDecision;
}

/// Retry schedule: one delay per additional attempt
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RetryPolicy {
    /// Wait before each retry
    delays: Vec<Duration>,
}

impl RetryPolicy {
    /// Policy with an explicit schedule
    pub fn new<I: IntoIterator<Item = Duration>>(delays: I) -> Self {
        Self {
            delays: delays.into_iter().collect(),
        }
    }

    /// Single attempt
    pub fn none() -> Self {
        Self::default()
    }

    /// Git transport schedule: two retries, 2s then 4s
    pub fn transport() -> Self {
        Self::new([Duration::from_secs(2), Duration::from_secs(4)])
    }

    /// API schedule: one retry, 1s unless the remote says otherwise
    pub fn metadata() -> Self {
        Self::new([Duration::from_secs(1)])
    }

    /// Total number of attempts
    pub fn max_attempts(&self) -> usize {
        self.delays.len() + 1
    }

    /// Run `op` until it succeeds, fails terminally, or the schedule is exhausted
    /// # Errors
    /// The last error returned by `op`
    pub async fn run<T, E, F, Fut>(&self, label: &str, mut op: F) -> Result<T, E>
    where
        E: Retryable + Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut attempt = 0;
        loop {
            let err = match op().await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };
            let delay = match (err.retry_decision(), self.delays.get(attempt)) {
                (RetryDecision::Stop, _) | (_, None) => return Err(err),
                (RetryDecision::Retry, Some(delay)) => *delay,
                (RetryDecision::RetryAfter(wait), Some(_)) => wait,
            };
            attempt += 1;
            log::warn!(
                "{label} failed ({err}), retrying in {}s ({attempt}/{})",
                delay.as_secs(),
                self.delays.len()
            );
            tokio::time::sleep(delay).await;
        }
    }
}
