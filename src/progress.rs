//! Progress events emitted during a migration
use std::fmt;

use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;

/// Migration phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Phase {
    /// Run started
    Starting,
    /// Mirror clone of the source
    Cloning,
    /// Mirror push to the target
    Pushing,
    /// Releases transfer
    MigratingReleases,
    /// Description transfer
    MigratingDescription,
    /// Working directory removal
    Cleanup,
    /// Run finished
    Done,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Starting => "starting",
            Phase::Cloning => "cloning",
            Phase::Pushing => "pushing",
            Phase::MigratingReleases => "releases",
            Phase::MigratingDescription => "description",
            Phase::Cleanup => "cleanup",
            Phase::Done => "done",
        };
        write!(f, "{name}")
    }
}

/// A progress notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgressEvent {
    /// Current phase
    pub phase: Phase,

    /// Completion, 0 to 100
    pub percent: u8,

    /// Human readable status
    pub message: String,
}

/// Consumer of progress events
///
/// Called synchronously from the migration, in order.
pub trait ProgressSink: Send + Sync {
    /// Handle one event
    fn emit(&self, event: &ProgressEvent);
}

/// Keeps percentages monotonic within one run
#[derive(Debug, Default)]
pub(crate) struct ProgressTracker {
    /// Last emitted percent
    percent: u8,
}

impl ProgressTracker {
    /// Build the next event, never going backwards nor above 100
    pub(crate) fn event<S: Into<String>>(
        &mut self,
        phase: Phase,
        percent: u8,
        message: S,
    ) -> ProgressEvent {
        self.percent = self.percent.max(percent.min(100));
        ProgressEvent {
            phase,
            percent: self.percent,
            message: message.into(),
        }
    }
}

/// Prints every event as a log line
#[derive(Debug, Default, Clone)]
pub struct LogSink;

impl ProgressSink for LogSink {
    fn emit(&self, event: &ProgressEvent) {
        log::info!("[{:>3}%] {}", event.percent, event.message);
    }
}

/// Drives a terminal progress bar
#[derive(Debug, Clone)]
pub struct BarSink {
    /// Underlying bar
    pb: ProgressBar,
}

impl BarSink {
    /// Create a bar going from 0 to 100
    pub fn new() -> Self {
        let pb = ProgressBar::new(100);
        if let Some(style) = get_style() {
            pb.set_style(style);
        }
        Self { pb }
    }
}

impl Default for BarSink {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressSink for BarSink {
    fn emit(&self, event: &ProgressEvent) {
        self.pb.set_position(u64::from(event.percent));
        self.pb.set_prefix(event.phase.to_string());
        match event.phase {
            Phase::Done => self.pb.finish_with_message(event.message.clone()),
            _ => self.pb.set_message(event.message.clone()),
        }
    }
}

/// get ProgressStyle
fn get_style() -> Option<ProgressStyle> {
    let template = "{prefix:>12.bold.dim} [{bar:30}] {pos:>3}% {wide_msg}";
    match ProgressStyle::with_template(template) {
        Ok(s) => Some(s.progress_chars("=> ")),
        Err(_) => None,
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn percent_is_monotonic() {
        let mut tracker = ProgressTracker::default();
        assert_eq!(tracker.event(Phase::Starting, 0, "").percent, 0);
        assert_eq!(tracker.event(Phase::Cloning, 40, "").percent, 40);
        assert_eq!(tracker.event(Phase::Cleanup, 20, "").percent, 40);
        assert_eq!(tracker.event(Phase::Done, 250, "").percent, 100);
    }

    #[test]
    fn style_template_is_valid() {
        assert!(get_style().is_some());
    }
}
