//! Migration orchestrator: runs the steps of a plan in order
use std::{fmt, sync::Arc};

use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::errors::GitMigratorError;
use crate::metadata::{CreateOutcome, MetadataApi};
use crate::plan::{Action, MigrationPlan};
use crate::progress::{Phase, ProgressSink, ProgressTracker};
use crate::transport::{
    ensure_empty_destination, git::mirror_dir, redact, Transport, TransportError,
};
use crate::workdir::WorkDir;

/// Percent reached once the run has started
const STEPS_START: u8 = 5;

/// Percent reached once every step is done
const STEPS_END: u8 = 95;

/// Outcome of a step, or of one item inside a step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Outcome {
    /// Done
    Success,
    /// Nothing had to be done
    Skipped,
    /// Some items failed, others did not
    PartialFailure,
    /// Not done
    Failed,
}

/// Result of one item of a step, e.g. one release
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemResult {
    /// Item name
    pub name: String,
    /// Item outcome
    pub outcome: Outcome,
    /// Details
    pub message: String,
}

/// Result of one step
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepResult {
    /// Migrated action
    pub action: Action,
    /// Step outcome
    pub outcome: Outcome,
    /// Details, including the failure diagnostic
    pub message: String,
    /// Per-item results
    pub items: Vec<ItemResult>,
}

impl StepResult {
    /// Step result without items
    fn new<S: Into<String>>(action: Action, outcome: Outcome, message: S) -> Self {
        Self {
            action,
            outcome,
            message: message.into(),
            items: vec![],
        }
    }
}

/// Outcome of a whole run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Overall {
    /// Every requested step succeeded
    Success,
    /// Some steps failed, some succeeded
    PartialFailure,
    /// Every requested step failed
    Failed,
    /// Cancelled before every step could run
    Aborted,
}

impl fmt::Display for Overall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Overall::Success => "success",
            Overall::PartialFailure => "partial failure",
            Overall::Failed => "failed",
            Overall::Aborted => "aborted",
        };
        write!(f, "{text}")
    }
}

/// Final report of a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationResult {
    /// Results in execution order
    step_results: Vec<StepResult>,
    /// Aggregated outcome
    overall: Overall,
    /// Non fatal cleanup problems
    cleanup_warnings: Vec<String>,
}

impl MigrationResult {
    /// Results in execution order
    pub fn step_results(&self) -> &[StepResult] {
        &self.step_results
    }

    /// Aggregated outcome
    pub fn overall(&self) -> Overall {
        self.overall
    }

    /// Non fatal cleanup problems
    pub fn cleanup_warnings(&self) -> &[String] {
        &self.cleanup_warnings
    }

    /// Human readable multi-line summary
    pub fn summary(&self) -> String {
        let mut lines = vec![format!("Migration {}", self.overall)];
        for step in &self.step_results {
            lines.push(format!(
                "- {}: {:?} - {}",
                step.action, step.outcome, step.message
            ));
            for item in step.items.iter().filter(|i| i.outcome == Outcome::Failed) {
                lines.push(format!("    {}: {}", item.name, item.message));
            }
        }
        lines.join("\n")
    }
}

/// Aggregate step outcomes
fn overall_of(steps: &[StepResult], cancelled: bool) -> Overall {
    if cancelled {
        return Overall::Aborted;
    }
    let count = |outcome: Outcome| steps.iter().filter(|s| s.outcome == outcome).count();
    let failed = count(Outcome::Failed);
    let partial = count(Outcome::PartialFailure);
    match (failed, partial) {
        (0, 0) => Overall::Success,
        (failed, 0) if failed == steps.len() => Overall::Failed,
        _ => Overall::PartialFailure,
    }
}

/// Aggregate item outcomes into a step outcome
fn outcome_of(items: &[ItemResult]) -> Outcome {
    let count = |outcome: Outcome| items.iter().filter(|i| i.outcome == outcome).count();
    let failed = count(Outcome::Failed);
    if failed == 0 {
        if count(Outcome::Skipped) == items.len() {
            Outcome::Skipped
        } else {
            Outcome::Success
        }
    } else if failed == items.len() {
        Outcome::Failed
    } else {
        Outcome::PartialFailure
    }
}

/// Orchestrator state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Plan checks, nothing touched yet
    Validating,
    /// Working directory acquisition
    Preparing,
    /// Mirror clone and push
    TransferringCommits,
    /// Releases transfer
    MigratingReleases,
    /// Description transfer
    MigratingDescription,
    /// Working directory removal
    CleaningUp,
    /// Finished
    Done,
    /// Rejected or cancelled
    Aborted,
}

/// Runs migration plans with injected clients
pub struct Orchestrator {
    /// Git transport
    transport: Arc<dyn Transport>,

    /// Hosting API
    metadata: Arc<dyn MetadataApi>,

    /// Progress consumer
    sink: Arc<dyn ProgressSink>,
}

impl Orchestrator {
    /// Create a new Orchestrator
    pub fn new(
        transport: Arc<dyn Transport>,
        metadata: Arc<dyn MetadataApi>,
        sink: Arc<dyn ProgressSink>,
    ) -> Self {
        Self {
            transport,
            metadata,
            sink,
        }
    }

    /// Run one migration
    ///
    /// Steps run one after the other. `cancel` is checked before each step; a
    /// running step always completes.
    /// # Errors
    /// Configuration error if the plan is invalid, work dir error if the working
    /// directory can't be prepared. Step failures are reported in the result.
    pub async fn run(
        &self,
        plan: &MigrationPlan,
        cancel: &CancellationToken,
    ) -> Result<MigrationResult, GitMigratorError> {
        let mut run = Run::new(self, plan);
        run.transition(State::Validating);
        if let Err(e) = plan.validate() {
            run.transition(State::Aborted);
            return Err(e);
        }
        run.emit(
            Phase::Starting,
            0,
            format!(
                "Migrating {} to {}{}",
                redact(&plan.source_url),
                redact(&plan.target_url),
                if plan.dry_run { " (dry run)" } else { "" }
            ),
        );
        if plan.actions.is_empty() {
            run.transition(State::Done);
            run.emit(Phase::Done, 100, "Nothing to migrate");
            return Ok(run.finish(false));
        }

        run.transition(State::Preparing);
        let prepared = match &plan.temp_dir {
            Some(path) if plan.dry_run => Ok(WorkDir::planned(path)),
            Some(path) => WorkDir::borrowed(path),
            None => WorkDir::create(),
        };
        let mut work_dir = match prepared {
            Ok(work_dir) => work_dir,
            Err(e) => {
                run.transition(State::Aborted);
                return Err(e);
            }
        };

        let mut cancelled = false;
        for (idx, action) in plan.actions.iter().enumerate() {
            if cancel.is_cancelled() {
                log::warn!("Migration cancelled, {action} not started");
                cancelled = true;
                break;
            }
            run.step = idx;
            match action {
                Action::Commits => run.transfer_commits(&mut work_dir).await,
                Action::Releases => run.migrate_releases().await,
                Action::Description => run.migrate_description().await,
            }
        }

        run.transition(State::CleaningUp);
        run.emit(Phase::Cleanup, STEPS_END, "Cleaning up");
        let work_dir_path = work_dir.path().to_path_buf();
        if let Err(e) = work_dir.cleanup() {
            let warning = format!("unable to remove {}: {e}", work_dir_path.display());
            log::warn!("{warning}");
            run.cleanup_warnings.push(warning);
        }

        if cancelled {
            run.transition(State::Aborted);
            run.emit(Phase::Done, 0, "Migration cancelled");
        } else {
            run.transition(State::Done);
            let overall = overall_of(&run.steps, false);
            run.emit(Phase::Done, 100, format!("Migration {overall}"));
        }
        Ok(run.finish(cancelled))
    }
}

/// State of one migration run
struct Run<'a> {
    /// Clients
    orchestrator: &'a Orchestrator,
    /// Plan being run
    plan: &'a MigrationPlan,
    /// Current state
    state: State,
    /// Monotonic progress
    tracker: ProgressTracker,
    /// Index of the current step
    step: usize,
    /// Finished steps
    steps: Vec<StepResult>,
    /// Cleanup problems
    cleanup_warnings: Vec<String>,
}

impl<'a> Run<'a> {
    /// Start a run
    fn new(orchestrator: &'a Orchestrator, plan: &'a MigrationPlan) -> Self {
        Self {
            orchestrator,
            plan,
            state: State::Validating,
            tracker: ProgressTracker::default(),
            step: 0,
            steps: vec![],
            cleanup_warnings: vec![],
        }
    }

    /// Move to another state
    fn transition(&mut self, state: State) {
        log::debug!("{:?} -> {:?}", self.state, state);
        self.state = state;
    }

    /// Send a progress event to the sink
    fn emit<S: Into<String>>(&mut self, phase: Phase, percent: u8, message: S) {
        let event = self.tracker.event(phase, percent, message);
        self.orchestrator.sink.emit(&event);
    }

    /// Percent at `fraction` of the current step
    fn percent(&self, fraction: f64) -> u8 {
        let total = self.plan.actions.len().max(1) as f64;
        let span = f64::from(STEPS_END - STEPS_START) / total;
        let value = f64::from(STEPS_START) + span * (self.step as f64 + fraction.clamp(0.0, 1.0));
        value.round() as u8
    }

    /// Log a per-item detail, louder in verbose mode
    fn detail(&self, text: &str) {
        if self.plan.verbose {
            log::info!("{text}");
        } else {
            log::debug!("{text}");
        }
    }

    /// Record a finished step
    fn record(&mut self, result: StepResult) {
        log::info!(
            "{}: {:?} - {}",
            result.action,
            result.outcome,
            result.message
        );
        self.steps.push(result);
    }

    /// Freeze the result
    fn finish(self, cancelled: bool) -> MigrationResult {
        MigrationResult {
            overall: overall_of(&self.steps, cancelled),
            step_results: self.steps,
            cleanup_warnings: self.cleanup_warnings,
        }
    }

    /// Token for API steps, guaranteed by validation
    fn token(&self) -> Option<&'a str> {
        self.plan.token.as_deref()
    }

    /// Mirror clone then mirror push
    async fn transfer_commits(&mut self, work_dir: &mut WorkDir) {
        self.transition(State::TransferringCommits);
        let (plan, orchestrator) = (self.plan, self.orchestrator);
        let transport = &orchestrator.transport;
        let mirror = mirror_dir(work_dir.path());

        self.emit(
            Phase::Cloning,
            self.percent(0.0),
            format!("Cloning {}", redact(&plan.source_url)),
        );
        let cloned: Result<(), TransportError> = if plan.dry_run {
            transport
                .check_remote(&plan.source_url)
                .and_then(|_| ensure_empty_destination(&mirror))
        } else {
            if ensure_empty_destination(&mirror).is_ok() {
                work_dir.track(mirror.clone());
            }
            transport
                .mirror_clone(&plan.source_url, self.token(), &mirror)
                .await
        };
        if let Err(e) = cloned {
            self.record(StepResult::new(
                Action::Commits,
                Outcome::Failed,
                format!("clone failed: {e}"),
            ));
            return;
        }

        self.emit(
            Phase::Pushing,
            self.percent(0.5),
            format!("Pushing to {}", redact(&plan.target_url)),
        );
        let pushed = if plan.dry_run {
            transport.check_remote(&plan.target_url)
        } else {
            transport
                .mirror_push(&mirror, &plan.target_url, self.token(), plan.push_mode)
                .await
        };
        let result = match pushed {
            Ok(()) if plan.dry_run => StepResult::new(
                Action::Commits,
                Outcome::Success,
                "branches and tags would be mirrored",
            ),
            Ok(()) => StepResult::new(
                Action::Commits,
                Outcome::Success,
                "branches and tags mirrored",
            ),
            Err(e) => StepResult::new(
                Action::Commits,
                Outcome::Failed,
                format!("push failed: {e}"),
            ),
        };
        self.record(result);
    }

    /// List source releases, create them on the target
    async fn migrate_releases(&mut self) {
        self.transition(State::MigratingReleases);
        let (plan, orchestrator) = (self.plan, self.orchestrator);
        let metadata = &orchestrator.metadata;
        self.emit(
            Phase::MigratingReleases,
            self.percent(0.0),
            "Migrating releases",
        );
        let Some(token) = self.token() else {
            self.record(StepResult::new(Action::Releases, Outcome::Failed, "no token"));
            return;
        };

        if plan.dry_run {
            let checked = metadata
                .check_location(&plan.source_url)
                .and_then(|_| metadata.check_location(&plan.target_url));
            let result = match checked {
                Ok(()) => StepResult::new(
                    Action::Releases,
                    Outcome::Success,
                    "releases would be migrated",
                ),
                Err(e) => StepResult::new(Action::Releases, Outcome::Failed, e.to_string()),
            };
            self.record(result);
            return;
        }

        let releases = match metadata.list_releases(&plan.source_url, token).await {
            Ok(releases) => releases,
            Err(e) => {
                self.record(StepResult::new(
                    Action::Releases,
                    Outcome::Failed,
                    format!("unable to list releases: {e}"),
                ));
                return;
            }
        };
        if releases.is_empty() {
            self.record(StepResult::new(
                Action::Releases,
                Outcome::Skipped,
                "no release to migrate",
            ));
            return;
        }

        let total = releases.len();
        let mut items = Vec::with_capacity(total);
        for (idx, release) in releases.iter().enumerate() {
            self.emit(
                Phase::MigratingReleases,
                self.percent(idx as f64 / total as f64),
                format!("Creating release {} ({}/{total})", release.tag, idx + 1),
            );
            let item = match metadata
                .create_release(&plan.target_url, token, release)
                .await
            {
                Ok(CreateOutcome::Created) => (Outcome::Success, "created".to_string()),
                Ok(CreateOutcome::AlreadyExists) => {
                    (Outcome::Skipped, "already exists".to_string())
                }
                Err(e) => (Outcome::Failed, e.to_string()),
            };
            self.detail(&format!("release {}: {}", release.tag, item.1));
            items.push(ItemResult {
                name: release.tag.clone(),
                outcome: item.0,
                message: item.1,
            });
        }

        let count = |outcome: Outcome| items.iter().filter(|i| i.outcome == outcome).count();
        let message = format!(
            "{} created, {} skipped, {} failed",
            count(Outcome::Success),
            count(Outcome::Skipped),
            count(Outcome::Failed)
        );
        self.record(StepResult {
            action: Action::Releases,
            outcome: outcome_of(&items),
            message,
            items,
        });
    }

    /// Copy the description
    async fn migrate_description(&mut self) {
        self.transition(State::MigratingDescription);
        let (plan, orchestrator) = (self.plan, self.orchestrator);
        let metadata = &orchestrator.metadata;
        self.emit(
            Phase::MigratingDescription,
            self.percent(0.0),
            "Migrating description",
        );
        let Some(token) = self.token() else {
            self.record(StepResult::new(Action::Description, Outcome::Failed, "no token"));
            return;
        };

        let result = if plan.dry_run {
            metadata
                .check_location(&plan.source_url)
                .and_then(|_| metadata.check_location(&plan.target_url))
                .map(|_| "description would be copied".to_string())
        } else {
            match metadata.get_description(&plan.source_url, token).await {
                Ok(text) => metadata
                    .set_description(&plan.target_url, token, &text)
                    .await
                    .map(|_| format!("description set to '{text}'")),
                Err(e) => Err(e),
            }
        };
        let result = match result {
            Ok(message) => StepResult::new(Action::Description, Outcome::Success, message),
            Err(e) => StepResult::new(Action::Description, Outcome::Failed, e.to_string()),
        };
        self.record(result);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::metadata::{MetadataError, MetadataErrorKind, MetadataFuture, Release};
    use crate::progress::ProgressEvent;
    use crate::transport::{PushMode, TransportErrorKind, TransportFuture};
    use std::collections::{HashMap, HashSet};
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct MockTransport {
        clones: AtomicUsize,
        pushes: AtomicUsize,
        fail_push: Option<TransportErrorKind>,
        clone_dirs: Mutex<Vec<PathBuf>>,
    }

    impl Transport for MockTransport {
        fn mirror_clone(
            &self,
            _source_url: &str,
            _token: Option<&str>,
            dest_dir: &Path,
        ) -> TransportFuture<'_> {
            self.clones.fetch_add(1, Ordering::SeqCst);
            self.clone_dirs.lock().unwrap().push(dest_dir.to_path_buf());
            let res = std::fs::create_dir_all(dest_dir).map_err(|e| {
                TransportError::new(TransportErrorKind::ProcessFailure, e.to_string())
            });
            Box::pin(async move { res })
        }

        fn mirror_push(
            &self,
            _src_dir: &Path,
            _target_url: &str,
            _token: Option<&str>,
            _mode: PushMode,
        ) -> TransportFuture<'_> {
            self.pushes.fetch_add(1, Ordering::SeqCst);
            let res = match self.fail_push {
                Some(kind) => Err(TransportError::new(kind, "remote: rejected")),
                None => Ok(()),
            };
            Box::pin(async move { res })
        }
    }

    #[derive(Default)]
    struct MockMetadata {
        releases: Vec<Release>,
        rejected: HashMap<String, MetadataErrorKind>,
        existing: Mutex<HashSet<String>>,
        description: String,
        written_description: Mutex<Option<String>>,
        calls: AtomicUsize,
        writes: AtomicUsize,
    }

    impl MetadataApi for MockMetadata {
        fn list_releases(
            &self,
            _source_url: &str,
            _token: &str,
        ) -> MetadataFuture<'_, Vec<Release>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let releases = self.releases.clone();
            Box::pin(async move { Ok(releases) })
        }

        fn create_release(
            &self,
            _target_url: &str,
            _token: &str,
            release: &Release,
        ) -> MetadataFuture<'_, CreateOutcome> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.writes.fetch_add(1, Ordering::SeqCst);
            let res = match self.rejected.get(&release.tag) {
                Some(kind) => Err(MetadataError::new(*kind, "token scope too narrow")),
                None if self.existing.lock().unwrap().insert(release.tag.clone()) => {
                    Ok(CreateOutcome::Created)
                }
                None => Ok(CreateOutcome::AlreadyExists),
            };
            Box::pin(async move { res })
        }

        fn get_description(&self, _source_url: &str, _token: &str) -> MetadataFuture<'_, String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let text = self.description.clone();
            Box::pin(async move { Ok(text) })
        }

        fn set_description(
            &self,
            _target_url: &str,
            _token: &str,
            text: &str,
        ) -> MetadataFuture<'_, ()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.writes.fetch_add(1, Ordering::SeqCst);
            *self.written_description.lock().unwrap() = Some(text.to_string());
            Box::pin(async move { Ok(()) })
        }

        fn check_location(&self, _url: &str) -> Result<(), MetadataError> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        events: Mutex<Vec<ProgressEvent>>,
        cancel_on: Option<(Phase, CancellationToken)>,
    }

    impl ProgressSink for RecordingSink {
        fn emit(&self, event: &ProgressEvent) {
            if let Some((phase, token)) = &self.cancel_on {
                if *phase == event.phase {
                    token.cancel();
                }
            }
            self.events.lock().unwrap().push(event.clone());
        }
    }

    impl RecordingSink {
        /// Phases without consecutive repeats
        fn phases(&self) -> Vec<Phase> {
            let mut phases: Vec<Phase> =
                self.events.lock().unwrap().iter().map(|e| e.phase).collect();
            phases.dedup();
            phases
        }
    }

    fn release(tag: &str) -> Release {
        Release {
            tag: tag.to_string(),
            name: tag.to_string(),
            ..Default::default()
        }
    }

    fn plan(actions: &[Action]) -> MigrationPlan {
        MigrationPlan::new("https://github.com/o/src", "https://github.com/o/dst")
            .with_actions(actions.iter().copied())
    }

    async fn run(
        transport: &Arc<MockTransport>,
        metadata: &Arc<MockMetadata>,
        sink: &Arc<RecordingSink>,
        plan: &MigrationPlan,
    ) -> Result<MigrationResult, GitMigratorError> {
        Orchestrator::new(transport.clone(), metadata.clone(), sink.clone())
            .run(plan, &CancellationToken::new())
            .await
    }

    #[tokio::test]
    async fn empty_plan_is_success() {
        let transport = Arc::new(MockTransport::default());
        let metadata = Arc::new(MockMetadata::default());
        let sink = Arc::new(RecordingSink::default());
        let result = run(&transport, &metadata, &sink, &plan(&[])).await.unwrap();
        assert_eq!(result.overall(), Overall::Success);
        assert!(result.step_results().is_empty());
        assert_eq!(transport.clones.load(Ordering::SeqCst), 0);
        assert_eq!(sink.phases(), vec![Phase::Starting, Phase::Done]);
    }

    #[tokio::test]
    async fn token_required_actions_fail_fast() {
        for action in [Action::Releases, Action::Description] {
            let transport = Arc::new(MockTransport::default());
            let metadata = Arc::new(MockMetadata::default());
            let sink = Arc::new(RecordingSink::default());
            let err = run(&transport, &metadata, &sink, &plan(&[Action::Commits, action]))
                .await
                .unwrap_err();
            assert!(err.is_configuration());
            assert_eq!(transport.clones.load(Ordering::SeqCst), 0);
            assert_eq!(transport.pushes.load(Ordering::SeqCst), 0);
            assert_eq!(metadata.calls.load(Ordering::SeqCst), 0);
            assert!(sink.events.lock().unwrap().is_empty());
        }
    }

    #[tokio::test]
    async fn full_migration_succeeds() {
        let transport = Arc::new(MockTransport::default());
        let metadata = Arc::new(MockMetadata {
            releases: vec![release("v2"), release("v1")],
            description: "A tool".to_string(),
            ..Default::default()
        });
        let sink = Arc::new(RecordingSink::default());
        let plan = plan(&Action::ALL).with_token(Some("tok"));
        let result = run(&transport, &metadata, &sink, &plan).await.unwrap();

        assert_eq!(result.overall(), Overall::Success);
        let actions: Vec<_> = result.step_results().iter().map(|s| s.action).collect();
        assert_eq!(actions, Action::ALL.to_vec());
        assert_eq!(
            metadata.written_description.lock().unwrap().as_deref(),
            Some("A tool")
        );
        let tags: Vec<_> = result.step_results()[1]
            .items
            .iter()
            .map(|i| i.name.as_str())
            .collect();
        assert_eq!(tags, vec!["v2", "v1"]);
        assert_eq!(
            sink.phases(),
            vec![
                Phase::Starting,
                Phase::Cloning,
                Phase::Pushing,
                Phase::MigratingReleases,
                Phase::MigratingDescription,
                Phase::Cleanup,
                Phase::Done
            ]
        );
        let events = sink.events.lock().unwrap();
        assert!(events.windows(2).all(|w| w[0].percent <= w[1].percent));
        assert_eq!(events.last().map(|e| e.percent), Some(100));
    }

    #[tokio::test]
    async fn push_failure_is_isolated() {
        let transport = Arc::new(MockTransport {
            fail_push: Some(TransportErrorKind::AuthRequired),
            ..Default::default()
        });
        let metadata = Arc::new(MockMetadata {
            releases: vec![release("v1")],
            ..Default::default()
        });
        let sink = Arc::new(RecordingSink::default());
        let plan = plan(&[Action::Commits, Action::Releases]).with_token(Some("tok"));
        let result = run(&transport, &metadata, &sink, &plan).await.unwrap();

        assert_eq!(result.overall(), Overall::PartialFailure);
        let steps = result.step_results();
        assert_eq!(steps[0].outcome, Outcome::Failed);
        assert!(steps[0].message.contains("remote: rejected"));
        assert_eq!(steps[1].outcome, Outcome::Success);
    }

    #[tokio::test]
    async fn every_step_failing_is_failed() {
        let transport = Arc::new(MockTransport {
            fail_push: Some(TransportErrorKind::ProcessFailure),
            ..Default::default()
        });
        let metadata = Arc::new(MockMetadata::default());
        let sink = Arc::new(RecordingSink::default());
        let result = run(&transport, &metadata, &sink, &plan(&[Action::Commits]))
            .await
            .unwrap();
        assert_eq!(result.overall(), Overall::Failed);
    }

    #[tokio::test]
    async fn release_rejected_midway_is_partial() {
        let transport = Arc::new(MockTransport::default());
        let metadata = Arc::new(MockMetadata {
            releases: vec![release("v2"), release("v1")],
            rejected: HashMap::from([("v1".to_string(), MetadataErrorKind::Unauthorized)]),
            ..Default::default()
        });
        let sink = Arc::new(RecordingSink::default());
        let plan = plan(&[Action::Releases]).with_token(Some("tok"));
        let result = run(&transport, &metadata, &sink, &plan).await.unwrap();

        assert_eq!(result.overall(), Overall::PartialFailure);
        let step = &result.step_results()[0];
        assert_eq!(step.outcome, Outcome::PartialFailure);
        assert_eq!(step.message, "1 created, 0 skipped, 1 failed");
        let outcomes: Vec<_> = step.items.iter().map(|i| i.outcome).collect();
        assert_eq!(outcomes, vec![Outcome::Success, Outcome::Failed]);
        assert!(step.items[1].message.contains("Unauthorized"));
    }

    #[tokio::test]
    async fn rerun_skips_existing_releases() {
        let transport = Arc::new(MockTransport::default());
        let metadata = Arc::new(MockMetadata {
            releases: vec![release("v1")],
            ..Default::default()
        });
        let sink = Arc::new(RecordingSink::default());
        let plan = plan(&[Action::Releases]).with_token(Some("tok"));
        let first = run(&transport, &metadata, &sink, &plan).await.unwrap();
        let second = run(&transport, &metadata, &sink, &plan).await.unwrap();

        assert_eq!(first.step_results()[0].outcome, Outcome::Success);
        assert_eq!(second.step_results()[0].outcome, Outcome::Skipped);
        assert_eq!(second.overall(), Overall::Success);
        assert_eq!(metadata.existing.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn dry_run_mirrors_real_run_without_calls() {
        let real_sink = Arc::new(RecordingSink::default());
        let metadata = Arc::new(MockMetadata {
            releases: vec![release("v1"), release("v0")],
            ..Default::default()
        });
        let plan = plan(&Action::ALL).with_token(Some("tok"));
        let real = run(
            &Arc::new(MockTransport::default()),
            &metadata,
            &real_sink,
            &plan,
        )
        .await
        .unwrap();

        let transport = Arc::new(MockTransport::default());
        let metadata = Arc::new(MockMetadata::default());
        let dry_sink = Arc::new(RecordingSink::default());
        let dry = run(&transport, &metadata, &dry_sink, &plan.clone().with_dry_run(true))
            .await
            .unwrap();

        assert_eq!(transport.clones.load(Ordering::SeqCst), 0);
        assert_eq!(transport.pushes.load(Ordering::SeqCst), 0);
        assert_eq!(metadata.calls.load(Ordering::SeqCst), 0);
        assert_eq!(dry.step_results().len(), real.step_results().len());
        assert_eq!(dry_sink.phases(), real_sink.phases());
        assert_eq!(dry.overall(), Overall::Success);
    }

    #[tokio::test]
    async fn owned_work_dir_is_removed() {
        for fail_push in [None, Some(TransportErrorKind::NetworkError)] {
            let transport = Arc::new(MockTransport {
                fail_push,
                ..Default::default()
            });
            let metadata = Arc::new(MockMetadata::default());
            let sink = Arc::new(RecordingSink::default());
            run(&transport, &metadata, &sink, &plan(&[Action::Commits]))
                .await
                .unwrap();
            let clone_dirs = transport.clone_dirs.lock().unwrap();
            let work_dir = clone_dirs[0].parent().unwrap();
            assert!(!work_dir.exists());
        }
    }

    #[tokio::test]
    async fn caller_work_dir_is_kept() {
        let dir = tempfile::tempdir().unwrap();
        let temp_dir = dir.path().join("work");
        let transport = Arc::new(MockTransport::default());
        let metadata = Arc::new(MockMetadata::default());
        let sink = Arc::new(RecordingSink::default());
        std::fs::create_dir_all(&temp_dir).unwrap();
        std::fs::write(temp_dir.join("notes"), b"x").unwrap();
        let plan = plan(&[Action::Commits]).with_temp_dir(Some(temp_dir.clone()));
        for _ in 0..2 {
            let result = run(&transport, &metadata, &sink, &plan).await.unwrap();
            assert_eq!(result.overall(), Overall::Success);
            assert!(temp_dir.join("notes").exists());
            assert!(!mirror_dir(&temp_dir).exists());
        }
        assert_eq!(transport.clones.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn dry_run_does_not_create_caller_work_dir() {
        let dir = tempfile::tempdir().unwrap();
        let temp_dir = dir.path().join("work");
        let transport = Arc::new(MockTransport::default());
        let metadata = Arc::new(MockMetadata::default());
        let sink = Arc::new(RecordingSink::default());
        let plan = plan(&[Action::Commits])
            .with_temp_dir(Some(temp_dir.clone()))
            .with_dry_run(true);
        let result = run(&transport, &metadata, &sink, &plan).await.unwrap();
        assert_eq!(result.overall(), Overall::Success);
        assert!(!temp_dir.exists());
    }

    #[tokio::test]
    async fn cancellation_lets_running_step_finish() {
        let cancel = CancellationToken::new();
        let transport = Arc::new(MockTransport::default());
        let metadata = Arc::new(MockMetadata {
            releases: vec![release("v1")],
            ..Default::default()
        });
        let sink = Arc::new(RecordingSink {
            cancel_on: Some((Phase::Pushing, cancel.clone())),
            ..Default::default()
        });
        let plan = plan(&[Action::Commits, Action::Releases]).with_token(Some("tok"));
        let result = Orchestrator::new(transport.clone(), metadata.clone(), sink.clone())
            .run(&plan, &cancel)
            .await
            .unwrap();

        assert_eq!(result.overall(), Overall::Aborted);
        assert_eq!(transport.pushes.load(Ordering::SeqCst), 1);
        assert_eq!(result.step_results().len(), 1);
        assert_eq!(metadata.calls.load(Ordering::SeqCst), 0);
        let work_dir = transport.clone_dirs.lock().unwrap()[0]
            .parent()
            .unwrap()
            .to_path_buf();
        assert!(!work_dir.exists());
        assert_eq!(sink.phases().last(), Some(&Phase::Done));
    }

    #[test]
    fn overall_aggregation() {
        let step = |outcome| StepResult::new(Action::Commits, outcome, "");
        assert_eq!(overall_of(&[], false), Overall::Success);
        assert_eq!(
            overall_of(&[step(Outcome::Success), step(Outcome::Skipped)], false),
            Overall::Success
        );
        assert_eq!(
            overall_of(&[step(Outcome::Failed), step(Outcome::Failed)], false),
            Overall::Failed
        );
        assert_eq!(
            overall_of(&[step(Outcome::Failed), step(Outcome::Success)], false),
            Overall::PartialFailure
        );
        assert_eq!(
            overall_of(&[step(Outcome::PartialFailure)], false),
            Overall::PartialFailure
        );
        assert_eq!(overall_of(&[step(Outcome::Success)], true), Overall::Aborted);
    }
}
