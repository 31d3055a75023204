//! Migration plan: what to migrate and how
use std::{collections::BTreeSet, fmt, path::PathBuf};

use serde::{Deserialize, Serialize};

use crate::errors::{GitMigratorError, GitMigratorErrorKind};
use crate::transport::PushMode;

/// One selectable unit of migration
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Action {
    /// Branches and tags, through the git transport
    Commits,

    /// Releases metadata, through the hosting API
    Releases,

    /// Repository description, through the hosting API
    Description,
}

impl Action {
    /// Every action, in execution order
    pub const ALL: [Action; 3] = [Action::Commits, Action::Releases, Action::Description];

    /// Whether this action needs an API token
    pub fn requires_token(&self) -> bool {
        !matches!(self, Action::Commits)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Commits => write!(f, "commits and tags"),
            Action::Releases => write!(f, "releases"),
            Action::Description => write!(f, "description"),
        }
    }
}

/// Declarative description of one migration run
#[derive(Clone, Default)]
pub struct MigrationPlan {
    /// Source remote location
    pub source_url: String,

    /// Target remote location
    pub target_url: String,

    /// Credential used for the API and the git transport
    pub token: Option<String>,

    /// Selected actions, iterated in execution order
    pub actions: BTreeSet<Action>,

    /// Simulate every step without persisting anything
    pub dry_run: bool,

    /// Verbose progress messages
    pub verbose: bool,

    /// Caller-owned working directory
    pub temp_dir: Option<PathBuf>,

    /// How refs are written to the target
    pub push_mode: PushMode,
}

impl fmt::Debug for MigrationPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MigrationPlan")
            .field("source_url", &self.source_url)
            .field("target_url", &self.target_url)
            .field("token", &self.token.as_ref().map(|_| "***"))
            .field("actions", &self.actions)
            .field("dry_run", &self.dry_run)
            .field("verbose", &self.verbose)
            .field("temp_dir", &self.temp_dir)
            .field("push_mode", &self.push_mode)
            .finish()
    }
}

impl MigrationPlan {
    /// Create an empty plan between two locations
    pub fn new<S: Into<String>, T: Into<String>>(source_url: S, target_url: T) -> Self {
        Self {
            source_url: source_url.into(),
            target_url: target_url.into(),
            ..Default::default()
        }
    }

    /// Select an action
    pub fn with_action(mut self, action: Action) -> Self {
        self.actions.insert(action);
        self
    }

    /// Select several actions
    pub fn with_actions<I: IntoIterator<Item = Action>>(mut self, actions: I) -> Self {
        self.actions.extend(actions);
        self
    }

    /// Set the token, empty strings are treated as absent
    pub fn with_token<S: Into<String>>(mut self, token: Option<S>) -> Self {
        self.token = token.map(Into::into).filter(|t| !t.is_empty());
        self
    }

    /// Toggle dry-run
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Toggle verbose messages
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Use a caller-owned working directory
    pub fn with_temp_dir(mut self, temp_dir: Option<PathBuf>) -> Self {
        self.temp_dir = temp_dir;
        self
    }

    /// Set the push mode
    pub fn with_push_mode(mut self, push_mode: PushMode) -> Self {
        self.push_mode = push_mode;
        self
    }

    /// Whether an action is selected
    pub fn has(&self, action: Action) -> bool {
        self.actions.contains(&action)
    }

    /// Actions that need a token the plan does not carry
    pub fn missing_token_for(&self) -> Vec<Action> {
        if self.token.is_some() {
            return vec![];
        }
        self.actions
            .iter()
            .copied()
            .filter(Action::requires_token)
            .collect()
    }

    /// Reject a plan that cannot run
    /// # Errors
    /// Configuration error if a selected action requires a missing token
    pub fn validate(&self) -> Result<(), GitMigratorError> {
        let missing = self.missing_token_for();
        if !missing.is_empty() {
            let names = missing
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ");
            return Err(GitMigratorError::new(GitMigratorErrorKind::Configuration)
                .with_text(&format!("a token is required to migrate: {names}")));
        }
        Ok(())
    }
}
