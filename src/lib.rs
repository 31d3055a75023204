//! # git-migrator
//!
//! Migrate a git repository (branches, tags) and its GitHub metadata (releases,
//! description) to a new location
//!
//! ## Usage
//!
//! ```txt
//! Usage: git-migrator [OPTIONS] [SOURCE] [TARGET]
//!
//! Arguments:
//!   [SOURCE]  Source repository URL
//!   [TARGET]  Target repository URL
//!
//! Options:
//!   -t, --token <TOKEN>        GitHub token for private repositories, releases and description
//!   -a, --all                  Migrate commits, tags, releases and description
//!       --migrate-releases     Migrate GitHub releases (requires a token)
//!       --fetch-details        Migrate the repository description (requires a token)
//!       --temp-dir <TEMP_DIR>  Custom temporary directory, kept after the migration
//!       --dry-run              Simulate the migration without making changes
//!       --no-force             Refuse to overwrite diverging branches on the target
//!   -i, --interactive          Prompt for missing values and show a progress bar
//!       --json                 Print the result as JSON
//!   -c, --config <CONFIG>      Custom configuration file path
//!       --show-config-path     Show the current config path
//!   -v, --verbose...           Verbose mode (-v, -vv)
//!   -h, --help                 Print help
//!   -V, --version              Print version
//! ```
//!
//! ## Library
//!
//! ```no_run
//! use std::sync::Arc;
//! use git_migrator::{Action, GitTransport, GithubMetadata, LogSink, MigrationPlan, Orchestrator};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn run() -> Result<(), git_migrator::GitMigratorError> {
//! let plan = MigrationPlan::new("https://github.com/old/repo", "https://github.com/new/repo")
//!     .with_action(Action::Commits);
//! let orchestrator = Orchestrator::new(
//!     Arc::new(GitTransport::default()),
//!     Arc::new(GithubMetadata::default()),
//!     Arc::new(LogSink),
//! );
//! let result = orchestrator.run(&plan, &CancellationToken::new()).await?;
//! println!("{}", result.summary());
//! # Ok(())
//! # }
//! ```

#![warn(clippy::all, rust_2018_idioms)]
#![deny(
    missing_docs,
    clippy::all,
    clippy::missing_docs_in_private_items,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::cargo,
    clippy::unwrap_used,
    clippy::expect_used
)]
#![warn(clippy::multiple_crate_versions)]

pub(crate) mod cli;
pub(crate) mod config;
pub(crate) mod errors;
pub(crate) mod metadata;
pub(crate) mod orchestrator;
pub(crate) mod plan;
pub(crate) mod progress;
pub(crate) mod retry;
pub(crate) mod transport;
pub(crate) mod utils;
pub(crate) mod workdir;

mod github;

pub use cli::{
    exit_code, git_migrator_main, GitMigratorCli, EXIT_ABORTED, EXIT_CONFIGURATION,
    EXIT_FAILED, EXIT_PARTIAL_FAILURE,
};
pub use config::{ConfigData, GitMigratorConfig, TransportConfig};
pub use errors::{GitMigratorError, GitMigratorErrorKind};
pub use github::{config::GithubConfig, platform::GithubMetadata, repo::RepoPath};
pub use metadata::{
    CreateOutcome, MetadataApi, MetadataError, MetadataErrorKind, MetadataFuture, Release,
};
pub use orchestrator::{ItemResult, MigrationResult, Orchestrator, Outcome, Overall, StepResult};
pub use plan::{Action, MigrationPlan};
pub use progress::{BarSink, LogSink, Phase, ProgressEvent, ProgressSink};
pub use retry::{RetryDecision, RetryPolicy, Retryable};
pub use transport::{
    check_remote_location, ensure_empty_destination, redact, GitTransport, PushMode, Transport,
    TransportError, TransportErrorKind, TransportFuture,
};
pub use workdir::WorkDir;
