//! Command line options for the git-migrator tool
use std::{collections::BTreeSet, path::PathBuf, sync::Arc};

use clap::Parser;
use tokio_util::sync::CancellationToken;

use crate::{
    config::GitMigratorConfig,
    errors::{GitMigratorError, GitMigratorErrorKind},
    github::config::GithubConfig,
    orchestrator::{MigrationResult, Orchestrator, Overall},
    plan::{Action, MigrationPlan},
    progress::{BarSink, LogSink, ProgressSink},
    transport::{GitTransport, PushMode},
    utils::{get_password, input, yes_no_input},
};

/// Exit code when every step failed, or on an internal error
pub const EXIT_FAILED: i32 = 1;

/// Exit code when some steps failed
pub const EXIT_PARTIAL_FAILURE: i32 = 3;

/// Exit code when the plan was rejected
pub const EXIT_CONFIGURATION: i32 = 4;

/// Exit code when the migration was cancelled
pub const EXIT_ABORTED: i32 = 5;

/// Environment variable holding the token
const TOKEN_ENV: &str = "GITHUB_TOKEN";

/// git-migrator - Migrate a git repository and its GitHub metadata
#[derive(Parser, Default, Clone, Debug)]
#[command(version)]
pub struct GitMigratorCli {
    /// Source repository URL
    pub source: Option<String>,

    /// Target repository URL
    pub target: Option<String>,

    /// GitHub token for private repositories, releases and description
    #[arg(short, long)]
    pub token: Option<String>,

    /// Migrate commits, tags, releases and description
    #[arg(short, long)]
    pub all: bool,

    /// Migrate GitHub releases (requires a token)
    #[arg(long = "migrate-releases")]
    pub migrate_releases: bool,

    /// Migrate the repository description (requires a token)
    #[arg(long = "fetch-details")]
    pub fetch_details: bool,

    /// Custom temporary directory, kept after the migration
    #[arg(long = "temp-dir")]
    pub temp_dir: Option<PathBuf>,

    /// Simulate the migration without making changes
    #[arg(long = "dry-run")]
    pub dry_run: bool,

    /// Refuse to overwrite diverging branches on the target
    #[arg(long = "no-force")]
    pub no_force: bool,

    /// Prompt for missing values and show a progress bar
    #[arg(short, long)]
    pub interactive: bool,

    /// Print the result as JSON
    #[arg(long)]
    pub json: bool,

    /// Custom configuration file path
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Show the current config path
    #[arg(long)]
    pub show_config_path: bool,

    /// Verbose mode (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl GitMigratorCli {
    /// Whether any action flag was given
    fn has_action_flags(&self) -> bool {
        self.all || self.migrate_releases || self.fetch_details
    }

    /// Actions selected by the flags
    pub fn actions(&self) -> BTreeSet<Action> {
        if self.all {
            return Action::ALL.into_iter().collect();
        }
        let mut actions = BTreeSet::new();
        if self.fetch_details {
            actions.insert(Action::Description);
            if !self.migrate_releases {
                return actions;
            }
        }
        actions.insert(Action::Commits);
        if self.migrate_releases {
            actions.insert(Action::Releases);
        }
        actions
    }
}

/// Exit code of a run
pub fn exit_code(result: &Result<Option<MigrationResult>, GitMigratorError>) -> i32 {
    match result {
        Ok(None) => 0,
        Ok(Some(result)) => match result.overall() {
            Overall::Success => 0,
            Overall::PartialFailure => EXIT_PARTIAL_FAILURE,
            Overall::Failed => EXIT_FAILED,
            Overall::Aborted => EXIT_ABORTED,
        },
        Err(e) if e.is_configuration() => EXIT_CONFIGURATION,
        Err(_) => EXIT_FAILED,
    }
}

/// Initialise the logger
fn init_logger(verbose: u8) {
    let level = match verbose {
        0 => log::LevelFilter::Info,
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    let _ = env_logger::builder()
        .filter_level(level)
        .format_target(false)
        .format_timestamp(None)
        .parse_default_env()
        .try_init();
}

/// First non-empty token
fn pick_token<I: IntoIterator<Item = Option<String>>>(candidates: I) -> Option<String> {
    candidates
        .into_iter()
        .flatten()
        .map(|t| t.trim().to_string())
        .find(|t| !t.is_empty())
}

/// Configuration error with a message
fn configuration_error(text: &str) -> GitMigratorError {
    GitMigratorError::new(GitMigratorErrorKind::Configuration).with_text(text)
}

/// Location from the CLI, or from the user in interactive mode
fn location(
    value: Option<String>,
    what: &str,
    interactive: bool,
) -> Result<String, GitMigratorError> {
    match value.filter(|v| !v.trim().is_empty()) {
        Some(value) => Ok(value),
        None if interactive => {
            println!("Please enter the {what}:");
            let value = input()?;
            if value.trim().is_empty() {
                return Err(configuration_error(&format!("the {what} is required")));
            }
            Ok(value)
        }
        None => Err(configuration_error(&format!("the {what} is required"))),
    }
}

/// Ask for each action
fn prompt_actions() -> Result<BTreeSet<Action>, GitMigratorError> {
    let mut actions = BTreeSet::new();
    for action in Action::ALL {
        if yes_no_input(format!("Migrate {action}? (y/n)"))? {
            actions.insert(action);
        }
    }
    Ok(actions)
}

/// Token from the CLI, the environment, the config file, or the user
fn resolve_token(
    config: &mut GitMigratorConfig,
    actions: &BTreeSet<Action>,
) -> Result<Option<String>, GitMigratorError> {
    let token = pick_token([
        config.cli_args.token.clone(),
        std::env::var(TOKEN_ENV).ok(),
        config.token(),
    ]);
    let needs_token = actions.iter().any(Action::requires_token);
    if token.is_some() || !needs_token || !config.cli_args.interactive {
        return Ok(token);
    }
    println!(
        "Please enter your GitHub token (https://github.com/settings/personal-access-tokens):"
    );
    let token = pick_token([Some(get_password()?)]);
    if let Some(value) = &token {
        let question = format!("Save the token to {}? (y/n)", config.config_path.display());
        if yes_no_input(question)? {
            let value = value.clone();
            config.update(|data| {
                let github = data.github.get_or_insert_with(GithubConfig::default);
                github.token = Some(value);
            })?;
        }
    }
    Ok(token)
}

/// Build the migration plan from the CLI, the config and the user
fn build_plan(config: &mut GitMigratorConfig) -> Result<MigrationPlan, GitMigratorError> {
    let interactive = config.cli_args.interactive;
    let source = location(
        config.cli_args.source.clone(),
        "source repository URL",
        interactive,
    )?;
    let target = location(
        config.cli_args.target.clone(),
        "target repository URL",
        interactive,
    )?;
    let actions = if interactive && !config.cli_args.has_action_flags() {
        prompt_actions()?
    } else {
        config.cli_args.actions()
    };
    let token = resolve_token(config, &actions)?;
    Ok(MigrationPlan::new(source, target)
        .with_actions(actions)
        .with_token(token)
        .with_dry_run(config.cli_args.dry_run)
        .with_verbose(config.cli_args.verbose > 0)
        .with_temp_dir(config.temp_dir())
        .with_push_mode(config.push_mode()))
}

/// Warn about what can't be done without a token
fn warn_without_token(plan: &MigrationPlan) {
    if plan.token.is_some() {
        return;
    }
    log::warn!(
        "Running without a GitHub token: description and releases migration and private \
         repositories are unavailable, only public commits and tags can be migrated"
    );
}

/// Ask before a forced push
fn confirm_forced_push(plan: &MigrationPlan) -> Result<bool, GitMigratorError> {
    if plan.dry_run || plan.push_mode != PushMode::Force || !plan.has(Action::Commits) {
        return Ok(true);
    }
    yes_no_input(format!(
        "Diverging branches and tags on {} will be overwritten, continue? (y/n)",
        crate::transport::redact(&plan.target_url)
    ))
}

/// Cancel the token on Ctrl-C
fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("Cancellation requested, waiting for the current step to finish");
            token.cancel();
        }
    });
    cancel
}

/// Run the git-migrator tool with the provided command line options
/// # Errors
/// Error if the plan is invalid or the migration can't start
pub async fn git_migrator_main() -> Result<Option<MigrationResult>, GitMigratorError> {
    let args = GitMigratorCli::parse();
    init_logger(args.verbose);
    let _ = dotenv::dotenv();
    let mut config = GitMigratorConfig::try_new(args)?;
    if config.cli_args.show_config_path {
        println!("{}", config.config_path.display());
        return Ok(None);
    }
    let plan = build_plan(&mut config)?;
    log::debug!("{plan:?}");
    warn_without_token(&plan);
    if config.cli_args.interactive && !confirm_forced_push(&plan)? {
        return Err(configuration_error("forced push not confirmed"));
    }

    let sink: Arc<dyn ProgressSink> = if config.cli_args.interactive {
        Arc::new(BarSink::new())
    } else {
        Arc::new(LogSink)
    };
    let orchestrator = Orchestrator::new(
        Arc::new(GitTransport::default()),
        Arc::new(GithubConfig::get_client(&config)),
        sink,
    );
    let result = orchestrator.run(&plan, &cancel_on_ctrl_c()).await?;
    if config.cli_args.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        println!("{}", result.summary());
    }
    Ok(Some(result))
}
