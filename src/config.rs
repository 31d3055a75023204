//! Configuration handling
use std::{
    fs::{create_dir_all, read_to_string, File},
    io::Write,
    path::PathBuf,
};

use home::home_dir;
use serde::{Deserialize, Serialize};

use crate::{
    cli::GitMigratorCli, errors::GitMigratorError, github::config::GithubConfig,
    transport::PushMode,
};

/// Configuration data
#[derive(Default, Clone, Debug)]
pub struct GitMigratorConfig {
    /// path to the configuration file
    pub config_path: PathBuf,

    /// actual configuration data
    pub config_data: ConfigData,

    /// CLI arguments
    pub cli_args: GitMigratorCli,
}

/// Content of the configuration file
#[derive(Deserialize, Serialize, Default, Clone, Debug)]
pub struct ConfigData {
    /// Github configuration
    pub github: Option<GithubConfig>,

    /// Transport configuration
    pub transport: Option<TransportConfig>,
}

/// Transport configuration
#[derive(Deserialize, Serialize, Default, Clone, Debug)]
pub struct TransportConfig {
    /// Overwrite diverging refs on the target
    pub force: Option<bool>,

    /// Default working directory
    pub temp_dir: Option<PathBuf>,
}

impl GitMigratorConfig {
    /// Create a new Config object from the CLI path or the default path
    /// # Errors
    /// Error if the config file can't be opened or parsed
    pub fn try_new(cli_args: GitMigratorCli) -> Result<Self, GitMigratorError> {
        let config_path = match cli_args.config.clone() {
            Some(p) => p,
            None => Self::get_config_path()?,
        };
        let config_data = if config_path.exists() {
            let contents = read_to_string(&config_path)
                .map_err(|e| GitMigratorError::new_with_source("Unable to open", e))?;
            toml::from_str(&contents)?
        } else {
            ConfigData::default()
        };
        Ok(GitMigratorConfig {
            config_path,
            config_data,
            cli_args,
        })
    }

    /// Save the config data to the config file
    /// # Errors
    /// Error if the config file can't be created or written to
    pub fn save(&self) -> Result<(), GitMigratorError> {
        let config_str = toml::to_string(&self.config_data)?;
        if let Some(parent) = self.config_path.parent() {
            create_dir_all(parent)
                .map_err(|e| GitMigratorError::new_with_source("Unable to create config dir", e))?;
        }
        let mut file = File::create(&self.config_path)
            .map_err(|e| GitMigratorError::new_with_source("Unable to create config file", e))?;
        file.write_all(config_str.as_bytes())?;
        Ok(())
    }

    /// Get the path to the config file
    /// # Errors
    /// Error if the home directory can't be found
    pub fn get_config_path() -> Result<PathBuf, GitMigratorError> {
        let home_dir = match home_dir() {
            Some(path) if !path.as_os_str().is_empty() => path,
            _ => return Err("Unable to get your home dir! home::home_dir() isn't working".into()),
        };
        Ok(home_dir
            .join(".config")
            .join(".git-migrator")
            .join("config.toml"))
    }

    /// Update the config data and save it to the config file
    /// # Errors
    /// Error if fail to save config
    pub fn update(
        &mut self,
        updater_fn: impl FnOnce(&mut ConfigData),
    ) -> Result<(), GitMigratorError> {
        updater_fn(&mut self.config_data);
        self.save()?;
        Ok(())
    }

    /// Token stored in the config file
    pub fn token(&self) -> Option<String> {
        self.config_data
            .github
            .as_ref()
            .and_then(|c| c.token.clone())
            .filter(|t| !t.is_empty())
    }

    /// Push mode, the CLI flag wins over the file
    pub fn push_mode(&self) -> PushMode {
        let force = self
            .config_data
            .transport
            .as_ref()
            .and_then(|t| t.force)
            .unwrap_or(true);
        if self.cli_args.no_force || !force {
            PushMode::FastForward
        } else {
            PushMode::Force
        }
    }

    /// Working directory, the CLI flag wins over the file
    pub fn temp_dir(&self) -> Option<PathBuf> {
        self.cli_args.temp_dir.clone().or_else(|| {
            self.config_data
                .transport
                .as_ref()
                .and_then(|t| t.temp_dir.clone())
        })
    }
}
