//! Scoped working directory of a migration run
use std::{
    fs::{create_dir, create_dir_all, remove_dir_all},
    io,
    path::{Path, PathBuf},
};

use rand::{distr::Alphanumeric, rng, Rng};

use crate::errors::{GitMigratorError, GitMigratorErrorKind};

/// Working directory, removed on drop when owned
///
/// A caller-supplied directory is never removed, only the scratch entries the run
/// created inside it. Concurrent runs must not share a caller-supplied directory.
#[derive(Debug)]
pub struct WorkDir {
    /// Directory path
    path: PathBuf,

    /// Whether this run created the directory
    owned: bool,

    /// Entries created by the run inside a borrowed directory
    scratch: Vec<PathBuf>,
}

impl WorkDir {
    /// Create a fresh directory under the system temp dir
    /// # Errors
    /// Error if the directory can't be created
    pub fn create() -> Result<Self, GitMigratorError> {
        Self::create_in(&std::env::temp_dir())
    }

    /// Create a fresh directory under `parent`
    /// # Errors
    /// Error if the directory can't be created
    pub fn create_in(parent: &Path) -> Result<Self, GitMigratorError> {
        let rand_string: String = rng()
            .sample_iter(&Alphanumeric)
            .take(10)
            .map(char::from)
            .collect();
        let path = parent.join(format!("git-migrator-{rand_string}"));
        create_dir(&path).map_err(|e| {
            GitMigratorError::new(GitMigratorErrorKind::WorkDir)
                .with_text(&format!("unable to create '{}': {e}", path.display()))
        })?;
        log::debug!("Created working directory {}", path.display());
        Ok(Self {
            path,
            owned: true,
            scratch: vec![],
        })
    }

    /// Use a caller-supplied directory, creating it if missing
    /// # Errors
    /// Error if the directory can't be created
    pub fn borrowed(path: &Path) -> Result<Self, GitMigratorError> {
        create_dir_all(path).map_err(|e| {
            GitMigratorError::new(GitMigratorErrorKind::WorkDir)
                .with_text(&format!("unable to create '{}': {e}", path.display()))
        })?;
        Ok(Self::planned(path))
    }

    /// Use a caller-supplied directory without creating it
    pub fn planned(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            owned: false,
            scratch: vec![],
        }
    }

    /// Remove `entry` at cleanup, even when the directory is borrowed
    pub fn track(&mut self, entry: PathBuf) {
        if !self.owned {
            self.scratch.push(entry);
        }
    }

    /// Directory path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the directory is removed by this run
    pub fn is_owned(&self) -> bool {
        self.owned
    }

    /// Remove the directory now, if owned
    /// # Errors
    /// Error if the directory exists but can't be removed
    pub fn cleanup(mut self) -> io::Result<()> {
        let res = self.remove();
        // nothing left for drop to do
        self.owned = false;
        self.scratch.clear();
        res
    }

    /// Remove an owned directory, or the tracked entries of a borrowed one
    fn remove(&self) -> io::Result<()> {
        let targets = if self.owned {
            std::slice::from_ref(&self.path)
        } else {
            self.scratch.as_slice()
        };
        for target in targets.iter().filter(|t| t.exists()) {
            log::debug!("Cleaning up {}", target.display());
            remove_dir_all(target)?;
        }
        Ok(())
    }
}

impl Drop for WorkDir {
    fn drop(&mut self) {
        if let Err(e) = self.remove() {
            log::warn!("Unable to remove {}: {e}", self.path.display());
        }
    }
}
