//! Error handling for the git-migrator crate.
use std::{error::Error as StdError, fmt};

/// Error type for the git-migrator crate.
///
/// Only pre-flight and unrecoverable failures are reported with this type.
/// Failures of a single migration step are recorded in the step result instead.
#[derive(Debug)]
pub struct GitMigratorError {
    /// Inner error.
    inner: Box<Inner>,
}

impl GitMigratorError {
    /// Create a new error.
    pub(crate) fn new(kind: GitMigratorErrorKind) -> Self {
        Self {
            inner: Box::new(Inner { kind, source: None }),
        }
    }

    /// Create a new error with a source.
    pub(crate) fn new_with_source<E>(text: &str, source: E) -> Self
    where
        E: Into<BoxError>,
    {
        let source: BoxError = source.into();
        Self::new(GitMigratorErrorKind::Io).with_text(&format!("{text}: {source}"))
    }

    /// Attach a text message as source.
    pub(crate) fn with_text(mut self, text: &str) -> Self {
        self.inner.source = Some(Box::new(std::io::Error::other(text)));
        self
    }

    /// Error kind
    pub fn kind(&self) -> &GitMigratorErrorKind {
        &self.inner.kind
    }

    /// Whether the plan was rejected before any step ran
    pub fn is_configuration(&self) -> bool {
        matches!(self.inner.kind, GitMigratorErrorKind::Configuration)
    }
}

/// Type alias for a boxed error.
pub(crate) type BoxError = Box<dyn StdError + Send + Sync>;

/// Inner error type for the git-migrator crate.
#[derive(Debug)]
struct Inner {
    /// Error kind.
    kind: GitMigratorErrorKind,

    /// Source error.
    source: Option<BoxError>,
}

/// Kind of [`GitMigratorError`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GitMigratorErrorKind {
    /// The migration plan is invalid.
    Configuration,

    /// The scoped working directory could not be prepared.
    WorkDir,

    /// Error related to the filesystem or the terminal.
    Io,

    /// Error related to serde.
    Serde,

    /// Error related to the configuration file format.
    Toml,

    /// Error related to user input.
    Input,
}

impl fmt::Display for GitMigratorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.inner.source {
            Some(source) => write!(f, "{:?}: {}", self.inner.kind, source),
            None => write!(f, "{:?}", self.inner.kind),
        }
    }
}

impl StdError for GitMigratorError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.inner.source.as_ref().map(|e| &**e as _)
    }
}

impl From<&str> for GitMigratorError {
    fn from(text: &str) -> Self {
        Self::new(GitMigratorErrorKind::Io).with_text(text)
    }
}

impl From<String> for GitMigratorError {
    fn from(text: String) -> Self {
        Self::from(text.as_str())
    }
}

/// Generate a `From` impl wrapping a library error under a kind
macro_rules! wrap_error {
    ($error:ty, $kind:ident) => {
        impl From<$error> for GitMigratorError {
            fn from(e: $error) -> Self {
                Self {
                    inner: Box::new(Inner {
                        kind: GitMigratorErrorKind::$kind,
                        source: Some(Box::new(e)),
                    }),
                }
            }
        }
    };
}

wrap_error!(serde_json::Error, Serde);
wrap_error!(toml::de::Error, Toml);
wrap_error!(toml::ser::Error, Toml);
wrap_error!(std::io::Error, Io);
