//! Error types shared by the registry, the invocation driver and commands.
//!
//! Commands fail with a [`CommandError`]. Each one carries an [`ErrorKind`] tag
//! plus the ancestor kinds it also counts as. Error handlers are selected by
//! testing membership in that chain. Everything that stops a session from
//! starting or running is a [`CorporalError`].

use crate::command::{EXIT_FAILURE, EXIT_FATAL, ExitCode};
use crate::config::ConfigError;
use crate::lexer::LexingError;
use rustyline::error::ReadlineError;
use std::any::Any;
use std::borrow::Cow;
use std::fmt;
use thiserror::Error;

/// Classification tag of a [`CommandError`].
///
/// Kinds form a tree rooted at [`ErrorKind::ERROR`]: every command error is
/// of kind `Error`, and may additionally declare any number of ancestors.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ErrorKind(Cow<'static, str>);

impl ErrorKind {
    /// Root kind every command error belongs to.
    pub const ERROR: ErrorKind = ErrorKind::from_static("Error");
    /// Kind assigned to panics caught while a command was running.
    pub const PANIC: ErrorKind = ErrorKind::from_static("Panic");
    /// Kind assigned to I/O failures converted with `?`.
    pub const IO: ErrorKind = ErrorKind::from_static("IoError");

    pub const fn from_static(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }

    pub fn new(name: impl Into<String>) -> Self {
        Self(Cow::Owned(name.into()))
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&'static str> for ErrorKind {
    fn from(name: &'static str) -> Self {
        Self::from_static(name)
    }
}

/// Failure reported by a command's `invoke`.
///
/// ```
/// use corporal::{CommandError, ErrorKind};
///
/// const NETWORK: ErrorKind = ErrorKind::from_static("NetworkError");
/// const TIMEOUT: ErrorKind = ErrorKind::from_static("TimeoutError");
///
/// let err = CommandError::new(TIMEOUT, "server did not answer")
///     .with_ancestor(NETWORK)
///     .with_code("ETIMEDOUT");
/// assert!(err.is_kind(&TIMEOUT));
/// assert!(err.is_kind(&NETWORK));
/// assert!(err.is_kind(&ErrorKind::ERROR));
/// assert_eq!(err.code(), Some("ETIMEDOUT"));
/// ```
#[derive(Debug)]
pub struct CommandError {
    kind: ErrorKind,
    ancestors: Vec<ErrorKind>,
    code: Option<String>,
    message: String,
    source: Option<anyhow::Error>,
}

impl CommandError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            ancestors: Vec::new(),
            code: None,
            message: message.into(),
            source: None,
        }
    }

    /// Attach the code consulted by code matchers.
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    /// Declare an additional kind this error is classified under.
    pub fn with_ancestor(mut self, kind: ErrorKind) -> Self {
        if kind != self.kind && !self.ancestors.contains(&kind) {
            self.ancestors.push(kind);
        }
        self
    }

    pub fn with_source(mut self, source: impl Into<anyhow::Error>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    pub fn ancestors(&self) -> &[ErrorKind] {
        &self.ancestors
    }

    pub fn code(&self) -> Option<&str> {
        self.code.as_deref()
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Whether `kind` is this error's own kind, one of its ancestors, or the root kind.
    pub fn is_kind(&self, kind: &ErrorKind) -> bool {
        *kind == self.kind || *kind == ErrorKind::ERROR || self.ancestors.contains(kind)
    }

    pub(crate) fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "command panicked".to_string()
        };
        Self::new(ErrorKind::PANIC, message)
    }
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        if let Some(code) = &self.code {
            write!(f, " [{code}]")?;
        }
        if !self.message.is_empty() {
            write!(f, ": {}", self.message)?;
        }
        Ok(())
    }
}

impl std::error::Error for CommandError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_deref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

impl From<anyhow::Error> for CommandError {
    fn from(err: anyhow::Error) -> Self {
        Self::new(ErrorKind::ERROR, err.to_string()).with_source(err)
    }
}

impl From<std::io::Error> for CommandError {
    fn from(err: std::io::Error) -> Self {
        Self::new(ErrorKind::IO, err.to_string())
            .with_code(format!("{:?}", err.kind()))
            .with_source(err)
    }
}

/// A command definition rejected at registration time.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Command \"{0}\" must have a description string")]
    MissingDescription(String),
    #[error("Command \"{0}\" must have an invoke function")]
    MissingInvoke(String),
}

/// Errors that stop a session from starting or from continuing.
#[derive(Debug, Error)]
pub enum CorporalError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Command \"{name}\" failed to initialize: {source}")]
    Init {
        name: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Unhandled error in command \"{command}\": {error}")]
    Unhandled { command: String, error: CommandError },

    #[error("Unable to parse command line: {0}")]
    Parse(#[from] LexingError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Failed to read input: {0}")]
    Input(#[from] ReadlineError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CorporalError {
    /// Process exit code for this error.
    ///
    /// Malformed definitions and unrecovered command failures use a dedicated
    /// status so callers can tell them apart from ordinary failures.
    pub fn exit_code(&self) -> ExitCode {
        match self {
            Self::Validation(_) | Self::Init { .. } | Self::Unhandled { .. } => EXIT_FATAL,
            _ => EXIT_FAILURE,
        }
    }
}
