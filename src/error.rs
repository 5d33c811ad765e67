//! Errors produced while processing a single command line.
//!
//! Every variant is recoverable: the interpreter reports it, raises the
//! failure flag and moves on to the next line.

use crate::external::ExecutionOutcome;
use std::io;
use thiserror::Error;

/// Result type alias used throughout the engine.
pub type Result<T> = std::result::Result<T, ShellError>;

/// Failure taxonomy of the command pipeline.
#[derive(Error, Debug)]
pub enum ShellError {
    /// Malformed redirection token.
    #[error("parse error: {0}")]
    Parse(String),

    /// Ambiguous `$name=...` token.
    #[error("bad substitution: {0}")]
    Substitution(String),

    /// Wrong arity or malformed builtin argument.
    #[error("{0}")]
    Validation(String),

    /// No executable found for the command name.
    #[error("{0}: command not found")]
    Resolution(String),

    /// The child process could not be spawned.
    #[error("{command}: {source}")]
    Exec {
        command: String,
        #[source]
        source: io::Error,
    },

    /// The child exited with a nonzero status or was killed by a signal.
    #[error("{command}: {outcome}")]
    Runtime {
        command: String,
        outcome: ExecutionOutcome,
    },

    /// A redirection target or descriptor could not be opened or duplicated.
    #[error("{target}: {source}")]
    Io {
        target: String,
        #[source]
        source: io::Error,
    },

    /// Failure inside a builtin body.
    #[error("{0:#}")]
    Builtin(anyhow::Error),
}

impl ShellError {
    pub(crate) fn io(target: impl Into<String>, source: impl Into<io::Error>) -> Self {
        Self::Io {
            target: target.into(),
            source: source.into(),
        }
    }

    /// Whether the error should be shown to the user.
    ///
    /// A failing child has already printed its own diagnostics.
    pub fn is_reported(&self) -> bool {
        !matches!(self, Self::Runtime { .. })
    }
}

impl From<anyhow::Error> for ShellError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast::<ShellError>() {
            Ok(shell_err) => shell_err,
            Err(other) => Self::Builtin(other),
        }
    }
}
