//! `wsh`, a small line-oriented command interpreter.
//!
//! A command line is split on whitespace, `$NAME` references are resolved from
//! the exported environment and then from shell-local variables, at most one
//! redirection is applied, and the command is either run as a builtin or
//! spawned as an external program. External commands are remembered in a
//! bounded history that can be listed and replayed.
//!
//! The main entry point is [`Interpreter`]. It processes one line at a time and
//! reports back a [`Flow`], leaving process termination to the caller.

mod builtin;
pub mod config;
pub mod env;
pub mod error;
pub mod external;
pub mod history;
mod interpreter;
pub mod locals;
pub mod parser;
pub mod redirect;
pub mod substitution;

pub use builtin::BuiltinKind;
pub use config::ShellConfig;
pub use error::ShellError;
pub use interpreter::{FAILURE_STATUS, Flow, Interpreter};
