use crate::env::Environment;
use crate::error::{Result, ShellError};
use nix::unistd::{AccessFlags, access};
use std::borrow::Cow;
use std::ffi::OsStr;
use std::fmt;
use std::os::unix::process::{CommandExt, ExitStatusExt};
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};

/// How a spawned child terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionOutcome {
    /// Normal exit with status 0.
    Success,
    /// Normal exit with a nonzero status.
    Exited(i32),
    /// Killed by the given signal.
    Signaled(i32),
}

impl ExecutionOutcome {
    pub fn is_success(self) -> bool {
        self == ExecutionOutcome::Success
    }

    /// Status in shell convention: the exit code, or `128 + signal`.
    pub fn code(self) -> i32 {
        match self {
            ExecutionOutcome::Success => 0,
            ExecutionOutcome::Exited(code) => code,
            ExecutionOutcome::Signaled(signal) => 128 + signal,
        }
    }
}

impl From<ExitStatus> for ExecutionOutcome {
    fn from(status: ExitStatus) -> Self {
        match (status.code(), status.signal()) {
            (Some(0), _) => ExecutionOutcome::Success,
            (Some(code), _) => ExecutionOutcome::Exited(code),
            (None, Some(signal)) => ExecutionOutcome::Signaled(signal),
            // Stopped/continued states are not reported by a blocking wait.
            (None, None) => ExecutionOutcome::Exited(-1),
        }
    }
}

impl fmt::Display for ExecutionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionOutcome::Success => write!(f, "exited successfully"),
            ExecutionOutcome::Exited(code) => write!(f, "exited with status {code}"),
            ExecutionOutcome::Signaled(signal) => write!(f, "terminated by signal {signal}"),
        }
    }
}

/// Resolve a command name to an executable path.
///
/// Behavior:
/// - A name containing `/` is used verbatim, without any probing.
/// - Otherwise each directory of `search_paths` (PATH) is probed in order and the
///   first candidate that is an executable regular file wins.
/// - An empty name resolves to nothing.
pub fn find_command_path<'a>(search_paths: Option<&OsStr>, name: &'a str) -> Option<Cow<'a, Path>> {
    if name.is_empty() {
        return None;
    }
    if name.contains('/') {
        return Some(Cow::Borrowed(Path::new(name)));
    }
    find_in_path(search_paths?, OsStr::new(name)).map(Cow::Owned)
}

fn find_in_path(search_paths: &OsStr, cmd: &OsStr) -> Option<PathBuf> {
    std::env::split_paths(search_paths)
        .map(|dir| dir.join(cmd))
        .find(|candidate| is_executable(candidate))
}

fn is_executable(path: &Path) -> bool {
    path.is_file() && access(path, AccessFlags::X_OK).is_ok()
}

/// Resolve `args[0]`, spawn it with the remaining arguments and wait for it.
///
/// The child gets the shell's exported variables as its whole environment and
/// the shell's current directory as its working directory; it inherits the
/// (possibly redirected) standard descriptors.
pub fn execute(args: &[String], env: &Environment) -> Result<ExecutionOutcome> {
    let Some(name) = args.first() else {
        return Err(ShellError::Resolution(String::new()));
    };
    let search_paths = env.get_var("PATH").map(OsStr::new);
    let executable = find_command_path(search_paths, name)
        .ok_or_else(|| ShellError::Resolution(name.clone()))?;
    tracing::debug!(command = %name, path = %executable.display(), "resolved");

    let mut child = Command::new(&*executable)
        .arg0(name)
        .args(&args[1..])
        .env_clear()
        .envs(env.vars.iter())
        .current_dir(&env.current_dir)
        .spawn()
        .map_err(|source| ShellError::Exec {
            command: name.clone(),
            source,
        })?;
    tracing::debug!(command = %name, pid = child.id(), "spawned");

    let status = child.wait().map_err(|source| ShellError::Exec {
        command: name.clone(),
        source,
    })?;
    let outcome = ExecutionOutcome::from(status);
    tracing::debug!(command = %name, %outcome, "child finished");
    Ok(outcome)
}
