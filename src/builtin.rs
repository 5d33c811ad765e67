use crate::error::{Result, ShellError};
use crate::interpreter::{Flow, Interpreter};
use anyhow::Context;
use argh::{EarlyExit, FromArgs};
use std::env;
use std::fs;
use std::io::Write;
use std::path::PathBuf;

/// Commands implemented inside the shell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuiltinKind {
    Exit,
    Cd,
    Export,
    Local,
    Vars,
    History,
    Ls,
}

impl BuiltinKind {
    pub const ALL: [BuiltinKind; 7] = [
        BuiltinKind::Exit,
        BuiltinKind::Cd,
        BuiltinKind::Export,
        BuiltinKind::Local,
        BuiltinKind::Vars,
        BuiltinKind::History,
        BuiltinKind::Ls,
    ];

    pub fn name(self) -> &'static str {
        match self {
            BuiltinKind::Exit => Exit::name(),
            BuiltinKind::Cd => Cd::name(),
            BuiltinKind::Export => Export::name(),
            BuiltinKind::Local => Local::name(),
            BuiltinKind::Vars => Vars::name(),
            BuiltinKind::History => History::name(),
            BuiltinKind::Ls => Ls::name(),
        }
    }

    /// Any name not listed here falls through to the process executor.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }
}

/// A builtin parsed from its arguments with [`argh`] and run in-process.
pub(crate) trait BuiltinCommand: Sized + FromArgs {
    /// Canonical name of the command, e.g. "cd" or "history".
    fn name() -> &'static str;

    /// Executes the command against the interpreter state.
    ///
    /// Output goes to `stdout`, which is the process standard output (possibly
    /// redirected) unless a caller substitutes its own writer.
    fn execute(self, shell: &mut Interpreter, stdout: &mut dyn Write) -> anyhow::Result<Flow>;
}

/// Parse `args` for the builtin `kind` and run it.
pub(crate) fn run(
    kind: BuiltinKind,
    args: &[String],
    shell: &mut Interpreter,
    stdout: &mut dyn Write,
) -> Result<Flow> {
    match kind {
        BuiltinKind::Exit => invoke::<Exit>(args, shell, stdout),
        BuiltinKind::Cd => invoke::<Cd>(args, shell, stdout),
        BuiltinKind::Export => invoke::<Export>(args, shell, stdout),
        BuiltinKind::Local => invoke::<Local>(args, shell, stdout),
        BuiltinKind::Vars => invoke::<Vars>(args, shell, stdout),
        BuiltinKind::History => invoke::<History>(args, shell, stdout),
        BuiltinKind::Ls => invoke::<Ls>(args, shell, stdout),
    }
}

fn invoke<T: BuiltinCommand>(
    args: &[String],
    shell: &mut Interpreter,
    stdout: &mut dyn Write,
) -> Result<Flow> {
    // Builtins take operands only. A leading `--` ends option parsing, so
    // `help`, `--help`, `-x` and a literal `--` all arrive as positionals.
    let args: Vec<&str> = std::iter::once("--")
        .chain(args.iter().map(String::as_str))
        .collect();
    match T::from_args(&[T::name()], &args) {
        Ok(cmd) => Ok(cmd.execute(shell, stdout)?),
        Err(EarlyExit { output, .. }) => Err(ShellError::Validation(format!(
            "{}: {}",
            T::name(),
            output.trim_end()
        ))),
    }
}

/// Digits only: no sign, no whitespace.
fn parse_count(what: &str, arg: &str) -> Result<usize> {
    if arg.is_empty() || !arg.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ShellError::Validation(format!(
            "history: {what} must be a non-negative number, got '{arg}'"
        )));
    }
    arg.parse()
        .map_err(|_| ShellError::Validation(format!("history: {what} out of range: {arg}")))
}

#[derive(FromArgs)]
/// Exit the shell. The exit status reflects whether the last command failed.
pub struct Exit {
    #[argh(positional, greedy)]
    /// not accepted; passing anything forces a failure status.
    pub args: Vec<String>,
}

impl BuiltinCommand for Exit {
    fn name() -> &'static str {
        "exit"
    }

    fn execute(self, shell: &mut Interpreter, _stdout: &mut dyn Write) -> anyhow::Result<Flow> {
        if !self.args.is_empty() {
            tracing::debug!(args = ?self.args, "exit called with arguments");
            shell.failed = true;
        }
        Ok(Flow::Exit(shell.exit_status()))
    }
}

#[derive(FromArgs)]
/// Change the current working directory.
pub struct Cd {
    #[argh(positional)]
    /// directory to switch to; absolute or relative to the current directory.
    pub target: String,
}

impl BuiltinCommand for Cd {
    fn name() -> &'static str {
        "cd"
    }

    fn execute(self, shell: &mut Interpreter, _stdout: &mut dyn Write) -> anyhow::Result<Flow> {
        let target = PathBuf::from(&self.target);
        let new_dir = if target.is_absolute() {
            target
        } else {
            shell.env.current_dir.join(target)
        };

        let canonical = fs::canonicalize(&new_dir)
            .with_context(|| format!("cd: {}", self.target))?;

        env::set_current_dir(&canonical)
            .with_context(|| format!("cd: {}", self.target))?;
        tracing::debug!(dir = %canonical.display(), "changed directory");
        shell.env.current_dir = canonical;
        Ok(Flow::Continue)
    }
}

#[derive(FromArgs)]
/// Set an environment variable visible to every command started afterwards.
pub struct Export {
    #[argh(positional)]
    /// assignment in the form name=value.
    pub assignment: String,
}

impl BuiltinCommand for Export {
    fn name() -> &'static str {
        "export"
    }

    fn execute(self, shell: &mut Interpreter, _stdout: &mut dyn Write) -> anyhow::Result<Flow> {
        match self.assignment.split_once('=') {
            Some((name, value)) if !name.is_empty() => {
                tracing::debug!(name, value, "exporting");
                shell.env.set_var(name, value);
                Ok(Flow::Continue)
            }
            _ => Err(ShellError::Validation(format!(
                "export: expected name=value, got '{}'",
                self.assignment
            ))
            .into()),
        }
    }
}

#[derive(FromArgs)]
/// Set a shell-local variable, overwriting any previous value.
pub struct Local {
    #[argh(positional)]
    /// variable in the form name=value, or just name for an empty value.
    pub assignment: String,
}

impl BuiltinCommand for Local {
    fn name() -> &'static str {
        "local"
    }

    fn execute(self, shell: &mut Interpreter, _stdout: &mut dyn Write) -> anyhow::Result<Flow> {
        shell.locals.assign(&self.assignment)?;
        Ok(Flow::Continue)
    }
}

#[derive(FromArgs)]
/// List local variables as name=value lines.
pub struct Vars {}

impl BuiltinCommand for Vars {
    fn name() -> &'static str {
        "vars"
    }

    fn execute(self, shell: &mut Interpreter, stdout: &mut dyn Write) -> anyhow::Result<Flow> {
        shell.locals.list_all(stdout)?;
        Ok(Flow::Continue)
    }
}

#[derive(FromArgs)]
/// Show the command history, resize it with `set <n>`, or re-run entry `<n>`.
pub struct History {
    #[argh(positional)]
    /// nothing, `set <n>`, or an entry number.
    pub args: Vec<String>,
}

impl BuiltinCommand for History {
    fn name() -> &'static str {
        "history"
    }

    fn execute(self, shell: &mut Interpreter, stdout: &mut dyn Write) -> anyhow::Result<Flow> {
        match self.args.as_slice() {
            [] => {
                shell.history.print(stdout)?;
                Ok(Flow::Continue)
            }
            [set, size] if set == "set" => {
                let capacity = parse_count("size", size)?;
                shell.history.set_capacity(capacity);
                Ok(Flow::Continue)
            }
            [index] => {
                let index = parse_count("index", index)?;
                Ok(shell.replay(index, stdout))
            }
            _ => Err(ShellError::Validation(
                "history: usage: history [set <n> | <n>]".to_string(),
            )
            .into()),
        }
    }
}

#[derive(FromArgs)]
/// List the non-hidden entries of the current directory, one per line, sorted.
pub struct Ls {}

impl BuiltinCommand for Ls {
    fn name() -> &'static str {
        "ls"
    }

    fn execute(self, shell: &mut Interpreter, stdout: &mut dyn Write) -> anyhow::Result<Flow> {
        let dir = &shell.env.current_dir;
        let mut names = Vec::new();
        for entry in fs::read_dir(dir).with_context(|| format!("ls: {}", dir.display()))? {
            let name = entry.with_context(|| format!("ls: {}", dir.display()))?.file_name();
            if !name.as_encoded_bytes().starts_with(b".") {
                names.push(name);
            }
        }
        names.sort();
        for name in names {
            writeln!(stdout, "{}", name.to_string_lossy())?;
        }
        Ok(Flow::Continue)
    }
}
