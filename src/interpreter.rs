use crate::builtin::{self, BuiltinKind};
use crate::config::ShellConfig;
use crate::env::Environment;
use crate::error::{Result, ShellError};
use crate::external;
use crate::history::History;
use crate::locals::LocalVars;
use crate::parser::parse_line;
use crate::redirect;
use crate::substitution::substitute;
use anyhow::Context;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::path::Path;

/// Exit status reported when the last command failed.
pub const FAILURE_STATUS: i32 = 255;

const PROMPT: &str = "wsh> ";

/// What the front end should do after a line has been processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Read the next line.
    Continue,
    /// Stop reading input and terminate with the given status.
    Exit(i32),
}

/// The command engine and all state shared between command lines.
///
/// Each line goes through the same pipeline: parse, substitute, redirect,
/// dispatch to a builtin or an external program, restore the descriptors.
/// Any error along the way is reported, raises the failure flag and leaves
/// the interpreter ready for the next line.
///
/// Example
/// ```no_run
/// use wsh::{Flow, Interpreter, ShellConfig};
/// let mut sh = Interpreter::new(&ShellConfig::default());
/// assert_eq!(sh.execute_line("local greeting=hello"), Flow::Continue);
/// assert_eq!(sh.execute_line("exit"), Flow::Exit(0));
/// ```
#[derive(Debug)]
pub struct Interpreter {
    pub(crate) env: Environment,
    pub(crate) history: History,
    pub(crate) locals: LocalVars,
    /// Text of the last non-replayed line that reached dispatch.
    last_line: Option<String>,
    pub(crate) failed: bool,
}

impl Interpreter {
    /// Create an interpreter over the current process environment.
    pub fn new(config: &ShellConfig) -> Self {
        Self::with_environment(Environment::new(), config)
    }

    /// Create an interpreter over an explicit environment.
    pub fn with_environment(mut env: Environment, config: &ShellConfig) -> Self {
        if let Some(path) = &config.search_path {
            env.set_var("PATH", path.as_str());
        }
        Self {
            env,
            history: History::new(config.history_capacity),
            locals: LocalVars::new(),
            last_line: None,
            failed: false,
        }
    }

    pub fn env(&self) -> &Environment {
        &self.env
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn locals(&self) -> &LocalVars {
        &self.locals
    }

    /// Whether the most recent command failed.
    pub fn failed(&self) -> bool {
        self.failed
    }

    /// Status the process should exit with right now.
    pub fn exit_status(&self) -> i32 {
        if self.failed { FAILURE_STATUS } else { 0 }
    }

    /// Run one command line, with builtin output going to standard output.
    pub fn execute_line(&mut self, line: &str) -> Flow {
        let stdout = io::stdout();
        let mut out = stdout.lock();
        self.execute_line_with_output(line, &mut out)
    }

    /// Run one command line, with builtin output going to `out`.
    ///
    /// External programs always write to the process descriptors.
    pub fn execute_line_with_output(&mut self, line: &str, out: &mut dyn Write) -> Flow {
        self.run_line(line, false, out)
    }

    /// Re-run history entry `index` (1 = most recent). Missing entries are ignored.
    pub(crate) fn replay(&mut self, index: usize, out: &mut dyn Write) -> Flow {
        let Some(text) = self.history.get(index).map(str::to_owned) else {
            tracing::debug!(index, "no such history entry");
            return Flow::Continue;
        };
        tracing::debug!(index, line = %text, "replaying");
        self.run_line(&text, true, out)
    }

    fn run_line(&mut self, line: &str, replay: bool, out: &mut dyn Write) -> Flow {
        let parsed = match parse_line(line) {
            Ok(parsed) => parsed,
            Err(err) => {
                self.fail(&err);
                return Flow::Continue;
            }
        };
        if parsed.args.is_empty() {
            return Flow::Continue;
        }
        if !parsed.is_exit() {
            self.failed = false;
        }

        let mut args = parsed.args;
        if let Err(err) = substitute(&mut args, &self.env, &self.locals) {
            self.fail(&err);
            return Flow::Continue;
        }

        let guard = match parsed.redirection.as_ref().map(redirect::apply).transpose() {
            Ok(guard) => guard,
            Err(err) => {
                self.fail(&err);
                return Flow::Continue;
            }
        };

        let flow = match self.dispatch(&parsed.text, &args, replay, out) {
            Ok(flow) => flow,
            Err(err) => {
                self.fail(&err);
                Flow::Continue
            }
        };
        if let Err(e) = out.flush() {
            tracing::warn!(error = %e, "failed to flush output");
        }
        drop(guard);
        flow
    }

    fn dispatch(
        &mut self,
        text: &str,
        args: &[String],
        replay: bool,
        out: &mut dyn Write,
    ) -> Result<Flow> {
        let duplicate = self.last_line.as_deref() == Some(text);
        if !replay {
            self.last_line = Some(text.to_owned());
        }

        if let Some(kind) = BuiltinKind::from_name(&args[0]) {
            tracing::debug!(builtin = kind.name(), "dispatching builtin");
            return builtin::run(kind, &args[1..], self, out);
        }

        if !replay && !duplicate {
            tracing::trace!(line = %text, "recording history entry");
            self.history.record(text);
        }

        let outcome = external::execute(args, &self.env)?;
        if outcome.is_success() {
            Ok(Flow::Continue)
        } else {
            Err(ShellError::Runtime {
                command: args[0].clone(),
                outcome,
            })
        }
    }

    fn fail(&mut self, err: &ShellError) {
        self.failed = true;
        tracing::debug!(error = %err, "command failed");
        if err.is_reported() {
            let _ = writeln!(io::stderr(), "wsh: {err}");
        }
    }

    /// Interactive loop. Returns the exit status once input ends or `exit` runs.
    pub fn repl(&mut self) -> rustyline::Result<i32> {
        let mut rl = DefaultEditor::new()?;

        loop {
            match rl.readline(PROMPT) {
                Ok(line) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    rl.add_history_entry(line.as_str())?;
                    if let Flow::Exit(status) = self.execute_line(&line) {
                        return Ok(status);
                    }
                }
                Err(ReadlineError::Interrupted | ReadlineError::Eof) => break,
                Err(err) => return Err(err),
            }
        }
        Ok(self.exit_status())
    }

    /// Run every command of the file at `path`.
    pub fn run_batch(&mut self, path: &Path) -> anyhow::Result<i32> {
        let file = File::open(path)
            .with_context(|| format!("cannot open batch file {}", path.display()))?;
        self.run_script(BufReader::new(file))
            .with_context(|| format!("error reading batch file {}", path.display()))
    }

    /// Run one command per line of `reader`, skipping blank and `#` lines.
    pub fn run_script(&mut self, reader: impl BufRead) -> io::Result<i32> {
        for line in reader.lines() {
            let line = line?;
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Flow::Exit(status) = self.execute_line(&line) {
                return Ok(status);
            }
        }
        Ok(self.exit_status())
    }
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new(&ShellConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::fs;
    use std::io::Cursor;

    fn shell_in(dir: &Path) -> Interpreter {
        let env = Environment::with_vars(std::env::vars(), dir);
        Interpreter::with_environment(env, &ShellConfig::default())
    }

    fn run(shell: &mut Interpreter, line: &str) -> (Flow, String) {
        let mut out = Vec::new();
        let flow = shell.execute_line_with_output(line, &mut out);
        (flow, String::from_utf8(out).unwrap())
    }

    fn history_text(shell: &mut Interpreter) -> String {
        run(shell, "history").1
    }

    #[test]
    #[serial]
    fn test_cd_changes_directory_without_history() {
        let orig = std::env::current_dir().unwrap();
        let mut shell = shell_in(&orig);

        let (flow, _) = run(&mut shell, "cd /tmp");
        let cwd = std::env::current_dir().unwrap();
        std::env::set_current_dir(&orig).unwrap();

        let tmp = fs::canonicalize("/tmp").unwrap();
        assert_eq!(flow, Flow::Continue);
        assert_eq!(cwd, tmp);
        assert_eq!(shell.env().current_dir, tmp);
        assert!(!shell.failed());
        assert!(shell.history().is_empty());
    }

    #[test]
    fn test_unknown_command_is_recorded_and_fails() {
        let mut shell = shell_in(Path::new("/"));
        let (flow, _) = run(&mut shell, "nonexistent_cmd_xyz");
        assert_eq!(flow, Flow::Continue);
        assert!(shell.failed());
        assert_eq!(shell.history().len(), 1);
        assert_eq!(shell.history().get(1), Some("nonexistent_cmd_xyz"));
    }

    #[test]
    fn test_history_keeps_most_recent() {
        let mut shell = shell_in(Path::new("/"));
        run(&mut shell, "history set 2");
        run(&mut shell, "true a");
        run(&mut shell, "true b");
        run(&mut shell, "true c");
        assert_eq!(history_text(&mut shell), "1) true c\n2) true b\n");
    }

    #[test]
    fn test_consecutive_duplicates_recorded_once() {
        let mut shell = shell_in(Path::new("/"));
        run(&mut shell, "true x");
        run(&mut shell, "true x");
        assert_eq!(shell.history().len(), 1);

        // a builtin in between breaks the run of duplicates
        run(&mut shell, "vars");
        run(&mut shell, "true x");
        assert_eq!(history_text(&mut shell), "1) true x\n2) true x\n");
    }

    #[test]
    fn test_comment_only_and_blank_lines() {
        let mut shell = shell_in(Path::new("/"));
        run(&mut shell, "false");
        assert!(shell.failed());
        assert_eq!(run(&mut shell, "   # nothing here").0, Flow::Continue);
        assert_eq!(run(&mut shell, "").0, Flow::Continue);
        // blank lines do not touch the failure flag
        assert!(shell.failed());

        run(&mut shell, "true one # trailing comment");
        assert_eq!(shell.history().get(1), Some("true one"));
    }

    #[test]
    fn test_local_overwrites() {
        let mut shell = shell_in(Path::new("/"));
        run(&mut shell, "local x=1");
        run(&mut shell, "local x=2");
        let (_, out) = run(&mut shell, "vars");
        assert_eq!(out, "x=2\n");
        assert_eq!(shell.locals().len(), 1);
        assert!(shell.history().is_empty());
    }

    #[test]
    fn test_history_set_zero() {
        let mut shell = shell_in(Path::new("/"));
        run(&mut shell, "true a");
        run(&mut shell, "history set 0");
        assert_eq!(history_text(&mut shell), "");

        run(&mut shell, "true b");
        assert_eq!(history_text(&mut shell), "");
        assert_eq!(run(&mut shell, "history 1").0, Flow::Continue);
        assert!(!shell.failed());
    }

    #[test]
    fn test_replay() {
        let mut shell = shell_in(Path::new("/"));
        run(&mut shell, "true a");
        run(&mut shell, "false");
        assert_eq!(shell.history().len(), 2);

        run(&mut shell, "history 1");
        assert!(shell.failed());
        run(&mut shell, "history 2");
        assert!(!shell.failed());
        assert_eq!(history_text(&mut shell), "1) false\n2) true a\n");

        // out of range is a no-op
        run(&mut shell, "history 9");
        assert!(!shell.failed());
    }

    #[test]
    fn test_exit_status_follows_last_command() {
        let mut shell = shell_in(Path::new("/"));
        assert_eq!(run(&mut shell, "exit").0, Flow::Exit(0));

        run(&mut shell, "false");
        assert_eq!(run(&mut shell, "exit").0, Flow::Exit(FAILURE_STATUS));

        run(&mut shell, "true");
        assert_eq!(run(&mut shell, "exit").0, Flow::Exit(0));

        assert_eq!(run(&mut shell, "exit now").0, Flow::Exit(FAILURE_STATUS));
    }

    #[test]
    fn test_exit_treats_option_words_as_arguments() {
        for line in ["exit --help", "exit help", "exit -5"] {
            let mut shell = shell_in(Path::new("/"));
            let (flow, out) = run(&mut shell, line);
            assert_eq!(flow, Flow::Exit(FAILURE_STATUS), "{line}");
            assert_eq!(out, "");
            assert!(shell.failed());
        }
    }

    #[test]
    #[serial]
    fn test_combined_redirection_captures_both_streams() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("both.sh");
        fs::write(&script, "echo wsh-both-out\necho wsh-both-err >&2\n").unwrap();
        let path = dir.path().join("both.txt");
        let before = (nix::sys::stat::fstat(1).unwrap(), nix::sys::stat::fstat(2).unwrap());
        let mut shell = shell_in(dir.path());

        shell.execute_line(&format!("sh {} &> {}", script.display(), path.display()));
        shell.execute_line(&format!("sh {} &>> {}", script.display(), path.display()));
        let after = (nix::sys::stat::fstat(1).unwrap(), nix::sys::stat::fstat(2).unwrap());

        assert!(!shell.failed());
        let contents = fs::read_to_string(&path).unwrap();
        let ours: Vec<&str> = contents.lines().filter(|l| l.starts_with("wsh-both-")).collect();
        assert_eq!(
            ours,
            vec!["wsh-both-out", "wsh-both-err", "wsh-both-out", "wsh-both-err"]
        );
        assert_eq!((before.0.st_dev, before.0.st_ino), (after.0.st_dev, after.0.st_ino));
        assert_eq!((before.1.st_dev, before.1.st_ino), (after.1.st_dev, after.1.st_ino));
    }

    #[test]
    fn test_validation_errors_set_flag() {
        let mut shell = shell_in(Path::new("/"));
        for line in ["cd", "vars extra", "export NOEQUALS", "local =x", "history set x"] {
            run(&mut shell, "true");
            assert!(!shell.failed());
            run(&mut shell, line);
            assert!(shell.failed(), "{line} should fail");
        }
        assert!(shell.history().iter().all(|(_, text)| text == "true"));
    }

    #[test]
    fn test_substitution_reaches_commands() {
        let mut shell = shell_in(Path::new("/"));
        run(&mut shell, "export GREETING=hi");
        run(&mut shell, "local name=world");

        run(&mut shell, "test $GREETING = hi");
        assert!(!shell.failed());
        run(&mut shell, "test $name = world");
        assert!(!shell.failed());
        run(&mut shell, "test v=$name = v=world");
        assert!(!shell.failed());
        assert_eq!(shell.history().get(1), Some("test v=$name = v=world"));

        run(&mut shell, "test $missing = x");
        assert!(shell.failed());
    }

    #[test]
    fn test_environment_shadows_locals() {
        let mut shell = shell_in(Path::new("/"));
        run(&mut shell, "export shadow=env");
        run(&mut shell, "local shadow=local");
        run(&mut shell, "test $shadow = env");
        assert!(!shell.failed());
    }

    #[test]
    fn test_ambiguous_substitution_aborts() {
        let mut shell = shell_in(Path::new("/"));
        run(&mut shell, "true $a=b");
        assert!(shell.failed());
        assert!(shell.history().is_empty());
    }

    #[test]
    fn test_parse_error_aborts() {
        let mut shell = shell_in(Path::new("/"));
        run(&mut shell, "true >");
        assert!(shell.failed());
        assert!(shell.history().is_empty());
    }

    #[test]
    fn test_unopenable_redirection_aborts() {
        let mut shell = shell_in(Path::new("/"));
        run(&mut shell, "true > /nonexistent_dir_for_wsh_tests/out.txt");
        assert!(shell.failed());
        assert!(shell.history().is_empty());
    }

    #[test]
    #[serial]
    fn test_output_redirection_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f.txt");
        let before = nix::sys::stat::fstat(1).unwrap();
        let mut shell = shell_in(dir.path());

        let line = format!("echo wsh-marker > {}", path.display());
        assert_eq!(shell.execute_line(&line), Flow::Continue);
        let after = nix::sys::stat::fstat(1).unwrap();

        assert!(!shell.failed());
        assert!(fs::read_to_string(&path).unwrap().contains("wsh-marker\n"));
        assert_eq!((before.st_dev, before.st_ino), (after.st_dev, after.st_ino));
        assert_eq!(shell.history().get(1), Some(line.as_str()));
    }

    #[test]
    #[serial]
    fn test_stderr_only_redirection() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("err.txt");
        let mut shell = shell_in(dir.path());

        shell.execute_line(&format!("cat /nonexistent_file_for_wsh_tests 2> {}", path.display()));

        assert!(shell.failed());
        let captured = fs::read_to_string(&path).unwrap();
        assert!(captured.contains("nonexistent_file_for_wsh_tests"));
    }

    #[test]
    #[serial]
    fn test_builtin_output_redirection() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.txt");
        let mut shell = shell_in(dir.path());

        shell.execute_line("local wsh_marker=1");
        shell.execute_line(&format!("vars > {}", path.display()));

        assert!(!shell.failed());
        assert!(fs::read_to_string(&path).unwrap().contains("wsh_marker=1\n"));
    }

    #[test]
    #[serial]
    fn test_replay_reapplies_redirection() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.txt");
        let mut shell = shell_in(dir.path());

        shell.execute_line(&format!("echo wsh-replay >> {}", path.display()));
        shell.execute_line("history 1");

        let contents = fs::read_to_string(&path).unwrap();
        assert_eq!(contents.matches("wsh-replay\n").count(), 2);
        assert_eq!(shell.history().len(), 1);
    }

    #[test]
    fn test_search_path_from_config() {
        let config = ShellConfig {
            search_path: Some("/nonexistent_dir_for_wsh_tests".to_string()),
            ..ShellConfig::default()
        };
        let env = Environment::with_vars(std::env::vars(), "/");
        let mut shell = Interpreter::with_environment(env, &config);
        assert_eq!(shell.env().get_var("PATH"), Some("/nonexistent_dir_for_wsh_tests"));

        run(&mut shell, "true");
        assert!(shell.failed());
    }

    #[test]
    fn test_script_exit_status() {
        let mut shell = shell_in(Path::new("/"));
        let script = "# comment\n\ntrue\nfalse\n";
        assert_eq!(shell.run_script(Cursor::new(script)).unwrap(), FAILURE_STATUS);

        let mut shell = shell_in(Path::new("/"));
        assert_eq!(shell.run_script(Cursor::new("false\ntrue\n")).unwrap(), 0);
    }

    #[test]
    fn test_script_stops_at_exit() {
        let mut shell = shell_in(Path::new("/"));
        assert_eq!(shell.run_script(Cursor::new("true\nexit\nfalse\n")).unwrap(), 0);

        let mut shell = shell_in(Path::new("/"));
        let status = shell.run_script(Cursor::new("false\nexit\ntrue\n")).unwrap();
        assert_eq!(status, FAILURE_STATUS);
    }

    #[test]
    fn test_missing_batch_file() {
        let mut shell = shell_in(Path::new("/"));
        assert!(shell.run_batch(Path::new("/nonexistent_dir_for_wsh_tests/script")).is_err());
    }
}
