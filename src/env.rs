use std::collections::HashMap;
use std::env as stdenv;
use std::path::PathBuf;

/// The shell's view of the process environment.
///
/// The environment contains:
/// - `vars`: exported variables, handed to every spawned child as its whole environment.
/// - `current_dir`: the working directory, kept in step with the process cwd by `cd`.
///
/// `export` writes into `vars` rather than the live process environment, so the
/// engine never races other threads on `setenv`.
#[derive(Debug, Clone)]
pub struct Environment {
    /// Key-value store of exported variables (e.g., PATH, HOME).
    pub vars: HashMap<String, String>,
    /// The current working directory for command execution.
    pub current_dir: PathBuf,
}

impl Environment {
    /// Capture the current process state into a new `Environment` instance.
    pub fn new() -> Self {
        let vars = stdenv::vars().collect();
        let current_dir = stdenv::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self { vars, current_dir }
    }

    /// Build an environment from explicit variables, ignoring the process state.
    pub fn with_vars<I, K, V>(vars: I, current_dir: impl Into<PathBuf>) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: vars.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
            current_dir: current_dir.into(),
        }
    }

    /// Get the value of an exported variable.
    pub fn get_var(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    /// Set or override an exported variable.
    pub fn set_var(&mut self, key: impl Into<String>, val: impl Into<String>) {
        self.vars.insert(key.into(), val.into());
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}
