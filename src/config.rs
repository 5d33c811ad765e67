//! Startup configuration of the interpreter.

/// Number of history entries kept when nothing else is configured.
pub const DEFAULT_HISTORY_CAPACITY: usize = 5;

/// Environment variable holding the log filter (`tracing_subscriber::EnvFilter` syntax).
pub const LOG_FILTER_ENV: &str = "WSH_LOG";

/// Filter used when [`LOG_FILTER_ENV`] is unset or invalid.
pub const DEFAULT_LOG_FILTER: &str = "warn";

/// Knobs chosen at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellConfig {
    /// Initial capacity of the history store.
    pub history_capacity: usize,
    /// Replacement for `PATH` in the shell environment, if any.
    pub search_path: Option<String>,
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            search_path: None,
        }
    }
}
