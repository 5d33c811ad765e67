use argh::FromArgs;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;
use wsh::config::{DEFAULT_HISTORY_CAPACITY, DEFAULT_LOG_FILTER, LOG_FILTER_ENV};
use wsh::{FAILURE_STATUS, Interpreter, ShellConfig};

#[derive(FromArgs)]
/// A small command interpreter. Interactive without a file, batch mode with one.
struct Args {
    #[argh(positional)]
    /// file with one command per line.
    batch_file: Option<PathBuf>,

    #[argh(option, default = "DEFAULT_HISTORY_CAPACITY")]
    /// number of history entries kept.
    history_size: usize,

    #[argh(option)]
    /// replace PATH with the given directory list.
    path: Option<String>,
}

fn init_logging() {
    let filter = EnvFilter::try_from_env(LOG_FILTER_ENV)
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn main() -> ExitCode {
    let args: Args = argh::from_env();
    init_logging();

    let config = ShellConfig {
        history_capacity: args.history_size,
        search_path: args.path,
    };
    let mut shell = Interpreter::new(&config);

    let status = match &args.batch_file {
        Some(path) => shell.run_batch(path),
        None => shell.repl().map_err(anyhow::Error::from),
    };
    drop(shell);

    match status {
        Ok(code) => ExitCode::from(code as u8),
        Err(err) => {
            eprintln!("wsh: {err:#}");
            ExitCode::from(FAILURE_STATUS as u8)
        }
    }
}
