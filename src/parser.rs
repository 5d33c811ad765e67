//! Splitting a raw command line into argument tokens and at most one redirection.

use crate::error::{Result, ShellError};
use regex::Regex;
use std::os::fd::RawFd;
use std::path::PathBuf;
use std::sync::LazyLock;

/// `<digits><op><filename>`, the filename possibly empty.
static NUMERIC_FD_FORM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+)(>>|>|<)(.*)$").expect("numeric fd pattern is valid"));

/// Direction of a redirection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Read standard input (or the given fd) from a file (`<`).
    In,
    /// Write the given fd to a file (`>`, `>>`, `&>`, `&>>`).
    Out,
}

/// A single I/O redirection attached to a command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedirectionSpec {
    /// Descriptor that is remapped for the duration of the command.
    pub target_fd: RawFd,
    /// File the descriptor is remapped onto.
    pub filename: PathBuf,
    /// Whether the file is read or written.
    pub direction: Direction,
    /// Open for appending instead of truncating.
    pub append: bool,
    /// Also remap standard error onto the same file (`&>`, `&>>`).
    pub duplicate_stderr: bool,
}

/// The result of parsing one command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedLine {
    /// Command name followed by its arguments. Empty for blank or comment-only lines.
    pub args: Vec<String>,
    /// The redirection found on the line, if any.
    pub redirection: Option<RedirectionSpec>,
    /// Normalized text of the line (comment removed), as stored in history.
    pub text: String,
}

impl ParsedLine {
    /// The line invokes the `exit` builtin.
    ///
    /// The failure flag survives such a line so that `exit` can report it.
    pub fn is_exit(&self) -> bool {
        self.args.first().is_some_and(|name| name == "exit")
    }
}

/// Redirection operators in the order they are tried.
#[derive(Debug, Clone, Copy)]
enum Operator {
    CombinedAppend,
    Combined,
    Append,
    Truncate,
    Input,
}

impl Operator {
    const PRECEDENCE: [Operator; 5] = [
        Operator::CombinedAppend,
        Operator::Combined,
        Operator::Append,
        Operator::Truncate,
        Operator::Input,
    ];

    fn symbol(self) -> &'static str {
        match self {
            Operator::CombinedAppend => "&>>",
            Operator::Combined => "&>",
            Operator::Append => ">>",
            Operator::Truncate => ">",
            Operator::Input => "<",
        }
    }

    fn is_combined(self) -> bool {
        matches!(self, Operator::CombinedAppend | Operator::Combined)
    }

    fn spec(self, target_fd: Option<RawFd>, filename: PathBuf) -> RedirectionSpec {
        let direction = match self {
            Operator::Input => Direction::In,
            _ => Direction::Out,
        };
        let default_fd = match direction {
            Direction::In => 0,
            Direction::Out => 1,
        };
        RedirectionSpec {
            target_fd: target_fd.unwrap_or(default_fd),
            filename,
            direction,
            append: matches!(self, Operator::CombinedAppend | Operator::Append),
            duplicate_stderr: self.is_combined(),
        }
    }
}

struct LineParser<'a> {
    tokens: Vec<&'a str>,
    pos: usize,
}

impl<'a> LineParser<'a> {
    /// Tokens up to (not including) the first comment marker.
    fn new(line: &'a str) -> Self {
        let tokens = line
            .split_whitespace()
            .take_while(|token| !token.starts_with('#'))
            .collect();
        LineParser { tokens, pos: 0 }
    }

    fn next_token(&mut self) -> Option<&'a str> {
        let token = self.tokens.get(self.pos).copied();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn parse(mut self) -> Result<ParsedLine> {
        let mut args = Vec::new();
        let mut redirection = None;

        while let Some(token) = self.next_token() {
            if let Some(spec) = self.parse_redirection(token)? {
                redirection = Some(spec);
                break;
            }
            args.push(token.to_string());
        }

        let ignored = self.tokens.len() - self.pos;
        if ignored > 0 {
            tracing::debug!("ignoring {ignored} token(s) after redirection");
        }

        Ok(ParsedLine {
            args,
            redirection,
            text: self.tokens.join(" "),
        })
    }

    /// Returns `Some` when `token` is a redirection; consumes the next token
    /// when the filename is not attached to the operator.
    fn parse_redirection(&mut self, token: &str) -> Result<Option<RedirectionSpec>> {
        let Some(op) = Operator::PRECEDENCE
            .into_iter()
            .find(|op| token.contains(op.symbol()))
        else {
            return Ok(None);
        };

        let (target_fd, attached) = if token.starts_with(|c: char| c.is_ascii_digit()) {
            if op.is_combined() {
                return Err(ShellError::Parse(format!(
                    "'{}' does not take a descriptor: {token}",
                    op.symbol()
                )));
            }
            let caps = NUMERIC_FD_FORM
                .captures(token)
                .filter(|caps| &caps[2] == op.symbol())
                .ok_or_else(|| ShellError::Parse(format!("malformed redirection: {token}")))?;
            let fd = caps[1]
                .parse::<RawFd>()
                .map_err(|_| ShellError::Parse(format!("bad file descriptor: {}", &caps[1])))?;
            (Some(fd), caps.get(3).map_or("", |m| m.as_str()))
        } else {
            match token.strip_prefix(op.symbol()) {
                Some(rest) => (None, rest),
                None => {
                    return Err(ShellError::Parse(format!("malformed redirection: {token}")));
                }
            }
        };

        let filename = if attached.is_empty() {
            self.next_token()
                .ok_or_else(|| ShellError::Parse(format!("missing filename after '{token}'")))?
        } else {
            attached
        };

        Ok(Some(op.spec(target_fd, PathBuf::from(filename))))
    }
}

/// Tokenize `line` and extract at most one redirection.
///
/// Splits on runs of whitespace and stops at the first token starting with `#`.
/// Argument collection stops at the first redirection token; anything after it
/// (and after its filename) is dropped.
pub fn parse_line(line: &str) -> Result<ParsedLine> {
    let parsed = LineParser::new(line).parse()?;
    tracing::trace!(?parsed, "parsed line");
    Ok(parsed)
}
