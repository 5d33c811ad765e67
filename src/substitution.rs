//! `$NAME` expansion over already tokenized arguments.

use crate::env::Environment;
use crate::error::{Result, ShellError};
use crate::locals::LocalVars;

/// Resolve `name` against the environment first, then local variables.
///
/// Unknown names resolve to the empty string.
pub fn resolve<'a>(name: &str, env: &'a Environment, locals: &'a LocalVars) -> &'a str {
    env.get_var(name)
        .or_else(|| locals.get(name))
        .unwrap_or_default()
}

/// Expand variable references in every token, in place.
///
/// - `$NAME` is replaced by the value of `NAME`; `$NAME=...` is ambiguous and rejected.
/// - A token with an embedded `$` (e.g. `a=$b`) keeps everything before the first `$`
///   and replaces the rest with the value of the name following it.
pub fn substitute(tokens: &mut [String], env: &Environment, locals: &LocalVars) -> Result<()> {
    for token in tokens.iter_mut() {
        if let Some(name) = token.strip_prefix('$') {
            if name.contains('=') {
                return Err(ShellError::Substitution(token.clone()));
            }
            let value = resolve(name, env, locals).to_string();
            tracing::trace!(name, value = %value, "substituted");
            *token = value;
        } else if let Some(at) = token.find('$') {
            let value = resolve(&token[at + 1..], env, locals);
            let expanded = format!("{}{}", &token[..at], value);
            tracing::trace!(from = %token, to = %expanded, "substituted");
            *token = expanded;
        }
    }
    Ok(())
}
