//! Shell-local variables: visible to substitution, never exported to children.

use crate::error::{Result, ShellError};
use std::io::Write;

/// A single `name=value` association.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalVariable {
    pub name: String,
    pub value: String,
}

/// Ordered store of local variables, one entry per name.
#[derive(Debug, Default, Clone)]
pub struct LocalVars {
    entries: Vec<LocalVariable>,
}

impl LocalVars {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `name` to `value`, overwriting an existing entry in place.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.entries.iter_mut().find(|entry| entry.name == name) {
            Some(entry) => entry.value = value,
            None => self.entries.push(LocalVariable { name, value }),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|entry| entry.name == name)
            .map(|entry| entry.value.as_str())
    }

    /// Apply the argument of `local`: `name` or `name=value`.
    pub fn assign(&mut self, arg: &str) -> Result<()> {
        if arg.starts_with('$') || arg.starts_with('=') {
            return Err(ShellError::Validation(format!(
                "local: invalid variable name: {arg}"
            )));
        }
        let mut parts = arg.split('=');
        let name = parts.next().unwrap_or_default();
        let value = parts.next().unwrap_or_default();
        if parts.next().is_some() {
            return Err(ShellError::Validation(format!(
                "local: expected name=value, got {arg}"
            )));
        }
        tracing::debug!(name, value, "setting local variable");
        self.set(name, value);
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = &LocalVariable> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Print every entry as `name=value`, in store order.
    pub fn list_all(&self, out: &mut dyn Write) -> std::io::Result<()> {
        for entry in &self.entries {
            writeln!(out, "{}={}", entry.name, entry.value)?;
        }
        Ok(())
    }
}
