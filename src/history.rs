//! Bounded, most-recent-first record of executed external commands.

use std::collections::VecDeque;
use std::io::Write;

/// Capacity-bounded history, newest entry at position 1.
#[derive(Debug, Clone)]
pub struct History {
    entries: VecDeque<String>,
    capacity: usize,
}

impl History {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Store `text` as the most recent entry, evicting the oldest one when full.
    ///
    /// With a capacity of zero nothing is stored.
    pub fn record(&mut self, text: impl Into<String>) {
        if self.capacity == 0 {
            return;
        }
        if self.entries.len() == self.capacity {
            if let Some(evicted) = self.entries.pop_back() {
                tracing::trace!(%evicted, "history full, evicting oldest entry");
            }
        }
        self.entries.push_front(text.into());
    }

    /// 1-based lookup, 1 being the most recent entry.
    pub fn get(&self, index: usize) -> Option<&str> {
        index
            .checked_sub(1)
            .and_then(|i| self.entries.get(i))
            .map(String::as_str)
    }

    /// Resize the store.
    ///
    /// Shrinking below the current size evicts the oldest entries; zero clears everything.
    pub fn set_capacity(&mut self, capacity: usize) {
        if capacity == 0 {
            self.entries.clear();
        } else if capacity < self.capacity && self.entries.len() > capacity {
            tracing::debug!(
                evicted = self.entries.len() - capacity,
                "shrinking history"
            );
            self.entries.truncate(capacity);
        }
        self.capacity = capacity;
    }

    /// Entries from most to least recent, paired with their 1-based index.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &str)> {
        self.entries
            .iter()
            .enumerate()
            .map(|(i, text)| (i + 1, text.as_str()))
    }

    /// Print the history as `n) text` lines, most recent first.
    pub fn print(&self, out: &mut dyn Write) -> std::io::Result<()> {
        for (index, text) in self.iter() {
            writeln!(out, "{index}) {text}")?;
        }
        Ok(())
    }
}
