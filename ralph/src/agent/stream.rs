//! Per-parse stream state: tool pairing and text delta accounting
//!
//! Created fresh for each iteration's stream and discarded at EOF.
//! Guarantees the render pairing rules: at most one "started" per tool
//! ID, at most one "done", and "done" only after a matching start.

use std::collections::{HashMap, HashSet};

use tracing::debug;

#[derive(Debug, Default)]
pub struct StreamState {
    /// Tool IDs started but not yet completed, in arrival order
    pending: Vec<String>,
    /// Display names for completion rendering
    names: HashMap<String, String>,
    /// IDs that already rendered their "done" line
    completed: HashSet<String>,
    /// Characters of assistant text already rendered this turn
    pub rendered_chars: usize,
    /// Accumulated assistant text across the whole stream
    pub text: String,
    /// The last rendered text did not end with a newline
    pub needs_newline: bool,
}

impl StreamState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool start. Returns false when the ID was already
    /// seen, in which case nothing may be rendered.
    pub fn start_tool(&mut self, id: &str, name: &str) -> bool {
        if self.names.contains_key(id) {
            debug!(%id, "stream: duplicate tool start ignored");
            return false;
        }
        self.pending.push(id.to_string());
        self.names.insert(id.to_string(), name.to_string());
        true
    }

    /// Register a tool completion. Returns the display name exactly
    /// once per started ID, and never for an unknown ID.
    pub fn complete_tool(&mut self, id: &str) -> Option<String> {
        if self.completed.contains(id) {
            debug!(%id, "stream: duplicate tool completion ignored");
            return None;
        }
        let position = self.pending.iter().position(|p| p == id)?;
        self.pending.remove(position);
        self.completed.insert(id.to_string());
        self.names.get(id).cloned()
    }

    /// A fresh assistant turn follows a user message
    pub fn reset_rendered(&mut self) {
        self.rendered_chars = 0;
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}
