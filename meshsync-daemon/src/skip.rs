//! Single-use suppression of local events caused by a peer's changes.
//!
//! When a peer announces a changeset, this host's next sync will apply those
//! changes locally and its watcher will report them. Each announced
//! `(kind, path)` is recorded once and swallowed by the first matching local
//! event; a later event for the same path is a genuine change and passes.
//!
//! Entries do not expire. Concurrent events race for an entry in arrival
//! order: the first matching event consumes it.

use std::collections::HashSet;

use meshsync_core::{normalize_relative, ChangeKind, ChangeSet};

#[derive(Debug, Default)]
pub struct SkipRegistry {
    entries: HashSet<(ChangeKind, String)>,
}

impl SkipRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert one entry per path per kind it appears under. Seeding an entry
    /// that is already present is a no-op.
    pub fn seed(&mut self, changeset: &ChangeSet) {
        for (kind, path) in changeset.entries() {
            self.entries.insert((kind, normalize_relative(path)));
        }
    }

    /// Remove the entry for `(kind, path)`, returning whether it existed.
    pub fn consume(&mut self, kind: ChangeKind, path: &str) -> bool {
        self.entries.remove(&(kind, normalize_relative(path)))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
