#![forbid(unsafe_code)]

//! Linear history of change sets.
//!
//! # Invariants
//!
//! 1. `index <= entries.len()` after every operation.
//! 2. Entries before `index` are undoable, entries from `index` on are
//!    redoable.
//! 3. Recording new entries drops every redoable entry first.
//! 4. `entries.len() <= max_entries`; the oldest entries are evicted.
//!
//! ```text
//! record(d)                     undo() x2                   record(e)
//! [a, b, c, d]  index 4  ─►  [a, b, c, d]  index 2  ─►  [a, b, e]  index 3
//! ```

use std::collections::VecDeque;

use crate::change::{ChangeSet, CombineConfig};

/// What [`History::record`] did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecordOutcome {
    /// Entries appended (a combined entry counts once).
    pub appended: usize,
    /// Redoable entries dropped before appending.
    pub truncated: usize,
    /// Whether the newest entry absorbed the new change set.
    pub combined: bool,
    /// Oldest entries dropped to stay within the bound.
    pub evicted: usize,
}

#[derive(Debug, Clone)]
pub struct History {
    entries: VecDeque<ChangeSet>,
    index: usize,
    max_entries: usize,
}

impl Default for History {
    fn default() -> Self {
        Self::new(1000)
    }
}

impl History {
    #[must_use]
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            index: 0,
            max_entries,
        }
    }

    /// Append `sets` after the current position.
    ///
    /// With `combine`, a single new change set may be merged into the
    /// entry before it.
    pub fn record(&mut self, sets: Vec<ChangeSet>, combine: Option<&CombineConfig>) -> RecordOutcome {
        let truncated = self.entries.len() - self.index;
        self.entries.truncate(self.index);

        let merged = match (combine, sets.as_slice()) {
            (Some(config), [only]) => self
                .entries
                .back()
                .and_then(|last| last.combine(only, config)),
            _ => None,
        };
        let combined = merged.is_some();
        let sets = match merged {
            Some(set) => {
                self.entries.pop_back();
                vec![set]
            }
            None => sets,
        };

        let appended = sets.len();
        self.entries.extend(sets);
        let mut evicted = 0;
        while self.entries.len() > self.max_entries {
            self.entries.pop_front();
            evicted += 1;
        }
        self.index = self.entries.len();
        RecordOutcome {
            appended,
            truncated,
            combined,
            evicted,
        }
    }

    /// The entry [`step_back`](Self::step_back) would move over.
    #[must_use]
    pub fn undo_target(&self) -> Option<&ChangeSet> {
        self.index.checked_sub(1).and_then(|i| self.entries.get(i))
    }

    /// The entry [`step_forward`](Self::step_forward) would move over.
    #[must_use]
    pub fn redo_target(&self) -> Option<&ChangeSet> {
        self.entries.get(self.index)
    }

    pub fn step_back(&mut self) -> bool {
        if self.index == 0 {
            return false;
        }
        self.index -= 1;
        true
    }

    pub fn step_forward(&mut self) -> bool {
        if self.index >= self.entries.len() {
            return false;
        }
        self.index += 1;
        true
    }

    #[must_use]
    pub fn can_undo(&self) -> bool {
        self.index > 0
    }

    #[must_use]
    pub fn can_redo(&self) -> bool {
        self.index < self.entries.len()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }

    #[must_use]
    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    pub fn iter(&self) -> impl Iterator<Item = &ChangeSet> {
        self.entries.iter()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.index = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::change::{Change, Meta, RangeUpdate};
    use crate::path::PathStep;
    use rewind_dom::Content;

    fn entry(kind: &str, offset: usize, text: &str) -> ChangeSet {
        ChangeSet::new(
            Meta::new(kind),
            vec![Change::Insert {
                path: vec![PathStep::new(0, "div"), PathStep::text(offset)],
                content: vec![Content::text(text)],
            }],
            RangeUpdate::default(),
        )
    }

    #[test]
    fn test_record_and_step() {
        let mut history = History::new(10);
        history.record(vec![entry("a", 1, "x"), entry("b", 9, "y")], None);
        assert_eq!(history.len(), 2);
        assert_eq!(history.index(), 2);
        assert!(history.step_back());
        assert_eq!(history.redo_target().and_then(|s| s.meta.kind()), Some("b"));
        assert!(history.step_back());
        assert!(!history.step_back());
        assert!(history.undo_target().is_none());
        assert!(history.step_forward());
        assert!(history.can_undo() && history.can_redo());
    }

    #[test]
    fn test_new_entry_truncates_redo_tail() {
        let mut history = History::new(10);
        history.record(vec![entry("a", 1, "x"), entry("b", 5, "y"), entry("c", 9, "z")], None);
        history.step_back();
        history.step_back();
        let outcome = history.record(vec![entry("d", 3, "w")], None);
        assert_eq!(outcome.truncated, 2);
        assert_eq!(history.len(), 2);
        assert_eq!(history.index(), 2);
        assert!(!history.can_redo());
    }

    #[test]
    fn test_eviction_keeps_bound() {
        let mut history = History::new(3);
        for i in 0..5 {
            history.record(vec![entry("x", i * 10 + 1, "a")], None);
        }
        assert_eq!(history.len(), 3);
        assert_eq!(history.index(), 3);
    }

    #[test]
    fn test_combine_replaces_last_entry() {
        let mut history = History::new(10);
        let config = CombineConfig::default();
        history.record(vec![entry("typing", 1, "h")], Some(&config));
        let outcome = history.record(vec![entry("typing", 2, "i")], Some(&config));
        assert!(outcome.combined);
        assert_eq!(history.len(), 1);
        let Change::Insert { content, .. } = &history.iter().next().unwrap().changes[0] else {
            panic!("expected insert");
        };
        assert_eq!(content, &vec![Content::text("hi")]);

        let outcome = history.record(vec![entry("typing", 3, "!")], None);
        assert!(!outcome.combined);
        assert_eq!(history.len(), 2);
    }
}
