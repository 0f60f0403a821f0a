#![forbid(unsafe_code)]

//! Change observers.
//!
//! A [`ChangeObserver`] turns whatever happened under a root since the last
//! call into a list of [`Change`]s. Two strategies are provided:
//!
//! | Observer | Granularity | Cost per flush |
//! |----------|-------------|----------------|
//! | [`LiveObserver`] | one change per net edit | proportional to the records |
//! | [`SnapshotObserver`] | delete-all then insert-all | proportional to the tree |
//!
//! Both produce change sets that invert correctly. Hosts that cannot rely
//! on mutation notifications use the snapshot strategy and accept coarser
//! history entries.

use rewind_dom::{Content, Dom, NodeId, ObserverId};

use crate::change::Change;
use crate::generate;
use crate::path::PathStep;
use crate::record;

/// Source of changes for a [`Context`](crate::Context).
pub trait ChangeObserver {
    /// Start watching `root`, forgetting anything seen before.
    fn observe_all(&mut self, dom: &mut Dom, root: NodeId);

    /// Changes since the last take or discard. Empty if nothing happened.
    fn take_changes(&mut self, dom: &mut Dom) -> Vec<Change>;

    /// Forget changes since the last take or discard.
    fn discard_changes(&mut self, dom: &mut Dom);

    /// Stop watching.
    fn disconnect(&mut self, dom: &mut Dom);
}

// ============================================================================
// Live observer
// ============================================================================

/// Diffs mutation records into minimal changes.
#[derive(Debug, Default)]
pub struct LiveObserver {
    root: Option<NodeId>,
    observer: Option<ObserverId>,
}

impl LiveObserver {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl ChangeObserver for LiveObserver {
    fn observe_all(&mut self, dom: &mut Dom, root: NodeId) {
        if let Some(previous) = self.observer.take() {
            dom.disconnect(previous);
        }
        self.observer = Some(dom.observe(root));
        self.root = Some(root);
    }

    fn take_changes(&mut self, dom: &mut Dom) -> Vec<Change> {
        let (Some(observer), Some(root)) = (self.observer, self.root) else {
            return Vec::new();
        };
        let records = dom.take_records(observer);
        if records.is_empty() {
            return Vec::new();
        }
        let record_count = records.len();
        let tree = record::build_record_tree(dom, root, records);
        let changes = match generate::generate_changes(dom, root, &tree) {
            Ok(changes) => changes,
            Err(err) => panic!("record tree escaped the observed root {root}: {err}"),
        };
        tracing::trace!(
            target: "rewind.observer",
            records = record_count,
            changes = changes.len(),
            "live observer flush"
        );
        changes
    }

    fn discard_changes(&mut self, dom: &mut Dom) {
        if let Some(observer) = self.observer {
            let dropped = dom.take_records(observer).len();
            tracing::trace!(target: "rewind.observer", records = dropped, "live observer discard");
        }
    }

    fn disconnect(&mut self, dom: &mut Dom) {
        if let Some(observer) = self.observer.take() {
            dom.disconnect(observer);
        }
        self.root = None;
    }
}

// ============================================================================
// Snapshot observer
// ============================================================================

/// Compares whole-root snapshots.
#[derive(Debug, Default)]
pub struct SnapshotObserver {
    root: Option<NodeId>,
    before: Option<Content>,
}

impl SnapshotObserver {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl ChangeObserver for SnapshotObserver {
    fn observe_all(&mut self, dom: &mut Dom, root: NodeId) {
        self.root = Some(root);
        self.before = Some(dom.snapshot(root));
    }

    fn take_changes(&mut self, dom: &mut Dom) -> Vec<Change> {
        let Some(root) = self.root else {
            return Vec::new();
        };
        let after = dom.snapshot(root);
        let Some(before) = self.before.replace(after.clone()) else {
            return Vec::new();
        };
        if before == after {
            return Vec::new();
        }
        let path = vec![PathStep::new(0, dom.node_name(root))];
        let mut changes = Vec::with_capacity(2);
        if !before.children().is_empty() {
            changes.push(Change::Delete {
                path: path.clone(),
                content: before.children().to_vec(),
            });
        }
        if !after.children().is_empty() {
            changes.push(Change::Insert {
                path,
                content: after.children().to_vec(),
            });
        }
        tracing::trace!(
            target: "rewind.observer",
            changes = changes.len(),
            "snapshot observer flush"
        );
        changes
    }

    fn discard_changes(&mut self, dom: &mut Dom) {
        if let Some(root) = self.root {
            self.before = Some(dom.snapshot(root));
        }
    }

    fn disconnect(&mut self, _dom: &mut Dom) {
        self.root = None;
        self.before = None;
    }
}
