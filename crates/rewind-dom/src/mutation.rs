#![forbid(unsafe_code)]

//! Mutation notification records.
//!
//! Observers register a subtree root with [`Dom::observe`]. Every mutation
//! whose target lies inside that subtree is queued on the observer's buffer
//! synchronously, in the order the mutations happened. Nothing is delivered
//! until the owner drains the buffer with [`Dom::take_records`].
//!
//! # Transient observation
//!
//! When a node is removed from an observed subtree, mutations inside the
//! removed node keep being recorded until the next `take_records`. Edits to
//! a node that was just cut out (and perhaps will be pasted back) are
//! therefore not lost between removal and flush.

use crate::dom::{AttrName, Dom, NodeId};

/// A single observed mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationRecord {
    /// Children were added to or removed from `target`.
    ChildList {
        target: NodeId,
        added: Vec<NodeId>,
        removed: Vec<NodeId>,
        previous_sibling: Option<NodeId>,
        next_sibling: Option<NodeId>,
    },
    /// An attribute of `target` changed; `old_value` is `None` if it was absent.
    Attributes {
        target: NodeId,
        name: AttrName,
        old_value: Option<String>,
    },
    /// The character data of `target` changed.
    CharacterData { target: NodeId, old_value: String },
}

impl MutationRecord {
    #[must_use]
    pub fn target(&self) -> NodeId {
        match self {
            Self::ChildList { target, .. }
            | Self::Attributes { target, .. }
            | Self::CharacterData { target, .. } => *target,
        }
    }
}

/// Handle to a registered observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(usize);

#[derive(Debug)]
pub(crate) struct ObserverSlot {
    root: NodeId,
    transient: Vec<NodeId>,
    queue: Vec<MutationRecord>,
}

impl Dom {
    /// Start recording mutations in the subtree rooted at `root`.
    pub fn observe(&mut self, root: NodeId) -> ObserverId {
        let slot = ObserverSlot {
            root,
            transient: Vec::new(),
            queue: Vec::new(),
        };
        if let Some(free) = self.observers.iter().position(Option::is_none) {
            self.observers[free] = Some(slot);
            ObserverId(free)
        } else {
            self.observers.push(Some(slot));
            ObserverId(self.observers.len() - 1)
        }
    }

    /// Drain every queued record for `observer`.
    ///
    /// Also ends transient observation of removed nodes.
    pub fn take_records(&mut self, observer: ObserverId) -> Vec<MutationRecord> {
        match self.observers.get_mut(observer.0) {
            Some(Some(slot)) => {
                slot.transient.clear();
                std::mem::take(&mut slot.queue)
            }
            _ => Vec::new(),
        }
    }

    /// Number of records waiting for `observer`.
    #[must_use]
    pub fn pending_records(&self, observer: ObserverId) -> usize {
        match self.observers.get(observer.0) {
            Some(Some(slot)) => slot.queue.len(),
            _ => 0,
        }
    }

    /// Stop observing and drop anything still queued.
    pub fn disconnect(&mut self, observer: ObserverId) {
        if let Some(entry) = self.observers.get_mut(observer.0) {
            *entry = None;
        }
    }

    /// Whether any observer watches `node` or something beneath it.
    pub(crate) fn is_observed(&self, node: NodeId) -> bool {
        let within = |other: NodeId| other == node || self.contains(node, other);
        self.observers
            .iter()
            .flatten()
            .any(|slot| within(slot.root) || slot.transient.iter().any(|&t| within(t)))
    }

    fn covers(&self, slot: &ObserverSlot, target: NodeId) -> bool {
        let inside = |root: NodeId| target == root || self.contains(root, target);
        inside(slot.root) || slot.transient.iter().any(|&t| inside(t))
    }

    pub(crate) fn notify(&mut self, record: MutationRecord) {
        let target = record.target();
        let interested: Vec<usize> = self
            .observers
            .iter()
            .enumerate()
            .filter_map(|(i, entry)| match entry {
                Some(slot) if self.covers(slot, target) => Some(i),
                _ => None,
            })
            .collect();
        if interested.is_empty() {
            return;
        }
        tracing::trace!(
            target: "rewind.dom",
            node = %target,
            observers = interested.len(),
            "queue mutation record"
        );
        for i in interested {
            if let Some(Some(slot)) = self.observers.get_mut(i) {
                slot.queue.push(record.clone());
            }
        }
    }

    /// Register `removed` as transiently observed for every observer that
    /// was watching `former_parent`.
    pub(crate) fn keep_observing_removed(&mut self, former_parent: NodeId, removed: NodeId) {
        let interested: Vec<usize> = self
            .observers
            .iter()
            .enumerate()
            .filter_map(|(i, entry)| match entry {
                Some(slot) if self.covers(slot, former_parent) => Some(i),
                _ => None,
            })
            .collect();
        for i in interested {
            if let Some(Some(slot)) = self.observers.get_mut(i) {
                if !slot.transient.contains(&removed) {
                    slot.transient.push(removed);
                }
            }
        }
    }
}
