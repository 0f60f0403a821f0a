#![forbid(unsafe_code)]

//! Tree positions.
//!
//! A [`Boundary`] sits between two children of an element, or between two
//! characters of a text node. A [`Range`] is a pair of boundaries owned by
//! the host (a cursor or selection). Primitives in [`crate::preserve`] take
//! ranges by `&mut` and keep them valid as the tree changes.

use std::cmp::Ordering;

use crate::dom::{Dom, NodeId};

/// A position: child offset in an element, or character offset in text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Boundary {
    pub container: NodeId,
    pub offset: usize,
}

impl Boundary {
    #[must_use]
    pub const fn new(container: NodeId, offset: usize) -> Self {
        Self { container, offset }
    }

    /// Boundary right before `node`. Detached nodes map to `(node, 0)`.
    #[must_use]
    pub fn before(dom: &Dom, node: NodeId) -> Self {
        match dom.parent(node) {
            Some(parent) => Self::new(parent, dom.node_index(node)),
            None => Self::new(node, 0),
        }
    }

    /// Boundary right after `node`. Detached nodes map to their end.
    #[must_use]
    pub fn after(dom: &Dom, node: NodeId) -> Self {
        match dom.parent(node) {
            Some(parent) => Self::new(parent, dom.node_index(node) + 1),
            None => Self::new(node, dom.node_length(node)),
        }
    }
}

/// A host-held pair of boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Range {
    pub start: Boundary,
    pub end: Boundary,
}

impl Range {
    #[must_use]
    pub const fn new(start: Boundary, end: Boundary) -> Self {
        Self { start, end }
    }

    /// Range with both ends at `at`.
    #[must_use]
    pub const fn collapsed(at: Boundary) -> Self {
        Self { start: at, end: at }
    }

    #[must_use]
    pub fn is_collapsed(&self) -> bool {
        self.start == self.end
    }

    pub fn boundaries_mut(&mut self) -> [&mut Boundary; 2] {
        [&mut self.start, &mut self.end]
    }
}

/// Move a text boundary at either end of its node up to the parent.
///
/// `(text, 0)` becomes `(parent, index)` and `(text, len)` becomes
/// `(parent, index + 1)`. Boundaries strictly inside a text node, element
/// boundaries, and boundaries in detached text are returned unchanged.
#[must_use]
pub fn normalize_boundary(dom: &Dom, boundary: Boundary) -> Boundary {
    let node = boundary.container;
    if !dom.is_text(node) {
        return boundary;
    }
    let Some(parent) = dom.parent(node) else {
        return boundary;
    };
    if boundary.offset == 0 {
        Boundary::new(parent, dom.node_index(node))
    } else if boundary.offset >= dom.node_length(node) {
        Boundary::new(parent, dom.node_index(node) + 1)
    } else {
        boundary
    }
}

/// Child before an element boundary.
#[must_use]
pub fn node_before(dom: &Dom, boundary: Boundary) -> Option<NodeId> {
    if dom.is_text(boundary.container) || boundary.offset == 0 {
        return None;
    }
    dom.children(boundary.container)
        .get(boundary.offset - 1)
        .copied()
}

/// Child after an element boundary.
#[must_use]
pub fn node_after(dom: &Dom, boundary: Boundary) -> Option<NodeId> {
    if dom.is_text(boundary.container) {
        return None;
    }
    dom.children(boundary.container)
        .get(boundary.offset)
        .copied()
}

/// Like [`node_after`], but passes over empty text nodes.
#[must_use]
pub fn node_after_skipping_empty(dom: &Dom, boundary: Boundary) -> Option<NodeId> {
    if dom.is_text(boundary.container) {
        return None;
    }
    dom.children(boundary.container)
        .iter()
        .skip(boundary.offset)
        .copied()
        .find(|&n| !dom.is_empty_text(n))
}

/// Whether the boundary is at the end of its container.
#[must_use]
pub fn is_at_end(dom: &Dom, boundary: Boundary) -> bool {
    boundary.offset >= dom.node_length(boundary.container)
}

/// Characters of the contiguous text run that precede `boundary`.
///
/// Inside a text node this is the offset plus the length of every
/// adjacent text sibling before it.
#[must_use]
pub fn preceding_text_length(dom: &Dom, boundary: Boundary) -> usize {
    let (mut length, mut node) = if dom.is_text(boundary.container) {
        (boundary.offset, dom.prev_sibling(boundary.container))
    } else {
        (0, node_before(dom, boundary))
    };
    while let Some(n) = node {
        if !dom.is_text(n) {
            break;
        }
        length += dom.node_length(n);
        node = dom.prev_sibling(n);
    }
    length
}

/// Compare two boundaries in document order.
///
/// Returns `None` when they lie in different trees.
#[must_use]
pub fn compare_boundaries(dom: &Dom, a: Boundary, b: Boundary) -> Option<Ordering> {
    if a.container == b.container {
        return Some(a.offset.cmp(&b.offset));
    }
    if dom.contains(a.container, b.container) {
        let child = child_toward(dom, a.container, b.container);
        return Some(if dom.node_index(child) < a.offset {
            Ordering::Greater
        } else {
            Ordering::Less
        });
    }
    if dom.contains(b.container, a.container) {
        return compare_boundaries(dom, b, a).map(Ordering::reverse);
    }
    dom.compare_tree_order(a.container, b.container)
}

/// The child of `ancestor` on the path down to `node`.
fn child_toward(dom: &Dom, ancestor: NodeId, node: NodeId) -> NodeId {
    let mut current = node;
    while let Some(parent) = dom.parent(current) {
        if parent == ancestor {
            break;
        }
        current = parent;
    }
    current
}
