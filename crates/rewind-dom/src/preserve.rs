#![forbid(unsafe_code)]

//! Structural primitives that keep live ranges valid.
//!
//! Each function performs one mutation and adjusts every boundary of the
//! supplied ranges within the same call, so a caller never observes a range
//! pointing at a detached node or a stale offset.
//!
//! # Invariants
//!
//! After any primitive returns, every boundary in `ranges` refers to a node
//! that is still in the tree it was in before the call (unless the call
//! removed the container that held the whole tree) and its offset is within
//! `0..=node_length(container)`.

use crate::boundary::{Boundary, Range};
use crate::dom::{Dom, DomError, NodeId};

fn for_each_boundary(ranges: &mut [Range], mut f: impl FnMut(&mut Boundary)) {
    for range in ranges.iter_mut() {
        for boundary in range.boundaries_mut() {
            f(boundary);
        }
    }
}

/// Split the text node under a mid-text boundary.
///
/// Always returns an element-level boundary: text boundaries at either end
/// of their node are lifted to the parent without splitting.
pub fn split_boundary(
    dom: &mut Dom,
    boundary: Boundary,
    ranges: &mut [Range],
) -> Result<Boundary, DomError> {
    let node = boundary.container;
    if !dom.is_text(node) {
        return Ok(boundary);
    }
    let parent = dom.parent(node).ok_or(DomError::NoParent { node })?;
    let index = dom.node_index(node);
    let length = dom.node_length(node);
    let offset = boundary.offset;
    if offset == 0 {
        return Ok(Boundary::new(parent, index));
    }
    if offset >= length {
        return Ok(Boundary::new(parent, index + 1));
    }
    let tail: String = dom
        .text(node)
        .unwrap_or_default()
        .chars()
        .skip(offset)
        .collect();
    let after = dom.create_text(tail);
    dom.delete_data(node, offset, length - offset)?;
    dom.insert_before(parent, after, dom.next_sibling(node))?;
    for_each_boundary(ranges, |b| {
        if b.container == node && b.offset > offset {
            *b = Boundary::new(after, b.offset - offset);
        } else if b.container == parent && b.offset > index {
            b.offset += 1;
        }
    });
    Ok(Boundary::new(parent, index + 1))
}

/// Insert a detached `node` at `boundary` and return the boundary after it.
///
/// Boundaries sitting exactly at the insertion point end up after the node
/// when `insert_before` is true, and before it otherwise.
pub fn insert_node_at_boundary(
    dom: &mut Dom,
    node: NodeId,
    boundary: Boundary,
    insert_before: bool,
    ranges: &mut [Range],
) -> Result<Boundary, DomError> {
    let at = split_boundary(dom, boundary, ranges)?;
    if dom.parent(node).is_some() {
        return Err(DomError::HierarchyRequest {
            parent: at.container,
            child: node,
        });
    }
    let reference = dom.children(at.container).get(at.offset).copied();
    dom.insert_before(at.container, node, reference)?;
    for_each_boundary(ranges, |b| {
        let shifts = if insert_before {
            b.offset >= at.offset
        } else {
            b.offset > at.offset
        };
        if b.container == at.container && shifts {
            b.offset += 1;
        }
    });
    Ok(Boundary::new(at.container, at.offset + 1))
}

/// Remove `node`, moving boundaries inside it to where it used to be.
pub fn remove_preserving_ranges(
    dom: &mut Dom,
    node: NodeId,
    ranges: &mut [Range],
) -> Result<(), DomError> {
    let Some(parent) = dom.parent(node) else {
        return Ok(());
    };
    let index = dom.node_index(node);
    for_each_boundary(ranges, |b| {
        if b.container == node || dom.contains(node, b.container) {
            *b = Boundary::new(parent, index);
        } else if b.container == parent && b.offset > index {
            b.offset -= 1;
        }
    });
    dom.remove_child(parent, node)
}

/// Merge `node` into an adjacent text sibling.
///
/// With `into_previous` the data is appended to `sibling`, otherwise it is
/// prepended. Returns the surviving node.
fn join_one_way(
    dom: &mut Dom,
    node: NodeId,
    sibling: NodeId,
    into_previous: bool,
    ranges: &mut [Range],
) -> Result<NodeId, DomError> {
    let parent = dom.parent(node).ok_or(DomError::NoParent { node })?;
    let index = dom.node_index(node);
    let node_len = dom.node_length(node);
    let sibling_len = dom.node_length(sibling);
    let data = dom.text(node).unwrap_or_default().to_owned();
    dom.insert_data(sibling, if into_previous { sibling_len } else { 0 }, &data)?;
    for_each_boundary(ranges, |b| {
        if b.container == node {
            let shift = if into_previous { sibling_len } else { 0 };
            *b = Boundary::new(sibling, b.offset + shift);
        } else if b.container == sibling {
            if !into_previous {
                b.offset += node_len;
            }
        } else if b.container == parent {
            if b.offset == index {
                let at = if into_previous { sibling_len } else { 0 };
                *b = Boundary::new(sibling, at);
            } else if !into_previous && b.offset == index + 1 {
                *b = Boundary::new(sibling, node_len);
            } else if b.offset > index {
                b.offset -= 1;
            }
        }
    });
    dom.remove_child(parent, node)?;
    Ok(sibling)
}

/// Merge a text node with its adjacent text siblings.
///
/// Joins with the previous sibling first, then with the next one. Returns
/// the node that holds the merged text. Elements and detached nodes are
/// left alone.
pub fn join_text_node(
    dom: &mut Dom,
    node: NodeId,
    ranges: &mut [Range],
) -> Result<NodeId, DomError> {
    if !dom.is_text(node) || dom.parent(node).is_none() {
        return Ok(node);
    }
    let mut current = node;
    if let Some(prev) = dom.prev_sibling(current).filter(|&p| dom.is_text(p)) {
        current = join_one_way(dom, current, prev, true, ranges)?;
    }
    if let Some(next) = dom.next_sibling(current).filter(|&n| dom.is_text(n)) {
        current = join_one_way(dom, current, next, false, ranges)?;
    }
    Ok(current)
}
