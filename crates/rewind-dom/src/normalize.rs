#![forbid(unsafe_code)]

//! Normalized child indices.
//!
//! A host may leave a text run split across several adjacent text nodes,
//! or keep empty text nodes around. Normalized indices count children as if
//! every run of adjacent text nodes were merged and empty text nodes were
//! absent:
//!
//! ```text
//! real:        [ "ab" ][ "" ][ "c" ][ <b> ][ "" ][ <i> ]
//! normalized:  [        0         ][  1  ]      [  2  ]
//! ```
//!
//! A run made only of empty text nodes counts as nothing.

use crate::dom::{Dom, NodeId};

/// Normalized units among `children[..end]` of `elem`.
///
/// The second value reports whether the children just before `end` form a
/// text run with content, i.e. whether text inserted at `end` would merge
/// into the last counted unit.
#[must_use]
pub fn normalized_units_before(dom: &Dom, elem: NodeId, end: usize) -> (usize, bool) {
    let children = dom.children(elem);
    let end = end.min(children.len());
    let mut units = 0;
    let mut run_has_text = false;
    for &child in &children[..end] {
        if dom.is_text(child) {
            if !run_has_text && !dom.is_empty_text(child) {
                units += 1;
                run_has_text = true;
            }
        } else {
            units += 1;
            run_has_text = false;
        }
    }
    (units, run_has_text)
}

/// Number of normalized children of `elem`.
#[must_use]
pub fn normalized_child_count(dom: &Dom, elem: NodeId) -> usize {
    normalized_units_before(dom, elem, dom.children(elem).len()).0
}

/// Normalized position of the real child offset `real` in `elem`.
#[must_use]
pub fn normalized_from_real_index(dom: &Dom, elem: NodeId, real: usize) -> usize {
    normalized_units_before(dom, elem, real).0
}

/// First real index of the text run that contains `node`.
fn text_run_start(dom: &Dom, node: NodeId) -> usize {
    let mut start = node;
    while let Some(prev) = dom.prev_sibling(start) {
        if !dom.is_text(prev) {
            break;
        }
        start = prev;
    }
    dom.node_index(start)
}

/// Normalized index of `node` among its siblings.
///
/// Every text node of a run maps to the index of the run.
#[must_use]
pub fn normalized_node_index(dom: &Dom, node: NodeId) -> usize {
    let Some(parent) = dom.parent(node) else {
        return 0;
    };
    let real = if dom.is_text(node) {
        text_run_start(dom, node)
    } else {
        dom.node_index(node)
    };
    normalized_from_real_index(dom, parent, real)
}

/// Real index where normalized unit `index` of `elem` starts.
///
/// `index == normalized_child_count` maps to the end. Returns `None` past
/// the end.
#[must_use]
pub fn real_from_normalized_index(dom: &Dom, elem: NodeId, index: usize) -> Option<usize> {
    let children = dom.children(elem);
    let mut units = 0;
    let mut real = 0;
    while real < children.len() {
        if units >= index {
            return Some(real);
        }
        if dom.is_text(children[real]) {
            let mut has_text = false;
            while real < children.len() && dom.is_text(children[real]) {
                has_text |= !dom.is_empty_text(children[real]);
                real += 1;
            }
            if has_text {
                units += 1;
            }
        } else {
            units += 1;
            real += 1;
        }
    }
    (units >= index).then_some(children.len())
}

/// The child at normalized `index`, skipping leading empty text nodes.
#[must_use]
pub fn normalized_nth_child(dom: &Dom, elem: NodeId, index: usize) -> Option<NodeId> {
    let real = real_from_normalized_index(dom, elem, index)?;
    dom.children(elem)[real..]
        .iter()
        .copied()
        .find(|&child| !dom.is_empty_text(child))
}
