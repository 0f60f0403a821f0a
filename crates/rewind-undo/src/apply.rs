#![forbid(unsafe_code)]

//! Replaying changes against a live tree.
//!
//! Every structural step goes through [`rewind_dom::preserve`], so the
//! host's ranges stay valid while a change set is applied. Text inserted by
//! a change set is merged with adjacent text in a final join pass, which
//! undoes the splits that inserts and partial deletes leave behind.
//!
//! Nodes cut out of the tree by a change set (deleted nodes, split heads
//! and text absorbed by the join pass) are handed back to the caller, which
//! may release them.
//!
//! # Failure Modes
//!
//! A change set recorded against one tree and replayed against a different
//! one fails with [`ApplyError`]. The tree may be partially modified at
//! that point; callers treat the error as fatal for the history.

use std::fmt;

use rewind_dom::boundary::{self, Range};
use rewind_dom::preserve;
use rewind_dom::{Content, Dom, DomError, NodeId, TEXT_NODE_NAME};

use crate::change::{Change, ChangeSet, RangeUpdate};
use crate::path::{self, PathError};

/// Why a change could not be replayed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyError {
    Path(PathError),
    Dom(DomError),
    /// The tree does not hold what a delete or attribute update expects.
    ContentMismatch {
        expected: String,
        found: Option<String>,
    },
}

impl fmt::Display for ApplyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Path(err) => write!(f, "path error: {err}"),
            Self::Dom(err) => write!(f, "tree error: {err}"),
            Self::ContentMismatch {
                expected,
                found: Some(found),
            } => write!(f, "expected <{expected}> but found <{found}>"),
            Self::ContentMismatch {
                expected,
                found: None,
            } => write!(f, "expected <{expected}> but found nothing"),
        }
    }
}

impl std::error::Error for ApplyError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Path(err) => Some(err),
            Self::Dom(err) => Some(err),
            Self::ContentMismatch { .. } => None,
        }
    }
}

impl From<PathError> for ApplyError {
    fn from(err: PathError) -> Self {
        Self::Path(err)
    }
}

impl From<DomError> for ApplyError {
    fn from(err: DomError) -> Self {
        Self::Dom(err)
    }
}

fn mismatch(dom: &Dom, expected: &str, found: Option<NodeId>) -> ApplyError {
    ApplyError::ContentMismatch {
        expected: expected.to_owned(),
        found: found.map(|n| dom.node_name(n).to_owned()),
    }
}

/// Nodes created or cut out while applying changes.
#[derive(Debug, Default)]
struct Touched {
    text_nodes: Vec<NodeId>,
    removed: Vec<NodeId>,
}

/// Apply one change.
///
/// `range` receives the new selection of an [`Change::UpdateRange`];
/// `ranges` are kept valid; text nodes created by inserts or split off by
/// deletes are pushed onto `text_nodes` for a later join pass.
pub fn apply_change(
    dom: &mut Dom,
    container: NodeId,
    change: &Change,
    range: Option<&mut Range>,
    ranges: &mut [Range],
    text_nodes: &mut Vec<NodeId>,
) -> Result<(), ApplyError> {
    let mut touched = Touched {
        text_nodes: std::mem::take(text_nodes),
        removed: Vec::new(),
    };
    let outcome = apply_tracked(dom, container, change, range, ranges, &mut touched);
    *text_nodes = touched.text_nodes;
    outcome
}

fn apply_tracked(
    dom: &mut Dom,
    container: NodeId,
    change: &Change,
    range: Option<&mut Range>,
    ranges: &mut [Range],
    touched: &mut Touched,
) -> Result<(), ApplyError> {
    match change {
        Change::UpdateAttr { path, attrs } => {
            let at = path::boundary_from_path(dom, container, path)?;
            let node = boundary::node_after_skipping_empty(dom, at)
                .ok_or_else(|| mismatch(dom, "element", None))?;
            for attr in attrs {
                match &attr.new {
                    Some(value) => dom.set_attr(node, attr.name.clone(), value.clone())?,
                    None => dom.remove_attr(node, &attr.name)?,
                }
            }
        }
        Change::UpdateRange(update) => {
            if let Some(range) = range {
                apply_range_update(dom, container, update, range)?;
            }
        }
        Change::Insert { path, content } => {
            let mut at = path::boundary_from_path(dom, container, path)?;
            for item in content {
                let node = dom.instantiate(item);
                if dom.is_text(node) {
                    touched.text_nodes.push(node);
                }
                at = preserve::insert_node_at_boundary(dom, node, at, true, ranges)?;
            }
        }
        Change::Delete { path, content } => {
            let at = path::boundary_from_path(dom, container, path)?;
            let at = preserve::split_boundary(dom, at, ranges)?;
            let mut next = boundary::node_after(dom, at);
            for item in content {
                next = match item {
                    Content::Text(text) => {
                        delete_text(dom, next, text.chars().count(), ranges, touched)?
                    }
                    Content::Element { name, .. } => {
                        delete_element(dom, next, name, ranges, touched)?
                    }
                };
            }
        }
    }
    Ok(())
}

/// Remove `count` characters of text starting at `next`. Returns the node
/// following the removed text.
fn delete_text(
    dom: &mut Dom,
    mut next: Option<NodeId>,
    count: usize,
    ranges: &mut [Range],
    touched: &mut Touched,
) -> Result<Option<NodeId>, ApplyError> {
    let mut remaining = count;
    while remaining > 0 {
        let node = next
            .filter(|&n| dom.is_text(n))
            .ok_or_else(|| mismatch(dom, TEXT_NODE_NAME, next))?;
        let length = dom.node_length(node);
        if remaining >= length {
            next = dom.next_sibling(node);
            preserve::remove_preserving_ranges(dom, node, ranges)?;
            touched.removed.push(node);
            remaining -= length;
        } else {
            let at = preserve::split_boundary(dom, boundary::Boundary::new(node, remaining), ranges)?;
            let tail = boundary::node_after(dom, at);
            preserve::remove_preserving_ranges(dom, node, ranges)?;
            touched.removed.push(node);
            if let Some(tail) = tail {
                touched.text_nodes.push(tail);
            }
            remaining = 0;
            next = tail;
        }
    }
    Ok(next)
}

/// Remove the element at `next`, which must be named `name`. Empty text
/// nodes in front of it are passed over.
fn delete_element(
    dom: &mut Dom,
    mut next: Option<NodeId>,
    name: &str,
    ranges: &mut [Range],
    touched: &mut Touched,
) -> Result<Option<NodeId>, ApplyError> {
    while let Some(n) = next.filter(|&n| dom.is_empty_text(n)) {
        next = dom.next_sibling(n);
    }
    let node = match next {
        Some(node) if dom.node_name(node) == name => node,
        other => return Err(mismatch(dom, name, other)),
    };
    let following = dom.next_sibling(node);
    preserve::remove_preserving_ranges(dom, node, ranges)?;
    touched.removed.push(node);
    Ok(following)
}

fn apply_range_update(
    dom: &Dom,
    container: NodeId,
    update: &RangeUpdate,
    range: &mut Range,
) -> Result<(), ApplyError> {
    if let Some(new) = &update.new {
        *range = path::range_from_path(dom, container, new)?;
    }
    Ok(())
}

/// Apply every change of `set`, join the text it touched, then move
/// `range` to the set's new selection.
///
/// Returns the roots of the detached subtrees the set cut out of the tree.
pub fn apply_change_set(
    dom: &mut Dom,
    container: NodeId,
    set: &ChangeSet,
    range: Option<&mut Range>,
    ranges: &mut [Range],
) -> Result<Vec<NodeId>, ApplyError> {
    let _span = tracing::debug_span!(
        "apply.change_set",
        changes = set.changes.len(),
        joined = tracing::field::Empty,
    )
    .entered();

    // The selection is kept valid alongside the other ranges until it is
    // replaced by the recorded one.
    let mut tracked: Vec<Range> = ranges.to_vec();
    if let Some(r) = range.as_deref() {
        tracked.push(*r);
    }
    let mut touched = Touched::default();
    for change in &set.changes {
        tracing::trace!(target: "rewind.apply", kind = change.kind(), "apply change");
        apply_tracked(dom, container, change, None, &mut tracked, &mut touched)?;
    }

    let mut joined = 0usize;
    for node in std::mem::take(&mut touched.text_nodes) {
        if dom.has_node(node) && dom.parent(node).is_some() {
            let around = [dom.prev_sibling(node), Some(node), dom.next_sibling(node)];
            let kept = preserve::join_text_node(dom, node, &mut tracked)?;
            touched.removed.extend(
                around
                    .into_iter()
                    .flatten()
                    .filter(|&n| n != kept && dom.parent(n).is_none()),
            );
            joined += 1;
        }
    }
    tracing::Span::current().record("joined", joined);

    ranges.copy_from_slice(&tracked[..ranges.len()]);
    if let Some(range) = range {
        if let Some(kept) = tracked.get(ranges.len()) {
            *range = *kept;
        }
        apply_range_update(dom, container, &set.selection, range)?;
    }
    tracing::debug!(
        target: "rewind.apply",
        changes = set.changes.len(),
        joined,
        removed = touched.removed.len(),
        "change set applied"
    );
    Ok(touched.removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::change::{AttrChange, Meta};
    use crate::path::PathStep;
    use rewind_dom::markup::{inner_markup, parse_fragment, set_inner_markup};
    use rewind_dom::Boundary;

    fn setup(markup: &str) -> (Dom, NodeId) {
        let mut dom = Dom::new();
        let root = dom.create_element("div");
        set_inner_markup(&mut dom, root, markup).unwrap();
        (dom, root)
    }

    fn path(raw: &[(usize, &str)]) -> Vec<PathStep> {
        raw.iter().map(|&(o, n)| PathStep::new(o, n)).collect()
    }

    fn content(markup: &str) -> Vec<Content> {
        let mut scratch = Dom::new();
        parse_fragment(&mut scratch, markup)
            .unwrap()
            .into_iter()
            .map(|n| scratch.snapshot(n))
            .collect()
    }

    fn set(changes: Vec<Change>) -> ChangeSet {
        ChangeSet::new(Meta::default(), changes, RangeUpdate::default())
    }

    #[test]
    fn test_apply_inserts_at_nested_paths() {
        let (mut dom, root) = setup("");
        let changes = set(vec![
            Change::Insert {
                path: path(&[(0, "div")]),
                content: content("zero<b>one</b>two<i>three</i>four"),
            },
            Change::Insert {
                path: path(&[(1, "div"), (1, "b")]),
                content: content("<u>x</u>"),
            },
            Change::Insert {
                path: path(&[(3, "div"), (0, "i"), (2, "#text")]),
                content: content("x"),
            },
        ]);
        apply_change_set(&mut dom, root, &changes, None, &mut []).unwrap();
        assert_eq!(
            inner_markup(&dom, root),
            "zero<b>one<u>x</u></b>two<i>thxree</i>four"
        );
        let i = dom.children(root)[3];
        assert_eq!(dom.children(i).len(), 1);
    }

    #[test]
    fn test_delete_consumes_text_across_nodes() {
        let mut dom = Dom::new();
        let root = dom.create_element("div");
        for data in ["ab", "cd", "ef"] {
            let t = dom.create_text(data);
            dom.append_child(root, t).unwrap();
        }
        let change = Change::Delete {
            path: path(&[(0, "div"), (1, "#text")]),
            content: vec![Content::text("bcd")],
        };
        let removed = apply_change_set(&mut dom, root, &set(vec![change]), None, &mut []).unwrap();
        assert_eq!(inner_markup(&dom, root), "aef");
        assert_eq!(removed.len(), 2);
        assert!(removed.iter().all(|&n| dom.parent(n).is_none()));
    }

    #[test]
    fn test_joined_text_is_reported_removed() {
        let (mut dom, root) = setup("<p>ac</p>");
        let p = dom.children(root)[0];
        let ac = dom.children(p)[0];
        let change = Change::Insert {
            path: path(&[(0, "div"), (0, "p"), (1, "#text")]),
            content: vec![Content::text("b")],
        };
        let removed = apply_change_set(&mut dom, root, &set(vec![change]), None, &mut []).unwrap();
        assert_eq!(inner_markup(&dom, root), "<p>abc</p>");
        let kept = dom.children(p)[0];
        assert_eq!(kept, ac);
        assert_eq!(removed.len(), 2);
        assert!(!removed.contains(&kept));
        for node in removed {
            assert_eq!(dom.release(node).unwrap(), 1);
        }
        assert_eq!(dom.len(), 3);
    }

    #[test]
    fn test_delete_mismatch_is_reported() {
        let (mut dom, root) = setup("<p></p>");
        let change = Change::Delete {
            path: path(&[(0, "div")]),
            content: vec![Content::element("b")],
        };
        let err = apply_change_set(&mut dom, root, &set(vec![change]), None, &mut []).unwrap_err();
        assert_eq!(
            err,
            ApplyError::ContentMismatch {
                expected: "b".into(),
                found: Some("p".into())
            }
        );
    }

    #[test]
    fn test_update_attr_sets_and_removes() {
        let (mut dom, root) = setup(r#"<p class="a" id="x"></p>"#);
        let change = Change::UpdateAttr {
            path: path(&[(0, "div")]),
            attrs: vec![
                AttrChange {
                    name: "class".into(),
                    old: Some("a".into()),
                    new: Some("b".into()),
                },
                AttrChange {
                    name: "id".into(),
                    old: Some("x".into()),
                    new: None,
                },
            ],
        };
        apply_change_set(&mut dom, root, &set(vec![change]), None, &mut []).unwrap();
        assert_eq!(inner_markup(&dom, root), r#"<p class="b"></p>"#);
    }

    #[test]
    fn test_ranges_survive_and_selection_is_applied() {
        let (mut dom, root) = setup("<p>hello</p>");
        let p = dom.children(root)[0];
        let hello = dom.children(p)[0];
        let mut other = [Range::collapsed(Boundary::new(hello, 4))];
        let mut selection = Range::collapsed(Boundary::new(root, 0));
        let mut changes = set(vec![Change::Insert {
            path: path(&[(0, "div"), (0, "p"), (2, "#text")]),
            content: vec![Content::text("XY")],
        }]);
        let end = path(&[(0, "div"), (0, "p"), (4, "#text")]);
        changes.selection = RangeUpdate::new(
            None,
            Some(crate::path::RangePath {
                start: end.clone(),
                end,
            }),
        );
        apply_change_set(&mut dom, root, &changes, Some(&mut selection), &mut other).unwrap();
        assert_eq!(inner_markup(&dom, root), "<p>heXYllo</p>");
        let merged = dom.children(p)[0];
        assert_eq!(dom.children(p).len(), 1);
        assert_eq!(other[0].start, Boundary::new(merged, 6));
        assert_eq!(selection.start, Boundary::new(merged, 4));
    }
}
