#![forbid(unsafe_code)]

//! Path addressing.
//!
//! A [`Path`] locates a [`Boundary`] relative to a fixed container as a list
//! of `(offset, name)` steps. Each step indexes into the node named by the
//! step, using *normalized* child indices, so a path survives hosts that
//! split or merge adjacent text nodes.
//!
//! ```text
//! <div>                      path from div to the boundary `|`:
//!   <p>one</p>
//!   <p>t|wo</p>              [(1, "div"), (0, "p"), (1, "#text")]
//! </div>
//! ```
//!
//! # Invariants
//!
//! 1. Only the last step may be a text step (`name == "#text"`).
//! 2. A text step never has offset 0. The position before a text run is
//!    written as an element-level step instead.
//! 3. Offsets of text steps count characters from the start of the merged
//!    run, not from the start of any single text node.
//! 4. A path is only meaningful relative to the container it was computed
//!    from.
//!
//! # Failure Modes
//!
//! [`boundary_from_path`] reports [`PathError`] when a step's name does not
//! match the node it indexes into, or an offset overruns the live tree.
//! During replay of recorded changes either case means the tree diverged
//! from the recorded history.

use std::fmt;

use rewind_dom::boundary::{self, Boundary, Range};
use rewind_dom::normalize;
use rewind_dom::{Dom, NodeId, TEXT_NODE_NAME};

/// One step of a [`Path`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PathStep {
    pub offset: usize,
    pub name: String,
}

impl PathStep {
    #[must_use]
    pub fn new(offset: usize, name: impl Into<String>) -> Self {
        Self {
            offset,
            name: name.into(),
        }
    }

    /// Character offset into a text run.
    #[must_use]
    pub fn text(offset: usize) -> Self {
        Self::new(offset, TEXT_NODE_NAME)
    }

    #[must_use]
    pub fn is_text(&self) -> bool {
        self.name == TEXT_NODE_NAME
    }
}

impl fmt::Display for PathStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.offset)
    }
}

/// Ordered steps from a container down to a boundary.
pub type Path = Vec<PathStep>;

/// A range expressed as a pair of paths.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RangePath {
    pub start: Path,
    pub end: Path,
}

/// Why a path could not be computed or resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathError {
    Empty,
    NotInContainer { node: NodeId },
    NameMismatch {
        depth: usize,
        expected: String,
        found: String,
    },
    OffsetOutOfRange { depth: usize, offset: usize },
    ZeroTextOffset,
}

impl fmt::Display for PathError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "empty path"),
            Self::NotInContainer { node } => write!(f, "node {node} is not inside the container"),
            Self::NameMismatch {
                depth,
                expected,
                found,
            } => write!(f, "step {depth} expects <{expected}> but found <{found}>"),
            Self::OffsetOutOfRange { depth, offset } => {
                write!(f, "step {depth} offset {offset} is out of range")
            }
            Self::ZeroTextOffset => write!(f, "text step with offset 0"),
        }
    }
}

impl std::error::Error for PathError {}

/// Render a path as `div@1/p@0/#text@1`.
#[must_use]
pub fn display_path(path: &[PathStep]) -> String {
    path.iter()
        .map(PathStep::to_string)
        .collect::<Vec<_>>()
        .join("/")
}

// ============================================================================
// Boundary -> Path
// ============================================================================

/// Steps from `container` down to `node`.
pub fn node_path(dom: &Dom, container: NodeId, node: NodeId) -> Result<Path, PathError> {
    let mut steps = Vec::new();
    let mut current = node;
    while current != container {
        let parent = dom
            .parent(current)
            .ok_or(PathError::NotInContainer { node })?;
        steps.push(PathStep::new(
            normalize::normalized_node_index(dom, current),
            dom.node_name(parent),
        ));
        current = parent;
    }
    steps.reverse();
    Ok(steps)
}

fn element_path(
    dom: &Dom,
    container: NodeId,
    elem: NodeId,
    offset: usize,
) -> Result<Path, PathError> {
    let mut path = node_path(dom, container, elem)?;
    path.push(PathStep::new(
        normalize::normalized_from_real_index(dom, elem, offset),
        dom.node_name(elem),
    ));
    Ok(path)
}

/// Path from `container` to `boundary`.
pub fn path_from_boundary(
    dom: &Dom,
    container: NodeId,
    boundary: Boundary,
) -> Result<Path, PathError> {
    let b = boundary::normalize_boundary(dom, boundary);
    let text_offset = boundary::preceding_text_length(dom, b);
    let run_node = if dom.is_text(b.container) {
        Some(b.container)
    } else {
        boundary::node_before(dom, b)
    };
    if let Some(mut node) = run_node.filter(|_| text_offset > 0) {
        // An empty text node after real text would index the next unit.
        while dom.is_empty_text(node) {
            match dom.prev_sibling(node) {
                Some(prev) if dom.is_text(prev) => node = prev,
                _ => break,
            }
        }
        let mut path = node_path(dom, container, node)?;
        path.push(PathStep::text(text_offset));
        return Ok(path);
    }
    element_path(dom, container, b.container, b.offset)
}

/// Like [`path_from_boundary`] but never ends in a text step.
///
/// The last step is the normalized index of the boundary position within
/// its element, counting a text run before the boundary as a whole unit.
/// Used as the prefix of paths that continue below the position.
pub fn incomplete_path_from_boundary(
    dom: &Dom,
    container: NodeId,
    boundary: Boundary,
) -> Result<Path, PathError> {
    let b = boundary::normalize_boundary(dom, boundary);
    if dom.is_text(b.container) {
        let parent = dom
            .parent(b.container)
            .ok_or(PathError::NotInContainer { node: b.container })?;
        let mut path = node_path(dom, container, parent)?;
        path.push(PathStep::new(
            normalize::normalized_node_index(dom, b.container),
            dom.node_name(parent),
        ));
        return Ok(path);
    }
    element_path(dom, container, b.container, b.offset)
}

/// Path to the position right before `node`.
pub fn path_before_node(dom: &Dom, container: NodeId, node: NodeId) -> Result<Path, PathError> {
    path_from_boundary(dom, container, Boundary::before(dom, node))
}

/// Path to the position right after `node`.
pub fn path_after_node(dom: &Dom, container: NodeId, node: NodeId) -> Result<Path, PathError> {
    path_from_boundary(dom, container, Boundary::after(dom, node))
}

/// Both ends of `range` as paths.
pub fn range_path(dom: &Dom, container: NodeId, range: &Range) -> Result<RangePath, PathError> {
    Ok(RangePath {
        start: path_from_boundary(dom, container, range.start)?,
        end: path_from_boundary(dom, container, range.end)?,
    })
}

// ============================================================================
// Path -> Boundary
// ============================================================================

fn expect_name(dom: &Dom, node: NodeId, step: &PathStep, depth: usize) -> Result<(), PathError> {
    let found = dom.node_name(node);
    if found == step.name {
        Ok(())
    } else {
        Err(PathError::NameMismatch {
            depth,
            expected: step.name.clone(),
            found: found.to_owned(),
        })
    }
}

/// Resolve a path against the live tree.
///
/// The result is normalized: a position at either end of a text node is
/// reported as an element-level boundary.
pub fn boundary_from_path(
    dom: &Dom,
    container: NodeId,
    path: &[PathStep],
) -> Result<Boundary, PathError> {
    let Some((last, steps)) = path.split_last() else {
        return Err(PathError::Empty);
    };
    let mut node = container;
    for (depth, step) in steps.iter().enumerate() {
        expect_name(dom, node, step, depth)?;
        node = normalize::normalized_nth_child(dom, node, step.offset).ok_or(
            PathError::OffsetOutOfRange {
                depth,
                offset: step.offset,
            },
        )?;
    }
    let depth = steps.len();
    if last.is_text() {
        if last.offset == 0 {
            return Err(PathError::ZeroTextOffset);
        }
        expect_name(dom, node, last, depth)?;
        let mut remaining = last.offset;
        loop {
            let length = dom.node_length(node);
            if remaining <= length {
                break;
            }
            remaining -= length;
            node = dom
                .next_sibling(node)
                .filter(|&n| dom.is_text(n))
                .ok_or(PathError::OffsetOutOfRange {
                    depth,
                    offset: last.offset,
                })?;
        }
        return Ok(boundary::normalize_boundary(
            dom,
            Boundary::new(node, remaining),
        ));
    }
    expect_name(dom, node, last, depth)?;
    let real = normalize::real_from_normalized_index(dom, node, last.offset).ok_or(
        PathError::OffsetOutOfRange {
            depth,
            offset: last.offset,
        },
    )?;
    Ok(Boundary::new(node, real))
}

/// Resolve both ends of a [`RangePath`].
pub fn range_from_path(dom: &Dom, container: NodeId, path: &RangePath) -> Result<Range, PathError> {
    Ok(Range::new(
        boundary_from_path(dom, container, &path.start)?,
        boundary_from_path(dom, container, &path.end)?,
    ))
}
