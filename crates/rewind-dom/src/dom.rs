#![forbid(unsafe_code)]

//! Arena-backed ordered tree.
//!
//! Every node lives in one [`Dom`] slab and is addressed by a stable
//! [`NodeId`]. Ownership flows strictly from a parent to its `children`
//! vector; the `parent` field is a non-owning index used for upward walks.
//!
//! ```text
//!            ┌──────────── Dom.nodes ────────────┐
//!  NodeId(1) │ DIV   parent: None     [2, 4]     │
//!  NodeId(2) │ P     parent: Some(1)  [3]        │
//!  NodeId(3) │ #text parent: Some(2)  "hello"    │
//!  NodeId(4) │ P     parent: Some(1)  []         │
//!            └───────────────────────────────────┘
//! ```
//!
//! # Invariants
//!
//! 1. A node appears in at most one `children` list, and that list belongs
//!    to the node named by its `parent` field.
//! 2. Text nodes never have children.
//! 3. No node is its own ancestor.
//! 4. A freed slot is unreachable: no live node and no observer refers to
//!    it, and every id minted for its previous occupant is stale.
//!
//! # Node lifecycle
//!
//! ```text
//! create ──► detached ◄──► attached
//!               │ release (unobserved)
//!               ▼
//!            free slot ──► reused by the next create, generation + 1
//! ```
//!
//! A removed node stays allocated and addressable, so a change observer can
//! inspect it after the fact and a host can insert it again. Only
//! [`Dom::release`] frees nodes. A [`NodeId`] carries the generation of its
//! slot, so an id that outlived its node never aliases the slot's next
//! occupant.
//!
//! # Panics
//!
//! Query methods panic when handed a stale [`NodeId`] or one minted by a
//! different `Dom`. Mutation methods validate their arguments and report
//! [`DomError`] instead.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use crate::content::Content;
use crate::mutation::{MutationRecord, ObserverSlot};

/// Name used for text nodes wherever a node name is expected.
pub const TEXT_NODE_NAME: &str = "#text";

const SLOT_MASK: u64 = u32::MAX as u64;

/// Identifier for a node in a [`Dom`].
///
/// The low 32 bits hold the slot index plus one, the high 32 bits the
/// generation of the slot when the node was created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(u64);

impl NodeId {
    /// Lowest valid node ID.
    pub const MIN: Self = Self(1);

    /// Create a node ID from a raw value, rejecting an empty slot part.
    pub fn new(raw: u64) -> Result<Self, DomError> {
        if raw & SLOT_MASK == 0 {
            return Err(DomError::ZeroNodeId);
        }
        Ok(Self(raw))
    }

    /// Get the raw numeric value.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }

    const fn from_parts(slot: usize, generation: u32) -> Self {
        Self(((generation as u64) << 32) | (slot as u64 + 1))
    }

    const fn slot(self) -> usize {
        ((self.0 & SLOT_MASK) - 1) as usize
    }

    const fn generation(self) -> u32 {
        (self.0 >> 32) as u32
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.generation() {
            0 => write!(f, "#{}", self.0 & SLOT_MASK),
            generation => write!(f, "#{}@{generation}", self.0 & SLOT_MASK),
        }
    }
}

/// Attribute key: an optional namespace plus a local name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AttrName {
    pub namespace: Option<String>,
    pub local: String,
}

impl AttrName {
    /// Attribute without a namespace.
    #[must_use]
    pub fn new(local: impl Into<String>) -> Self {
        Self {
            namespace: None,
            local: local.into(),
        }
    }

    /// Namespaced attribute.
    #[must_use]
    pub fn namespaced(namespace: impl Into<String>, local: impl Into<String>) -> Self {
        Self {
            namespace: Some(namespace.into()),
            local: local.into(),
        }
    }
}

impl fmt::Display for AttrName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{{{ns}}}{}", self.local),
            None => f.write_str(&self.local),
        }
    }
}

impl From<&str> for AttrName {
    fn from(local: &str) -> Self {
        Self::new(local)
    }
}

/// Payload of a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    Element {
        name: String,
        attrs: BTreeMap<AttrName, String>,
    },
    Text {
        data: String,
    },
}

#[derive(Debug, Clone)]
pub(crate) struct NodeData {
    pub(crate) kind: NodeKind,
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: Vec<NodeId>,
    generation: u32,
    live: bool,
}

/// Errors reported by tree mutations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DomError {
    ZeroNodeId,
    UnknownNode { node: NodeId },
    NotAnElement { node: NodeId },
    NotText { node: NodeId },
    NotAChild { parent: NodeId, child: NodeId },
    NoParent { node: NodeId },
    HierarchyRequest { parent: NodeId, child: NodeId },
    OffsetOutOfRange { node: NodeId, offset: usize, length: usize },
    StillAttached { node: NodeId },
    StillObserved { node: NodeId },
}

impl fmt::Display for DomError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ZeroNodeId => write!(f, "node id must be non-zero"),
            Self::UnknownNode { node } => write!(f, "node {node} does not belong to this tree"),
            Self::NotAnElement { node } => write!(f, "node {node} is not an element"),
            Self::NotText { node } => write!(f, "node {node} is not a text node"),
            Self::NotAChild { parent, child } => {
                write!(f, "node {child} is not a child of {parent}")
            }
            Self::NoParent { node } => write!(f, "node {node} has no parent"),
            Self::HierarchyRequest { parent, child } => {
                write!(f, "inserting {child} into {parent} would create a cycle")
            }
            Self::OffsetOutOfRange {
                node,
                offset,
                length,
            } => write!(f, "offset {offset} out of range for {node} (length {length})"),
            Self::StillAttached { node } => write!(f, "node {node} is still attached"),
            Self::StillObserved { node } => {
                write!(f, "node {node} is still watched by an observer")
            }
        }
    }
}

impl std::error::Error for DomError {}

/// An ordered tree of elements and text nodes.
#[derive(Debug, Default)]
pub struct Dom {
    pub(crate) nodes: Vec<NodeData>,
    pub(crate) observers: Vec<Option<ObserverSlot>>,
    /// Slots freed by [`Dom::release`], reused last-in first-out.
    free: Vec<usize>,
}

// ============================================================================
// Construction and queries
// ============================================================================

impl Dom {
    /// Create an empty tree.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a detached element.
    pub fn create_element(&mut self, name: impl Into<String>) -> NodeId {
        self.alloc(NodeKind::Element {
            name: name.into(),
            attrs: BTreeMap::new(),
        })
    }

    /// Create a detached text node.
    pub fn create_text(&mut self, data: impl Into<String>) -> NodeId {
        self.alloc(NodeKind::Text { data: data.into() })
    }

    fn alloc(&mut self, kind: NodeKind) -> NodeId {
        if let Some(slot) = self.free.pop() {
            let data = &mut self.nodes[slot];
            data.kind = kind;
            data.live = true;
            return NodeId::from_parts(slot, data.generation);
        }
        self.nodes.push(NodeData {
            kind,
            parent: None,
            children: Vec::new(),
            generation: 0,
            live: true,
        });
        NodeId::from_parts(self.nodes.len() - 1, 0)
    }

    /// Number of live nodes, attached or not.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len() - self.free.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether `node` is a live node of this tree.
    #[must_use]
    pub fn has_node(&self, node: NodeId) -> bool {
        self.nodes
            .get(node.slot())
            .is_some_and(|data| data.live && data.generation == node.generation())
    }

    pub(crate) fn data(&self, node: NodeId) -> &NodeData {
        let data = &self.nodes[node.slot()];
        assert!(
            data.live && data.generation == node.generation(),
            "stale node id {node}"
        );
        data
    }

    fn data_mut(&mut self, node: NodeId) -> &mut NodeData {
        let data = &mut self.nodes[node.slot()];
        assert!(
            data.live && data.generation == node.generation(),
            "stale node id {node}"
        );
        data
    }

    fn check(&self, node: NodeId) -> Result<(), DomError> {
        if self.has_node(node) {
            Ok(())
        } else {
            Err(DomError::UnknownNode { node })
        }
    }

    #[must_use]
    pub fn kind(&self, node: NodeId) -> &NodeKind {
        &self.data(node).kind
    }

    #[must_use]
    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.data(node).parent
    }

    #[must_use]
    pub fn children(&self, node: NodeId) -> &[NodeId] {
        &self.data(node).children
    }

    #[must_use]
    pub fn first_child(&self, node: NodeId) -> Option<NodeId> {
        self.children(node).first().copied()
    }

    #[must_use]
    pub fn last_child(&self, node: NodeId) -> Option<NodeId> {
        self.children(node).last().copied()
    }

    /// Position of `node` in its parent's children, or 0 when detached.
    #[must_use]
    pub fn node_index(&self, node: NodeId) -> usize {
        self.parent(node)
            .and_then(|parent| self.children(parent).iter().position(|&c| c == node))
            .unwrap_or(0)
    }

    #[must_use]
    pub fn next_sibling(&self, node: NodeId) -> Option<NodeId> {
        let parent = self.parent(node)?;
        self.children(parent).get(self.node_index(node) + 1).copied()
    }

    #[must_use]
    pub fn prev_sibling(&self, node: NodeId) -> Option<NodeId> {
        let parent = self.parent(node)?;
        let index = self.node_index(node);
        if index == 0 {
            None
        } else {
            self.children(parent).get(index - 1).copied()
        }
    }

    /// Element name, or `#text` for text nodes.
    #[must_use]
    pub fn node_name(&self, node: NodeId) -> &str {
        match self.kind(node) {
            NodeKind::Element { name, .. } => name,
            NodeKind::Text { .. } => TEXT_NODE_NAME,
        }
    }

    #[must_use]
    pub fn is_text(&self, node: NodeId) -> bool {
        matches!(self.kind(node), NodeKind::Text { .. })
    }

    #[must_use]
    pub fn is_element(&self, node: NodeId) -> bool {
        !self.is_text(node)
    }

    #[must_use]
    pub fn is_empty_text(&self, node: NodeId) -> bool {
        matches!(self.kind(node), NodeKind::Text { data } if data.is_empty())
    }

    /// Character data of a text node.
    #[must_use]
    pub fn text(&self, node: NodeId) -> Option<&str> {
        match self.kind(node) {
            NodeKind::Text { data } => Some(data),
            NodeKind::Element { .. } => None,
        }
    }

    /// Characters in a text node, or children of an element.
    #[must_use]
    pub fn node_length(&self, node: NodeId) -> usize {
        match self.kind(node) {
            NodeKind::Text { data } => data.chars().count(),
            NodeKind::Element { .. } => self.children(node).len(),
        }
    }

    #[must_use]
    pub fn attr(&self, node: NodeId, name: &AttrName) -> Option<&str> {
        match self.kind(node) {
            NodeKind::Element { attrs, .. } => attrs.get(name).map(String::as_str),
            NodeKind::Text { .. } => None,
        }
    }

    /// Attributes of an element in key order; empty for text nodes.
    pub fn attrs(&self, node: NodeId) -> impl Iterator<Item = (&AttrName, &str)> {
        let attrs = match self.kind(node) {
            NodeKind::Element { attrs, .. } => Some(attrs),
            NodeKind::Text { .. } => None,
        };
        attrs
            .into_iter()
            .flat_map(|map| map.iter().map(|(k, v)| (k, v.as_str())))
    }

    /// Whether `ancestor` is a proper ancestor of `node`.
    #[must_use]
    pub fn contains(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut current = self.parent(node);
        while let Some(p) = current {
            if p == ancestor {
                return true;
            }
            current = self.parent(p);
        }
        false
    }

    /// Topmost ancestor of `node` (the node itself when detached).
    #[must_use]
    pub fn root_of(&self, node: NodeId) -> NodeId {
        let mut current = node;
        while let Some(p) = self.parent(current) {
            current = p;
        }
        current
    }

    /// Inclusive ancestor chain, root first.
    #[must_use]
    pub fn ancestors_root_first(&self, node: NodeId) -> Vec<NodeId> {
        let mut chain = vec![node];
        let mut current = node;
        while let Some(p) = self.parent(current) {
            chain.push(p);
            current = p;
        }
        chain.reverse();
        chain
    }

    /// Compare two nodes in pre-order document order.
    ///
    /// An ancestor orders before its descendants. Returns `None` when the
    /// nodes are in different trees.
    #[must_use]
    pub fn compare_tree_order(&self, a: NodeId, b: NodeId) -> Option<Ordering> {
        if a == b {
            return Some(Ordering::Equal);
        }
        let chain_a = self.ancestors_root_first(a);
        let chain_b = self.ancestors_root_first(b);
        if chain_a[0] != chain_b[0] {
            return None;
        }
        let shared = chain_a
            .iter()
            .zip(&chain_b)
            .take_while(|(x, y)| x == y)
            .count();
        if shared == chain_a.len() {
            return Some(Ordering::Less);
        }
        if shared == chain_b.len() {
            return Some(Ordering::Greater);
        }
        let ia = self.node_index(chain_a[shared]);
        let ib = self.node_index(chain_b[shared]);
        Some(ia.cmp(&ib))
    }
}

// ============================================================================
// Mutation
// ============================================================================

impl Dom {
    /// Insert `node` into `parent` before `reference`, or append when
    /// `reference` is `None`.
    ///
    /// A node that already has a parent is detached first, which queues a
    /// removal record followed by the insertion record.
    pub fn insert_before(
        &mut self,
        parent: NodeId,
        node: NodeId,
        reference: Option<NodeId>,
    ) -> Result<(), DomError> {
        self.check(parent)?;
        self.check(node)?;
        if self.is_text(parent) {
            return Err(DomError::NotAnElement { node: parent });
        }
        if node == parent || self.contains(node, parent) {
            return Err(DomError::HierarchyRequest {
                parent,
                child: node,
            });
        }
        let mut reference = reference;
        if reference == Some(node) {
            reference = self.next_sibling(node);
        }
        if let Some(r) = reference {
            self.check(r)?;
            if self.parent(r) != Some(parent) {
                return Err(DomError::NotAChild { parent, child: r });
            }
        }
        if let Some(old_parent) = self.parent(node) {
            self.remove_child(old_parent, node)?;
        }
        let index = match reference {
            Some(r) => self.node_index(r),
            None => self.children(parent).len(),
        };
        self.data_mut(parent).children.insert(index, node);
        self.data_mut(node).parent = Some(parent);
        let previous_sibling = index
            .checked_sub(1)
            .map(|i| self.children(parent)[i]);
        let next_sibling = self.children(parent).get(index + 1).copied();
        self.notify(MutationRecord::ChildList {
            target: parent,
            added: vec![node],
            removed: Vec::new(),
            previous_sibling,
            next_sibling,
        });
        Ok(())
    }

    pub fn append_child(&mut self, parent: NodeId, node: NodeId) -> Result<(), DomError> {
        self.insert_before(parent, node, None)
    }

    /// Detach `node` from `parent`.
    pub fn remove_child(&mut self, parent: NodeId, node: NodeId) -> Result<(), DomError> {
        self.check(parent)?;
        self.check(node)?;
        if self.parent(node) != Some(parent) {
            return Err(DomError::NotAChild {
                parent,
                child: node,
            });
        }
        let previous_sibling = self.prev_sibling(node);
        let next_sibling = self.next_sibling(node);
        let index = self.node_index(node);
        self.data_mut(parent).children.remove(index);
        self.data_mut(node).parent = None;
        self.notify(MutationRecord::ChildList {
            target: parent,
            added: Vec::new(),
            removed: vec![node],
            previous_sibling,
            next_sibling,
        });
        self.keep_observing_removed(parent, node);
        Ok(())
    }

    /// Detach `node` from whatever parent it has.
    pub fn remove(&mut self, node: NodeId) -> Result<(), DomError> {
        self.check(node)?;
        match self.parent(node) {
            Some(parent) => self.remove_child(parent, node),
            None => Ok(()),
        }
    }

    /// Free the detached subtree rooted at `node` and return how many nodes
    /// it held.
    ///
    /// Every id in the subtree becomes stale. A node that still has a parent
    /// or that an observer is watching, directly or transiently, is refused.
    pub fn release(&mut self, node: NodeId) -> Result<usize, DomError> {
        self.check(node)?;
        if self.parent(node).is_some() {
            return Err(DomError::StillAttached { node });
        }
        if self.is_observed(node) {
            return Err(DomError::StillObserved { node });
        }
        let mut pending = vec![node];
        let mut freed = 0;
        while let Some(current) = pending.pop() {
            let slot = current.slot();
            let data = &mut self.nodes[slot];
            pending.append(&mut data.children);
            data.parent = None;
            data.kind = NodeKind::Text {
                data: String::new(),
            };
            data.live = false;
            data.generation = data.generation.wrapping_add(1);
            self.free.push(slot);
            freed += 1;
        }
        tracing::trace!(target: "rewind.dom", node = %node, freed, "release subtree");
        Ok(freed)
    }

    /// Set an attribute, queuing a record with the previous value.
    pub fn set_attr(
        &mut self,
        node: NodeId,
        name: impl Into<AttrName>,
        value: impl Into<String>,
    ) -> Result<(), DomError> {
        self.check(node)?;
        let name = name.into();
        let NodeKind::Element { attrs, .. } = &mut self.data_mut(node).kind else {
            return Err(DomError::NotAnElement { node });
        };
        let old_value = attrs.insert(name.clone(), value.into());
        self.notify(MutationRecord::Attributes {
            target: node,
            name,
            old_value,
        });
        Ok(())
    }

    /// Remove an attribute. Removing an absent attribute is a no-op.
    pub fn remove_attr(&mut self, node: NodeId, name: &AttrName) -> Result<(), DomError> {
        self.check(node)?;
        let NodeKind::Element { attrs, .. } = &mut self.data_mut(node).kind else {
            return Err(DomError::NotAnElement { node });
        };
        if let Some(old) = attrs.remove(name) {
            self.notify(MutationRecord::Attributes {
                target: node,
                name: name.clone(),
                old_value: Some(old),
            });
        }
        Ok(())
    }

    /// Replace all character data of a text node.
    pub fn set_text(&mut self, node: NodeId, data: impl Into<String>) -> Result<(), DomError> {
        let length = self.text_length_checked(node)?;
        self.replace_data(node, 0, length, &data.into())
    }

    /// Insert characters at a character offset.
    pub fn insert_data(&mut self, node: NodeId, offset: usize, data: &str) -> Result<(), DomError> {
        self.replace_data(node, offset, 0, data)
    }

    /// Delete `count` characters starting at `offset`.
    pub fn delete_data(&mut self, node: NodeId, offset: usize, count: usize) -> Result<(), DomError> {
        self.replace_data(node, offset, count, "")
    }

    /// Replace `count` characters at `offset` with `data`.
    ///
    /// `count` is clamped to the end of the text, as in DOM `replaceData`.
    pub fn replace_data(
        &mut self,
        node: NodeId,
        offset: usize,
        count: usize,
        data: &str,
    ) -> Result<(), DomError> {
        let length = self.text_length_checked(node)?;
        if offset > length {
            return Err(DomError::OffsetOutOfRange {
                node,
                offset,
                length,
            });
        }
        let end = offset.saturating_add(count).min(length);
        let NodeKind::Text { data: current } = &mut self.data_mut(node).kind else {
            return Err(DomError::NotText { node });
        };
        let start_byte = byte_offset(current, offset);
        let end_byte = byte_offset(current, end);
        let old_value = current.clone();
        current.replace_range(start_byte..end_byte, data);
        self.notify(MutationRecord::CharacterData {
            target: node,
            old_value,
        });
        Ok(())
    }

    fn text_length_checked(&self, node: NodeId) -> Result<usize, DomError> {
        self.check(node)?;
        match self.kind(node) {
            NodeKind::Text { data } => Ok(data.chars().count()),
            NodeKind::Element { .. } => Err(DomError::NotText { node }),
        }
    }
}

/// Byte index of the `chars`-th character, clamped to the end of `s`.
pub(crate) fn byte_offset(s: &str, chars: usize) -> usize {
    s.char_indices().nth(chars).map_or(s.len(), |(i, _)| i)
}

// ============================================================================
// Snapshots
// ============================================================================

impl Dom {
    /// Detached value copy of `node` and its subtree.
    #[must_use]
    pub fn snapshot(&self, node: NodeId) -> Content {
        match self.kind(node) {
            NodeKind::Text { data } => Content::Text(data.clone()),
            NodeKind::Element { name, attrs } => Content::Element {
                name: name.clone(),
                attrs: attrs.clone(),
                children: self.snapshot_children(node),
            },
        }
    }

    /// Value copies of every child of `node`.
    #[must_use]
    pub fn snapshot_children(&self, node: NodeId) -> Vec<Content> {
        self.children(node)
            .iter()
            .map(|&child| self.snapshot(child))
            .collect()
    }

    /// Build a detached subtree from a value copy.
    ///
    /// Construction happens bottom-up on detached nodes, so observers of
    /// other subtrees see nothing.
    pub fn instantiate(&mut self, content: &Content) -> NodeId {
        match content {
            Content::Text(data) => self.create_text(data.clone()),
            Content::Element {
                name,
                attrs,
                children,
            } => {
                let node = self.alloc(NodeKind::Element {
                    name: name.clone(),
                    attrs: attrs.clone(),
                });
                let kids: Vec<NodeId> = children.iter().map(|c| self.instantiate(c)).collect();
                for &kid in &kids {
                    self.data_mut(kid).parent = Some(node);
                }
                self.data_mut(node).children = kids;
                node
            }
        }
    }

    /// Detached deep copy of `node`.
    pub fn deep_clone(&mut self, node: NodeId) -> NodeId {
        let content = self.snapshot(node);
        self.instantiate(&content)
    }
}
