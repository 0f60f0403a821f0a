#![forbid(unsafe_code)]

//! Record tree builder.
//!
//! Turns a batch of raw [`MutationRecord`]s into the minimal set of net
//! edits, nested and ordered so that the change generator can compute
//! every path against the current tree.
//!
//! ```text
//! raw records ──► moves + stale values
//!                   │ collapse per node (insert/delete pairs)
//!                   │ group deletes by anchor (compound deletes)
//!                   │ fold stale values into deletes
//!                   ▼
//!              owners ──► nest (nearest deleted or moved ancestor)
//!                     ──► drop (under inserted nodes, outside container)
//!                     ──► sort (document order, deletes first)
//! ```
//!
//! # Invariants
//!
//! 1. A node appears in at most one insert and one delete record.
//! 2. Deletes anchored after the same sibling form one compound delete, in
//!    the order the nodes were adjacent before the edit.
//! 3. A record belongs to the nearest node above it that was deleted or
//!    moved, and is nested in that node's delete member. Records whose
//!    nearest such node was only inserted are dropped, since the insert
//!    snapshots the node whole.
//! 4. Each level is sorted by document position, deletes before other
//!    records at the same position, then by capture sequence. The key is
//!    explicit, so the order is total even across detached trees.

use rustc_hash::{FxHashMap, FxHashSet};

use rewind_dom::boundary::Boundary;
use rewind_dom::{AttrName, Dom, MutationRecord, NodeId};

/// Pre-edit value of each attribute, keyed by name. First seen wins.
pub(crate) type StaleAttrs = Vec<(AttrName, Option<String>)>;

/// One node removed from the tree.
#[derive(Debug, Clone)]
pub(crate) struct DeleteRecord {
    pub node: NodeId,
    pub target: NodeId,
    pub prev_sibling: Option<NodeId>,
    pub seq: usize,
    pub old_attrs: StaleAttrs,
    pub old_text: Option<String>,
    pub contained: Vec<Record>,
}

/// Adjacent deleted siblings that share one anchor.
#[derive(Debug, Clone)]
pub(crate) struct CompoundDelete {
    pub target: NodeId,
    pub prev_sibling: Option<NodeId>,
    pub members: Vec<DeleteRecord>,
}

impl CompoundDelete {
    fn seq(&self) -> usize {
        self.members.iter().map(|m| m.seq).min().unwrap_or(usize::MAX)
    }

    /// Where the members were, in terms of the current tree.
    pub(crate) fn boundary(&self, dom: &Dom) -> Boundary {
        match self.prev_sibling {
            Some(prev) => Boundary::after(dom, prev),
            None => Boundary::new(self.target, 0),
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) enum Record {
    Insert {
        node: NodeId,
        seq: usize,
    },
    UpdateAttr {
        node: NodeId,
        attrs: StaleAttrs,
        seq: usize,
    },
    UpdateText {
        node: NodeId,
        old: String,
        seq: usize,
    },
    Delete(CompoundDelete),
}

impl Record {
    fn seq(&self) -> usize {
        match self {
            Self::Insert { seq, .. } | Self::UpdateAttr { seq, .. } | Self::UpdateText { seq, .. } => {
                *seq
            }
            Self::Delete(compound) => compound.seq(),
        }
    }

    fn is_delete(&self) -> bool {
        matches!(self, Self::Delete(_))
    }

    fn position(&self, dom: &Dom) -> Boundary {
        match self {
            Self::Insert { node, .. }
            | Self::UpdateAttr { node, .. }
            | Self::UpdateText { node, .. } => Boundary::before(dom, *node),
            Self::Delete(compound) => compound.boundary(dom),
        }
    }
}

// ============================================================================
// Raw records
// ============================================================================

#[derive(Debug)]
enum Move {
    Insert {
        node: NodeId,
        seq: usize,
    },
    Delete {
        node: NodeId,
        target: NodeId,
        prev_sibling: Option<NodeId>,
        seq: usize,
    },
}

/// Oldest value per node, in first-seen order.
#[derive(Debug)]
struct Stale<T> {
    order: Vec<NodeId>,
    values: FxHashMap<NodeId, (usize, T)>,
}

impl<T> Default for Stale<T> {
    fn default() -> Self {
        Self {
            order: Vec::new(),
            values: FxHashMap::default(),
        }
    }
}

impl<T> Stale<T> {
    fn entry(&mut self, node: NodeId, seq: usize, init: impl FnOnce() -> T) -> &mut T {
        let order = &mut self.order;
        &mut self
            .values
            .entry(node)
            .or_insert_with(|| {
                order.push(node);
                (seq, init())
            })
            .1
    }

    fn take(&mut self, node: NodeId) -> Option<T> {
        self.values.remove(&node).map(|(_, v)| v)
    }

    fn drain(mut self) -> impl Iterator<Item = (NodeId, usize, T)> {
        let mut values = std::mem::take(&mut self.values);
        self.order
            .into_iter()
            .filter_map(move |node| values.remove(&node).map(|(seq, v)| (node, seq, v)))
    }
}

#[derive(Debug, Default)]
struct RawRecords {
    moves: Vec<Move>,
    attrs: Stale<StaleAttrs>,
    texts: Stale<String>,
}

fn split_records(records: Vec<MutationRecord>) -> RawRecords {
    let mut raw = RawRecords::default();
    let mut seq = 0;
    let mut next = || {
        seq += 1;
        seq
    };
    for record in records {
        match record {
            MutationRecord::ChildList {
                target,
                added,
                removed,
                previous_sibling,
                ..
            } => {
                for node in removed {
                    raw.moves.push(Move::Delete {
                        node,
                        target,
                        prev_sibling: previous_sibling,
                        seq: next(),
                    });
                }
                for node in added {
                    raw.moves.push(Move::Insert { node, seq: next() });
                }
            }
            MutationRecord::Attributes {
                target,
                name,
                old_value,
            } => {
                let attrs = raw.attrs.entry(target, next(), Vec::new);
                if !attrs.iter().any(|(n, _)| *n == name) {
                    attrs.push((name, old_value));
                }
            }
            MutationRecord::CharacterData { target, old_value } => {
                raw.texts.entry(target, next(), || old_value);
            }
        }
    }
    raw
}

// ============================================================================
// Collapsing
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Anchor {
    After(NodeId),
    Start(NodeId),
}

#[derive(Debug, Default)]
struct DeleteGroups {
    after: FxHashMap<NodeId, Vec<DeleteRecord>>,
    start: FxHashMap<NodeId, Vec<DeleteRecord>>,
}

impl DeleteGroups {
    fn take(&mut self, anchor: Anchor) -> Vec<DeleteRecord> {
        match anchor {
            Anchor::After(n) => self.after.remove(&n),
            Anchor::Start(n) => self.start.remove(&n),
        }
        .unwrap_or_default()
    }

    fn put(&mut self, anchor: Anchor, group: Vec<DeleteRecord>) {
        match anchor {
            Anchor::After(n) => self.after.insert(n, group),
            Anchor::Start(n) => self.start.insert(n, group),
        };
    }

    fn into_compounds(self) -> Vec<CompoundDelete> {
        let mut compounds: Vec<CompoundDelete> = self
            .after
            .into_values()
            .chain(self.start.into_values())
            .filter_map(|members| {
                let (target, prev_sibling) = members.first().map(|m| (m.target, m.prev_sibling))?;
                Some(CompoundDelete {
                    target,
                    prev_sibling,
                    members,
                })
            })
            .collect();
        compounds.sort_by_key(CompoundDelete::seq);
        compounds
    }
}

/// Collapse moves per node into net inserts and grouped deletes.
fn collapse_moves(moves: Vec<Move>) -> (Vec<(NodeId, usize)>, Vec<CompoundDelete>) {
    let mut inserted: FxHashMap<NodeId, usize> = FxHashMap::default();
    let mut insert_order = Vec::new();
    let mut groups = DeleteGroups::default();

    for mv in moves {
        match mv {
            Move::Insert { node, seq } => {
                inserted.insert(node, seq);
                insert_order.push(node);
            }
            Move::Delete {
                node,
                target,
                prev_sibling,
                seq,
            } => {
                let anchor = match prev_sibling {
                    Some(prev) => Anchor::After(prev),
                    None => Anchor::Start(target),
                };
                let mut group = groups.take(anchor);
                if inserted.remove(&node).is_none() {
                    group.push(DeleteRecord {
                        node,
                        target,
                        prev_sibling,
                        seq,
                        old_attrs: Vec::new(),
                        old_text: None,
                        contained: Vec::new(),
                    });
                }
                if let Some(mut following) = groups.after.remove(&node) {
                    if group.is_empty()
                        && let Some(first) = following.first_mut()
                    {
                        first.target = target;
                        first.prev_sibling = prev_sibling;
                    }
                    group.extend(following);
                }
                groups.put(anchor, group);
            }
        }
    }

    let inserts = insert_order
        .into_iter()
        .filter_map(|node| inserted.remove(&node).map(|seq| (node, seq)))
        .collect();
    (inserts, groups.into_compounds())
}

// ============================================================================
// Containment
// ============================================================================

/// Where a record belongs in the record tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Owner {
    /// Addressable from the container in the current tree.
    Top,
    /// Inside a deleted or moved node; addressed from where that node was.
    Member { compound: usize, member: usize },
    /// Covered by the snapshot of an inserted node, or outside the container.
    Dropped,
}

/// Lookup of the nodes that claim the records beneath them.
struct Owners {
    container: NodeId,
    members: FxHashMap<NodeId, (usize, usize)>,
    inserted: FxHashSet<NodeId>,
}

impl Owners {
    fn new(container: NodeId, deletes: &[CompoundDelete], inserts: &[(NodeId, usize)]) -> Self {
        let mut members = FxHashMap::default();
        for (compound, delete) in deletes.iter().enumerate() {
            for (member, record) in delete.members.iter().enumerate() {
                members.entry(record.node).or_insert((compound, member));
            }
        }
        Self {
            container,
            members,
            inserted: inserts.iter().map(|&(node, _)| node).collect(),
        }
    }

    /// Walk up from `start` to the nearest node that claims it.
    ///
    /// A node with a delete member wins over an inserted node, so edits
    /// inside a moved node stay with its delete.
    fn resolve(&self, dom: &Dom, start: Option<NodeId>) -> Owner {
        let mut current = start;
        while let Some(node) = current {
            if node == self.container {
                return Owner::Top;
            }
            if let Some(&(compound, member)) = self.members.get(&node) {
                return Owner::Member { compound, member };
            }
            if self.inserted.contains(&node) {
                return Owner::Dropped;
            }
            current = dom.parent(node);
        }
        Owner::Dropped
    }
}

#[derive(Debug)]
enum Item {
    Compound(usize),
    Record(Record),
}

/// Records grouped by owner, before compounds are nested.
#[derive(Debug, Default)]
struct Placement {
    top: Vec<Item>,
    inside: FxHashMap<(usize, usize), Vec<Item>>,
    dropped: usize,
}

impl Placement {
    fn place(&mut self, owner: Owner, item: Item) {
        match owner {
            Owner::Top => self.top.push(item),
            Owner::Member { compound, member } => {
                self.inside.entry((compound, member)).or_default().push(item);
            }
            Owner::Dropped => self.dropped += 1,
        }
    }

    fn into_tree(mut self, deletes: Vec<CompoundDelete>) -> Vec<Record> {
        let mut compounds: Vec<Option<CompoundDelete>> = deletes.into_iter().map(Some).collect();
        let top = std::mem::take(&mut self.top);
        self.realize(top, &mut compounds)
    }

    /// Each compound is taken out once, so every delete lands in exactly
    /// one place.
    fn realize(&mut self, items: Vec<Item>, compounds: &mut [Option<CompoundDelete>]) -> Vec<Record> {
        let mut records = Vec::with_capacity(items.len());
        for item in items {
            match item {
                Item::Record(record) => records.push(record),
                Item::Compound(index) => {
                    let Some(mut compound) = compounds.get_mut(index).and_then(Option::take) else {
                        continue;
                    };
                    for (member, record) in compound.members.iter_mut().enumerate() {
                        let nested = self.inside.remove(&(index, member)).unwrap_or_default();
                        record.contained = self.realize(nested, compounds);
                    }
                    records.push(Record::Delete(compound));
                }
            }
        }
        records
    }
}

// ============================================================================
// Ordering
// ============================================================================

/// Document-order key of a boundary: the root of its tree, then the child
/// indices down to the container, then the offset.
fn position_key(dom: &Dom, at: Boundary) -> (NodeId, Vec<usize>) {
    let mut indices = vec![at.offset];
    let mut node = at.container;
    while let Some(parent) = dom.parent(node) {
        indices.push(dom.node_index(node));
        node = parent;
    }
    indices.reverse();
    (node, indices)
}

fn sort_record_tree(dom: &Dom, tree: &mut [Record]) {
    tree.sort_by_cached_key(|r| (position_key(dom, r.position(dom)), !r.is_delete(), r.seq()));
    for record in tree.iter_mut() {
        if let Record::Delete(compound) = record {
            for member in &mut compound.members {
                sort_record_tree(dom, &mut member.contained);
            }
        }
    }
}

// ============================================================================
// Entry point
// ============================================================================

/// Build the sorted record tree for edits observed under `container`.
pub(crate) fn build_record_tree(
    dom: &Dom,
    container: NodeId,
    records: Vec<MutationRecord>,
) -> Vec<Record> {
    let RawRecords {
        moves,
        mut attrs,
        mut texts,
    } = split_records(records);
    let (inserts, mut deletes) = collapse_moves(moves);

    for compound in &mut deletes {
        for member in &mut compound.members {
            if let Some(old) = attrs.take(member.node) {
                member.old_attrs = old;
            }
            member.old_text = texts.take(member.node);
        }
    }
    for &(node, _) in &inserts {
        attrs.take(node);
        texts.take(node);
    }

    let owners = Owners::new(container, &deletes, &inserts);
    let mut placement = Placement::default();
    for (index, compound) in deletes.iter().enumerate() {
        // The target itself may be a deleted or moved node.
        placement.place(owners.resolve(dom, Some(compound.target)), Item::Compound(index));
    }
    for (node, seq) in inserts {
        let owner = owners.resolve(dom, dom.parent(node));
        placement.place(owner, Item::Record(Record::Insert { node, seq }));
    }
    for (node, seq, attrs) in attrs.drain() {
        let owner = owners.resolve(dom, dom.parent(node));
        placement.place(owner, Item::Record(Record::UpdateAttr { node, attrs, seq }));
    }
    for (node, seq, old) in texts.drain() {
        let owner = owners.resolve(dom, dom.parent(node));
        placement.place(owner, Item::Record(Record::UpdateText { node, old, seq }));
    }
    if placement.dropped > 0 {
        tracing::trace!(
            target: "rewind.observer",
            dropped = placement.dropped,
            "records covered by inserted nodes"
        );
    }

    let mut tree = placement.into_tree(deletes);
    sort_record_tree(dom, &mut tree);
    tree
}

#[cfg(test)]
mod tests {
    use super::*;
    use rewind_dom::markup::set_inner_markup;

    fn setup(markup: &str) -> (Dom, NodeId, rewind_dom::ObserverId) {
        let mut dom = Dom::new();
        let root = dom.create_element("div");
        set_inner_markup(&mut dom, root, markup).unwrap();
        let observer = dom.observe(root);
        (dom, root, observer)
    }

    fn build(dom: &mut Dom, root: NodeId, observer: rewind_dom::ObserverId) -> Vec<Record> {
        let records = dom.take_records(observer);
        build_record_tree(dom, root, records)
    }

    #[test]
    fn test_insert_then_delete_cancels() {
        let (mut dom, root, observer) = setup("<p></p>");
        let b = dom.create_element("b");
        dom.append_child(root, b).unwrap();
        dom.remove(b).unwrap();
        assert!(build(&mut dom, root, observer).is_empty());
    }

    #[test]
    fn test_move_keeps_delete_and_insert() {
        let (mut dom, root, observer) = setup("<a></a><b></b>");
        let a = dom.children(root)[0];
        dom.append_child(root, a).unwrap();
        let tree = build(&mut dom, root, observer);
        assert_eq!(tree.len(), 2);
        assert!(matches!(&tree[0], Record::Delete(c) if c.members[0].node == a));
        assert!(matches!(&tree[1], Record::Insert { node, .. } if *node == a));
    }

    #[test]
    fn test_delete_insert_delete_is_one_delete() {
        let (mut dom, root, observer) = setup("<a></a><b></b>");
        let a = dom.children(root)[0];
        dom.append_child(root, a).unwrap();
        dom.remove(a).unwrap();
        let tree = build(&mut dom, root, observer);
        assert_eq!(tree.len(), 1);
        let Record::Delete(compound) = &tree[0] else {
            panic!("expected delete");
        };
        assert_eq!(compound.prev_sibling, None);
        assert_eq!(compound.target, root);
    }

    #[test]
    fn test_adjacent_deletes_form_compound() {
        let (mut dom, root, observer) = setup("<a></a><b></b><c></c><d></d>");
        let kids = dom.children(root).to_vec();
        // Remove c first, then b: c was anchored after b.
        dom.remove(kids[2]).unwrap();
        dom.remove(kids[1]).unwrap();
        let tree = build(&mut dom, root, observer);
        assert_eq!(tree.len(), 1);
        let Record::Delete(compound) = &tree[0] else {
            panic!("expected delete");
        };
        let nodes: Vec<NodeId> = compound.members.iter().map(|m| m.node).collect();
        assert_eq!(nodes, vec![kids[1], kids[2]]);
        assert_eq!(compound.prev_sibling, Some(kids[0]));
    }

    #[test]
    fn test_stale_values_fold_into_delete() {
        let (mut dom, root, observer) = setup(r#"<p class="x">t</p>"#);
        let p = dom.children(root)[0];
        dom.set_attr(p, "class", "a").unwrap();
        dom.set_attr(p, "class", "b").unwrap();
        dom.remove(p).unwrap();
        let tree = build(&mut dom, root, observer);
        let Record::Delete(compound) = &tree[0] else {
            panic!("expected delete");
        };
        assert_eq!(
            compound.members[0].old_attrs,
            vec![(AttrName::new("class"), Some("x".to_string()))]
        );
        assert_eq!(tree.len(), 1);
    }

    #[test]
    fn test_records_inside_deleted_node_nest() {
        let (mut dom, root, observer) = setup("<p><b></b><i></i></p>");
        let p = dom.children(root)[0];
        let b = dom.children(p)[0];
        dom.remove(b).unwrap();
        dom.remove(p).unwrap();
        let tree = build(&mut dom, root, observer);
        assert_eq!(tree.len(), 1);
        let Record::Delete(compound) = &tree[0] else {
            panic!("expected delete");
        };
        assert_eq!(compound.members[0].contained.len(), 1);
    }

    #[test]
    fn test_records_inside_inserted_node_drop() {
        let (mut dom, root, observer) = setup("");
        let p = dom.create_element("p");
        dom.append_child(root, p).unwrap();
        let b = dom.create_element("b");
        dom.append_child(p, b).unwrap();
        dom.set_attr(b, "x", "1").unwrap();
        let tree = build(&mut dom, root, observer);
        assert_eq!(tree.len(), 1);
        assert!(matches!(&tree[0], Record::Insert { node, .. } if *node == p));
    }

    #[test]
    fn test_sorted_in_document_order() {
        let (mut dom, root, observer) = setup("<a></a><b></b><c></c>");
        let kids = dom.children(root).to_vec();
        dom.set_attr(kids[2], "x", "1").unwrap();
        dom.set_attr(kids[0], "x", "1").unwrap();
        let n = dom.create_element("n");
        dom.insert_before(root, n, Some(kids[1])).unwrap();
        let tree = build(&mut dom, root, observer);
        let order: Vec<NodeId> = tree
            .iter()
            .map(|r| match r {
                Record::Insert { node, .. } | Record::UpdateAttr { node, .. } => *node,
                other => panic!("unexpected {other:?}"),
            })
            .collect();
        assert_eq!(order, vec![kids[0], n, kids[2]]);
    }

    #[test]
    fn test_edits_inside_moved_node_follow_its_own_delete() {
        let (mut dom, root, observer) = setup("<p>one</p><p>two</p>");
        let first = dom.children(root)[0];
        let second = dom.children(root)[1];
        let one = dom.children(first)[0];
        let two = dom.children(second)[0];
        dom.insert_before(first, second, Some(one)).unwrap();
        dom.remove(two).unwrap();
        dom.remove(first).unwrap();

        let tree = build(&mut dom, root, observer);
        assert_eq!(tree.len(), 1);
        let Record::Delete(compound) = &tree[0] else {
            panic!("expected delete");
        };
        let nodes: Vec<NodeId> = compound.members.iter().map(|m| m.node).collect();
        assert_eq!(nodes, vec![first, second]);
        assert!(matches!(
            compound.members[0].contained.as_slice(),
            [Record::Insert { node, .. }] if *node == second
        ));
        assert!(matches!(
            compound.members[1].contained.as_slice(),
            [Record::Delete(inner)] if inner.members[0].node == two
        ));
    }

    #[test]
    fn test_edits_inside_moved_node_are_not_swallowed_by_its_insert() {
        let (mut dom, root, observer) = setup("<a>x</a><b></b>");
        let a = dom.children(root)[0];
        let b = dom.children(root)[1];
        let x = dom.children(a)[0];
        dom.append_child(b, a).unwrap();
        dom.remove(x).unwrap();
        let tree = build(&mut dom, root, observer);
        assert_eq!(tree.len(), 2);
        let Record::Delete(compound) = &tree[0] else {
            panic!("expected delete");
        };
        assert_eq!(compound.members[0].node, a);
        assert!(matches!(
            compound.members[0].contained.as_slice(),
            [Record::Delete(inner)] if inner.members[0].node == x
        ));
        assert!(matches!(&tree[1], Record::Insert { node, .. } if *node == a));
    }

    #[test]
    fn test_position_key_follows_document_order() {
        let (mut dom, root, _) = setup("<a><b></b></a><c></c>");
        let a = dom.children(root)[0];
        let b = dom.children(a)[0];
        let keys: Vec<(NodeId, Vec<usize>)> = [
            Boundary::new(root, 0),
            Boundary::new(a, 0),
            Boundary::new(b, 0),
            Boundary::new(a, 1),
            Boundary::new(root, 2),
        ]
        .into_iter()
        .map(|at| position_key(&dom, at))
        .collect();
        assert!(keys.windows(2).all(|w| w[0] < w[1]), "{keys:?}");

        let detached = dom.create_element("d");
        let other = position_key(&dom, Boundary::new(detached, 0));
        assert_eq!(other, (detached, vec![0]));
        assert_ne!(other.0, keys[0].0);
    }
}
