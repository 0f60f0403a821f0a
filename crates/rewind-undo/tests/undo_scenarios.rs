#![forbid(unsafe_code)]

//! End-to-end capture, history and replay scenarios.
//!
//! Run:
//!   cargo test -p rewind-undo --test undo_scenarios

use rewind_dom::markup::{inner_markup, set_inner_markup};
use rewind_dom::{Boundary, Content, Dom, NodeId, Range};
use rewind_undo::{
    Change, ChangeSet, Context, FrameOptions, LeaveResult, PathStep, UndoConfig, apply_change_set,
    change_set_from_frame,
};

// ============================================================================
// Helpers
// ============================================================================

fn tree(markup: &str) -> (Dom, NodeId) {
    let mut dom = Dom::new();
    let root = dom.create_element("div");
    set_inner_markup(&mut dom, root, markup).unwrap();
    (dom, root)
}

/// Context with the long-lived top frame a host keeps open.
fn open(dom: &mut Dom, root: NodeId, config: UndoConfig) -> Context {
    let mut ctx = Context::new(root, config);
    ctx.enter(dom, FrameOptions::new().partition_records());
    ctx
}

fn path(raw: &[(usize, &str)]) -> Vec<PathStep> {
    raw.iter().map(|&(o, n)| PathStep::new(o, n)).collect()
}

/// Capture `edit` in a standalone frame, then check that the inverse of the
/// captured change set restores the original markup and that re-applying
/// the forward set restores the edited markup.
fn assert_round_trip(markup: &str, edit: impl FnOnce(&mut Dom, NodeId)) {
    let (mut dom, root) = tree(markup);
    let mut ctx = Context::new(root, UndoConfig::default());
    let frame = ctx
        .capture(&mut dom, FrameOptions::new(), |dom| {
            edit(dom, root);
            LeaveResult::new()
        })
        .expect("top-level frame");
    let edited = inner_markup(&dom, root);
    let set = change_set_from_frame(&frame);

    apply_change_set(&mut dom, root, &set.inverse(), None, &mut []).unwrap();
    assert_eq!(inner_markup(&dom, root), markup, "undo of {set:?}");

    apply_change_set(&mut dom, root, &set, None, &mut []).unwrap();
    assert_eq!(inner_markup(&dom, root), edited, "redo of {set:?}");
}

fn child(dom: &Dom, parent: NodeId, index: usize) -> NodeId {
    dom.children(parent)[index]
}

// ============================================================================
// Scenarios
// ============================================================================

#[test]
fn append_text_then_undo_restores_selection() {
    let (mut dom, root) = tree("<p>hello</p>");
    let mut ctx = open(&mut dom, root, UndoConfig::default());
    let p = child(&dom, root, 0);
    let text = child(&dom, p, 0);

    let before = Range::collapsed(Boundary::new(text, 5));
    let after = Range::collapsed(Boundary::new(text, 6));
    ctx.capture(
        &mut dom,
        FrameOptions::new().with_kind("typing").with_old_range(before),
        |dom| {
            dom.insert_data(text, 5, "x").unwrap();
            LeaveResult::new().with_new_range(after)
        },
    );
    assert_eq!(inner_markup(&dom, root), "<p>hellox</p>");

    let mut selection = Range::collapsed(Boundary::new(root, 0));
    assert!(ctx.undo(&mut dom, Some(&mut selection), &mut []).unwrap());
    assert_eq!(inner_markup(&dom, root), "<p>hello</p>");
    assert_eq!(selection, Range::collapsed(Boundary::new(p, 1)));
}

#[test]
fn delete_first_block_is_one_change() {
    let (mut dom, root) = tree("<p>one</p><p>two</p>");
    let mut ctx = open(&mut dom, root, UndoConfig::default());
    let first = child(&dom, root, 0);
    dom.remove(first).unwrap();
    ctx.advance_history(&mut dom);

    let set = ctx.history().iter().next().unwrap();
    assert_eq!(
        set.changes,
        vec![Change::Delete {
            path: path(&[(0, "div")]),
            content: vec![Content::element("p").with_child(Content::text("one"))],
        }]
    );

    assert!(ctx.undo(&mut dom, None, &mut []).unwrap());
    assert_eq!(inner_markup(&dom, root), "<p>one</p><p>two</p>");
    assert_eq!(dom.children(root).len(), 2);
}

#[test]
fn deleted_node_keeps_attribute_from_before_frame() {
    let (mut dom, root) = tree(r#"<p class="a">x</p><i></i>"#);
    let mut ctx = open(&mut dom, root, UndoConfig::default());
    let p = child(&dom, root, 0);
    ctx.capture(&mut dom, FrameOptions::new().with_kind("format"), |dom| {
        dom.set_attr(p, "class", "b").unwrap();
        dom.set_attr(p, "class", "c").unwrap();
        dom.remove(p).unwrap();
        LeaveResult::new()
    });
    ctx.advance_history(&mut dom);

    let set = ctx.history().iter().next().unwrap();
    assert_eq!(set.changes.len(), 1);
    let Change::Delete { content, .. } = &set.changes[0] else {
        panic!("expected a delete, got {:?}", set.changes[0]);
    };
    assert_eq!(
        content,
        &vec![Content::element("p")
            .with_attr("class", "a")
            .with_child(Content::text("x"))]
    );

    ctx.undo(&mut dom, None, &mut []).unwrap();
    assert_eq!(inner_markup(&dom, root), r#"<p class="a">x</p><i></i>"#);
}

fn type_char(ctx: &mut Context, dom: &mut Dom, p: NodeId, ch: &str) {
    ctx.capture(dom, FrameOptions::new().with_kind("typing"), |dom| {
        let t = dom.create_text(ch);
        dom.append_child(p, t).unwrap();
        LeaveResult::new()
    });
    ctx.advance_history(dom);
}

#[test]
fn contiguous_typing_combines_until_interrupted() {
    let (mut dom, root) = tree("<p>ab</p>");
    let mut ctx = open(&mut dom, root, UndoConfig::default());
    let p = child(&dom, root, 0);

    type_char(&mut ctx, &mut dom, p, "h");
    type_char(&mut ctx, &mut dom, p, "i");
    assert_eq!(ctx.history_len(), 1);
    let set = ctx.history().iter().next().unwrap();
    assert_eq!(
        set.changes,
        vec![Change::Insert {
            path: path(&[(0, "div"), (0, "p"), (2, "#text")]),
            content: vec![Content::text("hi")],
        }]
    );

    ctx.interrupt_typing();
    type_char(&mut ctx, &mut dom, p, "!");
    assert_eq!(ctx.history_len(), 2);

    ctx.undo(&mut dom, None, &mut []).unwrap();
    ctx.undo(&mut dom, None, &mut []).unwrap();
    assert_eq!(inner_markup(&dom, root), "<p>ab</p>");
}

#[test]
fn combining_stops_at_max_chars() {
    let (mut dom, root) = tree("<p>ab</p>");
    let mut ctx = open(&mut dom, root, UndoConfig::default().with_max_combine_chars(2));
    let p = child(&dom, root, 0);
    for ch in ["x", "y", "z"] {
        type_char(&mut ctx, &mut dom, p, ch);
    }
    assert_eq!(ctx.history_len(), 2);
}

// ============================================================================
// History behavior
// ============================================================================

#[test]
fn new_edit_after_undo_truncates_redo() {
    let (mut dom, root) = tree("");
    let mut ctx = open(&mut dom, root, UndoConfig::default());
    for name in ["a", "b", "c"] {
        let node = dom.create_element(name);
        dom.append_child(root, node).unwrap();
        ctx.advance_history(&mut dom);
    }
    ctx.undo(&mut dom, None, &mut []).unwrap();
    ctx.undo(&mut dom, None, &mut []).unwrap();
    assert_eq!(inner_markup(&dom, root), "<a></a>");

    let d = dom.create_element("d");
    dom.append_child(root, d).unwrap();
    ctx.advance_history(&mut dom);
    assert_eq!(ctx.history_len(), 2);
    assert_eq!(ctx.history_index(), 2);
    assert!(!ctx.redo(&mut dom, None, &mut []).unwrap());
    assert_eq!(inner_markup(&dom, root), "<a></a><d></d>");
}

#[test]
fn history_is_bounded() {
    let (mut dom, root) = tree("");
    let mut ctx = open(&mut dom, root, UndoConfig::default().with_max_history(3));
    for _ in 0..5 {
        let b = dom.create_element("b");
        dom.append_child(root, b).unwrap();
        ctx.advance_history(&mut dom);
    }
    assert_eq!(ctx.history_len(), 3);
    while ctx.undo(&mut dom, None, &mut []).unwrap() {}
    assert_eq!(inner_markup(&dom, root), "<b></b><b></b>");
}

#[test]
fn noop_capture_records_nothing() {
    let (mut dom, root) = tree("<p>x</p>");
    let mut ctx = open(&mut dom, root, UndoConfig::default());
    ctx.capture(&mut dom, FrameOptions::new().with_kind("typing"), |_| LeaveResult::new());
    ctx.advance_history(&mut dom);
    ctx.advance_history(&mut dom);
    assert_eq!(ctx.history_len(), 0);
    assert!(!ctx.can_undo());
}

#[test]
fn insert_then_remove_cancels() {
    let (mut dom, root) = tree("<p>x</p>");
    let mut ctx = open(&mut dom, root, UndoConfig::default());
    let b = dom.create_element("b");
    dom.append_child(root, b).unwrap();
    dom.remove(b).unwrap();
    ctx.advance_history(&mut dom);
    assert_eq!(ctx.history_len(), 0);
}

#[test]
fn move_is_delete_plus_insert() {
    let (mut dom, root) = tree("<a></a><b></b>");
    let mut ctx = open(&mut dom, root, UndoConfig::default());
    let a = child(&dom, root, 0);
    dom.append_child(root, a).unwrap();
    ctx.advance_history(&mut dom);

    let set = ctx.history().iter().next().unwrap();
    let kinds: Vec<&str> = set.changes.iter().map(Change::kind).collect();
    assert_eq!(kinds, vec!["delete", "insert"]);

    ctx.undo(&mut dom, None, &mut []).unwrap();
    assert_eq!(inner_markup(&dom, root), "<a></a><b></b>");
    ctx.redo(&mut dom, None, &mut []).unwrap();
    assert_eq!(inner_markup(&dom, root), "<b></b><a></a>");
}

#[test]
fn undo_keeps_other_ranges_valid() {
    let (mut dom, root) = tree("<p>one</p><p>two</p>");
    let mut ctx = open(&mut dom, root, UndoConfig::default());
    let second = child(&dom, root, 1);
    let two = child(&dom, second, 0);
    let first = child(&dom, root, 0);
    dom.remove(first).unwrap();
    ctx.advance_history(&mut dom);

    let mut others = [Range::collapsed(Boundary::new(two, 1))];
    ctx.undo(&mut dom, None, &mut others).unwrap();
    assert_eq!(others[0], Range::collapsed(Boundary::new(two, 1)));
    assert_eq!(inner_markup(&dom, root), "<p>one</p><p>two</p>");
}

#[test]
fn snapshot_observer_round_trip() {
    let (mut dom, root) = tree("<p>one</p>");
    let mut ctx = open(&mut dom, root, UndoConfig::default().with_live_observe(false));
    let p = child(&dom, root, 0);
    dom.set_attr(p, "class", "x").unwrap();
    let i = dom.create_element("i");
    dom.append_child(root, i).unwrap();
    ctx.advance_history(&mut dom);
    assert_eq!(ctx.history_len(), 1);

    ctx.undo(&mut dom, None, &mut []).unwrap();
    assert_eq!(inner_markup(&dom, root), "<p>one</p>");
    ctx.redo(&mut dom, None, &mut []).unwrap();
    assert_eq!(inner_markup(&dom, root), r#"<p class="x">one</p><i></i>"#);
    ctx.advance_history(&mut dom);
    assert_eq!(ctx.history_len(), 1);
}

#[test]
fn partitioned_frames_become_separate_entries() {
    let (mut dom, root) = tree("");
    let mut ctx = open(&mut dom, root, UndoConfig::default());
    for kind in ["bold", "italic"] {
        ctx.capture(&mut dom, FrameOptions::new().with_kind(kind), |dom| {
            let b = dom.create_element("b");
            dom.append_child(root, b).unwrap();
            LeaveResult::new()
        });
    }
    let loose = dom.create_element("u");
    dom.append_child(root, loose).unwrap();
    ctx.advance_history(&mut dom);

    let kinds: Vec<Option<&str>> = ctx.history().iter().map(|s| s.meta.kind()).collect();
    assert_eq!(kinds, vec![Some("bold"), Some("italic"), None]);
}

#[test]
fn redo_applies_recorded_set_unchanged() {
    let (mut dom, root) = tree("<p>x</p>");
    let mut ctx = open(&mut dom, root, UndoConfig::default());
    let p = child(&dom, root, 0);
    dom.set_attr(p, "id", "1").unwrap();
    ctx.advance_history(&mut dom);
    let recorded: ChangeSet = ctx.history().iter().next().unwrap().clone();

    ctx.undo(&mut dom, None, &mut []).unwrap();
    ctx.redo(&mut dom, None, &mut []).unwrap();
    assert_eq!(ctx.history().iter().next(), Some(&recorded));
    assert_eq!(inner_markup(&dom, root), r#"<p id="1">x</p>"#);
}

// ============================================================================
// Record ordering
// ============================================================================

#[test]
fn sequential_deletes() {
    assert_round_trip(
        "<b></b><i></i><em><strong></strong></em><span></span>",
        |dom, root| {
            let em = child(dom, root, 2);
            let strong = child(dom, em, 0);
            dom.remove(strong).unwrap();
            dom.remove(em).unwrap();
            let i = child(dom, root, 1);
            dom.remove(i).unwrap();
        },
    );
}

#[test]
fn delete_inside_text_node() {
    assert_round_trip("some <b>bold</b> text", |dom, root| {
        let some = child(dom, root, 0);
        dom.delete_data(some, 2, 1).unwrap();
    });
}

#[test]
fn delete_containing_a_not_direct_child_delete() {
    assert_round_trip(
        "<div></div><div><i><b>legendos</b></i></div>quodsi<div></div>",
        |dom, root| {
            let div = child(dom, root, 1);
            let i = child(dom, div, 0);
            let b = child(dom, i, 0);
            let legendos = child(dom, b, 0);
            let quodsi = child(dom, root, 2);
            dom.remove(i).unwrap();
            dom.remove(div).unwrap();
            dom.remove(quodsi).unwrap();
            dom.insert_data(legendos, 8, "quodsi").unwrap();
            dom.append_child(root, legendos).unwrap();
        },
    );
}

#[test]
fn nested_record_sorting() {
    assert_round_trip(
        "<div></div>xx<b>one<i>two</i>three</b>zz<div></div>",
        |dom, root| {
            let xx = child(dom, root, 1);
            let b = child(dom, root, 2);
            let i = child(dom, b, 1);
            let two = child(dom, i, 0);
            let zz = child(dom, root, 3);
            let wrapper = dom.create_element("i");
            dom.insert_before(root, wrapper, Some(xx)).unwrap();
            dom.append_child(wrapper, xx).unwrap();
            dom.append_child(wrapper, b).unwrap();
            dom.append_child(wrapper, zz).unwrap();
            dom.insert_before(b, two, Some(i)).unwrap();
            dom.remove(i).unwrap();
        },
    );
}

#[test]
fn two_deletes_contain_another_delete() {
    assert_round_trip(
        "<div></div>xx<b>one</b><i>two</i>zz<div></div>",
        |dom, root| {
            let b = child(dom, root, 2);
            let one = child(dom, b, 0);
            let i = child(dom, root, 3);
            dom.remove(one).unwrap();
            dom.remove(b).unwrap();
            dom.append_child(i, b).unwrap();
            dom.append_child(b, one).unwrap();
            dom.remove(i).unwrap();
            dom.append_child(root, i).unwrap();
        },
    );
}

#[test]
fn delete_reinsert_through_unobserved_element() {
    assert_round_trip("<i></i>", |dom, root| {
        let i = child(dom, root, 0);
        let b = dom.create_element("b");
        dom.remove(i).unwrap();
        dom.append_child(b, i).unwrap();
        dom.append_child(root, b).unwrap();
        dom.remove(i).unwrap();
    });
}

#[test]
fn attribute_update_on_moved_node() {
    assert_round_trip(r#"<p id="a">x</p><q></q>"#, |dom, root| {
        let p = child(dom, root, 0);
        dom.set_attr(p, "id", "b").unwrap();
        dom.append_child(root, p).unwrap();
    });
}

#[test]
fn edits_inside_node_moved_into_deleted_node() {
    assert_round_trip("<p>one</p><p>two</p>", |dom, root| {
        let first = child(dom, root, 0);
        let second = child(dom, root, 1);
        let one = child(dom, first, 0);
        let two = child(dom, second, 0);
        dom.insert_before(first, second, Some(one)).unwrap();
        dom.remove(two).unwrap();
        dom.remove(first).unwrap();
    });
}

#[test]
fn move_into_node_that_moves_later() {
    assert_round_trip("<a></a><b></b><c></c><d></d><e></e>", |dom, root| {
        let a = child(dom, root, 0);
        let b = child(dom, root, 1);
        let d = child(dom, root, 3);
        dom.append_child(d, b).unwrap();
        dom.insert_before(root, d, Some(a)).unwrap();
    });
}

#[test]
fn undo_restores_text_removed_inside_moved_node() {
    let (mut dom, root) = tree("<p>one</p><p>two</p>");
    let mut ctx = open(&mut dom, root, UndoConfig::default());
    let first = child(&dom, root, 0);
    let second = child(&dom, root, 1);
    let one = child(&dom, first, 0);
    let two = child(&dom, second, 0);
    dom.insert_before(first, second, Some(one)).unwrap();
    dom.remove(two).unwrap();
    dom.remove(first).unwrap();
    ctx.advance_history(&mut dom);
    assert_eq!(inner_markup(&dom, root), "");

    assert!(ctx.undo(&mut dom, None, &mut []).unwrap());
    assert_eq!(inner_markup(&dom, root), "<p>one</p><p>two</p>");
    assert!(ctx.redo(&mut dom, None, &mut []).unwrap());
    assert_eq!(inner_markup(&dom, root), "");
    assert!(ctx.undo(&mut dom, None, &mut []).unwrap());
    assert_eq!(inner_markup(&dom, root), "<p>one</p><p>two</p>");
}
