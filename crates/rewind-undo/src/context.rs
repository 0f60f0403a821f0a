#![forbid(unsafe_code)]

//! Undo/redo controller.
//!
//! A [`Context`] owns the observer, the frame stack and the history of one
//! root element. Hosts keep a long-lived top frame open and wrap each edit
//! in a nested frame:
//!
//! ```text
//! enter(top, partition_records)
//!   capture("typing", |dom| ...)   ─┐
//!   capture("enter",  |dom| ...)    ├─ advance_history() ─► [typing, enter]
//!   <mutations outside any frame>  ─┘                        + loose batch
//!   undo()  ── capture_off_the_record("undo", apply inverse)
//! ```
//!
//! # Invariants
//!
//! 1. `enter`/`leave` calls are balanced. A `leave` without a matching
//!    `enter` panics.
//! 2. `advance_history` runs with at most the top frame open.
//! 3. Changes applied by `undo`/`redo` are never recorded.
//! 4. `history_index <= history_len`.
//! 5. Nodes that `undo`/`redo` cut out of the tree are released once the
//!    replay frame closes, so repeated cycles do not grow the arena. Ids
//!    the host kept for them become stale. A node still watched by another
//!    observer is left detached instead.
//!
//! # Failure Modes
//!
//! | Condition | Behavior |
//! |-----------|----------|
//! | Undo/redo with nothing to do | `Ok(false)`, no change |
//! | Recorded path no longer resolves | `Err(ApplyError)`, index unchanged |
//! | Range cannot be addressed from the root | Selection recorded as `None` |

use std::fmt;

use rewind_dom::{Dom, NodeId, Range};

use crate::apply::{self, ApplyError};
use crate::change::ChangeSet;
use crate::config::UndoConfig;
use crate::frame::{self, Frame, FrameOptions, FrameRecord, LeaveResult};
use crate::history::History;
use crate::observer::{ChangeObserver, LiveObserver, SnapshotObserver};
use crate::path::{self, RangePath};

/// Change tracking and history for one root element.
pub struct Context {
    root: NodeId,
    config: UndoConfig,
    observer: Box<dyn ChangeObserver>,
    /// Open frames, outermost first.
    stack: Vec<Frame>,
    history: History,
    typing_interrupted: bool,
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("root", &self.root)
            .field("config", &self.config)
            .field("frame_depth", &self.stack.len())
            .field("history_len", &self.history.len())
            .field("history_index", &self.history.index())
            .field("typing_interrupted", &self.typing_interrupted)
            .finish_non_exhaustive()
    }
}

fn should_partition(lower: &Frame, upper: &Frame) -> bool {
    (upper.options.partition_records && !upper.options.no_observe)
        || lower.options.no_observe != upper.options.no_observe
}

/// Move pending observer output into `frame`.
fn take_records(observer: &mut dyn ChangeObserver, dom: &mut Dom, frame: &mut Frame) {
    if frame.options.no_observe {
        observer.discard_changes(dom);
        return;
    }
    let changes = observer.take_changes(dom);
    if !changes.is_empty() {
        frame.records.push(FrameRecord::Changes(changes));
    }
}

/// Free the subtrees a replay cut out of the tree.
fn release_replayed(dom: &mut Dom, removed: Vec<NodeId>) {
    let mut freed = 0usize;
    for node in removed {
        match dom.release(node) {
            Ok(count) => freed += count,
            Err(err) => {
                tracing::debug!(target: "rewind.undo", error = %err, "replayed node kept");
            }
        }
    }
    tracing::trace!(target: "rewind.undo", freed, "released replayed nodes");
}

impl Context {
    /// Context for `root`, observing with the strategy `config` selects.
    #[must_use]
    pub fn new(root: NodeId, config: UndoConfig) -> Self {
        let observer: Box<dyn ChangeObserver> = if config.live_observe {
            Box::new(LiveObserver::new())
        } else {
            Box::new(SnapshotObserver::new())
        };
        Self::with_observer(root, config, observer)
    }

    /// Context for `root` with a caller-supplied observer.
    #[must_use]
    pub fn with_observer(
        root: NodeId,
        config: UndoConfig,
        observer: Box<dyn ChangeObserver>,
    ) -> Self {
        Self {
            root,
            history: History::new(config.max_history),
            config,
            observer,
            stack: Vec::new(),
            typing_interrupted: false,
        }
    }

    fn range_path(&self, dom: &Dom, range: &Range) -> Option<RangePath> {
        match path::range_path(dom, self.root, range) {
            Ok(path) => Some(path),
            Err(err) => {
                tracing::debug!(target: "rewind.undo", error = %err, "range outside root");
                None
            }
        }
    }

    // ========================================================================
    // Frames
    // ========================================================================

    /// Open a frame.
    pub fn enter(&mut self, dom: &mut Dom, mut options: FrameOptions) {
        options.no_observe |= self.stack.last().is_some_and(|f| f.options.no_observe);
        let old_range = options
            .old_range
            .as_ref()
            .and_then(|range| self.range_path(dom, range));
        let frame = Frame::new(options, old_range);
        match self.stack.last_mut() {
            Some(upper) => {
                if should_partition(&frame, upper) {
                    take_records(self.observer.as_mut(), dom, upper);
                }
            }
            None => self.observer.observe_all(dom, self.root),
        }
        tracing::debug!(
            target: "rewind.undo",
            depth = self.stack.len(),
            kind = frame.meta().kind().unwrap_or(""),
            no_observe = frame.options.no_observe,
            "frame enter"
        );
        self.stack.push(frame);
    }

    /// Close the innermost frame.
    ///
    /// A nested frame is folded into its parent and `None` is returned. The
    /// top-level frame stops observation and is handed back.
    ///
    /// # Panics
    ///
    /// Without an open frame, or when an observed frame supplies its own
    /// changes.
    pub fn leave(&mut self, dom: &mut Dom, result: LeaveResult) -> Option<Frame> {
        let Some(mut frame) = self.stack.pop() else {
            panic!("leave() without a matching enter()");
        };
        match self.stack.last() {
            Some(upper) => {
                if should_partition(&frame, upper) {
                    take_records(self.observer.as_mut(), dom, &mut frame);
                }
            }
            None => {
                take_records(self.observer.as_mut(), dom, &mut frame);
                self.observer.disconnect(dom);
            }
        }
        if frame.options.no_observe {
            if !result.changes.is_empty() {
                frame.records.push(FrameRecord::Changes(result.changes));
            }
        } else {
            assert!(
                result.changes.is_empty(),
                "an observed frame cannot supply its own changes"
            );
        }
        frame.new_range = result
            .new_range
            .as_ref()
            .and_then(|range| self.range_path(dom, range));
        tracing::debug!(
            target: "rewind.undo",
            depth = self.stack.len(),
            kind = frame.meta().kind().unwrap_or(""),
            records = frame.records.len(),
            "frame leave"
        );
        match self.stack.last_mut() {
            Some(upper) => {
                upper.records.push(FrameRecord::Frame(frame));
                None
            }
            None => Some(frame),
        }
    }

    /// Run `f` inside a frame.
    pub fn capture(
        &mut self,
        dom: &mut Dom,
        options: FrameOptions,
        f: impl FnOnce(&mut Dom) -> LeaveResult,
    ) -> Option<Frame> {
        self.enter(dom, options);
        let result = f(dom);
        self.leave(dom, result)
    }

    /// Run `f` unobserved and keep its frame out of the parent's records.
    pub fn capture_off_the_record(
        &mut self,
        dom: &mut Dom,
        options: FrameOptions,
        f: impl FnOnce(&mut Dom) -> LeaveResult,
    ) -> Option<Frame> {
        let closed = self.capture(dom, options.no_observe(), f);
        let Some(upper) = self.stack.last_mut() else {
            return closed;
        };
        match upper.records.pop() {
            Some(FrameRecord::Frame(frame)) => Some(frame),
            Some(other) => {
                upper.records.push(other);
                None
            }
            None => None,
        }
    }

    /// Stop observing and drop every open frame.
    pub fn close(&mut self, dom: &mut Dom) {
        self.observer.disconnect(dom);
        let dropped = self.stack.len();
        self.stack.clear();
        tracing::debug!(target: "rewind.undo", dropped, "context closed");
    }

    // ========================================================================
    // History
    // ========================================================================

    /// Block the next combine, so the next typing starts a new entry.
    pub fn interrupt_typing(&mut self) {
        self.typing_interrupted = true;
    }

    /// Commit everything recorded in the top frame to history.
    ///
    /// A frame that changed nothing but moved the selection still becomes
    /// an entry, so undo puts the caret back. Sets with neither are dropped.
    ///
    /// # Panics
    ///
    /// When a nested frame is still open.
    pub fn advance_history(&mut self, dom: &mut Dom) {
        let _span = tracing::debug_span!(
            "undo.advance_history",
            recorded = tracing::field::Empty,
            combined = tracing::field::Empty,
            evicted = tracing::field::Empty,
        )
        .entered();

        assert!(
            self.stack.len() <= 1,
            "advance_history() with {} nested frame(s) open",
            self.stack.len().saturating_sub(1)
        );
        let Some(top) = self.stack.last_mut() else {
            return;
        };
        take_records(self.observer.as_mut(), dom, top);
        let sets: Vec<ChangeSet> = frame::partitioned_change_sets_from_frame(top)
            .into_iter()
            .filter(|set| !set.is_noop())
            .collect();
        top.records.clear();
        if sets.is_empty() {
            return;
        }

        let combine = (!self.typing_interrupted).then_some(&self.config.combine);
        let outcome = self.history.record(sets, combine);
        self.typing_interrupted = false;

        let span = tracing::Span::current();
        span.record("recorded", outcome.appended);
        span.record("combined", outcome.combined);
        span.record("evicted", outcome.evicted);
        if outcome.combined {
            tracing::debug!(target: "rewind.undo", index = self.history.index(), "combined with last entry");
        }
        if outcome.evicted > 0 {
            tracing::debug!(
                target: "rewind.undo",
                evicted = outcome.evicted,
                max_history = self.history.max_entries(),
                "evicted oldest entries"
            );
        }
        tracing::debug!(
            target: "rewind.undo",
            appended = outcome.appended,
            truncated = outcome.truncated,
            len = self.history.len(),
            "history advanced"
        );
    }

    /// Revert the newest undoable entry.
    ///
    /// `range` receives the selection from before that edit; `ranges` are
    /// kept valid across the replay.
    pub fn undo(
        &mut self,
        dom: &mut Dom,
        range: Option<&mut Range>,
        ranges: &mut [Range],
    ) -> Result<bool, ApplyError> {
        let _span =
            tracing::debug_span!("undo.undo", index = tracing::field::Empty).entered();
        self.advance_history(dom);
        let Some(set) = self.history.undo_target().map(ChangeSet::inverse) else {
            return Ok(false);
        };
        self.replay(dom, &set, "undo", range, ranges)?;
        self.history.step_back();
        tracing::Span::current().record("index", self.history.index());
        Ok(true)
    }

    /// Re-apply the oldest redoable entry.
    pub fn redo(
        &mut self,
        dom: &mut Dom,
        range: Option<&mut Range>,
        ranges: &mut [Range],
    ) -> Result<bool, ApplyError> {
        let _span =
            tracing::debug_span!("undo.redo", index = tracing::field::Empty).entered();
        self.advance_history(dom);
        let Some(set) = self.history.redo_target().cloned() else {
            return Ok(false);
        };
        self.replay(dom, &set, "redo", range, ranges)?;
        self.history.step_forward();
        tracing::Span::current().record("index", self.history.index());
        Ok(true)
    }

    fn replay(
        &mut self,
        dom: &mut Dom,
        set: &ChangeSet,
        kind: &'static str,
        range: Option<&mut Range>,
        ranges: &mut [Range],
    ) -> Result<(), ApplyError> {
        let root = self.root;
        let mut outcome = Ok(Vec::new());
        self.capture_off_the_record(dom, FrameOptions::new().with_kind(kind), |dom| {
            outcome = apply::apply_change_set(dom, root, set, range, ranges);
            LeaveResult::new()
        });
        match outcome {
            Ok(removed) => {
                release_replayed(dom, removed);
                Ok(())
            }
            Err(err) => {
                tracing::error!(
                    target: "rewind.undo",
                    kind,
                    entry = set.meta.kind().unwrap_or(""),
                    error = %err,
                    "replay failed"
                );
                Err(err)
            }
        }
    }

    // ========================================================================
    // Queries
    // ========================================================================

    #[must_use]
    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    #[must_use]
    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    #[must_use]
    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    #[must_use]
    pub fn history_index(&self) -> usize {
        self.history.index()
    }

    #[must_use]
    pub fn history(&self) -> &History {
        &self.history
    }

    /// Number of open frames, the top frame included.
    #[must_use]
    pub fn frame_depth(&self) -> usize {
        self.stack.len()
    }

    #[must_use]
    pub fn config(&self) -> &UndoConfig {
        &self.config
    }

    #[must_use]
    pub fn root(&self) -> NodeId {
        self.root
    }
}
