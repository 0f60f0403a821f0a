#![forbid(unsafe_code)]

//! Frames group the changes of nested operations.
//!
//! A frame is opened by [`Context::enter`](crate::Context::enter) and
//! closed by [`Context::leave`](crate::Context::leave). While open it
//! collects [`FrameRecord`]s: batches of changes flushed from the observer,
//! and the frames of nested operations that already closed.
//!
//! ```text
//! top frame (partition_records)
//! ├── Frame { meta: "typing", records: [Changes([...])] }
//! ├── Frame { meta: "enter",  records: [Changes([...]), Frame {...}] }
//! └── Changes([...])            observed outside any nested frame
//! ```
//!
//! Each direct record of the top frame becomes one history entry.

use rewind_dom::Range;

use crate::change::{Change, ChangeSet, Meta, RangeUpdate};
use crate::path::RangePath;

/// How a frame records what happens inside it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrameOptions {
    /// Do not observe; the operation reports its own changes on leave.
    pub no_observe: bool,
    /// Flush pending changes whenever a nested frame opens or closes, so
    /// each nested frame becomes its own history entry.
    pub partition_records: bool,
    pub meta: Meta,
    /// Selection when the frame opened.
    pub old_range: Option<Range>,
}

impl FrameOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_meta(mut self, meta: Meta) -> Self {
        self.meta = meta;
        self
    }

    #[must_use]
    pub fn with_kind(self, kind: impl Into<String>) -> Self {
        self.with_meta(Meta::new(kind))
    }

    #[must_use]
    pub fn with_old_range(mut self, range: Range) -> Self {
        self.old_range = Some(range);
        self
    }

    #[must_use]
    pub fn no_observe(mut self) -> Self {
        self.no_observe = true;
        self
    }

    #[must_use]
    pub fn partition_records(mut self) -> Self {
        self.partition_records = true;
        self
    }
}

/// What an operation hands back when its frame closes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LeaveResult {
    /// Changes of a `no_observe` frame. Must be empty otherwise.
    pub changes: Vec<Change>,
    /// Selection after the operation.
    pub new_range: Option<Range>,
}

impl LeaveResult {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_changes(mut self, changes: Vec<Change>) -> Self {
        self.changes = changes;
        self
    }

    #[must_use]
    pub fn with_new_range(mut self, range: Range) -> Self {
        self.new_range = Some(range);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameRecord {
    Changes(Vec<Change>),
    Frame(Frame),
}

/// One open or closed operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub(crate) options: FrameOptions,
    pub(crate) records: Vec<FrameRecord>,
    pub(crate) old_range: Option<RangePath>,
    pub(crate) new_range: Option<RangePath>,
}

impl Frame {
    pub(crate) fn new(options: FrameOptions, old_range: Option<RangePath>) -> Self {
        Self {
            options,
            records: Vec::new(),
            old_range,
            new_range: None,
        }
    }

    #[must_use]
    pub fn options(&self) -> &FrameOptions {
        &self.options
    }

    #[must_use]
    pub fn meta(&self) -> &Meta {
        &self.options.meta
    }

    #[must_use]
    pub fn records(&self) -> &[FrameRecord] {
        &self.records
    }

    #[must_use]
    pub fn old_range(&self) -> Option<&RangePath> {
        self.old_range.as_ref()
    }

    #[must_use]
    pub fn new_range(&self) -> Option<&RangePath> {
        self.new_range.as_ref()
    }

    fn selection(&self) -> RangeUpdate {
        RangeUpdate::new(self.old_range.clone(), self.new_range.clone())
    }
}

fn collect_changes(frame: &Frame, out: &mut Vec<Change>) {
    for record in &frame.records {
        match record {
            FrameRecord::Changes(changes) => out.extend(changes.iter().cloned()),
            FrameRecord::Frame(nested) => collect_changes(nested, out),
        }
    }
}

/// All changes of `frame`, nested frames included, as one change set.
#[must_use]
pub fn change_set_from_frame(frame: &Frame) -> ChangeSet {
    let mut changes = Vec::new();
    collect_changes(frame, &mut changes);
    ChangeSet::new(frame.meta().clone(), changes, frame.selection())
}

/// One change set per direct record of `frame`.
///
/// Nested frames keep their own meta and selection; loose change batches
/// take those of `frame`.
#[must_use]
pub fn partitioned_change_sets_from_frame(frame: &Frame) -> Vec<ChangeSet> {
    frame
        .records
        .iter()
        .map(|record| match record {
            FrameRecord::Frame(nested) => change_set_from_frame(nested),
            FrameRecord::Changes(changes) => {
                ChangeSet::new(frame.meta().clone(), changes.clone(), frame.selection())
            }
        })
        .collect()
}
