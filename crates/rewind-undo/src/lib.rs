#![forbid(unsafe_code)]

//! Change tracking and undo/redo for live Rewind trees.
//!
//! Mutations under an observed root are turned into [`Change`]s addressed
//! by [`Path`]s that survive text-node splitting and merging. Changes are
//! grouped by [`Frame`]s into [`ChangeSet`]s, committed to a linear
//! [`History`], and replayed forwards or inverted by the apply engine.
//!
//! # Modules
//!
//! - [`path`]: boundary <-> path conversion
//! - [`observer`]: live-diff and snapshot change observers
//! - [`change`]: changes, change sets, inversion and combining
//! - [`frame`]: nested capture scopes
//! - [`history`]: bounded linear history
//! - [`apply`]: replay of changes with range preservation
//! - [`context`]: the undo/redo controller
//! - [`config`]: tunables, loadable from TOML/JSON with the `config` feature
//!
//! # Example
//!
//! ```
//! use rewind_dom::{markup, Dom};
//! use rewind_undo::{Context, FrameOptions, LeaveResult, UndoConfig};
//!
//! let mut dom = Dom::new();
//! let root = dom.create_element("div");
//! markup::set_inner_markup(&mut dom, root, "<p>hello</p>").unwrap();
//!
//! let mut ctx = Context::new(root, UndoConfig::default());
//! ctx.enter(&mut dom, FrameOptions::new().partition_records());
//!
//! let text = dom.children(dom.children(root)[0])[0];
//! ctx.capture(&mut dom, FrameOptions::new().with_kind("typing"), |dom| {
//!     dom.insert_data(text, 5, "!").unwrap();
//!     LeaveResult::new()
//! });
//! assert_eq!(markup::inner_markup(&dom, root), "<p>hello!</p>");
//!
//! assert!(ctx.undo(&mut dom, None, &mut []).unwrap());
//! assert_eq!(markup::inner_markup(&dom, root), "<p>hello</p>");
//! assert!(ctx.redo(&mut dom, None, &mut []).unwrap());
//! assert_eq!(markup::inner_markup(&dom, root), "<p>hello!</p>");
//! ```

pub mod apply;
pub mod change;
pub mod config;
pub mod context;
pub mod frame;
pub(crate) mod generate;
pub mod history;
pub mod observer;
pub mod path;
pub(crate) mod record;

pub use apply::{ApplyError, apply_change, apply_change_set};
pub use change::{AttrChange, Change, ChangeSet, CombineConfig, Meta, RangeUpdate};
pub use config::{ConfigError, UndoConfig};
pub use context::Context;
pub use frame::{
    Frame, FrameOptions, FrameRecord, LeaveResult, change_set_from_frame,
    partitioned_change_sets_from_frame,
};
pub use history::{History, RecordOutcome};
pub use observer::{ChangeObserver, LiveObserver, SnapshotObserver};
pub use path::{Path, PathError, PathStep, RangePath};
