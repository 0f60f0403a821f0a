#![forbid(unsafe_code)]

//! Changes and change sets.
//!
//! A [`Change`] is one replayable edit addressed by [`Path`]. A
//! [`ChangeSet`] groups the changes of one user-level operation with the
//! selection transition that accompanied it. Both are plain values: they
//! hold [`Content`] snapshots, never live node handles, so history stays
//! valid after the nodes it mentions are gone.
//!
//! # Invariants
//!
//! 1. `change.inverse().inverse() == change` for every change.
//! 2. The inverse of a change set lists the inverted changes in reverse
//!    order, so applying a set and then its inverse restores the tree.
//! 3. [`ChangeSet::combine`] only ever merges two single-insert sets whose
//!    text is contiguous; every other pair yields `None`.

use rewind_dom::{AttrName, Content};

use crate::path::{Path, PathStep, RangePath};

/// Old and new value of one attribute. `None` means absent.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AttrChange {
    pub name: AttrName,
    pub old: Option<String>,
    pub new: Option<String>,
}

impl AttrChange {
    #[must_use]
    pub fn inverse(&self) -> Self {
        Self {
            name: self.name.clone(),
            old: self.new.clone(),
            new: self.old.clone(),
        }
    }
}

/// Selection before and after an operation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RangeUpdate {
    pub old: Option<RangePath>,
    pub new: Option<RangePath>,
}

impl RangeUpdate {
    #[must_use]
    pub fn new(old: Option<RangePath>, new: Option<RangePath>) -> Self {
        Self { old, new }
    }

    #[must_use]
    pub fn inverse(&self) -> Self {
        Self {
            old: self.new.clone(),
            new: self.old.clone(),
        }
    }
}

/// One replayable edit.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "type", rename_all = "kebab-case"))]
pub enum Change {
    /// Insert `content` at `path`.
    Insert { path: Path, content: Vec<Content> },
    /// Remove nodes matching `content` starting at `path`.
    Delete { path: Path, content: Vec<Content> },
    /// Set attributes of the node right after `path`.
    UpdateAttr { path: Path, attrs: Vec<AttrChange> },
    /// Move the host selection.
    UpdateRange(RangeUpdate),
}

impl Change {
    #[must_use]
    pub fn inverse(&self) -> Self {
        match self {
            Self::Insert { path, content } => Self::Delete {
                path: path.clone(),
                content: content.clone(),
            },
            Self::Delete { path, content } => Self::Insert {
                path: path.clone(),
                content: content.clone(),
            },
            Self::UpdateAttr { path, attrs } => Self::UpdateAttr {
                path: path.clone(),
                attrs: attrs.iter().map(AttrChange::inverse).collect(),
            },
            Self::UpdateRange(update) => Self::UpdateRange(update.inverse()),
        }
    }

    /// The path this change is addressed at, if any.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::Insert { path, .. } | Self::Delete { path, .. } | Self::UpdateAttr { path, .. } => {
                Some(path)
            }
            Self::UpdateRange(_) => None,
        }
    }

    /// Short name used in logs.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Insert { .. } => "insert",
            Self::Delete { .. } => "delete",
            Self::UpdateAttr { .. } => "update-attr",
            Self::UpdateRange(_) => "update-range",
        }
    }
}

/// Tags attached to a frame and carried into its change sets.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Meta {
    pub kind: Option<String>,
}

impl Meta {
    #[must_use]
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: Some(kind.into()),
        }
    }

    #[must_use]
    pub fn kind(&self) -> Option<&str> {
        self.kind.as_deref()
    }
}

/// When two consecutive change sets may be merged into one.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct CombineConfig {
    /// The older text must be shorter than this to accept more.
    pub max_chars: usize,
    /// Meta kinds the older change set may carry.
    pub leading_kinds: Vec<String>,
    /// Meta kinds the newer change set may carry.
    pub trailing_kinds: Vec<String>,
}

impl Default for CombineConfig {
    fn default() -> Self {
        Self {
            max_chars: 20,
            leading_kinds: vec!["typing".into(), "enter".into()],
            trailing_kinds: vec!["typing".into()],
        }
    }
}

impl CombineConfig {
    /// Never combine.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            max_chars: 0,
            leading_kinds: Vec::new(),
            trailing_kinds: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_max_chars(mut self, max_chars: usize) -> Self {
        self.max_chars = max_chars;
        self
    }

    fn accepts(kinds: &[String], meta: &Meta) -> bool {
        meta.kind()
            .is_some_and(|kind| kinds.iter().any(|k| k == kind))
    }
}

/// Changes of one operation plus its selection transition.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ChangeSet {
    pub meta: Meta,
    pub changes: Vec<Change>,
    pub selection: RangeUpdate,
}

impl ChangeSet {
    #[must_use]
    pub fn new(meta: Meta, changes: Vec<Change>, selection: RangeUpdate) -> Self {
        Self {
            meta,
            changes,
            selection,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Whether both selections are known and differ.
    #[must_use]
    pub fn moves_selection(&self) -> bool {
        let RangeUpdate { old, new } = &self.selection;
        old.is_some() && new.is_some() && old != new
    }

    /// No changes and no selection move: nothing to undo.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.is_empty() && !self.moves_selection()
    }

    /// Changes in reverse order, each inverted, with the selection swapped.
    #[must_use]
    pub fn inverse(&self) -> Self {
        Self {
            meta: self.meta.clone(),
            changes: self.changes.iter().rev().map(Change::inverse).collect(),
            selection: self.selection.inverse(),
        }
    }

    /// Merge `newer` into `self` when both are contiguous typing.
    ///
    /// ```text
    /// self:   insert "h" at p/#text@3     newer: insert "i" at p/#text@4
    /// result: insert "hi" at p/#text@3
    /// ```
    ///
    /// An older path ending in an element-level step is read as text offset
    /// 0 one level deeper, since a run that starts at a node boundary is
    /// addressed without a text step.
    #[must_use]
    pub fn combine(&self, newer: &ChangeSet, config: &CombineConfig) -> Option<ChangeSet> {
        if !CombineConfig::accepts(&config.leading_kinds, &self.meta)
            || !CombineConfig::accepts(&config.trailing_kinds, &newer.meta)
        {
            return None;
        }
        let ([old_change], [new_change]) = (self.changes.as_slice(), newer.changes.as_slice())
        else {
            return None;
        };
        let (
            Change::Insert {
                path: old_path,
                content: old_content,
            },
            Change::Insert {
                path: new_path,
                content: new_content,
            },
        ) = (old_change, new_change)
        else {
            return None;
        };
        let ([Content::Text(old_text)], [Content::Text(new_text)]) =
            (old_content.as_slice(), new_content.as_slice())
        else {
            return None;
        };
        let old_len = old_text.chars().count();
        if old_len >= config.max_chars {
            return None;
        }
        let (new_step, new_prefix) = new_path.split_last()?;
        if !new_step.is_text() {
            return None;
        }
        let old_step = old_path.last()?;
        let (old_offset, old_prefix): (usize, &[PathStep]) = if old_step.is_text() {
            (old_step.offset, &old_path[..old_path.len() - 1])
        } else {
            (0, old_path.as_slice())
        };
        if old_offset + old_len != new_step.offset || old_prefix != new_prefix {
            return None;
        }
        let mut merged = old_text.clone();
        merged.push_str(new_text);
        Some(ChangeSet {
            meta: self.meta.clone(),
            changes: vec![Change::Insert {
                path: old_path.clone(),
                content: vec![Content::Text(merged)],
            }],
            selection: RangeUpdate::new(self.selection.old.clone(), newer.selection.new.clone()),
        })
    }
}
