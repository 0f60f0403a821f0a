#![forbid(unsafe_code)]

//! Detached value copies of subtrees.
//!
//! [`Content`] is what change records carry instead of live node handles:
//! it owns its data, compares structurally, and can be re-instantiated in
//! any [`Dom`](crate::Dom).

use std::collections::BTreeMap;
use std::fmt;

use crate::dom::{AttrName, TEXT_NODE_NAME};

/// A value snapshot of an element or text node.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Content {
    Element {
        name: String,
        #[cfg_attr(feature = "serde", serde(with = "attr_list"))]
        attrs: BTreeMap<AttrName, String>,
        children: Vec<Content>,
    },
    Text(String),
}

/// Attributes travel as a list of pairs since their keys are structs.
#[cfg(feature = "serde")]
mod attr_list {
    use std::collections::BTreeMap;

    use serde::{Deserialize, Deserializer, Serializer};

    use crate::dom::AttrName;

    pub fn serialize<S: Serializer>(
        attrs: &BTreeMap<AttrName, String>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(attrs.iter())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<BTreeMap<AttrName, String>, D::Error> {
        let pairs = Vec::<(AttrName, String)>::deserialize(deserializer)?;
        Ok(pairs.into_iter().collect())
    }
}

impl Content {
    /// Empty element.
    #[must_use]
    pub fn element(name: impl Into<String>) -> Self {
        Self::Element {
            name: name.into(),
            attrs: BTreeMap::new(),
            children: Vec::new(),
        }
    }

    #[must_use]
    pub fn text(data: impl Into<String>) -> Self {
        Self::Text(data.into())
    }

    /// Builder: add an attribute. Ignored on text content.
    #[must_use]
    pub fn with_attr(mut self, name: impl Into<AttrName>, value: impl Into<String>) -> Self {
        if let Self::Element { attrs, .. } = &mut self {
            attrs.insert(name.into(), value.into());
        }
        self
    }

    /// Builder: append a child. Ignored on text content.
    #[must_use]
    pub fn with_child(mut self, child: Content) -> Self {
        if let Self::Element { children, .. } = &mut self {
            children.push(child);
        }
        self
    }

    /// Element name, or `#text`.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Element { name, .. } => name,
            Self::Text(_) => TEXT_NODE_NAME,
        }
    }

    #[must_use]
    pub fn is_text(&self) -> bool {
        matches!(self, Self::Text(_))
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(data) => Some(data),
            Self::Element { .. } => None,
        }
    }

    /// Character count of text content; 0 for elements.
    #[must_use]
    pub fn text_len(&self) -> usize {
        self.as_text().map_or(0, |s| s.chars().count())
    }

    #[must_use]
    pub fn children(&self) -> &[Content] {
        match self {
            Self::Element { children, .. } => children,
            Self::Text(_) => &[],
        }
    }

    pub fn attrs_mut(&mut self) -> Option<&mut BTreeMap<AttrName, String>> {
        match self {
            Self::Element { attrs, .. } => Some(attrs),
            Self::Text(_) => None,
        }
    }
}

impl fmt::Display for Content {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&crate::markup::content_markup(self))
    }
}
