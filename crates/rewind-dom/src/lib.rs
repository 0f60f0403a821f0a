#![forbid(unsafe_code)]

//! Ordered element/text tree for the Rewind editing engine.
//!
//! `rewind-dom` is the tree platform the undo engine runs against:
//!
//! - [`Dom`]: an arena of elements and text nodes with stable [`NodeId`]s
//! - [`MutationRecord`]: synchronous mutation notifications per observer
//! - [`Boundary`] / [`Range`]: positions, and host-held live ranges
//! - [`preserve`]: split/join/insert/remove primitives that keep ranges valid
//! - [`normalize`]: child indices that treat adjacent text as one run
//! - [`markup`]: a tiny markup reader/writer for fixtures
//!
//! # Example
//!
//! ```
//! use rewind_dom::{markup, Dom};
//!
//! let mut dom = Dom::new();
//! let root = dom.create_element("div");
//! markup::set_inner_markup(&mut dom, root, "<p>hello</p>").unwrap();
//! let observer = dom.observe(root);
//! let p = dom.children(root)[0];
//! dom.set_attr(p, "class", "lead").unwrap();
//! assert_eq!(dom.take_records(observer).len(), 1);
//! assert_eq!(markup::inner_markup(&dom, root), r#"<p class="lead">hello</p>"#);
//! ```

pub mod boundary;
pub mod content;
pub mod dom;
pub mod markup;
pub mod mutation;
pub mod normalize;
pub mod preserve;

pub use boundary::{Boundary, Range};
pub use content::Content;
pub use dom::{AttrName, Dom, DomError, NodeId, NodeKind, TEXT_NODE_NAME};
pub use markup::MarkupError;
pub use mutation::{MutationRecord, ObserverId};
