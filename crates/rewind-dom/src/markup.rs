#![forbid(unsafe_code)]

//! Minimal markup reader and writer.
//!
//! Enough to build fixtures and print trees:
//!
//! - elements with double- or single-quoted attributes, and `<x/>`;
//! - text, with the `&lt;`, `&gt;`, `&amp;` and `&quot;` entities.
//!
//! Comments, doctypes and void elements are not recognized. Elements
//! always print with an explicit closing tag (`<b></b>`).

use std::fmt;

use crate::content::Content;
use crate::dom::{AttrName, Dom, DomError, NodeId, NodeKind};

/// Failure while reading markup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarkupError {
    UnexpectedEnd { position: usize },
    UnexpectedChar { position: usize, found: char },
    MismatchedClose {
        position: usize,
        expected: Option<String>,
        found: String,
    },
    Unclosed { name: String },
    Dom(DomError),
}

impl fmt::Display for MarkupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnexpectedEnd { position } => write!(f, "unexpected end of markup at {position}"),
            Self::UnexpectedChar { position, found } => {
                write!(f, "unexpected {found:?} at {position}")
            }
            Self::MismatchedClose {
                position,
                expected: Some(expected),
                found,
            } => write!(f, "closing </{found}> at {position} does not match <{expected}>"),
            Self::MismatchedClose {
                position, found, ..
            } => write!(f, "closing </{found}> at {position} has no open element"),
            Self::Unclosed { name } => write!(f, "element <{name}> is never closed"),
            Self::Dom(err) => write!(f, "tree error: {err}"),
        }
    }
}

impl std::error::Error for MarkupError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Dom(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DomError> for MarkupError {
    fn from(err: DomError) -> Self {
        Self::Dom(err)
    }
}

// ============================================================================
// Reading
// ============================================================================

struct Reader<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Reader<'a> {
    fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn starts_with(&self, s: &str) -> bool {
        self.src[self.pos..].starts_with(s)
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.bump();
        }
    }

    fn expect(&mut self, want: char) -> Result<(), MarkupError> {
        match self.bump() {
            Some(c) if c == want => Ok(()),
            Some(found) => Err(MarkupError::UnexpectedChar {
                position: self.pos - found.len_utf8(),
                found,
            }),
            None => Err(MarkupError::UnexpectedEnd { position: self.pos }),
        }
    }

    fn name(&mut self) -> Result<&'a str, MarkupError> {
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|c| c.is_alphanumeric() || matches!(c, '-' | '_' | ':' | '.'))
        {
            self.bump();
        }
        if start == self.pos {
            return match self.peek() {
                Some(found) => Err(MarkupError::UnexpectedChar {
                    position: self.pos,
                    found,
                }),
                None => Err(MarkupError::UnexpectedEnd { position: self.pos }),
            };
        }
        Ok(&self.src[start..self.pos])
    }

    fn until(&mut self, stop: char) -> Result<&'a str, MarkupError> {
        let start = self.pos;
        loop {
            match self.peek() {
                Some(c) if c == stop => return Ok(&self.src[start..self.pos]),
                Some(_) => {
                    self.bump();
                }
                None => return Err(MarkupError::UnexpectedEnd { position: self.pos }),
            }
        }
    }
}

fn decode_entities(raw: &str) -> String {
    raw.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&amp;", "&")
}

/// Parse `markup` into detached nodes and return the top-level ones.
pub fn parse_fragment(dom: &mut Dom, markup: &str) -> Result<Vec<NodeId>, MarkupError> {
    let mut reader = Reader { src: markup, pos: 0 };
    let mut top = Vec::new();
    let mut open: Vec<(NodeId, String)> = Vec::new();

    while reader.peek().is_some() {
        let node = if reader.starts_with("</") {
            let position = reader.pos;
            reader.pos += 2;
            let name = reader.name()?.to_owned();
            reader.skip_whitespace();
            reader.expect('>')?;
            match open.pop() {
                Some((_, expected)) if expected == name => continue,
                other => {
                    return Err(MarkupError::MismatchedClose {
                        position,
                        expected: other.map(|(_, n)| n),
                        found: name,
                    });
                }
            }
        } else if reader.starts_with("<") {
            reader.bump();
            let name = reader.name()?.to_owned();
            let element = dom.create_element(name.clone());
            let self_closing = loop {
                reader.skip_whitespace();
                if reader.starts_with("/>") {
                    reader.pos += 2;
                    break true;
                }
                if reader.starts_with(">") {
                    reader.bump();
                    break false;
                }
                let attr = reader.name()?.to_owned();
                reader.skip_whitespace();
                let value = if reader.peek() == Some('=') {
                    reader.bump();
                    reader.skip_whitespace();
                    let quote = match reader.bump() {
                        Some(q @ ('"' | '\'')) => q,
                        Some(found) => {
                            return Err(MarkupError::UnexpectedChar {
                                position: reader.pos - found.len_utf8(),
                                found,
                            });
                        }
                        None => return Err(MarkupError::UnexpectedEnd { position: reader.pos }),
                    };
                    let raw = reader.until(quote)?;
                    reader.bump();
                    decode_entities(raw)
                } else {
                    String::new()
                };
                dom.set_attr(element, AttrName::new(attr), value)?;
            };
            attach(dom, &open, &mut top, element)?;
            if !self_closing {
                open.push((element, name));
            }
            continue;
        } else {
            let start = reader.pos;
            while reader.peek().is_some_and(|c| c != '<') {
                reader.bump();
            }
            dom.create_text(decode_entities(&markup[start..reader.pos]))
        };
        attach(dom, &open, &mut top, node)?;
    }

    if let Some((_, name)) = open.pop() {
        return Err(MarkupError::Unclosed { name });
    }
    Ok(top)
}

fn attach(
    dom: &mut Dom,
    open: &[(NodeId, String)],
    top: &mut Vec<NodeId>,
    node: NodeId,
) -> Result<(), DomError> {
    match open.last() {
        Some(&(parent, _)) => dom.append_child(parent, node),
        None => {
            top.push(node);
            Ok(())
        }
    }
}

/// Replace the children of `elem` with parsed markup.
pub fn set_inner_markup(dom: &mut Dom, elem: NodeId, markup: &str) -> Result<(), MarkupError> {
    let nodes = parse_fragment(dom, markup)?;
    let old: Vec<NodeId> = dom.children(elem).to_vec();
    for child in old {
        dom.remove_child(elem, child)?;
    }
    for node in nodes {
        dom.append_child(elem, node)?;
    }
    Ok(())
}

// ============================================================================
// Writing
// ============================================================================

fn escape_text(s: &str, out: &mut String) {
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
}

fn escape_attr(s: &str, out: &mut String) {
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '<' => out.push_str("&lt;"),
            _ => out.push(c),
        }
    }
}

fn write_open<'a>(
    name: &str,
    attrs: impl Iterator<Item = (&'a AttrName, &'a str)>,
    out: &mut String,
) {
    out.push('<');
    out.push_str(name);
    for (key, value) in attrs {
        out.push(' ');
        if let Some(ns) = &key.namespace {
            out.push_str(ns);
            out.push(':');
        }
        out.push_str(&key.local);
        out.push_str("=\"");
        escape_attr(value, out);
        out.push('"');
    }
    out.push('>');
}

fn write_node(dom: &Dom, node: NodeId, out: &mut String) {
    match dom.kind(node) {
        NodeKind::Text { data } => escape_text(data, out),
        NodeKind::Element { name, attrs } => {
            write_open(name, attrs.iter().map(|(k, v)| (k, v.as_str())), out);
            for &child in dom.children(node) {
                write_node(dom, child, out);
            }
            out.push_str("</");
            out.push_str(name);
            out.push('>');
        }
    }
}

/// Markup of the children of `node`.
#[must_use]
pub fn inner_markup(dom: &Dom, node: NodeId) -> String {
    let mut out = String::new();
    for &child in dom.children(node) {
        write_node(dom, child, &mut out);
    }
    out
}

/// Markup of `node` itself.
#[must_use]
pub fn outer_markup(dom: &Dom, node: NodeId) -> String {
    let mut out = String::new();
    write_node(dom, node, &mut out);
    out
}

/// Markup of a detached value copy.
#[must_use]
pub fn content_markup(content: &Content) -> String {
    fn write(content: &Content, out: &mut String) {
        match content {
            Content::Text(data) => escape_text(data, out),
            Content::Element {
                name,
                attrs,
                children,
            } => {
                write_open(name, attrs.iter().map(|(k, v)| (k, v.as_str())), out);
                for child in children {
                    write(child, out);
                }
                out.push_str("</");
                out.push_str(name);
                out.push('>');
            }
        }
    }
    let mut out = String::new();
    write(content, &mut out);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_nested_markup() {
        let mut dom = Dom::new();
        let root = dom.create_element("div");
        let src = r#"<p class="a">one &amp; <b>two</b></p>tail<br></br>"#;
        set_inner_markup(&mut dom, root, src).unwrap();
        assert_eq!(inner_markup(&dom, root), src);
        assert_eq!(dom.children(root).len(), 3);
    }

    #[test]
    fn test_self_closing_and_single_quotes() {
        let mut dom = Dom::new();
        let nodes = parse_fragment(&mut dom, "<img src='x.png'/>after").unwrap();
        assert_eq!(nodes.len(), 2);
        assert_eq!(outer_markup(&dom, nodes[0]), r#"<img src="x.png"></img>"#);
        assert_eq!(dom.text(nodes[1]), Some("after"));
    }

    #[test]
    fn test_mismatched_close_is_reported() {
        let mut dom = Dom::new();
        let err = parse_fragment(&mut dom, "<p><b></p>").unwrap_err();
        assert!(matches!(err, MarkupError::MismatchedClose { .. }));
        let err = parse_fragment(&mut dom, "<p>").unwrap_err();
        assert_eq!(err, MarkupError::Unclosed { name: "p".into() });
    }

    #[test]
    fn test_content_markup_matches_tree_markup() {
        let mut dom = Dom::new();
        let nodes = parse_fragment(&mut dom, r#"<i title="&quot;q&quot;">x &lt; y</i>"#).unwrap();
        let content = dom.snapshot(nodes[0]);
        assert_eq!(content_markup(&content), outer_markup(&dom, nodes[0]));
    }
}
