#![forbid(unsafe_code)]

//! Change generator.
//!
//! Walks a sorted record tree depth-first and emits [`Change`]s whose
//! paths are computed against the current tree. Records nested in a
//! deleted node are emitted before that node's delete, prefixed with the
//! path the node will have once the delete is inverted.

use rewind_dom::normalize;
use rewind_dom::{Content, Dom, NodeId};

use crate::change::{AttrChange, Change};
use crate::path::{self, Path, PathError, PathStep};
use crate::record::{CompoundDelete, DeleteRecord, Record};

struct Generator<'a> {
    dom: &'a Dom,
    out: Vec<Change>,
}

fn prefixed(prefix: &[PathStep], path: Path) -> Path {
    if prefix.is_empty() {
        return path;
    }
    let mut full = prefix.to_vec();
    full.extend(path);
    full
}

/// Content of a deleted node as it was before the edit.
fn reconstruct(dom: &Dom, member: &DeleteRecord) -> Content {
    if dom.is_text(member.node) {
        let text = match &member.old_text {
            Some(old) => old.clone(),
            None => dom.text(member.node).unwrap_or_default().to_owned(),
        };
        return Content::Text(text);
    }
    let mut content = dom.snapshot(member.node);
    if let Some(attrs) = content.attrs_mut() {
        for (name, old) in &member.old_attrs {
            match old {
                Some(value) => {
                    attrs.insert(name.clone(), value.clone());
                }
                None => {
                    attrs.remove(name);
                }
            }
        }
    }
    content
}

impl Generator<'_> {
    fn level(
        &mut self,
        container: NodeId,
        prefix: &[PathStep],
        records: &[Record],
    ) -> Result<(), PathError> {
        let dom = self.dom;
        let mut last_insert: Option<NodeId> = None;
        for record in records {
            match record {
                Record::Insert { node, .. } => {
                    let content = dom.snapshot(*node);
                    let follows_last =
                        last_insert.is_some() && dom.prev_sibling(*node) == last_insert;
                    if follows_last
                        && let Some(Change::Insert { content: run, .. }) = self.out.last_mut()
                    {
                        run.push(content);
                    } else {
                        let path = prefixed(prefix, path::path_before_node(dom, container, *node)?);
                        self.out.push(Change::Insert {
                            path,
                            content: vec![content],
                        });
                    }
                    last_insert = Some(*node);
                    continue;
                }
                Record::Delete(compound) => self.delete(container, prefix, compound)?,
                Record::UpdateAttr { node, attrs, .. } => {
                    let changes: Vec<AttrChange> = attrs
                        .iter()
                        .filter_map(|(name, old)| {
                            let new = dom.attr(*node, name).map(str::to_owned);
                            (new != *old).then(|| AttrChange {
                                name: name.clone(),
                                old: old.clone(),
                                new,
                            })
                        })
                        .collect();
                    if !changes.is_empty() {
                        let path = prefixed(prefix, path::path_before_node(dom, container, *node)?);
                        self.out.push(Change::UpdateAttr {
                            path,
                            attrs: changes,
                        });
                    }
                }
                Record::UpdateText { node, old, .. } => {
                    let new = dom.text(*node).unwrap_or_default();
                    if new != old.as_str() {
                        let path = prefixed(prefix, path::path_before_node(dom, container, *node)?);
                        if !old.is_empty() {
                            self.out.push(Change::Delete {
                                path: path.clone(),
                                content: vec![Content::text(old.clone())],
                            });
                        }
                        if !new.is_empty() {
                            self.out.push(Change::Insert {
                                path,
                                content: vec![Content::text(new)],
                            });
                        }
                    }
                }
            }
            last_insert = None;
        }
        Ok(())
    }

    fn delete(
        &mut self,
        container: NodeId,
        prefix: &[PathStep],
        compound: &CompoundDelete,
    ) -> Result<(), PathError> {
        let dom = self.dom;
        let at = compound.boundary(dom);
        let path = prefixed(prefix, path::path_from_boundary(dom, container, at)?);
        let content: Vec<Content> = compound
            .members
            .iter()
            .map(|m| reconstruct(dom, m))
            .collect();

        if compound.members.iter().any(|m| !m.contained.is_empty()) {
            // Each member gets the index it will have once re-inserted, so
            // text members merging into a preceding run count as nothing.
            let mut base = prefixed(prefix, path::incomplete_path_from_boundary(dom, container, at)?);
            let (mut next_index, mut in_text) =
                normalize::normalized_units_before(dom, at.container, at.offset);
            for (member, restored) in compound.members.iter().zip(&content) {
                let index = match restored {
                    Content::Text(text) => {
                        if !text.is_empty() && !in_text {
                            next_index += 1;
                            in_text = true;
                        }
                        None
                    }
                    Content::Element { .. } => {
                        let index = next_index;
                        next_index += 1;
                        in_text = false;
                        Some(index)
                    }
                };
                if let (Some(index), Some(step)) = (index, base.last_mut())
                    && !member.contained.is_empty()
                {
                    step.offset = index;
                    self.level(member.node, &base, &member.contained)?;
                }
            }
        }

        self.out.push(Change::Delete { path, content });
        Ok(())
    }
}

/// Changes for a sorted record tree rooted at `container`.
pub(crate) fn generate_changes(
    dom: &Dom,
    container: NodeId,
    tree: &[Record],
) -> Result<Vec<Change>, PathError> {
    let mut generator = Generator {
        dom,
        out: Vec::new(),
    };
    generator.level(container, &[], tree)?;
    Ok(generator.out)
}
