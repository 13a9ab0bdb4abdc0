//! Ranges and boundary points
//!
//! A boundary is a `(node, offset)` pair: a child index for elements, a byte
//! offset for text. Boundaries are ordered by the child-index path from the
//! document root followed by the offset, which gives document order without
//! walking siblings.

use std::cmp::Ordering;

use super::{Document, NodeData, NodeId};
use crate::error::{DomError, DomResult};

/// One end of a [`Range`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Boundary {
    pub node: NodeId,
    pub offset: usize,
}

impl Boundary {
    pub fn new(node: NodeId, offset: usize) -> Self {
        Self { node, offset }
    }

    fn validate(&self, doc: &Document) -> DomResult<()> {
        let data = doc.data(self.node).ok_or(DomError::UnknownNode(self.node))?;
        if !doc.is_connected(self.node) {
            return Err(DomError::InvalidRange(format!(
                "{:?} is not connected",
                self.node
            )));
        }
        let length = doc.node_len(self.node);
        if self.offset > length {
            return Err(DomError::IndexSize {
                offset: self.offset,
                length,
            });
        }
        if let NodeData::Text(text) = data
            && !text.is_char_boundary(self.offset)
        {
            return Err(DomError::IndexSize {
                offset: self.offset,
                length,
            });
        }
        Ok(())
    }

    fn key(&self, doc: &Document) -> Option<Vec<usize>> {
        let mut key = doc.path(self.node)?;
        key.push(self.offset);
        Some(key)
    }
}

/// A contiguous span of the document between two boundaries
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Range {
    start: Boundary,
    end: Boundary,
}

impl Range {
    /// Build a range; boundaries given in reverse document order are swapped
    pub fn new(doc: &Document, start: Boundary, end: Boundary) -> DomResult<Self> {
        start.validate(doc)?;
        end.validate(doc)?;
        let (start, end) = match compare(doc, &start, &end) {
            Some(Ordering::Greater) => (end, start),
            _ => (start, end),
        };
        Ok(Range { start, end })
    }

    /// A range over every child of `node`
    pub fn select_contents(doc: &Document, node: NodeId) -> DomResult<Self> {
        Range::new(
            doc,
            Boundary::new(node, 0),
            Boundary::new(node, doc.node_len(node)),
        )
    }

    pub fn start(&self) -> Boundary {
        self.start
    }

    pub fn end(&self) -> Boundary {
        self.end
    }

    pub fn is_collapsed(&self) -> bool {
        self.start == self.end
    }

    pub fn collapse_to_end(&mut self) {
        self.start = self.end;
    }

    pub fn collapse_to_start(&mut self) {
        self.end = self.start;
    }

    /// Both boundaries are still connected and in bounds
    pub fn validate(&self, doc: &Document) -> DomResult<()> {
        self.start.validate(doc)?;
        self.end.validate(doc)
    }

    /// Deepest node containing both boundaries
    pub fn common_ancestor(&self, doc: &Document) -> Option<NodeId> {
        let start_chain: Vec<NodeId> = doc.ancestors(self.start.node).collect();
        doc.ancestors(self.end.node)
            .find(|node| start_chain.contains(node))
    }

    /// The selected text, in document order
    pub fn text(&self, doc: &Document) -> String {
        if self.start.node == self.end.node {
            return match doc.text(self.start.node) {
                Some(text) => text
                    .get(self.start.offset..self.end.offset)
                    .unwrap_or_default()
                    .to_string(),
                None => self.text_between(doc),
            };
        }
        self.text_between(doc)
    }

    fn text_between(&self, doc: &Document) -> String {
        let (Some(ancestor), Some(start_key), Some(end_key)) = (
            self.common_ancestor(doc),
            self.start.key(doc),
            self.end.key(doc),
        ) else {
            return String::new();
        };

        let mut out = String::new();
        for node in doc.descendants(ancestor) {
            let Some(text) = doc.text(node) else {
                continue;
            };
            let is_start = node == self.start.node;
            let is_end = node == self.end.node;
            let inside = match (
                Boundary::new(node, 0).key(doc),
                Boundary::new(node, text.len()).key(doc),
            ) {
                (Some(first), Some(last)) => first >= start_key && last <= end_key,
                _ => false,
            };
            if !(is_start || is_end || inside) {
                continue;
            }
            let from = if is_start { self.start.offset } else { 0 };
            let to = if is_end { self.end.offset } else { text.len() };
            out.push_str(text.get(from..to).unwrap_or_default());
        }
        out
    }

    /// Remove the selected content and collapse to the start.
    ///
    /// Nodes wholly inside the range are detached; text nodes cut by a
    /// boundary are truncated; elements cut by a boundary are kept.
    pub fn delete_contents(&mut self, doc: &mut Document) -> DomResult<()> {
        self.validate(doc)?;

        if self.start.node == self.end.node {
            let node = self.start.node;
            if let Some(text) = doc.text(node) {
                let mut remaining = text[..self.start.offset].to_string();
                remaining.push_str(&text[self.end.offset..]);
                doc.set_text(node, remaining)?;
            } else {
                let doomed = doc.children(node)[self.start.offset..self.end.offset].to_vec();
                for child in doomed {
                    doc.remove(child);
                }
            }
            self.collapse_to_start();
            return Ok(());
        }

        let ancestor = self
            .common_ancestor(doc)
            .ok_or_else(|| DomError::InvalidRange("no common ancestor".to_string()))?;
        let (Some(start_key), Some(end_key), Some(ancestor_path)) =
            (self.start.key(doc), self.end.key(doc), doc.path(ancestor))
        else {
            return Err(DomError::InvalidRange("range is detached".to_string()));
        };

        let mut doomed = Vec::new();
        collect_contained(doc, ancestor, ancestor_path, &start_key, &end_key, &mut doomed);
        for node in doomed {
            doc.remove(node);
        }

        if let Some(text) = doc.text(self.start.node) {
            let head = text[..self.start.offset].to_string();
            doc.set_text(self.start.node, head)?;
        }
        if let Some(text) = doc.text(self.end.node) {
            let tail = text[self.end.offset..].to_string();
            doc.set_text(self.end.node, tail)?;
        }

        self.collapse_to_start();
        Ok(())
    }

    /// Insert `node` at the start of the range.
    ///
    /// A text boundary in the middle of a text node splits it. Block-level
    /// elements are refused where only phrasing content may go.
    pub fn insert_node(&self, doc: &mut Document, node: NodeId) -> DomResult<()> {
        self.validate(doc)?;
        let at = self.start;
        match doc.data(at.node) {
            Some(NodeData::Text(text)) => {
                let length = text.len();
                let parent = doc.parent(at.node).ok_or_else(|| {
                    DomError::HierarchyRequest("text node has no parent".to_string())
                })?;
                check_content_model(doc, parent, node)?;
                if at.offset == 0 {
                    doc.insert_before(parent, node, Some(at.node))
                } else if at.offset == length {
                    let reference = doc.next_sibling(at.node);
                    doc.insert_before(parent, node, reference)
                } else {
                    let tail = doc.split_text(at.node, at.offset)?;
                    doc.insert_before(parent, node, Some(tail))
                }
            }
            Some(NodeData::Element(_)) => {
                check_content_model(doc, at.node, node)?;
                let reference = doc.children(at.node).get(at.offset).copied();
                doc.insert_before(at.node, node, reference)
            }
            Some(NodeData::Document) | Some(NodeData::Markup(_)) => Err(
                DomError::HierarchyRequest(format!("cannot insert into {:?}", at.node)),
            ),
            None => Err(DomError::UnknownNode(at.node)),
        }
    }
}

fn compare(doc: &Document, a: &Boundary, b: &Boundary) -> Option<Ordering> {
    Some(a.key(doc)?.cmp(&b.key(doc)?))
}

fn check_content_model(doc: &Document, parent: NodeId, child: NodeId) -> DomResult<()> {
    let is_block = doc.is_element(child) && !doc.computed_display(child).is_inline_level();
    if is_block && !doc.accepts_block_content(parent) {
        return Err(DomError::HierarchyRequest(format!(
            "<{}> cannot be placed inside <{}>",
            doc.tag(child).unwrap_or_default(),
            doc.tag(parent).unwrap_or_default()
        )));
    }
    Ok(())
}

/// Collect the topmost descendants of `node` lying wholly between the keys.
fn collect_contained(
    doc: &Document,
    node: NodeId,
    path: Vec<usize>,
    start_key: &[usize],
    end_key: &[usize],
    out: &mut Vec<NodeId>,
) {
    for (index, &child) in doc.children(node).iter().enumerate() {
        let mut before = path.clone();
        before.push(index);
        let mut after = path.clone();
        after.push(index + 1);

        if before.as_slice() >= start_key && after.as_slice() <= end_key {
            out.push(child);
        } else if after.as_slice() > start_key && before.as_slice() < end_key {
            collect_contained(doc, child, before, start_key, end_key, out);
        }
    }
}
