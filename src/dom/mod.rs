//! Arena-backed document model
//!
//! The translator never holds on to page nodes directly: everything is
//! addressed through [`NodeId`] handles into a [`Document`] arena. Detached
//! nodes stay in the arena with no parent, so a stale handle is never
//! dangling, it is merely disconnected.
//!
//! The model carries just enough of the browser DOM for selection anchoring
//! and result injection: elements with ordered attributes, text, opaque
//! markup fragments, a computed `display` value and a live selection.

mod parse;
pub mod range;

pub use range::{Boundary, Range};

use crate::error::{DomError, DomResult};

/// Handle to a node inside a [`Document`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

/// Payload of a node
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeData {
    /// The document root; it only ever holds `<body>`
    Document,
    Element(ElementData),
    Text(String),
    /// A sanitized HTML fragment, serialized verbatim
    Markup(String),
}

/// Tag name and attributes of an element
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementData {
    /// Lowercase tag name
    pub tag: String,
    /// Attributes in insertion order
    pub attributes: Vec<(String, String)>,
}

#[derive(Debug, Clone)]
struct Node {
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    data: NodeData,
}

/// Computed CSS `display` of an element
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Display {
    Inline,
    InlineBlock,
    InlineFlex,
    Block,
    Flex,
    ListItem,
    TableCell,
    None,
}

impl Display {
    /// Parse a CSS `display` keyword
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "inline" => Some(Display::Inline),
            "inline-block" => Some(Display::InlineBlock),
            "inline-flex" => Some(Display::InlineFlex),
            "block" => Some(Display::Block),
            "flex" => Some(Display::Flex),
            "list-item" => Some(Display::ListItem),
            "table-cell" => Some(Display::TableCell),
            "none" => Some(Display::None),
            _ => None,
        }
    }

    /// Whether the box participates in an inline formatting context
    pub fn is_inline_level(self) -> bool {
        matches!(
            self,
            Display::Inline | Display::InlineBlock | Display::InlineFlex
        )
    }
}

/// Tags that render inline unless a style says otherwise
const INLINE_TAGS: &[&str] = &[
    "a", "abbr", "b", "bdi", "bdo", "br", "button", "cite", "code", "data", "dfn", "em", "i",
    "img", "input", "kbd", "label", "mark", "q", "s", "samp", "select", "small", "span",
    "strong", "sub", "sup", "textarea", "time", "u", "var",
];

/// Block elements whose content model only admits phrasing content
const PHRASING_ONLY_TAGS: &[&str] = &["p", "h1", "h2", "h3", "h4", "h5", "h6"];

/// Elements that never have children
pub const VOID_TAGS: &[&str] = &[
    "area", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "wbr",
];

/// A document: the node arena, the `<body>` element and the live selection
#[derive(Debug, Clone)]
pub struct Document {
    nodes: Vec<Node>,
    root: NodeId,
    body: NodeId,
    selection: Option<Range>,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    /// Create an empty document with a `<body>`
    pub fn new() -> Self {
        let mut doc = Document {
            nodes: vec![Node {
                parent: None,
                children: Vec::new(),
                data: NodeData::Document,
            }],
            root: NodeId(0),
            body: NodeId(0),
            selection: None,
        };
        let body = doc.create_element("body");
        doc.nodes[body.0].parent = Some(doc.root);
        doc.nodes[doc.root.0].children.push(body);
        doc.body = body;
        doc
    }

    /// Create a document whose `<body>` holds the given markup
    pub fn from_body_html(markup: &str) -> DomResult<Self> {
        let mut doc = Document::new();
        let body = doc.body;
        doc.append_html(body, markup)?;
        Ok(doc)
    }

    /// Parse markup and append the resulting nodes to `parent`
    pub fn append_html(&mut self, parent: NodeId, markup: &str) -> DomResult<()> {
        parse::parse_into(self, parent, markup)
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn body(&self) -> NodeId {
        self.body
    }

    fn node(&self, id: NodeId) -> DomResult<&Node> {
        self.nodes.get(id.0).ok_or(DomError::UnknownNode(id))
    }

    fn node_mut(&mut self, id: NodeId) -> DomResult<&mut Node> {
        self.nodes.get_mut(id.0).ok_or(DomError::UnknownNode(id))
    }

    fn push(&mut self, data: NodeData) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            parent: None,
            children: Vec::new(),
            data,
        });
        id
    }

    /// Create a detached element
    pub fn create_element(&mut self, tag: &str) -> NodeId {
        self.push(NodeData::Element(ElementData {
            tag: tag.to_ascii_lowercase(),
            attributes: Vec::new(),
        }))
    }

    /// Create a detached text node
    pub fn create_text(&mut self, text: impl Into<String>) -> NodeId {
        self.push(NodeData::Text(text.into()))
    }

    /// Create a detached markup fragment. The caller vouches that it is sanitized.
    pub fn create_markup(&mut self, markup: impl Into<String>) -> NodeId {
        self.push(NodeData::Markup(markup.into()))
    }

    pub fn data(&self, id: NodeId) -> Option<&NodeData> {
        self.nodes.get(id.0).map(|n| &n.data)
    }

    /// Lowercase tag name, `None` for non-elements
    pub fn tag(&self, id: NodeId) -> Option<&str> {
        match self.data(id) {
            Some(NodeData::Element(el)) => Some(el.tag.as_str()),
            _ => None,
        }
    }

    pub fn is_element(&self, id: NodeId) -> bool {
        matches!(self.data(id), Some(NodeData::Element(_)))
    }

    pub fn is_text(&self, id: NodeId) -> bool {
        matches!(self.data(id), Some(NodeData::Text(_)))
    }

    /// Content of a text node
    pub fn text(&self, id: NodeId) -> Option<&str> {
        match self.data(id) {
            Some(NodeData::Text(text)) => Some(text.as_str()),
            _ => None,
        }
    }

    pub fn set_text(&mut self, id: NodeId, text: impl Into<String>) -> DomResult<()> {
        match &mut self.node_mut(id)?.data {
            NodeData::Text(current) => {
                *current = text.into();
                Ok(())
            }
            _ => Err(DomError::HierarchyRequest(format!(
                "{id:?} is not a text node"
            ))),
        }
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes.get(id.0).and_then(|n| n.parent)
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.nodes
            .get(id.0)
            .map(|n| n.children.as_slice())
            .unwrap_or(&[])
    }

    pub fn index_in_parent(&self, id: NodeId) -> Option<usize> {
        let parent = self.parent(id)?;
        self.children(parent).iter().position(|&c| c == id)
    }

    pub fn next_sibling(&self, id: NodeId) -> Option<NodeId> {
        let parent = self.parent(id)?;
        let index = self.index_in_parent(id)?;
        self.children(parent).get(index + 1).copied()
    }

    /// Range-offset length: bytes for text, child count otherwise
    pub fn node_len(&self, id: NodeId) -> usize {
        match self.data(id) {
            Some(NodeData::Text(text)) => text.len(),
            Some(NodeData::Markup(_)) | None => 0,
            Some(_) => self.children(id).len(),
        }
    }

    pub fn attribute(&self, id: NodeId, name: &str) -> Option<&str> {
        match self.data(id) {
            Some(NodeData::Element(el)) => el
                .attributes
                .iter()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.as_str()),
            _ => None,
        }
    }

    pub fn set_attribute(&mut self, id: NodeId, name: &str, value: &str) -> DomResult<()> {
        match &mut self.node_mut(id)?.data {
            NodeData::Element(el) => {
                let name = name.to_ascii_lowercase();
                match el.attributes.iter_mut().find(|(k, _)| *k == name) {
                    Some((_, v)) => *v = value.to_string(),
                    None => el.attributes.push((name, value.to_string())),
                }
                Ok(())
            }
            _ => Err(DomError::HierarchyRequest(format!(
                "cannot set attribute on non-element {id:?}"
            ))),
        }
    }

    pub fn remove_attribute(&mut self, id: NodeId, name: &str) {
        if let Ok(Node {
            data: NodeData::Element(el),
            ..
        }) = self.node_mut(id)
        {
            el.attributes.retain(|(k, _)| k != name);
        }
    }

    pub fn has_class(&self, id: NodeId, class: &str) -> bool {
        self.attribute(id, "class")
            .is_some_and(|classes| classes.split_whitespace().any(|c| c == class))
    }

    pub fn add_class(&mut self, id: NodeId, class: &str) -> DomResult<()> {
        if self.has_class(id, class) {
            return Ok(());
        }
        let classes = match self.attribute(id, "class") {
            Some(existing) if !existing.trim().is_empty() => format!("{existing} {class}"),
            _ => class.to_string(),
        };
        self.set_attribute(id, "class", &classes)
    }

    pub fn remove_class(&mut self, id: NodeId, class: &str) -> DomResult<()> {
        let Some(existing) = self.attribute(id, "class") else {
            return Ok(());
        };
        let remaining = existing
            .split_whitespace()
            .filter(|c| *c != class)
            .collect::<Vec<_>>()
            .join(" ");
        if remaining.is_empty() {
            self.remove_attribute(id, "class");
            return Ok(());
        }
        self.set_attribute(id, "class", &remaining)
    }

    /// The node and its ancestors, innermost first
    pub fn ancestors(&self, id: NodeId) -> Ancestors<'_> {
        Ancestors {
            doc: self,
            next: self.nodes.get(id.0).map(|_| id),
        }
    }

    /// The node itself if it is an element, otherwise its nearest element ancestor
    pub fn closest_element(&self, id: NodeId) -> Option<NodeId> {
        self.ancestors(id).find(|&n| self.is_element(n))
    }

    /// Inclusive ancestry test
    pub fn contains(&self, ancestor: NodeId, node: NodeId) -> bool {
        self.ancestors(node).any(|n| n == ancestor)
    }

    /// Whether the node is reachable from the document root
    pub fn is_connected(&self, id: NodeId) -> bool {
        self.ancestors(id).last() == Some(self.root)
    }

    /// Child-index path from the root, `None` for detached nodes
    pub fn path(&self, id: NodeId) -> Option<Vec<usize>> {
        let mut path = Vec::new();
        let mut current = id;
        while let Some(parent) = self.parent(current) {
            path.push(self.index_in_parent(current)?);
            current = parent;
        }
        if current != self.root {
            return None;
        }
        path.reverse();
        Some(path)
    }

    /// Descendants in document order, excluding the node itself
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.children(id).iter().rev().copied().collect();
        while let Some(next) = stack.pop() {
            out.push(next);
            stack.extend(self.children(next).iter().rev().copied());
        }
        out
    }

    /// Connected elements carrying `name="value"`, in document order
    pub fn find_by_attribute(&self, name: &str, value: &str) -> Vec<NodeId> {
        self.descendants(self.root)
            .into_iter()
            .filter(|&n| self.attribute(n, name) == Some(value))
            .collect()
    }

    /// Concatenated text of all descendant text nodes
    pub fn text_content(&self, id: NodeId) -> String {
        if let Some(text) = self.text(id) {
            return text.to_string();
        }
        self.descendants(id)
            .into_iter()
            .filter_map(|n| self.text(n))
            .collect()
    }

    /// Computed `display`: an inline `style` declaration wins over the tag default
    pub fn computed_display(&self, id: NodeId) -> Display {
        let Some(tag) = self.tag(id) else {
            return Display::Inline;
        };
        let declared = self.attribute(id, "style").and_then(|style| {
            style.split(';').rev().find_map(|decl| {
                let (prop, value) = decl.split_once(':')?;
                if prop.trim().eq_ignore_ascii_case("display") {
                    Display::parse(value)
                } else {
                    None
                }
            })
        });
        if let Some(display) = declared {
            return display;
        }
        match tag {
            "li" => Display::ListItem,
            "td" | "th" => Display::TableCell,
            t if INLINE_TAGS.contains(&t) => Display::Inline,
            _ => Display::Block,
        }
    }

    /// Whether a block-level element may be placed directly inside `parent`
    pub fn accepts_block_content(&self, parent: NodeId) -> bool {
        match self.tag(parent) {
            Some(tag) if PHRASING_ONLY_TAGS.contains(&tag) => false,
            Some(_) => !self.computed_display(parent).is_inline_level(),
            None => false,
        }
    }

    fn check_insert(&self, parent: NodeId, child: NodeId) -> DomResult<()> {
        self.node(child)?;
        match &self.node(parent)?.data {
            NodeData::Element(_) => {}
            NodeData::Document => {
                return Err(DomError::HierarchyRequest(
                    "the document root only holds <body>".to_string(),
                ));
            }
            NodeData::Text(_) | NodeData::Markup(_) => {
                return Err(DomError::HierarchyRequest(format!(
                    "{parent:?} cannot have children"
                )));
            }
        }
        if matches!(self.node(child)?.data, NodeData::Document) {
            return Err(DomError::HierarchyRequest(
                "the document root cannot be inserted".to_string(),
            ));
        }
        if self.contains(child, parent) {
            return Err(DomError::HierarchyRequest(format!(
                "inserting {child:?} into {parent:?} would create a cycle"
            )));
        }
        Ok(())
    }

    /// Insert `child` into `parent` before `reference`, or at the end when `None`
    pub fn insert_before(
        &mut self,
        parent: NodeId,
        child: NodeId,
        reference: Option<NodeId>,
    ) -> DomResult<()> {
        self.check_insert(parent, child)?;
        if let Some(reference) = reference {
            if self.parent(reference) != Some(parent) {
                return Err(DomError::HierarchyRequest(format!(
                    "{reference:?} is not a child of {parent:?}"
                )));
            }
            if reference == child {
                return Ok(());
            }
        }
        self.remove(child);
        let index = match reference {
            Some(reference) => self
                .children(parent)
                .iter()
                .position(|&c| c == reference)
                .unwrap_or(self.children(parent).len()),
            None => self.children(parent).len(),
        };
        self.node_mut(parent)?.children.insert(index, child);
        self.node_mut(child)?.parent = Some(parent);
        Ok(())
    }

    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> DomResult<()> {
        self.insert_before(parent, child, None)
    }

    /// Insert `new` as the next sibling of `node`
    pub fn insert_after(&mut self, node: NodeId, new: NodeId) -> DomResult<()> {
        let parent = self.parent(node).ok_or_else(|| {
            DomError::HierarchyRequest(format!("{node:?} has no parent"))
        })?;
        let reference = self.next_sibling(node);
        self.insert_before(parent, new, reference)
    }

    /// Detach a node (and its subtree) from its parent
    pub fn remove(&mut self, id: NodeId) {
        let Some(parent) = self.parent(id) else {
            return;
        };
        if let Some(node) = self.nodes.get_mut(parent.0) {
            node.children.retain(|&c| c != id);
        }
        if let Some(node) = self.nodes.get_mut(id.0) {
            node.parent = None;
        }
    }

    pub fn remove_children(&mut self, id: NodeId) {
        for child in self.children(id).to_vec() {
            self.remove(child);
        }
    }

    /// Split a text node at a byte offset; the tail becomes the next sibling
    pub fn split_text(&mut self, id: NodeId, offset: usize) -> DomResult<NodeId> {
        let text = self
            .text(id)
            .ok_or_else(|| DomError::HierarchyRequest(format!("{id:?} is not a text node")))?;
        if offset > text.len() || !text.is_char_boundary(offset) {
            return Err(DomError::IndexSize {
                offset,
                length: text.len(),
            });
        }
        let parent = self
            .parent(id)
            .ok_or_else(|| DomError::HierarchyRequest(format!("{id:?} has no parent")))?;
        let head = text[..offset].to_string();
        let tail = text[offset..].to_string();
        self.set_text(id, head)?;
        let tail = self.create_text(tail);
        let reference = self.next_sibling(id);
        self.insert_before(parent, tail, reference)?;
        Ok(tail)
    }

    /// Range over the first occurrence of `needle` inside a single text node
    pub fn find_text(&self, needle: &str) -> Option<Range> {
        if needle.is_empty() {
            return None;
        }
        self.descendants(self.root).into_iter().find_map(|n| {
            let start = self.text(n)?.find(needle)?;
            Range::new(
                self,
                Boundary::new(n, start),
                Boundary::new(n, start + needle.len()),
            )
            .ok()
        })
    }

    pub fn selection(&self) -> Option<&Range> {
        self.selection.as_ref()
    }

    pub fn set_selection(&mut self, range: Range) {
        self.selection = Some(range);
    }

    pub fn clear_selection(&mut self) {
        self.selection = None;
    }

    /// Serialize a node and its subtree
    pub fn to_html(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.write_html(id, &mut out);
        out
    }

    /// Serialize the children of a node
    pub fn inner_html(&self, id: NodeId) -> String {
        let mut out = String::new();
        for &child in self.children(id) {
            self.write_html(child, &mut out);
        }
        out
    }

    fn write_html(&self, id: NodeId, out: &mut String) {
        match self.data(id) {
            Some(NodeData::Document) => {
                for &child in self.children(id) {
                    self.write_html(child, out);
                }
            }
            Some(NodeData::Element(el)) => {
                out.push('<');
                out.push_str(&el.tag);
                for (name, value) in &el.attributes {
                    out.push(' ');
                    out.push_str(name);
                    out.push_str("=\"");
                    out.push_str(&escape(value, true));
                    out.push('"');
                }
                out.push('>');
                if VOID_TAGS.contains(&el.tag.as_str()) {
                    return;
                }
                for &child in self.children(id) {
                    self.write_html(child, out);
                }
                out.push_str("</");
                out.push_str(&el.tag);
                out.push('>');
            }
            Some(NodeData::Text(text)) => out.push_str(&escape(text, false)),
            Some(NodeData::Markup(markup)) => out.push_str(markup),
            None => {}
        }
    }
}

fn escape(value: &str, attribute: bool) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' if attribute => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

/// Iterator over a node and its ancestors
#[derive(Debug)]
pub struct Ancestors<'a> {
    doc: &'a Document,
    next: Option<NodeId>,
}

impl Iterator for Ancestors<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let current = self.next?;
        self.next = self.doc.parent(current);
        Some(current)
    }
}
