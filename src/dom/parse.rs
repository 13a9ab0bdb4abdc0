//! HTML fragment parsing through html5ever.
//!
//! The fragment is parsed in the context of the element it is appended to,
//! so the HTML5 tree builder repairs unclosed and misnested tags the way a
//! browser does. The resulting rcdom is then copied into the arena.
//! Comments, doctypes and processing instructions are dropped.

use html5ever::driver::ParseOpts;
use html5ever::tendril::TendrilSink;
use html5ever::{LocalName, Namespace, QualName, parse_fragment};
use markup5ever_rcdom::{Handle, NodeData as RcNodeData, RcDom};

use super::{Document, NodeId};
use crate::error::DomResult;

const HTML_NAMESPACE: &str = "http://www.w3.org/1999/xhtml";

pub(super) fn parse_into(doc: &mut Document, parent: NodeId, markup: &str) -> DomResult<()> {
    let context = doc.tag(parent).unwrap_or("body").to_string();
    let dom = parse_fragment(
        RcDom::default(),
        ParseOpts::default(),
        QualName::new(None, Namespace::from(HTML_NAMESPACE), LocalName::from(context.as_str())),
        Vec::new(),
    )
    .one(markup);

    // Fragment parsing wraps the nodes in a synthetic <html> element.
    let roots = dom.document.children.borrow().clone();
    for root in roots {
        if let RcNodeData::Element { .. } = root.data {
            let children = root.children.borrow().clone();
            for child in &children {
                copy_node(doc, parent, child)?;
            }
        }
    }
    Ok(())
}

fn copy_node(doc: &mut Document, parent: NodeId, handle: &Handle) -> DomResult<()> {
    match &handle.data {
        RcNodeData::Text { contents } => {
            let text = doc.create_text(contents.borrow().to_string());
            doc.append_child(parent, text)?;
        }
        RcNodeData::Element {
            name,
            attrs,
            template_contents,
            ..
        } => {
            let element = doc.create_element(&name.local);
            for attr in attrs.borrow().iter() {
                let key = match &attr.name.prefix {
                    Some(prefix) => format!("{}:{}", prefix, attr.name.local),
                    None => attr.name.local.to_string(),
                };
                doc.set_attribute(element, &key, &attr.value)?;
            }
            doc.append_child(parent, element)?;

            let children = match template_contents.borrow().as_ref() {
                Some(contents) => contents.children.borrow().clone(),
                None => handle.children.borrow().clone(),
            };
            for child in &children {
                copy_node(doc, element, child)?;
            }
        }
        RcNodeData::Document
        | RcNodeData::Doctype { .. }
        | RcNodeData::Comment { .. }
        | RcNodeData::ProcessingInstruction { .. } => {}
    }
    Ok(())
}
