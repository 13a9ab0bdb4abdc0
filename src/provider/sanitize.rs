//! HTML fragment sanitizer for provider output
//!
//! The fragment goes through the same html5ever tree builder as page markup,
//! so filtering works on parsed elements and decoded attribute values rather
//! than on raw text. Elements that execute or embed foreign content are
//! dropped with their subtree, inline event handlers are removed, and so are
//! URL attributes with a script-capable scheme. Everything else passes
//! through and is re-serialized.

use crate::dom::{Document, NodeData};

const DANGEROUS_TAGS: &[&str] = &[
    "script", "style", "iframe", "frame", "object", "embed", "svg", "math", "base", "meta",
    "link",
];

const URL_ATTRIBUTES: &[&str] = &[
    "href",
    "src",
    "action",
    "formaction",
    "xlink:href",
    "poster",
    "background",
];

const BLOCKED_SCHEMES: &[&str] = &["javascript:", "vbscript:", "data:"];

/// Sanitize an HTML fragment before it is injected into a page
pub fn sanitize_html(html: &str) -> String {
    let mut doc = Document::new();
    let holder = doc.create_element("div");
    if doc.append_html(holder, html).is_err() {
        return String::new();
    }

    for node in doc.descendants(holder) {
        let Some(NodeData::Element(el)) = doc.data(node) else {
            continue;
        };
        if DANGEROUS_TAGS.contains(&el.tag.as_str()) {
            doc.remove(node);
            continue;
        }
        let rejected: Vec<String> = el
            .attributes
            .iter()
            .filter(|(name, value)| !attribute_allowed(name, value))
            .map(|(name, _)| name.clone())
            .collect();
        for name in rejected {
            doc.remove_attribute(node, &name);
        }
    }

    doc.inner_html(holder)
}

fn attribute_allowed(name: &str, value: &str) -> bool {
    let name = name.to_ascii_lowercase();
    if name.starts_with("on") {
        return false;
    }
    if URL_ATTRIBUTES.contains(&name.as_str()) {
        return !has_blocked_scheme(value);
    }
    true
}

/// Browsers ignore ASCII whitespace and control characters inside a scheme.
/// The value is already entity-decoded by the parser.
fn has_blocked_scheme(value: &str) -> bool {
    let compact: String = value
        .chars()
        .filter(|c| !c.is_ascii_whitespace() && !c.is_ascii_control())
        .collect::<String>()
        .to_ascii_lowercase();
    BLOCKED_SCHEMES
        .iter()
        .any(|scheme| compact.starts_with(scheme))
}
