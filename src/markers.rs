//! Class names and attributes identifying injected nodes
//!
//! Everything the translator adds to a page carries a class with the
//! `__translator_` prefix, so capture strategies can ignore events that
//! originate from our own UI.

use crate::dom::{Document, NodeId};

/// Prefix shared by every injected class name
pub const CLASS_PREFIX: &str = "__translator_";

/// Class of the result container
pub const CONTAINER_CLASS: &str = "__translator_translate_container__";

/// Modifier classes reflecting the container state
pub const LOADING_CLASS: &str = "__translator_translate_container__--loading";
pub const ERROR_CLASS: &str = "__translator_translate_container__--error";

/// Class of the inner node holding translated content
pub const CONTENT_CLASS: &str = "__translator_translate_content__";

/// Class of the dismiss control revealed once a stream ends
pub const DISMISS_CLASS: &str = "__translator_dismiss__";

/// Class of the extension's own selection menu
pub const MENU_CLASS: &str = "__translator_menu__";

/// Mark on the page element hover capture is pointing at. It decorates page
/// content, so it does not make that content injected UI.
pub const HOVERED_CLASS: &str = "__translator_hovered_element__";

/// Attribute stamped on anchored page elements
pub const ANCHOR_ATTR: &str = "data-translator-anchor-id";

/// Attribute binding a result container to its anchor id
pub const CONTAINER_FOR_ATTR: &str = "data-translator-container-for";

/// Whether the node sits inside translator-injected UI
pub fn is_injected_ui(doc: &Document, node: NodeId) -> bool {
    doc.ancestors(node).any(|n| {
        doc.attribute(n, "class").is_some_and(|classes| {
            classes
                .split_whitespace()
                .any(|class| class.starts_with(CLASS_PREFIX) && class != HOVERED_CLASS)
        })
    })
}
