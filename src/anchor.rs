//! Anchor resolution
//!
//! An anchor names the page element a translation belongs to. The id is
//! minted once per element and stamped on it as an attribute, so a later
//! action on the same region finds the same id and reuses the same slot
//! instead of stacking another result next to the first one.

use tracing::debug;

use crate::dom::{Document, NodeId, Range};
use crate::markers::ANCHOR_ATTR;

/// Id shared by every selection that resolves to no element at all.
///
/// Two orphan selections therefore collide on one slot; this mirrors the
/// long-standing behavior and is flagged in DESIGN.md rather than fixed.
pub const ORPHAN_ANCHOR_ID: &str = "translator-anchor-orphan";

/// A logical re-insertion point on the page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Anchor {
    pub id: String,
    /// Back-reference only; `None` for orphan anchors
    pub element: Option<NodeId>,
}

impl Anchor {
    pub fn is_orphan(&self) -> bool {
        self.element.is_none()
    }
}

/// Mints and recognizes anchor ids for one content-script session
#[derive(Debug, Default)]
pub struct AnchorRegistry {
    next_id: u64,
}

impl AnchorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve the anchor for a selection.
    ///
    /// With a range, the anchor is the common ancestor (or its parent element
    /// when that is a text node). Without one, `fallback` is used: the element
    /// last hovered or selected.
    pub fn resolve(
        &mut self,
        doc: &mut Document,
        range: Option<&Range>,
        fallback: Option<NodeId>,
    ) -> Anchor {
        let view: &Document = doc;
        let candidate = range
            .and_then(|r| r.common_ancestor(view))
            .or(fallback)
            .and_then(|node| view.closest_element(node));

        match candidate {
            Some(element) => Anchor {
                id: self.id_for(doc, element),
                element: Some(element),
            },
            None => {
                debug!("selection resolved to no element; using orphan anchor");
                Anchor {
                    id: ORPHAN_ANCHOR_ID.to_string(),
                    element: None,
                }
            }
        }
    }

    /// The anchor id of `element`, stamping a fresh one on first use
    pub fn id_for(&mut self, doc: &mut Document, element: NodeId) -> String {
        if let Some(existing) = doc.attribute(element, ANCHOR_ATTR) {
            return existing.to_string();
        }
        self.next_id += 1;
        let id = format!("translator-anchor-{}", self.next_id);
        if let Err(err) = doc.set_attribute(element, ANCHOR_ATTR, &id) {
            debug!(%err, "could not stamp anchor id");
            return ORPHAN_ANCHOR_ID.to_string();
        }
        debug!(anchor = %id, "minted anchor");
        id
    }
}
