use super::{CaptureEvent, SelectionCapture, SelectionSnapshot, live_selection};
use crate::dom::{Document, NodeId};
use crate::markers::is_injected_ui;
use crate::settings::SelectionMethod;

/// Nearest ancestor (inclusive) with `contenteditable` switched on
pub fn editable_root(doc: &Document, node: NodeId) -> Option<NodeId> {
    doc.ancestors(node).find(|&n| {
        doc.attribute(n, "contenteditable").is_some_and(|value| {
            matches!(
                value.trim().to_ascii_lowercase().as_str(),
                "" | "true" | "plaintext-only"
            )
        })
    })
}

/// Snapshots selections made inside editable content.
///
/// The snapshot is flagged `editable`, which makes the planner write the
/// result back over the selection instead of inserting it alongside.
#[derive(Debug)]
pub struct EditableCapture {
    enabled: bool,
    snapshot: Option<SelectionSnapshot>,
}

impl EditableCapture {
    pub fn new() -> Self {
        Self {
            enabled: true,
            snapshot: None,
        }
    }
}

impl Default for EditableCapture {
    fn default() -> Self {
        Self::new()
    }
}

impl SelectionCapture for EditableCapture {
    fn method(&self) -> SelectionMethod {
        SelectionMethod::Editable
    }

    fn enable(&mut self) {
        self.enabled = true;
    }

    fn disable(&mut self, _doc: &mut Document) {
        self.enabled = false;
        self.snapshot = None;
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn handle_event(&mut self, doc: &mut Document, event: &CaptureEvent) {
        if !self.enabled {
            return;
        }
        let target = match *event {
            CaptureEvent::PointerUp { target } | CaptureEvent::SelectionChange { target } => target,
            CaptureEvent::PointerMove { .. } | CaptureEvent::Tick { .. } => return,
        };
        if is_injected_ui(doc, target) {
            return;
        }
        let Some(root) = editable_root(doc, target) else {
            self.snapshot = None;
            return;
        };
        self.snapshot = live_selection(doc, target)
            .filter(|snapshot| {
                snapshot.range.as_ref().is_some_and(|range| {
                    doc.contains(root, range.start().node) && doc.contains(root, range.end().node)
                })
            })
            .map(SelectionSnapshot::editable);
    }

    fn current_selection(&self) -> Option<SelectionSnapshot> {
        self.snapshot.clone()
    }

    fn reset(&mut self) {
        self.snapshot = None;
    }
}
