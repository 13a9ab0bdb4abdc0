use std::time::{Duration, Instant};

use tracing::debug;

use super::{CaptureEvent, SelectionCapture, SelectionSnapshot};
use crate::dom::{Document, NodeId};
use crate::markers::{HOVERED_CLASS, is_injected_ui};
use crate::settings::SelectionMethod;

/// Snapshots the element under the pointer once it has rested for `delay`.
///
/// Each move restarts the wait, so a sweep across the page costs a single
/// lookup at the end. There is no real range: the snapshot carries the
/// element's text and `range: None`. The snapshotted element is marked with
/// [`HOVERED_CLASS`] until the pointer leaves it or capture is disabled.
#[derive(Debug)]
pub struct HoverCapture {
    enabled: bool,
    delay: Duration,
    pending: Option<(NodeId, Instant)>,
    snapshot: Option<SelectionSnapshot>,
    hovered: Option<NodeId>,
}

impl HoverCapture {
    pub fn new(delay: Duration) -> Self {
        Self {
            enabled: false,
            delay,
            pending: None,
            snapshot: None,
            hovered: None,
        }
    }

    /// The element currently carrying the hover mark
    pub fn hovered(&self) -> Option<NodeId> {
        self.hovered
    }

    fn unmark(&mut self, doc: &mut Document) {
        if let Some(element) = self.hovered.take()
            && let Err(err) = doc.remove_class(element, HOVERED_CLASS)
        {
            debug!(%err, "could not clear hover mark");
        }
    }
}

/// Remove the hover mark from every element of the document
fn clear_hover_marks(doc: &mut Document) {
    let root = doc.root();
    for node in doc.descendants(root) {
        if doc.has_class(node, HOVERED_CLASS) {
            let _ = doc.remove_class(node, HOVERED_CLASS);
        }
    }
}

impl SelectionCapture for HoverCapture {
    fn method(&self) -> SelectionMethod {
        SelectionMethod::Hover
    }

    fn enable(&mut self) {
        self.enabled = true;
    }

    fn disable(&mut self, doc: &mut Document) {
        self.enabled = false;
        self.pending = None;
        self.snapshot = None;
        self.hovered = None;
        clear_hover_marks(doc);
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn handle_event(&mut self, doc: &mut Document, event: &CaptureEvent) {
        if !self.enabled {
            return;
        }
        match *event {
            CaptureEvent::PointerMove { target, at } => {
                if self.hovered.is_some_and(|element| !doc.contains(element, target)) {
                    self.unmark(doc);
                }
                if !is_injected_ui(doc, target) {
                    self.pending = Some((target, at));
                }
            }
            CaptureEvent::Tick { at } => {
                let Some((target, since)) = self.pending else {
                    return;
                };
                if at.saturating_duration_since(since) < self.delay {
                    return;
                }
                self.pending = None;
                let Some(element) = doc.closest_element(target) else {
                    return;
                };
                self.snapshot =
                    SelectionSnapshot::new(&doc.text_content(element), None, element);
                if self.snapshot.is_some() && self.hovered != Some(element) {
                    self.unmark(doc);
                    match doc.add_class(element, HOVERED_CLASS) {
                        Ok(()) => self.hovered = Some(element),
                        Err(err) => debug!(%err, "could not mark hovered element"),
                    }
                }
            }
            CaptureEvent::PointerUp { .. } | CaptureEvent::SelectionChange { .. } => {}
        }
    }

    fn current_selection(&self) -> Option<SelectionSnapshot> {
        self.snapshot.clone()
    }

    fn reset(&mut self) {
        self.snapshot = None;
    }
}
