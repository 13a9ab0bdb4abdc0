use super::{CaptureEvent, SelectionCapture, SelectionSnapshot, live_selection};
use crate::dom::Document;
use crate::markers::is_injected_ui;
use crate::settings::SelectionMethod;

/// Snapshots the live selection when a pointer drag ends
#[derive(Debug)]
pub struct PointerDragCapture {
    enabled: bool,
    snapshot: Option<SelectionSnapshot>,
}

impl PointerDragCapture {
    pub fn new() -> Self {
        Self {
            enabled: true,
            snapshot: None,
        }
    }
}

impl Default for PointerDragCapture {
    fn default() -> Self {
        Self::new()
    }
}

impl SelectionCapture for PointerDragCapture {
    fn method(&self) -> SelectionMethod {
        SelectionMethod::Pointer
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
        if let CaptureEvent::PointerUp { target } = *event {
            if is_injected_ui(doc, target) {
                return;
            }
            self.snapshot = live_selection(doc, target);
        }
    }

    fn current_selection(&self) -> Option<SelectionSnapshot> {
        self.snapshot.clone()
    }

    fn reset(&mut self) {
        self.snapshot = None;
    }
}
