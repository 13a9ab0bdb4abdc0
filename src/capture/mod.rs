//! Selection capture strategies
//!
//! Three interchangeable strategies observe user input and produce a
//! [`SelectionSnapshot`]: pointer drag, hover and editable regions. They
//! share the [`SelectionCapture`] capability and are picked by
//! configuration with [`for_method`]; none of them depends on another.
//!
//! Every strategy ignores events that originate inside translator-injected
//! UI, so clicking a result never re-triggers a translation.

mod editable;
mod hover;
mod pointer;

pub use editable::{EditableCapture, editable_root};
pub use hover::HoverCapture;
pub use pointer::PointerDragCapture;

use std::fmt;
use std::time::{Duration, Instant};

use crate::dom::{Document, NodeId, Range};
use crate::settings::{SelectionMethod, Settings};

/// What the user wants translated, as seen at capture time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionSnapshot {
    /// Trimmed, never empty
    pub text: String,
    /// `None` for synthetic selections such as hover
    pub range: Option<Range>,
    /// Node under the pointer or selection when captured
    pub source_element: NodeId,
    /// Captured inside editable content; the result is written back in place
    pub editable: bool,
}

impl SelectionSnapshot {
    /// Build a snapshot; `None` when the text is blank
    pub fn new(text: &str, range: Option<Range>, source_element: NodeId) -> Option<Self> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }
        Some(Self {
            text: text.to_string(),
            range,
            source_element,
            editable: false,
        })
    }

    pub fn editable(mut self) -> Self {
        self.editable = true;
        self
    }
}

/// Input events relevant to selection capture
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureEvent {
    PointerUp { target: NodeId },
    PointerMove { target: NodeId, at: Instant },
    /// The live selection changed (keyboard selection, select-all, ...)
    SelectionChange { target: NodeId },
    /// Timer tick driving debounced strategies
    Tick { at: Instant },
}

/// A key press as delivered by the host page
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct KeyEvent {
    pub key: String,
    pub ctrl: bool,
    pub alt: bool,
    pub shift: bool,
    pub meta: bool,
    pub target: Option<NodeId>,
}

/// Capability shared by all capture strategies
pub trait SelectionCapture: fmt::Debug {
    fn method(&self) -> SelectionMethod;

    fn enable(&mut self);

    /// Stop observing, forget any pending snapshot and take back any marks
    /// left on the page
    fn disable(&mut self, doc: &mut Document);

    fn is_enabled(&self) -> bool;

    /// Flip the strategy on or off; returns the new state
    fn toggle(&mut self, doc: &mut Document) -> bool {
        if self.is_enabled() {
            self.disable(doc);
        } else {
            self.enable();
        }
        self.is_enabled()
    }

    /// Observe one input event; ignored while disabled
    fn handle_event(&mut self, doc: &mut Document, event: &CaptureEvent);

    /// The latest qualifying selection, if any
    fn current_selection(&self) -> Option<SelectionSnapshot>;

    /// Drop the current snapshot once it has been acted on
    fn reset(&mut self);
}

/// The capture strategy configured in `settings`.
///
/// Pointer and editable capture start enabled; hover capture starts
/// disabled and is switched on by its shortcut.
pub fn for_method(settings: &Settings) -> Box<dyn SelectionCapture> {
    match settings.selection_method {
        SelectionMethod::Pointer => Box::new(PointerDragCapture::new()),
        SelectionMethod::Hover => Box::new(HoverCapture::new(Duration::from_millis(
            settings.hover_delay_ms,
        ))),
        SelectionMethod::Editable => Box::new(EditableCapture::new()),
    }
}

/// Snapshot of the live selection, unless it is collapsed or inside injected UI
fn live_selection(doc: &Document, target: NodeId) -> Option<SelectionSnapshot> {
    let range = doc.selection().filter(|range| !range.is_collapsed())?;
    if crate::markers::is_injected_ui(doc, range.start().node) {
        return None;
    }
    SelectionSnapshot::new(&range.text(doc), Some(range.clone()), target)
}
