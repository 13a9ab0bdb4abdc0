//! Translator session
//!
//! One session per document. It owns the anchor registry, the active capture
//! strategy and the live result containers, and turns a selection snapshot
//! into a mounted container plus a [`PendingTranslation`] that streams the
//! provider's answer into it.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::anchor::AnchorRegistry;
use crate::capture::{self, CaptureEvent, KeyEvent, SelectionCapture, SelectionSnapshot};
use crate::container::{ContainerHandle, ContainerState, ResultContainer, SharedDocument, pump};
use crate::dom::{Document, NodeId};
use crate::error::SettingsResult;
use crate::markers::{CONTAINER_CLASS, CONTAINER_FOR_ATTR, DISMISS_CLASS, is_injected_ui};
use crate::planner::InsertionPlanner;
use crate::provider::{
    CompletionProvider, StreamMessage, TranslationRequest, from_messages, sanitized,
};
use crate::settings::{SelectionMethod, Settings, SettingsStore};

pub struct TranslatorSession {
    doc: SharedDocument,
    registry: AnchorRegistry,
    planner: InsertionPlanner,
    settings: Settings,
    provider: Arc<dyn CompletionProvider>,
    capture: Box<dyn SelectionCapture>,
    containers: HashMap<String, ContainerHandle>,
    /// Last element the user selected or hovered
    selected_element: Option<NodeId>,
}

impl TranslatorSession {
    pub fn new(doc: Document, settings: Settings, provider: Arc<dyn CompletionProvider>) -> Self {
        let capture = capture::for_method(&settings);
        Self {
            doc: Rc::new(RefCell::new(doc)),
            registry: AnchorRegistry::new(),
            planner: InsertionPlanner::new(),
            settings,
            provider,
            capture,
            containers: HashMap::new(),
            selected_element: None,
        }
    }

    /// Create a session with settings read from `store`
    pub async fn from_store(
        doc: Document,
        store: &dyn SettingsStore,
        provider: Arc<dyn CompletionProvider>,
    ) -> SettingsResult<Self> {
        let settings = store.load().await?;
        Ok(Self::new(doc, settings, provider))
    }

    /// Re-read settings; the capture strategy is rebuilt when the method changes
    pub async fn reload_settings(&mut self, store: &dyn SettingsStore) -> SettingsResult<()> {
        let settings = store.load().await?;
        if settings.selection_method != self.settings.selection_method
            || settings.hover_delay_ms != self.settings.hover_delay_ms
        {
            self.capture.disable(&mut self.doc.borrow_mut());
            self.capture = capture::for_method(&settings);
        }
        self.settings = settings;
        debug!(settings = ?self.settings, "settings reloaded");
        Ok(())
    }

    pub fn document(&self) -> SharedDocument {
        Rc::clone(&self.doc)
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn capture(&self) -> &dyn SelectionCapture {
        self.capture.as_ref()
    }

    pub fn container(&self, anchor_id: &str) -> Option<ContainerHandle> {
        self.containers.get(anchor_id).cloned()
    }

    pub fn current_selection(&self) -> Option<SelectionSnapshot> {
        self.capture.current_selection()
    }

    /// Forward an input event to the capture strategy
    pub fn handle_event(&mut self, event: &CaptureEvent) {
        let mut doc = self.doc.borrow_mut();
        self.capture.handle_event(&mut doc, event);
        if let Some(snapshot) = self.capture.current_selection() {
            self.selected_element = doc.closest_element(snapshot.source_element);
        }
    }

    /// Dispatch a key press: the translate shortcut fires on a page
    /// snapshot, the editable shortcut on a snapshot from editable content,
    /// and the hover shortcut toggles hover capture.
    pub fn handle_key(&mut self, event: &KeyEvent) -> Option<PendingTranslation> {
        if let Some(target) = event.target
            && is_injected_ui(&self.doc.borrow(), target)
        {
            return None;
        }
        if self.settings.translate_shortcut.matches(event) {
            let snapshot = self.capture.current_selection().filter(|s| !s.editable)?;
            return self.trigger_translate(snapshot);
        }
        if self.settings.editable_shortcut.matches(event) {
            let snapshot = self.capture.current_selection().filter(|s| s.editable)?;
            return self.trigger_translate(snapshot);
        }
        if self.settings.hover_shortcut.matches(event) {
            self.toggle_hover();
        }
        None
    }

    fn toggle_hover(&mut self) {
        if self.capture.method() != SelectionMethod::Hover {
            debug!("hover shortcut ignored; selection method is not hover");
            return;
        }
        let enabled = self.capture.toggle(&mut self.doc.borrow_mut());
        info!(hover = if enabled { "ON" } else { "OFF" }, "hover capture toggled");
    }

    /// Handle a click; a click on a dismiss control dismisses its container.
    /// Returns whether a container was dismissed.
    pub fn handle_click(&mut self, target: NodeId) -> bool {
        let anchor_id = {
            let doc = self.doc.borrow();
            let on_dismiss = doc
                .ancestors(target)
                .any(|n| doc.has_class(n, DISMISS_CLASS));
            if !on_dismiss {
                return false;
            }
            doc.ancestors(target)
                .find(|&n| doc.has_class(n, CONTAINER_CLASS))
                .and_then(|n| doc.attribute(n, CONTAINER_FOR_ATTR))
                .map(str::to_string)
        };
        anchor_id.is_some_and(|id| self.dismiss(&id))
    }

    /// Unmount the container bound to `anchor_id`. The request in flight is
    /// not cancelled; its remaining messages are dropped.
    pub fn dismiss(&mut self, anchor_id: &str) -> bool {
        let Some(handle) = self.containers.remove(anchor_id) else {
            return false;
        };
        handle.borrow_mut().dismiss(&mut self.doc.borrow_mut());
        info!(anchor = %anchor_id, "translation dismissed");
        true
    }

    /// Resolve, plan and insert a container for `snapshot`.
    ///
    /// Everything up to and including the insertion happens here, with no
    /// suspension point, so a previous container for the same anchor is
    /// always gone before the new one appears. The returned future streams
    /// the answer. `None` means there was nothing to translate or nowhere to
    /// put the result.
    pub fn trigger_translate(&mut self, snapshot: SelectionSnapshot) -> Option<PendingTranslation> {
        let text = snapshot.text.trim();
        if text.is_empty() {
            return None;
        }
        let request = TranslationRequest::new(
            text,
            self.settings.target_language_for(snapshot.editable),
            self.settings.output_format,
        );

        let mut doc = self.doc.borrow_mut();
        let fallback = [Some(snapshot.source_element), self.selected_element]
            .into_iter()
            .flatten()
            .find(|&n| doc.is_connected(n));
        let anchor = self
            .registry
            .resolve(&mut doc, snapshot.range.as_ref(), fallback);

        if let Some(previous) = self.containers.remove(&anchor.id) {
            previous.borrow_mut().dismiss(&mut doc);
        }

        let plan = self
            .planner
            .plan(&doc, &snapshot, &anchor, self.settings.display_mode);
        let container = match ResultContainer::mount(
            &mut doc,
            &anchor.id,
            plan.shape,
            self.settings.output_format,
        ) {
            Ok(container) => container,
            Err(err) => {
                warn!(anchor = %anchor.id, %err, "could not build result container");
                return None;
            }
        };
        let placement = match self
            .planner
            .execute(&mut doc, &plan, container.node(), self.selected_element)
        {
            Ok(placement) => placement,
            Err(err) => {
                warn!(anchor = %anchor.id, %err, "could not insert result container");
                return None;
            }
        };
        drop(doc);

        info!(
            anchor = %anchor.id,
            strategy = ?plan.strategy,
            ?placement,
            provider = self.provider.provider_name(),
            "translating selection"
        );

        self.capture.reset();
        let handle = Rc::new(RefCell::new(container));
        self.containers
            .insert(anchor.id.clone(), Rc::clone(&handle));

        Some(PendingTranslation {
            doc: Rc::clone(&self.doc),
            container: handle,
            provider: Arc::clone(&self.provider),
            request,
        })
    }
}

/// A mounted container waiting for its completion stream
#[must_use = "a pending translation does nothing until it is run"]
pub struct PendingTranslation {
    doc: SharedDocument,
    container: ContainerHandle,
    provider: Arc<dyn CompletionProvider>,
    request: TranslationRequest,
}

impl PendingTranslation {
    pub fn anchor_id(&self) -> String {
        self.container.borrow().anchor_id().to_string()
    }

    pub fn container(&self) -> ContainerHandle {
        Rc::clone(&self.container)
    }

    /// Request the completion and stream it into the container.
    ///
    /// A provider failure is shown in the container; it is never retried.
    pub async fn run(self) -> ContainerState {
        let stream = match self.provider.translate(&self.request).await {
            Ok(stream) => sanitized(stream, self.request.output_format),
            Err(err) => {
                warn!(provider = self.provider.provider_name(), %err, "translation request failed");
                from_messages(vec![StreamMessage::Error(err.to_string())])
            }
        };
        pump(self.doc, self.container, stream).await
    }
}
