//! Result container lifecycle
//!
//! A container is the injected node that shows the streamed translation for
//! one anchor. It moves `Loading -> Streaming -> Succeeded | Failed` as
//! messages arrive, and can be dismissed at any point. Each `Message`
//! replaces the displayed content.
//!
//! The container owns the sending half of a cancellation channel; [`pump`]
//! holds the receiving half, so dismissal drops the stream subscription and
//! anything delivered afterwards never reaches the document.

use std::cell::RefCell;
use std::rc::Rc;

use futures::StreamExt;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::dom::{Document, NodeId};
use crate::error::DomResult;
use crate::markers::{
    CONTAINER_CLASS, CONTAINER_FOR_ATTR, CONTENT_CLASS, DISMISS_CLASS, ERROR_CLASS, LOADING_CLASS,
};
use crate::planner::ContainerShape;
use crate::provider::{CompletionStream, StreamMessage};
use crate::settings::OutputFormat;

/// Document shared between the session and in-flight translations
pub type SharedDocument = Rc<RefCell<Document>>;

/// Shared handle to a mounted container
pub type ContainerHandle = Rc<RefCell<ResultContainer>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerState {
    Loading,
    Streaming,
    Succeeded,
    Failed,
    Dismissed,
}

impl ContainerState {
    /// No further content updates are accepted
    pub fn is_final(self) -> bool {
        matches!(
            self,
            ContainerState::Succeeded | ContainerState::Failed | ContainerState::Dismissed
        )
    }
}

#[derive(Debug)]
pub struct ResultContainer {
    anchor_id: String,
    node: NodeId,
    content: NodeId,
    dismiss_control: NodeId,
    shape: ContainerShape,
    format: OutputFormat,
    state: ContainerState,
    cancel: Option<oneshot::Sender<()>>,
    cancelled: Option<oneshot::Receiver<()>>,
}

impl ResultContainer {
    /// Build the container subtree, detached and in the loading state.
    ///
    /// The planner decides where it goes.
    pub fn mount(
        doc: &mut Document,
        anchor_id: &str,
        shape: ContainerShape,
        format: OutputFormat,
    ) -> DomResult<Self> {
        let node = doc.create_element(shape.tag());
        doc.add_class(node, CONTAINER_CLASS)?;
        doc.add_class(node, LOADING_CLASS)?;
        doc.set_attribute(node, CONTAINER_FOR_ATTR, anchor_id)?;

        let content = doc.create_element(shape.tag());
        doc.add_class(content, CONTENT_CLASS)?;
        doc.append_child(node, content)?;

        let dismiss_control = doc.create_element("button");
        doc.add_class(dismiss_control, DISMISS_CLASS)?;
        doc.set_attribute(dismiss_control, "type", "button")?;
        doc.set_attribute(dismiss_control, "hidden", "")?;
        let label = doc.create_text("×");
        doc.append_child(dismiss_control, label)?;
        doc.append_child(node, dismiss_control)?;

        let (cancel, cancelled) = oneshot::channel();
        Ok(Self {
            anchor_id: anchor_id.to_string(),
            node,
            content,
            dismiss_control,
            shape,
            format,
            state: ContainerState::Loading,
            cancel: Some(cancel),
            cancelled: Some(cancelled),
        })
    }

    pub fn anchor_id(&self) -> &str {
        &self.anchor_id
    }

    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn dismiss_control(&self) -> NodeId {
        self.dismiss_control
    }

    pub fn shape(&self) -> ContainerShape {
        self.shape
    }

    pub fn state(&self) -> ContainerState {
        self.state
    }

    /// Displayed text, as the user would read it
    pub fn text(&self, doc: &Document) -> String {
        doc.text_content(self.content)
    }

    /// The cancellation receiver; handed out once, to the single subscriber
    pub fn subscribe(&mut self) -> Option<oneshot::Receiver<()>> {
        self.cancelled.take()
    }

    /// Render one stream message.
    ///
    /// Returns whether the document changed. Messages arriving after a final
    /// state, or once the node has left the document, are dropped.
    pub fn apply(&mut self, doc: &mut Document, message: &StreamMessage) -> DomResult<bool> {
        if self.state.is_final() || !doc.is_connected(self.node) {
            return Ok(false);
        }
        match message {
            StreamMessage::Message(text) => {
                let rendered = match self.format {
                    OutputFormat::Text => doc.create_text(text.as_str()),
                    OutputFormat::Html => doc.create_markup(text.as_str()),
                };
                self.replace_content(doc, rendered)?;
                doc.remove_class(self.node, LOADING_CLASS)?;
                self.state = ContainerState::Streaming;
            }
            StreamMessage::Error(text) => {
                let rendered = doc.create_text(text.as_str());
                self.replace_content(doc, rendered)?;
                doc.remove_class(self.node, LOADING_CLASS)?;
                doc.add_class(self.node, ERROR_CLASS)?;
                doc.remove_attribute(self.dismiss_control, "hidden");
                self.state = ContainerState::Failed;
            }
            StreamMessage::End => {
                doc.remove_class(self.node, LOADING_CLASS)?;
                doc.remove_attribute(self.dismiss_control, "hidden");
                self.state = ContainerState::Succeeded;
            }
        }
        Ok(true)
    }

    fn replace_content(&self, doc: &mut Document, rendered: NodeId) -> DomResult<()> {
        doc.remove_children(self.content);
        doc.append_child(self.content, rendered)
    }

    /// Unmount and unsubscribe. The anchored element is left as it is.
    pub fn dismiss(&mut self, doc: &mut Document) {
        if self.state == ContainerState::Dismissed {
            return;
        }
        doc.remove(self.node);
        self.state = ContainerState::Dismissed;
        if let Some(cancel) = self.cancel.take() {
            // The receiver is gone when the stream already finished.
            let _ = cancel.send(());
        }
        debug!(anchor = %self.anchor_id, "container dismissed");
    }
}

/// Feed a completion stream into a container until it ends or is dismissed.
///
/// Messages are applied strictly in arrival order. A stream that closes
/// without `End` or `Error` is treated as finished. Document borrows are
/// released before every await.
pub async fn pump(
    doc: SharedDocument,
    container: ContainerHandle,
    mut stream: CompletionStream,
) -> ContainerState {
    let subscription = container.borrow_mut().subscribe();
    let Some(mut cancelled) = subscription else {
        warn!("container already has a subscriber");
        return container.borrow().state();
    };

    loop {
        let next = tokio::select! {
            biased;
            _ = &mut cancelled => None,
            message = stream.next() => Some(message.unwrap_or(StreamMessage::End)),
        };
        let Some(message) = next else {
            debug!("unsubscribed from stream");
            break;
        };

        let mut view = container.borrow_mut();
        let mut document = doc.borrow_mut();
        if let Err(err) = view.apply(&mut document, &message) {
            warn!(anchor = %view.anchor_id(), %err, "failed to render stream message");
        }
        if message.is_terminal() || view.state().is_final() {
            break;
        }
    }

    container.borrow().state()
}
