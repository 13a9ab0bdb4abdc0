//! Inline selection translation for HTML documents
//!
//! This crate anchors a user's text selection to a stable element, splices a
//! live result container into the document next to (or in place of) the
//! selection, and streams an LLM translation into it.
//!
//! # Workflow Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use inline_translate::{
//!     CaptureEvent, Document, KeyEvent, MockMode, MockProvider, Settings, TranslatorSession,
//! };
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // 1. Load the page
//!     let mut doc = Document::from_body_html("<p>hello world</p>")?;
//!
//!     // 2. The user selects some text
//!     let range = doc.find_text("hello world").ok_or("not found")?;
//!     let target = range.start().node;
//!     doc.set_selection(range);
//!
//!     let provider = Arc::new(MockProvider::new(MockMode::Suffix));
//!     let mut session = TranslatorSession::new(doc, Settings::default(), provider);
//!     session.handle_event(&CaptureEvent::PointerUp { target });
//!
//!     // 3. Alt+T inserts a container and streams the translation into it
//!     let key = KeyEvent { key: "t".into(), alt: true, ..KeyEvent::default() };
//!     if let Some(pending) = session.handle_key(&key) {
//!         pending.run().await;
//!     }
//!
//!     let doc = session.document();
//!     let doc = doc.borrow();
//!     println!("{}", doc.inner_html(doc.body()));
//!     Ok(())
//! }
//! ```

pub mod anchor;
pub mod capture;
pub mod container;
pub mod dom;
pub mod error;
pub mod markers;
pub mod planner;
pub mod provider;
pub mod session;
pub mod settings;

// End-to-end scenarios (only available during testing)
#[cfg(test)]
mod integration_tests;

// Re-export main types for convenient access
pub use anchor::{Anchor, AnchorRegistry, ORPHAN_ANCHOR_ID};
pub use capture::{
    CaptureEvent, EditableCapture, HoverCapture, KeyEvent, PointerDragCapture, SelectionCapture,
    SelectionSnapshot,
};
pub use container::{ContainerHandle, ContainerState, ResultContainer, SharedDocument, pump};
pub use dom::{Boundary, Document, NodeId, Range};
pub use error::{DomError, DomResult, ProviderError, ProviderResult, SettingsError, SettingsResult};
pub use planner::{ContainerShape, InsertionPlan, InsertionPlanner, Placement, Strategy};
pub use provider::{
    CachedProvider, CompletionProvider, CompletionStream, MockMode, MockProvider, OpenAiProvider,
    StreamMessage, TranslationRequest,
};
pub use session::{PendingTranslation, TranslatorSession};
pub use settings::{
    DisplayMode, JsonSettingsStore, OutputFormat, SelectionMethod, Settings, SettingsStore,
    Shortcut, StaticSettingsStore,
};
