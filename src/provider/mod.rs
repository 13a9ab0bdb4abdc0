//! Completion providers
//!
//! A provider turns a [`TranslationRequest`] into a [`CompletionStream`]: an
//! ordered sequence of [`StreamMessage`]s consumed by exactly one result
//! container. `Message` carries the text accumulated so far, so the
//! container replaces its content on every chunk rather than appending.
//!
//! # Example
//!
//! ```ignore
//! use futures::StreamExt;
//! use inline_translate::provider::{CompletionProvider, MockMode, MockProvider, TranslationRequest};
//! use inline_translate::settings::OutputFormat;
//!
//! let provider = MockProvider::new(MockMode::Suffix);
//! let request = TranslationRequest::new("hello world", "fr", OutputFormat::Text);
//! let mut stream = provider.translate(&request).await?;
//! while let Some(message) = stream.next().await {
//!     println!("{message:?}");
//! }
//! ```

pub mod cache;
pub mod mock;
pub mod openai;
pub mod sanitize;

pub use cache::{CachedProvider, ResponseCache};
pub use mock::{MockMode, MockProvider};
pub use openai::OpenAiProvider;
pub use sanitize::sanitize_html;

use std::pin::Pin;

use async_trait::async_trait;
use futures::{Stream, StreamExt, stream};

use crate::error::ProviderResult;
use crate::settings::OutputFormat;

/// One step of a streamed completion
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamMessage {
    /// Text accumulated so far
    Message(String),
    /// The request failed; the text is shown to the user as-is
    Error(String),
    /// The completion finished successfully
    End,
}

impl StreamMessage {
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamMessage::Error(_) | StreamMessage::End)
    }
}

/// Ordered stream of completion messages
pub type CompletionStream = Pin<Box<dyn Stream<Item = StreamMessage> + Send>>;

/// What to translate and how the answer should be shaped
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TranslationRequest {
    pub text: String,
    pub target_language: String,
    pub output_format: OutputFormat,
}

impl TranslationRequest {
    pub fn new(
        text: impl Into<String>,
        target_language: impl Into<String>,
        output_format: OutputFormat,
    ) -> Self {
        Self {
            text: text.into(),
            target_language: target_language.into(),
            output_format,
        }
    }
}

/// Streaming text-completion source
///
/// Implementations enforce their own request timeouts; the translator core
/// does not impose one and never cancels a request in flight.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Start a completion. Errors returned here (authentication, quota,
    /// transport) are shown in the result container, never retried.
    async fn translate(&self, request: &TranslationRequest) -> ProviderResult<CompletionStream>;

    /// Name used in logs
    fn provider_name(&self) -> &str;
}

/// Wrap a fixed list of messages as a stream
pub fn from_messages(messages: Vec<StreamMessage>) -> CompletionStream {
    Box::pin(stream::iter(messages))
}

/// Provider boundary: HTML messages are sanitized before anything renders them
pub fn sanitized(stream: CompletionStream, format: OutputFormat) -> CompletionStream {
    match format {
        OutputFormat::Text => stream,
        OutputFormat::Html => Box::pin(stream.map(|message| match message {
            StreamMessage::Message(html) => StreamMessage::Message(sanitize_html(&html)),
            other => other,
        })),
    }
}
