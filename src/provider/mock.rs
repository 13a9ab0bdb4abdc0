//! Mock completion provider for testing
//!
//! Deterministic, network-free provider that streams its answer word by
//! word, so the whole pipeline can be exercised without API keys.
//!
//! # Example
//!
//! ```ignore
//! use inline_translate::provider::{CompletionProvider, MockMode, MockProvider, TranslationRequest};
//!
//! #[tokio::test]
//! async fn test_translation() {
//!     let mock = MockProvider::new(MockMode::Suffix);
//!     let request = TranslationRequest::new("hello", "fr", Default::default());
//!     let stream = mock.translate(&request).await.unwrap();
//!     // yields Message("hello_fr"), End
//! }
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::{StreamExt, stream};

use super::{CompletionProvider, CompletionStream, StreamMessage, TranslationRequest};
use crate::error::{ProviderError, ProviderResult};

/// Mock completion modes for testing different scenarios
#[derive(Debug, Clone)]
pub enum MockMode {
    /// Append the target language: "hello" → "hello_fr"
    Suffix,

    /// Predefined answers keyed by (text, target language); unknown
    /// pairs fall back to `Suffix`
    Mappings(HashMap<(String, String), String>),

    /// Fail the request before streaming starts
    Error(String),

    /// Stream the first word of the suffix answer, then fail
    StreamError(String),

    /// Echo the input unchanged
    NoOp,
}

/// Mock provider that simulates a streaming completion API
#[derive(Debug, Clone)]
pub struct MockProvider {
    mode: MockMode,
    /// Simulated delay before each streamed message (in milliseconds)
    delay_ms: u64,
    calls: Arc<AtomicUsize>,
}

impl MockProvider {
    pub fn new(mode: MockMode) -> Self {
        Self::with_delay(mode, 0)
    }

    /// Create a MockProvider that waits `delay_ms` before every message
    pub fn with_delay(mode: MockMode, delay_ms: u64) -> Self {
        Self {
            mode,
            delay_ms,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Number of `translate` calls so far, shared between clones
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn answer(&self, text: &str, target: &str) -> String {
        match &self.mode {
            MockMode::Mappings(map) => map
                .get(&(text.to_string(), target.to_string()))
                .cloned()
                .unwrap_or_else(|| format!("{text}_{target}")),
            MockMode::NoOp => text.to_string(),
            MockMode::Suffix | MockMode::Error(_) | MockMode::StreamError(_) => {
                format!("{text}_{target}")
            }
        }
    }
}

/// "a b c" → ["a", "a b", "a b c"]
fn cumulative_chunks(text: &str) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut acc = String::new();
    for (i, word) in text.split(' ').enumerate() {
        if i > 0 {
            acc.push(' ');
        }
        acc.push_str(word);
        chunks.push(acc.clone());
    }
    chunks
}

#[async_trait]
impl CompletionProvider for MockProvider {
    async fn translate(&self, request: &TranslationRequest) -> ProviderResult<CompletionStream> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let answer = self.answer(&request.text, &request.target_language);
        let mut messages: Vec<StreamMessage> = cumulative_chunks(&answer)
            .into_iter()
            .map(StreamMessage::Message)
            .collect();

        match &self.mode {
            MockMode::Error(msg) => return Err(ProviderError::Translation(msg.clone())),
            MockMode::StreamError(msg) => {
                messages.truncate(1);
                messages.push(StreamMessage::Error(msg.clone()));
            }
            _ => messages.push(StreamMessage::End),
        }

        if self.delay_ms == 0 {
            return Ok(Box::pin(stream::iter(messages)));
        }
        let delay = Duration::from_millis(self.delay_ms);
        Ok(Box::pin(stream::iter(messages).then(move |message| async move {
            tokio::time::sleep(delay).await;
            message
        })))
    }

    fn provider_name(&self) -> &str {
        "Mock Provider"
    }
}
