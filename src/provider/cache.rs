//! Request-level response cache
//!
//! Completed translations are kept under a hash of the request content.
//! The cache has a fixed capacity and evicts the entry touched least
//! recently; both lookups and inserts count as a touch.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::num::NonZeroUsize;
use std::sync::{Arc, LazyLock, Mutex};

use async_trait::async_trait;
use futures::StreamExt;
use lru::LruCache;
use regex::Regex;
use tracing::debug;

use super::{CompletionProvider, CompletionStream, StreamMessage, TranslationRequest, from_messages};
use crate::error::ProviderResult;

static EDGE_PUNCTUATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[\s\p{P}\p{S}]+|[\s\p{P}\p{S}]+$").unwrap());

/// Fixed-capacity LRU map from content hash to final text.
/// A capacity of zero disables caching.
#[derive(Debug)]
pub struct ResponseCache {
    entries: Option<LruCache<u64, String>>,
}

impl ResponseCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: NonZeroUsize::new(capacity).map(LruCache::new),
        }
    }

    /// Content hash of a request. Edge whitespace, punctuation and symbols
    /// are ignored, so "Hello." and "Hello" share an entry.
    pub fn key_for(request: &TranslationRequest) -> u64 {
        let mut hasher = DefaultHasher::new();
        normalize_text(&request.text).hash(&mut hasher);
        request.target_language.hash(&mut hasher);
        request.output_format.hash(&mut hasher);
        hasher.finish()
    }

    pub fn get(&mut self, key: u64) -> Option<String> {
        self.entries.as_mut()?.get(&key).cloned()
    }

    pub fn insert(&mut self, key: u64, value: String) {
        if let Some(entries) = self.entries.as_mut() {
            entries.put(key, value);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.as_ref().map_or(0, LruCache::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Text with edge punctuation stripped; text that is nothing but
/// punctuation keeps its trimmed form
fn normalize_text(text: &str) -> String {
    let trimmed = text.trim();
    let stripped = EDGE_PUNCTUATION.replace_all(trimmed, "");
    match stripped.trim() {
        "" => trimmed.to_string(),
        rest => rest.to_string(),
    }
}

/// Provider wrapper that replays completed responses from a [`ResponseCache`]
pub struct CachedProvider<P> {
    inner: P,
    cache: Arc<Mutex<ResponseCache>>,
}

impl<P: CompletionProvider> CachedProvider<P> {
    pub fn new(inner: P, capacity: usize) -> Self {
        Self {
            inner,
            cache: Arc::new(Mutex::new(ResponseCache::new(capacity))),
        }
    }

    pub fn inner(&self) -> &P {
        &self.inner
    }

    fn lookup(&self, key: u64) -> Option<String> {
        self.cache.lock().ok().and_then(|mut cache| cache.get(key))
    }
}

#[async_trait]
impl<P: CompletionProvider> CompletionProvider for CachedProvider<P> {
    async fn translate(&self, request: &TranslationRequest) -> ProviderResult<CompletionStream> {
        let key = ResponseCache::key_for(request);
        if let Some(hit) = self.lookup(key) {
            debug!(key, "response cache hit");
            return Ok(from_messages(vec![
                StreamMessage::Message(hit),
                StreamMessage::End,
            ]));
        }

        let stream = self.inner.translate(request).await?;
        let cache = Arc::clone(&self.cache);
        let mut latest = String::new();
        let mut failed = false;
        Ok(Box::pin(stream.inspect(move |message| match message {
            StreamMessage::Message(text) => latest.clone_from(text),
            StreamMessage::Error(_) => failed = true,
            StreamMessage::End => {
                if !failed && let Ok(mut cache) = cache.lock() {
                    cache.insert(key, latest.clone());
                }
            }
        })))
    }

    fn provider_name(&self) -> &str {
        self.inner.provider_name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{MockMode, MockProvider};
    use crate::settings::OutputFormat;

    fn request(text: &str) -> TranslationRequest {
        TranslationRequest::new(text, "fr", OutputFormat::Text)
    }

    #[test]
    fn test_lru_evicts_least_recently_touched() {
        let mut cache = ResponseCache::new(2);
        cache.insert(1, "one".to_string());
        cache.insert(2, "two".to_string());
        assert_eq!(cache.get(1), Some("one".to_string()));
        cache.insert(3, "three".to_string());
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(2), None);
        assert_eq!(cache.get(1), Some("one".to_string()));
        assert_eq!(cache.get(3), Some("three".to_string()));
    }

    #[test]
    fn test_edge_punctuation_shares_a_key() {
        let plain = ResponseCache::key_for(&request("Hello"));
        assert_eq!(plain, ResponseCache::key_for(&request("Hello.")));
        assert_eq!(plain, ResponseCache::key_for(&request("  \u{ab}Hello!\u{bb} ")));
        assert_ne!(plain, ResponseCache::key_for(&request("Hel.lo")));
        assert_eq!(normalize_text(" ... "), "...");
        assert_eq!(normalize_text("(a, b)"), "a, b");
    }

    #[test]
    fn test_zero_capacity_stores_nothing() {
        let mut cache = ResponseCache::new(0);
        cache.insert(1, "one".to_string());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_key_depends_on_format_and_language() {
        let text = TranslationRequest::new("hi", "fr", OutputFormat::Text);
        let html = TranslationRequest::new("hi", "fr", OutputFormat::Html);
        let german = TranslationRequest::new("hi", "de", OutputFormat::Text);
        assert_ne!(ResponseCache::key_for(&text), ResponseCache::key_for(&html));
        assert_ne!(ResponseCache::key_for(&text), ResponseCache::key_for(&german));
        assert_eq!(
            ResponseCache::key_for(&text),
            ResponseCache::key_for(&text.clone())
        );
    }

    #[tokio::test]
    async fn test_completed_response_is_replayed() {
        let provider = CachedProvider::new(MockProvider::new(MockMode::Suffix), 8);
        let first: Vec<_> = provider.translate(&request("hello world")).await.unwrap().collect().await;
        let second: Vec<_> = provider.translate(&request("hello world")).await.unwrap().collect().await;

        assert_eq!(provider.inner().calls(), 1);
        assert_eq!(first.last(), Some(&StreamMessage::End));
        assert_eq!(
            second,
            vec![
                StreamMessage::Message("hello world_fr".to_string()),
                StreamMessage::End
            ]
        );
    }

    #[tokio::test]
    async fn test_failed_response_is_not_cached() {
        let provider = CachedProvider::new(
            MockProvider::new(MockMode::StreamError("boom".to_string())),
            8,
        );
        let _: Vec<_> = provider.translate(&request("x y")).await.unwrap().collect().await;
        let _: Vec<_> = provider.translate(&request("x y")).await.unwrap().collect().await;
        assert_eq!(provider.inner().calls(), 2);
    }

    #[tokio::test]
    async fn test_abandoned_stream_is_not_cached() {
        let provider = CachedProvider::new(MockProvider::new(MockMode::Suffix), 8);
        let mut stream = provider.translate(&request("a b c")).await.unwrap();
        let _ = stream.next().await;
        drop(stream);
        let _: Vec<_> = provider.translate(&request("a b c")).await.unwrap().collect().await;
        assert_eq!(provider.inner().calls(), 2);
    }
}
