//! OpenAI-compatible streaming chat-completions provider
//!
//! Works with any endpoint that speaks the `/chat/completions` protocol with
//! `"stream": true` and answers with server-sent events.
//!
//! # Authentication
//!
//! The provider loads its key from the `OPENAI_API_KEY` environment
//! variable. `OPENAI_BASE_URL` and `OPENAI_MODEL` optionally point it at a
//! compatible server or a different model.
//!
//! # Example
//!
//! ```ignore
//! use inline_translate::provider::{CompletionProvider, OpenAiProvider, TranslationRequest};
//!
//! let provider = OpenAiProvider::from_env()?;
//! let request = TranslationRequest::new("Hello, world!", "fr", Default::default());
//! let mut stream = provider.translate(&request).await?;
//! ```

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::{Stream, StreamExt, stream};
use serde_json::{Value, json};
use tracing::{debug, trace, warn};

use super::{CompletionProvider, CompletionStream, StreamMessage, TranslationRequest};
use crate::error::{ProviderError, ProviderResult};
use crate::settings::OutputFormat;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Streaming provider for OpenAI-compatible APIs
#[derive(Clone)]
pub struct OpenAiProvider {
    api_key: String,
    base_url: String,
    model: String,
    client: reqwest::Client,
}

impl OpenAiProvider {
    /// Upper bound on a whole request, including streaming
    const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

    /// Create a provider with an explicit key, base URL and model
    ///
    /// # Returns
    ///
    /// * `Ok(Self)` - New provider instance
    /// * `Err(ProviderError)` - If the key is empty or the HTTP client cannot be built
    pub fn new(api_key: String, base_url: String, model: String) -> ProviderResult<Self> {
        if api_key.trim().is_empty() {
            return Err(ProviderError::Config("API key cannot be empty".to_string()));
        }

        let client = reqwest::Client::builder()
            .timeout(Self::REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            client,
        })
    }

    /// Create a provider from `OPENAI_API_KEY`, `OPENAI_BASE_URL` and `OPENAI_MODEL`
    pub fn from_env() -> ProviderResult<Self> {
        let api_key = std::env::var("OPENAI_API_KEY").map_err(|_| {
            ProviderError::Config("OPENAI_API_KEY environment variable not set".to_string())
        })?;
        let base_url =
            std::env::var("OPENAI_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        let model = std::env::var("OPENAI_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());
        Self::new(api_key, base_url, model)
    }

    fn request_body(&self, request: &TranslationRequest) -> serde_json::Value {
        let format_rule = match request.output_format {
            OutputFormat::Text => "Reply with plain text only.",
            OutputFormat::Html => "Reply with an HTML fragment only, without scripts or styles.",
        };
        let system = format!(
            "Translate the user's text into the language with BCP 47 tag {}. \
             Output only the translation. {format_rule}",
            request.target_language
        );
        json!({
            "model": self.model,
            "stream": true,
            "temperature": 0.1,
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": request.text },
            ],
        })
    }
}

#[async_trait]
impl CompletionProvider for OpenAiProvider {
    async fn translate(&self, request: &TranslationRequest) -> ProviderResult<CompletionStream> {
        let url = format!("{}/chat/completions", self.base_url);
        debug!(%url, model = %self.model, "starting completion");

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&self.request_body(request))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Api {
                status: status.as_u16(),
                message: api_error_message(&body),
            });
        }

        Ok(into_messages(response.bytes_stream()))
    }

    fn provider_name(&self) -> &str {
        "OpenAI-compatible"
    }
}

/// The user-facing message of an error body: `error.message` when present,
/// then a top-level `message`, then the raw text
pub fn api_error_message(body: &str) -> String {
    let body = body.trim();
    if let Ok(value) = serde_json::from_str::<Value>(body)
        && let Some(message) = error_message(&value).or_else(|| non_empty(&value["message"]))
    {
        return message.to_string();
    }
    if body.is_empty() {
        "Unknown error".to_string()
    } else {
        body.to_string()
    }
}

fn error_message(value: &Value) -> Option<&str> {
    non_empty(&value["error"]["message"])
}

fn non_empty(value: &Value) -> Option<&str> {
    value.as_str().map(str::trim).filter(|s| !s.is_empty())
}

/// What one server-sent event means for the translation
#[derive(Debug, Clone, PartialEq, Eq)]
enum SseEvent {
    Delta(String),
    Done,
    Failure(String),
}

fn parse_event(kind: &str, data: &str) -> Option<SseEvent> {
    let data = data.trim();
    if data.is_empty() {
        return None;
    }
    if data == "[DONE]" {
        return Some(SseEvent::Done);
    }
    let value: Value = match serde_json::from_str(data) {
        Ok(value) => value,
        Err(err) => {
            if kind == "error" {
                return Some(SseEvent::Failure(data.to_string()));
            }
            warn!(%err, "skipping undecodable stream event");
            return None;
        }
    };
    if let Some(message) = error_message(&value) {
        return Some(SseEvent::Failure(message.to_string()));
    }
    if kind == "error" {
        return Some(SseEvent::Failure(api_error_message(data)));
    }
    value["choices"][0]["delta"]["content"]
        .as_str()
        .filter(|content| !content.is_empty())
        .map(|content| SseEvent::Delta(content.to_string()))
}

struct StreamState<S> {
    events: S,
    text: String,
    finished: bool,
}

/// Turn a byte stream of SSE frames into accumulated-text messages
fn into_messages<S, B, E>(bytes: S) -> CompletionStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: fmt::Display + Send + 'static,
{
    let state = StreamState {
        events: Box::pin(bytes.eventsource()),
        text: String::new(),
        finished: false,
    };
    Box::pin(stream::unfold(state, |mut state| async move {
        if state.finished {
            return None;
        }
        loop {
            let message = match state.events.next().await {
                Some(Ok(event)) => {
                    trace!(event = %event.event, data = %event.data, "SSE event");
                    match parse_event(&event.event, &event.data) {
                        Some(SseEvent::Delta(delta)) => {
                            state.text.push_str(&delta);
                            StreamMessage::Message(state.text.clone())
                        }
                        Some(SseEvent::Done) => StreamMessage::End,
                        Some(SseEvent::Failure(message)) => StreamMessage::Error(message),
                        None => continue,
                    }
                }
                Some(Err(err)) => StreamMessage::Error(format!("network error: {err}")),
                // A stream that closes without [DONE] still ends cleanly.
                None => StreamMessage::End,
            };
            if !matches!(message, StreamMessage::Message(_)) {
                state.finished = true;
            }
            return Some((message, state));
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    type Frames = stream::Iter<std::vec::IntoIter<Result<Vec<u8>, std::io::Error>>>;

    fn frames(parts: &[&str]) -> Frames {
        let owned: Vec<Result<Vec<u8>, std::io::Error>> =
            parts.iter().map(|p| Ok(p.as_bytes().to_vec())).collect();
        stream::iter(owned)
    }

    fn delta(content: &str) -> String {
        format!(
            "data: {}\n\n",
            json!({ "choices": [{ "delta": { "content": content } }] })
        )
    }

    async fn collect(parts: &[&str]) -> Vec<StreamMessage> {
        into_messages(frames(parts)).collect().await
    }

    #[tokio::test]
    async fn test_messages_accumulate_text() {
        let a = delta("Bon");
        let b = delta("jour");
        assert_eq!(
            collect(&[&a, &b, "data: [DONE]\n\n"]).await,
            vec![
                StreamMessage::Message("Bon".to_string()),
                StreamMessage::Message("Bonjour".to_string()),
                StreamMessage::End,
            ]
        );
    }

    #[tokio::test]
    async fn test_event_split_across_chunks() {
        let line = delta("Bon");
        let (a, b) = line.split_at(10);
        assert_eq!(
            collect(&[a, b]).await,
            vec![StreamMessage::Message("Bon".to_string()), StreamMessage::End]
        );
    }

    #[tokio::test]
    async fn test_multi_line_data_is_one_event() {
        let messages = collect(&[
            "event: message\n",
            "data: {\"choices\":[{\"delta\":\n",
            "data: {\"content\":\"Salut\"}}]}\n\n",
            "data: [DONE]\n\n",
        ])
        .await;
        assert_eq!(
            messages,
            vec![StreamMessage::Message("Salut".to_string()), StreamMessage::End]
        );
    }

    #[tokio::test]
    async fn test_comments_and_pings_are_skipped() {
        let a = delta("Hola");
        let messages = collect(&[": keep-alive\n\n", "event: ping\ndata: {}\n\n", &a]).await;
        assert_eq!(
            messages,
            vec![StreamMessage::Message("Hola".to_string()), StreamMessage::End]
        );
    }

    #[tokio::test]
    async fn test_nothing_after_in_stream_error() {
        let a = delta("Bon");
        let b = delta("jour");
        let messages = collect(&[
            &a,
            "data: {\"error\":{\"message\":\"overloaded\"}}\n\n",
            &b,
        ])
        .await;
        assert_eq!(
            messages,
            vec![
                StreamMessage::Message("Bon".to_string()),
                StreamMessage::Error("overloaded".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_error_event_type_fails_the_stream() {
        let messages = collect(&["event: error\ndata: upstream went away\n\n"]).await;
        assert_eq!(
            messages,
            vec![StreamMessage::Error("upstream went away".to_string())]
        );
    }

    #[tokio::test]
    async fn test_transport_error_fails_the_stream() {
        let a = delta("Bon");
        let chunks: Vec<Result<Vec<u8>, std::io::Error>> = vec![
            Ok(a.into_bytes()),
            Err(std::io::Error::other("connection reset")),
        ];
        let messages: Vec<_> = into_messages(stream::iter(chunks)).collect().await;
        assert_eq!(messages.len(), 2);
        assert!(matches!(&messages[1], StreamMessage::Error(m) if m.contains("connection reset")));
    }

    #[tokio::test]
    async fn test_closed_stream_without_done_ends() {
        let a = delta("Hallo");
        assert_eq!(collect(&[&a]).await.last(), Some(&StreamMessage::End));
    }

    #[test]
    fn test_api_error_message_prefers_error_message() {
        let body = r#"{"error":{"message":"Incorrect API key provided.","type":"invalid_request_error","code":"invalid_api_key"}}"#;
        assert_eq!(api_error_message(body), "Incorrect API key provided.");
        let err = ProviderError::Api {
            status: 401,
            message: api_error_message(body),
        };
        assert_eq!(err.to_string(), "API error (401): Incorrect API key provided.");
    }

    #[test]
    fn test_api_error_message_falls_back() {
        assert_eq!(api_error_message(r#"{"message":"rate limited"}"#), "rate limited");
        assert_eq!(api_error_message(r#"{"error":{"message":"  "}}"#), r#"{"error":{"message":"  "}}"#);
        assert_eq!(api_error_message("<html>Bad Gateway</html>\n"), "<html>Bad Gateway</html>");
        assert_eq!(api_error_message(""), "Unknown error");
    }

    #[test]
    fn test_new_rejects_empty_key() {
        let result = OpenAiProvider::new(
            "  ".to_string(),
            DEFAULT_BASE_URL.to_string(),
            DEFAULT_MODEL.to_string(),
        );
        assert!(matches!(result, Err(ProviderError::Config(_))));
    }

    #[test]
    fn test_request_body_asks_for_stream() {
        let provider = OpenAiProvider::new(
            "key".to_string(),
            "http://localhost:8080/v1/".to_string(),
            "small".to_string(),
        )
        .unwrap();
        let body = provider.request_body(&TranslationRequest::new("hi", "ja", OutputFormat::Html));
        assert_eq!(body["stream"], true);
        assert_eq!(body["model"], "small");
        assert_eq!(body["messages"][1]["content"], "hi");
        assert!(body["messages"][0]["content"].as_str().unwrap().contains("ja"));
        assert_eq!(provider.base_url, "http://localhost:8080/v1");
    }
}
