//! End-to-End Integration Tests for the translate pipeline
//!
//! These tests drive a [`TranslatorSession`] the way a content script would:
//! input events, then the translate shortcut, then the completion stream.
//! Streams come from [`MockProvider`] or from a channel the test feeds by
//! hand, so interleavings are deterministic.
//!
//! # Running Integration Tests
//!
//! ```bash
//! cargo test --lib integration_tests
//! OPENAI_API_KEY=... cargo test --lib integration_tests -- --ignored --nocapture
//! ```

#[cfg(test)]
mod tests {
    use std::collections::{HashMap, VecDeque};
    use std::sync::{Arc, Mutex};
    use std::time::{Duration, Instant};

    use async_trait::async_trait;
    use futures::channel::mpsc;

    use crate::capture::{CaptureEvent, KeyEvent};
    use crate::container::ContainerState;
    use crate::dom::{Boundary, Document, NodeId, Range};
    use crate::error::{ProviderError, ProviderResult};
    use crate::markers::{
        ANCHOR_ATTR, CONTAINER_CLASS, CONTAINER_FOR_ATTR, ERROR_CLASS, HOVERED_CLASS,
    };
    use crate::provider::{
        CachedProvider, CompletionProvider, CompletionStream, MockMode, MockProvider,
        OpenAiProvider, StreamMessage, TranslationRequest,
    };
    use crate::session::TranslatorSession;
    use crate::settings::{DisplayMode, OutputFormat, SelectionMethod, Settings};

    /// Provider whose streams are fed by the test through channels
    struct ChannelProvider {
        receivers: Mutex<VecDeque<mpsc::UnboundedReceiver<StreamMessage>>>,
    }

    fn channel_provider(
        count: usize,
    ) -> (Arc<ChannelProvider>, Vec<mpsc::UnboundedSender<StreamMessage>>) {
        let mut senders = Vec::new();
        let mut receivers = VecDeque::new();
        for _ in 0..count {
            let (tx, rx) = mpsc::unbounded();
            senders.push(tx);
            receivers.push_back(rx);
        }
        let provider = ChannelProvider {
            receivers: Mutex::new(receivers),
        };
        (Arc::new(provider), senders)
    }

    #[async_trait]
    impl CompletionProvider for ChannelProvider {
        async fn translate(&self, _request: &TranslationRequest) -> ProviderResult<CompletionStream> {
            let receiver = self
                .receivers
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| ProviderError::Translation("no stream left".to_string()))?;
            Ok(Box::pin(receiver))
        }

        fn provider_name(&self) -> &str {
            "Channel Provider"
        }
    }

    fn session_with(
        markup: &str,
        settings: Settings,
        provider: Arc<dyn CompletionProvider>,
    ) -> TranslatorSession {
        let doc = Document::from_body_html(markup).unwrap();
        TranslatorSession::new(doc, settings, provider)
    }

    fn mock_session(markup: &str, mode: DisplayMode) -> TranslatorSession {
        let settings = Settings {
            display_mode: mode,
            ..Settings::default()
        };
        session_with(markup, settings, Arc::new(MockProvider::new(MockMode::Suffix)))
    }

    fn alt(key: &str) -> KeyEvent {
        KeyEvent {
            key: key.to_string(),
            alt: true,
            ..KeyEvent::default()
        }
    }

    /// Select the first occurrence of `needle` and release the pointer on it
    fn select(session: &mut TranslatorSession, needle: &str) {
        let doc = session.document();
        let range = doc.borrow().find_text(needle).unwrap();
        select_range(session, range);
    }

    fn select_range(session: &mut TranslatorSession, range: Range) {
        let target = range.start().node;
        session.document().borrow_mut().set_selection(range);
        session.handle_event(&CaptureEvent::PointerUp { target });
    }

    fn text_node(session: &TranslatorSession, needle: &str) -> NodeId {
        let doc = session.document();
        let doc = doc.borrow();
        doc.descendants(doc.root())
            .into_iter()
            .find(|&n| doc.text(n).is_some_and(|t| t.contains(needle)))
            .unwrap()
    }

    fn body_child(session: &TranslatorSession, index: usize) -> NodeId {
        let doc = session.document();
        let doc = doc.borrow();
        doc.children(doc.body())[index]
    }

    fn containers(session: &TranslatorSession) -> Vec<NodeId> {
        let doc = session.document();
        let doc = doc.borrow();
        doc.descendants(doc.root())
            .into_iter()
            .filter(|&n| doc.has_class(n, CONTAINER_CLASS))
            .collect()
    }

    fn body_html(session: &TranslatorSession) -> String {
        let doc = session.document();
        let doc = doc.borrow();
        doc.inner_html(doc.body())
    }

    async fn settle() {
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }
    }

    // ============================================================================
    // TEST 1: Repeated triggers on one anchor leave exactly one container
    // ============================================================================

    #[tokio::test]
    async fn test_e2e_repeat_trigger_keeps_one_container() {
        let mut session = mock_session("<p>hello world</p>", DisplayMode::Append);

        select(&mut session, "hello world");
        let first = session.handle_key(&alt("t")).unwrap();
        let first_anchor = first.anchor_id();
        assert_eq!(first.run().await, ContainerState::Succeeded);

        select(&mut session, "hello world");
        let second = session.handle_key(&alt("t")).unwrap();
        assert_eq!(second.anchor_id(), first_anchor);
        assert_eq!(second.run().await, ContainerState::Succeeded);

        let found = containers(&session);
        assert_eq!(found.len(), 1);
        let doc = session.document();
        let doc = doc.borrow();
        assert_eq!(
            doc.find_by_attribute(CONTAINER_FOR_ATTR, &first_anchor),
            found
        );
    }

    // ============================================================================
    // TEST 2: Anchor ids are minted once per element
    // ============================================================================

    #[tokio::test]
    async fn test_e2e_anchor_id_is_stable() {
        let mut session = mock_session("<p>alpha beta</p><p>gamma</p>", DisplayMode::Append);
        let p = body_child(&session, 0);

        select(&mut session, "alpha");
        let first = session.handle_key(&alt("t")).unwrap().anchor_id();
        select(&mut session, "beta");
        let second = session.handle_key(&alt("t")).unwrap().anchor_id();
        select(&mut session, "gamma");
        let other = session.handle_key(&alt("t")).unwrap().anchor_id();

        assert_eq!(first, second);
        assert_ne!(first, other);
        let doc = session.document();
        assert_eq!(doc.borrow().attribute(p, ANCHOR_ATTR), Some(first.as_str()));
    }

    // ============================================================================
    // TEST 3: Replace mode inside one block replaces the range exactly
    // ============================================================================

    #[tokio::test]
    async fn test_e2e_replace_within_block() {
        let mut session = mock_session("<p>say hello world now</p>", DisplayMode::Replace);
        let p = body_child(&session, 0);

        select(&mut session, "hello world");
        let pending = session.handle_key(&alt("t")).unwrap();
        let handle = pending.container();
        assert_eq!(pending.run().await, ContainerState::Succeeded);

        let doc = session.document();
        let doc = doc.borrow();
        let children = doc.children(p).to_vec();
        assert_eq!(children.len(), 3);
        assert_eq!(doc.text(children[0]), Some("say "));
        assert_eq!(children[1], handle.borrow().node());
        assert_eq!(doc.text(children[2]), Some(" now"));
        assert_eq!(doc.tag(children[1]), Some("span"));
        assert_eq!(handle.borrow().text(&doc), "hello world_en");
    }

    // ============================================================================
    // TEST 4: Replace across two blocks falls back to append
    // ============================================================================

    #[tokio::test]
    async fn test_e2e_replace_across_blocks_appends() {
        let mut session =
            mock_session("<p>first paragraph</p><p>second paragraph</p>", DisplayMode::Replace);
        let start = text_node(&session, "first");
        let end = text_node(&session, "second");
        let range = {
            let doc = session.document();
            let doc = doc.borrow();
            Range::new(&doc, Boundary::new(start, 6), Boundary::new(end, 6)).unwrap()
        };
        select_range(&mut session, range);

        let pending = session.handle_key(&alt("t")).unwrap();
        let handle = pending.container();
        pending.run().await;

        let html = body_html(&session);
        assert!(html.contains("<p>first paragraph</p>"));
        assert!(html.contains("<p>second paragraph</p>"));
        assert_eq!(body_child(&session, 1), handle.borrow().node());
    }

    // ============================================================================
    // TEST 5: Replace inside a link falls back to append
    // ============================================================================

    #[tokio::test]
    async fn test_e2e_replace_inside_link_appends() {
        let mut session =
            mock_session(r#"<p>read <a href="/guide">the guide</a></p>"#, DisplayMode::Replace);

        select(&mut session, "guide");
        let pending = session.handle_key(&alt("t")).unwrap();
        pending.run().await;

        let html = body_html(&session);
        assert!(html.contains("the guide"));
        assert_eq!(containers(&session).len(), 1);
    }

    // ============================================================================
    // TEST 6: Messages after dismissal never touch the document
    // ============================================================================

    #[tokio::test]
    async fn test_e2e_dismiss_mid_stream() {
        let (provider, senders) = channel_provider(1);
        let mut session = session_with("<p>hello world</p>", Settings::default(), provider);
        let tx = senders[0].clone();

        select(&mut session, "hello world");
        let pending = session.handle_key(&alt("t")).unwrap();
        let handle = pending.container();
        let anchor = pending.anchor_id();
        let doc = session.document();

        let drive = async {
            tx.unbounded_send(StreamMessage::Message("bon".to_string()))
                .unwrap();
            settle().await;
            assert_eq!(handle.borrow().text(&doc.borrow()), "bon");
            assert_eq!(handle.borrow().state(), ContainerState::Streaming);

            assert!(session.dismiss(&anchor));
            let after_dismiss = body_html(&session);
            let _ = tx.unbounded_send(StreamMessage::Message("bonjour".to_string()));
            let _ = tx.unbounded_send(StreamMessage::End);
            settle().await;
            (after_dismiss, body_html(&session))
        };

        let (state, (after_dismiss, final_html)) = tokio::join!(pending.run(), drive);
        assert_eq!(state, ContainerState::Dismissed);
        assert_eq!(after_dismiss, "<p data-translator-anchor-id=\"translator-anchor-1\">hello world</p>");
        assert_eq!(final_html, after_dismiss);
        assert!(containers(&session).is_empty());
    }

    // ============================================================================
    // TEST 7: Scenario - block paragraph in append mode
    // ============================================================================

    #[tokio::test]
    async fn test_e2e_append_after_paragraph() {
        let mut session = mock_session("<p>hello world</p><p>tail</p>", DisplayMode::Append);
        let p = body_child(&session, 0);

        select(&mut session, "hello world");
        let pending = session.handle_key(&alt("t")).unwrap();
        let handle = pending.container();
        pending.run().await;

        let node = handle.borrow().node();
        let doc = session.document();
        let doc = doc.borrow();
        assert_eq!(doc.tag(node), Some("div"));
        assert_eq!(doc.next_sibling(p), Some(node));
    }

    // ============================================================================
    // TEST 8: Scenario - inline span in append mode
    // ============================================================================

    #[tokio::test]
    async fn test_e2e_append_inline_at_range_end() {
        let mut session = mock_session(
            r#"<div>say <span style="display:inline">hi</span> there</div>"#,
            DisplayMode::Append,
        );
        let hi = text_node(&session, "hi");

        select(&mut session, "hi");
        let pending = session.handle_key(&alt("t")).unwrap();
        let handle = pending.container();
        pending.run().await;

        let node = handle.borrow().node();
        let doc = session.document();
        let doc = doc.borrow();
        assert_eq!(doc.tag(node), Some("span"));
        assert_eq!(doc.next_sibling(hi), Some(node));
        assert_eq!(handle.borrow().text(&doc), "hi_en");
    }

    // ============================================================================
    // TEST 9: Scenario - second trigger while the first is still streaming
    // ============================================================================

    #[tokio::test]
    async fn test_e2e_supersede_while_streaming() {
        let (provider, senders) = channel_provider(2);
        let mut session = session_with("<p>hello world</p>", Settings::default(), provider);
        let (first_tx, second_tx) = (senders[0].clone(), senders[1].clone());

        select(&mut session, "hello world");
        let first = session.handle_key(&alt("t")).unwrap();
        let first_handle = first.container();
        let anchor = first.anchor_id();

        let drive = async {
            first_tx
                .unbounded_send(StreamMessage::Message("hel".to_string()))
                .unwrap();
            settle().await;

            select(&mut session, "hello world");
            let second = session.handle_key(&alt("t")).unwrap();
            assert_eq!(second.anchor_id(), anchor);
            {
                let doc = session.document();
                let doc = doc.borrow();
                assert!(!doc.is_connected(first_handle.borrow().node()));
                assert_eq!(doc.find_by_attribute(CONTAINER_FOR_ATTR, &anchor).len(), 1);
            }

            let _ = first_tx.unbounded_send(StreamMessage::Message("hello late".to_string()));
            second_tx
                .unbounded_send(StreamMessage::Message("bonjour".to_string()))
                .unwrap();
            second_tx.unbounded_send(StreamMessage::End).unwrap();
            let second_handle = second.container();
            (second.run().await, second_handle)
        };

        let (first_state, (second_state, second_handle)) = tokio::join!(first.run(), drive);
        assert_eq!(first_state, ContainerState::Dismissed);
        assert_eq!(second_state, ContainerState::Succeeded);
        assert_eq!(containers(&session), vec![second_handle.borrow().node()]);
        let doc = session.document();
        assert_eq!(second_handle.borrow().text(&doc.borrow()), "bonjour");
        assert!(!body_html(&session).contains("late"));
    }

    // ============================================================================
    // TEST 10: Hover capture drives the same pipeline
    // ============================================================================

    #[tokio::test]
    async fn test_e2e_hover_translation() {
        let settings = Settings {
            selection_method: SelectionMethod::Hover,
            ..Settings::default()
        };
        let provider = Arc::new(MockProvider::new(MockMode::Suffix));
        let mut session = session_with("<p>bonjour</p><p>other</p>", settings, provider);
        let p = body_child(&session, 0);
        let t0 = Instant::now();

        session.handle_event(&CaptureEvent::PointerMove { target: p, at: t0 });
        session.handle_event(&CaptureEvent::Tick { at: t0 + Duration::from_millis(400) });
        assert!(session.handle_key(&alt("t")).is_none());

        assert!(session.handle_key(&alt("h")).is_none());
        session.handle_event(&CaptureEvent::PointerMove { target: p, at: t0 });
        session.handle_event(&CaptureEvent::Tick { at: t0 + Duration::from_millis(400) });
        let pending = session.handle_key(&alt("t")).unwrap();
        let handle = pending.container();
        pending.run().await;

        let doc = session.document();
        let doc = doc.borrow();
        assert_eq!(doc.next_sibling(p), Some(handle.borrow().node()));
        assert_eq!(handle.borrow().text(&doc), "bonjour_en");
        assert!(doc.has_class(p, HOVERED_CLASS));
        drop(doc);

        // Switching hover off takes the mark back
        assert!(session.handle_key(&alt("h")).is_none());
        assert!(!session.document().borrow().has_class(p, HOVERED_CLASS));
    }

    // ============================================================================
    // TEST 11: Editable selections are written back in place
    // ============================================================================

    #[tokio::test]
    async fn test_e2e_editable_write_back() {
        let settings = Settings {
            selection_method: SelectionMethod::Editable,
            ..Settings::default()
        };
        let provider = Arc::new(MockProvider::new(MockMode::Suffix));
        let mut session = session_with(
            r#"<div contenteditable="true"><p>fix this text</p></div>"#,
            settings,
            provider,
        );
        let target = text_node(&session, "fix");
        let range = session.document().borrow().find_text("this").unwrap();
        session.document().borrow_mut().set_selection(range);
        session.handle_event(&CaptureEvent::SelectionChange { target });

        assert!(session.handle_key(&alt("t")).is_none());
        let pending = session.handle_key(&alt("e")).unwrap();
        let handle = pending.container();
        pending.run().await;

        let doc = session.document();
        let doc = doc.borrow();
        let p = doc.parent(handle.borrow().node()).unwrap();
        assert_eq!(doc.tag(p), Some("p"));
        assert_eq!(doc.text(doc.children(p)[0]), Some("fix "));
        assert_eq!(handle.borrow().text(&doc), "this_en");
    }

    // ============================================================================
    // TEST 12: HTML output is sanitized before it is rendered
    // ============================================================================

    #[tokio::test]
    async fn test_e2e_html_output_is_sanitized() {
        let mut mappings = HashMap::new();
        mappings.insert(
            ("hello".to_string(), "en".to_string()),
            r#"<b onclick="steal()">hi</b><script>alert(1)</script>"#.to_string(),
        );
        let settings = Settings {
            output_format: OutputFormat::Html,
            ..Settings::default()
        };
        let provider = Arc::new(MockProvider::new(MockMode::Mappings(mappings)));
        let mut session = session_with("<p>hello</p>", settings, provider);

        select(&mut session, "hello");
        let pending = session.handle_key(&alt("t")).unwrap();
        let handle = pending.container();
        pending.run().await;

        let doc = session.document();
        let html = doc.borrow().to_html(handle.borrow().node());
        assert!(html.contains("<b>hi</b>"));
        assert!(!html.contains("onclick"));
        assert!(!html.contains("script"));
    }

    // ============================================================================
    // TEST 13: Provider errors are shown and do not block later actions
    // ============================================================================

    #[tokio::test]
    async fn test_e2e_error_then_recover() {
        let provider = Arc::new(MockProvider::new(MockMode::StreamError(
            "rate limited".to_string(),
        )));
        let mut session = session_with("<p>one two</p><p>three</p>", Settings::default(), provider);

        select(&mut session, "one two");
        let pending = session.handle_key(&alt("t")).unwrap();
        let handle = pending.container();
        assert_eq!(pending.run().await, ContainerState::Failed);
        {
            let doc = session.document();
            let doc = doc.borrow();
            assert!(doc.has_class(handle.borrow().node(), ERROR_CLASS));
            assert_eq!(handle.borrow().text(&doc), "rate limited");
        }

        select(&mut session, "three");
        assert!(session.handle_key(&alt("t")).is_some());
        assert_eq!(containers(&session).len(), 2);
    }

    // ============================================================================
    // TEST 14: Cached responses are replayed without another request
    // ============================================================================

    #[tokio::test]
    async fn test_e2e_cached_provider_replays() {
        let mock = MockProvider::new(MockMode::Suffix);
        let provider = Arc::new(CachedProvider::new(mock.clone(), 8));
        let mut session = session_with("<p>hello world</p>", Settings::default(), provider);

        for _ in 0..2 {
            select(&mut session, "hello world");
            let pending = session.handle_key(&alt("t")).unwrap();
            let handle = pending.container();
            assert_eq!(pending.run().await, ContainerState::Succeeded);
            let doc = session.document();
            assert_eq!(handle.borrow().text(&doc.borrow()), "hello world_en");
        }
        assert_eq!(mock.calls(), 1);
    }

    // ============================================================================
    // TEST 15: Live provider (requires OPENAI_API_KEY)
    // ============================================================================

    #[tokio::test]
    #[ignore]
    async fn test_e2e_openai_live() {
        if std::env::var("OPENAI_API_KEY").is_err() {
            eprintln!("Skipping: OPENAI_API_KEY not set");
            return;
        }
        let provider = Arc::new(OpenAiProvider::from_env().unwrap());
        let settings = Settings {
            target_language: "fr".to_string(),
            ..Settings::default()
        };
        let mut session = session_with("<p>Good morning</p>", settings, provider);

        select(&mut session, "Good morning");
        let pending = session.handle_key(&alt("t")).unwrap();
        let handle = pending.container();
        let state = pending.run().await;
        let doc = session.document();
        println!("{:?}: {}", state, handle.borrow().text(&doc.borrow()));
        assert_eq!(state, ContainerState::Succeeded);
    }
}
