use std::sync::Arc;

use clap::{Arg, ArgAction, Command, value_parser};
use inline_translate::{
    CachedProvider, CaptureEvent, CompletionProvider, DisplayMode, Document, JsonSettingsStore,
    KeyEvent, MockMode, MockProvider, OpenAiProvider, OutputFormat, Settings, SettingsStore,
    TranslatorSession, settings::canonical_language,
};
use tracing::info;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let matches = Command::new("inline-translate")
        .version("0.1.0")
        .about("Translate a selection inside an HTML document and print the result")
        .arg(
            Arg::new("file")
                .help("HTML file holding the page body")
                .index(1)
                .required_unless_present("html"),
        )
        .arg(
            Arg::new("html")
                .long("html")
                .help("Page body markup given inline")
                .conflicts_with("file"),
        )
        .arg(
            Arg::new("select")
                .long("select")
                .short('s')
                .help("Text to select (first occurrence)")
                .required(true),
        )
        .arg(
            Arg::new("mode")
                .long("mode")
                .help("Display mode (default: from settings)")
                .value_parser(value_parser!(DisplayMode)),
        )
        .arg(
            Arg::new("format")
                .long("format")
                .help("Output format (default: from settings)")
                .value_parser(value_parser!(OutputFormat)),
        )
        .arg(
            Arg::new("target")
                .long("target")
                .short('t')
                .help("Target language code (e.g., fr, es, de)"),
        )
        .arg(
            Arg::new("settings")
                .long("settings")
                .help("JSON settings file"),
        )
        .arg(
            Arg::new("mock")
                .long("mock")
                .short('m')
                .help("Use the mock provider instead of the OpenAI-compatible API")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("verbose")
                .long("verbose")
                .short('v')
                .help("Log planning decisions")
                .action(ArgAction::SetTrue),
        )
        .get_matches();

    let level = if matches.get_flag("verbose") { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level)),
        )
        .init();

    // 1. Settings
    let mut settings = match matches.get_one::<String>("settings") {
        Some(path) => JsonSettingsStore::new(path).load().await?,
        None => Settings::default(),
    };
    if let Some(mode) = matches.get_one::<DisplayMode>("mode") {
        settings.display_mode = *mode;
    }
    if let Some(format) = matches.get_one::<OutputFormat>("format") {
        settings.output_format = *format;
    }
    if let Some(target) = matches.get_one::<String>("target") {
        settings.target_language = canonical_language(target)?;
        settings.editable_target_language = settings.target_language.clone();
    }

    // 2. Page
    let markup = match matches.get_one::<String>("html") {
        Some(html) => html.clone(),
        None => {
            let path = matches
                .get_one::<String>("file")
                .ok_or("an HTML file or --html is required")?;
            tokio::fs::read_to_string(path).await?
        }
    };
    let mut doc = Document::from_body_html(&markup)?;
    let needle = matches
        .get_one::<String>("select")
        .ok_or("--select is required")?;
    let range = doc
        .find_text(needle)
        .ok_or_else(|| format!("{needle:?} does not occur in the document"))?;
    let target = range.start().node;
    doc.set_selection(range);

    // 3. Provider
    let capacity = settings.cache_capacity;
    let provider: Arc<dyn CompletionProvider> = if matches.get_flag("mock") {
        Arc::new(CachedProvider::new(MockProvider::new(MockMode::Suffix), capacity))
    } else {
        let openai = OpenAiProvider::from_env()
            .map_err(|e| format!("Failed to initialize provider: {}", e))?;
        Arc::new(CachedProvider::new(openai, capacity))
    };
    info!(provider = provider.provider_name(), target = %settings.target_language, "starting");

    // 4. Select, trigger, stream
    let mut session = TranslatorSession::new(doc, settings, provider);
    session.handle_event(&CaptureEvent::PointerUp { target });
    let editable = session
        .current_selection()
        .is_some_and(|snapshot| snapshot.editable);
    let shortcut = if editable {
        session.settings().editable_shortcut.clone()
    } else {
        session.settings().translate_shortcut.clone()
    };
    let key = KeyEvent {
        key: shortcut.key.clone(),
        ctrl: shortcut.ctrl,
        alt: shortcut.alt,
        shift: shortcut.shift,
        meta: shortcut.meta,
        target: None,
    };
    let pending = session
        .handle_key(&key)
        .ok_or("nothing to translate in the selection")?;

    let local = tokio::task::LocalSet::new();
    let state = local.run_until(pending.run()).await;
    info!(?state, "translation finished");

    let doc = session.document();
    let doc = doc.borrow();
    println!("{}", doc.inner_html(doc.body()));
    Ok(())
}
