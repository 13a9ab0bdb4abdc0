//! User settings consumed by the translator core
//!
//! Settings are read-only to the core: display mode, shortcuts, selection
//! method, target language and output format. They are stored as camelCase
//! JSON so the same file can be shared with an options page.
//!
//! # Example
//!
//! ```ignore
//! use inline_translate::settings::{JsonSettingsStore, SettingsStore};
//!
//! let store = JsonSettingsStore::new("settings.json");
//! let settings = store.load().await?;
//! println!("{:?}", settings.display_mode);
//! ```

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use async_trait::async_trait;
use icu_locale::Locale;
use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;

use crate::capture::KeyEvent;
use crate::error::{SettingsError, SettingsResult};

/// Where a finished translation goes relative to the selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum DisplayMode {
    /// Replace the selected text with the result
    Replace,
    /// Keep the original and put the result next to it
    #[default]
    Append,
}

/// Which capture strategy feeds the translator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SelectionMethod {
    #[default]
    Pointer,
    Hover,
    Editable,
}

/// Shape of the text the provider is asked to produce
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Text,
    Html,
}

/// A keyboard shortcut such as `Ctrl+Shift+T`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Shortcut {
    pub ctrl: bool,
    pub alt: bool,
    pub shift: bool,
    pub meta: bool,
    /// Lowercase key name
    pub key: String,
}

impl Shortcut {
    /// Whether a key event fires this shortcut. Modifiers must match exactly.
    pub fn matches(&self, event: &KeyEvent) -> bool {
        self.ctrl == event.ctrl
            && self.alt == event.alt
            && self.shift == event.shift
            && self.meta == event.meta
            && self.key.eq_ignore_ascii_case(&event.key)
    }
}

impl FromStr for Shortcut {
    type Err = SettingsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut shortcut = Shortcut {
            ctrl: false,
            alt: false,
            shift: false,
            meta: false,
            key: String::new(),
        };
        for part in s.split('+').map(str::trim) {
            match part.to_ascii_lowercase().as_str() {
                "ctrl" | "control" => shortcut.ctrl = true,
                "alt" | "option" => shortcut.alt = true,
                "shift" => shortcut.shift = true,
                "meta" | "cmd" | "command" => shortcut.meta = true,
                "" => return Err(SettingsError::InvalidShortcut(s.to_string())),
                key if shortcut.key.is_empty() => shortcut.key = key.to_string(),
                _ => return Err(SettingsError::InvalidShortcut(s.to_string())),
            }
        }
        if shortcut.key.is_empty() {
            return Err(SettingsError::InvalidShortcut(s.to_string()));
        }
        Ok(shortcut)
    }
}

impl TryFrom<String> for Shortcut {
    type Error = SettingsError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Shortcut> for String {
    fn from(shortcut: Shortcut) -> Self {
        shortcut.to_string()
    }
}

impl fmt::Display for Shortcut {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if self.ctrl {
            parts.push("Ctrl".to_string());
        }
        if self.alt {
            parts.push("Alt".to_string());
        }
        if self.shift {
            parts.push("Shift".to_string());
        }
        if self.meta {
            parts.push("Meta".to_string());
        }
        parts.push(self.key.to_ascii_uppercase());
        write!(f, "{}", parts.join("+"))
    }
}

/// Configuration read by the translator core
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Settings {
    pub display_mode: DisplayMode,
    pub selection_method: SelectionMethod,
    pub translate_shortcut: Shortcut,
    /// Toggles hover capture; independent of the translate shortcut
    pub hover_shortcut: Shortcut,
    /// Translates a selection inside editable content in place
    pub editable_shortcut: Shortcut,
    /// BCP 47 tag of the language to translate into
    pub target_language: String,
    /// Target language for text written back into editable content
    pub editable_target_language: String,
    pub output_format: OutputFormat,
    pub hover_delay_ms: u64,
    pub cache_capacity: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            display_mode: DisplayMode::Append,
            selection_method: SelectionMethod::Pointer,
            translate_shortcut: Shortcut {
                ctrl: false,
                alt: true,
                shift: false,
                meta: false,
                key: "t".to_string(),
            },
            hover_shortcut: Shortcut {
                ctrl: false,
                alt: true,
                shift: false,
                meta: false,
                key: "h".to_string(),
            },
            editable_shortcut: Shortcut {
                ctrl: false,
                alt: true,
                shift: false,
                meta: false,
                key: "e".to_string(),
            },
            target_language: "en".to_string(),
            editable_target_language: "en".to_string(),
            output_format: OutputFormat::Text,
            hover_delay_ms: 300,
            cache_capacity: 64,
        }
    }
}

/// Environment variables that override file settings
pub const ENV_TARGET_LANGUAGE: &str = "INLINE_TRANSLATE_TARGET_LANGUAGE";
pub const ENV_DISPLAY_MODE: &str = "INLINE_TRANSLATE_DISPLAY_MODE";
pub const ENV_OUTPUT_FORMAT: &str = "INLINE_TRANSLATE_OUTPUT_FORMAT";
pub const ENV_EDITABLE_TARGET_LANGUAGE: &str = "INLINE_TRANSLATE_EDITABLE_TARGET_LANGUAGE";

impl Settings {
    /// Check the target languages and canonicalize them; shortcuts must differ
    pub fn validate(&mut self) -> SettingsResult<()> {
        self.target_language = canonical_language(&self.target_language)?;
        self.editable_target_language = canonical_language(&self.editable_target_language)?;
        let shortcuts = [
            ("translate", &self.translate_shortcut),
            ("hover", &self.hover_shortcut),
            ("editable", &self.editable_shortcut),
        ];
        for (i, (name, shortcut)) in shortcuts.iter().enumerate() {
            if let Some((other, _)) = shortcuts[i + 1..].iter().find(|(_, s)| s == shortcut) {
                return Err(SettingsError::InvalidShortcut(format!(
                    "{name} and {other} shortcuts are both {shortcut}"
                )));
            }
        }
        Ok(())
    }

    /// Target language for a snapshot, by whether it came from editable content
    pub fn target_language_for(&self, editable: bool) -> &str {
        if editable {
            &self.editable_target_language
        } else {
            &self.target_language
        }
    }

    /// Apply overrides from a variable lookup (the process environment in production)
    pub fn apply_overrides<F>(&mut self, lookup: F) -> SettingsResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(language) = lookup(ENV_TARGET_LANGUAGE) {
            self.target_language = language;
        }
        if let Some(language) = lookup(ENV_EDITABLE_TARGET_LANGUAGE) {
            self.editable_target_language = language;
        }
        if let Some(mode) = lookup(ENV_DISPLAY_MODE) {
            self.display_mode = parse_keyword(&mode)?;
        }
        if let Some(format) = lookup(ENV_OUTPUT_FORMAT) {
            self.output_format = parse_keyword(&format)?;
        }
        Ok(())
    }
}

fn parse_keyword<T: DeserializeOwned>(value: &str) -> SettingsResult<T> {
    Ok(serde_json::from_value(serde_json::Value::String(
        value.trim().to_ascii_lowercase(),
    ))?)
}

/// Canonical form of a BCP 47 language tag, e.g. `zh-hant-tw` → `zh-Hant-TW`
pub fn canonical_language(tag: &str) -> SettingsResult<String> {
    tag.trim()
        .parse::<Locale>()
        .map(|locale| locale.to_string())
        .map_err(|_| SettingsError::InvalidLanguage(tag.to_string()))
}

/// Source of the current settings
#[async_trait]
pub trait SettingsStore: Send + Sync {
    async fn load(&self) -> SettingsResult<Settings>;
}

/// Settings held in memory
#[derive(Debug, Clone, Default)]
pub struct StaticSettingsStore {
    settings: Settings,
}

impl StaticSettingsStore {
    pub fn new(settings: Settings) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl SettingsStore for StaticSettingsStore {
    async fn load(&self) -> SettingsResult<Settings> {
        let mut settings = self.settings.clone();
        settings.validate()?;
        Ok(settings)
    }
}

/// Settings read from a JSON file, then overridden from the environment
#[derive(Debug, Clone)]
pub struct JsonSettingsStore {
    path: PathBuf,
}

impl JsonSettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl SettingsStore for JsonSettingsStore {
    async fn load(&self) -> SettingsResult<Settings> {
        let raw = tokio::fs::read_to_string(&self.path).await?;
        let mut settings: Settings = serde_json::from_str(&raw)?;
        settings.apply_overrides(|name| std::env::var(name).ok())?;
        settings.validate()?;
        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn key(key: &str, ctrl: bool, alt: bool, shift: bool) -> KeyEvent {
        KeyEvent {
            key: key.to_string(),
            ctrl,
            alt,
            shift,
            meta: false,
            target: None,
        }
    }

    #[test]
    fn test_shortcut_parse_and_display() {
        let shortcut: Shortcut = "Ctrl+Shift+T".parse().unwrap();
        assert!(shortcut.ctrl && shortcut.shift && !shortcut.alt);
        assert_eq!(shortcut.key, "t");
        assert_eq!(shortcut.to_string(), "Ctrl+Shift+T");
    }

    #[test]
    fn test_shortcut_rejects_garbage() {
        assert!("Ctrl+".parse::<Shortcut>().is_err());
        assert!("Ctrl+Alt".parse::<Shortcut>().is_err());
        assert!("A+B".parse::<Shortcut>().is_err());
    }

    #[test]
    fn test_shortcut_matches_exact_modifiers() {
        let shortcut: Shortcut = "Alt+T".parse().unwrap();
        assert!(shortcut.matches(&key("t", false, true, false)));
        assert!(shortcut.matches(&key("T", false, true, false)));
        assert!(!shortcut.matches(&key("t", true, true, false)));
        assert!(!shortcut.matches(&key("t", false, false, false)));
    }

    #[test]
    fn test_settings_json_uses_camel_case_and_defaults() {
        let settings: Settings = serde_json::from_str(
            r#"{"displayMode": "replace", "translateShortcut": "Ctrl+Y", "targetLanguage": "fr"}"#,
        )
        .unwrap();
        assert_eq!(settings.display_mode, DisplayMode::Replace);
        assert_eq!(settings.translate_shortcut.to_string(), "Ctrl+Y");
        assert_eq!(settings.selection_method, SelectionMethod::Pointer);
        assert_eq!(settings.hover_delay_ms, 300);
    }

    #[test]
    fn test_invalid_shortcut_in_json_is_an_error() {
        let result: Result<Settings, _> = serde_json::from_str(r#"{"hoverShortcut": "Ctrl+"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_canonical_language() {
        assert_eq!(canonical_language("zh-hant-tw").unwrap(), "zh-Hant-TW");
        assert_eq!(canonical_language("fr").unwrap(), "fr");
        assert!(matches!(
            canonical_language("not a language!"),
            Err(SettingsError::InvalidLanguage(_))
        ));
    }

    #[test]
    fn test_validate_rejects_clashing_shortcuts() {
        let mut settings = Settings::default();
        settings.hover_shortcut = settings.translate_shortcut.clone();
        assert!(settings.validate().is_err());

        let mut settings = Settings::default();
        settings.editable_shortcut = settings.hover_shortcut.clone();
        assert!(matches!(
            settings.validate(),
            Err(SettingsError::InvalidShortcut(msg)) if msg.starts_with("hover and editable")
        ));
    }

    #[test]
    fn test_editable_fields_from_json() {
        let mut settings: Settings = serde_json::from_str(
            r#"{"targetLanguage": "fr", "editableTargetLanguage": "zh-hant", "editableShortcut": "Ctrl+Shift+E"}"#,
        )
        .unwrap();
        settings.validate().unwrap();
        assert_eq!(settings.editable_target_language, "zh-Hant");
        assert_eq!(settings.editable_shortcut.to_string(), "Ctrl+Shift+E");
        assert_eq!(settings.target_language_for(true), "zh-Hant");
        assert_eq!(settings.target_language_for(false), "fr");

        let defaults = Settings::default();
        assert_eq!(defaults.editable_shortcut.to_string(), "Alt+E");
        assert_eq!(defaults.editable_target_language, "en");
    }

    #[test]
    fn test_apply_overrides() {
        let vars: HashMap<&str, &str> = HashMap::from([
            (ENV_TARGET_LANGUAGE, "de"),
            (ENV_DISPLAY_MODE, "Replace"),
            (ENV_OUTPUT_FORMAT, "html"),
            (ENV_EDITABLE_TARGET_LANGUAGE, "es"),
        ]);
        let mut settings = Settings::default();
        settings
            .apply_overrides(|name| vars.get(name).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(settings.target_language, "de");
        assert_eq!(settings.display_mode, DisplayMode::Replace);
        assert_eq!(settings.output_format, OutputFormat::Html);
        assert_eq!(settings.editable_target_language, "es");
    }

    #[test]
    fn test_apply_overrides_rejects_unknown_mode() {
        let mut settings = Settings::default();
        let result = settings.apply_overrides(|name| {
            (name == ENV_DISPLAY_MODE).then(|| "sideways".to_string())
        });
        assert!(matches!(result, Err(SettingsError::Parse(_))));
    }

    #[tokio::test]
    async fn test_json_store_loads_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"displayMode": "replace", "targetLanguage": "ja", "outputFormat": "html"}}"#
        )
        .unwrap();
        let store = JsonSettingsStore::new(file.path());
        let settings = store.load().await.unwrap();
        assert_eq!(settings.display_mode, DisplayMode::Replace);
        assert_eq!(settings.output_format, OutputFormat::Html);
    }

    #[tokio::test]
    async fn test_json_store_missing_file() {
        let store = JsonSettingsStore::new("/nonexistent/settings.json");
        assert!(matches!(store.load().await, Err(SettingsError::Io(_))));
    }

    #[tokio::test]
    async fn test_static_store_validates() {
        let mut settings = Settings::default();
        settings.target_language = "??".to_string();
        let store = StaticSettingsStore::new(settings);
        assert!(store.load().await.is_err());
    }
}
