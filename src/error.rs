//! Error types for the document model, completion providers and settings.
//!
//! DOM errors never escape the insertion planner: they select the next
//! fallback step instead. Provider errors are rendered verbatim inside the
//! result container, so their `Display` text is user-facing.

use thiserror::Error;

use crate::dom::NodeId;

/// Failures raised by document mutation and range operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomError {
    /// The node id does not belong to this document
    #[error("unknown node {0:?}")]
    UnknownNode(NodeId),
    /// The mutation would produce an impossible tree
    #[error("hierarchy request error: {0}")]
    HierarchyRequest(String),
    /// A range boundary is detached or otherwise unusable
    #[error("range is no longer valid: {0}")]
    InvalidRange(String),
    /// An offset is past the end of its node or splits a character
    #[error("offset {offset} is out of bounds for node of length {length}")]
    IndexSize { offset: usize, length: usize },
}

/// Result type for document operations
pub type DomResult<T> = Result<T, DomError>;

/// Failures raised by completion providers before or while streaming.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Missing or malformed provider configuration (API key, base URL)
    #[error("configuration error: {0}")]
    Config(String),
    /// Transport failure talking to the provider
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    /// The provider answered with a non-success status. `message` is the
    /// provider's own `error.message` when the body carries one.
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },
    /// The provider refused or failed the translation itself
    #[error("translation error: {0}")]
    Translation(String),
}

/// Result type for provider operations
pub type ProviderResult<T> = Result<T, ProviderError>;

/// Failures raised while loading or validating settings.
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read settings: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse settings: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid target language {0:?}")]
    InvalidLanguage(String),
    #[error("invalid shortcut {0:?}")]
    InvalidShortcut(String),
}

/// Result type for settings operations
pub type SettingsResult<T> = Result<T, SettingsError>;
