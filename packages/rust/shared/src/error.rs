//! Error types for GuidePress.
//!
//! Library crates use [`GuidePressError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.
//!
//! Variants split into two groups. `ConfigMissing`, `Config`,
//! `SourceUnavailable` and `PersistFailed` end a run. `AuthFailed`,
//! `FetchUnavailable` and `RenderFailed` are handled per item by the
//! publish coordinator; see [`GuidePressError::is_fatal`].

use std::path::PathBuf;

/// Top-level error type for all GuidePress operations.
#[derive(Debug, thiserror::Error)]
pub enum GuidePressError {
    /// A required configuration key is absent or still a template placeholder.
    #[error("missing configuration: {}", keys.join(", "))]
    ConfigMissing { keys: Vec<String> },

    /// A configuration value is present but malformed.
    #[error("config error: {message}")]
    Config { message: String },

    /// The tabular source could not be opened.
    #[error("source unavailable at {path:?}: {message}")]
    SourceUnavailable { path: PathBuf, message: String },

    /// The portal rejected the login or never showed a signed-in page.
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    /// Connectivity error talking to the portal or a webhook.
    #[error("network error: {0}")]
    Network(String),

    /// The item page was reachable but yielded no usable content.
    #[error("content unavailable for {url}: {reason}")]
    FetchUnavailable { url: String, reason: String },

    /// The renderer could not materialize an artifact.
    #[error("render failed for {item}: {message}")]
    RenderFailed { item: String, message: String },

    /// Writing the publication state or catalog failed.
    #[error("persist failed for {path:?}: {message}")]
    PersistFailed { path: PathBuf, message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, GuidePressError>;

impl GuidePressError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a missing-configuration error for the given keys.
    pub fn config_missing<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::ConfigMissing {
            keys: keys.into_iter().map(Into::into).collect(),
        }
    }

    /// Create a source-unavailable error.
    pub fn source_unavailable(path: impl Into<PathBuf>, msg: impl Into<String>) -> Self {
        Self::SourceUnavailable {
            path: path.into(),
            message: msg.into(),
        }
    }

    /// Create a render failure for the named item.
    pub fn render(item: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::RenderFailed {
            item: item.into(),
            message: msg.into(),
        }
    }

    /// Create a persistence failure for the given path.
    pub fn persist(path: impl Into<PathBuf>, msg: impl Into<String>) -> Self {
        Self::PersistFailed {
            path: path.into(),
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether this error must end the whole run rather than a single item.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::ConfigMissing { .. }
                | Self::Config { .. }
                | Self::SourceUnavailable { .. }
                | Self::PersistFailed { .. }
        )
    }
}
