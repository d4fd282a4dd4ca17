//! Error types for rendering, preview and configuration

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Errors produced by a render bridge or the render service
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RenderError {
    /// The foreign runtime (Java + PlantUML jar) could not be located or
    /// started. Fatal for the rest of the process.
    #[error("PlantUML runtime unavailable: {0}")]
    RuntimeUnavailable(String),

    /// The engine rejected the input or produced no image
    #[error("Rendering failed: {0}")]
    Render(String),

    /// The engine did not answer within the configured limit
    #[error("Rendering timed out after {:.1}s", .0.as_secs_f32())]
    Timeout(Duration),

    /// Unsupported output format
    #[error("Unsupported output format: {0}")]
    UnsupportedFormat(String),
}

impl RenderError {
    /// Text suitable for an inline error indicator
    pub fn diagnostic(&self) -> String {
        match self {
            Self::Render(message) => message.clone(),
            other => other.to_string(),
        }
    }

    /// Everything except a missing runtime can be shown inline and retried
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::RuntimeUnavailable(_))
    }
}

/// Result type for render operations
pub type Result<T> = std::result::Result<T, RenderError>;

/// Errors raised by the preview controller
#[derive(Error, Debug)]
pub enum PreviewError {
    /// Export was requested before any successful render
    #[error("Nothing to export: no successful render yet")]
    ExportUnavailable,

    /// The current image could not be decoded
    #[error("Image decoding failed: {0}")]
    Decode(String),

    /// Clipboard access failed
    #[error("Clipboard error: {0}")]
    Clipboard(String),

    /// IO error while writing an export
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised while loading settings
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The settings file exists but could not be read
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The settings file is not valid TOML for [`crate::Settings`]
    #[error("Invalid settings in {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}
