//! Render bridge trait and rendered artifacts
//!
//! A bridge owns one foreign engine and exposes a single synchronous render
//! call. Everything asynchronous lives in [`crate::service`].

use std::fmt::Write;
use std::sync::Arc;

use sha2::{Digest, Sha256};

use crate::error::Result;
use crate::types::{OutputFormat, QualityOptions};

/// Trait for render bridges
///
/// Implementors own the lifecycle of an engine and turn diagram source
/// into image bytes.
///
/// # Thread Safety
///
/// Bridges must be `Send + Sync` so the service can call them from the
/// blocking pool. Implementations serialise access to the engine
/// themselves when the engine is not reentrant.
pub trait RenderBridge: Send + Sync {
    /// Human-readable name of this bridge
    fn name(&self) -> &'static str;

    /// Start the engine if it is not running yet
    ///
    /// Called at most once per bridge by the service, but must tolerate
    /// repeated calls. A failure here is final for the process.
    fn initialize(&self) -> Result<()> {
        Ok(())
    }

    /// Render normalised diagram source
    ///
    /// # Arguments
    /// * `source` - Diagram source with a `@startuml`/`@enduml` pair
    /// * `format` - The desired output format
    /// * `quality` - DPI and scale options
    ///
    /// # Returns
    /// The rendered image bytes, or a diagnostic from the engine
    fn render(&self, source: &str, format: OutputFormat, quality: &QualityOptions) -> Result<Vec<u8>>;

    /// Abandon the render in progress, if the engine allows it
    ///
    /// Called by the service when a render exceeds its time limit. The
    /// interrupted `render` call should return soon after.
    fn cancel(&self) {}

    /// Render to PNG with default options (convenience method)
    fn render_png(&self, source: &str) -> Result<Vec<u8>> {
        self.render(source, OutputFormat::Png, &QualityOptions::default())
    }

    /// Render to SVG with default options (convenience method)
    fn render_svg(&self, source: &str) -> Result<Vec<u8>> {
        self.render(source, OutputFormat::Svg, &QualityOptions::default())
    }
}

/// Rendered diagram with metadata
///
/// The image bytes are shared, so clones handed to the cache and the preview
/// controller are cheap.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedDiagram {
    /// The rendered image bytes
    pub data: Arc<[u8]>,
    /// The output format
    pub format: OutputFormat,
    /// SHA-256 hash of the normalised source
    pub source_hash: String,
    /// Name of the bridge that produced this output
    pub renderer: String,
}

impl RenderedDiagram {
    /// Create a new rendered diagram
    pub fn new(
        data: impl Into<Arc<[u8]>>,
        format: OutputFormat,
        source_hash: String,
        renderer: impl Into<String>,
    ) -> Self {
        Self {
            data: data.into(),
            format,
            source_hash,
            renderer: renderer.into(),
        }
    }

    /// Get the file extension for this diagram
    pub fn extension(&self) -> &'static str {
        self.format.extension()
    }

    /// Get the MIME type for this diagram
    pub fn mime_type(&self) -> &'static str {
        self.format.mime_type()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// SVG markup, when this is an SVG diagram with valid UTF-8
    pub fn svg_text(&self) -> Option<&str> {
        match self.format {
            OutputFormat::Svg => std::str::from_utf8(&self.data).ok(),
            OutputFormat::Png => None,
        }
    }

    /// Whether the bytes look like the declared format
    pub fn is_well_formed(&self) -> bool {
        has_signature(&self.data, self.format)
    }
}

const PNG_SIGNATURE: &[u8] = b"\x89PNG\r\n\x1a\n";

/// Whether `data` starts the way `format` output does
pub fn has_signature(data: &[u8], format: OutputFormat) -> bool {
    match format {
        OutputFormat::Png => data.starts_with(PNG_SIGNATURE),
        OutputFormat::Svg => std::str::from_utf8(data)
            .map(|text| text.contains("<svg"))
            .unwrap_or(false),
    }
}

/// Content key of a source text, as `sha256:<hex>`
pub fn compute_source_hash(source: &str) -> String {
    let digest = Sha256::digest(source.as_bytes());
    let mut key = String::with_capacity(7 + 2 * digest.len());
    key.push_str("sha256:");
    for byte in digest {
        let _ = write!(key, "{:02x}", byte);
    }
    key
}
