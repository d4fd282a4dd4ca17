//! # plantview-render
//!
//! PlantUML rendering and live-preview state for plantview.
//!
//! ## Layers
//!
//! - [`RenderBridge`]: one synchronous call into a diagram engine. The
//!   default is [`PlantUmlBridge`], which drives a process-wide Java +
//!   `plantuml.jar` runtime; [`KrokiBridge`] renders through a Kroki server.
//! - [`RenderService`]: runs bridge calls off the caller's thread, caches
//!   results, applies a timeout and discards superseded submissions.
//! - [`PreviewController`]: zoom, output format, the current image and
//!   save/copy of the last successful render.
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use plantview_render::{
//!     Capabilities, PlantUmlBridge, PreviewController, RenderService, ServiceOptions,
//! };
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let service = RenderService::current(Arc::new(PlantUmlBridge::default()), ServiceOptions::default());
//! service.initialize().await?;
//!
//! let mut preview = PreviewController::new(Capabilities::probe());
//! let pending = service.submit(preview.request("Alice -> Bob: hi"));
//! let id = pending.id();
//! preview.begin(id);
//! preview.apply(id, pending.wait().await);
//! preview.export_to_file(std::path::Path::new("diagram.png"))?;
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod clipboard;
pub mod config;
pub mod detect;
pub mod error;
#[cfg(feature = "kroki")]
pub mod kroki;
pub mod plantuml;
pub mod preview;
pub mod raster;
pub mod renderer;
pub mod runtime;
pub mod service;
pub mod types;

pub use cache::{cache_key, RenderCache, DEFAULT_CACHE_CAPACITY};
pub use clipboard::ClipboardSink;
#[cfg(feature = "clipboard")]
pub use clipboard::SystemClipboard;
pub use config::{EngineKind, Settings, CONFIG_FILE_NAME, DEFAULT_KROKI_URL};
pub use error::{ConfigError, PreviewError, RenderError, Result};
#[cfg(feature = "kroki")]
pub use kroki::KrokiBridge;
pub use plantuml::PlantUmlBridge;
pub use preview::{
    Capabilities, Notice, PreviewController, PreviewStatus, ZoomState, MAX_ZOOM, MIN_ZOOM,
    ZOOM_STEP,
};
pub use raster::Frame;
pub use renderer::{compute_source_hash, RenderBridge, RenderedDiagram};
pub use runtime::{PlantUmlRuntime, RuntimeLocator};
pub use service::{
    PendingRender, RenderOutcome, RenderService, RequestId, ServiceOptions, DEFAULT_RENDER_TIMEOUT,
};
pub use types::{
    is_source_path, OutputFormat, QualityOptions, QualityPreset, RenderRequest, SOURCE_EXTENSIONS,
};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
