//! plantview CLI - Command-line interface library
//!
//! This library provides the CLI functionality for plantview:
//! - Render: PlantUML file to PNG or SVG
//! - Check: classify a file and show the normalised source
//! - Copy: render and put the image on the clipboard
//! - Watch: re-render on every change
//!
//! # Binary Usage
//!
//! ```bash
//! # Render next to the input (diagram.png)
//! plantview render diagram.puml
//!
//! # High-resolution SVG with an explicit output
//! plantview render diagram.puml --format svg --preset hd -o out/diagram.svg
//!
//! # Keep diagram.png up to date while editing
//! plantview watch diagram.puml
//! ```

pub mod app;
pub mod logging;

pub use app::{
    check_command, copy_command, presets_command, render_command, watch_command, RenderOptions,
    ReportFormat, Session,
};
pub use app::run_cli;
pub use logging::init_logging;
