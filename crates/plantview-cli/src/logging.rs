//! Log setup for the binary
//!
//! Records go to stderr and, when enabled, are appended to the configured
//! log file. `RUST_LOG` overrides the configured level. Records from the
//! `log` facade (used by plantview-render) are bridged into tracing.

use std::fs::{self, OpenOptions};
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{Context, Result};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use plantview_render::config::LogSettings;

/// Build the level filter: `RUST_LOG`, then `level_override`, then settings
pub fn level_filter(settings: &LogSettings, level_override: Option<&str>) -> Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    let level = level_override.unwrap_or(&settings.level);
    EnvFilter::try_new(level).with_context(|| format!("Invalid log level: {}", level))
}

/// Install the global subscriber
///
/// Returns the log file in use, if any. A log file that cannot be opened
/// is reported and skipped.
pub fn init_logging(settings: &LogSettings, level_override: Option<&str>) -> Result<Option<PathBuf>> {
    let filter = level_filter(settings, level_override)?;

    let file = if settings.enabled {
        match open_log_file(&settings.file) {
            Ok(file) => Some(file),
            Err(e) => {
                eprintln!("Warning: {:#}", e);
                None
            }
        }
    } else {
        None
    };
    let file_path = file.as_ref().map(|_| settings.file.clone());
    let file_layer = file.map(|file| {
        fmt::layer()
            .with_writer(Mutex::new(file))
            .with_ansi(false)
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .try_init()
        .context("Failed to install logger")?;

    Ok(file_path)
}

fn open_log_file(path: &std::path::Path) -> Result<fs::File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create log directory: {}", parent.display()))?;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open log file: {}", path.display()))
}
