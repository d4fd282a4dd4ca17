//! Settings structures and loading

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::plantuml::PlantUmlBridge;
use crate::renderer::RenderBridge;
use crate::runtime::RuntimeLocator;
use crate::service::ServiceOptions;
use crate::types::{OutputFormat, QualityOptions, QualityPreset};

/// Settings file name, looked up in the working directory and the user's
/// config directory
pub const CONFIG_FILE_NAME: &str = "plantview.toml";

/// Default Kroki server URL
pub const DEFAULT_KROKI_URL: &str = "https://kroki.io";

/// Which render bridge to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    /// Local Java + PlantUML jar
    #[default]
    Local,
    /// Remote Kroki server
    Kroki,
}

/// Top-level settings structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Settings {
    /// Render engine settings
    pub engine: EngineSettings,
    /// Render request settings
    pub render: RenderSettings,
    /// Log output settings
    pub log: LogSettings,
}

impl Settings {
    /// Parse settings from a TOML string
    pub fn from_toml_str(toml_str: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(toml_str)
    }

    /// Load settings from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Files consulted by [`Settings::discover`], in order
    pub fn candidate_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from(CONFIG_FILE_NAME)];
        if let Some(dir) = dirs::config_dir() {
            paths.push(dir.join("plantview").join(CONFIG_FILE_NAME));
        }
        paths
    }

    /// Find and load settings
    ///
    /// An explicit path must exist. Otherwise the first existing candidate
    /// is used, and defaults apply when there is none. Returns the file
    /// that was loaded, if any.
    pub fn discover(explicit: Option<&Path>) -> Result<(Self, Option<PathBuf>), ConfigError> {
        if let Some(path) = explicit {
            return Self::load(path).map(|settings| (settings, Some(path.to_path_buf())));
        }

        for path in Self::candidate_paths() {
            if path.is_file() {
                let settings = Self::load(&path)?;
                return Ok((settings, Some(path)));
            }
        }
        Ok((Self::default(), None))
    }

    /// Quality options for new requests; a preset overrides dpi and scale
    pub fn quality(&self) -> QualityOptions {
        if let Some(preset) = self.render.preset {
            return preset.into();
        }
        let mut quality = QualityOptions::new();
        if let Some(dpi) = self.render.dpi {
            quality = quality.with_dpi(dpi);
        }
        if let Some(scale) = self.render.scale {
            quality = quality.with_scale(scale);
        }
        quality
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.render.debounce_ms)
    }

    pub fn service_options(&self) -> ServiceOptions {
        ServiceOptions {
            timeout: self.engine.timeout(),
            cache_capacity: self.render.cache_capacity,
        }
    }

    pub fn locator(&self) -> RuntimeLocator {
        RuntimeLocator {
            jar: self.engine.jar.clone(),
            java: self.engine.java.clone(),
        }
    }

    /// Build the configured render bridge
    pub fn build_bridge(&self) -> Arc<dyn RenderBridge> {
        match self.engine.kind {
            EngineKind::Local => Arc::new(PlantUmlBridge::new(self.locator())),
            #[cfg(feature = "kroki")]
            EngineKind::Kroki => {
                let mut bridge = crate::kroki::KrokiBridge::with_url(&self.engine.kroki_url);
                if let Some(timeout) = self.engine.timeout() {
                    bridge = bridge.with_timeout(timeout);
                }
                Arc::new(bridge)
            }
            #[cfg(not(feature = "kroki"))]
            EngineKind::Kroki => {
                log::warn!("Kroki support is not compiled in, using the local engine");
                Arc::new(PlantUmlBridge::new(self.locator()))
            }
        }
    }
}

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Bridge to use
    pub kind: EngineKind,
    /// Explicit path to `plantuml.jar`
    pub jar: Option<PathBuf>,
    /// Explicit path to the `java` executable
    pub java: Option<PathBuf>,
    /// Kroki server, for `kind = "kroki"`
    pub kroki_url: String,
    /// Limit for one render in seconds; 0 waits forever
    pub timeout_secs: u64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            kind: EngineKind::Local,
            jar: None,
            java: None,
            kroki_url: DEFAULT_KROKI_URL.to_string(),
            timeout_secs: 30,
        }
    }
}

impl EngineSettings {
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }
}

/// Render request configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderSettings {
    /// Output format
    pub format: OutputFormat,
    /// Named preset; overrides `dpi` and `scale`
    pub preset: Option<QualityPreset>,
    /// PNG resolution
    pub dpi: Option<u32>,
    /// Engine scale
    pub scale: Option<f32>,
    /// Rendered diagrams kept in memory
    pub cache_capacity: usize,
    /// Quiet period before re-rendering edited text
    pub debounce_ms: u64,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            format: OutputFormat::Png,
            preset: None,
            dpi: Some(QualityPreset::Standard.dpi()),
            scale: Some(QualityPreset::Standard.scale()),
            cache_capacity: crate::cache::DEFAULT_CACHE_CAPACITY,
            debounce_ms: 500,
        }
    }
}

/// Log output configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    /// Append log records to `file`
    pub enabled: bool,
    /// Log file, relative to the working directory
    pub file: PathBuf,
    /// Default level filter
    pub level: String,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            file: PathBuf::from("logs/app.log"),
            level: "info".to_string(),
        }
    }
}
