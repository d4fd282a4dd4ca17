//! Configuration
//!
//! Settings are loaded from `plantview.toml`, either the path given on the
//! command line, the working directory, or `<config dir>/plantview/`.
//! A missing file means defaults.
//!
//! ```toml
//! [engine]
//! kind = "local"            # or "kroki"
//! jar = "jar/plantuml.jar"
//! timeout_secs = 30
//!
//! [render]
//! format = "png"
//! preset = "hd"
//! cache_capacity = 32
//! debounce_ms = 500
//!
//! [log]
//! enabled = true
//! file = "logs/app.log"
//! level = "info"
//! ```

mod settings;


pub use settings::{
    EngineKind, EngineSettings, LogSettings, RenderSettings, Settings, CONFIG_FILE_NAME,
    DEFAULT_KROKI_URL,
};
