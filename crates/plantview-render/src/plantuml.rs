//! Local PlantUML bridge
//!
//! Renders through the process-wide [`PlantUmlRuntime`].

use crate::detect;
use crate::error::{RenderError, Result};
use crate::renderer::{self, RenderBridge};
use crate::runtime::{PlantUmlRuntime, RuntimeLocator};
use crate::types::{OutputFormat, QualityOptions};

/// Bridge to the bundled PlantUML jar
///
/// # Example
///
/// ```no_run
/// use plantview_render::{PlantUmlBridge, RenderBridge, RuntimeLocator};
///
/// let bridge = PlantUmlBridge::new(RuntimeLocator::new().with_jar("jar/plantuml.jar"));
/// bridge.initialize()?;
/// let png = bridge.render_png("@startuml\nAlice -> Bob: hi\n@enduml")?;
/// # Ok::<(), plantview_render::RenderError>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct PlantUmlBridge {
    locator: RuntimeLocator,
}

impl PlantUmlBridge {
    pub fn new(locator: RuntimeLocator) -> Self {
        Self { locator }
    }

    pub fn locator(&self) -> &RuntimeLocator {
        &self.locator
    }
}

impl RenderBridge for PlantUmlBridge {
    fn name(&self) -> &'static str {
        "plantuml"
    }

    fn initialize(&self) -> Result<()> {
        PlantUmlRuntime::start(&self.locator).map(|_| ())
    }

    fn render(&self, source: &str, format: OutputFormat, quality: &QualityOptions) -> Result<Vec<u8>> {
        let runtime = PlantUmlRuntime::start(&self.locator)?;
        let prepared = detect::inject_quality(source, format, quality);

        let data = runtime.render(&prepared, format)?;
        if data.is_empty() {
            return Err(RenderError::Render(
                "PlantUML produced no output; check the diagram for syntax errors".to_string(),
            ));
        }

        if !renderer::has_signature(&data, format) {
            let text = String::from_utf8_lossy(&data);
            return Err(RenderError::Render(format!(
                "PlantUML did not return a {} image: {}",
                format,
                text.lines().next().unwrap_or_default().trim()
            )));
        }

        log::debug!("PlantUML rendered {} ({} bytes)", format, data.len());
        Ok(data)
    }

    fn cancel(&self) {
        if let Some(runtime) = PlantUmlRuntime::get() {
            runtime.cancel();
        }
    }
}
