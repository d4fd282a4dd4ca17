//! Type definitions for diagram rendering
//!
//! This module defines the output formats, quality options and the
//! immutable render request.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::RenderError;

/// File extensions recognised as PlantUML source
pub const SOURCE_EXTENSIONS: &[&str] = &["puml", "plantuml", "iuml"];

/// Check whether a path carries a PlantUML source extension
pub fn is_source_path(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let ext = ext.to_lowercase();
            SOURCE_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}

/// Output format for rendered diagrams
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// PNG raster image
    #[default]
    Png,
    /// SVG vector image
    Svg,
}

impl OutputFormat {
    /// Command-line flag selecting this format in the PlantUML jar
    pub fn plantuml_flag(&self) -> &'static str {
        match self {
            Self::Png => "-tpng",
            Self::Svg => "-tsvg",
        }
    }

    /// Get the Kroki API format name
    pub fn kroki_name(&self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Svg => "svg",
        }
    }

    /// Get the file extension for this format
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Svg => "svg",
        }
    }

    /// Get the MIME type for this format
    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Svg => "image/svg+xml",
        }
    }

    /// Whether the rendered bytes are text (SVG markup)
    pub fn is_text(&self) -> bool {
        matches!(self, Self::Svg)
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.extension())
    }
}

impl FromStr for OutputFormat {
    type Err = RenderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "png" => Ok(Self::Png),
            "svg" => Ok(Self::Svg),
            _ => Err(RenderError::UnsupportedFormat(s.to_string())),
        }
    }
}

/// Lowest DPI accepted for PNG output
pub const MIN_DPI: u32 = 72;
/// Highest DPI accepted for PNG output
pub const MAX_DPI: u32 = 600;
/// Lowest engine scale
pub const MIN_SCALE: f32 = 1.0;
/// Highest engine scale
pub const MAX_SCALE: f32 = 8.0;

/// Quality options passed to the engine
///
/// `dpi` only applies to PNG output. `None` leaves the engine default.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct QualityOptions {
    /// PNG resolution in dots per inch
    pub dpi: Option<u32>,
    /// Engine scale factor
    pub scale: Option<f32>,
}

impl QualityOptions {
    /// Create options that leave every engine default in place
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the DPI, clamped to [`MIN_DPI`]..=[`MAX_DPI`]
    pub fn with_dpi(mut self, dpi: u32) -> Self {
        self.dpi = Some(dpi.clamp(MIN_DPI, MAX_DPI));
        self
    }

    /// Set the scale, clamped to [`MIN_SCALE`]..=[`MAX_SCALE`]
    ///
    /// Non-finite values are ignored.
    pub fn with_scale(mut self, scale: f32) -> Self {
        if scale.is_finite() {
            self.scale = Some(scale.clamp(MIN_SCALE, MAX_SCALE));
        }
        self
    }

    /// Drop options that do not apply to `format`
    pub fn for_format(self, format: OutputFormat) -> Self {
        match format {
            OutputFormat::Png => self,
            OutputFormat::Svg => Self { dpi: None, ..self },
        }
    }

    /// True when no option is set
    pub fn is_empty(&self) -> bool {
        self.dpi.is_none() && self.scale.is_none()
    }
}

impl From<QualityPreset> for QualityOptions {
    fn from(preset: QualityPreset) -> Self {
        QualityOptions::new()
            .with_dpi(preset.dpi())
            .with_scale(preset.scale())
    }
}

/// Named quality presets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum QualityPreset {
    /// 96 dpi, 1x
    Screen,
    /// 150 dpi, 1x
    #[default]
    Standard,
    /// 300 dpi, 2x
    Hd,
    /// 600 dpi, 2x
    Print,
}

impl QualityPreset {
    pub fn dpi(&self) -> u32 {
        match self {
            Self::Screen => 96,
            Self::Standard => 150,
            Self::Hd => 300,
            Self::Print => 600,
        }
    }

    pub fn scale(&self) -> f32 {
        match self {
            Self::Screen | Self::Standard => 1.0,
            Self::Hd | Self::Print => 2.0,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Screen => "screen",
            Self::Standard => "standard",
            Self::Hd => "hd",
            Self::Print => "print",
        }
    }

    /// Get all presets, lowest quality first
    pub fn all() -> &'static [QualityPreset] {
        &[Self::Screen, Self::Standard, Self::Hd, Self::Print]
    }
}

impl fmt::Display for QualityPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for QualityPreset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "screen" => Ok(Self::Screen),
            "standard" => Ok(Self::Standard),
            "hd" => Ok(Self::Hd),
            "print" => Ok(Self::Print),
            _ => Err(format!("Unknown quality preset: {}", s)),
        }
    }
}

/// One render attempt
///
/// Created per submission and never mutated afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderRequest {
    /// Diagram source exactly as the user typed it
    pub source: String,
    /// Requested output format
    pub format: OutputFormat,
    /// Quality options (dpi is dropped for SVG)
    pub quality: QualityOptions,
}

impl RenderRequest {
    pub fn new(source: impl Into<String>, format: OutputFormat) -> Self {
        Self {
            source: source.into(),
            format,
            quality: QualityOptions::default(),
        }
    }

    pub fn with_quality(mut self, quality: QualityOptions) -> Self {
        self.quality = quality.for_format(self.format);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_format_from_str() {
        assert_eq!("png".parse::<OutputFormat>().unwrap(), OutputFormat::Png);
        assert_eq!("SVG".parse::<OutputFormat>().unwrap(), OutputFormat::Svg);
        assert!("pdf".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn test_output_format_properties() {
        assert_eq!(OutputFormat::Png.extension(), "png");
        assert_eq!(OutputFormat::Svg.mime_type(), "image/svg+xml");
        assert_eq!(OutputFormat::Svg.plantuml_flag(), "-tsvg");
        assert!(OutputFormat::Svg.is_text());
        assert!(!OutputFormat::Png.is_text());
    }

    #[test]
    fn test_source_extensions() {
        assert!(is_source_path(Path::new("flow.puml")));
        assert!(is_source_path(Path::new("dir/Seq.PlantUML")));
        assert!(is_source_path(Path::new("common.iuml")));
        assert!(!is_source_path(Path::new("notes.txt")));
        assert!(!is_source_path(Path::new("puml")));
    }

    #[test]
    fn test_quality_clamping() {
        let q = QualityOptions::new().with_dpi(10).with_scale(100.0);
        assert_eq!(q.dpi, Some(MIN_DPI));
        assert_eq!(q.scale, Some(MAX_SCALE));

        let q = QualityOptions::new().with_scale(f32::NAN);
        assert_eq!(q.scale, None);
    }

    #[test]
    fn test_svg_drops_dpi() {
        let q = QualityOptions::from(QualityPreset::Hd);
        assert_eq!(q.for_format(OutputFormat::Png).dpi, Some(300));
        assert_eq!(q.for_format(OutputFormat::Svg).dpi, None);
        assert_eq!(q.for_format(OutputFormat::Svg).scale, Some(2.0));

        let req = RenderRequest::new("a -> b", OutputFormat::Svg).with_quality(q);
        assert_eq!(req.quality.dpi, None);
    }

    #[test]
    fn test_presets() {
        assert_eq!(QualityPreset::default(), QualityPreset::Standard);
        assert_eq!("print".parse::<QualityPreset>().unwrap().dpi(), 600);
        assert!("ultra".parse::<QualityPreset>().is_err());
        assert_eq!(QualityPreset::all().len(), 4);
    }
}
