//! Preview state: zoom, output format, the current image and exports
//!
//! [`PreviewController`] is synchronous. Results from the render service
//! enter through [`PreviewController::apply`], tagged with the id returned
//! by [`crate::RenderService::submit`]; anything older than the latest
//! [`PreviewController::begin`] is ignored.

use std::path::Path;

use crate::clipboard::ClipboardSink;
use crate::error::PreviewError;
use crate::raster::{self, Frame};
use crate::renderer::RenderedDiagram;
use crate::service::{RenderOutcome, RequestId};
use crate::types::{OutputFormat, QualityOptions, QualityPreset, RenderRequest};

/// Smallest zoom factor (25%)
pub const MIN_ZOOM: f32 = 0.25;
/// Largest zoom factor (600%)
pub const MAX_ZOOM: f32 = 6.0;
/// Multiplier applied per wheel notch
pub const ZOOM_STEP: f32 = 1.1;

/// Changes smaller than this are ignored
const ZOOM_EPSILON: f32 = 1e-3;

/// Bounded zoom factor
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZoomState {
    factor: f32,
}

impl Default for ZoomState {
    fn default() -> Self {
        Self { factor: 1.0 }
    }
}

impl ZoomState {
    pub fn factor(&self) -> f32 {
        self.factor
    }

    /// Zoom as a whole percentage
    pub fn percent(&self) -> u32 {
        (self.factor * 100.0).round() as u32
    }

    /// Step in or out by one notch; the sign of `delta` decides
    ///
    /// Returns true if the factor changed.
    pub fn apply_wheel(&mut self, delta: f32) -> bool {
        if !delta.is_finite() || delta == 0.0 {
            return false;
        }
        let next = if delta > 0.0 {
            self.factor * ZOOM_STEP
        } else {
            self.factor / ZOOM_STEP
        };
        self.set(next)
    }

    /// Set an absolute factor, clamped to [`MIN_ZOOM`]..=[`MAX_ZOOM`]
    ///
    /// Non-finite, non-positive and negligible changes are rejected.
    pub fn set(&mut self, factor: f32) -> bool {
        if !factor.is_finite() || factor <= 0.0 {
            return false;
        }
        let clamped = factor.clamp(MIN_ZOOM, MAX_ZOOM);
        if (clamped - self.factor).abs() < ZOOM_EPSILON {
            return false;
        }
        self.factor = clamped;
        true
    }

    pub fn reset(&mut self) {
        self.factor = 1.0;
    }
}

/// What the host can do, probed once
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    /// SVG output can be displayed
    pub svg_display: bool,
    /// A system clipboard is available
    pub clipboard: bool,
}

impl Capabilities {
    /// Capabilities compiled into this build
    pub fn probe() -> Self {
        let caps = Self {
            svg_display: cfg!(feature = "svg-preview"),
            clipboard: cfg!(feature = "clipboard"),
        };
        log::debug!("Preview capabilities: {:?}", caps);
        caps
    }

    /// A host that can only show PNG and has no clipboard
    pub fn png_only() -> Self {
        Self {
            svg_display: false,
            clipboard: false,
        }
    }
}

/// Things worth telling the user once, outside the error indicator
#[derive(Debug, Clone, PartialEq)]
pub enum Notice {
    /// A format was requested that the host cannot display
    CapabilityDegraded {
        requested: OutputFormat,
        used: OutputFormat,
    },
    /// Save/copy was requested with no successful render on record
    ExportUnavailable,
    /// The render runtime could not be started
    RuntimeUnavailable(String),
}

/// Preview status for the indicator
#[derive(Debug, Clone, PartialEq)]
pub enum PreviewStatus {
    /// Nothing submitted yet
    Idle,
    /// A render is in flight
    Rendering,
    /// The latest render succeeded
    Ready,
    /// The latest render failed; the last success stays exportable
    Error(String),
    /// The text did not look like PlantUML
    Unrecognized,
}

/// Preview controller
#[derive(Debug)]
pub struct PreviewController {
    capabilities: Capabilities,
    requested_format: OutputFormat,
    format: OutputFormat,
    quality: QualityOptions,
    zoom: ZoomState,
    /// Latest id passed to `begin` or `apply`
    latest: Option<RequestId>,
    current: Option<RenderedDiagram>,
    /// Natural pixel size of `current`
    natural_size: Option<(u32, u32)>,
    status: PreviewStatus,
    notices: Vec<Notice>,
    degraded_noticed: bool,
    runtime_noticed: bool,
}

impl Default for PreviewController {
    fn default() -> Self {
        Self::new(Capabilities::probe())
    }
}

impl PreviewController {
    pub fn new(capabilities: Capabilities) -> Self {
        Self {
            capabilities,
            requested_format: OutputFormat::Png,
            format: OutputFormat::Png,
            quality: QualityPreset::default().into(),
            zoom: ZoomState::default(),
            latest: None,
            current: None,
            natural_size: None,
            status: PreviewStatus::Idle,
            notices: Vec::new(),
            degraded_noticed: false,
            runtime_noticed: false,
        }
    }

    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    /// Select the output format, returning the one actually used
    ///
    /// SVG falls back to PNG when the host cannot display it.
    pub fn set_format(&mut self, format: OutputFormat) -> OutputFormat {
        self.requested_format = format;
        self.format = match format {
            OutputFormat::Svg if !self.capabilities.svg_display => {
                if !self.degraded_noticed {
                    log::warn!("SVG preview is unavailable, rendering PNG instead");
                    self.notices.push(Notice::CapabilityDegraded {
                        requested: OutputFormat::Svg,
                        used: OutputFormat::Png,
                    });
                    self.degraded_noticed = true;
                }
                OutputFormat::Png
            }
            other => other,
        };
        self.format
    }

    /// Format used for new requests
    pub fn format(&self) -> OutputFormat {
        self.format
    }

    /// Format the user asked for
    pub fn requested_format(&self) -> OutputFormat {
        self.requested_format
    }

    pub fn quality(&self) -> QualityOptions {
        self.quality
    }

    pub fn set_quality(&mut self, quality: QualityOptions) {
        self.quality = quality;
    }

    /// Build a request for `source` with the current format and quality
    pub fn request(&self, source: &str) -> RenderRequest {
        RenderRequest::new(source, self.format).with_quality(self.quality)
    }

    /// Record that request `id` has been submitted
    pub fn begin(&mut self, id: RequestId) {
        if self.latest.is_some_and(|latest| id < latest) {
            return;
        }
        self.latest = Some(id);
        self.status = PreviewStatus::Rendering;
    }

    /// Apply the outcome of request `id`
    ///
    /// Returns false when the outcome was ignored because a newer request
    /// exists or the request was superseded.
    pub fn apply(&mut self, id: RequestId, outcome: RenderOutcome) -> bool {
        if self.latest.is_some_and(|latest| id < latest) {
            log::debug!("Ignoring stale outcome for request {}", id);
            return false;
        }

        match outcome {
            RenderOutcome::Superseded => return false,
            RenderOutcome::Success(diagram) => match raster::image_dimensions(&diagram) {
                Ok(size) => {
                    log::debug!(
                        "Request {} ready: {} {}x{} ({} bytes)",
                        id,
                        diagram.format,
                        size.0,
                        size.1,
                        diagram.len()
                    );
                    self.current = Some(diagram);
                    self.natural_size = Some(size);
                    self.zoom.reset();
                    self.status = PreviewStatus::Ready;
                }
                Err(e) => {
                    log::warn!("Request {} produced an unreadable image: {}", id, e);
                    self.status = PreviewStatus::Error(e.to_string());
                }
            },
            RenderOutcome::Failure(err) => {
                if !err.is_recoverable() && !self.runtime_noticed {
                    self.notices.push(Notice::RuntimeUnavailable(err.to_string()));
                    self.runtime_noticed = true;
                }
                self.status = PreviewStatus::Error(err.diagnostic());
            }
            RenderOutcome::Unrecognized => {
                self.status = PreviewStatus::Unrecognized;
            }
        }

        self.latest = Some(id);
        true
    }

    /// Zoom by one wheel notch in the direction of `delta`
    pub fn set_zoom(&mut self, delta: f32) -> bool {
        self.zoom.apply_wheel(delta)
    }

    pub fn set_zoom_factor(&mut self, factor: f32) -> bool {
        self.zoom.set(factor)
    }

    pub fn zoom(&self) -> ZoomState {
        self.zoom
    }

    pub fn zoom_percent(&self) -> u32 {
        self.zoom.percent()
    }

    /// Pixel size of the current image at the current zoom
    pub fn display_size(&self) -> Option<(u32, u32)> {
        let (width, height) = self.natural_size?;
        let factor = self.zoom.factor();
        Some((
            ((width as f32 * factor).round() as u32).max(1),
            ((height as f32 * factor).round() as u32).max(1),
        ))
    }

    /// Last successful render
    pub fn current(&self) -> Option<&RenderedDiagram> {
        self.current.as_ref()
    }

    pub fn status(&self) -> &PreviewStatus {
        &self.status
    }

    pub fn notices(&self) -> &[Notice] {
        &self.notices
    }

    /// Drain recorded notices
    pub fn take_notices(&mut self) -> Vec<Notice> {
        std::mem::take(&mut self.notices)
    }

    /// Pixels of the current image at the display size
    pub fn frame(&self) -> Result<Option<Frame>, PreviewError> {
        let (Some(diagram), Some((width, height))) = (&self.current, self.display_size()) else {
            return Ok(None);
        };
        let frame = match diagram.format {
            OutputFormat::Png => raster::png_frame(&diagram.data, width, height)?,
            OutputFormat::Svg => {
                let svg = diagram.svg_text().ok_or_else(|| {
                    PreviewError::Decode("SVG output is not valid UTF-8".to_string())
                })?;
                raster::svg_frame(svg, width, height)?
            }
        };
        Ok(Some(frame))
    }

    fn exportable(&mut self) -> Result<RenderedDiagram, PreviewError> {
        match &self.current {
            Some(diagram) => Ok(diagram.clone()),
            None => {
                log::info!("Nothing to export yet");
                self.notices.push(Notice::ExportUnavailable);
                Err(PreviewError::ExportUnavailable)
            }
        }
    }

    /// Write the last successful render to `path` as-is
    pub fn export_to_file(&mut self, path: &Path) -> Result<(), PreviewError> {
        let diagram = self.exportable()?;
        std::fs::write(path, &*diagram.data)?;
        log::info!(
            "Saved {} diagram to {} ({} bytes)",
            diagram.format,
            path.display(),
            diagram.len()
        );
        Ok(())
    }

    /// Copy the last successful render to `clipboard`
    ///
    /// PNG is copied as an image, SVG as markup text.
    pub fn export_to_clipboard(
        &mut self,
        clipboard: &mut dyn ClipboardSink,
    ) -> Result<(), PreviewError> {
        let diagram = self.exportable()?;
        match diagram.format {
            OutputFormat::Png => {
                let image = raster::decode_png(&diagram.data)?;
                let (width, height) = image.dimensions();
                clipboard.set_image(width as usize, height as usize, image.as_raw())?;
            }
            OutputFormat::Svg => {
                let svg = diagram.svg_text().ok_or_else(|| {
                    PreviewError::Decode("SVG output is not valid UTF-8".to_string())
                })?;
                clipboard.set_text(svg)?;
            }
        }
        log::info!("Copied {} diagram to clipboard", diagram.format);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RenderError;
    use crate::raster::tiny_png;

    #[derive(Default)]
    struct RecordingClipboard {
        texts: Vec<String>,
        images: Vec<(usize, usize, usize)>,
    }

    impl ClipboardSink for RecordingClipboard {
        fn set_text(&mut self, text: &str) -> Result<(), PreviewError> {
            self.texts.push(text.to_string());
            Ok(())
        }

        fn set_image(
            &mut self,
            width: usize,
            height: usize,
            rgba: &[u8],
        ) -> Result<(), PreviewError> {
            self.images.push((width, height, rgba.len()));
            Ok(())
        }
    }

    fn png_success(width: u32, height: u32) -> RenderOutcome {
        RenderOutcome::Success(RenderedDiagram::new(
            tiny_png(width, height),
            OutputFormat::Png,
            "sha256:test".to_string(),
            "test",
        ))
    }

    #[test]
    fn test_zoom_stays_bounded() {
        let mut zoom = ZoomState::default();
        for _ in 0..100 {
            zoom.apply_wheel(120.0);
        }
        assert_eq!(zoom.factor(), MAX_ZOOM);
        assert!(!zoom.apply_wheel(1.0));

        for _ in 0..200 {
            zoom.apply_wheel(-3.0);
        }
        assert_eq!(zoom.factor(), MIN_ZOOM);
        assert_eq!(zoom.percent(), 25);
    }

    #[test]
    fn test_zoom_single_notch() {
        let mut zoom = ZoomState::default();
        assert!(zoom.apply_wheel(1.0));
        assert_eq!(zoom.percent(), 110);
        assert!(zoom.apply_wheel(-1.0));
        assert_eq!(zoom.percent(), 100);
    }

    #[test]
    fn test_zoom_rejects_degenerate() {
        let mut zoom = ZoomState::default();
        assert!(!zoom.apply_wheel(0.0));
        assert!(!zoom.apply_wheel(f32::NAN));
        assert!(!zoom.set(f32::INFINITY));
        assert!(!zoom.set(-2.0));
        assert!(!zoom.set(1.0005));
        assert_eq!(zoom.factor(), 1.0);

        assert!(zoom.set(50.0));
        assert_eq!(zoom.factor(), MAX_ZOOM);
    }

    #[test]
    fn test_svg_degrades_once_without_capability() {
        let mut preview = PreviewController::new(Capabilities::png_only());
        assert_eq!(preview.set_format(OutputFormat::Svg), OutputFormat::Png);
        assert_eq!(preview.set_format(OutputFormat::Svg), OutputFormat::Png);

        assert_eq!(preview.requested_format(), OutputFormat::Svg);
        assert_eq!(preview.request("A -> B").format, OutputFormat::Png);
        assert_eq!(
            preview.notices(),
            &[Notice::CapabilityDegraded {
                requested: OutputFormat::Svg,
                used: OutputFormat::Png,
            }]
        );
    }

    #[test]
    fn test_svg_kept_with_capability() {
        let caps = Capabilities {
            svg_display: true,
            clipboard: false,
        };
        let mut preview = PreviewController::new(caps);
        assert_eq!(preview.set_format(OutputFormat::Svg), OutputFormat::Svg);
        assert!(preview.notices().is_empty());
    }

    #[test]
    fn test_starts_at_standard_quality() {
        let preview = PreviewController::new(Capabilities::png_only());
        assert_eq!(preview.quality(), QualityOptions::from(QualityPreset::Standard));
        assert_eq!(preview.request("A -> B").quality.dpi, Some(150));
    }

    #[test]
    fn test_request_drops_dpi_for_svg() {
        let caps = Capabilities {
            svg_display: true,
            clipboard: false,
        };
        let mut preview = PreviewController::new(caps);
        preview.set_quality(QualityOptions::new().with_dpi(300).with_scale(2.0));
        preview.set_format(OutputFormat::Svg);

        let request = preview.request("A -> B");
        assert_eq!(request.quality.dpi, None);
        assert_eq!(request.quality.scale, Some(2.0));
    }

    #[test]
    fn test_stale_outcome_ignored() {
        let mut preview = PreviewController::new(Capabilities::png_only());
        preview.begin(1);
        preview.begin(2);

        assert!(!preview.apply(1, png_success(4, 4)));
        assert!(preview.current().is_none());
        assert_eq!(preview.status(), &PreviewStatus::Rendering);

        assert!(preview.apply(2, png_success(6, 3)));
        assert_eq!(preview.status(), &PreviewStatus::Ready);
        assert_eq!(preview.display_size(), Some((6, 3)));
    }

    #[test]
    fn test_superseded_is_ignored() {
        let mut preview = PreviewController::new(Capabilities::png_only());
        preview.begin(1);
        assert!(!preview.apply(1, RenderOutcome::Superseded));
        assert_eq!(preview.status(), &PreviewStatus::Rendering);
    }

    #[test]
    fn test_failure_keeps_last_success() {
        let mut preview = PreviewController::new(Capabilities::png_only());
        preview.begin(1);
        preview.apply(1, png_success(4, 4));
        preview.begin(2);
        preview.apply(
            2,
            RenderOutcome::Failure(RenderError::Render("Syntax Error?".to_string())),
        );

        assert_eq!(
            preview.status(),
            &PreviewStatus::Error("Syntax Error?".to_string())
        );
        assert!(preview.current().is_some());

        let mut clipboard = RecordingClipboard::default();
        preview.export_to_clipboard(&mut clipboard).unwrap();
        assert_eq!(clipboard.images, vec![(4, 4, 64)]);
    }

    #[test]
    fn test_runtime_unavailable_noticed_once() {
        let mut preview = PreviewController::new(Capabilities::png_only());
        let failure = || RenderOutcome::Failure(RenderError::RuntimeUnavailable("no java".into()));
        preview.apply(1, failure());
        preview.apply(2, failure());

        let notices = preview.take_notices();
        assert_eq!(notices.len(), 1);
        assert!(matches!(&notices[0], Notice::RuntimeUnavailable(m) if m.contains("no java")));
        assert!(preview.notices().is_empty());
    }

    #[test]
    fn test_unrecognized_status() {
        let mut preview = PreviewController::new(Capabilities::png_only());
        preview.apply(1, RenderOutcome::Unrecognized);
        assert_eq!(preview.status(), &PreviewStatus::Unrecognized);
    }

    #[test]
    fn test_success_resets_zoom() {
        let mut preview = PreviewController::new(Capabilities::png_only());
        preview.apply(1, png_success(10, 10));
        preview.set_zoom(1.0);
        preview.set_zoom(1.0);
        assert_eq!(preview.zoom_percent(), 121);
        assert_eq!(preview.display_size(), Some((12, 12)));

        preview.apply(2, png_success(10, 10));
        assert_eq!(preview.zoom_percent(), 100);
    }

    #[test]
    fn test_export_before_success() {
        let mut preview = PreviewController::new(Capabilities::png_only());
        let mut clipboard = RecordingClipboard::default();

        assert!(matches!(
            preview.export_to_clipboard(&mut clipboard),
            Err(PreviewError::ExportUnavailable)
        ));
        assert!(clipboard.texts.is_empty());
        assert!(clipboard.images.is_empty());

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.png");
        assert!(matches!(
            preview.export_to_file(&path),
            Err(PreviewError::ExportUnavailable)
        ));
        assert!(!path.exists());
        assert_eq!(preview.notices().len(), 2);
    }

    #[test]
    fn test_export_to_file_writes_raw_bytes() {
        let mut preview = PreviewController::new(Capabilities::png_only());
        let png = tiny_png(3, 3);
        preview.apply(
            1,
            RenderOutcome::Success(RenderedDiagram::new(
                png.clone(),
                OutputFormat::Png,
                "sha256:test".to_string(),
                "test",
            )),
        );

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("diagram.txt");
        preview.export_to_file(&path).unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), png);
    }

    #[test]
    fn test_svg_copied_as_text() {
        let svg = r#"<svg xmlns="http://www.w3.org/2000/svg" width="8" height="4"></svg>"#;
        let mut preview = PreviewController::new(Capabilities::png_only());
        let diagram = RenderedDiagram::new(
            svg.as_bytes().to_vec(),
            OutputFormat::Svg,
            "sha256:test".to_string(),
            "test",
        );
        // Without SVG support the image cannot be measured; seed it directly
        preview.current = Some(diagram);

        let mut clipboard = RecordingClipboard::default();
        preview.export_to_clipboard(&mut clipboard).unwrap();
        assert_eq!(clipboard.texts, vec![svg.to_string()]);
        assert!(clipboard.images.is_empty());
    }

    #[test]
    fn test_frame_follows_zoom() {
        let mut preview = PreviewController::new(Capabilities::png_only());
        assert!(preview.frame().unwrap().is_none());

        preview.apply(1, png_success(10, 10));
        preview.set_zoom_factor(2.0);
        let frame = preview.frame().unwrap().unwrap();
        assert_eq!((frame.width, frame.height), (20, 20));
        assert_eq!(frame.rgba.len(), 20 * 20 * 4);
    }
}
