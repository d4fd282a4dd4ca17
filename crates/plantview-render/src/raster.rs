//! Image helpers for the preview
//!
//! PNG decoding goes through `image`; SVG goes through resvg when the
//! `svg-preview` feature is enabled.

use std::io::Cursor;

use image::imageops::FilterType;
use image::{ImageFormat, ImageReader, RgbaImage};

use crate::error::PreviewError;
use crate::renderer::RenderedDiagram;
use crate::types::OutputFormat;

/// Pixels ready for display, straight (non-premultiplied) RGBA
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

/// Natural pixel size of a rendered diagram
pub fn image_dimensions(diagram: &RenderedDiagram) -> Result<(u32, u32), PreviewError> {
    match diagram.format {
        OutputFormat::Png => png_dimensions(&diagram.data),
        OutputFormat::Svg => {
            let svg = diagram
                .svg_text()
                .ok_or_else(|| PreviewError::Decode("SVG output is not valid UTF-8".to_string()))?;
            svg_dimensions(svg)
        }
    }
}

/// Read the size from a PNG header without decoding pixels
pub fn png_dimensions(data: &[u8]) -> Result<(u32, u32), PreviewError> {
    ImageReader::with_format(Cursor::new(data), ImageFormat::Png)
        .into_dimensions()
        .map_err(|e| PreviewError::Decode(e.to_string()))
}

/// Decode a PNG into RGBA pixels
pub fn decode_png(data: &[u8]) -> Result<RgbaImage, PreviewError> {
    image::load_from_memory_with_format(data, ImageFormat::Png)
        .map(|img| img.to_rgba8())
        .map_err(|e| PreviewError::Decode(e.to_string()))
}

/// Decode a PNG and scale it to `width` x `height`
pub fn png_frame(data: &[u8], width: u32, height: u32) -> Result<Frame, PreviewError> {
    let decoded = decode_png(data)?;
    let (width, height) = (width.max(1), height.max(1));
    let scaled = if decoded.dimensions() == (width, height) {
        decoded
    } else {
        image::imageops::resize(&decoded, width, height, FilterType::Triangle)
    };
    Ok(Frame {
        width,
        height,
        rgba: scaled.into_raw(),
    })
}

#[cfg(feature = "svg-preview")]
mod svg {
    use std::sync::Arc;

    use once_cell::sync::Lazy;

    use super::Frame;
    use crate::error::PreviewError;

    /// System fonts, loaded once; PlantUML SVG carries plenty of text
    static FONTS: Lazy<Arc<usvg::fontdb::Database>> = Lazy::new(|| {
        let mut db = usvg::fontdb::Database::new();
        db.load_system_fonts();
        log::debug!("Loaded {} font faces for SVG preview", db.len());
        Arc::new(db)
    });

    fn parse(svg: &str) -> Result<usvg::Tree, PreviewError> {
        let mut options = usvg::Options::default();
        options.fontdb = Arc::clone(&FONTS);
        usvg::Tree::from_str(svg, &options)
            .map_err(|e| PreviewError::Decode(format!("SVG parsing failed: {}", e)))
    }

    pub fn svg_dimensions(svg: &str) -> Result<(u32, u32), PreviewError> {
        let size = parse(svg)?.size();
        Ok((size.width().ceil() as u32, size.height().ceil() as u32))
    }

    pub fn svg_frame(svg: &str, width: u32, height: u32) -> Result<Frame, PreviewError> {
        let tree = parse(svg)?;
        let size = tree.size();
        let (width, height) = (width.max(1), height.max(1));

        let mut pixmap = tiny_skia::Pixmap::new(width, height).ok_or_else(|| {
            PreviewError::Decode(format!("Failed to create pixmap ({}x{})", width, height))
        })?;
        pixmap.fill(tiny_skia::Color::WHITE);

        let transform = tiny_skia::Transform::from_scale(
            width as f32 / size.width(),
            height as f32 / size.height(),
        );
        resvg::render(&tree, transform, &mut pixmap.as_mut());

        let rgba = pixmap
            .pixels()
            .iter()
            .flat_map(|px| {
                let c = px.demultiply();
                [c.red(), c.green(), c.blue(), c.alpha()]
            })
            .collect();

        Ok(Frame { width, height, rgba })
    }
}

#[cfg(feature = "svg-preview")]
pub use svg::{svg_dimensions, svg_frame};

#[cfg(not(feature = "svg-preview"))]
pub fn svg_dimensions(_svg: &str) -> Result<(u32, u32), PreviewError> {
    Err(PreviewError::Decode(
        "SVG preview support is not compiled in".to_string(),
    ))
}

#[cfg(not(feature = "svg-preview"))]
pub fn svg_frame(_svg: &str, _width: u32, _height: u32) -> Result<Frame, PreviewError> {
    Err(PreviewError::Decode(
        "SVG preview support is not compiled in".to_string(),
    ))
}

#[cfg(test)]
pub(crate) fn tiny_png(width: u32, height: u32) -> Vec<u8> {
    let img = RgbaImage::from_pixel(width, height, image::Rgba([10, 20, 30, 255]));
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, ImageFormat::Png)
        .expect("encoding to memory");
    out.into_inner()
}
