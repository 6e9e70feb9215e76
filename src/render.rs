//! SVG rasterization collaborator.
//!
//! The tagger needs PNG renderings of the whole image and of single classes
//! to give the VLM visual context. [`Rasterizer`] is the seam; the default
//! implementation renders through usvg + resvg.
use crate::error::{PipelineError, PipelineResult};
use base64::Engine as _;
use std::io::Cursor;

/// Pixel size of the longer raster edge.
const TARGET_LONG_EDGE: f32 = 768.0;

pub trait Rasterizer {
    /// Render SVG markup to PNG bytes.
    fn rasterize_png(&self, svg: &str) -> PipelineResult<Vec<u8>>;
}

impl<R: Rasterizer + ?Sized> Rasterizer for Box<R> {
    fn rasterize_png(&self, svg: &str) -> PipelineResult<Vec<u8>> {
        (**self).rasterize_png(svg)
    }
}

/// Render and encode as standard base64.
pub fn rasterize_base64(rasterizer: &dyn Rasterizer, svg: &str) -> PipelineResult<String> {
    let png = rasterizer.rasterize_png(svg)?;
    Ok(base64::engine::general_purpose::STANDARD.encode(png))
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ResvgRasterizer;

impl Rasterizer for ResvgRasterizer {
    fn rasterize_png(&self, svg: &str) -> PipelineResult<Vec<u8>> {
        let options = usvg::Options::default();
        let tree = usvg::Tree::from_str(svg, &options)
            .map_err(|err| PipelineError::render(format!("parse svg tree: {err}")))?;
        let (width, height, scale) = raster_params(tree.size().width(), tree.size().height())?;

        let mut pixmap = resvg::tiny_skia::Pixmap::new(width, height)
            .ok_or_else(|| PipelineError::render("failed to allocate svg pixmap"))?;
        pixmap.fill(resvg::tiny_skia::Color::WHITE);
        let transform = resvg::tiny_skia::Transform::from_scale(scale, scale);
        resvg::render(&tree, transform, &mut pixmap.as_mut());

        // Opaque background, so premultiplied and straight RGBA agree.
        let image = image::RgbaImage::from_raw(width, height, pixmap.take())
            .ok_or_else(|| PipelineError::render("pixmap size does not match its buffer"))?;
        let mut png = Vec::new();
        image::DynamicImage::ImageRgba8(image)
            .write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png)
            .map_err(|err| PipelineError::render(format!("encode png: {err}")))?;
        Ok(png)
    }
}

/// Pick pixel dimensions and a uniform scale for an SVG of the given size.
///
/// The longer edge always lands on `TARGET_LONG_EDGE` pixels: small drawings
/// scale up, large ones scale down.
fn raster_params(width: f32, height: f32) -> PipelineResult<(u32, u32, f32)> {
    if !width.is_finite() || !height.is_finite() || width <= 0.0 || height <= 0.0 {
        return Err(PipelineError::render("svg has invalid width/height"));
    }
    let long_edge = width.max(height);
    let scale = TARGET_LONG_EDGE / long_edge;
    let w = ((width * scale).round() as u32).max(1);
    let h = ((height * scale).round() as u32).max(1);
    Ok((w, h, scale))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_svgs_scale_up_to_target() {
        let (w, h, scale) = raster_params(100.0, 50.0).expect("params");
        assert_eq!((w, h), (768, 384));
        assert!((scale - 7.68).abs() < 1e-4);
    }

    #[test]
    fn large_svgs_scale_down_to_target() {
        let (w, h, scale) = raster_params(2000.0, 8000.0).expect("params");
        assert_eq!((w, h), (192, 768));
        assert!((scale - 0.096).abs() < 1e-6);
    }

    #[test]
    fn invalid_sizes_are_render_errors() {
        assert!(matches!(
            raster_params(0.0, 10.0),
            Err(PipelineError::Render(_))
        ));
        assert!(matches!(
            raster_params(f32::NAN, 10.0),
            Err(PipelineError::Render(_))
        ));
    }

    #[test]
    fn resvg_renders_png_bytes() {
        let svg = r#"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 10 10"><rect width="5" height="5" fill="blue"/></svg>"#;
        let png = ResvgRasterizer.rasterize_png(svg).expect("render");
        assert_eq!(&png[1..4], b"PNG");
    }

    #[test]
    fn base64_wraps_rasterizer_output() {
        struct Fixed;
        impl Rasterizer for Fixed {
            fn rasterize_png(&self, _svg: &str) -> PipelineResult<Vec<u8>> {
                Ok(b"abc".to_vec())
            }
        }
        assert_eq!(rasterize_base64(&Fixed, "<svg/>").expect("encode"), "YWJj");
    }
}
