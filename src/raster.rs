//! Page rasterization and pixel-accurate cropping
//!
//! Rendering itself is delegated to a [`PageRasterizer`]; this module owns the
//! point-to-pixel conversion, the vertical flip between PDF space (origin at
//! the bottom) and image space (origin at the top), and bounds-safe cropping.

use std::io::Cursor;
use image::{DynamicImage, GenericImageView, ImageFormat};
use log::debug;
use crate::error::{Error, Result};
use crate::geometry::{upright_size, Rect};
use crate::pdf::PdfDocument;

/// Resolution used when copying signature appearances
pub const DEFAULT_DPI: f32 = 300.0;

/// Renders whole pages to pixels
///
/// Implementations must render the page upright (with `/Rotate` applied) and
/// limited to its visible box, so that image pixel `(0, 0)` is the top-left
/// corner the viewer sees.
pub trait PageRasterizer {
    /// Render the page at `page_index` (0-based) of `pdf` at `dpi`
    fn render_page(&self, pdf: &[u8], page_index: usize, dpi: f32) -> Result<DynamicImage>;
}

/// Upper bounds checked before any rendering or stamping work
#[derive(Debug, Clone, Copy)]
pub struct Limits {
    /// Highest accepted rendering resolution
    pub max_dpi: f32,
    /// Largest target document accepted for stamping
    pub max_pages: usize,
    /// Largest rendered page, in pixels
    pub max_raster_pixels: u64,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_dpi: 600.0,
            max_pages: 500,
            max_raster_pixels: 200_000_000,
        }
    }
}

impl Limits {
    pub fn check_dpi(&self, dpi: f32) -> Result<()> {
        if !dpi.is_finite() || dpi <= 0.0 {
            return Err(Error::ResourceLimit(format!("dpi must be positive, got {}", dpi)));
        }
        if dpi > self.max_dpi {
            return Err(Error::ResourceLimit(format!(
                "dpi {} exceeds the maximum of {}",
                dpi, self.max_dpi
            )));
        }
        Ok(())
    }

    pub fn check_page_count(&self, page_count: usize) -> Result<()> {
        if page_count > self.max_pages {
            return Err(Error::ResourceLimit(format!(
                "document has {} pages, the maximum is {}",
                page_count, self.max_pages
            )));
        }
        Ok(())
    }

    /// Reject pages whose rendering at `dpi` would exceed the pixel budget
    pub fn check_raster_size(&self, width_pt: f32, height_pt: f32, dpi: f32) -> Result<()> {
        let scale = dpi / 72.0;
        let pixels = (width_pt * scale).ceil() as u64 * (height_pt * scale).ceil() as u64;
        if pixels > self.max_raster_pixels {
            return Err(Error::ResourceLimit(format!(
                "rendering {}x{}pt at {} dpi needs {} pixels, the maximum is {}",
                width_pt, height_pt, dpi, pixels, self.max_raster_pixels
            )));
        }
        Ok(())
    }
}

/// A rendered appearance, PNG encoded
#[derive(Debug, Clone, PartialEq)]
pub struct RasterImage {
    png: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl RasterImage {
    /// Encode an image losslessly
    pub fn from_image(image: &DynamicImage) -> Result<Self> {
        let mut png = Vec::new();
        image.write_to(&mut Cursor::new(&mut png), ImageFormat::Png)?;
        Ok(Self {
            png,
            width: image.width(),
            height: image.height(),
        })
    }

    /// Wrap caller-supplied PNG bytes, validating them
    pub fn from_png(png: Vec<u8>) -> Result<Self> {
        let decoded = image::load_from_memory_with_format(&png, ImageFormat::Png)?;
        Ok(Self {
            width: decoded.width(),
            height: decoded.height(),
            png,
        })
    }

    pub fn png_bytes(&self) -> &[u8] {
        &self.png
    }

    pub fn into_png_bytes(self) -> Vec<u8> {
        self.png
    }

    pub fn decode(&self) -> Result<DynamicImage> {
        Ok(image::load_from_memory_with_format(&self.png, ImageFormat::Png)?)
    }
}

/// Pixel rectangle, top-left origin; may extend past the image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelRect {
    pub x: i64,
    pub y: i64,
    pub width: i64,
    pub height: i64,
}

/// Round half up, matching how viewers snap points to pixels
fn round_px(value: f32) -> i64 {
    (value + 0.5).floor() as i64
}

/// Convert an upright rect (points, bottom-left origin) to pixels in an
/// image of `image_height` rendered at `dpi`.
pub fn pixel_rect(upright: Rect, dpi: f32, image_height: u32) -> PixelRect {
    let scale = dpi / 72.0;
    let px = round_px(upright.x * scale);
    let py = round_px(upright.y * scale);
    let pw = round_px(upright.width * scale);
    let ph = round_px(upright.height * scale);

    PixelRect {
        x: px,
        y: image_height as i64 - (py + ph),
        width: pw,
        height: ph,
    }
}

/// Clamp a pixel rect into `0..extent`, keeping at least one pixel
fn clamp_span(start: i64, len: i64, extent: u32) -> (u32, u32) {
    let extent = extent as i64;
    let mut lo = start.clamp(0, extent);
    let hi = (start + len).clamp(0, extent);
    let mut size = (hi - lo).max(1);
    if lo + size > extent {
        lo = (extent - 1).max(0);
        size = 1;
    }
    (lo as u32, size as u32)
}

/// Crop to `rect`, silently clamped to the image. Never fails; the result is
/// at least 1x1 and always inside the source image.
pub fn crop(image: &DynamicImage, rect: PixelRect) -> DynamicImage {
    let (width, height) = image.dimensions();
    let (x, w) = clamp_span(rect.x, rect.width, width);
    let (y, h) = clamp_span(rect.y, rect.height, height);
    image.crop_imm(x, y, w, h)
}

/// Render a full 1-based page after range and limit checks
pub fn rasterize(
    rasterizer: &dyn PageRasterizer,
    doc: &PdfDocument,
    page: usize,
    dpi: f32,
    limits: &Limits,
) -> Result<DynamicImage> {
    doc.check_page(page, "srcPage")?;
    limits.check_dpi(dpi)?;

    let (width_pt, height_pt) = upright_size(doc.visible_box(page)?, doc.rotation(page)?);
    limits.check_raster_size(width_pt, height_pt, dpi)?;

    debug!("Rendering page {} at {} dpi", page, dpi);
    let image = rasterizer
        .render_page(doc.source_bytes(), page - 1, dpi)
        .map_err(|e| match e {
            Error::RenderFailure { .. } => e,
            other => Error::RenderFailure { page, reason: other.to_string() },
        })?;

    if image.width() == 0 || image.height() == 0 {
        return Err(Error::RenderFailure {
            page,
            reason: "renderer produced an empty image".to_string(),
        });
    }
    Ok(image)
}

/// Render a page and crop it to an upright rect (points, bottom-left origin)
pub fn rasterize_region(
    rasterizer: &dyn PageRasterizer,
    doc: &PdfDocument,
    page: usize,
    dpi: f32,
    upright: Rect,
    limits: &Limits,
) -> Result<RasterImage> {
    let full = rasterize(rasterizer, doc, page, dpi, limits)?;
    let region = pixel_rect(upright, dpi, full.height());
    let cropped = crop(&full, region);
    debug!(
        "Cropped page {} to {}x{} px at ({}, {})",
        page,
        cropped.width(),
        cropped.height(),
        region.x,
        region.y
    );
    RasterImage::from_image(&cropped)
}
