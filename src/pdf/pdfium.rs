//! Page rasterization backed by the Pdfium shared library

use image::DynamicImage;
use log::debug;
use pdfium_render::prelude::{PdfRenderConfig, Pdfium, PdfiumError};
use crate::error::{Error, Result};
use crate::raster::PageRasterizer;

/// Renders pages with Pdfium, including form fields and annotations so that
/// signature widget appearances show up in the output
pub struct PdfiumRasterizer {
    pdfium: Pdfium,
}

impl PdfiumRasterizer {
    /// Bind Pdfium from the working directory, falling back to the system library
    pub fn new() -> Result<Self> {
        Self::with_library_dir("./")
    }

    /// Bind Pdfium from `dir`, falling back to the system library
    pub fn with_library_dir(dir: &str) -> Result<Self> {
        let bindings = Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(dir))
            .or_else(|_| Pdfium::bind_to_system_library())
            .map_err(|e| {
                Error::RendererUnavailable(format!(
                    "failed to load Pdfium ({}); place the Pdfium shared library in {} or install it system-wide",
                    e, dir
                ))
            })?;
        debug!("Pdfium bound (library dir {})", dir);
        Ok(Self { pdfium: Pdfium::new(bindings) })
    }
}

fn render_error(page_index: usize, err: PdfiumError) -> Error {
    Error::RenderFailure {
        page: page_index + 1,
        reason: err.to_string(),
    }
}

impl PageRasterizer for PdfiumRasterizer {
    fn render_page(&self, pdf: &[u8], page_index: usize, dpi: f32) -> Result<DynamicImage> {
        let index = u16::try_from(page_index).map_err(|_| Error::RenderFailure {
            page: page_index + 1,
            reason: "page index exceeds Pdfium limits (must be <= 65535)".to_string(),
        })?;

        let document = self
            .pdfium
            .load_pdf_from_byte_slice(pdf, None)
            .map_err(|e| render_error(page_index, e))?;
        let page = document
            .pages()
            .get(index)
            .map_err(|e| render_error(page_index, e))?;

        let config = PdfRenderConfig::new()
            .scale_page_by_factor(dpi / 72.0)
            .render_form_data(true)
            .render_annotations(true);
        let bitmap = page
            .render_with_config(&config)
            .map_err(|e| render_error(page_index, e))?;

        Ok(bitmap.as_image())
    }
}
