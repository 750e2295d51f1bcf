//! Signature appearance workflows
//!
//! [`Stamper`] ties the pieces together: find a signature widget in a signed
//! PDF, render exactly its appearance, and draw that image onto another PDF.
//! Every call parses its own copies of the inputs and either returns the
//! complete output document or an error; nothing is written on failure.

use log::{debug, info};
use crate::error::{Error, Result};
use crate::geometry::{flip_vertical, upright_size, Fractions, Rect};
use crate::pdf::signatures::{self, SignatureLocation};
use crate::pdf::stamp::{self, PageTarget, Placement, PlacementSpec};
use crate::pdf::PdfDocument;
use crate::raster::{rasterize_region, Limits, PageRasterizer, RasterImage, DEFAULT_DPI};

/// Options for [`Stamper::copy_signature_appearance`]
#[derive(Debug, Clone)]
pub struct CopyOptions {
    /// 1-based page of the signed document holding the widget
    pub source_page: usize,
    /// 1-based page of the target document to stamp
    pub target_page: usize,
    /// Region to crop when the source page has no signature widget
    /// (upright viewer coordinates; ignored when all zero)
    pub manual_source: Rect,
    /// Where to draw on the target page (upright viewer coordinates).
    /// All zero means "same place as the source widget".
    pub destination: Rect,
    /// `manual_source` and `destination` measure y from the top of the page
    pub coords_from_top: bool,
    /// Stroke a 1pt border around the stamp
    pub debug_border: bool,
    /// Ignore `destination` and reuse the source widget's position
    pub use_original_location: bool,
    /// When reusing the widget's position, scale it to the target page size
    pub normalize_to_target: bool,
}

impl Default for CopyOptions {
    fn default() -> Self {
        Self {
            source_page: 1,
            target_page: 1,
            manual_source: Rect::default(),
            destination: Rect::default(),
            coords_from_top: false,
            debug_border: false,
            use_original_location: false,
            normalize_to_target: true,
        }
    }
}

/// Options for [`Stamper::stamp_all_pages`]
#[derive(Debug, Clone)]
pub struct StampAllOptions {
    /// 1-based page of the signed document holding the widget
    pub source_page: usize,
    pub debug_border: bool,
}

impl Default for StampAllOptions {
    fn default() -> Self {
        Self {
            source_page: 1,
            debug_border: false,
        }
    }
}

/// A serialized, stamped PDF
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StampedDocument(Vec<u8>);

impl StampedDocument {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }
}

impl AsRef<[u8]> for StampedDocument {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Copies signature appearances between PDFs
///
/// # Example
///
/// ```no_run
/// use sigstamp::{CopyOptions, PdfiumRasterizer, Stamper};
///
/// let rasterizer = PdfiumRasterizer::new().expect("Pdfium not available");
/// let stamper = Stamper::new(&rasterizer);
///
/// let signed = std::fs::read("signed.pdf").unwrap();
/// let target = std::fs::read("contract.pdf").unwrap();
/// let options = CopyOptions {
///     use_original_location: true,
///     ..Default::default()
/// };
///
/// let stamped = stamper
///     .copy_signature_appearance(&signed, &target, &options)
///     .expect("Failed to copy signature");
/// std::fs::write("contract-signed.pdf", stamped.as_bytes()).unwrap();
/// ```
pub struct Stamper<'a> {
    rasterizer: &'a dyn PageRasterizer,
    limits: Limits,
    dpi: f32,
}

impl<'a> Stamper<'a> {
    /// A stamper rendering at 300 dpi with the default limits
    pub fn new(rasterizer: &'a dyn PageRasterizer) -> Self {
        Self {
            rasterizer,
            limits: Limits::default(),
            dpi: DEFAULT_DPI,
        }
    }

    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_dpi(mut self, dpi: f32) -> Self {
        self.dpi = dpi;
        self
    }

    /// Render the signature widget on a page of `source` and draw it on one
    /// page of `target`.
    ///
    /// Without a widget on `source_page`, `manual_source` is cropped instead
    /// (when it has an area). The destination is either the caller's rect or,
    /// when that is all zero or `use_original_location` is set, the widget's
    /// own position (scaled to the target page with `normalize_to_target`).
    pub fn copy_signature_appearance(
        &self,
        source: &[u8],
        target: &[u8],
        options: &CopyOptions,
    ) -> Result<StampedDocument> {
        let source_doc = PdfDocument::load(source)?;
        let mut target_doc = PdfDocument::load(target)?;
        self.limits.check_page_count(target_doc.page_count())?;

        source_doc.check_page(options.source_page, "srcPage")?;
        target_doc.check_page(options.target_page, "dstPage")?;

        let widget = signatures::find_on_page(&source_doc, options.source_page)?;

        let crop_rect = match &widget {
            Some(location) => {
                debug!(
                    "Using signature field '{}' on page {}",
                    location.field_name, location.page
                );
                location.upright_from_bottom()
            }
            None if options.manual_source.has_area() => {
                debug!("No signature widget on page {}, using manual crop", options.source_page);
                if options.coords_from_top {
                    let page_box = source_doc.visible_box(options.source_page)?;
                    let rotation = source_doc.rotation(options.source_page)?;
                    let (_, upright_height) = upright_size(page_box, rotation);
                    flip_vertical(options.manual_source, upright_height)
                } else {
                    options.manual_source
                }
            }
            None => return Err(missing_widget(&source_doc, options.source_page)),
        };
        stamp::check_extent(crop_rect)?;

        let image = rasterize_region(
            self.rasterizer,
            &source_doc,
            options.source_page,
            self.dpi,
            crop_rect,
            &self.limits,
        )?;

        let placement = if options.use_original_location || options.destination.is_zero() {
            let location = match &widget {
                Some(location) => location,
                None => return Err(missing_widget(&source_doc, options.source_page)),
            };
            let upright = location.upright_from_bottom();
            if options.normalize_to_target {
                Placement::Relative(Fractions::of(upright, location.page_box, location.rotation))
            } else {
                Placement::Absolute { rect: upright, coords_from_top: false }
            }
        } else {
            Placement::Absolute {
                rect: options.destination,
                coords_from_top: options.coords_from_top,
            }
        };

        let drawn = stamp::place_on_page(
            &mut target_doc,
            options.target_page,
            &image,
            &placement,
            options.debug_border,
        )?;
        info!(
            "Copied signature appearance ({}x{} px) to page {} at ({}, {}) {}x{}",
            image.width, image.height, options.target_page, drawn.x, drawn.y, drawn.width, drawn.height
        );

        target_doc.to_bytes().map(StampedDocument)
    }

    /// Render the signature widget on `source_page` once and draw it on every
    /// page of `target` at the same relative position.
    pub fn stamp_all_pages(
        &self,
        source: &[u8],
        target: &[u8],
        options: &StampAllOptions,
    ) -> Result<StampedDocument> {
        let source_doc = PdfDocument::load(source)?;
        let mut target_doc = PdfDocument::load(target)?;
        self.limits.check_page_count(target_doc.page_count())?;
        source_doc.check_page(options.source_page, "srcPage")?;

        let location = match signatures::find_on_page(&source_doc, options.source_page)? {
            Some(location) => location,
            None => return Err(missing_widget(&source_doc, options.source_page)),
        };

        let upright = location.upright_from_bottom();
        stamp::check_extent(upright)?;
        let fractions = Fractions::of(upright, location.page_box, location.rotation);
        debug!(
            "Signature field '{}' sits at {:.4}, {:.4} ({:.4} x {:.4}) of its page",
            location.field_name, fractions.x, fractions.y, fractions.width, fractions.height
        );

        let image = rasterize_region(
            self.rasterizer,
            &source_doc,
            options.source_page,
            self.dpi,
            upright,
            &self.limits,
        )?;

        let drawn = stamp::place_on_all_pages(&mut target_doc, &image, fractions, options.debug_border)?;
        info!("Stamped signature appearance on {} pages", drawn.len());

        target_doc.to_bytes().map(StampedDocument)
    }

    /// Every signature widget in `source`
    pub fn list_signatures(&self, source: &[u8]) -> Result<Vec<SignatureLocation>> {
        let doc = PdfDocument::load(source)?;
        signatures::list_signatures(&doc)
    }

    /// The first widget of the named signature field
    pub fn find_signature(&self, source: &[u8], field_name: &str) -> Result<SignatureLocation> {
        let doc = PdfDocument::load(source)?;
        signatures::find_by_name(&doc, field_name)?.ok_or_else(|| Error::NoSignatureFieldFound {
            field: Some(field_name.to_string()),
        })
    }

    /// Render one signature field's appearance to PNG: the named field, or
    /// the first signature field in the document
    pub fn render_signature(
        &self,
        source: &[u8],
        field_name: Option<&str>,
        dpi: f32,
    ) -> Result<RasterImage> {
        let doc = PdfDocument::load(source)?;

        let location = match field_name {
            Some(name) => signatures::find_by_name(&doc, name)?,
            None => signatures::list_signatures(&doc)?.into_iter().next(),
        };
        let location = location.ok_or_else(|| Error::NoSignatureFieldFound {
            field: field_name.map(str::to_string),
        })?;

        let region = location.upright_from_bottom();
        stamp::check_extent(region)?;
        rasterize_region(self.rasterizer, &doc, location.page, dpi, region, &self.limits)
    }

    /// Draw a caller-supplied PNG onto `target`
    pub fn place_image(&self, target: &[u8], png: &[u8], spec: &PlacementSpec) -> Result<StampedDocument> {
        let mut target_doc = PdfDocument::load(target)?;
        self.limits.check_page_count(target_doc.page_count())?;
        if let PageTarget::Page(page) = spec.target {
            target_doc.check_page(page, "dstPage")?;
        }

        let image = RasterImage::from_png(png.to_vec())?;
        let drawn = stamp::place(&mut target_doc, &image, spec)?;
        info!("Placed {}x{} px image on {} page(s)", image.width, image.height, drawn.len());

        target_doc.to_bytes().map(StampedDocument)
    }
}

/// The error for a page without a signature widget: distinguishes documents
/// with no signature fields at all
fn missing_widget(doc: &PdfDocument, page: usize) -> Error {
    if signatures::has_signature_fields(doc) {
        Error::NoWidgetOnPage { page }
    } else {
        Error::NoSignatureFieldFound { field: None }
    }
}
