//! Error types for the signature stamping library

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the signature stamping library
#[derive(Error, Debug)]
pub enum Error {
    /// Requested page is outside `1..=page_count`
    #[error("{what} out of range: {page} (document has {page_count} pages)")]
    PageOutOfRange {
        what: &'static str,
        page: usize,
        page_count: usize,
    },

    /// The document has no signature fields, or none with the requested name
    #[error("{}", missing_field_message(.field))]
    NoSignatureFieldFound { field: Option<String> },

    /// Signature fields exist but none is anchored to the requested page
    #[error("No signature widget found on page {page} and no manual crop rectangle provided")]
    NoWidgetOnPage { page: usize },

    /// A crop or placement rectangle resolved to a zero or negative extent
    #[error("Invalid crop dimensions: {width} x {height}")]
    InvalidCropDimensions { width: f32, height: f32 },

    /// The rasterizer could not produce an image for the page
    #[error("Failed to render page {page}: {reason}")]
    RenderFailure { page: usize, reason: String },

    /// No rasterizer backend could be initialised
    #[error("Renderer unavailable: {0}")]
    RendererUnavailable(String),

    /// Request exceeds the configured resource limits
    #[error("Resource limit exceeded: {0}")]
    ResourceLimit(String),

    /// Structurally invalid PDF (missing page tree, bad boxes, ...)
    #[error("Invalid PDF: {0}")]
    InvalidPdf(String),

    /// PDF parsing or serialization error
    #[error("PDF error: {0}")]
    Pdf(#[from] lopdf::Error),

    /// Image decoding or encoding error
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn missing_field_message(field: &Option<String>) -> String {
    match field {
        Some(name) => format!("Signature field not found: {}", name),
        None => "No AcroForm/signature fields found".to_string(),
    }
}
