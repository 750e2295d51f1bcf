//! Signature Stamping Library
//!
//! Copies the visible appearance of a PDF signature widget onto other PDFs.
//! This library provides functionality to:
//! - Locate signature widgets in a signed PDF (field tree, page, rectangle)
//! - Render a page and crop exactly the widget's appearance
//! - Draw that image on one or all pages of another PDF, correct under page
//!   rotation, crop box offsets and differing page sizes
//!
//! # Example
//!
//! ```no_run
//! use sigstamp::{PdfiumRasterizer, StampAllOptions, Stamper};
//!
//! let rasterizer = PdfiumRasterizer::new().expect("Pdfium not available");
//! let stamper = Stamper::new(&rasterizer);
//!
//! let signed = std::fs::read("signed.pdf").unwrap();
//! let handout = std::fs::read("handout.pdf").unwrap();
//!
//! let stamped = stamper
//!     .stamp_all_pages(&signed, &handout, &StampAllOptions::default())
//!     .expect("Failed to stamp pages");
//! std::fs::write("handout-stamped.pdf", stamped.as_bytes()).unwrap();
//! ```

pub mod error;
pub mod geometry;
pub mod pdf;
pub mod raster;
pub mod stamping;

// Re-export commonly used items
pub use error::{Error, Result};
pub use geometry::{Fractions, PageBox, Rect, Rotation};
pub use pdf::{PageTarget, PdfDocument, Placement, PlacementSpec, SignatureLocation};
#[cfg(feature = "pdfium")]
pub use pdf::PdfiumRasterizer;
pub use raster::{Limits, PageRasterizer, RasterImage, DEFAULT_DPI};
pub use stamping::{CopyOptions, StampAllOptions, StampedDocument, Stamper};
