//! PDF manipulation module

pub mod document;
pub mod signatures;
pub mod stamp;
#[cfg(feature = "pdfium")]
pub mod pdfium;

// Re-export commonly used items
pub use document::PdfDocument;
pub use signatures::{find_by_name, find_on_page, list_signatures, SignatureLocation};
pub use stamp::{place, place_on_all_pages, place_on_page, PageTarget, Placement, PlacementSpec};
#[cfg(feature = "pdfium")]
pub use pdfium::PdfiumRasterizer;
