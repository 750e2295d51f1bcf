//! Drawing a raster stamp onto PDF pages
//!
//! The stamp is embedded once per document as an image XObject and drawn on
//! each page by appending a content stream. The page's own content is wrapped
//! in `q`/`Q` first so that a dangling transformation in the original content
//! cannot displace the stamp.

use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream};
use log::debug;
use crate::error::{Error, Result};
use crate::geometry::{
    flip_vertical, image_matrix, to_content_space, upright_size, Fractions, PageBox, Rect, Rotation,
};
use crate::pdf::document::{resolve, resolve_inherited, PdfDocument};
use crate::raster::RasterImage;

/// Where the stamp goes on a page
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Placement {
    /// Upright viewer coordinates in points; bottom-left origin unless `coords_from_top`
    Absolute { rect: Rect, coords_from_top: bool },
    /// Fractions of each page's upright size
    Relative(Fractions),
}

/// Which pages receive the stamp
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageTarget {
    /// A single 1-based page
    Page(usize),
    AllPages,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlacementSpec {
    pub placement: Placement,
    pub target: PageTarget,
    /// Stroke a 1pt black rectangle around the stamp
    pub debug_border: bool,
}

/// An image already embedded in a document
#[derive(Debug, Clone, Copy)]
pub struct EmbeddedImage {
    id: ObjectId,
    /// Shared `q` stream prepended to every stamped page
    save_state_id: ObjectId,
}

/// Embed the stamp as an image XObject (RGB, with a soft mask when any
/// pixel is not fully opaque)
pub fn embed_image(doc: &mut PdfDocument, image: &RasterImage) -> Result<EmbeddedImage> {
    let decoded = image.decode()?;
    let (width, height) = (decoded.width() as i64, decoded.height() as i64);

    let mut dict = dictionary! {
        "Type" => "XObject",
        "Subtype" => "Image",
        "Width" => width,
        "Height" => height,
        "ColorSpace" => "DeviceRGB",
        "BitsPerComponent" => 8i64,
    };

    let alpha: Option<Vec<u8>> = if decoded.color().has_alpha() {
        let rgba = decoded.to_rgba8();
        if rgba.pixels().any(|p| p[3] < 255) {
            Some(rgba.pixels().map(|p| p[3]).collect())
        } else {
            None
        }
    } else {
        None
    };

    let inner = doc.inner_mut();
    if let Some(alpha) = alpha {
        let smask = Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => width,
                "Height" => height,
                "ColorSpace" => "DeviceGray",
                "BitsPerComponent" => 8i64,
            },
            alpha,
        );
        let smask_id = inner.add_object(smask);
        dict.set("SMask", smask_id);
    }

    let id = inner.add_object(Stream::new(dict, decoded.to_rgb8().into_raw()));
    let save_state_id = inner.add_object(Stream::new(Dictionary::new(), b"q\n".to_vec()));

    debug!("Embedded {}x{} stamp image as object {:?}", width, height, id);
    Ok(EmbeddedImage { id, save_state_id })
}

/// Stamp one 1-based page. Returns the drawn rect in raw content space,
/// including the visible box offset.
pub fn place_on_page(
    doc: &mut PdfDocument,
    page: usize,
    image: &RasterImage,
    placement: &Placement,
    debug_border: bool,
) -> Result<Rect> {
    doc.check_page(page, "dstPage")?;
    let raw = target_rect(doc, page, placement)?;

    let embedded = embed_image(doc, image)?;
    draw_on_page(doc, page, &embedded, raw, debug_border)
}

/// Stamp every page at the same relative position
pub fn place_on_all_pages(
    doc: &mut PdfDocument,
    image: &RasterImage,
    fractions: Fractions,
    debug_border: bool,
) -> Result<Vec<Rect>> {
    place_everywhere(doc, image, &Placement::Relative(fractions), debug_border)
}

/// Stamp according to a full placement spec
pub fn place(doc: &mut PdfDocument, image: &RasterImage, spec: &PlacementSpec) -> Result<Vec<Rect>> {
    match spec.target {
        PageTarget::Page(page) => {
            place_on_page(doc, page, image, &spec.placement, spec.debug_border).map(|rect| vec![rect])
        }
        PageTarget::AllPages => place_everywhere(doc, image, &spec.placement, spec.debug_border),
    }
}

fn place_everywhere(
    doc: &mut PdfDocument,
    image: &RasterImage,
    placement: &Placement,
    debug_border: bool,
) -> Result<Vec<Rect>> {
    // Validate every page before touching the document
    let mut targets = Vec::with_capacity(doc.page_count());
    for page in 1..=doc.page_count() {
        targets.push(target_rect(doc, page, placement)?);
    }

    let embedded = embed_image(doc, image)?;
    let mut drawn = Vec::with_capacity(targets.len());
    for (index, raw) in targets.into_iter().enumerate() {
        drawn.push(draw_on_page(doc, index + 1, &embedded, raw, debug_border)?);
    }
    Ok(drawn)
}

/// The placement as an upright rect with a bottom-left origin
fn resolve_placement(placement: &Placement, page_box: PageBox, rotation: Rotation) -> Rect {
    match *placement {
        Placement::Absolute { rect, coords_from_top: true } => {
            let (_, upright_height) = upright_size(page_box, rotation);
            flip_vertical(rect, upright_height)
        }
        Placement::Absolute { rect, coords_from_top: false } => rect,
        Placement::Relative(fractions) => fractions.resolve(page_box, rotation),
    }
}

/// Where the placement lands on a page in raw content space, including the
/// visible box offset. Fails for empty or non-finite rects.
fn target_rect(doc: &PdfDocument, page: usize, placement: &Placement) -> Result<Rect> {
    let page_box = doc.visible_box(page)?;
    let rotation = doc.rotation(page)?;

    let upright = resolve_placement(placement, page_box, rotation);
    check_extent(upright)?;
    let raw = to_content_space(upright, page_box, rotation).translate(page_box.offset_x, page_box.offset_y);
    check_extent(raw)?;
    Ok(raw)
}

/// Require a positive, finite rectangle
pub(crate) fn check_extent(rect: Rect) -> Result<()> {
    let finite = [rect.x, rect.y, rect.width, rect.height]
        .iter()
        .all(|v| v.is_finite());
    if finite && rect.has_area() {
        Ok(())
    } else {
        Err(Error::InvalidCropDimensions {
            width: rect.width,
            height: rect.height,
        })
    }
}

fn draw_on_page(
    doc: &mut PdfDocument,
    page: usize,
    image: &EmbeddedImage,
    raw: Rect,
    debug_border: bool,
) -> Result<Rect> {
    let page_id = doc.page_id(page)?;
    let rotation = doc.rotation(page)?;

    let name = add_xobject_to_page_resources(doc.inner_mut(), page_id, image.id)?;
    let content = stamp_content(&name, raw, rotation, debug_border);

    let inner = doc.inner_mut();
    let content_id = inner.add_object(Stream::new(Dictionary::new(), content.into_bytes()));
    prepend_content_to_page(inner, page_id, image.save_state_id)?;
    append_content_to_page(inner, page_id, content_id)?;

    debug!(
        "Page {}: stamped /{} at ({}, {}) {}x{} (rotation {})",
        page,
        name,
        raw.x,
        raw.y,
        raw.width,
        raw.height,
        rotation.degrees()
    );
    Ok(raw)
}

/// Content closing the page's graphics state and drawing the stamp on top
fn stamp_content(name: &str, raw: Rect, rotation: Rotation, debug_border: bool) -> String {
    let [a, b, c, d, e, f] = image_matrix(raw, rotation);
    let mut content = format!("Q\nq\n{} {} {} {} {} {} cm\n/{} Do\nQ\n", a, b, c, d, e, f, name);

    if debug_border {
        content.push_str(&format!(
            "q\n1 w\n0 G\n{} {} {} {} re\nS\nQ\n",
            raw.x, raw.y, raw.width, raw.height
        ));
    }
    content
}

/// Register an XObject on the page under a fresh `/SigStampN` name.
///
/// Inherited or indirect resources are copied onto the page so that the
/// change stays local to it.
fn add_xobject_to_page_resources(doc: &mut Document, page_id: ObjectId, xobject_id: ObjectId) -> Result<String> {
    let mut resources = match resolve_inherited(doc, page_id, b"Resources")? {
        Some(obj) => match resolve(doc, obj) {
            Object::Dictionary(dict) => dict.clone(),
            _ => Dictionary::new(),
        },
        None => Dictionary::new(),
    };

    let mut xobjects = match resources.get(b"XObject").map(|obj| resolve(doc, obj)) {
        Ok(Object::Dictionary(dict)) => dict.clone(),
        _ => Dictionary::new(),
    };

    let name = (0..)
        .map(|n| format!("SigStamp{}", n))
        .find(|candidate| !xobjects.has(candidate.as_bytes()))
        .unwrap_or_default();
    xobjects.set(name.as_bytes(), Object::Reference(xobject_id));
    resources.set("XObject", Object::Dictionary(xobjects));

    let page_dict = doc.get_object_mut(page_id)?.as_dict_mut()?;
    page_dict.set("Resources", Object::Dictionary(resources));
    Ok(name)
}

/// The page's content streams as a flat list, whether /Contents is a single
/// stream, an inline array or a reference to an array
fn page_contents(doc: &Document, page_id: ObjectId) -> Result<Vec<Object>> {
    let page_dict = doc.get_object(page_id)?.as_dict()?;
    Ok(match page_dict.get(b"Contents") {
        Ok(Object::Reference(id)) => match doc.get_object(*id) {
            Ok(Object::Array(items)) => items.clone(),
            _ => vec![Object::Reference(*id)],
        },
        Ok(Object::Array(items)) => items.clone(),
        _ => Vec::new(),
    })
}

/// Put a content stream in front of the page's existing content
fn prepend_content_to_page(doc: &mut Document, page_id: ObjectId, new_content_id: ObjectId) -> Result<()> {
    let mut contents = page_contents(doc, page_id)?;
    contents.insert(0, Object::Reference(new_content_id));
    doc.get_object_mut(page_id)?
        .as_dict_mut()?
        .set("Contents", Object::Array(contents));
    Ok(())
}

/// Add a content stream after the page's existing content, so it draws on top
fn append_content_to_page(doc: &mut Document, page_id: ObjectId, new_content_id: ObjectId) -> Result<()> {
    let mut contents = page_contents(doc, page_id)?;
    contents.push(Object::Reference(new_content_id));
    doc.get_object_mut(page_id)?
        .as_dict_mut()?
        .set("Contents", Object::Array(contents));
    Ok(())
}
