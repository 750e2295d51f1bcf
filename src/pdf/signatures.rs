//! Signature widget discovery
//!
//! Walks the AcroForm field tree, keeps `/FT /Sig` fields and reports where
//! each of their widgets sits, both in raw page space and as a viewer sees it.

use std::collections::HashSet;
use lopdf::{Dictionary, Document, Object, ObjectId};
use log::{debug, warn};
use crate::error::Result;
use crate::geometry::{flip_vertical, to_upright, upright_size, PageBox, Rect, Rotation};
use crate::pdf::document::{as_dict, numbers, resolve, PdfDocument};

/// Where a signature widget sits on its page
#[derive(Debug, Clone, PartialEq)]
pub struct SignatureLocation {
    /// Fully qualified field name (`parent.child`)
    pub field_name: String,
    /// 1-based page number
    pub page: usize,
    /// Widget rect in raw content space, relative to the visible box origin
    pub rect: Rect,
    pub rotation: Rotation,
    /// Visible box of the page (its offsets are the crop origin)
    pub page_box: PageBox,
    /// Widget rect as seen in a viewer, y measured from the top
    pub upright: Rect,
}

impl SignatureLocation {
    /// Upright rect with a bottom-left origin, as the rasterizer expects
    pub fn upright_from_bottom(&self) -> Rect {
        to_upright(self.rect, self.page_box, self.rotation)
    }
}

/// A terminal signature field and the widget annotations that show it
struct SignatureField {
    name: String,
    widgets: Vec<(Option<ObjectId>, Dictionary)>,
}

/// List every signature widget in the document, in field-tree order.
///
/// Documents without an AcroForm or without signature fields yield an empty list.
pub fn list_signatures(doc: &PdfDocument) -> Result<Vec<SignatureLocation>> {
    let mut locations = Vec::new();

    for field in collect_signature_fields(doc.inner()) {
        for (widget_id, widget) in &field.widgets {
            let Some(page) = widget_page(doc, *widget_id, widget) else {
                warn!("Signature field '{}': widget has no resolvable page, skipping", field.name);
                continue;
            };

            let Some(raw) = widget_rect(doc.inner(), widget) else {
                warn!("Signature field '{}': widget has no usable /Rect, skipping", field.name);
                continue;
            };

            let page_box = doc.visible_box(page)?;
            let rotation = doc.rotation(page)?;

            let rect = raw.translate(-page_box.offset_x, -page_box.offset_y);
            let (_, upright_height) = upright_size(page_box, rotation);
            let upright = flip_vertical(to_upright(rect, page_box, rotation), upright_height);

            locations.push(SignatureLocation {
                field_name: field.name.clone(),
                page,
                rect,
                rotation,
                page_box,
                upright,
            });
        }
    }

    debug!("Found {} signature widget(s)", locations.len());
    Ok(locations)
}

/// First widget of the signature field with this fully qualified name
pub fn find_by_name(doc: &PdfDocument, field_name: &str) -> Result<Option<SignatureLocation>> {
    Ok(list_signatures(doc)?
        .into_iter()
        .find(|location| location.field_name == field_name))
}

/// First signature widget anchored to the given 1-based page
pub fn find_on_page(doc: &PdfDocument, page: usize) -> Result<Option<SignatureLocation>> {
    Ok(list_signatures(doc)?
        .into_iter()
        .find(|location| location.page == page))
}

/// Whether the document declares any signature field with a widget, even
/// one whose page or /Rect cannot be resolved
pub fn has_signature_fields(doc: &PdfDocument) -> bool {
    !collect_signature_fields(doc.inner()).is_empty()
}

/// Walk /AcroForm /Fields and collect terminal signature fields
fn collect_signature_fields(doc: &Document) -> Vec<SignatureField> {
    let mut fields = Vec::new();

    let Some(acroform) = doc
        .catalog()
        .ok()
        .and_then(|catalog| catalog.get(b"AcroForm").ok())
        .and_then(|obj| as_dict(doc, obj))
    else {
        return fields;
    };

    let roots = match acroform.get(b"Fields").map(|obj| resolve(doc, obj)) {
        Ok(Object::Array(items)) => items.clone(),
        _ => return fields,
    };

    let mut visited = HashSet::new();
    for root in &roots {
        walk_field(doc, root, "", None, &mut visited, &mut fields);
    }
    fields
}

fn walk_field(
    doc: &Document,
    node: &Object,
    parent_name: &str,
    inherited_type: Option<&[u8]>,
    visited: &mut HashSet<ObjectId>,
    out: &mut Vec<SignatureField>,
) {
    let node_id = node.as_reference().ok();
    if let Some(id) = node_id {
        if !visited.insert(id) {
            return;
        }
    }
    let Some(dict) = as_dict(doc, node) else {
        return;
    };

    let partial = dict
        .get(b"T")
        .ok()
        .map(|obj| resolve(doc, obj))
        .and_then(|obj| obj.as_str().ok())
        .map(decode_text_string);
    let name = match (parent_name.is_empty(), partial) {
        (_, None) => parent_name.to_string(),
        (true, Some(partial)) => partial,
        (false, Some(partial)) => format!("{}.{}", parent_name, partial),
    };

    let field_type = dict
        .get(b"FT")
        .ok()
        .map(|obj| resolve(doc, obj))
        .and_then(|obj| obj.as_name().ok())
        .or(inherited_type);

    let kids: Vec<Object> = match dict.get(b"Kids").map(|obj| resolve(doc, obj)) {
        Ok(Object::Array(items)) => items.clone(),
        _ => Vec::new(),
    };

    // Kids carrying /T are child fields; the rest are this field's widgets
    let (child_fields, widget_kids): (Vec<&Object>, Vec<&Object>) = kids
        .iter()
        .partition(|kid| as_dict(doc, kid).is_some_and(|kid| kid.has(b"T")));

    for child in child_fields {
        walk_field(doc, child, &name, field_type, visited, out);
    }

    if field_type != Some(b"Sig".as_slice()) {
        return;
    }

    let mut widgets = Vec::new();
    if dict.has(b"Rect") {
        // Merged field/widget dictionary
        widgets.push((node_id, dict.clone()));
    }
    for kid in widget_kids {
        if let Some(widget) = as_dict(doc, kid) {
            widgets.push((kid.as_reference().ok(), widget.clone()));
        }
    }

    if !widgets.is_empty() {
        out.push(SignatureField { name, widgets });
    }
}

/// Resolve the 1-based page a widget sits on: its /P entry, else the page
/// whose /Annots lists it
fn widget_page(doc: &PdfDocument, widget_id: Option<ObjectId>, widget: &Dictionary) -> Option<usize> {
    widget
        .get(b"P")
        .ok()
        .and_then(|obj| obj.as_reference().ok())
        .and_then(|page_id| doc.page_number_of(page_id))
        .or_else(|| widget_id.and_then(|id| doc.page_number_of_annotation(id)))
}

/// The widget's /Rect, normalized, in absolute raw content space
fn widget_rect(doc: &Document, widget: &Dictionary) -> Option<Rect> {
    let array = widget
        .get(b"Rect")
        .ok()
        .map(|obj| resolve(doc, obj))
        .and_then(|obj| obj.as_array().ok())?;
    match numbers(doc, array).as_slice() {
        [x1, y1, x2, y2] => Some(Rect::from_corners(*x1, *y1, *x2, *y2)),
        _ => None,
    }
}

/// Decode a PDF text string: UTF-16BE with BOM, otherwise byte-per-char
fn decode_text_string(bytes: &[u8]) -> String {
    if bytes.len() >= 2 && bytes[0] == 0xFE && bytes[1] == 0xFF {
        let units: Vec<u16> = bytes[2..]
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        String::from_utf16_lossy(&units)
    } else {
        bytes.iter().map(|&b| b as char).collect()
    }
}
