//! Loaded PDF with a stable page index
//!
//! Pages are numbered once, at load time, in page-tree order. Every later
//! lookup (widget to page, page to box) goes through that index rather than
//! re-walking the tree.

use std::collections::HashMap;
use lopdf::{Dictionary, Document, Object, ObjectId};
use log::{debug, warn};
use crate::error::{Error, Result};
use crate::geometry::{PageBox, Rotation};

/// A parsed PDF owned by a single operation
pub struct PdfDocument {
    inner: Document,
    /// The bytes the document was parsed from (handed to the rasterizer)
    source: Vec<u8>,
    /// Page object ids, 0-based, in page-tree order
    page_ids: Vec<ObjectId>,
    page_index: HashMap<ObjectId, usize>,
    /// Annotation object id -> 0-based page index, from every page's /Annots
    annot_pages: HashMap<ObjectId, usize>,
}

impl PdfDocument {
    /// Parse a document from memory
    pub fn load(bytes: &[u8]) -> Result<Self> {
        let inner = Document::load_mem(bytes)?;

        // get_pages() is keyed by 1-based page number, so values() is already ordered
        let page_ids: Vec<ObjectId> = inner.get_pages().values().copied().collect();
        if page_ids.is_empty() {
            return Err(Error::InvalidPdf("document has no pages".to_string()));
        }

        let page_index = page_ids
            .iter()
            .enumerate()
            .map(|(i, id)| (*id, i))
            .collect();

        let mut annot_pages = HashMap::new();
        for (i, page_id) in page_ids.iter().enumerate() {
            for annot_id in page_annotation_ids(&inner, *page_id) {
                annot_pages.entry(annot_id).or_insert(i);
            }
        }

        debug!("Loaded PDF: {} pages, {} annotations", page_ids.len(), annot_pages.len());

        Ok(Self {
            inner,
            source: bytes.to_vec(),
            page_ids,
            page_index,
            annot_pages,
        })
    }

    pub fn page_count(&self) -> usize {
        self.page_ids.len()
    }

    /// Validate a 1-based page number, naming the parameter in the error
    pub fn check_page(&self, page: usize, what: &'static str) -> Result<()> {
        if page < 1 || page > self.page_count() {
            return Err(Error::PageOutOfRange {
                what,
                page,
                page_count: self.page_count(),
            });
        }
        Ok(())
    }

    /// Object id of a 1-based page
    pub fn page_id(&self, page: usize) -> Result<ObjectId> {
        self.check_page(page, "page")?;
        Ok(self.page_ids[page - 1])
    }

    /// 1-based page number of a page object, if it belongs to this document
    pub fn page_number_of(&self, page_id: ObjectId) -> Option<usize> {
        self.page_index.get(&page_id).map(|i| i + 1)
    }

    /// 1-based page number of the page listing this annotation in its /Annots
    pub fn page_number_of_annotation(&self, annot_id: ObjectId) -> Option<usize> {
        self.annot_pages.get(&annot_id).map(|i| i + 1)
    }

    /// Visible area of a 1-based page: /CropBox if present, else /MediaBox
    pub fn visible_box(&self, page: usize) -> Result<PageBox> {
        let page_id = self.page_id(page)?;

        for key in [&b"CropBox"[..], &b"MediaBox"[..]] {
            if let Some(obj) = resolve_inherited(&self.inner, page_id, key)? {
                // A null (or dangling) box counts as absent
                if let Object::Null = self.resolve(obj) {
                    continue;
                }
                if let Ok(array) = self.resolve(obj).as_array() {
                    let coords = numbers(&self.inner, array);
                    if coords.len() == 4 {
                        if let Some(page_box) =
                            PageBox::from_corners(coords[0], coords[1], coords[2], coords[3])
                        {
                            return Ok(page_box);
                        }
                    }
                }
                warn!(
                    "Page {}: ignoring malformed /{}",
                    page,
                    String::from_utf8_lossy(key)
                );
            }
        }

        Err(Error::InvalidPdf(format!("page {} has no usable CropBox or MediaBox", page)))
    }

    /// Normalized rotation of a 1-based page (inherited /Rotate, default 0)
    pub fn rotation(&self, page: usize) -> Result<Rotation> {
        let page_id = self.page_id(page)?;

        let degrees = match resolve_inherited(&self.inner, page_id, b"Rotate")? {
            Some(obj) => number(self.resolve(obj)).unwrap_or(0.0),
            None => 0.0,
        };

        if !Rotation::is_quarter_turn(degrees) {
            warn!("Page {}: /Rotate {} is not a multiple of 90, snapping", page, degrees);
        }

        Ok(Rotation::from_degrees(degrees))
    }

    /// Borrow the parsed object graph
    pub fn inner(&self) -> &Document {
        &self.inner
    }

    pub fn inner_mut(&mut self) -> &mut Document {
        &mut self.inner
    }

    /// The bytes this document was loaded from
    pub fn source_bytes(&self) -> &[u8] {
        &self.source
    }

    /// Follow a reference (one level deep; broken references resolve to Null)
    pub fn resolve<'a>(&'a self, obj: &'a Object) -> &'a Object {
        resolve(&self.inner, obj)
    }

    /// Compress and serialize the (possibly modified) document
    pub fn to_bytes(&mut self) -> Result<Vec<u8>> {
        self.inner.compress();
        let mut buf = Vec::new();
        self.inner.save_to(&mut buf)?;
        Ok(buf)
    }
}

static NULL: Object = Object::Null;

/// Follow a reference, returning Null for dangling ones
pub(crate) fn resolve<'a>(doc: &'a Document, obj: &'a Object) -> &'a Object {
    match obj {
        Object::Reference(id) => doc.get_object(*id).unwrap_or(&NULL),
        other => other,
    }
}

/// Read a numeric object (Integer or Real)
pub(crate) fn number(obj: &Object) -> Option<f32> {
    match obj {
        Object::Integer(i) => Some(*i as f32),
        Object::Real(f) => Some(*f),
        _ => None,
    }
}

/// Read every element of an array as a number, resolving references
pub(crate) fn numbers(doc: &Document, array: &[Object]) -> Vec<f32> {
    array
        .iter()
        .filter_map(|obj| number(resolve(doc, obj)))
        .collect()
}

/// Look up a key on a page, walking up the page tree via /Parent.
pub(crate) fn resolve_inherited<'a>(
    doc: &'a Document,
    page_id: ObjectId,
    key: &[u8],
) -> Result<Option<&'a Object>> {
    let mut current = doc.get_object(page_id)?.as_dict()?;
    // The depth bound guards against /Parent cycles
    for _ in 0..64 {
        if let Ok(value) = current.get(key) {
            return Ok(Some(value));
        }
        match current.get(b"Parent") {
            Ok(Object::Reference(parent_id)) => {
                current = doc.get_object(*parent_id)?.as_dict()?;
            }
            _ => return Ok(None),
        }
    }
    Ok(None)
}

/// Dictionary behind an object, following one reference
pub(crate) fn as_dict<'a>(doc: &'a Document, obj: &'a Object) -> Option<&'a Dictionary> {
    resolve(doc, obj).as_dict().ok()
}

/// Object ids of the annotations listed in a page's /Annots
fn page_annotation_ids(doc: &Document, page_id: ObjectId) -> Vec<ObjectId> {
    let annots = doc
        .get_object(page_id)
        .and_then(Object::as_dict)
        .and_then(|dict| dict.get(b"Annots"));

    match annots {
        Ok(obj) => match resolve(doc, obj) {
            Object::Array(items) => items
                .iter()
                .filter_map(|item| item.as_reference().ok())
                .collect(),
            _ => Vec::new(),
        },
        Err(_) => Vec::new(),
    }
}
