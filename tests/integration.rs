//! Integration tests for the signature stamping library

use image::{DynamicImage, Rgba, RgbaImage};
use lopdf::content::Content;
use lopdf::{dictionary, Document, Object, StringFormat};
use sigstamp::geometry::{to_upright, upright_size};
use sigstamp::{
    CopyOptions, Error, Fractions, PageRasterizer, PageTarget, PdfDocument, Placement,
    PlacementSpec, Rect, RasterImage, StampAllOptions, Stamper,
};
use tempfile::TempDir;

/// Stands in for Pdfium: renders an opaque page of the page's upright size
struct BlankRasterizer;

impl PageRasterizer for BlankRasterizer {
    fn render_page(&self, pdf: &[u8], page_index: usize, dpi: f32) -> sigstamp::Result<DynamicImage> {
        let doc = PdfDocument::load(pdf)?;
        let page = page_index + 1;
        let (width, height) = upright_size(doc.visible_box(page)?, doc.rotation(page)?);
        let scale = dpi / 72.0;
        Ok(DynamicImage::ImageRgba8(RgbaImage::from_pixel(
            (width * scale).round() as u32,
            (height * scale).round() as u32,
            Rgba([20, 20, 160, 255]),
        )))
    }
}

/// A page to synthesise: MediaBox size, /Rotate, optional CropBox
#[derive(Clone, Copy)]
struct PageSpec {
    width: f32,
    height: f32,
    rotate: i64,
    crop: Option<[f32; 4]>,
}

impl PageSpec {
    fn new(width: f32, height: f32) -> Self {
        Self { width, height, rotate: 0, crop: None }
    }

    fn letter() -> Self {
        Self::new(612.0, 792.0)
    }

    fn rotated(self, rotate: i64) -> Self {
        Self { rotate, ..self }
    }

    fn cropped(self, crop: [f32; 4]) -> Self {
        Self { crop: Some(crop), ..self }
    }
}

/// A signature field: name, 0-based page, /Rect corners
type SigSpec<'a> = (&'a str, usize, [f32; 4]);

/// Build a PDF with the given pages and signature widgets
fn build_pdf(pages: &[PageSpec], signatures: &[SigSpec]) -> Vec<u8> {
    let mut doc = Document::with_version("1.7");
    let pages_id = doc.new_object_id();
    let page_ids: Vec<_> = pages.iter().map(|_| doc.new_object_id()).collect();

    let mut fields = Vec::new();
    let mut annots: Vec<Vec<Object>> = vec![Vec::new(); pages.len()];
    for (name, page, rect) in signatures {
        let widget = doc.add_object(dictionary! {
            "Type" => "Annot",
            "Subtype" => "Widget",
            "FT" => "Sig",
            "T" => Object::String(name.as_bytes().to_vec(), StringFormat::Literal),
            "Rect" => rect.iter().map(|v| Object::Real(*v)).collect::<Vec<_>>(),
            "P" => page_ids[*page],
        });
        fields.push(Object::from(widget));
        annots[*page].push(Object::from(widget));
    }

    for (i, spec) in pages.iter().enumerate() {
        let content = doc.add_object(lopdf::Stream::new(
            lopdf::Dictionary::new(),
            format!("0 0 1 rg 10 10 {} {} re f\n", spec.width / 4.0, spec.height / 4.0).into_bytes(),
        ));
        let mut page = dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![0.into(), 0.into(), Object::Real(spec.width), Object::Real(spec.height)],
            "Rotate" => spec.rotate,
            "Contents" => content,
            "Annots" => annots[i].clone(),
        };
        if let Some(crop) = spec.crop {
            page.set("CropBox", crop.iter().map(|v| Object::Real(*v)).collect::<Vec<_>>());
        }
        doc.objects.insert(page_ids[i], Object::Dictionary(page));
    }

    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Count" => pages.len() as i64,
            "Kids" => page_ids.iter().map(|id| Object::from(*id)).collect::<Vec<_>>(),
        }),
    );

    let mut catalog = dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    };
    if !fields.is_empty() {
        let acroform = doc.add_object(dictionary! {
            "Fields" => fields,
            "SigFlags" => 3i64,
        });
        catalog.set("AcroForm", acroform);
    }
    let catalog_id = doc.add_object(catalog);
    doc.trailer.set("Root", catalog_id);

    let mut buf = Vec::new();
    doc.save_to(&mut buf).expect("Failed to save test PDF");
    buf
}

/// Signed letter-size document with "Sig1" on page 2 at (100, 700) 150x50
fn signed_pdf() -> Vec<u8> {
    build_pdf(
        &[PageSpec::letter(), PageSpec::letter()],
        &[("Sig1", 1, [100.0, 700.0, 250.0, 750.0])],
    )
}

fn number(obj: &Object) -> f32 {
    match obj {
        Object::Integer(i) => *i as f32,
        Object::Real(f) => *f,
        other => panic!("not a number: {:?}", other),
    }
}

/// The debug border rectangles drawn on a page (raw content space)
fn border_rects(pdf: &[u8], page: usize) -> Vec<Rect> {
    let doc = Document::load_mem(pdf).expect("Failed to reload output");
    let page_id = doc.get_pages()[&(page as u32)];
    let content = doc.get_page_content(page_id).expect("Failed to read page content");
    Content::decode(&content)
        .expect("Failed to decode page content")
        .operations
        .iter()
        .filter(|op| op.operator == "re")
        .map(|op| {
            let v: Vec<f32> = op.operands.iter().map(number).collect();
            Rect::new(v[0], v[1], v[2], v[3])
        })
        .collect()
}

/// The single stamp on a page (the page's own content draws one `re` too)
fn stamp_rect(pdf: &[u8], page: usize) -> Rect {
    let rects = border_rects(pdf, page);
    assert_eq!(rects.len(), 2, "expected page fill and stamp border on page {}", page);
    rects[1]
}

fn assert_close(actual: f32, expected: f32, what: &str) {
    assert!(
        (actual - expected).abs() < 0.01,
        "{}: expected {}, got {}",
        what,
        expected,
        actual
    );
}

fn assert_rect_close(actual: Rect, expected: Rect) {
    assert_close(actual.x, expected.x, "x");
    assert_close(actual.y, expected.y, "y");
    assert_close(actual.width, expected.width, "width");
    assert_close(actual.height, expected.height, "height");
}

#[test]
fn test_locates_signature_on_second_page() {
    let doc = PdfDocument::load(&signed_pdf()).unwrap();
    let rasterizer = BlankRasterizer;
    let stamper = Stamper::new(&rasterizer);

    let location = stamper.find_signature(&signed_pdf(), "Sig1").unwrap();
    assert_eq!(location.page, 2);
    assert_eq!(location.rect, Rect::new(100.0, 700.0, 150.0, 50.0));
    assert_eq!(location.upright, Rect::new(100.0, 42.0, 150.0, 50.0));

    assert_eq!(doc.page_count(), 2);
    assert_eq!(stamper.list_signatures(&signed_pdf()).unwrap().len(), 1);
}

#[test]
fn test_copy_to_same_location() {
    let rasterizer = BlankRasterizer;
    let stamper = Stamper::new(&rasterizer).with_dpi(72.0);
    let target = build_pdf(&[PageSpec::letter()], &[]);

    let options = CopyOptions {
        source_page: 2,
        target_page: 1,
        use_original_location: true,
        debug_border: true,
        ..Default::default()
    };
    let stamped = stamper.copy_signature_appearance(&signed_pdf(), &target, &options).unwrap();

    assert_rect_close(stamp_rect(stamped.as_bytes(), 1), Rect::new(100.0, 700.0, 150.0, 50.0));
}

#[test]
fn test_render_signature_at_300_dpi() {
    let rasterizer = BlankRasterizer;
    let stamper = Stamper::new(&rasterizer);

    let image = stamper.render_signature(&signed_pdf(), Some("Sig1"), 300.0).unwrap();
    assert_eq!((image.width, image.height), (625, 208));

    let first = stamper.render_signature(&signed_pdf(), None, 300.0).unwrap();
    assert_eq!(first, image);

    let missing = stamper.render_signature(&signed_pdf(), Some("Nope"), 300.0);
    assert!(matches!(missing, Err(Error::NoSignatureFieldFound { field: Some(_) })));
}

#[test]
fn test_render_widget_on_rotated_page_swaps_dimensions() {
    let source = build_pdf(&[PageSpec::letter().rotated(90)], &[("Sig", 0, [50.0, 50.0, 70.0, 60.0])]);
    let rasterizer = BlankRasterizer;
    let stamper = Stamper::new(&rasterizer);

    let image = stamper.render_signature(&source, None, 72.0).unwrap();
    assert_eq!((image.width, image.height), (10, 20));
}

#[test]
fn test_stamp_all_pages_keeps_relative_position() {
    // Widget at fractions (0.1, 0.8, 0.2, 0.05) of a letter page
    let source = build_pdf(&[PageSpec::letter()], &[("Sig1", 0, [61.2, 633.6, 183.6, 673.2])]);
    let pages = [
        PageSpec::letter(),
        PageSpec::new(595.0, 842.0),
        PageSpec::new(612.0, 1008.0),
        PageSpec::new(792.0, 612.0).cropped([36.0, 36.0, 756.0, 576.0]),
        PageSpec::letter().rotated(90),
    ];
    let target = build_pdf(&pages, &[]);

    let rasterizer = BlankRasterizer;
    let stamper = Stamper::new(&rasterizer).with_dpi(72.0);
    let options = StampAllOptions { source_page: 1, debug_border: true };
    let stamped = stamper.stamp_all_pages(&source, &target, &options).unwrap();

    let output = PdfDocument::load(stamped.as_bytes()).unwrap();
    assert_eq!(output.page_count(), 5);

    for page in 1..=5 {
        let page_box = output.visible_box(page).unwrap();
        let rotation = output.rotation(page).unwrap();
        let raw = stamp_rect(stamped.as_bytes(), page).translate(-page_box.offset_x, -page_box.offset_y);
        let upright = to_upright(raw, page_box, rotation);
        let (width, height) = upright_size(page_box, rotation);

        assert_close(upright.x / width, 0.1, "relative x");
        assert_close(upright.y / height, 0.8, "relative y");
        assert_close(upright.width / width, 0.2, "relative width");
        assert_close(upright.height / height, 0.05, "relative height");
    }
}

#[test]
fn test_page_out_of_range_produces_no_output() {
    let rasterizer = BlankRasterizer;
    let stamper = Stamper::new(&rasterizer).with_dpi(72.0);
    let target = build_pdf(&[PageSpec::letter(), PageSpec::letter()], &[]);

    let options = CopyOptions { source_page: 0, ..Default::default() };
    let result = stamper.copy_signature_appearance(&signed_pdf(), &target, &options);
    assert!(matches!(result, Err(Error::PageOutOfRange { what: "srcPage", page: 0, .. })));

    let options = CopyOptions { source_page: 2, target_page: 3, ..Default::default() };
    let result = stamper.copy_signature_appearance(&signed_pdf(), &target, &options);
    assert!(matches!(result, Err(Error::PageOutOfRange { what: "dstPage", page: 3, page_count: 2 })));

    let options = StampAllOptions { source_page: 7, ..Default::default() };
    let result = stamper.stamp_all_pages(&signed_pdf(), &target, &options);
    assert!(matches!(result, Err(Error::PageOutOfRange { page: 7, .. })));
}

#[test]
fn test_no_widget_on_page_without_manual_crop() {
    let rasterizer = BlankRasterizer;
    let stamper = Stamper::new(&rasterizer).with_dpi(72.0);
    let target = build_pdf(&[PageSpec::letter()], &[]);

    // "Sig1" lives on page 2
    let options = CopyOptions { source_page: 1, ..Default::default() };
    let result = stamper.copy_signature_appearance(&signed_pdf(), &target, &options);
    assert!(matches!(result, Err(Error::NoWidgetOnPage { page: 1 })));
}

#[test]
fn test_zero_area_widget_rejected() {
    let rasterizer = BlankRasterizer;
    let stamper = Stamper::new(&rasterizer).with_dpi(72.0);
    let source = build_pdf(&[PageSpec::letter()], &[("Sig1", 0, [0.0, 0.0, 0.0, 0.0])]);
    let target = build_pdf(&[PageSpec::letter(), PageSpec::letter()], &[]);

    let options = CopyOptions {
        destination: Rect::new(100.0, 100.0, 150.0, 50.0),
        ..Default::default()
    };
    let result = stamper.copy_signature_appearance(&source, &target, &options);
    assert!(
        matches!(result, Err(Error::InvalidCropDimensions { .. })),
        "copy should refuse an empty widget, got {:?}",
        result.map(|_| ())
    );

    let result = stamper.render_signature(&source, Some("Sig1"), 72.0);
    assert!(matches!(result, Err(Error::InvalidCropDimensions { .. })));

    let result = stamper.stamp_all_pages(&source, &target, &StampAllOptions::default());
    assert!(matches!(result, Err(Error::InvalidCropDimensions { .. })));
}

#[test]
fn test_unusable_widget_rect_reports_missing_widget() {
    let rasterizer = BlankRasterizer;
    let stamper = Stamper::new(&rasterizer).with_dpi(72.0);

    // Cut Sig1's /Rect down to three numbers
    let mut doc = Document::load_mem(&build_pdf(&[PageSpec::letter()], &[("Sig1", 0, [100.0, 700.0, 250.0, 750.0])]))
        .expect("Failed to reload test PDF");
    for object in doc.objects.values_mut() {
        if let Ok(dict) = object.as_dict_mut() {
            if dict.has(b"FT") {
                dict.set("Rect", vec![Object::Real(100.0), Object::Real(700.0), Object::Real(250.0)]);
            }
        }
    }
    let mut source = Vec::new();
    doc.save_to(&mut source).expect("Failed to save test PDF");
    let target = build_pdf(&[PageSpec::letter()], &[]);

    let result = stamper.copy_signature_appearance(&source, &target, &CopyOptions::default());
    assert!(
        matches!(result, Err(Error::NoWidgetOnPage { page: 1 })),
        "a signature field exists, so the widget is what is missing: {:?}",
        result.map(|_| ())
    );

    let result = stamper.stamp_all_pages(&source, &target, &StampAllOptions::default());
    assert!(matches!(result, Err(Error::NoWidgetOnPage { page: 1 })));
}

#[test]
fn test_manual_crop_fallback() {
    let rasterizer = BlankRasterizer;
    let stamper = Stamper::new(&rasterizer).with_dpi(72.0);
    let target = build_pdf(&[PageSpec::letter()], &[]);

    let options = CopyOptions {
        source_page: 1,
        manual_source: Rect::new(20.0, 30.0, 120.0, 40.0),
        destination: Rect::new(300.0, 30.0, 120.0, 40.0),
        coords_from_top: true,
        debug_border: true,
        ..Default::default()
    };
    let stamped = stamper.copy_signature_appearance(&signed_pdf(), &target, &options).unwrap();

    // y from top 30 on a 792pt page: 792 - 30 - 40
    assert_rect_close(stamp_rect(stamped.as_bytes(), 1), Rect::new(300.0, 722.0, 120.0, 40.0));
}

#[test]
fn test_original_location_normalized_to_smaller_page() {
    let rasterizer = BlankRasterizer;
    let stamper = Stamper::new(&rasterizer).with_dpi(72.0);
    let target = build_pdf(&[PageSpec::new(306.0, 396.0)], &[]);

    let options = CopyOptions { source_page: 2, debug_border: true, ..Default::default() };
    let stamped = stamper.copy_signature_appearance(&signed_pdf(), &target, &options).unwrap();
    assert_rect_close(stamp_rect(stamped.as_bytes(), 1), Rect::new(50.0, 350.0, 75.0, 25.0));

    let options = CopyOptions {
        source_page: 2,
        debug_border: true,
        normalize_to_target: false,
        ..Default::default()
    };
    let stamped = stamper.copy_signature_appearance(&signed_pdf(), &target, &options).unwrap();
    assert_rect_close(stamp_rect(stamped.as_bytes(), 1), Rect::new(100.0, 700.0, 150.0, 50.0));
}

#[test]
fn test_copy_onto_rotated_page_with_crop_box() {
    let rasterizer = BlankRasterizer;
    let stamper = Stamper::new(&rasterizer).with_dpi(72.0);
    let target = build_pdf(
        &[PageSpec::letter().rotated(270).cropped([12.0, 20.0, 600.0, 780.0])],
        &[],
    );

    let options = CopyOptions {
        source_page: 2,
        use_original_location: true,
        debug_border: true,
        ..Default::default()
    };
    let stamped = stamper.copy_signature_appearance(&signed_pdf(), &target, &options).unwrap();

    let output = PdfDocument::load(stamped.as_bytes()).unwrap();
    let page_box = output.visible_box(1).unwrap();
    let rotation = output.rotation(1).unwrap();
    let raw = stamp_rect(stamped.as_bytes(), 1).translate(-page_box.offset_x, -page_box.offset_y);
    let upright = to_upright(raw, page_box, rotation);

    // Upright page is 760 x 588
    let (width, height) = upright_size(page_box, rotation);
    assert_eq!((width, height), (760.0, 588.0));
    let expected = Fractions::new(100.0 / 612.0, 700.0 / 792.0, 150.0 / 612.0, 50.0 / 792.0)
        .resolve(page_box, rotation);
    assert_rect_close(upright, expected);
}

#[test]
fn test_place_png_on_all_pages() {
    let rasterizer = BlankRasterizer;
    let stamper = Stamper::new(&rasterizer);
    let target = build_pdf(&[PageSpec::letter(), PageSpec::new(595.0, 842.0)], &[]);

    let png = RasterImage::from_image(&DynamicImage::ImageRgba8(RgbaImage::from_pixel(
        8,
        4,
        Rgba([0, 0, 0, 100]),
    )))
    .unwrap();
    let spec = PlacementSpec {
        placement: Placement::Relative(Fractions::new(0.5, 0.0, 0.5, 0.1)),
        target: PageTarget::AllPages,
        debug_border: true,
    };
    let stamped = stamper.place_image(&target, png.png_bytes(), &spec).unwrap();

    assert_rect_close(stamp_rect(stamped.as_bytes(), 1), Rect::new(306.0, 0.0, 306.0, 79.2));
    assert_rect_close(stamp_rect(stamped.as_bytes(), 2), Rect::new(297.5, 0.0, 297.5, 84.2));
}

#[test]
fn test_save_stamped_output() {
    let rasterizer = BlankRasterizer;
    let stamper = Stamper::new(&rasterizer).with_dpi(72.0);
    let target = build_pdf(&[PageSpec::letter(), PageSpec::letter(), PageSpec::letter()], &[]);

    let stamped = stamper
        .stamp_all_pages(&signed_pdf(), &target, &StampAllOptions { source_page: 2, debug_border: false })
        .unwrap();

    // Create temporary directory for output
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let output_path = temp_dir.path().join("stamped.pdf");
    std::fs::write(&output_path, stamped.as_bytes()).expect("Failed to write output");

    let reloaded = std::fs::read(&output_path).expect("Failed to read output");
    let doc = PdfDocument::load(&reloaded).unwrap();
    assert_eq!(doc.page_count(), 3);
    // The stamped target carries no form of its own
    assert!(sigstamp::pdf::list_signatures(&doc).unwrap().is_empty());
}
