#![allow(dead_code)]

use std::cell::RefCell;

use image::RgbImage;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream, StringFormat};

use redline::parser::backend::{LopdfBackend, PdfBackend};
use redline::parser::content::read_page;
use redline::parser::layout::PageLayout;
use redline::parser::table::TableDetector;
use redline::raster::{pixel_size, Rasterizer};
use redline::{ExtractOptions, Rect, RedlineError};

pub const PAGE_WIDTH: f32 = 612.0;
pub const PAGE_HEIGHT: f32 = 792.0;

pub const RED: (u8, u8, u8) = (218, 31, 51);
pub const BLACK: (u8, u8, u8) = (0, 0, 0);

/// How a run's font is written into the resources.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum FontKind {
    /// Type1 font without metrics.
    #[default]
    Standard,
    /// TrueType font with a `/Widths` array starting at code 32.
    Widths(Vec<i64>),
    /// Identity-H Type0 font. Text is written as 2-byte glyph ids (the
    /// character minus 29) and read back through a ToUnicode CMap.
    Cid,
}

/// One `Tj` of text. `y` is the baseline measured from the top of the page.
#[derive(Debug, Clone)]
pub struct Run {
    pub text: String,
    pub x: f32,
    pub y: f32,
    pub size: f32,
    pub font: &'static str,
    pub color: (u8, u8, u8),
    pub kind: FontKind,
}

impl Run {
    pub fn with_widths(mut self, widths: Vec<i64>) -> Self {
        self.kind = FontKind::Widths(widths);
        self
    }

    pub fn cid(mut self) -> Self {
        self.kind = FontKind::Cid;
        self
    }
}

pub fn run(text: &str, y: f32, size: f32, font: &'static str, color: (u8, u8, u8)) -> Run {
    Run {
        text: text.to_string(),
        x: 72.0,
        y,
        size,
        font,
        color,
        kind: FontKind::Standard,
    }
}

#[derive(Debug, Clone, Default)]
pub struct TestPage {
    pub runs: Vec<Run>,
    /// Image placements in paint order, top-left boxes.
    pub images: Vec<Rect>,
    /// Paint the runs from a form XObject whose `/Matrix` translates by
    /// `(dx, dy)` in PDF space.
    pub form: Option<(f32, f32)>,
}

impl TestPage {
    pub fn text(runs: Vec<Run>) -> Self {
        Self {
            runs,
            ..Default::default()
        }
    }
}

/// Maps glyph ids 3..=0x61 back to U+0020..=U+007E.
const GLYPH_CMAP: &[u8] = b"/CIDInit /ProcSet findresource begin
12 dict begin
begincmap
1 begincodespacerange
<0000> <FFFF>
endcodespacerange
1 beginbfrange
<0003> <0061> <0020>
endbfrange
endcmap
end
end";

fn add_font(doc: &mut Document, name: &str, kind: &FontKind) -> ObjectId {
    match kind {
        FontKind::Standard => doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => name,
        }),
        FontKind::Widths(widths) => doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "TrueType",
            "BaseFont" => name,
            "FirstChar" => 32,
            "LastChar" => 31 + widths.len() as i64,
            "Widths" => widths.iter().map(|&w| Object::Integer(w)).collect::<Vec<_>>(),
        }),
        FontKind::Cid => {
            let cmap = doc.add_object(Stream::new(Dictionary::new(), GLYPH_CMAP.to_vec()));
            let subset = format!("ABCDEF+{}", name);
            doc.add_object(dictionary! {
                "Type" => "Font",
                "Subtype" => "Type0",
                "BaseFont" => subset.as_str(),
                "Encoding" => "Identity-H",
                "ToUnicode" => cmap,
                "DescendantFonts" => vec![Object::Dictionary(dictionary! {
                    "Type" => "Font",
                    "Subtype" => "CIDFontType2",
                    "BaseFont" => subset.as_str(),
                    "DW" => 500,
                })],
            })
        }
    }
}

fn encode(r: &Run) -> Object {
    match r.kind {
        FontKind::Cid => Object::String(
            r.text.bytes().flat_map(|b| [0, b.saturating_sub(29)]).collect(),
            StringFormat::Hexadecimal,
        ),
        _ => Object::String(r.text.as_bytes().to_vec(), StringFormat::Literal),
    }
}

/// Build a PDF with one 612x792 page per entry.
pub fn build_pdf(pages: &[TestPage]) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let mut kids = Vec::new();

    for page in pages {
        let mut font_keys: Vec<((&str, &FontKind), String)> = Vec::new();
        let mut fonts = Dictionary::new();
        for r in &page.runs {
            if !font_keys.iter().any(|(k, _)| *k == (r.font, &r.kind)) {
                let key = format!("F{}", font_keys.len() + 1);
                let font_id = add_font(&mut doc, r.font, &r.kind);
                fonts.set(key.clone(), font_id);
                font_keys.push(((r.font, &r.kind), key));
            }
        }
        let font_key = |r: &Run| {
            font_keys
                .iter()
                .find(|(k, _)| *k == (r.font, &r.kind))
                .map(|(_, key)| key.clone())
                .unwrap()
        };

        let mut xobjects = Dictionary::new();
        let mut ops = Vec::new();
        for (i, bbox) in page.images.iter().enumerate() {
            let name = format!("Img{}", i);
            let image_id = doc.add_object(Stream::new(
                dictionary! {
                    "Type" => "XObject",
                    "Subtype" => "Image",
                    "Width" => 2,
                    "Height" => 2,
                    "ColorSpace" => "DeviceRGB",
                    "BitsPerComponent" => 8,
                },
                vec![128u8; 12],
            ));
            xobjects.set(name.clone(), image_id);
            ops.push(Operation::new("q", vec![]));
            ops.push(Operation::new(
                "cm",
                vec![
                    Object::Real(bbox.width()),
                    0.into(),
                    0.into(),
                    Object::Real(bbox.height()),
                    Object::Real(bbox.x0),
                    Object::Real(PAGE_HEIGHT - bbox.y1),
                ],
            ));
            ops.push(Operation::new("Do", vec![Object::Name(name.into_bytes())]));
            ops.push(Operation::new("Q", vec![]));
        }

        let mut text_ops = Vec::new();
        for r in &page.runs {
            let key = font_key(r);
            let unit = |c: u8| Object::Real(c as f32 / 255.0);
            text_ops.push(Operation::new("BT", vec![]));
            text_ops.push(Operation::new(
                "Tf",
                vec![Object::Name(key.into_bytes()), Object::Real(r.size)],
            ));
            text_ops.push(Operation::new(
                "rg",
                vec![unit(r.color.0), unit(r.color.1), unit(r.color.2)],
            ));
            text_ops.push(Operation::new(
                "Tm",
                vec![
                    1.into(),
                    0.into(),
                    0.into(),
                    1.into(),
                    Object::Real(r.x),
                    Object::Real(PAGE_HEIGHT - r.y),
                ],
            ));
            text_ops.push(Operation::new("Tj", vec![encode(r)]));
            text_ops.push(Operation::new("ET", vec![]));
        }

        let mut resources_fonts = fonts;
        if let Some((dx, dy)) = page.form {
            let content = Content { operations: text_ops }.encode().unwrap();
            let form_id = doc.add_object(Stream::new(
                dictionary! {
                    "Type" => "XObject",
                    "Subtype" => "Form",
                    "BBox" => vec![0.into(), 0.into(), Object::Real(PAGE_WIDTH), Object::Real(PAGE_HEIGHT)],
                    "Matrix" => vec![1.into(), 0.into(), 0.into(), 1.into(), Object::Real(dx), Object::Real(dy)],
                    "Resources" => dictionary! { "Font" => resources_fonts },
                },
                content,
            ));
            resources_fonts = Dictionary::new();
            xobjects.set("Fm0", form_id);
            ops.push(Operation::new("q", vec![]));
            ops.push(Operation::new("Do", vec![Object::Name(b"Fm0".to_vec())]));
            ops.push(Operation::new("Q", vec![]));
        } else {
            ops.append(&mut text_ops);
        }

        let content = Content { operations: ops }.encode().unwrap();
        let content_id = doc.add_object(Stream::new(Dictionary::new(), content));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![
                0.into(),
                0.into(),
                Object::Real(PAGE_WIDTH),
                Object::Real(PAGE_HEIGHT),
            ],
            "Resources" => dictionary! {
                "Font" => resources_fonts,
                "XObject" => xobjects,
            },
            "Contents" => content_id,
        });
        kids.push(Object::from(page_id));
    }

    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids.clone(),
            "Count" => kids.len() as i64,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut buf = Vec::new();
    doc.save_to(&mut buf).unwrap();
    buf
}

/// Rasterizer that paints solid tiles and remembers every request.
#[derive(Default)]
pub struct FakeRasterizer {
    pub calls: RefCell<Vec<(u32, Rect)>>,
}

impl Rasterizer for FakeRasterizer {
    fn render_region(&self, page_index: u32, clip: Rect, dpi: f32) -> Result<RgbImage, RedlineError> {
        self.calls.borrow_mut().push((page_index, clip));
        let (w, h) = pixel_size(&clip, dpi);
        Ok(RgbImage::from_pixel(w, h, image::Rgb([218, 31, 51])))
    }
}

/// Table detector returning fixed boxes and counting how often it runs.
#[derive(Default)]
pub struct FixedTables {
    pub tables: Vec<Rect>,
    pub runs: RefCell<usize>,
}

impl FixedTables {
    pub fn new(tables: Vec<Rect>) -> Self {
        Self {
            tables,
            runs: RefCell::new(0),
        }
    }
}

impl TableDetector for FixedTables {
    fn detect_tables(&self, _page: &PageLayout) -> Vec<Rect> {
        *self.runs.borrow_mut() += 1;
        self.tables.clone()
    }
}

/// Small DPI keeps fake rasters tiny.
pub fn options() -> ExtractOptions {
    ExtractOptions {
        dpi: 72.0,
        ..Default::default()
    }
}

/// Image boxes of every page of a composited PDF, in paint order.
pub fn placements(composited: &[u8]) -> Vec<Vec<Rect>> {
    let backend = LopdfBackend::load_bytes(composited).unwrap();
    backend
        .pages()
        .into_values()
        .map(|id| {
            read_page(&backend, id, PAGE_HEIGHT)
                .unwrap()
                .images
                .into_iter()
                .map(|p| p.bbox)
                .collect()
        })
        .collect()
}

pub fn approx_eq(a: &Rect, b: &Rect) -> bool {
    (a.x0 - b.x0).abs() < 0.05
        && (a.y0 - b.y0).abs() < 0.05
        && (a.x1 - b.x1).abs() < 0.05
        && (a.y1 - b.y1).abs() < 0.05
}

pub fn assert_boxes(actual: &[Rect], expected: &[Rect]) {
    assert_eq!(
        actual.len(),
        expected.len(),
        "got {:?}, expected {:?}",
        actual,
        expected
    );
    for (a, e) in actual.iter().zip(expected) {
        assert!(approx_eq(a, e), "got {}, expected {}", a, e);
    }
}
