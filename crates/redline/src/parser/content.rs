//! Content-stream interpretation.
//!
//! [`read_page`] runs a page's operators through a small graphics/text state
//! machine and records every shown string as a styled [`TextSpan`] and every
//! painted image as an [`ImagePlacement`]. Form XObjects are walked in
//! place. Output coordinates have a top-left origin, in points.

use std::rc::Rc;

use super::backend::{
    Form, FormId, Op, Operand, PageFont, PageId, PdfBackend, XObject, DEFAULT_GLYPH_WIDTH,
};
use super::layout::{ImagePlacement, TextSpan};
use crate::types::{Rect, Rgb};
use crate::RedlineError;

/// A `TJ` kern wider than this fraction of a glyph reads as a word break.
const KERN_SPACE: f32 = 0.3;

/// Forms nested deeper than this are not painted.
const MAX_FORM_DEPTH: usize = 8;

/// Spans and image placements of one page, in content-stream order.
#[derive(Debug, Clone, Default)]
pub struct PageContent {
    pub spans: Vec<TextSpan>,
    pub images: Vec<ImagePlacement>,
}

/// Affine transform `[a b c d e f]` in the row-vector convention.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Matrix([f32; 6]);

impl Matrix {
    const IDENTITY: Matrix = Matrix([1.0, 0.0, 0.0, 1.0, 0.0, 0.0]);

    fn translate(tx: f32, ty: f32) -> Self {
        Matrix([1.0, 0.0, 0.0, 1.0, tx, ty])
    }

    fn from_operands(operands: &[Operand]) -> Option<Self> {
        let v: Vec<f32> = operands.iter().filter_map(Operand::number).collect();
        match v.as_slice() {
            &[a, b, c, d, e, f] => Some(Matrix([a, b, c, d, e, f])),
            _ => None,
        }
    }

    /// `self` followed by `next`.
    fn then(&self, next: &Matrix) -> Matrix {
        let [a, b, c, d, e, f] = self.0;
        let [na, nb, nc, nd, ne, nf] = next.0;
        Matrix([
            a * na + b * nc,
            a * nb + b * nd,
            c * na + d * nc,
            c * nb + d * nd,
            e * na + f * nc + ne,
            e * nb + f * nd + nf,
        ])
    }

    fn apply(&self, x: f32, y: f32) -> (f32, f32) {
        let [a, b, c, d, e, f] = self.0;
        (a * x + c * y + e, b * x + d * y + f)
    }

    fn y_scale(&self) -> f32 {
        self.0[2].hypot(self.0[3])
    }
}

/// The part of the graphics state `q`/`Q` save and restore.
#[derive(Debug, Clone, Copy)]
struct Graphics {
    ctm: Matrix,
    fill: Rgb,
}

impl Default for Graphics {
    fn default() -> Self {
        Self {
            ctm: Matrix::IDENTITY,
            fill: Rgb::BLACK,
        }
    }
}

#[derive(Debug, Clone, Default)]
struct Font {
    face: Rc<PageFont>,
    name: String,
    bold: bool,
    italic: bool,
}

impl Font {
    fn resolve(key: &[u8], fonts: &[Rc<PageFont>]) -> Self {
        let face = fonts
            .iter()
            .find(|f| f.key == key)
            .cloned()
            .unwrap_or_else(|| Rc::new(PageFont::new(key, &String::from_utf8_lossy(key))));
        let name = strip_subset_prefix(&face.base_font).to_string();
        let upper = name.to_uppercase();
        Self {
            bold: upper.contains("BOLD") || upper.contains("BLACK"),
            italic: upper.contains("ITALIC") || upper.contains("OBLIQUE"),
            name,
            face,
        }
    }
}

#[derive(Debug, Clone)]
struct Text {
    font: Font,
    size: f32,
    tm: Matrix,
    tlm: Matrix,
    /// `Tz` as a fraction.
    scale: f32,
    char_spacing: f32,
    word_spacing: f32,
    rise: f32,
    leading: f32,
}

impl Default for Text {
    fn default() -> Self {
        Self {
            font: Font::default(),
            size: 0.0,
            tm: Matrix::IDENTITY,
            tlm: Matrix::IDENTITY,
            scale: 1.0,
            char_spacing: 0.0,
            word_spacing: 0.0,
            rise: 0.0,
            leading: 0.0,
        }
    }
}

impl Text {
    /// Nominal glyph advance, for telling kerns from word gaps.
    fn glyph_width(&self) -> f32 {
        self.size * DEFAULT_GLYPH_WIDTH / 1000.0 * self.scale
    }

    fn move_line(&mut self, tx: f32, ty: f32) {
        self.tlm = Matrix::translate(tx, ty).then(&self.tlm);
        self.tm = self.tlm;
    }

    fn next_line(&mut self) {
        self.move_line(0.0, -self.leading);
    }

    fn advance(&mut self, dx: f32) {
        self.tm = Matrix::translate(dx, 0.0).then(&self.tm);
    }

    /// Horizontal displacement after showing `bytes`, in text space. Word
    /// spacing applies to the single-byte code 32 only.
    fn advance_for(&self, bytes: &[u8]) -> f32 {
        let face = &self.font.face;
        face.codes(bytes)
            .map(|(code, len)| {
                let word = if len == 1 && code == 32 {
                    self.word_spacing
                } else {
                    0.0
                };
                (face.width(code) / 1000.0 * self.size + self.char_spacing + word) * self.scale
            })
            .sum()
    }
}

struct Walker<'a> {
    backend: &'a dyn PdfBackend,
    page: PageId,
    height: f32,
    fonts: Vec<Rc<PageFont>>,
    gs: Graphics,
    stack: Vec<Graphics>,
    text: Text,
    /// Forms being painted, innermost last.
    forms: Vec<FormId>,
    out: PageContent,
}

impl<'a> Walker<'a> {
    fn new(backend: &'a dyn PdfBackend, page: PageId, height: f32) -> Self {
        Self {
            backend,
            page,
            height,
            fonts: backend.fonts(page).into_iter().map(Rc::new).collect(),
            gs: Graphics::default(),
            stack: Vec::new(),
            text: Text::default(),
            forms: Vec::new(),
            out: PageContent::default(),
        }
    }

    fn apply(&mut self, op: &Op) {
        let args = op.operands.as_slice();
        let num = |i: usize| args.get(i).and_then(Operand::number);

        match op.operator.as_str() {
            "q" => self.stack.push(self.gs),
            "Q" => {
                if let Some(gs) = self.stack.pop() {
                    self.gs = gs;
                }
            }
            "cm" => {
                if let Some(m) = Matrix::from_operands(args) {
                    self.gs.ctm = m.then(&self.gs.ctm);
                }
            }
            "g" | "rg" | "k" | "sc" | "scn" => {
                let components: Vec<f32> = args.iter().filter_map(Operand::number).collect();
                if let Some(color) = fill_color(&components) {
                    self.gs.fill = color;
                }
            }
            "cs" => self.gs.fill = Rgb::BLACK,
            "Do" => {
                if let Some(name) = args.first().and_then(Operand::name) {
                    self.paint_xobject(name);
                }
            }
            "BT" => {
                self.text.tm = Matrix::IDENTITY;
                self.text.tlm = Matrix::IDENTITY;
            }
            "Tf" => {
                if let (Some(key), Some(size)) = (args.first().and_then(Operand::name), num(1)) {
                    self.text.font = Font::resolve(key, &self.fonts);
                    self.text.size = size;
                }
            }
            "Tm" => {
                if let Some(m) = Matrix::from_operands(args) {
                    self.text.tm = m;
                    self.text.tlm = m;
                }
            }
            "Td" => {
                if let (Some(tx), Some(ty)) = (num(0), num(1)) {
                    self.text.move_line(tx, ty);
                }
            }
            "TD" => {
                if let (Some(tx), Some(ty)) = (num(0), num(1)) {
                    self.text.leading = -ty;
                    self.text.move_line(tx, ty);
                }
            }
            "T*" => self.text.next_line(),
            "TL" => self.text.leading = num(0).unwrap_or(self.text.leading),
            "Tc" => self.text.char_spacing = num(0).unwrap_or(self.text.char_spacing),
            "Tw" => self.text.word_spacing = num(0).unwrap_or(self.text.word_spacing),
            "Tz" => self.text.scale = num(0).map_or(self.text.scale, |s| s / 100.0),
            "Ts" => self.text.rise = num(0).unwrap_or(self.text.rise),
            "Tj" => {
                if let Some(Operand::Text(bytes)) = args.first() {
                    self.show(bytes);
                }
            }
            "'" => {
                self.text.next_line();
                if let Some(Operand::Text(bytes)) = args.first() {
                    self.show(bytes);
                }
            }
            "\"" => {
                if let [aw, ac, Operand::Text(bytes)] = args {
                    self.text.word_spacing = aw.number().unwrap_or(0.0);
                    self.text.char_spacing = ac.number().unwrap_or(0.0);
                    self.text.next_line();
                    self.show(bytes);
                }
            }
            "TJ" => {
                if let Some(Operand::Array(items)) = args.first() {
                    self.show_array(items);
                }
            }
            _ => {}
        }
    }

    /// Text rendering matrix: Tm followed by the CTM.
    fn trm(&self) -> Matrix {
        self.text.tm.then(&self.gs.ctm)
    }

    fn pen(&self) -> (f32, f32) {
        self.trm().apply(0.0, self.text.rise)
    }

    fn show(&mut self, bytes: &[u8]) {
        let text = self.text.font.face.decode(bytes);
        if text.is_empty() {
            return;
        }
        let start = self.pen();
        let dx = self.text.advance_for(bytes);
        self.text.advance(dx);
        self.push_span(text, start);
    }

    /// `TJ`: strings interleaved with kerns in thousandths of a text unit.
    fn show_array(&mut self, items: &[Operand]) {
        let mut text = String::new();
        let mut start = self.pen();

        for item in items {
            match item {
                Operand::Text(bytes) => {
                    let fragment = self.text.font.face.decode(bytes);
                    if text.is_empty() {
                        start = self.pen();
                    }
                    let dx = self.text.advance_for(bytes);
                    self.text.advance(dx);
                    text.push_str(&fragment);
                }
                other => {
                    let Some(kern) = other.number() else { continue };
                    let dx = -kern / 1000.0 * self.text.size * self.text.scale;
                    if dx > self.text.glyph_width() * KERN_SPACE && !text.is_empty() {
                        text.push(' ');
                    }
                    self.text.advance(dx);
                }
            }
        }

        let text = text.trim_end();
        if !text.is_empty() {
            self.push_span(text.to_string(), start);
        }
    }

    fn push_span(&mut self, text: String, (x, y): (f32, f32)) {
        let trm = self.trm();
        let (end_x, _) = self.pen();
        let font = &self.text.font;
        self.out.spans.push(TextSpan {
            text,
            x,
            y: self.height - y,
            width: (end_x - x).max(0.0),
            font_size: (self.text.size * trm.y_scale()).abs(),
            font_name: font.name.clone(),
            color: self.gs.fill,
            is_bold: font.bold,
            is_italic: font.italic,
        });
    }

    fn paint_xobject(&mut self, name: &[u8]) {
        match self.backend.xobject(self.page, self.forms.last().copied(), name) {
            Some(XObject::Image) => self.place_image(name),
            Some(XObject::Form(form)) => self.paint_form(form),
            None => {}
        }
    }

    /// Images paint the unit square under the CTM.
    fn place_image(&mut self, name: &[u8]) {
        let ctm = self.gs.ctm;
        let corners = [(0.0, 0.0), (1.0, 0.0), (0.0, 1.0), (1.0, 1.0)].map(|(x, y)| ctm.apply(x, y));
        let (mut x0, mut y0) = (f32::INFINITY, f32::INFINITY);
        let (mut x1, mut y1) = (f32::NEG_INFINITY, f32::NEG_INFINITY);
        for (x, y) in corners {
            x0 = x0.min(x);
            x1 = x1.max(x);
            y0 = y0.min(y);
            y1 = y1.max(y);
        }
        self.out.images.push(ImagePlacement {
            name: name.to_vec(),
            form: self.forms.last().copied(),
            bbox: Rect::new(x0, self.height - y1, x1, self.height - y0),
        });
    }

    /// Run a form's operators as if inlined between `q` and `Q`, under its
    /// `/Matrix`. Names resolve through the form's resources first.
    fn paint_form(&mut self, form: Form) {
        if self.forms.contains(&form.id) || self.forms.len() >= MAX_FORM_DEPTH {
            log::debug!("page {:?}: not repainting form {:?}", self.page, form.id);
            return;
        }

        let gs = self.gs;
        let depth = self.stack.len();
        let text = self.text.clone();
        let fonts = self.fonts.clone();

        self.gs.ctm = Matrix(form.matrix).then(&self.gs.ctm);
        if !form.fonts.is_empty() {
            self.fonts = form.fonts.into_iter().map(Rc::new).chain(fonts.iter().cloned()).collect();
        }
        self.forms.push(form.id);
        for op in &form.operations {
            self.apply(op);
        }
        self.forms.pop();

        self.fonts = fonts;
        self.text = text;
        self.stack.truncate(depth);
        self.gs = gs;
    }
}

/// Gray, RGB or CMYK components to a fill colour.
fn fill_color(components: &[f32]) -> Option<Rgb> {
    match *components {
        [g] => Some(Rgb::from_unit(g, g, g)),
        [r, g, b] => Some(Rgb::from_unit(r, g, b)),
        [c, m, y, k] => {
            let white = 1.0 - k;
            Some(Rgb::from_unit(
                (1.0 - c) * white,
                (1.0 - m) * white,
                (1.0 - y) * white,
            ))
        }
        _ => None,
    }
}

/// Walk `page` and collect its spans and image placements. `height` is the
/// page height used to flip coordinates to a top-left origin.
pub fn read_page(
    backend: &dyn PdfBackend,
    page: PageId,
    height: f32,
) -> Result<PageContent, RedlineError> {
    let ops = backend.operations(page)?;
    let mut walker = Walker::new(backend, page, height);
    for op in &ops {
        walker.apply(op);
    }
    Ok(walker.out)
}

/// `"ABCDEF+Arial-BoldMT"` becomes `"Arial-BoldMT"`; names without a
/// six-letter uppercase tag are returned as is.
pub fn strip_subset_prefix(name: &str) -> &str {
    match name.split_once('+') {
        Some((tag, rest)) if tag.len() == 6 && tag.bytes().all(|b| b.is_ascii_uppercase()) => {
            rest
        }
        _ => name,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    struct Page {
        ops: Vec<Op>,
        images: Vec<&'static [u8]>,
        forms: Vec<(&'static [u8], Form)>,
    }

    impl PdfBackend for Page {
        fn pages(&self) -> BTreeMap<u32, PageId> {
            [(1, (1, 0))].into_iter().collect()
        }

        fn page_size(&self, _page: PageId) -> Result<(f32, f32), RedlineError> {
            Ok((612.0, 792.0))
        }

        fn fonts(&self, _page: PageId) -> Vec<PageFont> {
            let mut metric = PageFont::new(b"F3", "Arial-BoldMT");
            metric.widths = [(32, 278.0), (65, 722.0), (73, 278.0)].into_iter().collect();
            vec![
                PageFont::new(b"F1", "Arial-BoldMT"),
                PageFont::new(b"F2", "ABCDEF+TimesNewRomanPSMT"),
                metric,
            ]
        }

        fn operations(&self, _page: PageId) -> Result<Vec<Op>, RedlineError> {
            Ok(self.ops.clone())
        }

        fn xobject(&self, _page: PageId, _form: Option<FormId>, name: &[u8]) -> Option<XObject> {
            if self.images.iter().any(|n| *n == name) {
                return Some(XObject::Image);
            }
            self.forms
                .iter()
                .find(|(n, _)| *n == name)
                .map(|(_, form)| XObject::Form(form.clone()))
        }
    }

    fn nums(values: &[f32]) -> Vec<Operand> {
        values.iter().copied().map(Operand::Number).collect()
    }

    fn font(key: &[u8], size: f32) -> Op {
        Op::new("Tf", vec![Operand::Name(key.to_vec()), Operand::Number(size)])
    }

    fn at(x: f32, y: f32) -> Op {
        Op::new("Tm", nums(&[1.0, 0.0, 0.0, 1.0, x, y]))
    }

    fn show(text: &str) -> Op {
        Op::new("Tj", vec![Operand::Text(text.as_bytes().to_vec())])
    }

    fn read(ops: Vec<Op>) -> PageContent {
        read_with_forms(ops, Vec::new())
    }

    fn read_with_forms(ops: Vec<Op>, forms: Vec<(&'static [u8], Form)>) -> PageContent {
        let page = Page {
            ops,
            images: vec![&b"Im0"[..]],
            forms,
        };
        read_page(&page, (1, 0), 792.0).unwrap()
    }

    fn paint(name: &[u8]) -> Op {
        Op::new("Do", vec![Operand::Name(name.to_vec())])
    }

    fn form(id: u32, matrix: [f32; 6], operations: Vec<Op>) -> Form {
        Form {
            id: (id, 0),
            matrix,
            operations,
            fonts: Vec::new(),
        }
    }

    #[test]
    fn subset_tags() {
        assert_eq!(strip_subset_prefix("ABCDEF+Arial-BoldMT"), "Arial-BoldMT");
        assert_eq!(strip_subset_prefix("Arial-BoldMT"), "Arial-BoldMT");
        assert_eq!(strip_subset_prefix("abcdef+Arial"), "abcdef+Arial");
        assert_eq!(strip_subset_prefix("ABC+Arial"), "ABC+Arial");
    }

    #[test]
    fn font_weights_from_names() {
        let fonts = vec![Rc::new(PageFont::new(b"F9", "QWERTY+Arial-Black"))];
        let black = Font::resolve(b"F9", &fonts);
        assert!(black.bold);
        assert_eq!(black.name, "Arial-Black");

        let unknown = Font::resolve(b"Helvetica-Oblique", &[]);
        assert!(unknown.italic);
        assert!(!unknown.bold);
    }

    #[test]
    fn matrices_compose_in_order() {
        let m = Matrix::translate(10.0, 20.0).then(&Matrix([2.0, 0.0, 0.0, 2.0, 0.0, 0.0]));
        assert_eq!(m.apply(0.0, 0.0), (20.0, 40.0));
        assert_eq!(Matrix([0.0, 3.0, -4.0, 0.0, 0.0, 0.0]).y_scale(), 4.0);
    }

    #[test]
    fn fill_colours() {
        assert_eq!(fill_color(&[0.5]), Some(Rgb(128, 128, 128)));
        assert_eq!(fill_color(&[0.855, 0.122, 0.2]), Some(Rgb(218, 31, 51)));
        assert_eq!(fill_color(&[0.0, 0.0, 0.0, 1.0]), Some(Rgb::BLACK));
        assert_eq!(fill_color(&[0.1, 0.2]), None);
    }

    #[test]
    fn span_carries_style_and_flipped_baseline() {
        let content = read(vec![
            Op::new("BT", vec![]),
            Op::new("rg", nums(&[0.855, 0.122, 0.2])),
            font(b"F1", 11.0),
            at(72.0, 700.0),
            show("Section Title"),
            Op::new("ET", vec![]),
        ]);

        let span = &content.spans[0];
        assert_eq!(span.text, "Section Title");
        assert_eq!(span.font_name, "Arial-BoldMT");
        assert!(span.is_bold);
        assert_eq!(span.color, Rgb(218, 31, 51));
        assert!((span.font_size - 11.0).abs() < 0.01);
        assert!((span.x - 72.0).abs() < 0.01);
        assert!((span.y - 92.0).abs() < 0.01);
        assert!((span.width - 13.0 * 5.5).abs() < 0.01);
    }

    #[test]
    fn ctm_scales_font_size() {
        let content = read(vec![
            Op::new("cm", nums(&[1.5, 0.0, 0.0, 1.5, 0.0, 0.0])),
            Op::new("BT", vec![]),
            font(b"F2", 10.0),
            show("x"),
        ]);
        assert!((content.spans[0].font_size - 15.0).abs() < 0.01);
        assert_eq!(content.spans[0].font_name, "TimesNewRomanPSMT");
    }

    #[test]
    fn line_moves_accumulate() {
        let content = read(vec![
            Op::new("BT", vec![]),
            font(b"F2", 10.0),
            Op::new("Td", nums(&[72.0, 700.0])),
            show("one"),
            Op::new("TD", nums(&[0.0, -14.0])),
            show("two"),
            Op::new("T*", vec![]),
            show("three"),
        ]);
        let baselines: Vec<f32> = content.spans.iter().map(|s| s.y).collect();
        assert_eq!(baselines, [92.0, 106.0, 120.0]);
        assert!(content.spans.iter().all(|s| (s.x - 72.0).abs() < 0.01));
    }

    #[test]
    fn restore_drops_fill_colour() {
        let content = read(vec![
            Op::new("q", vec![]),
            Op::new("rg", nums(&[1.0, 0.0, 0.0])),
            Op::new("Q", vec![]),
            Op::new("BT", vec![]),
            font(b"F2", 10.0),
            at(50.0, 500.0),
            show("black again"),
        ]);
        assert_eq!(content.spans[0].color, Rgb::BLACK);
    }

    #[test]
    fn wide_kern_reads_as_space() {
        let content = read(vec![
            Op::new("BT", vec![]),
            font(b"F2", 10.0),
            at(50.0, 500.0),
            Op::new(
                "TJ",
                vec![Operand::Array(vec![
                    Operand::Text(b"FIGURE".to_vec()),
                    Operand::Number(-400.0),
                    Operand::Text(b"3".to_vec()),
                    Operand::Number(-20.0),
                    Operand::Text(b" ".to_vec()),
                ])],
            ),
        ]);
        assert_eq!(content.spans[0].text, "FIGURE 3");
    }

    #[test]
    fn images_only_for_image_xobjects() {
        let content = read(vec![
            Op::new("q", vec![]),
            Op::new("cm", nums(&[200.0, 0.0, 0.0, 100.0, 50.0, 600.0])),
            paint(b"Im0"),
            Op::new("Q", vec![]),
            paint(b"Fm0"),
        ]);
        assert_eq!(content.images.len(), 1);
        assert_eq!(content.images[0].name, b"Im0".to_vec());
        assert_eq!(content.images[0].form, None);
        assert_eq!(content.images[0].bbox, Rect::new(50.0, 92.0, 250.0, 192.0));
    }

    #[test]
    fn empty_strings_are_dropped() {
        let content = read(vec![Op::new("BT", vec![]), font(b"F1", 12.0), show("")]);
        assert!(content.spans.is_empty());
    }

    #[test]
    fn widths_drive_the_advance() {
        // A = 722, I = 278, space = 278 thousandths.
        let content = read(vec![
            Op::new("BT", vec![]),
            font(b"F3", 10.0),
            at(100.0, 500.0),
            show("AI A"),
            Op::new("Tc", nums(&[1.0])),
            Op::new("Tw", nums(&[2.0])),
            at(100.0, 400.0),
            show("AI A"),
            Op::new("Tz", nums(&[50.0])),
            at(100.0, 300.0),
            show("AI A"),
        ]);
        let widths: Vec<f32> = content.spans.iter().map(|s| s.width).collect();
        assert!((widths[0] - 20.0).abs() < 0.01, "{:?}", widths);
        assert!((widths[1] - 26.0).abs() < 0.01, "{:?}", widths);
        assert!((widths[2] - 13.0).abs() < 0.01, "{:?}", widths);
    }

    #[test]
    fn form_text_is_read_through_its_matrix() {
        let inner = form(
            9,
            [1.0, 0.0, 0.0, 1.0, 100.0, 50.0],
            vec![
                Op::new("rg", nums(&[0.855, 0.122, 0.2])),
                Op::new("BT", vec![]),
                font(b"F1", 10.0),
                at(0.0, 0.0),
                show("inside"),
                Op::new("ET", vec![]),
            ],
        );
        let content = read_with_forms(
            vec![
                Op::new("q", vec![]),
                Op::new("cm", nums(&[1.0, 0.0, 0.0, 1.0, 0.0, 100.0])),
                paint(b"Fm1"),
                Op::new("Q", vec![]),
                Op::new("BT", vec![]),
                font(b"F2", 10.0),
                at(72.0, 700.0),
                show("after"),
            ],
            vec![(&b"Fm1"[..], inner)],
        );

        assert_eq!(content.spans.len(), 2);
        let inside = &content.spans[0];
        assert_eq!(inside.text, "inside");
        assert!(inside.is_bold);
        assert_eq!(inside.color, Rgb(218, 31, 51));
        assert!((inside.x - 100.0).abs() < 0.01);
        assert!((inside.y - 642.0).abs() < 0.01);

        // Neither the form's colour nor its text state leaks out.
        assert_eq!(content.spans[1].color, Rgb::BLACK);
        assert_eq!(content.spans[1].font_name, "TimesNewRomanPSMT");
    }

    #[test]
    fn form_fonts_shadow_page_fonts() {
        let mut inner = form(
            9,
            [1.0, 0.0, 0.0, 1.0, 0.0, 0.0],
            vec![
                Op::new("BT", vec![]),
                font(b"F1", 10.0),
                show("one"),
                font(b"F2", 10.0),
                show("two"),
            ],
        );
        inner.fonts = vec![PageFont::new(b"F1", "Courier")];
        let content = read_with_forms(vec![paint(b"Fm1")], vec![(&b"Fm1"[..], inner)]);

        let names: Vec<&str> = content.spans.iter().map(|s| s.font_name.as_str()).collect();
        assert_eq!(names, ["Courier", "TimesNewRomanPSMT"]);
    }

    #[test]
    fn images_inside_forms_remember_the_form() {
        let inner = form(
            9,
            [2.0, 0.0, 0.0, 2.0, 0.0, 0.0],
            vec![
                Op::new("cm", nums(&[100.0, 0.0, 0.0, 50.0, 10.0, 20.0])),
                paint(b"Im0"),
            ],
        );
        let content = read_with_forms(vec![paint(b"Fm1")], vec![(&b"Fm1"[..], inner)]);

        assert_eq!(content.images.len(), 1);
        assert_eq!(content.images[0].form, Some((9, 0)));
        assert_eq!(content.images[0].bbox, Rect::new(20.0, 652.0, 220.0, 752.0));
    }

    #[test]
    fn self_painting_form_is_walked_once() {
        let looping = form(
            9,
            [1.0, 0.0, 0.0, 1.0, 0.0, 0.0],
            vec![
                Op::new("BT", vec![]),
                font(b"F1", 10.0),
                show("again"),
                Op::new("ET", vec![]),
                paint(b"Fm1"),
            ],
        );
        let content = read_with_forms(vec![paint(b"Fm1")], vec![(&b"Fm1"[..], looping)]);
        assert_eq!(content.spans.len(), 1);
    }
}
