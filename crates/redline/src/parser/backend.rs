use std::collections::BTreeMap;

use lopdf::content::Content;
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};

use super::cmap::ToUnicode;
use crate::RedlineError;

/// `lopdf::ObjectId` of a page dictionary.
pub type PageId = ObjectId;

/// `lopdf::ObjectId` of a form XObject stream.
pub type FormId = ObjectId;

/// One operand of a content-stream operator.
///
/// Content streams only ever need numbers, names, strings and arrays of
/// those; everything else collapses into `Other`.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Number(f32),
    Name(Vec<u8>),
    /// Undecoded string bytes, as shown by `Tj` and friends.
    Text(Vec<u8>),
    Array(Vec<Operand>),
    Other,
}

impl Operand {
    pub fn number(&self) -> Option<f32> {
        match self {
            Operand::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn name(&self) -> Option<&[u8]> {
        match self {
            Operand::Name(n) => Some(n),
            _ => None,
        }
    }
}

impl From<&Object> for Operand {
    fn from(obj: &Object) -> Self {
        match obj {
            Object::Integer(i) => Operand::Number(*i as f32),
            Object::Real(r) => Operand::Number(*r),
            Object::Name(n) => Operand::Name(n.clone()),
            Object::String(s, _) => Operand::Text(s.clone()),
            Object::Array(items) => Operand::Array(items.iter().map(Operand::from).collect()),
            _ => Operand::Other,
        }
    }
}

/// A decoded content-stream operation.
#[derive(Debug, Clone)]
pub struct Op {
    pub operator: String,
    pub operands: Vec<Operand>,
}

impl Op {
    pub fn new(operator: &str, operands: Vec<Operand>) -> Self {
        Self {
            operator: operator.to_string(),
            operands,
        }
    }
}

/// Glyph width in thousandths of the font size, for fonts without metrics.
pub const DEFAULT_GLYPH_WIDTH: f32 = 500.0;

/// CID ranges in `/W` are cut short after this many entries.
const MAX_WIDTH_RUN: u32 = 0xFFFF;

/// A font registered in a page's (or a form's) resources.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageFont {
    /// Resource key used by `Tf`, e.g. `b"F1"`.
    pub key: Vec<u8>,
    /// `BaseFont`, possibly still carrying a subset tag.
    pub base_font: String,
    /// Composite font: strings are big-endian 2-byte codes.
    pub two_byte: bool,
    /// Glyph widths by code, in thousandths of the font size. For composite
    /// fonts the code is taken as the CID.
    pub widths: BTreeMap<u32, f32>,
    /// Width of codes missing from `widths`: `MissingWidth` or `DW`.
    pub default_width: Option<f32>,
    pub to_unicode: Option<ToUnicode>,
}

impl PageFont {
    pub fn new(key: &[u8], base_font: &str) -> Self {
        Self {
            key: key.to_vec(),
            base_font: base_font.to_string(),
            ..Default::default()
        }
    }

    /// Character codes in `bytes`, each with its length in bytes.
    pub fn codes<'a>(&self, bytes: &'a [u8]) -> impl Iterator<Item = (u32, usize)> + 'a {
        let len = if self.two_byte && bytes.len() % 2 == 0 { 2 } else { 1 };
        bytes
            .chunks(len)
            .map(|c| (c.iter().fold(0, |acc, &b| (acc << 8) | u32::from(b)), c.len()))
    }

    pub fn width(&self, code: u32) -> f32 {
        self.widths
            .get(&code)
            .copied()
            .or(self.default_width)
            .unwrap_or(DEFAULT_GLYPH_WIDTH)
    }

    pub fn decode(&self, bytes: &[u8]) -> String {
        if let Some(cmap) = &self.to_unicode {
            let mut text = String::new();
            for (code, len) in self.codes(bytes) {
                match cmap.get(code) {
                    Some(s) => text.push_str(s),
                    None => text.push(unmapped(code, len)),
                }
            }
            return text;
        }
        if self.two_byte && !bytes.is_empty() && bytes.len() % 2 == 0 {
            let units: Vec<u16> = bytes
                .chunks_exact(2)
                .map(|c| u16::from_be_bytes([c[0], c[1]]))
                .collect();
            let text = String::from_utf16_lossy(&units);
            if text.chars().any(|c| c != '\u{FFFD}' && c != '\0') {
                return text;
            }
        }
        decode_pdf_string(bytes)
    }
}

/// A code the font's ToUnicode map leaves out.
fn unmapped(code: u32, len: usize) -> char {
    if len == 1 {
        return win_ansi(code as u8);
    }
    char::from_u32(code)
        .filter(|c| !c.is_control())
        .unwrap_or('\u{FFFD}')
}

/// Decode string bytes without font information: UTF-16BE when a byte
/// order mark leads, UTF-8 when valid, WinAnsi otherwise.
pub fn decode_pdf_string(bytes: &[u8]) -> String {
    if let Some(rest) = bytes.strip_prefix(&[0xFE, 0xFF]) {
        let units: Vec<u16> = rest
            .chunks_exact(2)
            .map(|c| u16::from_be_bytes([c[0], c[1]]))
            .collect();
        return String::from_utf16_lossy(&units);
    }
    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => bytes.iter().map(|&b| win_ansi(b)).collect(),
    }
}

/// WinAnsi agrees with Latin-1 apart from the 0x80..0x9F block. Only the
/// punctuation that shows up in list markers and quotes is mapped.
fn win_ansi(b: u8) -> char {
    match b {
        0x91 => '\u{2018}',
        0x92 => '\u{2019}',
        0x93 => '\u{201C}',
        0x94 => '\u{201D}',
        0x95 => '\u{2022}',
        0x96 => '\u{2013}',
        0x97 => '\u{2014}',
        _ => b as char,
    }
}

/// What an XObject name resolves to.
#[derive(Debug, Clone)]
pub enum XObject {
    Image,
    Form(Form),
}

/// A form XObject, ready to be walked like page content.
#[derive(Debug, Clone)]
pub struct Form {
    pub id: FormId,
    /// `/Matrix`: form space to the user space the form is painted in.
    pub matrix: [f32; 6],
    pub operations: Vec<Op>,
    /// Fonts from the form's own resources. Empty when it declares none.
    pub fonts: Vec<PageFont>,
}

/// What the layout pass needs from a parsed document. Tests substitute
/// their own implementation.
pub trait PdfBackend {
    /// 1-based page number to page object.
    fn pages(&self) -> BTreeMap<u32, PageId>;

    /// `(width, height)` in points from the (possibly inherited) MediaBox.
    fn page_size(&self, page: PageId) -> Result<(f32, f32), RedlineError>;

    fn fonts(&self, page: PageId) -> Vec<PageFont>;

    /// The page's content streams, concatenated and decoded.
    fn operations(&self, page: PageId) -> Result<Vec<Op>, RedlineError>;

    /// Resolve the XObject `name` painted on `page`. Inside a form, `form`
    /// is that form, and its resources are searched before the page's.
    fn xobject(&self, page: PageId, form: Option<FormId>, name: &[u8]) -> Option<XObject>;
}

/// [`PdfBackend`] over an in-memory [`lopdf::Document`].
pub struct LopdfBackend {
    doc: Document,
}

impl LopdfBackend {
    pub fn load_bytes(data: &[u8]) -> Result<Self, RedlineError> {
        let doc = Document::load_mem(data).map_err(|e| RedlineError::Parse(e.to_string()))?;
        if doc.is_encrypted() {
            return Err(RedlineError::Encrypted);
        }
        Ok(Self { doc })
    }

    pub fn raw_doc(&self) -> &Document {
        &self.doc
    }

    pub fn page_count(&self) -> usize {
        self.doc.get_pages().len()
    }

    /// The stream registered as `name` under `/XObject`, with its object id
    /// when it is an indirect object. See [`PdfBackend::xobject`] for how
    /// `form` scopes the lookup.
    pub fn xobject_stream(
        &self,
        page: PageId,
        form: Option<FormId>,
        name: &[u8],
    ) -> Option<(Option<ObjectId>, &Stream)> {
        let in_form = form
            .and_then(|id| self.doc.get_object(id).ok())
            .and_then(|obj| obj.as_stream().ok())
            .and_then(|stream| self.dict(stream.dict.get(b"Resources").ok()?))
            .and_then(|resources| self.named(resources, b"XObject", name));
        let entry = in_form.or_else(|| {
            let page_dict = self.doc.get_dictionary(page).ok()?;
            let resources = self.dict(self.inherited(page_dict, b"Resources")?)?;
            self.named(resources, b"XObject", name)
        })?;

        match self.deref(entry) {
            Object::Stream(stream) => Some((entry.as_reference().ok(), stream)),
            _ => None,
        }
    }

    fn named<'a>(
        &'a self,
        resources: &'a Dictionary,
        category: &[u8],
        name: &[u8],
    ) -> Option<&'a Object> {
        self.dict(resources.get(category).ok()?)?.get(name).ok()
    }

    fn deref<'a>(&'a self, obj: &'a Object) -> &'a Object {
        match obj {
            Object::Reference(id) => self.doc.get_object(*id).unwrap_or(obj),
            _ => obj,
        }
    }

    fn dict<'a>(&'a self, obj: &'a Object) -> Option<&'a Dictionary> {
        self.deref(obj).as_dict().ok()
    }

    fn number(&self, obj: &Object) -> Option<f32> {
        Operand::from(self.deref(obj)).number()
    }

    fn name(&self, dict: &Dictionary, key: &[u8]) -> Option<String> {
        let obj = self.deref(dict.get(key).ok()?);
        obj.as_name()
            .ok()
            .map(|n| String::from_utf8_lossy(n).into_owned())
    }

    /// Look `key` up on the page, then on its ancestors in the page tree.
    fn inherited<'a>(&'a self, dict: &'a Dictionary, key: &[u8]) -> Option<&'a Object> {
        let mut node = dict;
        loop {
            if let Ok(obj) = node.get(key) {
                return Some(obj);
            }
            let parent = node.get(b"Parent").ok()?.as_reference().ok()?;
            node = self.doc.get_dictionary(parent).ok()?;
        }
    }

    fn font_list(&self, fonts: &Dictionary) -> Vec<PageFont> {
        fonts
            .iter()
            .filter_map(|(key, obj)| Some(self.page_font(key.clone(), self.dict(obj)?)))
            .collect()
    }

    fn page_font(&self, key: Vec<u8>, dict: &Dictionary) -> PageFont {
        let composite = self.name(dict, b"Subtype").as_deref() == Some("Type0");
        let identity = self
            .name(dict, b"Encoding")
            .is_some_and(|e| e.starts_with("Identity"));
        let to_unicode = dict
            .get(b"ToUnicode")
            .ok()
            .and_then(|obj| self.deref(obj).as_stream().ok())
            .and_then(|stream| stream.get_plain_content().ok())
            .map(|data| ToUnicode::parse(&data))
            .filter(|cmap| !cmap.is_empty());

        let mut font = PageFont {
            key,
            base_font: self.name(dict, b"BaseFont").unwrap_or_default(),
            two_byte: composite
                || identity
                || to_unicode.as_ref().is_some_and(|cmap| cmap.code_len == 2),
            to_unicode,
            ..Default::default()
        };
        if composite {
            self.cid_widths(dict, &mut font);
        } else {
            self.simple_widths(dict, &mut font);
        }
        font
    }

    /// `FirstChar`, `Widths` and the descriptor's `MissingWidth`.
    fn simple_widths(&self, dict: &Dictionary, font: &mut PageFont) {
        let first = dict
            .get(b"FirstChar")
            .ok()
            .and_then(|obj| self.number(obj))
            .unwrap_or(0.0)
            .max(0.0) as u32;
        if let Some(widths) = dict
            .get(b"Widths")
            .ok()
            .and_then(|obj| self.deref(obj).as_array().ok())
        {
            for (code, width) in (first..).zip(widths) {
                if let Some(width) = self.number(width) {
                    font.widths.insert(code, width);
                }
            }
        }
        font.default_width = dict
            .get(b"FontDescriptor")
            .ok()
            .and_then(|obj| self.dict(obj))
            .and_then(|descriptor| descriptor.get(b"MissingWidth").ok())
            .and_then(|obj| self.number(obj));
    }

    /// `DW` and `W` of the first descendant font. `W` mixes
    /// `c [w1 w2 ...]` runs with `first last w` ranges.
    fn cid_widths(&self, dict: &Dictionary, font: &mut PageFont) {
        let Some(cid_font) = dict
            .get(b"DescendantFonts")
            .ok()
            .and_then(|obj| self.deref(obj).as_array().ok())
            .and_then(|fonts| fonts.first())
            .and_then(|obj| self.dict(obj))
        else {
            return;
        };
        font.default_width = Some(
            cid_font
                .get(b"DW")
                .ok()
                .and_then(|obj| self.number(obj))
                .unwrap_or(1000.0),
        );

        let Some(w) = cid_font
            .get(b"W")
            .ok()
            .and_then(|obj| self.deref(obj).as_array().ok())
        else {
            return;
        };
        let mut i = 0;
        while let Some(first) = w.get(i).and_then(|obj| self.number(obj)) {
            let first = first.max(0.0) as u32;
            match w.get(i + 1).map(|obj| self.deref(obj)) {
                Some(Object::Array(run)) => {
                    for (cid, width) in (first..).zip(run) {
                        if let Some(width) = self.number(width) {
                            font.widths.insert(cid, width);
                        }
                    }
                    i += 2;
                }
                Some(last) => {
                    let (Some(last), Some(width)) = (
                        Operand::from(last).number(),
                        w.get(i + 2).and_then(|obj| self.number(obj)),
                    ) else {
                        break;
                    };
                    let last = (last.max(0.0) as u32).min(first.saturating_add(MAX_WIDTH_RUN));
                    for cid in first..=last {
                        font.widths.insert(cid, width);
                    }
                    i += 3;
                }
                None => break,
            }
        }
    }
}

fn decode_operations(data: &[u8]) -> Result<Vec<Op>, lopdf::Error> {
    let content = Content::decode(data)?;
    Ok(content
        .operations
        .into_iter()
        .map(|op| Op {
            operands: op.operands.iter().map(Operand::from).collect(),
            operator: op.operator,
        })
        .collect())
}

impl PdfBackend for LopdfBackend {
    fn pages(&self) -> BTreeMap<u32, PageId> {
        self.doc.get_pages()
    }

    fn page_size(&self, page: PageId) -> Result<(f32, f32), RedlineError> {
        let dict = self
            .doc
            .get_dictionary(page)
            .map_err(|e| RedlineError::Parse(format!("page {:?}: {}", page, e)))?;
        let media_box = self
            .inherited(dict, b"MediaBox")
            .and_then(|obj| self.deref(obj).as_array().ok())
            .ok_or_else(|| RedlineError::Parse(format!("page {:?} has no MediaBox", page)))?;

        let corners = media_box
            .iter()
            .map(|obj| self.number(obj))
            .collect::<Option<Vec<f32>>>();
        match corners.as_deref() {
            Some([x0, y0, x1, y1, ..]) => Ok(((x1 - x0).abs(), (y1 - y0).abs())),
            _ => Err(RedlineError::Parse(format!(
                "page {:?} has a malformed MediaBox",
                page
            ))),
        }
    }

    fn fonts(&self, page: PageId) -> Vec<PageFont> {
        let Ok(fonts) = self.doc.get_page_fonts(page) else {
            return Vec::new();
        };
        fonts
            .into_iter()
            .map(|(key, dict)| self.page_font(key, dict))
            .collect()
    }

    fn operations(&self, page: PageId) -> Result<Vec<Op>, RedlineError> {
        let data = self
            .doc
            .get_page_content(page)
            .map_err(|e| RedlineError::Parse(format!("page {:?} content: {}", page, e)))?;
        decode_operations(&data)
            .map_err(|e| RedlineError::Parse(format!("page {:?} content: {}", page, e)))
    }

    fn xobject(&self, page: PageId, form: Option<FormId>, name: &[u8]) -> Option<XObject> {
        let (id, stream) = self.xobject_stream(page, form, name)?;
        let subtype = stream.dict.get(b"Subtype").ok()?.as_name().ok()?;
        match subtype {
            b"Image" => Some(XObject::Image),
            b"Form" => {
                let id = id?;
                let data = stream.get_plain_content().ok()?;
                let operations = match decode_operations(&data) {
                    Ok(ops) => ops,
                    Err(e) => {
                        log::warn!("form {:?}: {}", id, e);
                        return None;
                    }
                };
                let matrix = stream
                    .dict
                    .get(b"Matrix")
                    .ok()
                    .and_then(|obj| self.deref(obj).as_array().ok())
                    .and_then(|values| {
                        let values: Vec<f32> =
                            values.iter().map(|v| self.number(v)).collect::<Option<_>>()?;
                        <[f32; 6]>::try_from(values).ok()
                    })
                    .unwrap_or([1.0, 0.0, 0.0, 1.0, 0.0, 0.0]);
                let fonts = stream
                    .dict
                    .get(b"Resources")
                    .ok()
                    .and_then(|obj| self.dict(obj))
                    .and_then(|resources| self.dict(resources.get(b"Font").ok()?))
                    .map(|fonts| self.font_list(fonts))
                    .unwrap_or_default();
                Some(XObject::Form(Form {
                    id,
                    matrix,
                    operations,
                    fonts,
                }))
            }
            _ => None,
        }
    }
}
