//! Page model: spans grouped into lines, lines grouped into blocks.
//!
//! Coordinates are top-left origin points, as produced by
//! [`super::content::read_page`].

use std::collections::BTreeMap;

use super::backend::{FormId, PageId, PdfBackend};
use super::content::read_page;
use crate::types::{Rect, Rgb};
use crate::RedlineError;

/// Spans closer than this vertically share a baseline.
const BASELINE_TOLERANCE: f32 = 1.0;

/// Horizontal gap at which two merged runs get a separating space.
const WORD_GAP: f32 = 1.5;

/// A vertical step above this multiple of the previous line's size ends
/// the block.
const PARAGRAPH_GAP: f32 = 1.4;

const ASCENT: f32 = 0.8;
const DESCENT: f32 = 0.2;

/// One run of uniformly styled text.
#[derive(Debug, Clone)]
pub struct TextSpan {
    pub text: String,
    pub x: f32,
    /// Baseline.
    pub y: f32,
    pub width: f32,
    pub font_size: f32,
    /// Base font name without its subset tag.
    pub font_name: String,
    pub color: Rgb,
    pub is_bold: bool,
    pub is_italic: bool,
}

impl TextSpan {
    /// Glyph box estimated from the font size.
    pub fn bbox(&self) -> Rect {
        Rect::new(
            self.x,
            self.y - self.font_size * ASCENT,
            self.x + self.width,
            self.y + self.font_size * DESCENT,
        )
    }

    fn same_style(&self, other: &TextSpan) -> bool {
        self.font_name == other.font_name
            && (self.font_size - other.font_size).abs() < 0.5
            && self.is_bold == other.is_bold
            && self.is_italic == other.is_italic
            && self.color == other.color
    }

    fn right(&self) -> f32 {
        self.x + self.width
    }
}

#[derive(Debug, Clone, Default)]
pub struct TextLine {
    pub spans: Vec<TextSpan>,
    pub y: f32,
    pub x: f32,
    /// The size covering the most characters.
    pub font_size: f32,
}

impl TextLine {
    /// Build a line from spans sharing a baseline. Touching or word-spaced
    /// runs of the same style are merged into one span.
    pub fn from_spans(mut spans: Vec<TextSpan>) -> Self {
        spans.sort_by(|a, b| a.x.total_cmp(&b.x));

        let mut runs: Vec<TextSpan> = Vec::with_capacity(spans.len());
        for span in spans {
            match runs.last_mut() {
                Some(prev)
                    if prev.same_style(&span)
                        && span.x - prev.right() > -prev.font_size
                        && span.x - prev.right() < prev.font_size * 2.0 =>
                {
                    if span.x - prev.right() >= WORD_GAP {
                        prev.text.push(' ');
                    }
                    prev.text.push_str(&span.text);
                    prev.width = span.right() - prev.x;
                }
                _ => runs.push(span),
            }
        }

        let mut sizes: BTreeMap<u32, usize> = BTreeMap::new();
        for run in &runs {
            *sizes.entry((run.font_size * 100.0).round() as u32).or_default() +=
                run.text.chars().count();
        }
        let font_size = sizes
            .into_iter()
            .max_by_key(|&(size, chars)| (chars, size))
            .map_or(0.0, |(size, _)| size as f32 / 100.0);

        Self {
            y: runs.first().map_or(0.0, |s| s.y),
            x: runs.first().map_or(0.0, |s| s.x),
            font_size,
            spans: runs,
        }
    }

    /// Span texts joined by single spaces.
    pub fn text(&self) -> String {
        let parts: Vec<&str> = self.spans.iter().map(|s| s.text.as_str()).collect();
        parts.join(" ")
    }

    pub fn bbox(&self) -> Option<Rect> {
        union(self.spans.iter().map(TextSpan::bbox))
    }
}

/// Consecutive lines the classifier treats as one unit.
#[derive(Debug, Clone, Default)]
pub struct TextBlock {
    pub lines: Vec<TextLine>,
}

impl TextBlock {
    pub fn spans(&self) -> impl Iterator<Item = &TextSpan> {
        self.lines.iter().flat_map(|l| l.spans.iter())
    }

    /// Union of the line boxes; empty for a block without spans.
    pub fn bbox(&self) -> Rect {
        union(self.lines.iter().filter_map(TextLine::bbox)).unwrap_or_default()
    }

    pub fn first_line_text(&self) -> String {
        self.lines.first().map(TextLine::text).unwrap_or_default()
    }

    pub fn text(&self) -> String {
        let lines: Vec<String> = self.lines.iter().map(TextLine::text).collect();
        lines.join("\n")
    }

    /// Whether `line` belongs to this block rather than starting a new one.
    /// A wide vertical gap splits, and so does a font change when either side
    /// is bold, since headings often sit directly on their body text.
    fn continues_with(&self, line: &TextLine) -> bool {
        let Some(prev) = self.lines.last() else {
            return true;
        };
        if line.y - prev.y > prev.font_size * PARAGRAPH_GAP {
            return false;
        }
        match (prev.spans.first(), line.spans.first()) {
            (Some(a), Some(b)) => a.font_name == b.font_name || !(a.is_bold || b.is_bold),
            _ => true,
        }
    }
}

/// An image XObject painted on the page.
#[derive(Debug, Clone, PartialEq)]
pub struct ImagePlacement {
    /// Name the `Do` operator used, e.g. `b"Im0"`.
    pub name: Vec<u8>,
    /// Form whose resources `name` was looked up in, if painted from one.
    pub form: Option<FormId>,
    pub bbox: Rect,
}

#[derive(Debug, Clone, Default)]
pub struct PageLayout {
    /// 1-based.
    pub number: u32,
    pub width: f32,
    pub height: f32,
    pub spans: Vec<TextSpan>,
    pub images: Vec<ImagePlacement>,
    pub blocks: Vec<TextBlock>,
}

/// Read page `number` and group its text into blocks.
pub fn extract_page(
    backend: &dyn PdfBackend,
    number: u32,
    page: PageId,
) -> Result<PageLayout, RedlineError> {
    let (width, height) = backend.page_size(page)?;
    let content = read_page(backend, page, height)?;
    let blocks = group_lines_into_blocks(group_spans_into_lines(content.spans.clone()));

    Ok(PageLayout {
        number,
        width,
        height,
        spans: content.spans,
        images: content.images,
        blocks,
    })
}

/// Lines come out top to bottom.
pub fn group_spans_into_lines(mut spans: Vec<TextSpan>) -> Vec<TextLine> {
    spans.sort_by(|a, b| a.y.total_cmp(&b.y).then(a.x.total_cmp(&b.x)));

    let mut lines = Vec::new();
    let mut pending: Vec<TextSpan> = Vec::new();
    for span in spans {
        if let Some(first) = pending.first() {
            if (span.y - first.y).abs() > BASELINE_TOLERANCE {
                lines.push(TextLine::from_spans(std::mem::take(&mut pending)));
            }
        }
        pending.push(span);
    }
    if !pending.is_empty() {
        lines.push(TextLine::from_spans(pending));
    }
    lines
}

pub fn group_lines_into_blocks(lines: Vec<TextLine>) -> Vec<TextBlock> {
    let mut blocks: Vec<TextBlock> = Vec::new();
    for line in lines {
        match blocks.last_mut() {
            Some(block) if block.continues_with(&line) => block.lines.push(line),
            _ => blocks.push(TextBlock { lines: vec![line] }),
        }
    }
    blocks
}

fn union(mut rects: impl Iterator<Item = Rect>) -> Option<Rect> {
    let first = rects.next()?;
    Some(rects.fold(first, |acc, r| acc.union(&r)))
}
