//! Structural signatures and the flagged-colour rule.
//!
//! Rule books mark their structure with fixed font choices rather than any
//! outline metadata. Each recognised role is one [`Signature`] variant,
//! matched against the `(size, font name)` pairs of a block by an explicit
//! predicate.

use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::types::Rgb;

/// The canonical redline colour.
pub const FLAGGED_COLOR: Rgb = Rgb(218, 31, 51);

/// Glyphs that never count as flagged content on their own.
pub const IGNORED_GLYPHS: [&str; 4] = ["\u{2022}", "\u{25CF}", "\u{2219}", "\u{2013}"];

/// Literal span texts that turn a 12pt italic rule-table title into a
/// table trigger.
pub const TABLE_YEARS: [&str; 2] = ["2024", "2025"];

/// Keyword a figure caption's first line starts with.
pub const CAPTION_KEYWORD: &str = "FIGURE";

/// Sizes are compared in hundredths of a point; this many hundredths of
/// slack absorb rounding in text matrices.
const SIZE_TOLERANCE: i32 = 5;

/// How a span colour is judged to be "flagged".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlagRule {
    /// Red channel above 150, green and blue below 100.
    #[default]
    Threshold,
    /// Only the canonical (218, 31, 51).
    Exact,
}

impl FlagRule {
    pub fn is_flagged(&self, color: Rgb) -> bool {
        match self {
            FlagRule::Threshold => color.0 > 150 && color.1 < 100 && color.2 < 100,
            FlagRule::Exact => color == FLAGGED_COLOR,
        }
    }
}

impl fmt::Display for FlagRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlagRule::Threshold => write!(f, "threshold"),
            FlagRule::Exact => write!(f, "exact"),
        }
    }
}

impl FromStr for FlagRule {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "threshold" => Ok(FlagRule::Threshold),
            "exact" => Ok(FlagRule::Exact),
            other => Err(format!(
                "unknown flag rule '{}', expected 'threshold' or 'exact'",
                other
            )),
        }
    }
}

/// Returns `true` for span texts that are only list decoration: empty,
/// whitespace, or a single bullet/dash glyph.
pub fn is_ignored_glyph(text: &str) -> bool {
    let trimmed = text.trim();
    trimmed.is_empty() || IGNORED_GLYPHS.contains(&trimmed)
}

/// A `(size, font name)` pair with the size quantised to hundredths of a
/// point so it can live in hash sets.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FontKey {
    pub size_centi: i32,
    pub name: String,
}

impl FontKey {
    pub fn new(size: f32, name: impl Into<String>) -> Self {
        Self {
            size_centi: (size * 100.0).round() as i32,
            name: name.into(),
        }
    }

    pub fn size(&self) -> f32 {
        self.size_centi as f32 / 100.0
    }

    fn is(&self, size: f32, name: &str) -> bool {
        let target = (size * 100.0).round() as i32;
        (self.size_centi - target).abs() <= SIZE_TOLERANCE && self.name == name
    }
}

impl fmt::Display for FontKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2} {}", self.size(), self.name)
    }
}

/// The closed set of recognised structural signatures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Signature {
    /// Level-2 section title: 11pt Arial-BoldMT.
    HeadingL2,
    /// Level-3 section title: 10pt Arial-BoldMT.
    HeadingL3,
    /// Chapter title: 12pt Arial-Black.
    ChapterBoundary,
    /// Figure caption font: 12pt Arial-BoldMT. The caption keyword check on
    /// the first line is done by the classifier.
    FigureCaption,
    /// Table cell text: 9pt TimesNewRomanPSMT.
    TableContent,
    /// Rule-table title year: 12pt Arial-ItalicMT.
    TableYear,
    /// Inline math glyphs: 8pt or 10.5pt CambriaMath.
    SmallMath,
    /// Catalogue title of older rule books: 14pt or 36pt Arial-Black.
    CatalogueTitle,
}

impl Signature {
    pub fn matches(&self, font: &FontKey) -> bool {
        match self {
            Signature::HeadingL2 => font.is(11.0, "Arial-BoldMT"),
            Signature::HeadingL3 => font.is(10.0, "Arial-BoldMT"),
            Signature::ChapterBoundary => font.is(12.0, "Arial-Black"),
            Signature::FigureCaption => font.is(12.0, "Arial-BoldMT"),
            Signature::TableContent => font.is(9.0, "TimesNewRomanPSMT"),
            Signature::TableYear => font.is(12.0, "Arial-ItalicMT"),
            Signature::SmallMath => font.is(8.0, "CambriaMath") || font.is(10.5, "CambriaMath"),
            Signature::CatalogueTitle => {
                font.is(14.0, "Arial-Black") || font.is(36.0, "Arial-Black")
            }
        }
    }

    /// Does any of the given fonts carry this signature?
    pub fn present_in<'a>(&self, fonts: impl IntoIterator<Item = &'a FontKey>) -> bool {
        fonts.into_iter().any(|f| self.matches(f))
    }
}

/// Does a flagged span with this font and text ask for the table pass?
pub fn is_table_trigger(font: &FontKey, text: &str) -> bool {
    Signature::TableContent.matches(font)
        || (Signature::TableYear.matches(font) && TABLE_YEARS.contains(&text.trim()))
}

/// Parse the figure numbers a caption names: `"FIGURE 3 "` gives `[3]`,
/// `"FIGURES 4 and 5"` gives `[4, 5]`. Anything not starting with the
/// caption keyword gives an empty list.
pub fn parse_caption_ids(first_line: &str) -> Vec<u32> {
    static CAPTION: OnceLock<Option<Regex>> = OnceLock::new();
    static NUMBER: OnceLock<Option<Regex>> = OnceLock::new();

    let caption = CAPTION.get_or_init(|| {
        Regex::new(r"^FIGURES?\s*(\d+(?:\s*(?:,|and|&)\s*\d+)*)").ok()
    });
    let number = NUMBER.get_or_init(|| Regex::new(r"\d+").ok());

    let (Some(caption), Some(number)) = (caption, number) else {
        return Vec::new();
    };

    caption
        .captures(first_line.trim())
        .and_then(|c| c.get(1))
        .map(|ids| {
            number
                .find_iter(ids.as_str())
                .filter_map(|m| m.as_str().parse().ok())
                .collect()
        })
        .unwrap_or_default()
}
