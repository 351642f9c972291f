//! ToUnicode CMaps.
//!
//! Only what text extraction needs is read: the code width of the first
//! codespace range, `bfchar` entries, and `bfrange` entries in both their
//! incrementing and array forms.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;

/// Ranges are cut short after this many codes.
const MAX_RANGE: u32 = 0x1_0000;

/// Source code to Unicode text, from a font's `/ToUnicode` stream.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToUnicode {
    /// Bytes per source code.
    pub code_len: usize,
    map: BTreeMap<u32, String>,
}

struct Patterns {
    hex: Regex,
    pair: Regex,
    range: Regex,
}

fn patterns() -> Option<&'static Patterns> {
    static PATTERNS: OnceLock<Option<Patterns>> = OnceLock::new();
    PATTERNS
        .get_or_init(|| {
            Some(Patterns {
                hex: Regex::new(r"<([0-9A-Fa-f]*)>").ok()?,
                pair: Regex::new(r"<([0-9A-Fa-f]+)>\s*<([0-9A-Fa-f]+)>").ok()?,
                range: Regex::new(
                    r"<([0-9A-Fa-f]+)>\s*<([0-9A-Fa-f]+)>\s*(?:<([0-9A-Fa-f]+)>|\[([^\]]*)\])",
                )
                .ok()?,
            })
        })
        .as_ref()
}

impl ToUnicode {
    pub fn parse(data: &[u8]) -> Self {
        let content = String::from_utf8_lossy(data);
        let mut cmap = ToUnicode::default();
        let Some(p) = patterns() else {
            return cmap;
        };

        let first_code = |section: &str| {
            p.hex
                .captures(section)
                .and_then(|c| c.get(1))
                .map(|m| m.as_str().len().div_ceil(2))
        };
        cmap.code_len = sections(&content, "begincodespacerange", "endcodespacerange")
            .into_iter()
            .find_map(first_code)
            .or_else(|| {
                sections(&content, "beginbfchar", "endbfchar")
                    .into_iter()
                    .chain(sections(&content, "beginbfrange", "endbfrange"))
                    .find_map(first_code)
            })
            .unwrap_or(1)
            .clamp(1, 4);

        for section in sections(&content, "beginbfchar", "endbfchar") {
            for caps in p.pair.captures_iter(section) {
                if let (Ok(code), Some(text)) =
                    (u32::from_str_radix(&caps[1], 16), utf16_hex(&caps[2]))
                {
                    cmap.map.insert(code, String::from_utf16_lossy(&text));
                }
            }
        }

        for section in sections(&content, "beginbfrange", "endbfrange") {
            for caps in p.range.captures_iter(section) {
                let (Ok(lo), Ok(hi)) = (
                    u32::from_str_radix(&caps[1], 16),
                    u32::from_str_radix(&caps[2], 16),
                ) else {
                    continue;
                };
                let hi = hi.min(lo.saturating_add(MAX_RANGE - 1));

                if let Some(start) = caps.get(3).and_then(|m| utf16_hex(m.as_str())) {
                    for code in lo..=hi {
                        let mut units = start.clone();
                        if let Some(last) = units.last_mut() {
                            *last = last.wrapping_add((code - lo) as u16);
                        }
                        cmap.map.insert(code, String::from_utf16_lossy(&units));
                    }
                } else if let Some(array) = caps.get(4) {
                    let targets = p
                        .hex
                        .captures_iter(array.as_str())
                        .filter_map(|c| utf16_hex(&c[1]));
                    for (code, units) in (lo..=hi).zip(targets) {
                        cmap.map.insert(code, String::from_utf16_lossy(&units));
                    }
                }
            }
        }

        cmap
    }

    pub fn get(&self, code: u32) -> Option<&str> {
        self.map.get(&code).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

/// Text between each `begin`/`end` pair.
fn sections<'a>(content: &'a str, begin: &str, end: &str) -> Vec<&'a str> {
    let mut found = Vec::new();
    let mut rest = content;
    while let Some(start) = rest.find(begin) {
        let after = &rest[start + begin.len()..];
        let Some(stop) = after.find(end) else { break };
        found.push(&after[..stop]);
        rest = &after[stop + end.len()..];
    }
    found
}

/// Big-endian UTF-16 code units from hex digits. A lone byte is taken as
/// one unit.
fn utf16_hex(hex: &str) -> Option<Vec<u16>> {
    if hex.len() <= 2 {
        return u16::from_str_radix(hex, 16).ok().map(|u| vec![u]);
    }
    let digits = hex.as_bytes();
    digits
        .chunks(4)
        .map(|chunk| u16::from_str_radix(std::str::from_utf8(chunk).ok()?, 16).ok())
        .collect()
}
