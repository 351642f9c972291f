//! Block classification.
//!
//! [`classify_block`] looks at one text block in isolation and records
//! everything the context machine and the compositor need to know about it.
//! It holds no state of its own.

use std::collections::BTreeSet;

use crate::parser::layout::TextBlock;
use crate::signature::{
    is_ignored_glyph, is_table_trigger, parse_caption_ids, FlagRule, FontKey, Signature,
    CAPTION_KEYWORD,
};
use crate::types::{Rect, Rgb};

/// Fraction of each half-height kept when a block carries small math glyphs.
pub const MATH_SHRINK_RATIO: f32 = 0.36;

/// The structural role a block plays, by priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StructuralRole {
    #[default]
    None,
    ChapterBoundary,
    HeadingL2,
    HeadingL3,
    FigureCaption,
    TableTrigger,
}

/// Everything decided about one block.
#[derive(Debug, Clone, Default)]
pub struct BlockDecision {
    pub bbox: Rect,
    /// Region to rasterize when the block is emitted through the flagged
    /// path. Equal to `bbox` unless math glyphs shrank it.
    pub render_rect: Rect,
    pub flagged: bool,
    pub all_fonts: BTreeSet<FontKey>,
    pub flagged_fonts: BTreeSet<FontKey>,
    pub role: StructuralRole,
    /// The block carrying the role is itself flagged, so it renders through
    /// the flagged path and no separate crop is needed.
    pub role_already_flagged: bool,
    pub table_trigger: bool,
    pub catalogue_title: bool,
    pub figure_refs: Vec<u32>,
    /// The block contains table cell text and may be covered by a table
    /// raster already on the page.
    pub table_content: bool,
}

impl BlockDecision {
    pub fn has(&self, signature: Signature) -> bool {
        signature.present_in(&self.all_fonts)
    }

    pub fn has_flagged(&self, signature: Signature) -> bool {
        signature.present_in(&self.flagged_fonts)
    }
}

pub fn classify_block(block: &TextBlock, rule: FlagRule) -> BlockDecision {
    let bbox = block.bbox();
    let mut decision = BlockDecision {
        bbox,
        render_rect: bbox,
        ..Default::default()
    };

    for span in block.spans() {
        let font = FontKey::new(span.font_size, span.font_name.as_str());

        if rule.is_flagged(span.color) && !is_ignored_glyph(&span.text) {
            decision.flagged = true;
            if is_table_trigger(&font, &span.text) {
                decision.table_trigger = true;
            }
            decision.flagged_fonts.insert(font.clone());
        } else if span.color == Rgb::BLACK
            && span.is_bold
            && Signature::CatalogueTitle.matches(&font)
        {
            decision.catalogue_title = true;
        }

        decision.all_fonts.insert(font);
    }

    let caption = decision.has(Signature::FigureCaption)
        && block.first_line_text().trim_start().starts_with(CAPTION_KEYWORD);

    decision.role = if decision.has(Signature::ChapterBoundary) {
        StructuralRole::ChapterBoundary
    } else if decision.has(Signature::HeadingL2) {
        StructuralRole::HeadingL2
    } else if decision.has(Signature::HeadingL3) {
        StructuralRole::HeadingL3
    } else if caption {
        StructuralRole::FigureCaption
    } else if decision.table_trigger {
        StructuralRole::TableTrigger
    } else {
        StructuralRole::None
    };

    decision.role_already_flagged = decision.role != StructuralRole::None && decision.flagged;

    if caption {
        decision.figure_refs = parse_caption_ids(block.first_line_text().trim_end());
    }

    decision.table_content = decision.has(Signature::TableContent);

    if decision.has(Signature::SmallMath) {
        decision.render_rect = bbox.shrink_vertical(MATH_SHRINK_RATIO);
    }

    decision
}
