//! Heading context carried between blocks and pages, and the per-page state
//! that keeps tables and figures from being emitted twice.

use std::collections::BTreeSet;

use crate::classify::{BlockDecision, StructuralRole};
use crate::raster::Region;
use crate::types::Rect;

/// State of one heading level.
#[derive(Debug, Clone, Default)]
pub enum HeadingState {
    /// No heading of this level is open.
    #[default]
    Closed,
    /// A heading is open but nothing is left to emit for it: it was flagged
    /// itself, was already flushed, or its crop was dropped.
    Satisfied,
    /// An unflagged heading waiting for the first flagged block under it.
    Pending(Region),
}

impl HeadingState {
    pub fn is_open(&self) -> bool {
        !matches!(self, HeadingState::Closed)
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, HeadingState::Pending(_))
    }

    /// Take the pending crop, if any, leaving the level satisfied.
    fn take(&mut self) -> Option<Region> {
        match std::mem::take(self) {
            HeadingState::Pending(region) => {
                *self = HeadingState::Satisfied;
                Some(region)
            }
            HeadingState::Closed => None,
            HeadingState::Satisfied => {
                *self = HeadingState::Satisfied;
                None
            }
        }
    }

    /// Drop the pending crop, if any, keeping the level open.
    fn discard(&mut self) {
        if self.is_pending() {
            *self = HeadingState::Satisfied;
        }
    }
}

/// The level-2 / level-3 heading context.
///
/// Level 3 is nested inside level 2: any level-2 transition closes level 3.
/// A chapter boundary closes both.
#[derive(Debug, Clone, Default)]
pub struct HeadingContext {
    pub level2: HeadingState,
    pub level3: HeadingState,
}

impl HeadingContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn level2_open(&self) -> bool {
        self.level2.is_open()
    }

    pub fn level3_open(&self) -> bool {
        self.level3.is_open()
    }

    /// Apply the heading transition for one block.
    ///
    /// `crop` renders an unflagged heading block; returning `None` (render
    /// failure) leaves the level satisfied with nothing pending.
    pub fn transition<F>(&mut self, decision: &BlockDecision, crop: F)
    where
        F: FnOnce(Rect) -> Option<Region>,
    {
        let state = |flagged: bool, crop: F| {
            if flagged {
                HeadingState::Satisfied
            } else {
                crop(decision.bbox)
                    .map(HeadingState::Pending)
                    .unwrap_or(HeadingState::Satisfied)
            }
        };

        match decision.role {
            StructuralRole::ChapterBoundary => {
                self.level2 = HeadingState::Closed;
                self.level3 = HeadingState::Closed;
            }
            StructuralRole::HeadingL2 => {
                self.level3 = HeadingState::Closed;
                self.level2 = state(decision.role_already_flagged, crop);
            }
            StructuralRole::HeadingL3 => {
                self.level3 = state(decision.role_already_flagged, crop);
            }
            _ => {}
        }
    }

    /// Emit whatever headings are still pending, level 2 first. Each pending
    /// crop comes out exactly once.
    pub fn flush(&mut self) -> Vec<Region> {
        self.level2
            .take()
            .into_iter()
            .chain(self.level3.take())
            .collect()
    }

    /// Pending crops never carry over to another page.
    pub fn end_page(&mut self) {
        self.level2.discard();
        self.level3.discard();
    }
}

/// Per-page bookkeeping, reset at the start of every page.
#[derive(Debug, Clone, Default)]
pub struct PageState {
    /// The table pass already ran on this page (found tables or not).
    pub table_attempted: bool,
    /// At least one table raster sits on this page.
    pub table_posted: bool,
    /// A figure caption block was already emitted on this page.
    pub caption_shown: bool,
    pub figures_shown: BTreeSet<u32>,
}

impl PageState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Should this flagged block's own raster be left out because a table
    /// raster already covers it?
    pub fn suppresses(&self, decision: &BlockDecision) -> bool {
        self.table_posted && decision.table_content
    }
}
