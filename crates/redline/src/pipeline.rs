//! Document-level orchestration.
//!
//! Pages are walked strictly in order: heading context can span pages, so
//! the same [`HeadingContext`] is threaded through the whole document while
//! [`PageState`] is rebuilt for every page.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::catalog::FigureCatalog;
use crate::classify::{classify_block, BlockDecision, StructuralRole};
use crate::compose::{ComposedPage, Compositor};
use crate::context::{HeadingContext, PageState};
use crate::flow::{self, DEFAULT_FLOW_DPI};
use crate::parser::backend::{LopdfBackend, PdfBackend};
use crate::parser::layout::{extract_page, PageLayout};
use crate::parser::table::{TableDetector, TableDetectorConfig};
use crate::raster::{self, Rasterizer, Region};
use crate::signature::FlagRule;
use crate::types::{ExtractionReport, Rect};
use crate::RedlineError;

/// Resolution every region is rasterized at.
pub const DEFAULT_DPI: f32 = 380.0;

/// Knobs for one extraction run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractOptions {
    pub dpi: f32,
    pub flag_rule: FlagRule,
    pub flow_dpi: f32,
    /// Emit black catalogue titles of older rule books.
    pub catalogue_titles: bool,
    pub table: TableDetectorConfig,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            dpi: DEFAULT_DPI,
            flag_rule: FlagRule::default(),
            flow_dpi: DEFAULT_FLOW_DPI,
            catalogue_titles: true,
            table: TableDetectorConfig::default(),
        }
    }
}

/// The two output documents plus what happened on the way.
#[derive(Debug, Clone)]
pub struct Extraction {
    /// Paginated PDF with one page per source page.
    pub composited: Vec<u8>,
    /// DOCX with every raster appended in order.
    pub flowing: Vec<u8>,
    pub report: ExtractionReport,
}

/// Extract with the pdfium renderer and the alignment table detector.
#[cfg(feature = "pdfium")]
pub fn extract(bytes: &[u8], options: &ExtractOptions) -> Result<Extraction, RedlineError> {
    let rasterizer = raster::PdfiumRasterizer::new(bytes)?;
    let detector = crate::parser::table::AlignmentTableDetector::new(options.table.clone());
    extract_with(bytes, &rasterizer, &detector, options)
}

/// Extract with caller-supplied collaborators. No side effects.
pub fn extract_with(
    bytes: &[u8],
    rasterizer: &dyn Rasterizer,
    detector: &dyn TableDetector,
    options: &ExtractOptions,
) -> Result<Extraction, RedlineError> {
    run(bytes, rasterizer, detector, options, None)
}

/// Like [`extract_with`], but rewrites the partially composited document to
/// `checkpoint` after every page. The file is only a progress marker; the
/// returned [`Extraction`] is the result.
pub fn extract_with_checkpoint(
    bytes: &[u8],
    rasterizer: &dyn Rasterizer,
    detector: &dyn TableDetector,
    options: &ExtractOptions,
    checkpoint: &Path,
) -> Result<Extraction, RedlineError> {
    run(bytes, rasterizer, detector, options, Some(checkpoint))
}

fn run(
    bytes: &[u8],
    rasterizer: &dyn Rasterizer,
    detector: &dyn TableDetector,
    options: &ExtractOptions,
    checkpoint: Option<&Path>,
) -> Result<Extraction, RedlineError> {
    if options.dpi <= 0.0 {
        return Err(RedlineError::Raster(format!(
            "dpi must be positive, got {}",
            options.dpi
        )));
    }

    let backend = LopdfBackend::load_bytes(bytes)?;
    let layouts = backend
        .pages()
        .into_iter()
        .map(|(number, id)| Ok((id, extract_page(&backend, number, id)?)))
        .collect::<Result<Vec<_>, RedlineError>>()?;

    let catalog = FigureCatalog::build(&backend, &layouts);
    log::debug!("catalogued {} figures", catalog.len());

    let mut report = ExtractionReport {
        pages: layouts.len(),
        figures_catalogued: catalog.len(),
        ..Default::default()
    };
    let mut compositor = Compositor::new();
    let mut headings = HeadingContext::new();

    for (_, layout) in &layouts {
        let mut page = PageRun {
            layout,
            rasterizer,
            detector,
            catalog: &catalog,
            options,
            state: PageState::new(),
            composed: ComposedPage::new(layout.width, layout.height),
            report: &mut report,
        };
        for block in &layout.blocks {
            let decision = classify_block(block, options.flag_rule);
            page.process(&decision, &mut headings);
        }
        headings.end_page();

        log::debug!("page {}: {} regions", layout.number, page.composed.len());
        compositor.add_page(&page.composed)?;
        if let Some(path) = checkpoint {
            compositor.checkpoint(path)?;
        }
    }

    let composited = compositor.to_bytes()?;
    let flowing = flow::reflow(&composited, options.flow_dpi)?;

    log::info!(
        "extracted {} regions from {} flagged blocks over {} pages ({} skipped)",
        report.regions_emitted,
        report.flagged_blocks,
        report.pages,
        report.regions_skipped
    );

    Ok(Extraction {
        composited,
        flowing,
        report,
    })
}

/// Working state for one source page.
struct PageRun<'a> {
    layout: &'a PageLayout,
    rasterizer: &'a dyn Rasterizer,
    detector: &'a dyn TableDetector,
    catalog: &'a FigureCatalog,
    options: &'a ExtractOptions,
    state: PageState,
    composed: ComposedPage,
    report: &'a mut ExtractionReport,
}

impl PageRun<'_> {
    fn page_index(&self) -> u32 {
        self.layout.number.saturating_sub(1)
    }

    fn process(&mut self, decision: &BlockDecision, headings: &mut HeadingContext) {
        self.report.blocks += 1;
        if decision.flagged {
            self.report.flagged_blocks += 1;
        }
        log::debug!(
            "page {} block {}: flagged={} role={:?}",
            self.layout.number,
            decision.bbox,
            decision.flagged,
            decision.role
        );

        if self.options.catalogue_titles
            && decision.catalogue_title
            && self.emit(self.page_index(), decision.bbox, "catalogue title")
        {
            self.report.catalogue_titles += 1;
        }

        let (rasterizer, index, dpi) = (self.rasterizer, self.page_index(), self.options.dpi);
        let (width, height) = (self.layout.width, self.layout.height);
        let skipped = &mut self.report.regions_skipped;
        headings.transition(decision, |bbox| {
            match raster::render(rasterizer, index, bbox.clamp_to(width, height), dpi) {
                Ok(region) => Some(region),
                Err(e) => {
                    log::warn!("heading crop at {} failed: {}", bbox, e);
                    *skipped += 1;
                    None
                }
            }
        });

        if !decision.flagged {
            return;
        }

        for region in headings.flush() {
            self.push(region);
            self.report.headings_flushed += 1;
        }

        if decision.role == StructuralRole::FigureCaption {
            self.emit_caption(decision);
            return;
        }

        if decision.table_trigger && !self.state.table_attempted {
            self.post_tables();
        }

        if self.state.suppresses(decision) {
            log::debug!("block {} covered by a table raster", decision.bbox);
            return;
        }

        self.emit(self.page_index(), decision.render_rect, "flagged block");
    }

    fn emit_caption(&mut self, decision: &BlockDecision) {
        if !self.state.caption_shown {
            self.state.caption_shown = true;
            self.emit(self.page_index(), decision.bbox, "figure caption");
        }

        for &id in &decision.figure_refs {
            if self.state.figures_shown.contains(&id) {
                continue;
            }
            let Some(figure) = self.catalog.get(id) else {
                log::warn!(
                    "page {}: caption names figure {} which is not in the catalog",
                    self.layout.number,
                    id
                );
                continue;
            };
            let (index, bbox) = (figure.page.saturating_sub(1), figure.bbox);
            if self.emit(index, bbox, "figure") {
                self.state.figures_shown.insert(id);
                self.report.figures_emitted += 1;
            }
        }
    }

    fn post_tables(&mut self) {
        self.state.table_attempted = true;
        let tables = self.detector.detect_tables(self.layout);
        log::debug!(
            "page {}: table pass found {} tables",
            self.layout.number,
            tables.len()
        );

        self.state.table_posted = !tables.is_empty();
        for bbox in tables {
            if self.emit(self.page_index(), bbox, "table") {
                self.report.tables_posted += 1;
            }
        }
    }

    /// Rasterize `clip` from source page `index` onto the current output
    /// page. Failures skip the region only.
    /// Rasterize `clip` from page `index` into the composed page. Clips on
    /// the current page are cut to its box first.
    fn emit(&mut self, index: u32, clip: Rect, what: &str) -> bool {
        let clip = if index == self.page_index() {
            clip.clamp_to(self.layout.width, self.layout.height)
        } else {
            clip
        };
        match raster::render(self.rasterizer, index, clip, self.options.dpi) {
            Ok(region) => {
                self.push(region);
                true
            }
            Err(e) => {
                log::warn!(
                    "page {}: skipping {} at {}: {}",
                    self.layout.number,
                    what,
                    clip,
                    e
                );
                self.report.regions_skipped += 1;
                false
            }
        }
    }

    fn push(&mut self, region: Region) {
        self.composed.push(region);
        self.report.regions_emitted += 1;
    }
}
