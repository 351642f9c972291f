//! Flowing document export.
//!
//! Reads a composited PDF back, collects its rasters in page order with
//! their positions, and appends them one paragraph each to a DOCX file.
//! Sizes and indents are the point values divided by the flow DPI.

use std::io::Cursor;

use docx_rs::{Docx, Paragraph, Pic, Run};

use crate::images::read_image;
use crate::parser::backend::{LopdfBackend, PdfBackend};
use crate::parser::content::read_page;
use crate::types::{ImageFormat, Rect};
use crate::RedlineError;

/// Points-to-inches divisor used for the flowing document.
pub const DEFAULT_FLOW_DPI: f32 = 86.0;

const EMU_PER_INCH: f32 = 914_400.0;
const TWIPS_PER_INCH: f32 = 1_440.0;

/// A raster found in the composited document.
#[derive(Debug, Clone)]
pub struct PlacedImage {
    pub page: u32,
    pub format: ImageFormat,
    pub bytes: Vec<u8>,
    /// Position on the composited page, top-left origin.
    pub bbox: Rect,
}

/// Collect every raster of a composited PDF in page order, then paint
/// order within a page.
pub fn extract_placed_images(pdf: &[u8]) -> Result<Vec<PlacedImage>, RedlineError> {
    let backend = LopdfBackend::load_bytes(pdf)?;
    let mut placed = Vec::new();

    for (number, page_id) in backend.pages() {
        let (_, height) = backend.page_size(page_id)?;
        let content = read_page(&backend, page_id, height)?;

        for placement in content.images {
            match read_image(&backend, page_id, placement.form, &placement.name) {
                Ok(image) => placed.push(PlacedImage {
                    page: number,
                    format: image.format,
                    bytes: image.bytes,
                    bbox: placement.bbox,
                }),
                Err(e) => log::warn!("skipping image on page {}: {}", number, e),
            }
        }
    }

    Ok(placed)
}

/// Build the flowing document straight from composited PDF bytes.
pub fn reflow(pdf: &[u8], flow_dpi: f32) -> Result<Vec<u8>, RedlineError> {
    let images = extract_placed_images(pdf)?;
    write_docx(&images, flow_dpi)
}

/// Formats a word processor embeds without conversion.
fn embeddable(format: ImageFormat) -> bool {
    matches!(
        format,
        ImageFormat::Png
            | ImageFormat::Jpeg
            | ImageFormat::Gif
            | ImageFormat::Bmp
            | ImageFormat::Tiff
    )
}

fn emu(points: f32, flow_dpi: f32) -> u32 {
    (points / flow_dpi * EMU_PER_INCH).round().max(0.0) as u32
}

fn twips(points: f32, flow_dpi: f32) -> i32 {
    (points / flow_dpi * TWIPS_PER_INCH).round().max(0.0) as i32
}

/// Write `images` into a DOCX package, one paragraph per image, in order.
/// Each paragraph is indented by the image's left edge.
///
/// Images a word processor cannot embed, or that do not decode, are
/// skipped with a warning.
pub fn write_docx(images: &[PlacedImage], flow_dpi: f32) -> Result<Vec<u8>, RedlineError> {
    if flow_dpi <= 0.0 {
        return Err(RedlineError::Flow(format!(
            "flow dpi must be positive, got {}",
            flow_dpi
        )));
    }

    let mut docx = Docx::new();
    let mut embedded = 0;
    for placed in images {
        if !embeddable(placed.format) {
            log::warn!(
                "skipping {} image from page {}: not embeddable",
                placed.format,
                placed.page
            );
            continue;
        }
        if let Err(e) = image::load_from_memory(&placed.bytes) {
            log::warn!(
                "skipping {} image from page {}: {}",
                placed.format,
                placed.page,
                e
            );
            continue;
        }

        let pic = Pic::new(&placed.bytes).size(
            emu(placed.bbox.width(), flow_dpi),
            emu(placed.bbox.height(), flow_dpi),
        );
        docx = docx.add_paragraph(
            Paragraph::new()
                .add_run(Run::new().add_image(pic))
                .indent(Some(twips(placed.bbox.x0, flow_dpi)), None, None, None),
        );
        embedded += 1;
    }
    log::debug!("flowing document: {} of {} image(s)", embedded, images.len());

    let mut out = Cursor::new(Vec::new());
    docx.build()
        .pack(&mut out)
        .map_err(|e| RedlineError::Flow(format!("cannot write docx package: {}", e)))?;
    Ok(out.into_inner())
}
