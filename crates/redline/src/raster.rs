//! Rasterization of page regions.
//!
//! The pipeline never talks to a renderer directly; it goes through the
//! [`Rasterizer`] trait so tests can substitute a fake and so the native
//! pdfium library stays optional.

use image::RgbImage;

use crate::types::Rect;
use crate::RedlineError;

/// PDF user space is 72 units per inch.
pub const POINTS_PER_INCH: f32 = 72.0;

/// A rasterized piece of a source page, ready to be placed onto the
/// composited page at `bbox`.
#[derive(Debug, Clone)]
pub struct Region {
    pub bbox: Rect,
    pub image: RgbImage,
}

/// Renders a rectangular clip of a source page.
///
/// `page_index` is 0-based; `clip` is in top-left-origin page points.
pub trait Rasterizer {
    fn render_region(&self, page_index: u32, clip: Rect, dpi: f32)
        -> Result<RgbImage, RedlineError>;
}

/// Pixel dimensions of `clip` rendered at `dpi`, never less than 1x1.
pub fn pixel_size(clip: &Rect, dpi: f32) -> (u32, u32) {
    let scale = dpi / POINTS_PER_INCH;
    let w = (clip.width() * scale).round().max(1.0) as u32;
    let h = (clip.height() * scale).round().max(1.0) as u32;
    (w, h)
}

/// Render `clip` and pair it with its box, rejecting degenerate clips.
pub fn render(
    rasterizer: &dyn Rasterizer,
    page_index: u32,
    clip: Rect,
    dpi: f32,
) -> Result<Region, RedlineError> {
    if clip.is_empty() {
        return Err(RedlineError::Raster(format!(
            "empty clip {} on page {}",
            clip,
            page_index + 1
        )));
    }
    let image = rasterizer.render_region(page_index, clip, dpi)?;
    Ok(Region { bbox: clip, image })
}

#[cfg(feature = "pdfium")]
pub use self::pdfium::PdfiumRasterizer;

#[cfg(feature = "pdfium")]
mod pdfium {
    use std::cell::RefCell;
    use std::sync::{Mutex, OnceLock, PoisonError};

    use image::RgbImage;
    use pdfium_render::prelude::*;

    use super::{Rasterizer, POINTS_PER_INCH};
    use crate::types::Rect;
    use crate::RedlineError;

    /// The process-wide pdfium binding. Dropping a `Pdfium` tears the
    /// library down for every other holder, so it is bound once and never
    /// dropped, and calls into it are serialised.
    static PDFIUM: OnceLock<Result<Mutex<Pdfium>, String>> = OnceLock::new();

    /// The value in `cell`, running `init` on first use only. A failed
    /// `init` is remembered and reported to every caller.
    fn once<T>(
        cell: &OnceLock<Result<T, String>>,
        init: impl FnOnce() -> Result<T, String>,
    ) -> Result<&T, RedlineError> {
        cell.get_or_init(init)
            .as_ref()
            .map_err(|e| RedlineError::Raster(e.clone()))
    }

    /// Bind to pdfium next to the executable, falling back to the system
    /// library.
    fn bind() -> Result<Mutex<Pdfium>, String> {
        let bindings = Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
            .or_else(|_| Pdfium::bind_to_system_library())
            .map_err(|e| format!("failed to bind pdfium library: {}", e))?;
        log::debug!("bound pdfium library");
        Ok(Mutex::new(Pdfium::new(bindings)))
    }

    struct RenderedPage {
        index: u32,
        dpi: f32,
        image: RgbImage,
    }

    /// [`Rasterizer`] backed by the pdfium library.
    ///
    /// Whole pages are rendered once per `(page, dpi)` and clips are cut from
    /// the cached bitmap. Only the most recent page is kept; the pipeline
    /// walks pages in order so earlier ones are never needed again.
    ///
    /// Every rasterizer in the process shares one pdfium binding. Rasterizers
    /// may live on different threads, but only one of them renders at a
    /// time.
    pub struct PdfiumRasterizer {
        pdfium: &'static Mutex<Pdfium>,
        bytes: Vec<u8>,
        last: RefCell<Option<RenderedPage>>,
    }

    impl PdfiumRasterizer {
        pub fn new(bytes: &[u8]) -> Result<Self, RedlineError> {
            Ok(Self {
                pdfium: once(&PDFIUM, bind)?,
                bytes: bytes.to_vec(),
                last: RefCell::new(None),
            })
        }

        fn render_page(&self, page_index: u32, dpi: f32) -> Result<RgbImage, RedlineError> {
            // Poisoned only by an earlier render panicking; pdfium holds no
            // state across documents.
            let pdfium = self.pdfium.lock().unwrap_or_else(PoisonError::into_inner);
            let document = pdfium
                .load_pdf_from_byte_slice(&self.bytes, None)
                .map_err(|e| RedlineError::Raster(format!("failed to load document: {}", e)))?;

            let index = u16::try_from(page_index).map_err(|_| {
                RedlineError::Raster(format!("page index {} out of range", page_index))
            })?;
            let page = document.pages().get(index).map_err(|e| {
                RedlineError::Raster(format!("failed to open page {}: {}", page_index + 1, e))
            })?;

            let scale = dpi / POINTS_PER_INCH;
            let pixel_width = (page.width().value * scale).round() as i32;
            let pixel_height = (page.height().value * scale).round() as i32;

            let bitmap = page
                .render_with_config(
                    &PdfRenderConfig::new()
                        .set_target_width(pixel_width)
                        .set_target_height(pixel_height)
                        .render_form_data(true)
                        .render_annotations(true),
                )
                .map_err(|e| {
                    RedlineError::Raster(format!(
                        "failed to render page {}: {}",
                        page_index + 1,
                        e
                    ))
                })?;

            Ok(bitmap.as_image().to_rgb8())
        }
    }

    impl Rasterizer for PdfiumRasterizer {
        fn render_region(
            &self,
            page_index: u32,
            clip: Rect,
            dpi: f32,
        ) -> Result<RgbImage, RedlineError> {
            let mut last = self.last.borrow_mut();
            let cached = matches!(&*last, Some(p) if p.index == page_index && p.dpi == dpi);
            if !cached {
                log::debug!("rendering page {} at {} dpi", page_index + 1, dpi);
                let image = self.render_page(page_index, dpi)?;
                *last = Some(RenderedPage {
                    index: page_index,
                    dpi,
                    image,
                });
            }

            let page = last
                .as_ref()
                .ok_or_else(|| RedlineError::Raster("page cache is empty".to_string()))?;
            super::crop(&page.image, clip, dpi)
        }
    }

}

/// Cut `clip` (in points) out of a full-page bitmap rendered at `dpi`.
pub fn crop(page: &RgbImage, clip: Rect, dpi: f32) -> Result<RgbImage, RedlineError> {
    let scale = dpi / POINTS_PER_INCH;
    let (pw, ph) = page.dimensions();

    let x0 = ((clip.x0 * scale).floor().max(0.0) as u32).min(pw);
    let y0 = ((clip.y0 * scale).floor().max(0.0) as u32).min(ph);
    let x1 = ((clip.x1 * scale).ceil().max(0.0) as u32).min(pw);
    let y1 = ((clip.y1 * scale).ceil().max(0.0) as u32).min(ph);

    if x1 <= x0 || y1 <= y0 {
        return Err(RedlineError::Raster(format!(
            "clip {} lies outside the rendered page",
            clip
        )));
    }

    Ok(image::imageops::crop_imm(page, x0, y0, x1 - x0, y1 - y0).to_image())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    struct Solid;

    impl Rasterizer for Solid {
        fn render_region(
            &self,
            _page_index: u32,
            clip: Rect,
            dpi: f32,
        ) -> Result<RgbImage, RedlineError> {
            let (w, h) = pixel_size(&clip, dpi);
            Ok(RgbImage::from_pixel(w, h, Rgb([200, 30, 50])))
        }
    }

    #[test]
    fn pixel_size_scales_with_dpi() {
        let clip = Rect::new(0.0, 0.0, 72.0, 36.0);
        assert_eq!(pixel_size(&clip, 72.0), (72, 36));
        assert_eq!(pixel_size(&clip, 144.0), (144, 72));
        assert_eq!(pixel_size(&Rect::new(0.0, 0.0, 0.1, 0.1), 72.0), (1, 1));
    }

    #[test]
    fn render_rejects_empty_clip() {
        let err = render(&Solid, 0, Rect::new(5.0, 5.0, 5.0, 10.0), 72.0);
        assert!(matches!(err, Err(RedlineError::Raster(_))));
    }

    #[test]
    fn render_keeps_clip_as_bbox() {
        let clip = Rect::new(10.0, 20.0, 82.0, 56.0);
        let region = render(&Solid, 0, clip, 144.0).unwrap();
        assert_eq!(region.bbox, clip);
        assert_eq!(region.image.dimensions(), (144, 72));
    }

    #[test]
    fn crop_cuts_scaled_window() {
        let mut page = RgbImage::new(200, 200);
        page.put_pixel(100, 100, Rgb([255, 0, 0]));
        let out = crop(&page, Rect::new(50.0, 50.0, 60.0, 60.0), 144.0).unwrap();
        assert_eq!(out.dimensions(), (20, 20));
        assert_eq!(out.get_pixel(0, 0), &Rgb([255, 0, 0]));
    }

    #[test]
    fn crop_clamps_to_page() {
        let page = RgbImage::new(100, 100);
        let out = crop(&page, Rect::new(-10.0, -10.0, 500.0, 20.0), 72.0).unwrap();
        assert_eq!(out.dimensions(), (100, 20));
        assert!(crop(&page, Rect::new(200.0, 200.0, 300.0, 300.0), 72.0).is_err());
    }
}
