use std::fmt;

use serde::{Deserialize, Serialize};

/// An axis-aligned rectangle in page space.
///
/// Coordinates are PDF points with the origin at the **top-left** corner of
/// the page (y grows downwards), matching how blocks are reported by the
/// layout pass.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

impl Rect {
    pub fn new(x0: f32, y0: f32, x1: f32, y1: f32) -> Self {
        Rect {
            x0: x0.min(x1),
            y0: y0.min(y1),
            x1: x0.max(x1),
            y1: y0.max(y1),
        }
    }

    pub fn width(&self) -> f32 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> f32 {
        self.y1 - self.y0
    }

    pub fn is_empty(&self) -> bool {
        self.width() <= 0.0 || self.height() <= 0.0
    }

    /// Smallest rectangle covering both `self` and `other`.
    pub fn union(&self, other: &Rect) -> Rect {
        Rect {
            x0: self.x0.min(other.x0),
            y0: self.y0.min(other.y0),
            x1: self.x1.max(other.x1),
            y1: self.y1.max(other.y1),
        }
    }

    /// Shrink the rectangle vertically around its midpoint, keeping `ratio`
    /// of each half-height. The horizontal extent is untouched.
    pub fn shrink_vertical(&self, ratio: f32) -> Rect {
        let mid = (self.y0 + self.y1) / 2.0;
        let half = (self.y1 - mid) * ratio;
        Rect {
            x0: self.x0,
            y0: mid - half,
            x1: self.x1,
            y1: mid + half,
        }
    }

    /// Clamp the rectangle to a page of the given size.
    pub fn clamp_to(&self, width: f32, height: f32) -> Rect {
        Rect {
            x0: self.x0.clamp(0.0, width),
            y0: self.y0.clamp(0.0, height),
            x1: self.x1.clamp(0.0, width),
            y1: self.y1.clamp(0.0, height),
        }
    }
}

impl fmt::Display for Rect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{:.1}, {:.1}, {:.1}, {:.1}]",
            self.x0, self.y0, self.x1, self.y1
        )
    }
}

/// An 8-bit RGB colour triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Rgb(pub u8, pub u8, pub u8);

impl Rgb {
    pub const BLACK: Rgb = Rgb(0, 0, 0);

    /// Build a colour from PDF colour components in the `0.0..=1.0` range.
    pub fn from_unit(r: f32, g: f32, b: f32) -> Self {
        let scale = |v: f32| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
        Rgb(scale(r), scale(g), scale(b))
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.0, self.1, self.2)
    }
}

/// Encodings an image can be handed out in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    Jpeg,
    Png,
    Jpeg2000,
    Gif,
    Tiff,
    Bmp,
    Unknown,
}

impl ImageFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "jpeg",
            ImageFormat::Png => "png",
            ImageFormat::Jpeg2000 => "jp2",
            ImageFormat::Gif => "gif",
            ImageFormat::Tiff => "tiff",
            ImageFormat::Bmp => "bmp",
            ImageFormat::Unknown => "bin",
        }
    }
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Counters collected while extracting one document.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractionReport {
    pub pages: usize,
    pub blocks: usize,
    pub flagged_blocks: usize,
    pub headings_flushed: usize,
    pub catalogue_titles: usize,
    pub tables_posted: usize,
    pub figures_catalogued: usize,
    pub figures_emitted: usize,
    pub regions_emitted: usize,
    pub regions_skipped: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rect_new_normalises_corners() {
        let r = Rect::new(10.0, 50.0, 5.0, 20.0);
        assert_eq!(r, Rect::new(5.0, 20.0, 10.0, 50.0));
        assert_eq!(r.x0, 5.0);
        assert_eq!(r.y1, 50.0);
    }

    #[test]
    fn rect_union_covers_both() {
        let a = Rect::new(0.0, 0.0, 10.0, 10.0);
        let b = Rect::new(5.0, -2.0, 20.0, 8.0);
        assert_eq!(a.union(&b), Rect::new(0.0, -2.0, 20.0, 10.0));
    }

    #[test]
    fn rect_shrink_vertical_keeps_midpoint() {
        let r = Rect::new(0.0, 100.0, 50.0, 120.0);
        let shrunk = r.shrink_vertical(0.36);
        assert!((shrunk.y0 - 106.4).abs() < 1e-3);
        assert!((shrunk.y1 - 113.6).abs() < 1e-3);
        assert_eq!(shrunk.x0, 0.0);
        assert_eq!(shrunk.x1, 50.0);
    }

    #[test]
    fn rect_clamp_to_page() {
        let r = Rect::new(-5.0, -5.0, 700.0, 900.0).clamp_to(612.0, 792.0);
        assert_eq!(r, Rect::new(0.0, 0.0, 612.0, 792.0));
    }

    #[test]
    fn rect_empty() {
        assert!(Rect::new(1.0, 1.0, 1.0, 5.0).is_empty());
        assert!(!Rect::new(1.0, 1.0, 2.0, 5.0).is_empty());
    }

    #[test]
    fn rgb_from_unit_rounds() {
        assert_eq!(Rgb::from_unit(0.855, 0.122, 0.2), Rgb(218, 31, 51));
        assert_eq!(Rgb::from_unit(0.0, 0.0, 0.0), Rgb::BLACK);
        assert_eq!(Rgb::from_unit(2.0, -1.0, 1.0), Rgb(255, 0, 255));
    }

    #[test]
    fn image_format_names() {
        assert_eq!(ImageFormat::Jpeg2000.to_string(), "jp2");
        assert_eq!(ImageFormat::Unknown.extension(), "bin");
        assert_eq!(serde_json::to_string(&ImageFormat::Png).unwrap(), "\"png\"");
    }
}
