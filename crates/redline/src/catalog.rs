//! Figure catalog.
//!
//! Every page of a rule book paints a full-page frame image last. Whatever
//! images come before it on the same page are real figures; they are
//! numbered from 1 in document order so captions can refer to them.

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::images::read_image;
use crate::parser::backend::{LopdfBackend, PageId};
use crate::parser::layout::PageLayout;
use crate::types::{ImageFormat, Rect};
use crate::RedlineError;

/// Resolution assumed for figures that do not declare one.
pub const DEFAULT_FIGURE_DPI: (f32, f32) = (96.012, 96.012);

/// One catalogued figure.
///
/// The composited PDF never embeds `bytes`. A pulled-in figure is
/// rasterized again from `page` and `bbox` like every other region, markup
/// painted over it included. The bytes are only written out by
/// [`FigureCatalog::export`].
#[derive(Debug, Clone, Serialize)]
pub struct FigureRecord {
    pub id: u32,
    /// 1-based source page.
    pub page: u32,
    pub format: ImageFormat,
    /// Encoded image as stored in the source document.
    #[serde(skip)]
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub dpi: (f32, f32),
    pub bbox: Rect,
}

impl FigureRecord {
    /// `figure-007-p3.png` for figure 7 on page 3.
    pub fn file_name(&self) -> String {
        format!(
            "figure-{:03}-p{}.{}",
            self.id,
            self.page,
            self.format.extension()
        )
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct FigureCatalog {
    figures: Vec<FigureRecord>,
}

impl FigureCatalog {
    /// Build the catalog from already extracted page layouts.
    ///
    /// A figure whose image stream cannot be read still consumes its number
    /// so later captions keep pointing at the right figure.
    pub fn build(backend: &LopdfBackend, pages: &[(PageId, PageLayout)]) -> Self {
        let mut figures = Vec::new();
        let mut next_id = 1u32;

        for (page_id, layout) in pages {
            let Some((_frame, candidates)) = layout.images.split_last() else {
                continue;
            };

            for placement in candidates {
                let id = next_id;
                next_id += 1;

                let image = match read_image(backend, *page_id, placement.form, &placement.name) {
                    Ok(image) => image,
                    Err(e) => {
                        log::warn!(
                            "figure {} on page {} could not be read: {}",
                            id,
                            layout.number,
                            e
                        );
                        continue;
                    }
                };

                let dpi = image.declared_dpi().unwrap_or(DEFAULT_FIGURE_DPI);

                log::debug!(
                    "figure {} on page {}: {}x{} {} at {}",
                    id,
                    layout.number,
                    image.width,
                    image.height,
                    image.format,
                    placement.bbox
                );

                figures.push(FigureRecord {
                    id,
                    page: layout.number,
                    format: image.format,
                    bytes: image.bytes,
                    width: image.width,
                    height: image.height,
                    dpi,
                    bbox: placement.bbox,
                });
            }
        }

        Self { figures }
    }

    /// Write every figure's stored bytes into `dir`, one file per figure,
    /// and return the paths in catalog order. `dir` is created if missing.
    pub fn export(&self, dir: &Path) -> Result<Vec<PathBuf>, RedlineError> {
        std::fs::create_dir_all(dir)?;
        self.figures
            .iter()
            .map(|figure| {
                let path = dir.join(figure.file_name());
                std::fs::write(&path, &figure.bytes)?;
                log::debug!("figure {} written to {}", figure.id, path.display());
                Ok(path)
            })
            .collect()
    }

    pub fn get(&self, id: u32) -> Option<&FigureRecord> {
        self.figures.iter().find(|f| f.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &FigureRecord> {
        self.figures.iter()
    }

    pub fn len(&self) -> usize {
        self.figures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.figures.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::backend::PdfBackend;
    use crate::parser::layout::extract_page;
    use lopdf::{dictionary, Document, Object, Stream};

    /// One page per entry; each entry is the number of 2x2 RGB images drawn
    /// on that page, stacked vertically.
    fn doc_with_images(per_page: &[usize]) -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let mut kids = Vec::new();

        for &count in per_page {
            let mut xobjects = lopdf::Dictionary::new();
            let mut content = String::new();
            for i in 0..count {
                let image = Stream::new(
                    dictionary! {
                        "Type" => "XObject",
                        "Subtype" => "Image",
                        "Width" => 2,
                        "Height" => 2,
                        "ColorSpace" => "DeviceRGB",
                        "BitsPerComponent" => 8,
                    },
                    vec![255u8; 12],
                );
                let id = doc.add_object(image);
                xobjects.set(format!("Im{}", i), id);
                content.push_str(&format!(
                    "q 100 0 0 50 72 {} cm /Im{} Do Q\n",
                    600 - 100 * i as i64,
                    i
                ));
            }
            let content_id =
                doc.add_object(Stream::new(lopdf::Dictionary::new(), content.into_bytes()));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
                "Resources" => dictionary! { "XObject" => xobjects },
                "Contents" => content_id,
            });
            kids.push(Object::from(page_id));
        }

        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids.clone(),
                "Count" => kids.len() as i64,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut buf = Vec::new();
        doc.save_to(&mut buf).unwrap();
        buf
    }

    fn catalog_for(bytes: &[u8]) -> FigureCatalog {
        let backend = LopdfBackend::load_bytes(bytes).unwrap();
        let layouts: Vec<_> = backend
            .pages()
            .into_iter()
            .map(|(n, id)| (id, extract_page(&backend, n, id).unwrap()))
            .collect();
        FigureCatalog::build(&backend, &layouts)
    }

    #[test]
    fn frame_only_pages_have_no_figures() {
        let catalog = catalog_for(&doc_with_images(&[0, 1, 1]));
        assert!(catalog.is_empty());
    }

    #[test]
    fn last_image_on_a_page_is_the_frame() {
        let catalog = catalog_for(&doc_with_images(&[1, 3, 2]));
        assert_eq!(catalog.len(), 3);

        let ids: Vec<_> = catalog.iter().map(|f| (f.id, f.page)).collect();
        assert_eq!(ids, vec![(1, 2), (2, 2), (3, 3)]);
        assert_eq!(catalog.iter().filter(|f| f.page == 2).count(), 2);
    }

    #[test]
    fn records_carry_box_size_and_default_dpi() {
        let catalog = catalog_for(&doc_with_images(&[2]));
        let fig = catalog.get(1).unwrap();
        assert_eq!((fig.width, fig.height), (2, 2));
        assert_eq!(fig.format, ImageFormat::Png);
        assert_eq!(fig.dpi, DEFAULT_FIGURE_DPI);
        assert!((fig.bbox.x0 - 72.0).abs() < 0.01);
        assert!((fig.bbox.y0 - 142.0).abs() < 0.01);
        assert!((fig.bbox.x1 - 172.0).abs() < 0.01);
        assert!((fig.bbox.y1 - 192.0).abs() < 0.01);
        assert!(catalog.get(2).is_none());
    }

    #[test]
    fn export_writes_the_stored_bytes() {
        let catalog = catalog_for(&doc_with_images(&[1, 3]));
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("figures");

        let written = catalog.export(&out).unwrap();
        let names: Vec<_> = written
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, ["figure-001-p2.png", "figure-002-p2.png"]);

        let first = std::fs::read(&written[0]).unwrap();
        assert_eq!(first, catalog.get(1).unwrap().bytes);
        assert_eq!(image::load_from_memory(&first).unwrap().width(), 2);
    }
}
