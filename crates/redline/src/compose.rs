//! The composited document: one output page per source page, carrying only
//! the rasters the pipeline decided to emit, each at its source position.

use std::io::Write;
use std::path::Path;

use flate2::write::ZlibEncoder;
use flate2::Compression;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream};

use crate::raster::Region;
use crate::RedlineError;

/// The rasters collected for one source page, in emission order.
#[derive(Debug, Clone, Default)]
pub struct ComposedPage {
    pub width: f32,
    pub height: f32,
    pub regions: Vec<Region>,
}

impl ComposedPage {
    pub fn new(width: f32, height: f32) -> Self {
        Self {
            width,
            height,
            regions: Vec::new(),
        }
    }

    pub fn push(&mut self, region: Region) {
        self.regions.push(region);
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }
}

/// Builds the composited PDF page by page.
pub struct Compositor {
    doc: Document,
    pages_id: ObjectId,
    kids: Vec<Object>,
}

impl Default for Compositor {
    fn default() -> Self {
        Self::new()
    }
}

impl Compositor {
    pub fn new() -> Self {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut compositor = Self {
            doc,
            pages_id,
            kids: Vec::new(),
        };
        compositor.update_page_tree();
        compositor
    }

    pub fn page_count(&self) -> usize {
        self.kids.len()
    }

    /// Append one output page sized like its source page. Regions are drawn
    /// in order, so later ones paint over earlier ones where they overlap.
    pub fn add_page(&mut self, page: &ComposedPage) -> Result<(), RedlineError> {
        let mut xobjects = Dictionary::new();
        let mut operations = Vec::with_capacity(page.regions.len() * 4);

        for (i, region) in page.regions.iter().enumerate() {
            let name = format!("Im{}", i);
            let image_id = self.doc.add_object(image_stream(region)?);
            xobjects.set(name.as_bytes().to_vec(), image_id);

            let bbox = &region.bbox;
            operations.push(Operation::new("q", vec![]));
            operations.push(Operation::new(
                "cm",
                vec![
                    Object::Real(bbox.width()),
                    0.into(),
                    0.into(),
                    Object::Real(bbox.height()),
                    Object::Real(bbox.x0),
                    Object::Real(page.height - bbox.y1),
                ],
            ));
            operations.push(Operation::new("Do", vec![Object::Name(name.into_bytes())]));
            operations.push(Operation::new("Q", vec![]));
        }

        let content = Content { operations }
            .encode()
            .map_err(|e| RedlineError::Compose(format!("content stream encode error: {}", e)))?;
        let content_id = self.doc.add_object(Stream::new(Dictionary::new(), content));

        let page_id = self.doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => self.pages_id,
            "MediaBox" => vec![
                0.into(),
                0.into(),
                Object::Real(page.width),
                Object::Real(page.height),
            ],
            "Resources" => dictionary! {
                "XObject" => xobjects,
            },
            "Contents" => content_id,
        });

        self.kids.push(page_id.into());
        self.update_page_tree();
        Ok(())
    }

    /// Serialise the document as it stands.
    pub fn to_bytes(&mut self) -> Result<Vec<u8>, RedlineError> {
        let mut buf = Vec::new();
        self.doc
            .save_to(&mut buf)
            .map_err(|e| RedlineError::Compose(format!("cannot write document: {}", e)))?;
        Ok(buf)
    }

    /// Write the document to `path`, replacing any previous checkpoint only
    /// once the new one is fully written.
    pub fn checkpoint(&mut self, path: &Path) -> Result<(), RedlineError> {
        let bytes = self.to_bytes()?;
        let tmp = path.with_extension("partial");
        std::fs::write(&tmp, bytes)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }

    fn update_page_tree(&mut self) {
        self.doc.objects.insert(
            self.pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => self.kids.clone(),
                "Count" => self.kids.len() as i64,
            }),
        );
    }
}

/// Wrap an RGB raster as a FlateDecode image XObject.
fn image_stream(region: &Region) -> Result<Stream, RedlineError> {
    let (width, height) = region.image.dimensions();

    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(region.image.as_raw())?;
    let data = encoder.finish()?;

    let mut stream = Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => width as i64,
            "Height" => height as i64,
            "ColorSpace" => "DeviceRGB",
            "BitsPerComponent" => 8,
            "Filter" => "FlateDecode",
        },
        data,
    );
    stream.allows_compression = false;
    Ok(stream)
}
