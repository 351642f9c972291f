use thiserror::Error;

pub mod catalog;
pub mod classify;
pub mod compose;
pub mod context;
pub mod flow;
pub mod images;
pub mod parser;
pub mod pipeline;
pub mod raster;
pub mod signature;
pub mod types;

pub use catalog::{FigureCatalog, FigureRecord};
pub use pipeline::{extract_with, extract_with_checkpoint, ExtractOptions, Extraction};
pub use signature::FlagRule;
pub use types::*;

#[cfg(feature = "pdfium")]
pub use pipeline::extract;

/// Everything extraction can fail with. Only [`RedlineError::Parse`] and
/// [`RedlineError::Encrypted`] abort a document; the rest are usually
/// confined to one region and logged.
#[derive(Debug, Error)]
pub enum RedlineError {
    #[error("unreadable PDF: {0}")]
    Parse(String),
    #[error("encrypted PDFs are not supported")]
    Encrypted,
    #[error("no image XObject named {0}")]
    ImageNotFound(String),
    #[error("rasterizing failed: {0}")]
    Raster(String),
    #[error(transparent)]
    Image(#[from] image::ImageError),
    #[error("writing the composited PDF failed: {0}")]
    Compose(String),
    #[error("writing the DOCX failed: {0}")]
    Flow(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Build the figure catalog of a document without extracting anything.
pub fn figures(bytes: &[u8]) -> Result<FigureCatalog, RedlineError> {
    use parser::backend::PdfBackend;

    let backend = parser::backend::LopdfBackend::load_bytes(bytes)?;
    let layouts = backend
        .pages()
        .into_iter()
        .map(|(number, id)| Ok((id, parser::layout::extract_page(&backend, number, id)?)))
        .collect::<Result<Vec<_>, RedlineError>>()?;
    Ok(FigureCatalog::build(&backend, &layouts))
}

/// Rebuild the flowing document from an already composited PDF.
pub fn reflow(composited: &[u8], flow_dpi: f32) -> Result<Vec<u8>, RedlineError> {
    flow::reflow(composited, flow_dpi)
}
