//! The document seam: what the page pipeline needs from a PDF library.
//!
//! pdfium handles are not `Send`, so a [`Document`] is never moved between
//! threads. A [`DocumentSource`] (which is `Send + Sync`) is handed to the
//! page worker instead, and the worker opens the document on its own
//! thread. Dropping the returned box closes the document.

use crate::error::BatchOcrError;
use image::DynamicImage;
use std::path::Path;

/// An open PDF document.
pub trait Document {
    fn page_count(&self) -> usize;

    /// Initialise interactive form content once, before any page is read.
    fn init_forms(&mut self) -> Result<(), BatchOcrError>;

    /// Text of the page's embedded text layer (may be empty).
    fn page_text(&self, page_idx: usize) -> Result<String, BatchOcrError>;

    /// Page width and height in PDF points (1/72 inch).
    fn page_size(&self, page_idx: usize) -> Result<(f32, f32), BatchOcrError>;

    /// Merge form fields and annotations into the static page content.
    fn flatten_page(&mut self, page_idx: usize) -> Result<(), BatchOcrError>;

    /// Rasterise the page, `scale` pixels per point.
    fn render_page(&self, page_idx: usize, scale: f32) -> Result<DynamicImage, BatchOcrError>;
}

/// Opens documents by path.
pub trait DocumentSource: Send + Sync {
    fn open<'a>(&'a self, path: &Path) -> Result<Box<dyn Document + 'a>, BatchOcrError>;
}
