//! pdfium-backed [`DocumentSource`].
//!
//! ## Why one document per worker thread?
//!
//! The `pdfium-render` crate wraps the pdfium C++ library, which keeps
//! thread-local state and hands out document and page handles that are not
//! `Send`. Only the bound [`Pdfium`] instance crosses threads: the `sync`
//! feature marks it `Send + Sync`, and `thread_safe` serialises every call
//! into the library behind a global lock. The instance is shared behind an
//! `Arc`, and each document is opened, read and closed on the single page
//! worker thread that owns it.

use crate::error::BatchOcrError;
use crate::pipeline::document::{Document, DocumentSource};
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Opens PDFs through a bound pdfium library.
pub struct PdfiumSource {
    pdfium: Pdfium,
    password: Option<String>,
}

impl PdfiumSource {
    /// Bind to libpdfium at `library`, or to the system library when `None`.
    pub fn bind(library: Option<&Path>, password: Option<String>) -> Result<Self, BatchOcrError> {
        let bindings = match library {
            Some(path) => Pdfium::bind_to_library(path),
            None => Pdfium::bind_to_system_library(),
        }
        .map_err(|e| BatchOcrError::PdfiumBindingFailed(format!("{:?}", e)))?;

        Ok(Self {
            pdfium: Pdfium::new(bindings),
            password,
        })
    }
}

impl DocumentSource for PdfiumSource {
    fn open<'a>(&'a self, path: &Path) -> Result<Box<dyn Document + 'a>, BatchOcrError> {
        if !path.exists() {
            return Err(BatchOcrError::FileNotFound {
                path: path.to_path_buf(),
            });
        }

        let password = self.password.as_deref();
        let document = self
            .pdfium
            .load_pdf_from_file(path, password)
            .map_err(|e| {
                let err_str = format!("{:?}", e);
                if err_str.contains("Password") || err_str.contains("password") {
                    if password.is_some() {
                        BatchOcrError::WrongPassword {
                            path: path.to_path_buf(),
                        }
                    } else {
                        BatchOcrError::PasswordRequired {
                            path: path.to_path_buf(),
                        }
                    }
                } else {
                    BatchOcrError::CorruptPdf {
                        path: path.to_path_buf(),
                        detail: err_str,
                    }
                }
            })?;

        let page_count = document.pages().len() as usize;
        debug!("PDF loaded: {} ({} pages)", path.display(), page_count);

        Ok(Box::new(PdfiumDocument {
            document,
            path: path.to_path_buf(),
            page_count,
        }))
    }
}

struct PdfiumDocument<'a> {
    document: PdfDocument<'a>,
    path: PathBuf,
    page_count: usize,
}

impl PdfiumDocument<'_> {
    fn page_index(&self, page_idx: usize) -> Result<u16, BatchOcrError> {
        if page_idx >= self.page_count {
            return Err(BatchOcrError::PageOutOfRange {
                page: page_idx + 1,
                total: self.page_count,
            });
        }
        Ok(page_idx as u16)
    }
}

fn render_err(page_idx: usize, e: PdfiumError) -> BatchOcrError {
    BatchOcrError::RasterisationFailed {
        page: page_idx + 1,
        detail: format!("{:?}", e),
    }
}

impl Document for PdfiumDocument<'_> {
    fn page_count(&self) -> usize {
        self.page_count
    }

    fn init_forms(&mut self) -> Result<(), BatchOcrError> {
        // pdfium-render sets up the form-fill environment when the document
        // is loaded; all that is left is to note whether there is anything
        // to flatten later.
        if self.document.form().is_some() {
            debug!("{}: interactive form present", self.path.display());
        }
        Ok(())
    }

    fn page_text(&self, page_idx: usize) -> Result<String, BatchOcrError> {
        let index = self.page_index(page_idx)?;
        let text_err = |e: PdfiumError| BatchOcrError::TextExtractionFailed {
            page: page_idx + 1,
            detail: format!("{:?}", e),
        };

        let page = self.document.pages().get(index).map_err(text_err)?;
        let text = page.text().map_err(text_err)?;
        Ok(text.all())
    }

    fn page_size(&self, page_idx: usize) -> Result<(f32, f32), BatchOcrError> {
        let index = self.page_index(page_idx)?;
        let page = self
            .document
            .pages()
            .get(index)
            .map_err(|e| render_err(page_idx, e))?;
        Ok((page.width().value, page.height().value))
    }

    fn flatten_page(&mut self, page_idx: usize) -> Result<(), BatchOcrError> {
        let index = self.page_index(page_idx)?;
        let mut page = self
            .document
            .pages()
            .get(index)
            .map_err(|e| render_err(page_idx, e))?;
        page.flatten().map_err(|e| render_err(page_idx, e))
    }

    fn render_page(&self, page_idx: usize, scale: f32) -> Result<DynamicImage, BatchOcrError> {
        let index = self.page_index(page_idx)?;
        // Re-fetch after flattening: the flattened content only shows up on
        // a freshly loaded page handle.
        let page = self
            .document
            .pages()
            .get(index)
            .map_err(|e| render_err(page_idx, e))?;

        let render_config = PdfRenderConfig::new()
            .scale_page_by_factor(scale)
            .render_form_data(true);

        let bitmap = page
            .render_with_config(&render_config)
            .map_err(|e| render_err(page_idx, e))?;

        let image = bitmap.as_image();
        debug!(
            "Rendered page {} → {}x{} px (scale {:.2})",
            page_idx + 1,
            image.width(),
            image.height(),
            scale
        );
        Ok(image)
    }
}
