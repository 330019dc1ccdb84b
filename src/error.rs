//! Error type for the edgequake-batch-ocr library.
//!
//! A single enum, [`BatchOcrError`], covers every failure the pipeline can
//! surface. What makes an error fatal is *where* it is caught, not its
//! variant:
//!
//! * Loading the classification artifact or creating the output directory
//!   fails before the batch starts; the error is returned to the caller
//!   and nothing is processed.
//!
//! * Everything raised while processing one document (corrupt PDF, render
//!   glitch, OCR engine failure, write error) is returned from
//!   [`crate::convert::FileProcessor::process`] and caught by
//!   [`crate::batch::BatchRunner`], which counts it, logs it, and moves on
//!   to the next file.

use std::path::PathBuf;
use thiserror::Error;

/// All errors returned by the edgequake-batch-ocr library.
#[derive(Debug, Error)]
pub enum BatchOcrError {
    // ── Batch list errors ─────────────────────────────────────────────────
    /// The classification artifact could not be read.
    #[error("Failed to read classification file '{path}': {source}")]
    ClassificationRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The classification artifact is not valid JSON of the expected shape.
    #[error("Classification file '{path}' is malformed: {detail}")]
    ClassificationParse { path: PathBuf, detail: String },

    /// A configured category is absent from the classification artifact.
    #[error("Classification file '{path}' has no '{category}' category")]
    MissingCategory { path: PathBuf, category: String },

    // ── PDF errors ────────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'")]
    FileNotFound { path: PathBuf },

    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("PDF '{path}' is corrupt: {detail}")]
    CorruptPdf { path: PathBuf, detail: String },

    /// PDF requires a password but none was provided.
    #[error("PDF '{path}' is encrypted and requires a password.\nProvide it with --password <PASSWORD>.")]
    PasswordRequired { path: PathBuf },

    /// A password was provided but it is wrong.
    #[error("Wrong password for PDF '{path}'")]
    WrongPassword { path: PathBuf },

    /// A page index beyond the document's page count was requested.
    #[error("Page {page} is out of range (document has {total} pages)")]
    PageOutOfRange { page: usize, total: usize },

    /// pdfium returned an error while flattening or rendering a page.
    #[error("Rasterisation failed for page {page}: {detail}")]
    RasterisationFailed { page: usize, detail: String },

    /// pdfium returned an error while reading a page's text layer.
    #[error("Text extraction failed for page {page}: {detail}")]
    TextExtractionFailed { page: usize, detail: String },

    // ── Engine errors ─────────────────────────────────────────────────────
    /// The fast OCR engine could not be run or exited with an error.
    #[error("Fast OCR engine failed: {detail}")]
    FastOcrFailed { detail: String },

    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// The LLM API returned an error.
    #[error("LLM API error: {message}")]
    LlmApiError { message: String },

    /// Every stage of the engine chain rejected its own output.
    #[error("No OCR engine produced acceptable output (tried: {engines})")]
    NoEngineAccepted { engines: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create, write or rename an output Markdown file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Pdfium binding errors ─────────────────────────────────────────────
    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
Install libpdfium system-wide, or point --pdfium-lib (BATCH_OCR_PDFIUM_LIB)\n\
at an existing copy downloaded from https://github.com/bblanchon/pdfium-binaries.\n"
    )]
    PdfiumBindingFailed(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error (worker task panicked or vanished).
    #[error("Internal error: {0}")]
    Internal(String),
}
