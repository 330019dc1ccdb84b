//! Page pipeline stages.
//!
//! ## Data Flow
//!
//! ```text
//! document ──▶ extract ──▶ prefetch ──▶ driver ──▶ engine chain
//! (pdfium)     (text or    (1-slot      (page      (tesseract, then
//!               cropped     worker       order)     vision fallback)
//!               raster)     thread)
//! ```
//!
//! 1. [`document`] / [`render`]: the PDF seam and its pdfium implementation
//! 2. [`extract`]: text layer when it is good enough, otherwise render,
//!    flatten and auto-crop
//! 3. [`prefetch`]: extraction runs one page ahead on a blocking thread
//!    because pdfium handles cannot cross threads
//! 4. [`driver`]: collects pages in order and runs the engine chain
//! 5. [`engine`], [`tesseract`], [`llm`], [`encode`]: OCR engines and the
//!    quality gate that picks between them

pub mod document;
pub mod driver;
pub mod encode;
pub mod engine;
pub mod extract;
pub mod llm;
pub mod prefetch;
pub mod render;
pub mod tesseract;
