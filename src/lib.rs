//! # edgequake-batch-ocr
//!
//! Resumable batch OCR of PDF collections to Markdown, one `.md` per PDF.
//!
//! ## Why three tiers?
//!
//! Most pages in a mixed archive do not need a vision model. Born-digital
//! pages carry a text layer that costs nothing to read; clean scans are
//! handled by tesseract in about a second; only degraded scans justify a
//! Vision Language Model call. Each page takes the cheapest route that
//! produces trustworthy text, and a diacritic-density quality gate decides
//! when tesseract's output cannot be trusted.
//!
//! ## Pipeline Overview
//!
//! ```text
//! classification.json
//!  │
//!  ├─ 1. Batch list   union of configured categories, resume by output existence
//!  ├─ 2. Open         pdfium on a dedicated worker thread, forms initialised once
//!  ├─ 3. Extract      text layer ≥ 50 letters? done : render ≥ 768 px, flatten, crop
//!  ├─ 4. Prefetch     page n+1 extracts while page n is OCR'd
//!  ├─ 5. OCR          tesseract → quality gate → vision fallback
//!  ├─ 6. Write        <name>.md.tmp, flushed per page, renamed on success
//!  └─ 7. Progress     JSON status file rewritten per page and per file
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_batch_ocr::{
//!     load_batch_list, BatchConfig, BatchRunner, EngineChain, FileProcessor,
//!     PdfiumSource, StatusFileReporter, TesseractEngine, VisionFallbackEngine,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = BatchConfig::default();
//!     let files = load_batch_list(&config.classification_path, &config.categories)?;
//!
//!     let source = Arc::new(PdfiumSource::bind(None, None)?);
//!     let chain = Arc::new(EngineChain::fast_then_fallback(
//!         Arc::new(TesseractEngine::new("tesseract", "vie")),
//!         Arc::new(VisionFallbackEngine::from_config(&config)),
//!         config.quality_gate.clone(),
//!     ));
//!     let reporter = Arc::new(StatusFileReporter::new(&config.status_file));
//!
//!     let runner = BatchRunner::new(FileProcessor::new(source, chain, config), reporter);
//!     let summary = runner.run(&files).await?;
//!     eprintln!("done {} / errors {}", summary.done, summary.errors);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `batch-ocr` binary (clap + anyhow + tracing-subscriber + indicatif) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod batch;
pub mod classification;
pub mod config;
pub mod convert;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use batch::{BatchRunner, BatchState};
pub use classification::{display_name, load_batch_list, output_name};
pub use config::{BatchConfig, BatchConfigBuilder};
pub use convert::{output_paths, FileProcessor, NoopPageObserver, OutputPaths, PageObserver};
pub use error::BatchOcrError;
pub use output::{
    BatchSummary, EngineTag, FileResult, PageOutcome, PageSummary, RecentFile, TagCounts,
};
pub use pipeline::document::{Document, DocumentSource};
pub use pipeline::engine::{
    Acceptance, EngineChain, EngineOutcome, EngineStage, GateVerdict, OcrEngine, QualityGate,
};
pub use pipeline::extract::{ContentBox, ExtractPolicy, PageUnit};
pub use pipeline::llm::VisionFallbackEngine;
pub use pipeline::render::PdfiumSource;
pub use pipeline::tesseract::TesseractEngine;
pub use progress::{
    format_duration, FanoutReporter, NoopProgressReporter, ProgressReporter, ProgressSnapshot,
    StatusFileReporter,
};
