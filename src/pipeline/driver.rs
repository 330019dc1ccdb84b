//! Pipelined page driver.
//!
//! ```text
//! worker:  [extract 0] [extract 1]        [extract 2]
//! driver:              [OCR 0    ]        [OCR 1    ] [OCR 2]
//! ```
//!
//! Page *n+1* is submitted to the [`PageWorker`] right after page *n*'s
//! extraction is collected and before page *n*'s OCR starts. OCR itself runs
//! here, in page order, so output order is the page order.

use crate::error::BatchOcrError;
use crate::output::{EngineTag, PageOutcome};
use crate::pipeline::engine::EngineChain;
use crate::pipeline::extract::PageUnit;
use crate::pipeline::prefetch::PageWorker;
use async_trait::async_trait;
use std::time::Instant;

/// Receives pages from [`drive_pages`] in ascending order.
#[async_trait]
pub trait PageSink: Send {
    /// Called before waiting on the page's extraction.
    fn page_started(&mut self, page_idx: usize, total: usize);

    /// Called once the page's text is known. An error stops the file.
    async fn page_finished(&mut self, outcome: PageOutcome) -> Result<(), BatchOcrError>;
}

/// Drive every page of the worker's document through `chain`.
///
/// Consumes the worker: it is dropped (and its thread told to stop) on
/// every exit path, including early returns on error. Returns the number
/// of pages processed.
pub async fn drive_pages(
    worker: PageWorker,
    chain: &EngineChain,
    sink: &mut dyn PageSink,
) -> Result<usize, BatchOcrError> {
    let total = worker.page_count();
    if total == 0 {
        return Ok(0);
    }

    let mut next = Some(worker.submit(0)?);

    for page_idx in 0..total {
        let current = next
            .take()
            .ok_or_else(|| BatchOcrError::Internal(format!("page {} was never submitted", page_idx + 1)))?;

        sink.page_started(page_idx, total);
        let started = Instant::now();

        let unit = current.wait().await?;
        if page_idx + 1 < total {
            next = Some(worker.submit(page_idx + 1)?);
        }

        let (tag, text) = match unit {
            PageUnit::NativeText(text) => (EngineTag::Native, text),
            PageUnit::RenderedImage { image, .. } => {
                let outcome = chain.select(&image).await?;
                (outcome.tag, outcome.text)
            }
        };

        sink.page_finished(PageOutcome {
            page_num: page_idx + 1,
            tag,
            text,
            duration_ms: started.elapsed().as_millis() as u64,
        })
        .await?;
    }

    Ok(total)
}
