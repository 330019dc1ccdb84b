//! Single-document processing: PDF in, `<name>.md` out.
//!
//! ## Why write to a temp file first?
//!
//! The final `.md` path doubles as the completion ledger: a batch rerun
//! skips every document whose output exists. Pages are therefore appended
//! (and flushed) to `<name>.md.tmp` as they finish, so a crashed run leaves
//! inspectable partial output, and only a fully processed document is
//! renamed into place. Any error removes both paths.

use crate::classification::output_name;
use crate::config::BatchConfig;
use crate::error::BatchOcrError;
use crate::output::{FileResult, PageOutcome, PageSummary, TagCounts};
use crate::pipeline::document::DocumentSource;
use crate::pipeline::driver::{drive_pages, PageSink};
use crate::pipeline::engine::EngineChain;
use crate::pipeline::prefetch::PageWorker;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

/// Final and temporary output paths for one document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputPaths {
    pub final_path: PathBuf,
    pub tmp_path: PathBuf,
}

/// Where the output for `pdf` goes under `config`.
pub fn output_paths(config: &BatchConfig, pdf: &Path) -> OutputPaths {
    let name = output_name(pdf, &config.data_dir);
    OutputPaths {
        final_path: config.output_dir.join(format!("{}.md", name)),
        tmp_path: config.output_dir.join(format!("{}.md.tmp", name)),
    }
}

/// Hooks into a document's progress. Both methods default to no-ops.
pub trait PageObserver: Send {
    /// The document is open and has `pages` pages.
    fn file_opened(&mut self, pages: usize) {
        let _ = pages;
    }

    /// Page `page_idx` (0-based) is next; called before its extraction is
    /// awaited and before any OCR.
    fn page_started(&mut self, page_idx: usize, total: usize) {
        let _ = (page_idx, total);
    }
}

pub struct NoopPageObserver;

impl PageObserver for NoopPageObserver {}

/// Turns one PDF into one Markdown file.
pub struct FileProcessor {
    source: Arc<dyn DocumentSource>,
    chain: Arc<EngineChain>,
    config: BatchConfig,
}

impl FileProcessor {
    pub fn new(source: Arc<dyn DocumentSource>, chain: Arc<EngineChain>, config: BatchConfig) -> Self {
        Self {
            source,
            chain,
            config,
        }
    }

    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    pub fn chain(&self) -> &EngineChain {
        &self.chain
    }

    pub fn output_paths(&self, pdf: &Path) -> OutputPaths {
        output_paths(&self.config, pdf)
    }

    /// Process every page of `pdf` and publish `<name>.md`.
    ///
    /// On error neither `<name>.md` nor `<name>.md.tmp` exists afterwards.
    pub async fn process(
        &self,
        pdf: &Path,
        observer: &mut dyn PageObserver,
    ) -> Result<FileResult, BatchOcrError> {
        let paths = self.output_paths(pdf);
        match self.process_into(pdf, &paths, observer).await {
            Ok(result) => Ok(result),
            Err(e) => {
                remove_if_present(&paths.tmp_path).await;
                remove_if_present(&paths.final_path).await;
                Err(e)
            }
        }
    }

    async fn process_into(
        &self,
        pdf: &Path,
        paths: &OutputPaths,
        observer: &mut dyn PageObserver,
    ) -> Result<FileResult, BatchOcrError> {
        let started = Instant::now();

        tokio::fs::create_dir_all(&self.config.output_dir)
            .await
            .map_err(|source| BatchOcrError::OutputWriteFailed {
                path: self.config.output_dir.clone(),
                source,
            })?;

        let worker =
            PageWorker::open(Arc::clone(&self.source), pdf, self.config.extract_policy()).await?;
        let page_count = worker.page_count();
        observer.file_opened(page_count);

        let out = File::create(&paths.tmp_path)
            .await
            .map_err(|source| BatchOcrError::OutputWriteFailed {
                path: paths.tmp_path.clone(),
                source,
            })?;

        let mut sink = MarkdownSink {
            out,
            tmp_path: &paths.tmp_path,
            observer,
            chain: &self.chain,
            page_count,
            reclaim_every: self.config.reclaim_every_pages.max(1),
            markdown: String::new(),
            pages: Vec::with_capacity(page_count),
            tag_counts: TagCounts::default(),
        };

        drive_pages(worker, &self.chain, &mut sink).await?;

        let MarkdownSink {
            out,
            markdown,
            pages,
            tag_counts,
            ..
        } = sink;
        out.sync_all()
            .await
            .map_err(|source| BatchOcrError::OutputWriteFailed {
                path: paths.tmp_path.clone(),
                source,
            })?;
        drop(out);

        tokio::fs::rename(&paths.tmp_path, &paths.final_path)
            .await
            .map_err(|source| BatchOcrError::OutputWriteFailed {
                path: paths.final_path.clone(),
                source,
            })?;
        self.chain.reclaim();

        Ok(FileResult {
            source: pdf.to_path_buf(),
            output_path: paths.final_path.clone(),
            markdown,
            pages,
            tag_counts,
            page_count,
            duration_ms: started.elapsed().as_millis() as u64,
        })
    }
}

/// Appends finished pages to the temp file and keeps per-page bookkeeping.
struct MarkdownSink<'a> {
    out: File,
    tmp_path: &'a Path,
    observer: &'a mut dyn PageObserver,
    chain: &'a EngineChain,
    page_count: usize,
    reclaim_every: usize,
    markdown: String,
    pages: Vec<PageSummary>,
    tag_counts: TagCounts,
}

impl<'a> MarkdownSink<'a> {
    async fn append(&mut self, text: &str) -> std::io::Result<()> {
        self.out.write_all(text.as_bytes()).await?;
        self.out.flush().await
    }
}

#[async_trait]
impl<'a> PageSink for MarkdownSink<'a> {
    fn page_started(&mut self, page_idx: usize, total: usize) {
        self.observer.page_started(page_idx, total);
    }

    async fn page_finished(&mut self, outcome: PageOutcome) -> Result<(), BatchOcrError> {
        let chunk = if self.pages.is_empty() {
            outcome.text.clone()
        } else {
            format!("\n\n{}", outcome.text)
        };
        let tmp_path = self.tmp_path;
        self.append(&chunk)
            .await
            .map_err(|source| BatchOcrError::OutputWriteFailed {
                path: tmp_path.to_path_buf(),
                source,
            })?;
        self.markdown.push_str(&chunk);

        let summary = PageSummary::from(&outcome);
        info!(
            "  p{}/{} [{}] {:.0}s ({} chars)",
            summary.page_num,
            self.page_count,
            summary.tag,
            summary.duration_ms as f64 / 1000.0,
            summary.chars
        );
        self.tag_counts.record(summary.tag);
        self.pages.push(summary);

        let page_idx = outcome.page_num - 1;
        if page_idx % self.reclaim_every == self.reclaim_every - 1 {
            debug!("reclaiming engine buffers after page {}", outcome.page_num);
            self.chain.reclaim();
        }
        Ok(())
    }
}

async fn remove_if_present(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!("removed {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Could not remove {}: {}", path.display(), e),
    }
}
