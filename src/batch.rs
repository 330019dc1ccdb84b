//! Batch orchestration: resume, per-file isolation, progress.
//!
//! ## Resuming
//!
//! There is no state file. A document is done exactly when its `.md` output
//! exists, so the runner partitions the batch by checking the filesystem at
//! start and checks again right before each document, in case another run
//! finished it meanwhile. Re-running a batch is the retry mechanism.
//!
//! ## Isolation
//!
//! A failing document is counted, logged and skipped; it never stops the
//! batch. The file processor has already removed its partial output, so the
//! next run picks it up again.

use crate::classification::display_name;
use crate::convert::{FileProcessor, PageObserver};
use crate::error::BatchOcrError;
use crate::output::{BatchSummary, FileResult, RecentFile, TagCounts};
use crate::progress::{format_duration, CurrentFile, ProgressInputs, ProgressReporter, ProgressSnapshot};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info};

/// Running counters for one batch.
#[derive(Debug, Clone)]
pub struct BatchState {
    total: usize,
    already_done: usize,
    processed: usize,
    skipped: usize,
    errors: usize,
    tag_counts: TagCounts,
    recent: Vec<RecentFile>,
    recent_limit: usize,
    duration_sum_secs: f64,
    durations: usize,
    initial_estimate_secs: f64,
    started: Instant,
}

impl BatchState {
    pub fn new(total: usize, already_done: usize, recent_limit: usize, initial_estimate_secs: f64) -> Self {
        Self {
            total,
            already_done,
            processed: 0,
            skipped: 0,
            errors: 0,
            tag_counts: TagCounts::default(),
            recent: Vec::new(),
            recent_limit: recent_limit.max(1),
            duration_sum_secs: 0.0,
            durations: 0,
            initial_estimate_secs,
            started: Instant::now(),
        }
    }

    /// Files with an output artifact: found at start, skipped on re-check,
    /// or processed in this run.
    pub fn done(&self) -> usize {
        self.already_done + self.skipped + self.processed
    }

    pub fn errors(&self) -> usize {
        self.errors
    }

    /// 1-based position of the next file in the whole batch. Files skipped
    /// on re-check and failed files both count as already visited.
    pub fn next_position(&self) -> usize {
        self.done() + self.errors + 1
    }

    /// Mean duration of files processed in this run, or the initial
    /// estimate before the first one finishes.
    pub fn avg_per_file(&self) -> f64 {
        if self.durations == 0 {
            self.initial_estimate_secs
        } else {
            self.duration_sum_secs / self.durations as f64
        }
    }

    pub fn recent_files(&self) -> &[RecentFile] {
        &self.recent
    }

    pub fn record_skip(&mut self) {
        self.skipped += 1;
    }

    pub fn record_error(&mut self) {
        self.errors += 1;
    }

    pub fn record_success(&mut self, name: String, result: &FileResult, elapsed_secs: f64) -> RecentFile {
        self.processed += 1;
        self.duration_sum_secs += elapsed_secs;
        self.durations += 1;
        self.tag_counts.merge(&result.tag_counts);

        let entry = RecentFile::new(name, result.page_count, elapsed_secs);
        self.recent.push(entry.clone());
        if self.recent.len() > self.recent_limit {
            let excess = self.recent.len() - self.recent_limit;
            self.recent.drain(..excess);
        }
        entry
    }

    pub fn snapshot(&self, current: Option<&CurrentFile>) -> ProgressSnapshot {
        ProgressSnapshot::compute(ProgressInputs {
            done: self.done(),
            total: self.total,
            errors: self.errors,
            current,
            elapsed_secs: self.started.elapsed().as_secs_f64(),
            avg_per_file_secs: self.avg_per_file(),
            recent_files: &self.recent,
            recent_limit: self.recent_limit,
        })
    }

    pub fn summary(&self) -> BatchSummary {
        BatchSummary {
            total: self.total,
            already_done: self.already_done,
            processed: self.processed,
            skipped: self.skipped,
            done: self.done(),
            errors: self.errors,
            tag_counts: self.tag_counts,
            elapsed_ms: self.started.elapsed().as_millis() as u64,
            recent_files: self.recent.clone(),
        }
    }
}

/// Runs a [`FileProcessor`] over a batch list.
pub struct BatchRunner {
    processor: FileProcessor,
    reporter: Arc<dyn ProgressReporter>,
}

impl BatchRunner {
    pub fn new(processor: FileProcessor, reporter: Arc<dyn ProgressReporter>) -> Self {
        Self {
            processor,
            reporter,
        }
    }

    pub fn processor(&self) -> &FileProcessor {
        &self.processor
    }

    /// Process every file in `files` whose output does not exist yet.
    ///
    /// Only a failure to create the output directory is returned as an
    /// error; per-file failures are counted in the summary.
    pub async fn run(&self, files: &[PathBuf]) -> Result<BatchSummary, BatchOcrError> {
        let config = self.processor.config();
        tokio::fs::create_dir_all(&config.output_dir)
            .await
            .map_err(|source| BatchOcrError::OutputWriteFailed {
                path: config.output_dir.clone(),
                source,
            })?;

        let (done, pending): (Vec<&PathBuf>, Vec<&PathBuf>) = files
            .iter()
            .partition(|pdf| self.processor.output_paths(pdf).final_path.exists());

        let total = files.len();
        info!(
            "Total: {}, Already done: {}, Pending: {}",
            total,
            done.len(),
            pending.len()
        );

        let mut state = BatchState::new(
            total,
            done.len(),
            config.recent_history,
            config.initial_file_estimate_secs,
        );

        if pending.is_empty() {
            info!("Nothing to OCR.");
            self.reporter.report(&state.snapshot(None));
            return Ok(state.summary());
        }

        info!(
            "Engines: {}",
            self.processor
                .chain()
                .stages()
                .iter()
                .map(|s| s.engine.name())
                .collect::<Vec<_>>()
                .join(" → ")
        );

        for (i, pdf) in pending.iter().enumerate() {
            if self.processor.output_paths(pdf).final_path.exists() {
                debug!("{} completed elsewhere, skipping", pdf.display());
                state.record_skip();
                continue;
            }

            let name = display_name(pdf);
            let file_started = Instant::now();
            let mut observer = RunObserver {
                state: &state,
                reporter: self.reporter.as_ref(),
                name: name.clone(),
                position: state.next_position(),
                index: i + 1,
                pending: pending.len(),
                started_unix: unix_now(),
            };

            let outcome = self.processor.process(pdf, &mut observer).await;
            let elapsed = file_started.elapsed().as_secs_f64();

            match outcome {
                Ok(result) => {
                    let entry = state.record_success(name, &result, elapsed);
                    info!(
                        "  done {:.0}s ({:.0}s/p) avg={:.0}s/file",
                        elapsed,
                        elapsed / entry.pages.max(1) as f64,
                        state.avg_per_file()
                    );
                }
                Err(e) => {
                    state.record_error();
                    error!("  ERROR {}: {}", name, e);
                    self.processor.chain().reclaim();
                }
            }
            self.reporter.report(&state.snapshot(None));
        }

        let summary = state.summary();
        info!(
            "OCR complete. Done: {}, Errors: {}, Time: {}",
            summary.done,
            summary.errors,
            format_duration(summary.elapsed_ms as f64 / 1000.0)
        );
        info!(
            "Engine stats: fast={} fallback={} native={}",
            summary.tag_counts.fast, summary.tag_counts.fallback, summary.tag_counts.native
        );
        Ok(summary)
    }
}

/// Logs the per-file header and reports a snapshot before every page.
struct RunObserver<'a> {
    state: &'a BatchState,
    reporter: &'a dyn ProgressReporter,
    name: String,
    /// 1-based position in the whole batch.
    position: usize,
    /// 1-based position among pending files.
    index: usize,
    pending: usize,
    started_unix: f64,
}

impl PageObserver for RunObserver<'_> {
    fn file_opened(&mut self, pages: usize) {
        info!(
            "[{}/{}] ({}/{}) OCR {} ({}p)",
            self.index, self.pending, self.position, self.state.total, self.name, pages
        );
    }

    fn page_started(&mut self, page_idx: usize, total: usize) {
        let current = CurrentFile {
            name: self.name.clone(),
            page_idx,
            pages_total: total,
            started_unix: self.started_unix,
        };
        self.reporter.report(&self.state.snapshot(Some(&current)));
    }
}

fn unix_now() -> f64 {
    chrono::Utc::now().timestamp_millis() as f64 / 1000.0
}
