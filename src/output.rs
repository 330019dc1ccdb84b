//! Result types produced by the page pipeline, the file processor and the
//! batch runner.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Which extraction method produced a page's text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineTag {
    /// Embedded text layer; no engine was invoked.
    Native,
    /// Fast traditional OCR (tesseract).
    Fast,
    /// Vision Language Model fallback.
    Fallback,
}

impl EngineTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            EngineTag::Native => "native",
            EngineTag::Fast => "fast",
            EngineTag::Fallback => "fallback",
        }
    }
}

impl fmt::Display for EngineTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-tag page counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagCounts {
    pub native: usize,
    pub fast: usize,
    pub fallback: usize,
}

impl TagCounts {
    pub fn record(&mut self, tag: EngineTag) {
        match tag {
            EngineTag::Native => self.native += 1,
            EngineTag::Fast => self.fast += 1,
            EngineTag::Fallback => self.fallback += 1,
        }
    }

    pub fn merge(&mut self, other: &TagCounts) {
        self.native += other.native;
        self.fast += other.fast;
        self.fallback += other.fallback;
    }

    pub fn total(&self) -> usize {
        self.native + self.fast + self.fallback
    }
}

/// The result of one page, handed from the driver to the file processor.
#[derive(Debug, Clone)]
pub struct PageOutcome {
    /// 1-indexed page number.
    pub page_num: usize,
    pub tag: EngineTag,
    pub text: String,
    /// Wall-clock time from waiting on the extraction to the end of OCR.
    pub duration_ms: u64,
}

/// Per-page bookkeeping kept in [`FileResult`] once the text has been written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageSummary {
    pub page_num: usize,
    pub tag: EngineTag,
    pub chars: usize,
    pub duration_ms: u64,
}

impl From<&PageOutcome> for PageSummary {
    fn from(p: &PageOutcome) -> Self {
        Self {
            page_num: p.page_num,
            tag: p.tag,
            chars: p.text.chars().count(),
            duration_ms: p.duration_ms,
        }
    }
}

/// Everything known about one fully processed document.
#[derive(Debug, Clone, Serialize)]
pub struct FileResult {
    pub source: PathBuf,
    /// Final Markdown path; exists on disk once this value is returned.
    pub output_path: PathBuf,
    /// Page texts joined by a blank line, in page order.
    pub markdown: String,
    pub pages: Vec<PageSummary>,
    pub tag_counts: TagCounts,
    pub page_count: usize,
    pub duration_ms: u64,
}

/// One entry of the bounded recent-completions history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecentFile {
    pub name: String,
    pub pages: usize,
    /// Seconds, rounded to one decimal.
    pub duration: f64,
    /// Seconds per page, rounded to one decimal.
    pub per_page: f64,
}

impl RecentFile {
    pub fn new(name: impl Into<String>, pages: usize, elapsed_secs: f64) -> Self {
        Self {
            name: name.into(),
            pages,
            duration: round1(elapsed_secs),
            per_page: round1(elapsed_secs / pages.max(1) as f64),
        }
    }
}

/// Aggregate outcome of [`crate::batch::BatchRunner::run`].
#[derive(Debug, Clone, Serialize)]
pub struct BatchSummary {
    pub total: usize,
    /// Files whose artifact already existed when the run started.
    pub already_done: usize,
    /// Files processed successfully during this run.
    pub processed: usize,
    /// Pending files found complete on the pre-processing re-check.
    pub skipped: usize,
    /// `already_done + processed + skipped`.
    pub done: usize,
    pub errors: usize,
    pub tag_counts: TagCounts,
    pub elapsed_ms: u64,
    pub recent_files: Vec<RecentFile>,
}

pub(crate) fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}
