//! Progress snapshots and the reporters that publish them.
//!
//! The batch runner builds a [`ProgressSnapshot`] once per page (before the
//! page's OCR) and once per file (after it finishes or fails), then hands it
//! to a [`ProgressReporter`]. The stock reporter, [`StatusFileReporter`],
//! rewrites a JSON status file that dashboards poll.
//!
//! # Why a trait instead of a channel?
//!
//! Same reasoning as a callback: the host decides where snapshots go (a
//! file, a terminal bar, a websocket) without the runner knowing. Reporters
//! are `Send + Sync` and must never fail the batch; a reporter that cannot
//! publish logs and moves on.
//!
//! # Example
//!
//! ```rust
//! use edgequake_batch_ocr::{ProgressReporter, ProgressSnapshot};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct Counting(AtomicUsize);
//!
//! impl ProgressReporter for Counting {
//!     fn report(&self, snapshot: &ProgressSnapshot) {
//!         self.0.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("{}/{} ({}%)", snapshot.done, snapshot.total, snapshot.pct);
//!     }
//! }
//!
//! let reporter: Arc<dyn ProgressReporter> = Arc::new(Counting(AtomicUsize::new(0)));
//! ```

use crate::output::{round1, RecentFile};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

/// Everything the status artifact shows at one moment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressSnapshot {
    pub done: usize,
    pub total: usize,
    pub errors: usize,
    /// Percent of files done, one decimal.
    pub pct: f64,
    /// Display name of the file in progress, `-` between files.
    pub current_file: String,
    /// `page/pages` of the page in progress, `-` between files.
    pub current_page: String,
    pub current_pages_total: usize,
    /// Unix seconds when the current file started, 0 between files.
    pub current_file_started: f64,
    pub elapsed: String,
    pub avg_per_file: String,
    pub eta: String,
    pub eta_hours: f64,
    /// Local time, `%Y-%m-%d %H:%M:%S`.
    pub updated: String,
    pub recent_files: Vec<RecentFile>,
}

/// The file currently being processed, if any.
#[derive(Debug, Clone)]
pub struct CurrentFile {
    pub name: String,
    /// 0-based index of the page about to be processed.
    pub page_idx: usize,
    pub pages_total: usize,
    pub started_unix: f64,
}

/// Raw counters a snapshot is computed from.
#[derive(Debug, Clone)]
pub struct ProgressInputs<'a> {
    pub done: usize,
    pub total: usize,
    pub errors: usize,
    pub current: Option<&'a CurrentFile>,
    pub elapsed_secs: f64,
    pub avg_per_file_secs: f64,
    pub recent_files: &'a [RecentFile],
    pub recent_limit: usize,
}

impl ProgressSnapshot {
    pub fn compute(inputs: ProgressInputs<'_>) -> Self {
        let ProgressInputs {
            done,
            total,
            errors,
            current,
            elapsed_secs,
            avg_per_file_secs,
            recent_files,
            recent_limit,
        } = inputs;

        let remaining = total.saturating_sub(done + errors);
        let eta_secs = if avg_per_file_secs > 0.0 {
            remaining as f64 * avg_per_file_secs
        } else {
            0.0
        };

        let skip = recent_files.len().saturating_sub(recent_limit);

        Self {
            done,
            total,
            errors,
            pct: round1(done as f64 / total.max(1) as f64 * 100.0),
            current_file: current.map_or_else(|| "-".to_string(), |c| c.name.clone()),
            current_page: current.map_or_else(
                || "-".to_string(),
                |c| format!("{}/{}", c.page_idx + 1, c.pages_total),
            ),
            current_pages_total: current.map_or(0, |c| c.pages_total),
            current_file_started: current.map_or(0.0, |c| c.started_unix),
            elapsed: format_duration(elapsed_secs),
            avg_per_file: format!("{:.0}s", avg_per_file_secs),
            eta: format_duration(eta_secs),
            eta_hours: round1(eta_secs / 3600.0),
            updated: chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            recent_files: recent_files[skip..].to_vec(),
        }
    }
}

/// `1h05m` for an hour or more, `4m07s` below that.
pub fn format_duration(secs: f64) -> String {
    let secs = secs.max(0.0);
    let h = (secs / 3600.0).floor() as u64;
    let m = ((secs % 3600.0) / 60.0).floor() as u64;
    if h > 0 {
        format!("{}h{:02}m", h, m)
    } else {
        format!("{}m{:02}s", m, (secs % 60.0).floor() as u64)
    }
}

/// Receives progress snapshots. Must not panic or block for long.
pub trait ProgressReporter: Send + Sync {
    fn report(&self, snapshot: &ProgressSnapshot);
}

/// Discards every snapshot.
pub struct NoopProgressReporter;

impl ProgressReporter for NoopProgressReporter {
    fn report(&self, _snapshot: &ProgressSnapshot) {}
}

/// Overwrites a JSON status file with every snapshot.
///
/// The snapshot is written to `<path>.tmp` and renamed over `path`, so a
/// reader never sees a half-written file.
pub struct StatusFileReporter {
    path: PathBuf,
}

impl StatusFileReporter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write(&self, snapshot: &ProgressSnapshot) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let mut json = serde_json::to_string_pretty(snapshot)?;
        json.push('\n');

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &self.path)
    }
}

impl ProgressReporter for StatusFileReporter {
    fn report(&self, snapshot: &ProgressSnapshot) {
        match self.write(snapshot) {
            Ok(()) => debug!("status written to {}", self.path.display()),
            Err(e) => warn!("Could not write status file {}: {}", self.path.display(), e),
        }
    }
}

/// Forwards every snapshot to each inner reporter in order.
pub struct FanoutReporter(pub Vec<Arc<dyn ProgressReporter>>);

impl ProgressReporter for FanoutReporter {
    fn report(&self, snapshot: &ProgressSnapshot) {
        for reporter in &self.0 {
            reporter.report(snapshot);
        }
    }
}
