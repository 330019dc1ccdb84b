//! One-slot page prefetch.
//!
//! A [`PageWorker`] owns one open document on a dedicated blocking thread
//! and extracts pages on request. The driver keeps at most one request in
//! flight ahead of the page it is currently OCR-ing, so rendering page
//! *n+1* overlaps OCR of page *n* while the engines themselves are only
//! ever driven from the caller's task, one page at a time.
//!
//! Dropping the worker closes the request channel; the thread finishes any
//! extraction already in progress, discards it, closes the document and
//! exits. Nobody waits for it.

use crate::error::BatchOcrError;
use crate::pipeline::document::DocumentSource;
use crate::pipeline::extract::{extract, ExtractPolicy, PageUnit};
use std::path::Path;
use std::sync::mpsc;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::debug;

type PageReply = oneshot::Sender<Result<PageUnit, BatchOcrError>>;

struct PageRequest {
    page_idx: usize,
    reply: PageReply,
}

/// Background extractor for one document.
pub struct PageWorker {
    requests: mpsc::Sender<PageRequest>,
    page_count: usize,
}

/// An extraction that has been submitted but not yet collected.
pub struct PendingPage {
    page_idx: usize,
    reply: oneshot::Receiver<Result<PageUnit, BatchOcrError>>,
}

impl PageWorker {
    /// Open `path` on a new blocking thread and initialise its forms.
    ///
    /// Resolves once the document is open, so open errors (missing file,
    /// corrupt PDF, password) surface here rather than on the first page.
    pub async fn open(
        source: Arc<dyn DocumentSource>,
        path: &Path,
        policy: ExtractPolicy,
    ) -> Result<Self, BatchOcrError> {
        let (ready_tx, ready_rx) = oneshot::channel::<Result<usize, BatchOcrError>>();
        let (req_tx, req_rx) = mpsc::channel::<PageRequest>();
        let path = path.to_path_buf();

        // The JoinHandle is dropped on purpose: shutdown never blocks on
        // the thread.
        let _ = tokio::task::spawn_blocking(move || {
            let opened = source.open(&path).and_then(|mut doc| {
                doc.init_forms()?;
                Ok(doc)
            });
            let mut doc = match opened {
                Ok(doc) => doc,
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                    return;
                }
            };

            if ready_tx.send(Ok(doc.page_count())).is_err() {
                return;
            }

            while let Ok(req) = req_rx.recv() {
                let result = extract(doc.as_mut(), req.page_idx, &policy);
                if req.reply.send(result).is_err() {
                    debug!("page {} extracted after its file was abandoned", req.page_idx + 1);
                }
            }
            debug!("page worker for {} shutting down", path.display());
        });

        let page_count = ready_rx
            .await
            .map_err(|_| BatchOcrError::Internal("page worker exited while opening document".into()))??;

        Ok(Self {
            requests: req_tx,
            page_count,
        })
    }

    pub fn page_count(&self) -> usize {
        self.page_count
    }

    /// Queue extraction of `page_idx`.
    pub fn submit(&self, page_idx: usize) -> Result<PendingPage, BatchOcrError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.requests
            .send(PageRequest {
                page_idx,
                reply: reply_tx,
            })
            .map_err(|_| BatchOcrError::Internal("page worker is gone".into()))?;
        Ok(PendingPage {
            page_idx,
            reply: reply_rx,
        })
    }
}

impl PendingPage {
    pub fn page_idx(&self) -> usize {
        self.page_idx
    }

    /// Wait for the extraction result.
    pub async fn wait(self) -> Result<PageUnit, BatchOcrError> {
        let page = self.page_idx + 1;
        self.reply.await.map_err(|_| {
            BatchOcrError::Internal(format!("page worker died while extracting page {}", page))
        })?
    }
}
