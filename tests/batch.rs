//! Integration tests for the batch pipeline.
//!
//! PDFs and OCR engines are replaced by in-memory fakes so these run
//! without libpdfium, tesseract or an API key:
//!
//! * `FakeSource` serves documents made of text-layer pages, image pages and
//!   pages that fail to render, and counts renders.
//! * `ScriptedEngine` returns queued responses and counts calls.

use async_trait::async_trait;
use edgequake_batch_ocr::{
    BatchConfig, BatchOcrError, BatchRunner, Document, DocumentSource, EngineChain, EngineTag,
    FileProcessor, NoopPageObserver, NoopProgressReporter, OcrEngine, ProgressReporter,
    ProgressSnapshot, QualityGate, StatusFileReporter,
};
use image::{DynamicImage, Rgb, RgbImage};
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

// ── Fakes ────────────────────────────────────────────────────────────────────

#[derive(Clone)]
enum FakePage {
    Text(String),
    Image,
    Broken,
}

struct FakeDoc {
    pages: Vec<FakePage>,
    renders: Arc<AtomicUsize>,
}

impl Document for FakeDoc {
    fn page_count(&self) -> usize {
        self.pages.len()
    }

    fn init_forms(&mut self) -> Result<(), BatchOcrError> {
        Ok(())
    }

    fn page_text(&self, page_idx: usize) -> Result<String, BatchOcrError> {
        match &self.pages[page_idx] {
            FakePage::Text(t) => Ok(t.clone()),
            _ => Ok(String::new()),
        }
    }

    fn page_size(&self, _page_idx: usize) -> Result<(f32, f32), BatchOcrError> {
        Ok((595.0, 842.0))
    }

    fn flatten_page(&mut self, _page_idx: usize) -> Result<(), BatchOcrError> {
        Ok(())
    }

    fn render_page(&self, page_idx: usize, _scale: f32) -> Result<DynamicImage, BatchOcrError> {
        self.renders.fetch_add(1, Ordering::SeqCst);
        if let FakePage::Broken = self.pages[page_idx] {
            return Err(BatchOcrError::RasterisationFailed {
                page: page_idx + 1,
                detail: "broken test page".into(),
            });
        }
        // White page with a dark text block in the middle.
        Ok(DynamicImage::ImageRgb8(RgbImage::from_fn(120, 160, |x, y| {
            if (30..90).contains(&x) && (40..120).contains(&y) {
                Rgb([20, 20, 20])
            } else {
                Rgb([255, 255, 255])
            }
        })))
    }
}

#[derive(Default)]
struct FakeSource {
    docs: Mutex<HashMap<PathBuf, Vec<FakePage>>>,
    renders: Arc<AtomicUsize>,
}

impl FakeSource {
    fn add(&self, path: &Path, pages: Vec<FakePage>) {
        self.docs.lock().unwrap().insert(path.to_path_buf(), pages);
    }

    fn renders(&self) -> usize {
        self.renders.load(Ordering::SeqCst)
    }
}

impl DocumentSource for FakeSource {
    fn open<'a>(&'a self, path: &Path) -> Result<Box<dyn Document + 'a>, BatchOcrError> {
        let pages = self
            .docs
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .ok_or_else(|| BatchOcrError::FileNotFound {
                path: path.to_path_buf(),
            })?;
        Ok(Box::new(FakeDoc {
            pages,
            renders: Arc::clone(&self.renders),
        }))
    }
}

struct ScriptedEngine {
    name: &'static str,
    tag: EngineTag,
    responses: Mutex<VecDeque<String>>,
    default: String,
    calls: AtomicUsize,
    reclaims: AtomicUsize,
}

impl ScriptedEngine {
    fn new(name: &'static str, tag: EngineTag, default: &str) -> Arc<Self> {
        Arc::new(Self {
            name,
            tag,
            responses: Mutex::new(VecDeque::new()),
            default: default.to_string(),
            calls: AtomicUsize::new(0),
            reclaims: AtomicUsize::new(0),
        })
    }

    fn queue(&self, response: impl Into<String>) {
        self.responses.lock().unwrap().push_back(response.into());
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl OcrEngine for ScriptedEngine {
    fn name(&self) -> &str {
        self.name
    }

    fn tag(&self) -> EngineTag {
        self.tag
    }

    async fn recognize(&self, _image: &DynamicImage) -> Result<String, BatchOcrError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self.responses.lock().unwrap().pop_front();
        Ok(next.unwrap_or_else(|| self.default.clone()))
    }

    fn reclaim(&self) {
        self.reclaims.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
struct CollectingReporter(Mutex<Vec<ProgressSnapshot>>);

impl ProgressReporter for CollectingReporter {
    fn report(&self, snapshot: &ProgressSnapshot) {
        self.0.lock().unwrap().push(snapshot.clone());
    }
}

// ── Fixtures ─────────────────────────────────────────────────────────────────

/// 60 letters, none with diacritics: a usable text layer.
fn native_text() -> String {
    "a".repeat(60)
}

/// 80 letters, 20 with Vietnamese diacritics: passes the quality gate.
fn good_vietnamese() -> String {
    format!("{}{}", "ế".repeat(20), "a".repeat(60))
}

/// 80 letters, 5 with diacritics: fails the quality gate.
fn stripped_vietnamese() -> String {
    format!("{}{}", "ế".repeat(5), "e".repeat(75))
}

struct Harness {
    dir: TempDir,
    source: Arc<FakeSource>,
    fast: Arc<ScriptedEngine>,
    fallback: Arc<ScriptedEngine>,
}

/// Route pipeline logs through the test harness; `RUST_LOG=debug` to see them.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

impl Harness {
    fn new() -> Self {
        init_tracing();
        Self {
            dir: tempfile::tempdir().unwrap(),
            source: Arc::new(FakeSource::default()),
            fast: ScriptedEngine::new("fast", EngineTag::Fast, ""),
            fallback: ScriptedEngine::new("vision", EngineTag::Fallback, "fallback text"),
        }
    }

    fn data_dir(&self) -> PathBuf {
        self.dir.path().join("data")
    }

    fn out_dir(&self) -> PathBuf {
        self.dir.path().join("out")
    }

    fn status_file(&self) -> PathBuf {
        self.dir.path().join("status.json")
    }

    fn pdf(&self, rel: &str, pages: Vec<FakePage>) -> PathBuf {
        let path = self.data_dir().join(rel);
        self.source.add(&path, pages);
        path
    }

    fn config(&self) -> BatchConfig {
        BatchConfig::builder()
            .data_dir(self.data_dir())
            .output_dir(self.out_dir())
            .status_file(self.status_file())
            .build()
            .unwrap()
    }

    fn processor(&self) -> FileProcessor {
        let chain = EngineChain::fast_then_fallback(
            self.fast.clone(),
            self.fallback.clone(),
            QualityGate::default(),
        );
        FileProcessor::new(self.source.clone(), Arc::new(chain), self.config())
    }

    fn runner(&self, reporter: Arc<dyn ProgressReporter>) -> BatchRunner {
        BatchRunner::new(self.processor(), reporter)
    }

    fn output(&self, name: &str) -> PathBuf {
        self.out_dir().join(format!("{name}.md"))
    }

    fn read_output(&self, name: &str) -> String {
        std::fs::read_to_string(self.output(name)).unwrap()
    }
}

// ── Page routing ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn text_layer_pages_skip_rendering_and_engines() {
    let h = Harness::new();
    let pdf = h.pdf(
        "born-digital.pdf",
        vec![
            FakePage::Text(format!("  {}\n", native_text())),
            FakePage::Text(native_text()),
        ],
    );

    let result = h.processor().process(&pdf, &mut NoopPageObserver).await.unwrap();

    assert_eq!(h.source.renders(), 0);
    assert_eq!(h.fast.calls(), 0);
    assert_eq!(h.fallback.calls(), 0);
    assert_eq!(result.tag_counts.native, 2);
    assert_eq!(
        h.read_output("born-digital"),
        format!("{}\n\n{}", native_text(), native_text())
    );
}

#[tokio::test]
async fn short_text_layer_falls_through_to_ocr() {
    let h = Harness::new();
    let pdf = h.pdf("thin.pdf", vec![FakePage::Text("Trang 1".into())]);
    h.fast.queue(good_vietnamese());

    let result = h.processor().process(&pdf, &mut NoopPageObserver).await.unwrap();

    assert_eq!(h.source.renders(), 1);
    assert_eq!(result.pages[0].tag, EngineTag::Fast);
    assert_eq!(h.read_output("thin"), good_vietnamese());
}

#[tokio::test]
async fn accepted_fast_output_never_calls_fallback() {
    let h = Harness::new();
    let pdf = h.pdf("clean-scan.pdf", vec![FakePage::Image]);
    h.fast.queue(good_vietnamese());

    h.processor().process(&pdf, &mut NoopPageObserver).await.unwrap();

    assert_eq!(h.fast.calls(), 1);
    assert_eq!(h.fallback.calls(), 0);
}

#[tokio::test]
async fn fallback_output_is_written_verbatim() {
    let h = Harness::new();
    let pdf = h.pdf("degraded.pdf", vec![FakePage::Image]);
    h.fast.queue(stripped_vietnamese());
    h.fallback.queue("  ```\n| a | b |\n```  ");

    let result = h.processor().process(&pdf, &mut NoopPageObserver).await.unwrap();

    assert_eq!(result.pages[0].tag, EngineTag::Fallback);
    assert_eq!(h.read_output("degraded"), "  ```\n| a | b |\n```  ");
}

#[tokio::test]
async fn three_pages_take_three_routes() {
    let h = Harness::new();
    let pdf = h.pdf(
        "mixed.pdf",
        vec![FakePage::Text(native_text()), FakePage::Image, FakePage::Image],
    );
    h.fast.queue(good_vietnamese());
    h.fast.queue(stripped_vietnamese());
    h.fallback.queue("# Trang 3");

    let result = h.processor().process(&pdf, &mut NoopPageObserver).await.unwrap();

    let tags: Vec<_> = result.pages.iter().map(|p| p.tag).collect();
    assert_eq!(tags, vec![EngineTag::Native, EngineTag::Fast, EngineTag::Fallback]);
    assert_eq!(h.fast.calls(), 2);
    assert_eq!(h.fallback.calls(), 1);
    assert_eq!(h.source.renders(), 2);

    let expected = format!("{}\n\n{}\n\n# Trang 3", native_text(), good_vietnamese());
    assert_eq!(h.read_output("mixed"), expected);
    assert_eq!(result.markdown, expected);
    assert!(!h.out_dir().join("mixed.md.tmp").exists());
}

// ── Ordering and resource hooks ──────────────────────────────────────────────

#[tokio::test]
async fn pages_come_out_in_page_order() {
    let h = Harness::new();
    let pdf = h.pdf("long.pdf", vec![FakePage::Image; 12]);
    for i in 1..=12 {
        h.fast.queue(format!("{i:02} {}", good_vietnamese()));
    }

    let result = h.processor().process(&pdf, &mut NoopPageObserver).await.unwrap();

    let nums: Vec<_> = result.pages.iter().map(|p| p.page_num).collect();
    assert_eq!(nums, (1..=12).collect::<Vec<_>>());

    let written = h.read_output("long");
    let prefixes: Vec<_> = written.split("\n\n").map(|chunk| &chunk[..2]).collect();
    let expected: Vec<_> = (1..=12).map(|i| format!("{i:02}")).collect();
    assert_eq!(prefixes, expected);

    // Once after page 10 and once after the file completes.
    assert_eq!(h.fast.reclaims.load(Ordering::SeqCst), 2);
    assert_eq!(h.fallback.reclaims.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn zero_page_document_produces_empty_artifact() {
    let h = Harness::new();
    let pdf = h.pdf("empty.pdf", vec![]);

    let result = h.processor().process(&pdf, &mut NoopPageObserver).await.unwrap();

    assert_eq!(result.page_count, 0);
    assert_eq!(h.read_output("empty"), "");
}

#[tokio::test]
async fn nested_inputs_get_distinct_outputs() {
    let h = Harness::new();
    let a = h.pdf("2023/report.pdf", vec![FakePage::Text(native_text())]);
    let b = h.pdf("2024/report.pdf", vec![FakePage::Text(native_text())]);

    let summary = h
        .runner(Arc::new(NoopProgressReporter))
        .run(&[a, b])
        .await
        .unwrap();

    assert_eq!(summary.processed, 2);
    assert!(h.output("2023--report").exists());
    assert!(h.output("2024--report").exists());
}

// ── Failure handling ─────────────────────────────────────────────────────────

#[tokio::test]
async fn failed_file_leaves_no_partial_or_stale_output() {
    let h = Harness::new();
    let pdf = h.pdf("bad.pdf", vec![FakePage::Image, FakePage::Broken]);
    h.fast.queue(good_vietnamese());

    std::fs::create_dir_all(h.out_dir()).unwrap();
    std::fs::write(h.output("bad"), "stale").unwrap();

    let err = h
        .processor()
        .process(&pdf, &mut NoopPageObserver)
        .await
        .unwrap_err();

    assert!(matches!(err, BatchOcrError::RasterisationFailed { page: 2, .. }));
    assert!(!h.output("bad").exists());
    assert!(!h.out_dir().join("bad.md.tmp").exists());
}

#[tokio::test]
async fn one_bad_file_does_not_stop_the_batch() {
    let h = Harness::new();
    let files = vec![
        h.pdf("one.pdf", vec![FakePage::Text(native_text())]),
        h.pdf("two.pdf", vec![FakePage::Broken]),
        h.data_dir().join("missing.pdf"),
        h.pdf("four.pdf", vec![FakePage::Text(native_text())]),
    ];

    let summary = h
        .runner(Arc::new(NoopProgressReporter))
        .run(&files)
        .await
        .unwrap();

    assert_eq!(summary.processed, 2);
    assert_eq!(summary.errors, 2);
    assert_eq!(summary.done, 2);
    assert!(h.output("one").exists());
    assert!(!h.output("two").exists());
    assert!(!h.output("missing").exists());
    assert!(h.output("four").exists());
}

// ── Resume ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn resume_skips_finished_files() {
    let h = Harness::new();
    let files: Vec<_> = (1..=5)
        .map(|i| h.pdf(&format!("doc{i}.pdf"), vec![FakePage::Text(native_text())]))
        .collect();

    std::fs::create_dir_all(h.out_dir()).unwrap();
    std::fs::write(h.output("doc2"), "earlier run").unwrap();
    std::fs::write(h.output("doc4"), "earlier run").unwrap();

    let summary = h
        .runner(Arc::new(NoopProgressReporter))
        .run(&files)
        .await
        .unwrap();

    assert_eq!(summary.total, 5);
    assert_eq!(summary.already_done, 2);
    assert_eq!(summary.processed, 3);
    assert_eq!(summary.done, 5);
    assert_eq!(summary.errors, 0);
    assert_eq!(summary.recent_files.len(), 3);

    let names: Vec<_> = summary.recent_files.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["doc1", "doc3", "doc5"]);
    // Existing outputs are left untouched.
    assert_eq!(h.read_output("doc2"), "earlier run");
}

#[tokio::test]
async fn rerun_is_a_no_op() {
    let h = Harness::new();
    let files = vec![
        h.pdf("a.pdf", vec![FakePage::Image]),
        h.pdf("b.pdf", vec![FakePage::Text(native_text())]),
    ];
    h.fast.queue(good_vietnamese());

    let first = h.runner(Arc::new(NoopProgressReporter)).run(&files).await.unwrap();
    assert_eq!(first.processed, 2);
    let calls_after_first = h.fast.calls();
    let before = h.read_output("a");

    let reporter = Arc::new(CollectingReporter::default());
    let second = h.runner(reporter.clone()).run(&files).await.unwrap();

    assert_eq!(second.already_done, 2);
    assert_eq!(second.processed, 0);
    assert_eq!(second.done, 2);
    assert_eq!(h.fast.calls(), calls_after_first);
    assert_eq!(h.read_output("a"), before);

    let snapshots = reporter.0.lock().unwrap();
    assert_eq!(snapshots.len(), 1);
    assert_eq!(snapshots[0].done, snapshots[0].total);
}

// ── Progress ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn progress_is_reported_per_page_and_per_file() {
    let h = Harness::new();
    let files = vec![h.pdf(
        "report.pdf",
        vec![
            FakePage::Text(native_text()),
            FakePage::Text(native_text()),
            FakePage::Text(native_text()),
        ],
    )];

    let reporter = Arc::new(CollectingReporter::default());
    h.runner(reporter.clone()).run(&files).await.unwrap();

    let snapshots = reporter.0.lock().unwrap();
    let pages: Vec<_> = snapshots.iter().map(|s| s.current_page.as_str()).collect();
    assert_eq!(pages, vec!["1/3", "2/3", "3/3", "-"]);
    assert!(snapshots[..3].iter().all(|s| s.current_file == "report" && s.done == 0));
    assert!(snapshots[0].current_file_started > 0.0);

    let last = snapshots.last().unwrap();
    assert_eq!(last.done, 1);
    assert_eq!(last.pct, 100.0);
    assert_eq!(last.recent_files.len(), 1);
    assert_eq!(last.recent_files[0].pages, 3);
}

#[tokio::test]
async fn status_file_holds_the_final_snapshot() {
    let h = Harness::new();
    let files = vec![
        h.pdf("a.pdf", vec![FakePage::Text(native_text())]),
        h.pdf("b.pdf", vec![FakePage::Broken]),
    ];

    let reporter = Arc::new(StatusFileReporter::new(h.status_file()));
    h.runner(reporter).run(&files).await.unwrap();

    let raw = std::fs::read_to_string(h.status_file()).unwrap();
    let json: serde_json::Value = serde_json::from_str(&raw).unwrap();

    assert_eq!(json["done"], 1);
    assert_eq!(json["total"], 2);
    assert_eq!(json["errors"], 1);
    assert_eq!(json["pct"], 50.0);
    assert_eq!(json["current_file"], "-");
    assert_eq!(json["current_page"], "-");
    assert_eq!(json["eta"], "0m00s");
    assert_eq!(json["recent_files"].as_array().unwrap().len(), 1);
    assert_eq!(json["recent_files"][0]["name"], "a");

    let updated = json["updated"].as_str().unwrap();
    assert!(chrono::NaiveDateTime::parse_from_str(updated, "%Y-%m-%d %H:%M:%S").is_ok());
    assert!(json["avg_per_file"].as_str().unwrap().ends_with('s'));
}

// ── Re-check and lookahead ───────────────────────────────────────────────────

/// Fast engine that finishes another document's output while it runs, the
/// way a second batch process would.
struct WritesElsewhere {
    target: PathBuf,
}

#[async_trait]
impl OcrEngine for WritesElsewhere {
    fn name(&self) -> &str {
        "writes-elsewhere"
    }

    fn tag(&self) -> EngineTag {
        EngineTag::Fast
    }

    async fn recognize(&self, _image: &DynamicImage) -> Result<String, BatchOcrError> {
        std::fs::write(&self.target, "finished by another run").unwrap();
        Ok(good_vietnamese())
    }
}

#[tokio::test]
async fn files_finished_mid_batch_are_skipped() {
    let h = Harness::new();
    let files = vec![
        h.pdf("first.pdf", vec![FakePage::Image]),
        h.pdf("second.pdf", vec![FakePage::Text(native_text())]),
    ];

    let chain = EngineChain::fast_then_fallback(
        Arc::new(WritesElsewhere {
            target: h.output("second"),
        }),
        h.fallback.clone(),
        QualityGate::default(),
    );
    let processor = FileProcessor::new(h.source.clone(), Arc::new(chain), h.config());
    let summary = BatchRunner::new(processor, Arc::new(NoopProgressReporter))
        .run(&files)
        .await
        .unwrap();

    assert_eq!(summary.already_done, 0);
    assert_eq!(summary.processed, 1);
    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.done, 2);
    assert_eq!(h.read_output("first"), good_vietnamese());
    assert_eq!(h.read_output("second"), "finished by another run");
}

/// Fast engine recording how many pages had been rendered when each OCR
/// call started. It waits (bounded) for the next page's render so the
/// observation does not depend on thread scheduling.
struct RenderWatcher {
    source: Arc<FakeSource>,
    pages: usize,
    seen: Mutex<Vec<usize>>,
}

#[async_trait]
impl OcrEngine for RenderWatcher {
    fn name(&self) -> &str {
        "render-watcher"
    }

    fn tag(&self) -> EngineTag {
        EngineTag::Fast
    }

    async fn recognize(&self, _image: &DynamicImage) -> Result<String, BatchOcrError> {
        let page_idx = self.seen.lock().unwrap().len();
        let expected = (page_idx + 2).min(self.pages);
        for _ in 0..200 {
            if self.source.renders() >= expected {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        self.seen.lock().unwrap().push(self.source.renders());
        Ok(good_vietnamese())
    }
}

#[tokio::test]
async fn next_page_is_extracted_during_ocr_and_no_further() {
    let h = Harness::new();
    let pdf = h.pdf("four.pdf", vec![FakePage::Image; 4]);

    let watcher = Arc::new(RenderWatcher {
        source: h.source.clone(),
        pages: 4,
        seen: Mutex::new(Vec::new()),
    });
    let chain = EngineChain::fast_then_fallback(
        watcher.clone(),
        h.fallback.clone(),
        QualityGate::default(),
    );
    let processor = FileProcessor::new(h.source.clone(), Arc::new(chain), h.config());
    processor.process(&pdf, &mut NoopPageObserver).await.unwrap();

    assert_eq!(*watcher.seen.lock().unwrap(), vec![2, 3, 4, 4]);
    assert_eq!(h.fallback.calls(), 0);
}
