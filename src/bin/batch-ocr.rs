//! CLI binary for edgequake-batch-ocr.
//!
//! A thin shim over the library crate that maps CLI flags to `BatchConfig`,
//! wires logging to stderr and an append-only log file, and runs the batch.

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_batch_ocr::{
    load_batch_list, BatchConfig, BatchRunner, EngineChain, FanoutReporter, FileProcessor,
    PdfiumSource, ProgressReporter, ProgressSnapshot, QualityGate, StatusFileReporter,
    TesseractEngine, VisionFallbackEngine,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::fs::OpenOptions;
use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::info;
use tracing_subscriber::fmt::time::ChronoLocal;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

// ── CLI progress reporter using indicatif ────────────────────────────────────

/// Terminal progress bar fed from the same snapshots as the status file.
struct CliProgressReporter {
    bar: ProgressBar,
}

impl CliProgressReporter {
    fn new() -> Self {
        let bar = ProgressBar::new(0);
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>4}/{len} files  \
             ⏱ {elapsed_precise}  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        bar.set_style(style);
        bar.set_prefix("OCR");
        bar.enable_steady_tick(Duration::from_millis(80));
        Self { bar }
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl ProgressReporter for CliProgressReporter {
    fn report(&self, s: &ProgressSnapshot) {
        self.bar.set_length(s.total as u64);
        self.bar.set_position((s.done + s.errors) as u64);

        let current = if s.current_file == "-" {
            String::new()
        } else {
            format!("{} p{}  ", s.current_file, s.current_page)
        };
        self.bar.set_message(format!(
            "{}ETA {}  errors {}",
            current, s.eta, s.errors
        ));
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # OCR every scanned and mixed PDF listed in data/classification.json
  batch-ocr

  # Resume after a crash: finished documents are skipped automatically
  batch-ocr

  # Another data layout and only the scanned category
  batch-ocr --data-dir corpus --classification corpus/classes.json --category scanned

  # Vision fallback through a local Ollama model
  batch-ocr --provider ollama --model llama3.2-vision

OUTPUTS:
  <output-base>/<name>.md     one Markdown file per PDF (name = path below data dir, '/' → '--')
  <status-file>               JSON progress snapshot, rewritten per page and per file
  <log-file>                  append-only run log

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key for the vision fallback
  EDGEQUAKE_LLM_PROVIDER  Provider used when --provider is not given
  EDGEQUAKE_MODEL         Vision model ID
  RUST_LOG                Overrides the log filter (e.g. edgequake_batch_ocr=debug)
"#;

/// Batch OCR of classified PDFs to Markdown.
#[derive(Parser, Debug)]
#[command(
    name = "batch-ocr",
    version,
    about = "Resumable batch OCR of PDFs to Markdown (text layer → tesseract → vision model)",
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Root directory the input paths live under.
    #[arg(long, env = "BATCH_OCR_DATA_DIR", default_value = "data")]
    data_dir: PathBuf,

    /// Classification JSON listing files per category.
    #[arg(long, env = "BATCH_OCR_CLASSIFICATION", default_value = "data/classification.json")]
    classification: PathBuf,

    /// Categories to process, in order.
    #[arg(
        long = "category",
        env = "BATCH_OCR_CATEGORIES",
        value_delimiter = ',',
        default_values_t = ["scanned".to_string(), "mixed".to_string()]
    )]
    categories: Vec<String>,

    /// Directory receiving the Markdown files.
    #[arg(long, env = "BATCH_OCR_OUTPUT_BASE", default_value = "output/ocr-raw")]
    output_base: PathBuf,

    /// JSON status file.
    #[arg(long, env = "BATCH_OCR_STATUS_FILE", default_value = "output/ocr-progress.json")]
    status_file: PathBuf,

    /// Append-only log file.
    #[arg(long, env = "BATCH_OCR_LOG_FILE", default_value = "output/ocr-log.txt")]
    log_file: PathBuf,

    /// tesseract language pack.
    #[arg(long, env = "BATCH_OCR_LANG", default_value = "vie")]
    lang: String,

    /// tesseract executable.
    #[arg(long, env = "BATCH_OCR_TESSERACT", default_value = "tesseract")]
    tesseract: String,

    /// Vision model ID for the fallback engine.
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// Vision provider: openai, anthropic, gemini, ollama, azure.
    #[arg(long, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    /// Path to a text file replacing the default OCR prompt.
    #[arg(long, env = "BATCH_OCR_PROMPT_FILE")]
    prompt_file: Option<PathBuf>,

    /// Max tokens the vision model may generate per page.
    #[arg(long, env = "BATCH_OCR_MAX_TOKENS", default_value_t = 8192)]
    max_tokens: usize,

    /// Vision model temperature (0.0–2.0).
    #[arg(long, env = "BATCH_OCR_TEMPERATURE", default_value_t = 0.0)]
    temperature: f32,

    /// Pages with at least this many letters in their text layer skip OCR.
    #[arg(long, env = "BATCH_OCR_NATIVE_THRESHOLD", default_value_t = 50)]
    native_threshold: usize,

    /// Minimum letters in tesseract output for it to be accepted.
    #[arg(long, env = "BATCH_OCR_MIN_CHARS", default_value_t = 50)]
    min_chars: usize,

    /// Minimum share of diacritic letters in tesseract output (0.0–1.0).
    #[arg(long, env = "BATCH_OCR_MIN_DIACRITICS_RATIO", default_value_t = 0.15)]
    min_diacritics_ratio: f64,

    /// Rendered pages are scaled so their short side reaches this many pixels.
    #[arg(long, env = "BATCH_OCR_MIN_SHORT_SIDE", default_value_t = 768)]
    min_short_side: u32,

    /// Rendering never drops below this DPI (72–600).
    #[arg(long, env = "BATCH_OCR_MIN_DPI", default_value_t = 150,
          value_parser = clap::value_parser!(u32).range(72..=600))]
    min_dpi: u32,

    /// Margin kept around the detected content when cropping rendered pages.
    #[arg(long, env = "BATCH_OCR_CROP_PADDING", default_value_t = 20)]
    crop_padding: u32,

    /// Grey-level difference from white that counts as content when cropping.
    #[arg(long, env = "BATCH_OCR_CROP_THRESHOLD", default_value_t = 10)]
    crop_threshold: u8,

    /// Pixel budget for page images sent to the vision model.
    #[arg(long, env = "BATCH_OCR_VISION_MAX_PIXELS", default_value_t = 300_000)]
    vision_max_pixels: u32,

    /// Completed files listed in the status file.
    #[arg(long, env = "BATCH_OCR_RECENT_HISTORY", default_value_t = 10)]
    recent_history: usize,

    /// Release engine buffers after this many pages.
    #[arg(long, env = "BATCH_OCR_RECLAIM_EVERY", default_value_t = 10)]
    reclaim_every: usize,

    /// Path to libpdfium. Defaults to the system library.
    #[arg(long, env = "BATCH_OCR_PDFIUM_LIB")]
    pdfium_lib: Option<PathBuf>,

    /// PDF user password applied to every document.
    #[arg(long, env = "BATCH_OCR_PASSWORD")]
    password: Option<String>,

    /// Disable the progress bar.
    #[arg(long, env = "BATCH_OCR_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "BATCH_OCR_VERBOSE")]
    verbose: bool,

    /// Suppress all terminal output except errors (the log file is unaffected).
    #[arg(short, long, env = "BATCH_OCR_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let show_progress = !cli.quiet && !cli.no_progress;

    init_logging(&cli, show_progress)?;
    info!("=== Batch OCR Start ===");

    let config = build_config(&cli).await?;

    let files = load_batch_list(&config.classification_path, &config.categories)
        .context("Failed to load the batch list")?;

    let source = Arc::new(
        PdfiumSource::bind(config.pdfium_lib_path.as_deref(), config.password.clone())
            .context("Failed to initialise pdfium")?,
    );

    let chain = Arc::new(EngineChain::fast_then_fallback(
        Arc::new(TesseractEngine::new(
            config.tesseract_cmd.clone(),
            config.tesseract_lang.clone(),
        )),
        Arc::new(VisionFallbackEngine::from_config(&config)),
        config.quality_gate.clone(),
    ));

    let bar = show_progress.then(|| Arc::new(CliProgressReporter::new()));
    let mut reporters: Vec<Arc<dyn ProgressReporter>> =
        vec![Arc::new(StatusFileReporter::new(config.status_file.clone()))];
    if let Some(ref bar) = bar {
        reporters.push(Arc::clone(bar) as Arc<dyn ProgressReporter>);
    }

    let runner = BatchRunner::new(
        FileProcessor::new(source, chain, config),
        Arc::new(FanoutReporter(reporters)),
    );
    let summary = runner.run(&files).await.context("Batch OCR failed")?;

    if let Some(bar) = bar {
        bar.finish();
    }
    if !cli.quiet {
        eprintln!(
            "Done {}/{}  errors {}  (native {}, fast {}, fallback {} pages)",
            summary.done,
            summary.total,
            summary.errors,
            summary.tag_counts.native,
            summary.tag_counts.fast,
            summary.tag_counts.fallback,
        );
    }
    info!("=== OCR DONE ===");
    Ok(())
}

/// stderr plus an ANSI-free append-only log file, both timestamped in
/// local time. The progress bar owns stderr unless it is disabled.
fn init_logging(cli: &Cli, show_progress: bool) -> Result<()> {
    let terminal_level = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };
    let file_level = if cli.verbose { "debug" } else { "info" };

    if let Some(parent) = cli.log_file.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create log directory {:?}", parent))?;
        }
    }
    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&cli.log_file)
        .with_context(|| format!("Failed to open log file {:?}", cli.log_file))?;

    let timer = ChronoLocal::new("%Y-%m-%d %H:%M:%S".to_string());
    let filter = |level: &str| EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let terminal = tracing_subscriber::fmt::layer()
        .with_writer(io::stderr)
        .with_timer(timer.clone())
        .with_target(false)
        .with_filter(filter(terminal_level));

    let file = tracing_subscriber::fmt::layer()
        .with_writer(Mutex::new(log_file))
        .with_ansi(false)
        .with_timer(timer)
        .with_target(false)
        .with_filter(filter(file_level));

    tracing_subscriber::registry().with(terminal).with(file).init();
    Ok(())
}

/// Map CLI args to `BatchConfig`.
async fn build_config(cli: &Cli) -> Result<BatchConfig> {
    let mut builder = BatchConfig::builder()
        .data_dir(&cli.data_dir)
        .classification_path(&cli.classification)
        .categories(cli.categories.clone())
        .output_dir(&cli.output_base)
        .status_file(&cli.status_file)
        .tesseract_cmd(&cli.tesseract)
        .tesseract_lang(&cli.lang)
        .max_tokens(cli.max_tokens)
        .temperature(cli.temperature)
        .native_text_threshold(cli.native_threshold)
        .min_short_side_px(cli.min_short_side)
        .min_dpi(cli.min_dpi)
        .crop_padding(cli.crop_padding)
        .crop_threshold(cli.crop_threshold)
        .vision_max_pixels(cli.vision_max_pixels)
        .recent_history(cli.recent_history)
        .reclaim_every_pages(cli.reclaim_every)
        .quality_gate(QualityGate {
            min_alpha_chars: cli.min_chars,
            min_diacritic_ratio: cli.min_diacritics_ratio,
            ..Default::default()
        });

    if let Some(ref model) = cli.model {
        builder = builder.model(model);
    }
    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider);
    }
    if let Some(ref path) = cli.prompt_file {
        let prompt = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read OCR prompt from {:?}", path))?;
        builder = builder.ocr_prompt(prompt.trim());
    }
    if let Some(ref path) = cli.pdfium_lib {
        builder = builder.pdfium_lib_path(path);
    }
    if let Some(ref password) = cli.password {
        builder = builder.password(password);
    }

    builder.build().context("Invalid configuration")
}
