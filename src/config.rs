//! Configuration for a batch OCR run.
//!
//! Every knob lives in [`BatchConfig`], built via [`BatchConfigBuilder`].
//! The page-routing thresholds (native text threshold, quality gate) are
//! empirically tuned; they are exposed here rather than hard-coded so a
//! batch in another language can retune them, but the defaults must stay
//! exactly as they are for behavioural compatibility with earlier runs.

use crate::error::BatchOcrError;
use crate::pipeline::engine::QualityGate;
use crate::pipeline::extract::ExtractPolicy;
use edgequake_llm::LLMProvider;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Configuration for a batch OCR run.
///
/// # Example
/// ```rust
/// use edgequake_batch_ocr::BatchConfig;
///
/// let config = BatchConfig::builder()
///     .data_dir("data")
///     .output_dir("output/ocr-raw")
///     .tesseract_lang("vie")
///     .build()
///     .unwrap();
/// assert_eq!(config.native_text_threshold, 50);
/// ```
#[derive(Clone)]
pub struct BatchConfig {
    /// Root the input paths are relative to; output names are derived from
    /// the path below this directory. Default: `data`.
    pub data_dir: PathBuf,

    /// Classification artifact listing files per category.
    /// Default: `data/classification.json`.
    pub classification_path: PathBuf,

    /// Categories whose files form the batch, in order. Default: `scanned`, `mixed`.
    pub categories: Vec<String>,

    /// Directory receiving one `.md` file per document. Default: `output/ocr-raw`.
    pub output_dir: PathBuf,

    /// JSON status artifact overwritten after every unit of progress.
    /// Default: `output/ocr-progress.json`.
    pub status_file: PathBuf,

    /// Minimum alphabetic characters in the text layer for a page to skip
    /// rendering entirely. Default: 50.
    pub native_text_threshold: usize,

    /// The shorter side of a rendered page is scaled to at least this many
    /// pixels. Default: 768.
    pub min_short_side_px: u32,

    /// Rendering never goes below this DPI. Default: 150.
    pub min_dpi: u32,

    /// Pixels kept around the detected content box when cropping. Default: 20.
    pub crop_padding: u32,

    /// Grayscale difference from white above which a pixel counts as
    /// content. Default: 10.
    pub crop_threshold: u8,

    /// Acceptance rule for fast-engine output.
    pub quality_gate: QualityGate,

    /// tesseract executable. Default: `tesseract`.
    pub tesseract_cmd: String,

    /// tesseract language pack. Default: `vie`.
    pub tesseract_lang: String,

    /// Vision model identifier for the fallback engine. If None, uses provider default.
    pub model: Option<String>,

    /// LLM provider name (e.g. "openai", "ollama").
    /// If None along with `provider`, the provider is auto-detected from the environment.
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Instruction sent with every fallback image. If None, uses
    /// [`crate::prompts::DEFAULT_OCR_PROMPT`].
    pub ocr_prompt: Option<String>,

    /// Maximum tokens the VLM may generate per page. Default: 8192.
    pub max_tokens: usize,

    /// Sampling temperature for the VLM. Default: 0.0.
    pub temperature: f32,

    /// Images sent to the VLM are downscaled to at most this many pixels.
    /// Default: 300 000.
    pub vision_max_pixels: u32,

    /// Length of the recent-files history in the status artifact. Default: 10.
    pub recent_history: usize,

    /// Engine buffers are reclaimed every this many pages. Default: 10.
    pub reclaim_every_pages: usize,

    /// Per-file duration assumed for the ETA before any file has finished.
    /// Default: 60.
    pub initial_file_estimate_secs: f64,

    /// Explicit path to libpdfium. If None, the system library is used.
    pub pdfium_lib_path: Option<PathBuf>,

    /// PDF user password applied to every document.
    pub password: Option<String>,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            classification_path: PathBuf::from("data/classification.json"),
            categories: vec!["scanned".to_string(), "mixed".to_string()],
            output_dir: PathBuf::from("output/ocr-raw"),
            status_file: PathBuf::from("output/ocr-progress.json"),
            native_text_threshold: 50,
            min_short_side_px: 768,
            min_dpi: 150,
            crop_padding: 20,
            crop_threshold: 10,
            quality_gate: QualityGate::default(),
            tesseract_cmd: "tesseract".to_string(),
            tesseract_lang: "vie".to_string(),
            model: None,
            provider_name: None,
            provider: None,
            ocr_prompt: None,
            max_tokens: 8192,
            temperature: 0.0,
            vision_max_pixels: 300_000,
            recent_history: 10,
            reclaim_every_pages: 10,
            initial_file_estimate_secs: 60.0,
            pdfium_lib_path: None,
            password: None,
        }
    }
}

impl fmt::Debug for BatchConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchConfig")
            .field("data_dir", &self.data_dir)
            .field("classification_path", &self.classification_path)
            .field("categories", &self.categories)
            .field("output_dir", &self.output_dir)
            .field("status_file", &self.status_file)
            .field("native_text_threshold", &self.native_text_threshold)
            .field("min_short_side_px", &self.min_short_side_px)
            .field("min_dpi", &self.min_dpi)
            .field("crop_padding", &self.crop_padding)
            .field("crop_threshold", &self.crop_threshold)
            .field("quality_gate", &self.quality_gate)
            .field("tesseract_lang", &self.tesseract_lang)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("max_tokens", &self.max_tokens)
            .field("vision_max_pixels", &self.vision_max_pixels)
            .finish()
    }
}

impl BatchConfig {
    /// Create a new builder for `BatchConfig`.
    pub fn builder() -> BatchConfigBuilder {
        BatchConfigBuilder {
            config: Self::default(),
        }
    }

    /// The subset of settings the page extractor needs, detached from the
    /// config so it can move into the page worker.
    pub fn extract_policy(&self) -> ExtractPolicy {
        ExtractPolicy {
            native_text_threshold: self.native_text_threshold,
            min_short_side_px: self.min_short_side_px,
            min_dpi: self.min_dpi,
            crop_padding: self.crop_padding,
            crop_threshold: self.crop_threshold,
        }
    }
}

/// Builder for [`BatchConfig`].
#[derive(Debug)]
pub struct BatchConfigBuilder {
    config: BatchConfig,
}

impl BatchConfigBuilder {
    pub fn data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.data_dir = dir.into();
        self
    }

    pub fn classification_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.classification_path = path.into();
        self
    }

    pub fn categories<I, S>(mut self, categories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.categories = categories.into_iter().map(Into::into).collect();
        self
    }

    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.output_dir = dir.into();
        self
    }

    pub fn status_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.status_file = path.into();
        self
    }

    pub fn native_text_threshold(mut self, n: usize) -> Self {
        self.config.native_text_threshold = n;
        self
    }

    pub fn min_short_side_px(mut self, px: u32) -> Self {
        self.config.min_short_side_px = px;
        self
    }

    pub fn min_dpi(mut self, dpi: u32) -> Self {
        self.config.min_dpi = dpi.clamp(72, 600);
        self
    }

    pub fn crop_padding(mut self, px: u32) -> Self {
        self.config.crop_padding = px;
        self
    }

    pub fn crop_threshold(mut self, t: u8) -> Self {
        self.config.crop_threshold = t;
        self
    }

    pub fn quality_gate(mut self, gate: QualityGate) -> Self {
        self.config.quality_gate = gate;
        self
    }

    pub fn tesseract_cmd(mut self, cmd: impl Into<String>) -> Self {
        self.config.tesseract_cmd = cmd.into();
        self
    }

    pub fn tesseract_lang(mut self, lang: impl Into<String>) -> Self {
        self.config.tesseract_lang = lang.into();
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn ocr_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.ocr_prompt = Some(prompt.into());
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn vision_max_pixels(mut self, px: u32) -> Self {
        self.config.vision_max_pixels = px;
        self
    }

    pub fn recent_history(mut self, n: usize) -> Self {
        self.config.recent_history = n;
        self
    }

    pub fn reclaim_every_pages(mut self, n: usize) -> Self {
        self.config.reclaim_every_pages = n;
        self
    }

    pub fn initial_file_estimate_secs(mut self, secs: f64) -> Self {
        self.config.initial_file_estimate_secs = secs;
        self
    }

    pub fn pdfium_lib_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.pdfium_lib_path = Some(path.into());
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<BatchConfig, BatchOcrError> {
        let c = &self.config;
        if c.categories.is_empty() {
            return Err(BatchOcrError::InvalidConfig(
                "At least one classification category is required".into(),
            ));
        }
        if c.min_short_side_px == 0 {
            return Err(BatchOcrError::InvalidConfig(
                "min_short_side_px must be ≥ 1".into(),
            ));
        }
        let ratio = c.quality_gate.min_diacritic_ratio;
        if !(0.0..=1.0).contains(&ratio) {
            return Err(BatchOcrError::InvalidConfig(format!(
                "Diacritic ratio must be within 0.0–1.0, got {}",
                ratio
            )));
        }
        if c.vision_max_pixels < 1024 {
            return Err(BatchOcrError::InvalidConfig(format!(
                "vision_max_pixels must be ≥ 1024, got {}",
                c.vision_max_pixels
            )));
        }
        if c.recent_history == 0 {
            return Err(BatchOcrError::InvalidConfig(
                "recent_history must be ≥ 1".into(),
            ));
        }
        if c.reclaim_every_pages == 0 {
            return Err(BatchOcrError::InvalidConfig(
                "reclaim_every_pages must be ≥ 1".into(),
            ));
        }
        if c.initial_file_estimate_secs < 0.0 {
            return Err(BatchOcrError::InvalidConfig(
                "initial_file_estimate_secs must not be negative".into(),
            ));
        }
        Ok(self.config)
    }
}
