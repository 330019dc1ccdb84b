//! OCR engines and the ordered chain that picks between them.
//!
//! A page that has no usable text layer is offered to each engine in turn.
//! The first stage whose output passes that stage's [`Acceptance`] rule
//! wins. The stock chain is a fast local engine guarded by a
//! [`QualityGate`] followed by a vision model that is always accepted.
//!
//! ## The quality gate
//!
//! Fast engines fail quietly on degraded Vietnamese scans: they return
//! plausible Latin text with the tone marks stripped. Counting how many of
//! the alphabetic characters carry a Vietnamese diacritic catches that. Real
//! Vietnamese prose sits well above 15 %; output stripped of its marks sits
//! near zero.

use crate::error::BatchOcrError;
use crate::output::EngineTag;
use async_trait::async_trait;
use image::DynamicImage;
use once_cell::sync::Lazy;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

/// Lowercase and uppercase Vietnamese letters that carry a diacritic.
pub const VIETNAMESE_DIACRITICS: &str = concat!(
    "àáảãạăắằẳẵặâấầẩẫậèéẻẽẹêếềểễệìíỉĩịòóỏõọôốồổỗộơớờởỡợùúủũụưứừửữựỳýỷỹỵđ",
    "ÀÁẢÃẠĂẮẰẲẴẶÂẤẦẨẪẬÈÉẺẼẸÊẾỀỂỄỆÌÍỈĨỊÒÓỎÕỌÔỐỒỔỖỘƠỚỜỞỠỢÙÚỦŨỤƯỨỪỬỮỰỲÝỶỸỴĐ",
);

static DEFAULT_DIACRITICS: Lazy<HashSet<char>> =
    Lazy::new(|| VIETNAMESE_DIACRITICS.chars().collect());

/// An OCR engine that turns a page image into text.
#[async_trait]
pub trait OcrEngine: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Tag recorded for pages this engine produced.
    fn tag(&self) -> EngineTag;

    async fn recognize(&self, image: &DynamicImage) -> Result<String, BatchOcrError>;

    /// Release transient resources (scratch buffers, cached allocations).
    /// Must not unload a model.
    ///
    /// The chain calls this every few pages and after every file. It is a
    /// hook for engines that keep buffers between calls (in-process models,
    /// pooled tensors); [`TesseractEngine`](crate::pipeline::tesseract::TesseractEngine)
    /// and [`VisionFallbackEngine`](crate::pipeline::llm::VisionFallbackEngine)
    /// hold nothing per page and keep the default no-op.
    fn reclaim(&self) {}
}

/// Acceptance rule for the fast engine.
#[derive(Debug, Clone)]
pub struct QualityGate {
    /// Minimum alphabetic characters. Default: 50.
    pub min_alpha_chars: usize,
    /// Minimum share of alphabetic characters carrying a diacritic. Default: 0.15.
    pub min_diacritic_ratio: f64,
    /// Characters counted as diacritic-bearing. Default: [`VIETNAMESE_DIACRITICS`].
    pub diacritics: HashSet<char>,
}

impl Default for QualityGate {
    fn default() -> Self {
        Self {
            min_alpha_chars: 50,
            min_diacritic_ratio: 0.15,
            diacritics: DEFAULT_DIACRITICS.clone(),
        }
    }
}

/// Counts behind a gate decision, for logging and tests.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GateVerdict {
    pub alpha: usize,
    pub diacritics: usize,
    pub ratio: f64,
    pub passed: bool,
}

impl QualityGate {
    /// Replace the diacritic set, e.g. for another language.
    pub fn with_diacritics(mut self, chars: &str) -> Self {
        self.diacritics = chars.chars().collect();
        self
    }

    pub fn evaluate(&self, text: &str) -> GateVerdict {
        let mut alpha = 0usize;
        let mut diacritics = 0usize;
        for c in text.chars() {
            if c.is_alphabetic() {
                alpha += 1;
                if self.diacritics.contains(&c) {
                    diacritics += 1;
                }
            }
        }

        if alpha < self.min_alpha_chars {
            return GateVerdict {
                alpha,
                diacritics,
                ratio: 0.0,
                passed: false,
            };
        }

        let ratio = diacritics as f64 / alpha as f64;
        GateVerdict {
            alpha,
            diacritics,
            ratio,
            passed: ratio >= self.min_diacritic_ratio,
        }
    }

    pub fn passes(&self, text: &str) -> bool {
        self.evaluate(text).passed
    }
}

/// How a chain stage decides whether to keep its engine's output.
#[derive(Debug, Clone)]
pub enum Acceptance {
    /// Keep whatever the engine returned, even an empty string.
    Always,
    QualityGate(QualityGate),
    /// Keep output at least this many characters long once trimmed.
    MinChars(usize),
}

impl Acceptance {
    pub fn accepts(&self, text: &str) -> bool {
        match self {
            Acceptance::Always => true,
            Acceptance::QualityGate(gate) => gate.passes(text),
            Acceptance::MinChars(n) => text.trim().chars().count() >= *n,
        }
    }
}

/// One engine plus the rule that decides whether its output is kept.
#[derive(Clone)]
pub struct EngineStage {
    pub engine: Arc<dyn OcrEngine>,
    pub acceptance: Acceptance,
}

/// The winning stage's output for a page.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineOutcome {
    pub tag: EngineTag,
    pub text: String,
}

/// Ordered list of engine stages.
#[derive(Clone)]
pub struct EngineChain {
    stages: Vec<EngineStage>,
}

impl EngineChain {
    pub fn new(stages: Vec<EngineStage>) -> Result<Self, BatchOcrError> {
        if stages.is_empty() {
            return Err(BatchOcrError::InvalidConfig(
                "engine chain needs at least one stage".into(),
            ));
        }
        Ok(Self { stages })
    }

    /// The standard two-stage chain: `fast` behind `gate`, then `fallback`
    /// accepted unconditionally.
    pub fn fast_then_fallback(
        fast: Arc<dyn OcrEngine>,
        fallback: Arc<dyn OcrEngine>,
        gate: QualityGate,
    ) -> Self {
        Self {
            stages: vec![
                EngineStage {
                    engine: fast,
                    acceptance: Acceptance::QualityGate(gate),
                },
                EngineStage {
                    engine: fallback,
                    acceptance: Acceptance::Always,
                },
            ],
        }
    }

    pub fn stages(&self) -> &[EngineStage] {
        &self.stages
    }

    /// Run stages in order until one is accepted.
    ///
    /// An engine error aborts the page; a rejected result moves on to the
    /// next stage.
    pub async fn select(&self, image: &DynamicImage) -> Result<EngineOutcome, BatchOcrError> {
        for stage in &self.stages {
            let text = stage.engine.recognize(image).await?;
            if stage.acceptance.accepts(&text) {
                return Ok(EngineOutcome {
                    tag: stage.engine.tag(),
                    text,
                });
            }
            debug!(
                "{} output rejected ({} chars), trying next engine",
                stage.engine.name(),
                text.chars().count()
            );
        }

        Err(BatchOcrError::NoEngineAccepted {
            engines: self
                .stages
                .iter()
                .map(|s| s.engine.name().to_string())
                .collect::<Vec<_>>()
                .join(", "),
        })
    }

    /// Ask every engine to release transient resources.
    pub fn reclaim(&self) {
        for stage in &self.stages {
            stage.engine.reclaim();
        }
    }
}
