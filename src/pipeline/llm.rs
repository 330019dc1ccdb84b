//! Vision Language Model fallback engine.
//!
//! Pages land here only after the fast engine's output failed the quality
//! gate. Whatever the model returns is kept verbatim: the chain has nowhere
//! else to go, and a partial transcription beats an empty page.
//!
//! ## Lazy provider
//!
//! Many batches never need the fallback (clean scans pass the gate), so
//! the provider is resolved on first use rather than at startup. A missing
//! API key is then only an error for batches that actually hit a bad page.

use crate::config::BatchConfig;
use crate::error::BatchOcrError;
use crate::output::EngineTag;
use crate::pipeline::encode::{encode_page, fit_to_pixel_budget};
use crate::pipeline::engine::OcrEngine;
use crate::prompts::DEFAULT_OCR_PROMPT;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider, ProviderFactory};
use image::DynamicImage;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::OnceCell;
use tracing::{debug, info};

const DEFAULT_VISION_MODEL: &str = "gpt-4.1-nano";

/// OCR by prompting a vision model with the page image.
pub struct VisionFallbackEngine {
    preset: Option<Arc<dyn LLMProvider>>,
    provider_name: Option<String>,
    model: Option<String>,
    prompt: String,
    max_tokens: usize,
    temperature: f32,
    max_pixels: u32,
    provider: OnceCell<Arc<dyn LLMProvider>>,
}

impl VisionFallbackEngine {
    pub fn from_config(config: &BatchConfig) -> Self {
        Self {
            preset: config.provider.clone(),
            provider_name: config.provider_name.clone(),
            model: config.model.clone(),
            prompt: config
                .ocr_prompt
                .clone()
                .unwrap_or_else(|| DEFAULT_OCR_PROMPT.to_string()),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            max_pixels: config.vision_max_pixels,
            provider: OnceCell::new(),
        }
    }

    /// True once the provider has been resolved.
    pub fn is_loaded(&self) -> bool {
        self.provider.initialized()
    }

    async fn provider(&self) -> Result<&Arc<dyn LLMProvider>, BatchOcrError> {
        self.provider
            .get_or_try_init(|| async {
                let started = Instant::now();
                info!(
                    "Loading vision model {}...",
                    self.model.as_deref().unwrap_or("(provider default)")
                );
                let provider = self.resolve_provider()?;
                info!("Model ready in {:.1}s", started.elapsed().as_secs_f64());
                Ok::<_, BatchOcrError>(provider)
            })
            .await
    }

    /// Resolve the LLM provider, from most-specific to least-specific.
    ///
    /// 1. **Pre-built provider** (`config.provider`), used as-is.
    /// 2. **Named provider** (`config.provider_name`) plus optional model.
    /// 3. **Environment pair** `EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`.
    /// 4. **OpenAI key** present → OpenAI; otherwise full auto-detection.
    fn resolve_provider(&self) -> Result<Arc<dyn LLMProvider>, BatchOcrError> {
        if let Some(ref provider) = self.preset {
            return Ok(Arc::clone(provider));
        }

        let model = self.model.as_deref().unwrap_or(DEFAULT_VISION_MODEL);

        if let Some(ref name) = self.provider_name {
            return create_vision_provider(name, model);
        }

        if let (Ok(prov), Ok(env_model)) = (
            std::env::var("EDGEQUAKE_LLM_PROVIDER"),
            std::env::var("EDGEQUAKE_MODEL"),
        ) {
            if !prov.is_empty() && !env_model.is_empty() {
                return create_vision_provider(&prov, &env_model);
            }
        }

        if let Ok(openai_key) = std::env::var("OPENAI_API_KEY") {
            if !openai_key.is_empty() {
                return create_vision_provider("openai", model);
            }
        }

        let (llm_provider, _embedding) =
            ProviderFactory::from_env().map_err(|e| BatchOcrError::ProviderNotConfigured {
                provider: "auto".to_string(),
                hint: format!(
                    "No LLM provider could be auto-detected from environment.\n\
                    Set OPENAI_API_KEY, or EDGEQUAKE_LLM_PROVIDER and EDGEQUAKE_MODEL.\n\
                    Error: {}",
                    e
                ),
            })?;

        Ok(llm_provider)
    }
}

fn create_vision_provider(
    provider_name: &str,
    model: &str,
) -> Result<Arc<dyn LLMProvider>, BatchOcrError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        BatchOcrError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

/// Downscale and base64-encode off the async runtime; a full-resolution
/// page takes tens of milliseconds to compress.
async fn prepare_image(image: DynamicImage, max_pixels: u32) -> Result<ImageData, BatchOcrError> {
    tokio::task::spawn_blocking(move || {
        let fitted = fit_to_pixel_budget(&image, max_pixels);
        encode_page(&fitted)
    })
    .await
    .map_err(|e| BatchOcrError::Internal(format!("Image encode task panicked: {}", e)))?
    .map_err(|e| BatchOcrError::LlmApiError {
        message: format!("image encoding failed: {}", e),
    })
}

fn build_options(max_tokens: usize, temperature: f32) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(temperature),
        max_tokens: Some(max_tokens),
        ..Default::default()
    }
}

#[async_trait]
impl OcrEngine for VisionFallbackEngine {
    fn name(&self) -> &str {
        "vision"
    }

    fn tag(&self) -> EngineTag {
        EngineTag::Fallback
    }

    async fn recognize(&self, image: &DynamicImage) -> Result<String, BatchOcrError> {
        let provider = self.provider().await?;

        let image_data = prepare_image(image.clone(), self.max_pixels).await?;

        let messages = vec![ChatMessage::user_with_images(
            self.prompt.as_str(),
            vec![image_data],
        )];
        let options = build_options(self.max_tokens, self.temperature);

        let response = provider
            .chat(&messages, Some(&options))
            .await
            .map_err(|e| BatchOcrError::LlmApiError {
                message: format!("{}", e),
            })?;

        debug!(
            "vision: {} input tokens, {} output tokens",
            response.prompt_tokens, response.completion_tokens
        );
        Ok(response.content)
    }
}
