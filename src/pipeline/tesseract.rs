//! Fast OCR through the `tesseract` command-line tool.
//!
//! The page image is written to a temporary PNG and handed to
//! `tesseract <png> stdout -l <lang>`. Spawning a process per page costs a
//! few milliseconds, which is noise next to recognition time, and keeps the
//! build free of libtesseract bindings.

use crate::error::BatchOcrError;
use crate::output::EngineTag;
use crate::pipeline::engine::OcrEngine;
use async_trait::async_trait;
use image::DynamicImage;
use tempfile::NamedTempFile;
use tokio::process::Command;
use tracing::debug;

pub struct TesseractEngine {
    command: String,
    lang: String,
}

impl TesseractEngine {
    pub fn new(command: impl Into<String>, lang: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            lang: lang.into(),
        }
    }

    pub fn lang(&self) -> &str {
        &self.lang
    }
}

#[async_trait]
impl OcrEngine for TesseractEngine {
    fn name(&self) -> &str {
        "tesseract"
    }

    fn tag(&self) -> EngineTag {
        EngineTag::Fast
    }

    async fn recognize(&self, image: &DynamicImage) -> Result<String, BatchOcrError> {
        let image = image.clone();
        let tmp = tokio::task::spawn_blocking(move || write_temp_png(&image))
            .await
            .map_err(|e| BatchOcrError::Internal(format!("PNG encode task panicked: {}", e)))??;

        let output = Command::new(&self.command)
            .arg(tmp.path())
            .arg("stdout")
            .arg("-l")
            .arg(&self.lang)
            .output()
            .await
            .map_err(|e| BatchOcrError::FastOcrFailed {
                detail: format!("cannot run '{}': {}", self.command, e),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(BatchOcrError::FastOcrFailed {
                detail: format!("'{}' exited with {}: {}", self.command, output.status, stderr.trim()),
            });
        }

        let text = clean_output(&String::from_utf8_lossy(&output.stdout));
        debug!("tesseract returned {} chars", text.chars().count());
        Ok(text)
    }
}

/// Encode `image` into a fresh temporary PNG, deleted when the handle drops.
fn write_temp_png(image: &DynamicImage) -> Result<NamedTempFile, BatchOcrError> {
    let tmp = tempfile::Builder::new()
        .prefix("batch-ocr-page-")
        .suffix(".png")
        .tempfile()
        .map_err(|e| BatchOcrError::FastOcrFailed {
            detail: format!("cannot create temp image: {}", e),
        })?;

    image
        .save_with_format(tmp.path(), image::ImageFormat::Png)
        .map_err(|e| BatchOcrError::FastOcrFailed {
            detail: format!("cannot write temp image: {}", e),
        })?;
    Ok(tmp)
}

/// Drop the form feed tesseract appends after each page.
fn clean_output(raw: &str) -> String {
    raw.replace('\x0c', "")
}
