//! Image preparation for the vision fallback: downscale, then base64 PNG.
//!
//! Vision models bill and slow down per image tile, and the pages that reach
//! the fallback are already cropped to their content. Capping the pixel
//! count keeps per-page latency predictable without losing legibility.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use image::imageops::FilterType;
use image::DynamicImage;
use std::borrow::Cow;
use std::io::Cursor;
use tracing::debug;

/// Shrink `img` so that `width * height <= max_pixels`, keeping its aspect
/// ratio. Images already within budget are borrowed unchanged.
pub fn fit_to_pixel_budget(img: &DynamicImage, max_pixels: u32) -> Cow<'_, DynamicImage> {
    let (w, h) = (img.width() as u64, img.height() as u64);
    let area = w * h;
    if area == 0 || area <= max_pixels as u64 {
        return Cow::Borrowed(img);
    }

    let factor = (max_pixels as f64 / area as f64).sqrt();
    let new_w = ((w as f64 * factor).floor() as u32).max(1);
    let new_h = ((h as f64 * factor).floor() as u32).max(1);
    debug!("Downscaling {}x{} → {}x{} for vision model", w, h, new_w, new_h);

    Cow::Owned(img.resize_exact(new_w, new_h, FilterType::Lanczos3))
}

/// Encode a page image as a base64 PNG ready for the VLM API.
///
/// ## Why PNG?
/// Lossless compression preserves text crispness. JPEG artefacts on small
/// diacritics are enough to turn `ế` into `e`.
///
/// ## Why `detail: "high"`?
/// OpenAI-style tiling otherwise reduces the page to a single 512 px
/// overview tile and loses all fine structure.
pub fn encode_page(img: &DynamicImage) -> Result<ImageData, image::ImageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;

    let b64 = STANDARD.encode(&buf);
    debug!("Encoded image → {} bytes base64", b64.len());

    Ok(ImageData::new(b64, "image/png").with_detail("high"))
}
