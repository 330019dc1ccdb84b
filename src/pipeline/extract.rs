//! Page extraction: text layer if it is good enough, a cropped raster otherwise.
//!
//! ## Why check the text layer first?
//!
//! Mixed batches contain plenty of born-digital pages. Reading their text
//! layer takes microseconds, while rendering plus OCR takes seconds, so any
//! page with enough embedded alphabetic text never reaches an OCR engine.
//!
//! ## Why a minimum short side instead of a fixed DPI?
//!
//! Source pages range from receipts to A0 plans. Scaling so the shorter
//! side reaches `min_short_side_px` (floored at `min_dpi`) hands every
//! engine roughly the same working resolution regardless of physical size.
//!
//! ## Why crop?
//!
//! Scans carry wide white margins. Cropping to the content box shrinks the
//! image the engines have to process and, for the VLM, leaves more of the
//! pixel budget for actual text.

use crate::error::BatchOcrError;
use crate::pipeline::document::Document;
use image::{imageops, DynamicImage, RgbImage};
use serde::{Deserialize, Serialize};

/// Thresholds used by [`extract`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractPolicy {
    pub native_text_threshold: usize,
    pub min_short_side_px: u32,
    pub min_dpi: u32,
    pub crop_padding: u32,
    pub crop_threshold: u8,
}

impl Default for ExtractPolicy {
    fn default() -> Self {
        Self {
            native_text_threshold: 50,
            min_short_side_px: 768,
            min_dpi: 150,
            crop_padding: 20,
            crop_threshold: 10,
        }
    }
}

/// Padded content rectangle, in pixels of the full render.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// What the extractor produced for one page. Exactly one variant per page.
#[derive(Debug, Clone)]
pub enum PageUnit {
    /// Trimmed embedded text; the page was never rendered.
    NativeText(String),
    /// Rendered page cropped to `bounds`; `bounds` is `None` for a blank page
    /// returned uncropped.
    RenderedImage {
        image: DynamicImage,
        bounds: Option<ContentBox>,
    },
}

/// Count characters that are alphabetic in any script.
pub fn count_alphabetic(text: &str) -> usize {
    text.chars().filter(|c| c.is_alphabetic()).count()
}

/// Extract one page.
///
/// Text-layer pages short-circuit before flattening or rendering. Errors
/// from the document propagate unchanged.
pub fn extract(
    doc: &mut (dyn Document + '_),
    page_idx: usize,
    policy: &ExtractPolicy,
) -> Result<PageUnit, BatchOcrError> {
    let text = doc.page_text(page_idx)?;
    if count_alphabetic(&text) >= policy.native_text_threshold {
        return Ok(PageUnit::NativeText(text.trim().to_string()));
    }
    drop(text);

    let (width_pt, height_pt) = doc.page_size(page_idx)?;
    let scale = render_scale(width_pt, height_pt, policy);

    doc.flatten_page(page_idx)?;
    let rendered = doc.render_page(page_idx, scale)?;

    let (image, bounds) = crop_to_content(rendered.into_rgb8(), policy);
    Ok(PageUnit::RenderedImage {
        image: DynamicImage::ImageRgb8(image),
        bounds,
    })
}

/// Pixels-per-point factor for a page of the given size in points.
pub fn render_scale(width_pt: f32, height_pt: f32, policy: &ExtractPolicy) -> f32 {
    let min_dpi = policy.min_dpi as f32;
    let short_side = width_pt.min(height_pt);
    let dpi = if short_side > 0.0 {
        (policy.min_short_side_px as f32 / short_side * 72.0).max(min_dpi)
    } else {
        min_dpi
    };
    dpi / 72.0
}

/// Crop `image` to the padded bounding box of non-background pixels.
///
/// A pixel is content when the luma of its difference from white exceeds
/// `policy.crop_threshold`. Returns the image unchanged with `None` when no
/// pixel qualifies.
pub fn crop_to_content(image: RgbImage, policy: &ExtractPolicy) -> (RgbImage, Option<ContentBox>) {
    let Some((min_x, min_y, max_x, max_y)) = content_extent(&image, policy.crop_threshold) else {
        return (image, None);
    };

    let pad = policy.crop_padding;
    let x0 = min_x.saturating_sub(pad);
    let y0 = min_y.saturating_sub(pad);
    let x1 = (max_x + 1).saturating_add(pad).min(image.width());
    let y1 = (max_y + 1).saturating_add(pad).min(image.height());

    let bounds = ContentBox {
        x: x0,
        y: y0,
        width: x1 - x0,
        height: y1 - y0,
    };
    let cropped =
        imageops::crop_imm(&image, bounds.x, bounds.y, bounds.width, bounds.height).to_image();
    (cropped, Some(bounds))
}

/// Inclusive extent of content pixels, or `None` for a blank image.
fn content_extent(image: &RgbImage, threshold: u8) -> Option<(u32, u32, u32, u32)> {
    let mut extent: Option<(u32, u32, u32, u32)> = None;
    for (x, y, pixel) in image.enumerate_pixels() {
        let [r, g, b] = pixel.0;
        if difference_luma(r, g, b) <= threshold {
            continue;
        }
        extent = Some(match extent {
            None => (x, y, x, y),
            Some((x0, y0, x1, y1)) => (x0.min(x), y0.min(y), x1.max(x), y1.max(y)),
        });
    }
    extent
}

/// ITU-R 601-2 luma of `|pixel - white|`, rounded like an 8-bit L conversion.
fn difference_luma(r: u8, g: u8, b: u8) -> u8 {
    let (dr, dg, db) = (
        (255 - r) as u32,
        (255 - g) as u32,
        (255 - b) as u32,
    );
    ((dr * 19595 + dg * 38470 + db * 7471 + 0x8000) >> 16) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn page_with_block(w: u32, h: u32, block: (u32, u32, u32, u32)) -> RgbImage {
        let (bx, by, bw, bh) = block;
        RgbImage::from_fn(w, h, |x, y| {
            if x >= bx && x < bx + bw && y >= by && y < by + bh {
                Rgb([0, 0, 0])
            } else {
                Rgb([255, 255, 255])
            }
        })
    }

    #[test]
    fn scale_reaches_min_short_side() {
        // A6 portrait: 297.6 x 419.5 pt → short side 297.6 pt.
        let p = ExtractPolicy::default();
        let scale = render_scale(297.6, 419.5, &p);
        assert!((297.6 * scale - 768.0).abs() < 0.5, "scale = {scale}");
    }

    #[test]
    fn scale_is_floored_at_min_dpi() {
        // A0: short side 2384 pt would need < 72 DPI for 768 px.
        let p = ExtractPolicy::default();
        assert_eq!(render_scale(2384.0, 3370.0, &p), 150.0 / 72.0);
    }

    #[test]
    fn scale_handles_degenerate_page() {
        let p = ExtractPolicy::default();
        assert_eq!(render_scale(0.0, 842.0, &p), 150.0 / 72.0);
    }

    #[test]
    fn crop_pads_and_clamps() {
        let p = ExtractPolicy::default();
        let img = page_with_block(200, 100, (50, 10, 20, 30));
        let (cropped, bounds) = crop_to_content(img, &p);
        let b = bounds.expect("content present");
        // y0 = 10 - 20 clamps to 0; x1 = 70 + 20 = 90; y1 = 40 + 20 = 60.
        assert_eq!(b, ContentBox { x: 30, y: 0, width: 60, height: 60 });
        assert_eq!(cropped.dimensions(), (60, 60));
    }

    #[test]
    fn crop_clamps_to_far_edges() {
        let p = ExtractPolicy::default();
        let img = page_with_block(100, 100, (90, 90, 10, 10));
        let (cropped, bounds) = crop_to_content(img, &p);
        assert_eq!(bounds, Some(ContentBox { x: 70, y: 70, width: 30, height: 30 }));
        assert_eq!(cropped.dimensions(), (30, 30));
    }

    #[test]
    fn blank_page_is_returned_uncropped() {
        let p = ExtractPolicy::default();
        let img = RgbImage::from_pixel(64, 48, Rgb([255, 255, 255]));
        let (out, bounds) = crop_to_content(img, &p);
        assert!(bounds.is_none());
        assert_eq!(out.dimensions(), (64, 48));
    }

    #[test]
    fn faint_noise_below_threshold_is_ignored() {
        let p = ExtractPolicy::default();
        // Difference of 8 on every channel → luma 8, under the threshold of 10.
        let mut img = RgbImage::from_pixel(40, 40, Rgb([255, 255, 255]));
        img.put_pixel(5, 5, Rgb([247, 247, 247]));
        let (_, bounds) = crop_to_content(img, &p);
        assert!(bounds.is_none());
    }

    #[test]
    fn alphabetic_count_covers_diacritics_and_skips_digits() {
        assert_eq!(count_alphabetic("Tiếng Việt 123 !?"), 9);
        assert_eq!(count_alphabetic(""), 0);
    }
}
