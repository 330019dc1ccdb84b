//! Instruction prompt for the Vision Language Model fallback.
//!
//! The fallback only sees pages the fast engine could not read, which are
//! mostly degraded scans. The prompt is deliberately short: long rule lists
//! cost input tokens on every page and small local vision models follow
//! them poorly.
//!
//! Callers can override it via [`crate::config::BatchConfig::ocr_prompt`];
//! the constant here is used only when no override is provided.

/// Default instruction sent with every fallback page image.
pub const DEFAULT_OCR_PROMPT: &str =
    "OCR this image to markdown. Preserve structure: headings, lists, tables. LaTeX $ for math.";
