//! Batch list loading and output naming.
//!
//! The batch list comes from a classification artifact produced by an
//! earlier stage:
//!
//! ```json
//! { "files": { "scanned": ["data/a.pdf"], "mixed": ["data/b/c.pdf"] } }
//! ```
//!
//! Output names are derived from the input path below the data directory so
//! that `data/b/c.pdf` and `data/d/c.pdf` never collide.

use crate::error::BatchOcrError;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::path::{Component, Path, PathBuf};
use tracing::debug;

#[derive(Debug, Deserialize)]
struct Classification {
    files: HashMap<String, Vec<String>>,
}

/// Load the files listed under `categories`, in category order then list
/// order. A path listed twice is kept at its first position only.
pub fn load_batch_list(path: &Path, categories: &[String]) -> Result<Vec<PathBuf>, BatchOcrError> {
    let raw = std::fs::read_to_string(path).map_err(|source| BatchOcrError::ClassificationRead {
        path: path.to_path_buf(),
        source,
    })?;

    let parsed: Classification =
        serde_json::from_str(&raw).map_err(|e| BatchOcrError::ClassificationParse {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })?;

    let mut seen = HashSet::new();
    let mut files = Vec::new();
    for category in categories {
        let listed = parsed
            .files
            .get(category)
            .ok_or_else(|| BatchOcrError::MissingCategory {
                path: path.to_path_buf(),
                category: category.clone(),
            })?;
        debug!("category '{}': {} files", category, listed.len());

        for file in listed {
            if seen.insert(file.as_str()) {
                files.push(PathBuf::from(file));
            }
        }
    }
    Ok(files)
}

/// Output file stem for `pdf`.
///
/// `data/2024/report.pdf` with data dir `data` becomes `2024--report`. Paths
/// outside the data dir fall back to the bare file stem.
pub fn output_name(pdf: &Path, data_dir: &Path) -> String {
    let resolved = resolve(pdf);
    let root = resolve(data_dir);

    match resolved.strip_prefix(&root) {
        Ok(rel) if rel.components().next().is_some() => {
            let rel = rel.with_extension("");
            rel.components()
                .filter_map(|c| match c {
                    Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join("--")
        }
        _ => file_stem(pdf),
    }
}

/// Display name used in logs and the status artifact: the file stem.
pub fn display_name(pdf: &Path) -> String {
    file_stem(pdf)
}

fn file_stem(pdf: &Path) -> String {
    pdf.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| pdf.to_string_lossy().into_owned())
}

/// Absolute form of `p` with symlinks resolved as far as the path exists.
fn resolve(p: &Path) -> PathBuf {
    let absolute = if p.is_absolute() {
        p.to_path_buf()
    } else {
        match std::env::current_dir() {
            Ok(cwd) => cwd.join(p),
            Err(_) => p.to_path_buf(),
        }
    };

    let mut existing = absolute.as_path();
    let mut tail = Vec::new();
    loop {
        if let Ok(canonical) = existing.canonicalize() {
            return tail
                .iter()
                .rev()
                .fold(canonical, |acc: PathBuf, part| acc.join(part));
        }
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                tail.push(name.to_os_string());
                existing = parent;
            }
            _ => return absolute.clone(),
        }
    }
}
