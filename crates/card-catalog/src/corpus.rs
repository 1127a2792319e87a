//! Reference corpus scanning.

use std::path::{Path, PathBuf};

use card_types::ItemLabel;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::error::CatalogError;

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg"];

/// One canonical reference image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceImage {
    pub path: PathBuf,
    /// File name including extension
    pub source_filename: String,
    pub label: ItemLabel,
}

impl ReferenceImage {
    /// Describe a reference image from its path.
    pub fn from_path(path: impl Into<PathBuf>) -> Option<Self> {
        let path = path.into();
        let source_filename = path.file_name()?.to_str()?.to_string();
        let stem = path.file_stem()?.to_str()?;
        let label = ItemLabel::parse(stem);
        if label.item_id.is_empty() {
            return None;
        }
        Some(Self {
            path,
            source_filename,
            label,
        })
    }
}

/// List reference images directly inside `dir`, sorted by file name.
///
/// Sorting keeps catalog order (and therefore tie-breaking) stable across
/// filesystems.
pub fn scan_corpus(dir: &Path) -> Result<Vec<ReferenceImage>, CatalogError> {
    if !dir.is_dir() {
        return Err(CatalogError::Corpus(format!(
            "{} is not a directory",
            dir.display()
        )));
    }

    let mut references = Vec::new();
    for entry in WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(error = %e, "Skipping unreadable corpus entry");
                continue;
            }
        };
        if !entry.file_type().is_file() || !is_image(entry.path()) {
            continue;
        }
        match ReferenceImage::from_path(entry.path()) {
            Some(reference) => references.push(reference),
            None => warn!(path = %entry.path().display(), "Cannot derive item id from file name"),
        }
    }

    debug!(dir = %dir.display(), count = references.len(), "Scanned reference corpus");
    Ok(references)
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}
