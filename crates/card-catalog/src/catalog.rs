//! Catalog data model and persistence.
//!
//! A catalog is written once by the builder and loaded whole at service
//! start. It is never mutated afterwards; a rebuild replaces the file.

use std::collections::HashSet;
use std::path::Path;

use card_embeddings::Embedding;
use card_types::CatalogShape;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::CatalogError;

/// Current on-disk format version.
pub const FORMAT_VERSION: u32 = 1;

/// Norm tolerance applied when validating a loaded catalog.
const LOAD_NORM_TOLERANCE: f32 = 1e-4;

/// One stored embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    /// Item identifier; repeated across an item's variants
    pub item_id: String,
    /// Display name parsed from the reference file name
    pub display_name: String,
    /// Reference image the embedding came from
    pub source_filename: String,
    /// Variant tag: `original`, `aug<N>` or `mean`
    pub variant: String,
    pub embedding: Embedding,
}

/// Build-time metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogMetadata {
    pub format_version: u32,
    /// Extractor identity, `name@version`
    pub model: String,
    pub embedding_dim: usize,
    pub input_width: u32,
    pub input_height: u32,
    pub shape: CatalogShape,
    pub entry_count: usize,
    pub item_count: usize,
    /// Augmentation seed used for the build
    pub seed: u64,
    pub variants_per_image: usize,
    pub built_at: DateTime<Utc>,
}

/// Summary for status reporting.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CatalogStats {
    pub model: String,
    pub shape: CatalogShape,
    pub embedding_dim: usize,
    pub entry_count: usize,
    pub item_count: usize,
    pub built_at: DateTime<Utc>,
}

/// A loaded or freshly built catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Catalog {
    pub metadata: CatalogMetadata,
    pub entries: Vec<CatalogEntry>,
}

impl Catalog {
    /// Assemble a catalog, filling in the entry and item counts.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        model: impl Into<String>,
        embedding_dim: usize,
        input_size: (u32, u32),
        shape: CatalogShape,
        seed: u64,
        variants_per_image: usize,
        entries: Vec<CatalogEntry>,
    ) -> Result<Self, CatalogError> {
        let metadata = CatalogMetadata {
            format_version: FORMAT_VERSION,
            model: model.into(),
            embedding_dim,
            input_width: input_size.0,
            input_height: input_size.1,
            shape,
            entry_count: entries.len(),
            item_count: count_items(&entries),
            seed,
            variants_per_image,
            built_at: Utc::now(),
        };
        let catalog = Self { metadata, entries };
        catalog.validate()?;
        Ok(catalog)
    }

    /// Check structural invariants.
    pub fn validate(&self) -> Result<(), CatalogError> {
        let meta = &self.metadata;
        if meta.format_version != FORMAT_VERSION {
            return Err(CatalogError::Corrupt(format!(
                "unsupported format version {} (expected {FORMAT_VERSION})",
                meta.format_version
            )));
        }
        if meta.embedding_dim == 0 {
            return Err(CatalogError::Corrupt("embedding_dim is 0".to_string()));
        }
        if meta.entry_count != self.entries.len() {
            return Err(CatalogError::Corrupt(format!(
                "entry_count is {} but {} entries are present",
                meta.entry_count,
                self.entries.len()
            )));
        }
        let items = count_items(&self.entries);
        if meta.item_count != items {
            return Err(CatalogError::Corrupt(format!(
                "item_count is {} but {items} distinct items are present",
                meta.item_count
            )));
        }

        for (i, entry) in self.entries.iter().enumerate() {
            if entry.item_id.is_empty() {
                return Err(CatalogError::Corrupt(format!("entry {i} has no item_id")));
            }
            if entry.embedding.dimension() != meta.embedding_dim {
                return Err(CatalogError::Corrupt(format!(
                    "entry {i} ({}) has dimension {}, catalog is {}",
                    entry.item_id,
                    entry.embedding.dimension(),
                    meta.embedding_dim
                )));
            }
            let norm = entry.embedding.norm();
            if !norm.is_finite() || (norm - 1.0).abs() > LOAD_NORM_TOLERANCE {
                return Err(CatalogError::Corrupt(format!(
                    "entry {i} ({}) is not unit-norm (norm {norm})",
                    entry.item_id
                )));
            }
        }
        Ok(())
    }

    /// Write the catalog atomically (temp file + rename).
    pub fn save(&self, path: &Path) -> Result<(), CatalogError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let temp_path = path.with_extension("json.tmp");
        let bytes = serde_json::to_vec(self)?;
        std::fs::write(&temp_path, &bytes)?;
        std::fs::rename(&temp_path, path)?;

        info!(
            path = %path.display(),
            entries = self.entries.len(),
            items = self.metadata.item_count,
            bytes = bytes.len(),
            "Saved catalog"
        );
        Ok(())
    }

    /// Load and validate a catalog file.
    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let bytes = std::fs::read(path)?;
        let catalog: Catalog = serde_json::from_slice(&bytes)
            .map_err(|e| CatalogError::Corrupt(format!("{}: {e}", path.display())))?;
        catalog.validate()?;

        debug!(
            path = %path.display(),
            model = %catalog.metadata.model,
            entries = catalog.entries.len(),
            "Loaded catalog"
        );
        Ok(catalog)
    }

    pub fn stats(&self) -> CatalogStats {
        CatalogStats {
            model: self.metadata.model.clone(),
            shape: self.metadata.shape,
            embedding_dim: self.metadata.embedding_dim,
            entry_count: self.entries.len(),
            item_count: self.metadata.item_count,
            built_at: self.metadata.built_at,
        }
    }

    pub fn dimension(&self) -> usize {
        self.metadata.embedding_dim
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Distinct item ids in order of first appearance.
    pub fn item_ids(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.entries
            .iter()
            .filter(|e| seen.insert(e.item_id.as_str()))
            .map(|e| e.item_id.as_str())
            .collect()
    }

    /// Display name of an item, if it is in the catalog.
    pub fn display_name(&self, item_id: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|e| e.item_id == item_id)
            .map(|e| e.display_name.as_str())
    }
}

fn count_items(entries: &[CatalogEntry]) -> usize {
    entries
        .iter()
        .map(|e| e.item_id.as_str())
        .collect::<HashSet<_>>()
        .len()
}
