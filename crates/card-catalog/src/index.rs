//! Similarity index trait and per-item ranking.
//!
//! Every index ranks items, not entries: an item's score is the best
//! similarity among its entries, and equal scores keep catalog order.

use std::collections::HashMap;
use std::sync::Arc;

use card_embeddings::Embedding;
use card_types::{Hit, SearchMode, SearchSettings};
use tracing::info;

use crate::catalog::Catalog;
use crate::error::CatalogError;
use crate::flat::FlatIndex;
use crate::hnsw::{HnswConfig, HnswIndex};

/// Trait for similarity search over a catalog.
///
/// Implementations are immutable after construction and safe to share
/// across sessions without locking.
pub trait SimilarityIndex: Send + Sync {
    /// Embedding dimension
    fn dimension(&self) -> usize;

    /// Number of stored entries
    fn len(&self) -> usize;

    /// Number of distinct items
    fn item_count(&self) -> usize;

    /// Check if the index is empty
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Rank up to `k` items by similarity to `query`, best first.
    fn search(&self, query: &Embedding, k: usize) -> Result<Vec<Hit>, CatalogError>;
}

/// Mapping from entries to items, in first-appearance order.
#[derive(Debug, Clone)]
pub struct ItemTable {
    item_ids: Vec<String>,
    entry_items: Vec<usize>,
}

impl ItemTable {
    pub fn from_catalog(catalog: &Catalog) -> Self {
        let mut positions: HashMap<&str, usize> = HashMap::new();
        let mut item_ids = Vec::new();
        let entry_items = catalog
            .entries
            .iter()
            .map(|entry| {
                *positions.entry(entry.item_id.as_str()).or_insert_with(|| {
                    item_ids.push(entry.item_id.clone());
                    item_ids.len() - 1
                })
            })
            .collect();

        Self {
            item_ids,
            entry_items,
        }
    }

    pub fn item_count(&self) -> usize {
        self.item_ids.len()
    }

    /// Max-pool `(entry, similarity)` scores per item and rank the top `k`.
    pub fn rank(&self, scores: impl IntoIterator<Item = (usize, f32)>, k: usize) -> Vec<Hit> {
        let mut best: Vec<Option<f32>> = vec![None; self.item_ids.len()];
        for (entry, similarity) in scores {
            let Some(&item) = self.entry_items.get(entry) else {
                continue;
            };
            match best[item] {
                Some(current) if current >= similarity => {}
                _ => best[item] = Some(similarity),
            }
        }

        let mut ranked: Vec<(usize, f32)> = best
            .into_iter()
            .enumerate()
            .filter_map(|(item, score)| score.map(|s| (item, s)))
            .collect();
        // Stable sort: equal scores stay in item order
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
        ranked.truncate(k);

        ranked
            .into_iter()
            .map(|(item, similarity)| Hit::new(self.item_ids[item].clone(), similarity))
            .collect()
    }
}

/// Build the configured index over a loaded catalog.
pub fn open_index(
    catalog: Arc<Catalog>,
    settings: &SearchSettings,
) -> Result<Arc<dyn SimilarityIndex>, CatalogError> {
    let index: Arc<dyn SimilarityIndex> = match settings.mode {
        SearchMode::Exact => Arc::new(FlatIndex::new(catalog)),
        SearchMode::Approximate => {
            let config = HnswConfig::new(catalog.dimension())
                .with_connectivity(settings.connectivity)
                .with_expansion(settings.expansion_add, settings.expansion_search);
            Arc::new(HnswIndex::build(catalog, config)?)
        }
    };

    info!(
        mode = ?settings.mode,
        entries = index.len(),
        items = index.item_count(),
        "Similarity index ready"
    );
    Ok(index)
}

pub(crate) fn check_dimension(expected: usize, query: &Embedding) -> Result<(), CatalogError> {
    if query.dimension() != expected {
        return Err(CatalogError::DimensionMismatch {
            expected,
            actual: query.dimension(),
        });
    }
    Ok(())
}
