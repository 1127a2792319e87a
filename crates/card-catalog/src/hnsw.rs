//! Approximate search using a usearch HNSW graph.
//!
//! The graph only proposes candidates. Candidates are re-scored exactly and
//! max-pooled per item, so returned similarities are true cosine values and
//! ties break the same way as the exact scan.
//!
//! Parameters tuned for quality over speed:
//! - M = 16 (connections per layer)
//! - ef_construction = 200 (build-time quality)
//! - ef_search = 100 (search-time quality)

use std::sync::Arc;

use card_embeddings::Embedding;
use card_types::Hit;
use tracing::{debug, info};
use usearch::{Index, IndexOptions, MetricKind, ScalarKind};

use crate::catalog::Catalog;
use crate::error::CatalogError;
use crate::index::{check_dimension, ItemTable, SimilarityIndex};

/// Minimum number of graph candidates fetched per query.
const MIN_CANDIDATES: usize = 32;

/// HNSW index configuration
#[derive(Debug, Clone)]
pub struct HnswConfig {
    /// Embedding dimension (must match catalog)
    pub dimension: usize,
    /// Number of connections per layer (M parameter)
    pub connectivity: usize,
    /// Build-time search depth (ef_construction)
    pub expansion_add: usize,
    /// Query-time search depth (ef_search)
    pub expansion_search: usize,
}

impl Default for HnswConfig {
    fn default() -> Self {
        Self {
            dimension: 512, // CLIP ViT-B/32
            connectivity: 16,
            expansion_add: 200,
            expansion_search: 100,
        }
    }
}

impl HnswConfig {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            ..Default::default()
        }
    }

    pub fn with_connectivity(mut self, m: usize) -> Self {
        self.connectivity = m;
        self
    }

    pub fn with_expansion(mut self, ef_add: usize, ef_search: usize) -> Self {
        self.expansion_add = ef_add;
        self.expansion_search = ef_search;
        self
    }
}

/// In-memory HNSW graph over catalog entries, keyed by entry position.
pub struct HnswIndex {
    index: Index,
    catalog: Arc<Catalog>,
    items: ItemTable,
    config: HnswConfig,
}

impl HnswIndex {
    /// Insert every catalog entry into a fresh graph.
    pub fn build(catalog: Arc<Catalog>, config: HnswConfig) -> Result<Self, CatalogError> {
        if config.dimension != catalog.dimension() {
            return Err(CatalogError::DimensionMismatch {
                expected: catalog.dimension(),
                actual: config.dimension,
            });
        }

        let options = IndexOptions {
            dimensions: config.dimension,
            metric: MetricKind::Cos, // Cosine similarity
            quantization: ScalarKind::F32,
            connectivity: config.connectivity,
            expansion_add: config.expansion_add,
            expansion_search: config.expansion_search,
            multi: false, // Single vector per key
        };

        let index = Index::new(&options).map_err(|e| CatalogError::Index(e.to_string()))?;
        index
            .reserve(catalog.len())
            .map_err(|e| CatalogError::Index(e.to_string()))?;

        for (key, entry) in catalog.entries.iter().enumerate() {
            index
                .add(key as u64, &entry.embedding.values)
                .map_err(|e| CatalogError::Index(e.to_string()))?;
        }

        info!(
            entries = index.size(),
            dim = config.dimension,
            "Built HNSW index"
        );

        let items = ItemTable::from_catalog(&catalog);
        Ok(Self {
            index,
            catalog,
            items,
            config,
        })
    }

    /// Graph candidates to fetch for `k` items.
    ///
    /// Per-variant catalogs hold several entries per item, so fetch enough
    /// entries to cover `k` items on average.
    fn candidate_count(&self, k: usize) -> usize {
        let per_item = self.catalog.len().div_ceil(self.items.item_count().max(1));
        k.saturating_mul(per_item)
            .max(MIN_CANDIDATES)
            .max(self.config.expansion_search)
            .min(self.catalog.len())
    }
}

impl SimilarityIndex for HnswIndex {
    fn dimension(&self) -> usize {
        self.config.dimension
    }

    fn len(&self) -> usize {
        self.index.size()
    }

    fn item_count(&self) -> usize {
        self.items.item_count()
    }

    fn search(&self, query: &Embedding, k: usize) -> Result<Vec<Hit>, CatalogError> {
        check_dimension(self.config.dimension, query)?;
        if k == 0 || self.catalog.is_empty() {
            return Ok(vec![]);
        }

        let candidates = self.candidate_count(k);
        let matches = self
            .index
            .search(&query.values, candidates)
            .map_err(|e| CatalogError::Index(e.to_string()))?;

        // Re-score exactly; keys are entry positions
        let mut keys: Vec<usize> = matches.keys.iter().map(|&key| key as usize).collect();
        keys.sort_unstable();
        let scores = keys.into_iter().filter_map(|i| {
            self.catalog
                .entries
                .get(i)
                .map(|entry| (i, query.cosine_similarity(&entry.embedding)))
        });
        let ranked = self.items.rank(scores, k);

        debug!(
            k = k,
            candidates = candidates,
            found = ranked.len(),
            "Approximate search complete"
        );
        Ok(ranked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::CatalogEntry;
    use crate::flat::FlatIndex;
    use card_types::CatalogShape;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn random_embedding(rng: &mut StdRng, dim: usize) -> Embedding {
        let values: Vec<f32> = (0..dim).map(|_| rng.random_range(-1.0..1.0)).collect();
        Embedding::normalize(values).unwrap()
    }

    fn random_catalog(items: usize, variants: usize, dim: usize) -> Arc<Catalog> {
        let mut rng = StdRng::seed_from_u64(17);
        let mut entries = Vec::new();
        for item in 0..items {
            for variant in 0..variants {
                entries.push(CatalogEntry {
                    item_id: format!("item{item}"),
                    display_name: format!("Item {item}"),
                    source_filename: format!("item{item}_x.png"),
                    variant: format!("aug{variant}"),
                    embedding: random_embedding(&mut rng, dim),
                });
            }
        }
        Arc::new(
            Catalog::new(
                "test@1",
                dim,
                (4, 4),
                CatalogShape::PerVariant,
                17,
                variants,
                entries,
            )
            .unwrap(),
        )
    }

    #[test]
    fn test_build_and_counts() {
        let catalog = random_catalog(10, 3, 32);
        let index = HnswIndex::build(catalog, HnswConfig::new(32)).unwrap();
        assert_eq!(index.len(), 30);
        assert_eq!(index.item_count(), 10);
        assert_eq!(index.dimension(), 32);
    }

    #[test]
    fn test_matches_exact_search_on_small_catalog() {
        let catalog = random_catalog(20, 4, 32);
        let approx = HnswIndex::build(catalog.clone(), HnswConfig::new(32)).unwrap();
        let exact = FlatIndex::new(catalog.clone());

        // Small enough that every entry is a candidate
        let query = catalog.entries[13].embedding.clone();
        let a = approx.search(&query, 5).unwrap();
        let e = exact.search(&query, 5).unwrap();
        assert_eq!(a, e);
        assert_eq!(a[0].item_id, "item3");
        assert!((a[0].similarity - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_similarities_are_exact() {
        let catalog = random_catalog(5, 2, 16);
        let index = HnswIndex::build(catalog.clone(), HnswConfig::new(16)).unwrap();
        let mut rng = StdRng::seed_from_u64(99);
        let query = random_embedding(&mut rng, 16);

        for hit in index.search(&query, 5).unwrap() {
            let best = catalog
                .entries
                .iter()
                .filter(|e| e.item_id == hit.item_id)
                .map(|e| query.cosine_similarity(&e.embedding))
                .fold(f32::NEG_INFINITY, f32::max);
            assert_eq!(hit.similarity, best);
        }
    }

    #[test]
    fn test_dimension_mismatch() {
        let catalog = random_catalog(2, 1, 8);
        assert!(matches!(
            HnswIndex::build(catalog.clone(), HnswConfig::new(16)),
            Err(CatalogError::DimensionMismatch { .. })
        ));

        let index = HnswIndex::build(catalog, HnswConfig::new(8)).unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        assert!(matches!(
            index.search(&random_embedding(&mut rng, 4), 1),
            Err(CatalogError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_huge_k_is_clamped_to_catalog() {
        let catalog = random_catalog(2, 2, 8);
        let index = HnswIndex::build(catalog, HnswConfig::new(8)).unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        let hits = index.search(&random_embedding(&mut rng, 8), usize::MAX).unwrap();
        assert_eq!(hits.len(), 2);
    }
}
