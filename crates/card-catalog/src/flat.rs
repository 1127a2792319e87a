//! Exact linear-scan search.

use std::sync::Arc;

use card_embeddings::Embedding;
use card_types::Hit;
use tracing::debug;

use crate::catalog::Catalog;
use crate::error::CatalogError;
use crate::index::{check_dimension, ItemTable, SimilarityIndex};

/// Scores the query against every entry.
pub struct FlatIndex {
    catalog: Arc<Catalog>,
    items: ItemTable,
}

impl FlatIndex {
    pub fn new(catalog: Arc<Catalog>) -> Self {
        let items = ItemTable::from_catalog(&catalog);
        Self { catalog, items }
    }
}

impl SimilarityIndex for FlatIndex {
    fn dimension(&self) -> usize {
        self.catalog.dimension()
    }

    fn len(&self) -> usize {
        self.catalog.len()
    }

    fn item_count(&self) -> usize {
        self.items.item_count()
    }

    fn search(&self, query: &Embedding, k: usize) -> Result<Vec<Hit>, CatalogError> {
        check_dimension(self.dimension(), query)?;

        let scores = self
            .catalog
            .entries
            .iter()
            .enumerate()
            .map(|(i, entry)| (i, query.cosine_similarity(&entry.embedding)));
        let ranked = self.items.rank(scores, k);

        debug!(k = k, found = ranked.len(), "Exact search complete");
        Ok(ranked)
    }
}
