//! Matcher error types.

use thiserror::Error;

/// Errors surfaced by query-time recognition.
///
/// A rejected frame is not an error; see [`crate::Decision`].
#[derive(Debug, Error)]
pub enum MatchError {
    /// Catalog or extractor not loaded yet; retry later
    #[error("Not ready: {0}")]
    NotReady(String),

    /// Embedding error
    #[error("Embedding error: {0}")]
    Embedding(#[from] card_embeddings::EmbeddingError),

    /// Catalog or search error
    #[error("Catalog error: {0}")]
    Catalog(#[from] card_catalog::CatalogError),

    /// Vision error
    #[error("Vision error: {0}")]
    Vision(#[from] card_vision::VisionError),
}
