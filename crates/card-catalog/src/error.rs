//! Catalog error types.

use thiserror::Error;

/// Errors that can occur while building, persisting or searching a catalog.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// No reference image produced a single embedding
    #[error("Catalog build produced no items ({attempted} reference images attempted)")]
    EmptyBuild { attempted: usize },

    /// Persisted catalog failed validation
    #[error("Corrupt catalog: {0}")]
    Corrupt(String),

    /// Dimension mismatch
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// usearch index error
    #[error("Index error: {0}")]
    Index(String),

    /// Reference corpus problem
    #[error("Invalid reference corpus: {0}")]
    Corpus(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Embedding error
    #[error("Embedding error: {0}")]
    Embedding(#[from] card_embeddings::EmbeddingError),

    /// Vision error
    #[error("Vision error: {0}")]
    Vision(#[from] card_vision::VisionError),
}
