//! Embedding error types.

use thiserror::Error;

/// Errors that can occur during feature extraction and normalization.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    /// Candle model error
    #[error("Candle error: {0}")]
    Candle(#[from] candle_core::Error),

    /// Model file not found
    #[error("Model file not found: {0}")]
    ModelNotFound(String),

    /// Download error
    #[error("Failed to download model: {0}")]
    Download(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Dimension mismatch
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Zero-norm or non-finite vector
    #[error("Degenerate embedding: {0}")]
    DegenerateEmbedding(String),

    /// Extractor has not been loaded yet
    #[error("Feature extractor not ready: {0}")]
    NotReady(String),
}
