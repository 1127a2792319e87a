//! Embedding type and feature extractor trait.
//!
//! Defines the interface for generating vector embeddings from card images.

use image::RgbImage;
use serde::{Deserialize, Serialize};

use crate::error::EmbeddingError;

/// Allowed deviation of a normalized embedding's L2 norm from 1.0.
pub const NORM_TOLERANCE: f32 = 1e-5;

/// Vector embedding - a unit-length float array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Embedding {
    /// The embedding vector (normalized to unit length)
    pub values: Vec<f32>,
}

impl Embedding {
    /// L2-normalize a raw vector.
    ///
    /// Fails with `DegenerateEmbedding` when the norm is zero or any component
    /// is NaN/Inf, so nothing non-finite ever reaches similarity search.
    pub fn normalize(values: Vec<f32>) -> Result<Self, EmbeddingError> {
        if values.is_empty() {
            return Err(EmbeddingError::DegenerateEmbedding(
                "empty vector".to_string(),
            ));
        }
        if values.iter().any(|v| !v.is_finite()) {
            return Err(EmbeddingError::DegenerateEmbedding(
                "non-finite component".to_string(),
            ));
        }

        // Accumulate in f64 so large dimensions don't drift past the tolerance
        let norm = values
            .iter()
            .map(|&x| (x as f64) * (x as f64))
            .sum::<f64>()
            .sqrt();
        if norm == 0.0 || !norm.is_finite() {
            return Err(EmbeddingError::DegenerateEmbedding(format!(
                "norm is {norm}"
            )));
        }

        let normalized = values
            .into_iter()
            .map(|x| ((x as f64) / norm) as f32)
            .collect();
        Ok(Self { values: normalized })
    }

    /// Create embedding without normalization (for pre-normalized vectors)
    pub fn from_normalized(values: Vec<f32>) -> Self {
        Self { values }
    }

    /// Average several embeddings and re-normalize the result.
    pub fn mean(embeddings: &[Embedding]) -> Result<Self, EmbeddingError> {
        let first = embeddings.first().ok_or_else(|| {
            EmbeddingError::InvalidInput("cannot average zero embeddings".to_string())
        })?;
        let dim = first.dimension();

        let mut sum = vec![0.0f64; dim];
        for emb in embeddings {
            if emb.dimension() != dim {
                return Err(EmbeddingError::DimensionMismatch {
                    expected: dim,
                    actual: emb.dimension(),
                });
            }
            for (acc, v) in sum.iter_mut().zip(&emb.values) {
                *acc += *v as f64;
            }
        }

        let count = embeddings.len() as f64;
        Self::normalize(sum.into_iter().map(|v| (v / count) as f32).collect())
    }

    /// Get the embedding dimension
    pub fn dimension(&self) -> usize {
        self.values.len()
    }

    /// Euclidean norm of the stored vector.
    pub fn norm(&self) -> f32 {
        self.values
            .iter()
            .map(|&x| (x as f64) * (x as f64))
            .sum::<f64>()
            .sqrt() as f32
    }

    /// Whether the stored vector has unit norm within `NORM_TOLERANCE`.
    pub fn is_unit(&self) -> bool {
        (self.norm() - 1.0).abs() <= NORM_TOLERANCE
    }

    /// Compute cosine similarity with another embedding.
    /// Returns value in [-1, 1] range (1 = identical).
    pub fn cosine_similarity(&self, other: &Embedding) -> f32 {
        if self.values.len() != other.values.len() {
            return 0.0;
        }
        // Since both are normalized, dot product = cosine similarity
        let dot: f32 = self
            .values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| a * b)
            .sum();
        dot.clamp(-1.0, 1.0)
    }
}

/// Model information
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelInfo {
    /// Model name (e.g., "clip-vit-base-patch32")
    pub name: String,
    /// Model version or source revision
    pub version: String,
    /// Embedding dimension
    pub dimension: usize,
    /// Expected input width in pixels
    pub input_width: u32,
    /// Expected input height in pixels
    pub input_height: u32,
}

impl ModelInfo {
    /// Identity string recorded in catalogs, e.g. `clip-vit-base-patch32@openai/clip-vit-base-patch32`.
    pub fn identity(&self) -> String {
        format!("{}@{}", self.name, self.version)
    }

    /// Reject images that don't match the extractor's input contract.
    pub fn check_input(&self, image: &RgbImage) -> Result<(), EmbeddingError> {
        if image.width() != self.input_width || image.height() != self.input_height {
            return Err(EmbeddingError::InvalidInput(format!(
                "expected {}x{} image, got {}x{}",
                self.input_width,
                self.input_height,
                image.width(),
                image.height()
            )));
        }
        Ok(())
    }
}

/// Trait for feature extractors.
///
/// Implementations must be thread-safe (Send + Sync): a single loaded
/// extractor is shared read-only by every scan session.
pub trait FeatureExtractor: Send + Sync {
    /// Get model information
    fn info(&self) -> &ModelInfo;

    /// Generate a unit-norm embedding for one normalized image.
    fn extract(&self, image: &RgbImage) -> Result<Embedding, EmbeddingError>;

    /// Generate embeddings for multiple images (batch).
    /// Default implementation calls extract() for each image.
    fn extract_batch(&self, images: &[RgbImage]) -> Result<Vec<Embedding>, EmbeddingError> {
        images.iter().map(|image| self.extract(image)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng};

    #[test]
    fn test_embedding_normalization() {
        let emb = Embedding::normalize(vec![3.0, 4.0]).unwrap();
        // 3-4-5 triangle: normalized should be [0.6, 0.8]
        assert!((emb.values[0] - 0.6).abs() < 0.001);
        assert!((emb.values[1] - 0.8).abs() < 0.001);
    }

    #[test]
    fn test_random_vectors_have_unit_norm() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(7);
        for dim in [2usize, 64, 512, 1280] {
            for _ in 0..20 {
                let values: Vec<f32> = (0..dim).map(|_| rng.random_range(-50.0..50.0)).collect();
                let emb = Embedding::normalize(values).unwrap();
                assert_eq!(emb.dimension(), dim);
                assert!(emb.is_unit(), "norm {} for dim {}", emb.norm(), dim);
            }
        }
    }

    #[test]
    fn test_zero_vector_is_degenerate() {
        let result = Embedding::normalize(vec![0.0; 16]);
        assert!(matches!(result, Err(EmbeddingError::DegenerateEmbedding(_))));
    }

    #[test]
    fn test_non_finite_is_degenerate() {
        let result = Embedding::normalize(vec![1.0, f32::NAN]);
        assert!(matches!(result, Err(EmbeddingError::DegenerateEmbedding(_))));

        let result = Embedding::normalize(vec![f32::INFINITY, 1.0]);
        assert!(matches!(result, Err(EmbeddingError::DegenerateEmbedding(_))));
    }

    #[test]
    fn test_cosine_similarity_identical() {
        let emb = Embedding::normalize(vec![0.3, -1.2, 4.5]).unwrap();
        assert!((emb.cosine_similarity(&emb) - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_cosine_similarity_symmetric() {
        let a = Embedding::normalize(vec![1.0, 2.0, 3.0]).unwrap();
        let b = Embedding::normalize(vec![-2.0, 0.5, 1.0]).unwrap();
        assert_eq!(a.cosine_similarity(&b), b.cosine_similarity(&a));
    }

    #[test]
    fn test_cosine_similarity_orthogonal() {
        let emb1 = Embedding::normalize(vec![1.0, 0.0]).unwrap();
        let emb2 = Embedding::normalize(vec![0.0, 1.0]).unwrap();
        assert!(emb1.cosine_similarity(&emb2).abs() < 0.001);
    }

    #[test]
    fn test_cosine_similarity_opposite() {
        let emb1 = Embedding::normalize(vec![1.0, 0.0]).unwrap();
        let emb2 = Embedding::normalize(vec![-1.0, 0.0]).unwrap();
        assert!((emb1.cosine_similarity(&emb2) + 1.0).abs() < 0.001);
    }

    #[test]
    fn test_mean_is_renormalized() {
        let a = Embedding::normalize(vec![1.0, 0.0]).unwrap();
        let b = Embedding::normalize(vec![0.0, 1.0]).unwrap();
        let mean = Embedding::mean(&[a, b]).unwrap();
        assert!(mean.is_unit());
        assert!((mean.values[0] - mean.values[1]).abs() < 1e-6);
    }

    #[test]
    fn test_mean_of_opposites_is_degenerate() {
        let a = Embedding::normalize(vec![1.0, 0.0]).unwrap();
        let b = Embedding::normalize(vec![-1.0, 0.0]).unwrap();
        assert!(matches!(
            Embedding::mean(&[a, b]),
            Err(EmbeddingError::DegenerateEmbedding(_))
        ));
    }

    #[test]
    fn test_mean_dimension_mismatch() {
        let a = Embedding::normalize(vec![1.0, 0.0]).unwrap();
        let b = Embedding::normalize(vec![1.0, 0.0, 0.0]).unwrap();
        assert!(matches!(
            Embedding::mean(&[a, b]),
            Err(EmbeddingError::DimensionMismatch { expected: 2, actual: 3 })
        ));
    }

    #[test]
    fn test_model_info_check_input() {
        let info = ModelInfo {
            name: "test".to_string(),
            version: "1".to_string(),
            dimension: 8,
            input_width: 4,
            input_height: 4,
        };
        assert_eq!(info.identity(), "test@1");
        assert!(info.check_input(&RgbImage::new(4, 4)).is_ok());
        assert!(matches!(
            info.check_input(&RgbImage::new(4, 5)),
            Err(EmbeddingError::InvalidInput(_))
        ));
    }
}
