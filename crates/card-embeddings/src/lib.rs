//! # card-embeddings
//!
//! Image feature extraction for the card recognizer.
//!
//! Maps a normalized card image to a fixed-length, unit-norm vector so that
//! cosine similarity reduces to a dot product.
//!
//! ## Features
//! - Local inference via Candle (CLIP ViT-B/32 vision tower, 512 dimensions)
//! - Automatic model file caching via hf-hub
//! - Deterministic thumbnail extractor for tests and offline use
//! - Lazily-installed shared extractor slot with a distinct "not ready" state

pub mod cache;
pub mod candle;
pub mod error;
pub mod model;
pub mod slot;
pub mod thumbnail;

pub use crate::candle::{CandleClipExtractor, EMBEDDING_DIM};
pub use cache::{get_or_download_model, ModelCache, ModelPaths, DEFAULT_MODEL_REPO, WEIGHTS_FILE};
pub use error::EmbeddingError;
pub use model::{Embedding, FeatureExtractor, ModelInfo, NORM_TOLERANCE};
pub use slot::ExtractorSlot;
pub use thumbnail::{ThumbnailExtractor, DEFAULT_GRID};
