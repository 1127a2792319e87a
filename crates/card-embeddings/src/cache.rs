//! Local store for CLIP weights.
//!
//! Files are kept in the hf-hub cache layout (`models--org--name/snapshots/..`)
//! under a directory we own, so a repository fetched once is found again
//! without network access.

use std::path::PathBuf;

use hf_hub::api::sync::ApiBuilder;
use hf_hub::{Cache, Repo};
use tracing::{debug, info};

use crate::error::EmbeddingError;

/// Default CLIP repository on HuggingFace
pub const DEFAULT_MODEL_REPO: &str = "openai/clip-vit-base-patch32";

/// The only file the vision tower needs; the architecture is fixed in code.
pub const WEIGHTS_FILE: &str = "model.safetensors";

/// Where CLIP weights are looked up and stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelCache {
    pub cache_dir: PathBuf,
    /// HuggingFace repository id, e.g. `openai/clip-vit-base-patch32`
    pub repo_id: String,
}

impl Default for ModelCache {
    fn default() -> Self {
        Self::new(Self::default_dir(), DEFAULT_MODEL_REPO)
    }
}

impl ModelCache {
    pub fn new(cache_dir: impl Into<PathBuf>, repo_id: impl Into<String>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            repo_id: repo_id.into(),
        }
    }

    /// Default location with a custom repository.
    pub fn for_repo(repo_id: impl Into<String>) -> Self {
        Self::new(Self::default_dir(), repo_id)
    }

    /// `<user cache>/card-recognizer/models`, or `.cache/...` when the
    /// platform has no cache directory.
    pub fn default_dir() -> PathBuf {
        dirs::cache_dir()
            .unwrap_or_else(|| PathBuf::from(".cache"))
            .join("card-recognizer")
            .join("models")
    }

    fn repo(&self) -> Repo {
        Repo::model(self.repo_id.clone())
    }

    /// Directory holding this repository's refs and snapshots.
    pub fn model_dir(&self) -> PathBuf {
        self.cache_dir.join(self.repo().folder_name())
    }

    /// Path of the weights if they are already on disk.
    pub fn cached_weights(&self) -> Option<PathBuf> {
        Cache::new(self.cache_dir.clone())
            .repo(self.repo())
            .get(WEIGHTS_FILE)
    }

    pub fn is_cached(&self) -> bool {
        self.cached_weights().is_some()
    }
}

/// Resolved model files.
#[derive(Debug, Clone)]
pub struct ModelPaths {
    pub weights: PathBuf,
}

/// Resolve the weights, fetching them on first use.
pub fn get_or_download_model(cache: &ModelCache) -> Result<ModelPaths, EmbeddingError> {
    if let Some(weights) = cache.cached_weights() {
        debug!(path = ?weights, "Using cached weights");
        return Ok(ModelPaths { weights });
    }

    info!(repo = %cache.repo_id, dir = ?cache.cache_dir, "Fetching CLIP weights");
    std::fs::create_dir_all(&cache.cache_dir)?;
    let api = ApiBuilder::new()
        .with_cache_dir(cache.cache_dir.clone())
        .with_progress(false)
        .build()
        .map_err(|e| EmbeddingError::Download(e.to_string()))?;
    let weights = api
        .repo(cache.repo())
        .get(WEIGHTS_FILE)
        .map_err(|e| EmbeddingError::Download(format!("{}: {}", WEIGHTS_FILE, e)))?;

    info!(path = ?weights, "Weights ready");
    Ok(ModelPaths { weights })
}
