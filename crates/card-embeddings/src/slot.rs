//! Shared, lazily-installed extractor.
//!
//! The extractor is loaded once and then shared read-only by every caller.
//! Until it is installed, lookups fail with `NotReady` rather than blocking.

use std::sync::{Arc, OnceLock};

use tracing::info;

use crate::error::EmbeddingError;
use crate::model::{FeatureExtractor, ModelInfo};

#[derive(Default)]
pub struct ExtractorSlot {
    inner: OnceLock<Arc<dyn FeatureExtractor>>,
}

impl ExtractorSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// A slot that is ready immediately.
    pub fn with_extractor(extractor: Arc<dyn FeatureExtractor>) -> Self {
        let slot = Self::new();
        let _ = slot.inner.set(extractor);
        slot
    }

    /// Install the extractor. Returns false if one was already installed.
    pub fn install(&self, extractor: Arc<dyn FeatureExtractor>) -> bool {
        let model = extractor.info().identity();
        let installed = self.inner.set(extractor).is_ok();
        if installed {
            info!(model = %model, "Feature extractor ready");
        }
        installed
    }

    /// Get the extractor, or `NotReady` if it hasn't been installed yet.
    pub fn get(&self) -> Result<Arc<dyn FeatureExtractor>, EmbeddingError> {
        self.inner
            .get()
            .cloned()
            .ok_or_else(|| EmbeddingError::NotReady("feature extractor is still loading".to_string()))
    }

    pub fn is_ready(&self) -> bool {
        self.inner.get().is_some()
    }

    pub fn info(&self) -> Option<&ModelInfo> {
        self.inner.get().map(|e| e.info())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::thumbnail::ThumbnailExtractor;

    #[test]
    fn test_empty_slot_not_ready() {
        let slot = ExtractorSlot::new();
        assert!(!slot.is_ready());
        assert!(slot.info().is_none());
        assert!(matches!(slot.get(), Err(EmbeddingError::NotReady(_))));
    }

    #[test]
    fn test_install_once() {
        let slot = ExtractorSlot::new();
        let first = Arc::new(ThumbnailExtractor::new(4, 16, 16).unwrap());
        let second = Arc::new(ThumbnailExtractor::new(8, 16, 16).unwrap());

        assert!(slot.install(first));
        assert!(!slot.install(second));
        assert_eq!(slot.get().unwrap().info().dimension, 48);
    }

    #[test]
    fn test_install_from_other_thread() {
        let slot = Arc::new(ExtractorSlot::new());
        let loader = {
            let slot = slot.clone();
            std::thread::spawn(move || {
                slot.install(Arc::new(ThumbnailExtractor::new(4, 16, 16).unwrap()))
            })
        };
        assert!(loader.join().unwrap());
        assert!(slot.is_ready());
    }
}
