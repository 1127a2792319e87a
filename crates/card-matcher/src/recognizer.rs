//! Query-time recognition of a single frame.
//!
//! normalize -> extract -> search -> decide. Per-frame problems (no frame
//! geometry yet, degenerate embedding) become [`FrameOutcome::Skipped`];
//! only structural problems are errors.

use std::fmt;
use std::sync::{Arc, OnceLock};

use card_catalog::{Catalog, SimilarityIndex};
use card_embeddings::{Embedding, EmbeddingError, ExtractorSlot, FeatureExtractor};
use card_types::Hit;
use card_vision::{ImageNormalizer, VisionError};
use image::RgbImage;
use tracing::{debug, info, warn};

use crate::decision::{Decision, DecisionPolicy};
use crate::error::MatchError;

/// A catalog together with the index built over it.
pub struct LoadedCatalog {
    pub catalog: Arc<Catalog>,
    pub index: Arc<dyn SimilarityIndex>,
}

/// Catalog that becomes available once, after loading.
#[derive(Default)]
pub struct CatalogSlot {
    inner: OnceLock<Arc<LoadedCatalog>>,
}

impl CatalogSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_catalog(catalog: Arc<Catalog>, index: Arc<dyn SimilarityIndex>) -> Self {
        let slot = Self::new();
        slot.install(catalog, index);
        slot
    }

    /// Install the catalog. Returns false if one was already installed.
    pub fn install(&self, catalog: Arc<Catalog>, index: Arc<dyn SimilarityIndex>) -> bool {
        let items = catalog.metadata.item_count;
        let installed = self
            .inner
            .set(Arc::new(LoadedCatalog { catalog, index }))
            .is_ok();
        if installed {
            info!(items = items, "Catalog ready");
        }
        installed
    }

    pub fn get(&self) -> Result<Arc<LoadedCatalog>, MatchError> {
        self.inner
            .get()
            .cloned()
            .ok_or_else(|| MatchError::NotReady("catalog is still loading".to_string()))
    }

    pub fn is_ready(&self) -> bool {
        self.inner.get().is_some()
    }
}

/// Why a frame was dropped without a decision.
#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    /// Capture source reported zero width or height
    SourceNotReady { width: u32, height: u32 },
    /// Embedding had zero norm or non-finite components
    DegenerateEmbedding(String),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::SourceNotReady { width, height } => {
                write!(f, "source not ready ({}x{})", width, height)
            }
            SkipReason::DegenerateEmbedding(msg) => write!(f, "degenerate embedding: {}", msg),
        }
    }
}

/// Result of recognizing one frame.
#[derive(Debug, Clone, PartialEq)]
pub enum FrameOutcome {
    /// The frame was searched and the policy decided
    Decided { ranked: Vec<Hit>, decision: Decision },
    /// The frame contributed nothing
    Skipped(SkipReason),
}

/// Shared, read-only recognition pipeline.
pub struct Recognizer {
    normalizer: ImageNormalizer,
    extractor: Arc<ExtractorSlot>,
    catalog: Arc<CatalogSlot>,
    policy: DecisionPolicy,
    top_k: usize,
}

impl Recognizer {
    pub fn new(
        normalizer: ImageNormalizer,
        extractor: Arc<ExtractorSlot>,
        catalog: Arc<CatalogSlot>,
        policy: DecisionPolicy,
        top_k: usize,
    ) -> Self {
        Self {
            normalizer,
            extractor,
            catalog,
            policy,
            top_k,
        }
    }

    pub fn policy(&self) -> &DecisionPolicy {
        &self.policy
    }

    pub fn catalog_slot(&self) -> &Arc<CatalogSlot> {
        &self.catalog
    }

    pub fn extractor_slot(&self) -> &Arc<ExtractorSlot> {
        &self.extractor
    }

    /// Both the extractor and the catalog are loaded.
    pub fn is_ready(&self) -> bool {
        self.extractor.is_ready() && self.catalog.is_ready()
    }

    /// Fail with `NotReady` unless both the extractor and the catalog are
    /// loaded, and they agree on the embedding dimension.
    pub fn check_ready(&self) -> Result<(), MatchError> {
        let extractor = self.extractor()?;
        let loaded = self.catalog.get()?;
        let dim = extractor.info().dimension;
        if dim != loaded.catalog.dimension() {
            return Err(MatchError::Catalog(
                card_catalog::CatalogError::DimensionMismatch {
                    expected: loaded.catalog.dimension(),
                    actual: dim,
                },
            ));
        }
        Ok(())
    }

    /// Display name for an item, falling back to the id.
    pub fn display_name(&self, item_id: &str) -> String {
        self.catalog
            .get()
            .ok()
            .and_then(|loaded| loaded.catalog.display_name(item_id).map(str::to_string))
            .unwrap_or_else(|| item_id.to_string())
    }

    /// Ranked items reported per frame unless a caller asks for more.
    pub fn top_k(&self) -> usize {
        self.top_k
    }

    /// Run the full pipeline on one raw frame.
    pub fn recognize_frame(&self, frame: &RgbImage) -> Result<FrameOutcome, MatchError> {
        self.recognize_frame_top_k(frame, self.top_k)
    }

    /// Like [`Recognizer::recognize_frame`], reporting up to `top_k` ranked
    /// items. The decision itself does not depend on `top_k`.
    pub fn recognize_frame_top_k(
        &self,
        frame: &RgbImage,
        top_k: usize,
    ) -> Result<FrameOutcome, MatchError> {
        let extractor = self.extractor()?;
        let loaded = self.catalog.get()?;

        let normalized = match self.normalizer.normalize(frame) {
            Ok(image) => image,
            Err(VisionError::SourceNotReady { width, height }) => {
                warn!(width = width, height = height, "Frame source not ready, skipping");
                return Ok(FrameOutcome::Skipped(SkipReason::SourceNotReady {
                    width,
                    height,
                }));
            }
            Err(e) => return Err(e.into()),
        };

        let embedding = match extractor.extract(&normalized) {
            Ok(embedding) => embedding,
            Err(EmbeddingError::DegenerateEmbedding(msg)) => {
                warn!(reason = %msg, "Degenerate embedding, skipping frame");
                return Ok(FrameOutcome::Skipped(SkipReason::DegenerateEmbedding(msg)));
            }
            Err(e) => return Err(e.into()),
        };

        self.decide(&loaded, &embedding, top_k)
    }

    /// Search and decide for an already-extracted query embedding.
    pub fn recognize_embedding(&self, embedding: &Embedding) -> Result<FrameOutcome, MatchError> {
        let loaded = self.catalog.get()?;
        self.decide(&loaded, embedding, self.top_k)
    }

    fn decide(
        &self,
        loaded: &LoadedCatalog,
        embedding: &Embedding,
        top_k: usize,
    ) -> Result<FrameOutcome, MatchError> {
        let k = top_k.max(self.policy.required_candidates());
        let ranked = loaded.index.search(embedding, k)?;
        let decision = self.policy.decide(&ranked);

        debug!(
            top = ranked.first().map(|h| h.item_id.as_str()).unwrap_or("-"),
            similarity = ranked.first().map(|h| h.similarity).unwrap_or(f32::NAN),
            accepted = decision.is_accept(),
            "Frame decided"
        );

        let mut ranked = ranked;
        ranked.truncate(top_k.max(1));
        Ok(FrameOutcome::Decided { ranked, decision })
    }

    fn extractor(&self) -> Result<Arc<dyn FeatureExtractor>, MatchError> {
        self.extractor.get().map_err(|e| match e {
            EmbeddingError::NotReady(msg) => MatchError::NotReady(msg),
            other => MatchError::Embedding(other),
        })
    }
}
