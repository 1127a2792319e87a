//! Candle-based feature extraction.
//!
//! Uses the CLIP ViT-B/32 vision tower plus its visual projection for
//! 512-dimensional image embeddings.

use candle_core::{DType, Device, Module, Tensor};
use candle_nn::{Linear, VarBuilder};
use candle_transformers::models::clip;
use image::RgbImage;
use tracing::{debug, info};

use crate::cache::{get_or_download_model, ModelCache};
use crate::error::EmbeddingError;
use crate::model::{Embedding, FeatureExtractor, ModelInfo};

/// Embedding dimension of the CLIP ViT-B/32 projection
pub const EMBEDDING_DIM: usize = 512;

/// Per-channel mean used by CLIP preprocessing
const CLIP_MEAN: [f32; 3] = [0.481_454_66, 0.457_827_5, 0.408_210_73];

/// Per-channel standard deviation used by CLIP preprocessing
const CLIP_STD: [f32; 3] = [0.268_629_5, 0.261_302_6, 0.275_777_1];

/// Candle-based extractor using the CLIP vision transformer.
///
/// Takes 0-255 RGB pixels at the model's native square resolution; scaling to
/// 0-1 and mean/std standardisation happen here.
pub struct CandleClipExtractor {
    vision_model: clip::vision_model::ClipVisionTransformer,
    vision_projection: Linear,
    device: Device,
    info: ModelInfo,
}

impl CandleClipExtractor {
    /// Load the model from cache (downloading if needed).
    pub fn load(cache: &ModelCache) -> Result<Self, EmbeddingError> {
        let paths = get_or_download_model(cache)?;
        Self::load_from_path(&paths.weights, &cache.repo_id)
    }

    /// Load with default cache settings
    pub fn load_default() -> Result<Self, EmbeddingError> {
        let cache = ModelCache::default();
        Self::load(&cache)
    }

    /// Load from an explicit safetensors file.
    pub fn load_from_path(
        weights_path: &std::path::Path,
        version: &str,
    ) -> Result<Self, EmbeddingError> {
        info!("Loading feature extractor...");

        if !weights_path.exists() {
            return Err(EmbeddingError::ModelNotFound(
                weights_path.display().to_string(),
            ));
        }

        // Use CPU device (GPU support can be added later with feature flags)
        let device = Device::Cpu;

        let config = clip::ClipConfig::vit_base_patch32();

        let vb = unsafe {
            VarBuilder::from_mmaped_safetensors(&[weights_path.to_path_buf()], DType::F32, &device)?
        };

        let vision_model = clip::vision_model::ClipVisionTransformer::new(
            vb.pp("vision_model"),
            &config.vision_config,
        )?;

        // CLIP projections are linear layers without bias
        let vision_projection = candle_nn::linear_no_bias(
            config.vision_config.embed_dim,
            config.text_config.projection_dim,
            vb.pp("visual_projection"),
        )?;

        let image_size = config.vision_config.image_size as u32;

        info!(
            dim = EMBEDDING_DIM,
            image_size = image_size,
            "Model loaded successfully"
        );

        Ok(Self {
            vision_model,
            vision_projection,
            device,
            info: ModelInfo {
                name: "clip-vit-base-patch32".to_string(),
                version: version.to_string(),
                dimension: EMBEDDING_DIM,
                input_width: image_size,
                input_height: image_size,
            },
        })
    }

    /// Convert one image into a standardised (3, H, W) tensor.
    fn image_to_tensor(&self, image: &RgbImage) -> Result<Tensor, EmbeddingError> {
        self.info.check_input(image)?;

        let (width, height) = (image.width() as usize, image.height() as usize);
        let pixels = Tensor::from_vec(image.as_raw().clone(), (height, width, 3), &self.device)?;

        let mean = Tensor::new(&CLIP_MEAN, &self.device)?.reshape((1, 1, 3))?;
        let std = Tensor::new(&CLIP_STD, &self.device)?.reshape((1, 1, 3))?;

        let standardised = pixels
            .to_dtype(DType::F32)?
            .affine(1.0 / 255.0, 0.0)?
            .broadcast_sub(&mean)?
            .broadcast_div(&std)?;

        Ok(standardised.permute((2, 0, 1))?)
    }

    /// Run the vision tower and projection over a (N, 3, H, W) batch.
    fn forward(&self, batch: &Tensor) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let features = self.vision_model.forward(batch)?;
        let projected = self.vision_projection.forward(&features)?;
        Ok(projected.to_vec2()?)
    }
}

impl FeatureExtractor for CandleClipExtractor {
    fn info(&self) -> &ModelInfo {
        &self.info
    }

    fn extract(&self, image: &RgbImage) -> Result<Embedding, EmbeddingError> {
        let batch = self.image_to_tensor(image)?.unsqueeze(0)?;
        let raw = self
            .forward(&batch)?
            .into_iter()
            .next()
            .ok_or_else(|| EmbeddingError::InvalidInput("model returned no rows".to_string()))?;
        Embedding::normalize(raw)
    }

    fn extract_batch(&self, images: &[RgbImage]) -> Result<Vec<Embedding>, EmbeddingError> {
        if images.is_empty() {
            return Ok(vec![]);
        }

        debug!(count = images.len(), "Extracting batch");

        let tensors = images
            .iter()
            .map(|image| self.image_to_tensor(image))
            .collect::<Result<Vec<_>, _>>()?;
        let batch = Tensor::stack(&tensors, 0)?;

        let embeddings = self
            .forward(&batch)?
            .into_iter()
            .map(Embedding::normalize)
            .collect::<Result<Vec<_>, _>>()?;

        debug!(
            count = embeddings.len(),
            dim = EMBEDDING_DIM,
            "Batch complete"
        );

        Ok(embeddings)
    }
}
