//! Deterministic pixel-grid extractor.
//!
//! Downsamples the image to a small square grid and uses the mean-centred
//! colour values as the feature vector. No model weights are needed, which
//! makes it suitable for tests and offline demos.

use image::imageops::{self, FilterType};
use image::RgbImage;

use crate::error::EmbeddingError;
use crate::model::{Embedding, FeatureExtractor, ModelInfo};

/// Default side length of the sampling grid.
pub const DEFAULT_GRID: u32 = 16;

pub struct ThumbnailExtractor {
    grid: u32,
    info: ModelInfo,
}

impl ThumbnailExtractor {
    /// Create an extractor for images of `input_width` x `input_height`.
    pub fn new(grid: u32, input_width: u32, input_height: u32) -> Result<Self, EmbeddingError> {
        if grid == 0 {
            return Err(EmbeddingError::InvalidInput(
                "thumbnail grid must be at least 1".to_string(),
            ));
        }
        if input_width == 0 || input_height == 0 {
            return Err(EmbeddingError::InvalidInput(
                "input size must be non-zero".to_string(),
            ));
        }

        Ok(Self {
            grid,
            info: ModelInfo {
                name: "thumbnail".to_string(),
                version: format!("grid{grid}"),
                dimension: (grid * grid * 3) as usize,
                input_width,
                input_height,
            },
        })
    }

    pub fn grid(&self) -> u32 {
        self.grid
    }
}

impl FeatureExtractor for ThumbnailExtractor {
    fn info(&self) -> &ModelInfo {
        &self.info
    }

    fn extract(&self, image: &RgbImage) -> Result<Embedding, EmbeddingError> {
        self.info.check_input(image)?;

        let small = imageops::resize(image, self.grid, self.grid, FilterType::Triangle);

        let cells = (self.grid * self.grid) as f32;
        let mut means = [0.0f32; 3];
        for pixel in small.pixels() {
            for (c, mean) in means.iter_mut().enumerate() {
                *mean += pixel[c] as f32;
            }
        }
        for mean in &mut means {
            *mean /= cells;
        }

        // Centre each channel so a flat colour carries no signal
        let values: Vec<f32> = small
            .pixels()
            .flat_map(|p| (0..3).map(move |c| (p[c] as f32 - means[c]) / 255.0))
            .collect();

        Embedding::normalize(values)
    }
}
