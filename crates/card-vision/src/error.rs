//! Vision error types.

use thiserror::Error;

/// Errors raised while normalizing frames or generating variants.
#[derive(Debug, Error)]
pub enum VisionError {
    /// Capture source has no usable geometry yet
    #[error("Source not ready: frame is {width}x{height}")]
    SourceNotReady { width: u32, height: u32 },

    /// Image could not be decoded or encoded
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid geometry or parameter
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// A single augmented variant could not be produced
    #[error("Augmentation failed: {0}")]
    Augmentation(String),
}
