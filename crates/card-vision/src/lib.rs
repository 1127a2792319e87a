//! # card-vision
//!
//! Pixel-level processing for the card recognizer.
//!
//! - [`ImageNormalizer`] center-crops a raw frame to the card aspect ratio
//!   and resizes it to the extractor's input resolution.
//! - [`AugmentationGenerator`] turns one reference image into synthetic
//!   camera-like variants (affine jitter, color, blur, background composition).
//! - [`BackgroundSource`] supplies backgrounds, either photos from a
//!   directory or procedurally generated surfaces.

pub mod augment;
pub mod background;
pub mod error;
pub mod normalize;

pub use augment::{AffineJitter, AugmentationGenerator, Composition, Variants};
pub use background::{BackgroundSource, Surface};
pub use error::VisionError;
pub use normalize::{crop_region, decode_image, open_image, CropRegion, ImageNormalizer};
