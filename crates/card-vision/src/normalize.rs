//! Frame normalization.
//!
//! Center-crops a raw frame to the card aspect ratio, then resizes it to the
//! exact resolution the feature extractor expects. Output pixels stay in the
//! 0-255 range; extractors do their own scaling.

use std::path::Path;

use card_types::NormalizerSettings;
use image::imageops::{self, FilterType};
use image::{DynamicImage, RgbImage};

use crate::error::VisionError;

/// Rectangle inside a source frame, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl CropRegion {
    /// Margins (left, right, top, bottom) relative to a source of the given size.
    pub fn margins(&self, src_width: u32, src_height: u32) -> (u32, u32, u32, u32) {
        (
            self.x,
            src_width - self.x - self.width,
            self.y,
            src_height - self.y - self.height,
        )
    }
}

/// Compute the centered crop of a `src_width` x `src_height` frame with the
/// given width:height ratio.
///
/// A relatively wider source loses equal columns on the left and right; a
/// relatively taller one loses equal rows top and bottom. Odd leftovers go to
/// the right/bottom, so margins differ by at most one pixel.
pub fn crop_region(
    src_width: u32,
    src_height: u32,
    aspect_ratio: f32,
) -> Result<CropRegion, VisionError> {
    if src_width == 0 || src_height == 0 {
        return Err(VisionError::SourceNotReady {
            width: src_width,
            height: src_height,
        });
    }
    if !(aspect_ratio.is_finite() && aspect_ratio > 0.0) {
        return Err(VisionError::InvalidParameter(format!(
            "aspect ratio must be positive, got {aspect_ratio}"
        )));
    }

    let target = aspect_ratio as f64;
    let source = src_width as f64 / src_height as f64;

    let (width, height) = if source > target {
        let w = (src_height as f64 * target).round() as u32;
        (w.clamp(1, src_width), src_height)
    } else {
        let h = (src_width as f64 / target).round() as u32;
        (src_width, h.clamp(1, src_height))
    };

    Ok(CropRegion {
        x: (src_width - width) / 2,
        y: (src_height - height) / 2,
        width,
        height,
    })
}

/// Crops and resizes raw frames to the extractor's canonical input.
#[derive(Debug, Clone)]
pub struct ImageNormalizer {
    aspect_ratio: f32,
    width: u32,
    height: u32,
}

impl ImageNormalizer {
    pub fn new(aspect_ratio: f32, width: u32, height: u32) -> Result<Self, VisionError> {
        if !(aspect_ratio.is_finite() && aspect_ratio > 0.0) {
            return Err(VisionError::InvalidParameter(format!(
                "aspect ratio must be positive, got {aspect_ratio}"
            )));
        }
        if width == 0 || height == 0 {
            return Err(VisionError::InvalidParameter(
                "output size must be non-zero".to_string(),
            ));
        }
        Ok(Self {
            aspect_ratio,
            width,
            height,
        })
    }

    pub fn from_settings(settings: &NormalizerSettings) -> Result<Self, VisionError> {
        Self::new(settings.aspect_ratio, settings.width, settings.height)
    }

    /// Output resolution (width, height).
    pub fn output_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn aspect_ratio(&self) -> f32 {
        self.aspect_ratio
    }

    /// Normalize an RGB frame.
    pub fn normalize(&self, frame: &RgbImage) -> Result<RgbImage, VisionError> {
        let region = crop_region(frame.width(), frame.height(), self.aspect_ratio)?;
        let cropped =
            imageops::crop_imm(frame, region.x, region.y, region.width, region.height).to_image();
        Ok(imageops::resize(
            &cropped,
            self.width,
            self.height,
            FilterType::Triangle,
        ))
    }

    /// Normalize a decoded image of any color type.
    pub fn normalize_dynamic(&self, frame: &DynamicImage) -> Result<RgbImage, VisionError> {
        if frame.width() == 0 || frame.height() == 0 {
            return Err(VisionError::SourceNotReady {
                width: frame.width(),
                height: frame.height(),
            });
        }
        self.normalize(&frame.to_rgb8())
    }
}

/// Decode an encoded image (PNG, JPEG) into RGB pixels.
pub fn decode_image(bytes: &[u8]) -> Result<RgbImage, VisionError> {
    if bytes.is_empty() {
        return Err(VisionError::InvalidParameter("empty image".to_string()));
    }
    Ok(image::load_from_memory(bytes)?.to_rgb8())
}

/// Read and decode an image file into RGB pixels.
pub fn open_image(path: &Path) -> Result<RgbImage, VisionError> {
    Ok(image::open(path)?.to_rgb8())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;
    use std::io::Cursor;

    #[test]
    fn test_wider_source_crops_horizontally_centered() {
        let region = crop_region(640, 480, 0.72).unwrap();
        assert_eq!(region.height, 480);
        assert_eq!(region.width, 346);
        let (left, right, top, bottom) = region.margins(640, 480);
        assert!(left.abs_diff(right) <= 1, "left {left} right {right}");
        assert_eq!((top, bottom), (0, 0));
    }

    #[test]
    fn test_taller_source_crops_vertically_centered() {
        let region = crop_region(300, 1000, 0.72).unwrap();
        assert_eq!(region.width, 300);
        assert_eq!(region.height, 417);
        let (left, right, top, bottom) = region.margins(300, 1000);
        assert_eq!((left, right), (0, 0));
        assert!(top.abs_diff(bottom) <= 1, "top {top} bottom {bottom}");
    }

    #[test]
    fn test_margins_centered_across_sizes() {
        for (w, h) in [(1, 1), (3, 2), (641, 479), (1920, 1080), (720, 1280), (99, 1001)] {
            let region = crop_region(w, h, 0.72).unwrap();
            let (left, right, top, bottom) = region.margins(w, h);
            assert!(left.abs_diff(right) <= 1, "{w}x{h}");
            assert!(top.abs_diff(bottom) <= 1, "{w}x{h}");
            assert!(region.width >= 1 && region.height >= 1);
        }
    }

    #[test]
    fn test_exact_aspect_is_untouched() {
        let region = crop_region(72, 100, 0.72).unwrap();
        assert_eq!(
            region,
            CropRegion {
                x: 0,
                y: 0,
                width: 72,
                height: 100
            }
        );
    }

    #[test]
    fn test_zero_dimension_is_source_not_ready() {
        assert!(matches!(
            crop_region(0, 480, 0.72),
            Err(VisionError::SourceNotReady {
                width: 0,
                height: 480
            })
        ));
        assert!(matches!(
            crop_region(640, 0, 0.72),
            Err(VisionError::SourceNotReady { .. })
        ));
    }

    #[test]
    fn test_normalize_output_size() {
        let normalizer = ImageNormalizer::new(0.72, 224, 224).unwrap();
        let frame = RgbImage::from_pixel(640, 480, Rgb([10, 20, 30]));
        let out = normalizer.normalize(&frame).unwrap();
        assert_eq!(out.dimensions(), (224, 224));
        assert_eq!(out.get_pixel(100, 100), &Rgb([10, 20, 30]));
    }

    #[test]
    fn test_normalize_discards_side_columns() {
        // Red side bands outside the centered crop, green inside it
        let frame = RgbImage::from_fn(640, 480, |x, _| {
            if (147..493).contains(&x) {
                Rgb([0, 255, 0])
            } else {
                Rgb([255, 0, 0])
            }
        });
        let normalizer = ImageNormalizer::new(0.72, 36, 50).unwrap();
        let out = normalizer.normalize(&frame).unwrap();
        assert!(out.pixels().all(|p| p[0] == 0 && p[1] == 255));
    }

    #[test]
    fn test_normalize_empty_frame() {
        let normalizer = ImageNormalizer::new(0.72, 224, 224).unwrap();
        assert!(matches!(
            normalizer.normalize(&RgbImage::new(0, 0)),
            Err(VisionError::SourceNotReady { .. })
        ));
    }

    #[test]
    fn test_invalid_normalizer_params() {
        assert!(ImageNormalizer::new(0.0, 224, 224).is_err());
        assert!(ImageNormalizer::new(f32::NAN, 224, 224).is_err());
        assert!(ImageNormalizer::new(0.72, 0, 224).is_err());
    }

    #[test]
    fn test_decode_png() {
        let img = RgbImage::from_pixel(8, 6, Rgb([1, 2, 3]));
        let mut bytes = Vec::new();
        img.write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
            .unwrap();
        let decoded = decode_image(&bytes).unwrap();
        assert_eq!(decoded.dimensions(), (8, 6));
        assert_eq!(decoded.get_pixel(0, 0), &Rgb([1, 2, 3]));
    }

    #[test]
    fn test_decode_garbage() {
        assert!(decode_image(b"not an image").is_err());
        assert!(matches!(
            decode_image(&[]),
            Err(VisionError::InvalidParameter(_))
        ));
    }
}
