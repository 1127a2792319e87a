//! Background sources for augmentation.
//!
//! Photos from a directory are preferred when present; otherwise a flat
//! surface color with texture noise and an optional lighting gradient is
//! generated.

use std::path::Path;
use std::sync::Arc;

use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};
use rand::seq::IndexedRandom;
use rand::Rng;
use tracing::{debug, warn};

use crate::error::VisionError;

/// Standard deviation of per-pixel texture noise on synthetic surfaces.
const TEXTURE_NOISE_SIGMA: f64 = 15.0;

/// Probability of a vertical lighting gradient on synthetic surfaces.
const GRADIENT_PROBABILITY: f64 = 0.3;

/// Gradient runs from -AMPLITUDE at the top row to +AMPLITUDE at the bottom.
const GRADIENT_AMPLITUDE: f64 = 20.0;

/// Common surfaces a card is photographed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Surface {
    Wood,
    Table,
    Dark,
    White,
    Desk,
}

impl Surface {
    pub const ALL: [Surface; 5] = [
        Surface::Wood,
        Surface::Table,
        Surface::Dark,
        Surface::White,
        Surface::Desk,
    ];

    /// Inclusive-exclusive per-channel base color range.
    pub fn color_range(self) -> ([u8; 3], [u8; 3]) {
        match self {
            Surface::Wood => ([101, 67, 33], [139, 90, 43]),
            Surface::Table => ([180, 180, 180], [220, 220, 220]),
            Surface::Dark => ([20, 20, 20], [60, 60, 60]),
            Surface::White => ([230, 230, 230], [255, 255, 255]),
            Surface::Desk => ([70, 50, 40], [100, 80, 60]),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Surface::Wood => "wood",
            Surface::Table => "table",
            Surface::Dark => "dark",
            Surface::White => "white",
            Surface::Desk => "desk",
        }
    }

    /// Render this surface at the given size.
    pub fn render<R: Rng + ?Sized>(self, rng: &mut R, width: u32, height: u32) -> RgbImage {
        let (min, max) = self.color_range();
        let base: [f64; 3] = std::array::from_fn(|c| rng.random_range(min[c]..max[c]) as f64);

        let gradient = rng.random_bool(GRADIENT_PROBABILITY);
        let span = height.saturating_sub(1).max(1) as f64;

        let mut image = RgbImage::new(width, height);
        for (_, y, pixel) in image.enumerate_pixels_mut() {
            let shade = if gradient {
                -GRADIENT_AMPLITUDE + 2.0 * GRADIENT_AMPLITUDE * (y as f64 / span)
            } else {
                0.0
            };
            *pixel = Rgb(std::array::from_fn(|c| {
                let noise = gaussian(rng) * TEXTURE_NOISE_SIGMA;
                clamp_channel(base[c] + noise + shade)
            }));
        }
        image
    }
}

/// Standard normal sample via Box-Muller.
pub(crate) fn gaussian<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    let u1: f64 = 1.0 - rng.random::<f64>();
    let u2: f64 = rng.random::<f64>();
    (-2.0 * u1.ln()).sqrt() * (std::f64::consts::TAU * u2).cos()
}

pub(crate) fn clamp_channel(value: f64) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}

/// Supplies augmentation backgrounds.
#[derive(Debug, Clone, Default)]
pub struct BackgroundSource {
    /// Decoded once at load; shared between clones
    photos: Vec<Arc<RgbImage>>,
}

impl BackgroundSource {
    /// Procedural surfaces only.
    pub fn synthetic() -> Self {
        Self::default()
    }

    /// Decode the `.jpg`/`.png` photos in `dir` when there are any.
    ///
    /// A missing directory is not an error; it falls back to synthetic
    /// surfaces. A photo that fails to decode is logged and left out.
    /// Paths are sorted so seeded builds pick the same photos.
    pub fn from_dir(dir: &Path) -> Result<Self, VisionError> {
        if !dir.is_dir() {
            debug!(dir = %dir.display(), "No backgrounds directory, using synthetic surfaces");
            return Ok(Self::synthetic());
        }

        let mut paths = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_file() && has_photo_extension(&path) {
                paths.push(path);
            }
        }
        paths.sort();

        let mut photos = Vec::with_capacity(paths.len());
        for path in &paths {
            match image::open(path) {
                Ok(photo) => photos.push(Arc::new(photo.to_rgb8())),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Background photo unreadable, skipping");
                }
            }
        }

        debug!(
            dir = %dir.display(),
            found = paths.len(),
            loaded = photos.len(),
            "Loaded background photos"
        );
        Ok(Self { photos })
    }

    /// Resize every photo to `width` x `height` up front so `generate` at
    /// that size only copies pixels.
    pub fn fit_to(self, width: u32, height: u32) -> Self {
        let photos = self
            .photos
            .into_iter()
            .map(|photo| {
                if photo.dimensions() == (width, height) {
                    photo
                } else {
                    Arc::new(imageops::resize(&*photo, width, height, FilterType::Triangle))
                }
            })
            .collect();
        Self { photos }
    }

    pub fn photo_count(&self) -> usize {
        self.photos.len()
    }

    /// Produce a `width` x `height` background.
    pub fn generate<R: Rng + ?Sized>(&self, rng: &mut R, width: u32, height: u32) -> RgbImage {
        if let Some(photo) = self.photos.choose(rng) {
            if photo.dimensions() == (width, height) {
                return RgbImage::clone(photo);
            }
            return imageops::resize(&**photo, width, height, FilterType::Triangle);
        }

        let surface = Surface::ALL[rng.random_range(0..Surface::ALL.len())];
        surface.render(rng, width, height)
    }
}

fn has_photo_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| matches!(e.to_ascii_lowercase().as_str(), "jpg" | "jpeg" | "png"))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use tempfile::TempDir;

    fn mean_color(image: &RgbImage) -> [f64; 3] {
        let n = (image.width() * image.height()) as f64;
        let mut sum = [0.0; 3];
        for p in image.pixels() {
            for c in 0..3 {
                sum[c] += p[c] as f64;
            }
        }
        sum.map(|s| s / n)
    }

    #[test]
    fn test_surface_stays_near_palette() {
        let mut rng = StdRng::seed_from_u64(1);
        for surface in Surface::ALL {
            let image = surface.render(&mut rng, 64, 64);
            let (min, max) = surface.color_range();
            let mean = mean_color(&image);
            for c in 0..3 {
                // Noise and gradient average out; allow a few levels of slack
                assert!(
                    mean[c] >= min[c] as f64 - 6.0 && mean[c] <= max[c] as f64 + 6.0,
                    "{} channel {c} mean {}",
                    surface.name(),
                    mean[c]
                );
            }
        }
    }

    #[test]
    fn test_surface_has_texture() {
        let mut rng = StdRng::seed_from_u64(2);
        let image = Surface::Table.render(&mut rng, 32, 32);
        let first = image.get_pixel(0, 0);
        assert!(image.pixels().any(|p| p != first));
    }

    #[test]
    fn test_synthetic_is_deterministic() {
        let source = BackgroundSource::synthetic();
        let a = source.generate(&mut StdRng::seed_from_u64(9), 40, 30);
        let b = source.generate(&mut StdRng::seed_from_u64(9), 40, 30);
        assert_eq!(a, b);
        assert_eq!(a.dimensions(), (40, 30));
    }

    #[test]
    fn test_missing_dir_falls_back() {
        let source = BackgroundSource::from_dir(Path::new("/nonexistent/backgrounds")).unwrap();
        assert_eq!(source.photo_count(), 0);
    }

    #[test]
    fn test_photos_are_used_and_resized() {
        let dir = TempDir::new().unwrap();
        RgbImage::from_pixel(10, 10, Rgb([7, 200, 9]))
            .save(dir.path().join("felt.png"))
            .unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let source = BackgroundSource::from_dir(dir.path()).unwrap();
        assert_eq!(source.photo_count(), 1);

        let bg = source.generate(&mut StdRng::seed_from_u64(3), 50, 70);
        assert_eq!(bg.dimensions(), (50, 70));
        assert_eq!(bg.get_pixel(25, 35), &Rgb([7, 200, 9]));
    }

    #[test]
    fn test_unreadable_photo_is_skipped_at_load() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("broken.jpg"), b"not a jpeg").unwrap();

        let source = BackgroundSource::from_dir(dir.path()).unwrap();
        assert_eq!(source.photo_count(), 0);
        let bg = source.generate(&mut StdRng::seed_from_u64(4), 20, 20);
        assert_eq!(bg.dimensions(), (20, 20));
    }

    #[test]
    fn test_photos_decoded_once_at_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("desk.png");
        RgbImage::from_pixel(12, 8, Rgb([40, 60, 80])).save(&path).unwrap();

        let source = BackgroundSource::from_dir(dir.path()).unwrap().fit_to(30, 20);
        // The file is no longer needed once loaded
        std::fs::remove_file(&path).unwrap();

        let mut rng = StdRng::seed_from_u64(6);
        for _ in 0..3 {
            let bg = source.generate(&mut rng, 30, 20);
            assert_eq!(bg.dimensions(), (30, 20));
            assert_eq!(bg.get_pixel(15, 10), &Rgb([40, 60, 80]));
        }
        // Other sizes are still served
        assert_eq!(source.generate(&mut rng, 9, 9).dimensions(), (9, 9));
    }

    #[test]
    fn test_gaussian_is_roughly_standard() {
        let mut rng = StdRng::seed_from_u64(5);
        let samples: Vec<f64> = (0..20_000).map(|_| gaussian(&mut rng)).collect();
        let mean = samples.iter().sum::<f64>() / samples.len() as f64;
        let var = samples.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / samples.len() as f64;
        assert!(mean.abs() < 0.05, "mean {mean}");
        assert!((var - 1.0).abs() < 0.05, "variance {var}");
    }
}
