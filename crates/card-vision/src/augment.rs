//! Augmentation generator.
//!
//! Turns one reference image into synthetic variants that look like webcam
//! captures: a small rotation with shear, zoom and shift, brightness,
//! contrast and saturation shifts, optional Gaussian or motion blur,
//! composition onto a background, and optional sensor noise. All
//! randomness comes from the caller's generator, so a fixed seed reproduces
//! the same variants.

use card_types::AugmentationSettings;
use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage, Rgba, RgbaImage};
use rand::Rng;
use tracing::{debug, warn};

use crate::background::{clamp_channel, gaussian, BackgroundSource};
use crate::error::VisionError;

/// Blur sigma range for the "mild kernel".
const BLUR_SIGMA: (f32, f32) = (0.5, 1.5);

/// Motion blur kernel lengths in pixels.
const MOTION_BLUR_LENGTHS: [u32; 2] = [3, 5];

/// Sensor noise standard deviation range (variance 5-20).
const NOISE_SIGMA: (f64, f64) = (2.2, 4.5);

/// How the card is placed on the background.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Composition {
    /// Card fills most of the frame with a thin background margin
    CloseUp,
    /// Card smaller in frame with more visible surroundings
    Scene,
}

impl Composition {
    /// Range of the card's share of the canvas, per side.
    pub fn scale_range(self) -> (f32, f32) {
        match self {
            Composition::CloseUp => (0.85, 0.95),
            Composition::Scene => (0.6, 0.9),
        }
    }

    /// Fraction of the free margin the placement may drift off center.
    pub fn jitter(self) -> f32 {
        match self {
            Composition::CloseUp => 0.2,
            Composition::Scene => 0.4,
        }
    }
}

/// Geometric jitter applied to the card about its center.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AffineJitter {
    pub rotation_deg: f32,
    pub shear_deg: f32,
    pub zoom: f32,
    /// Shift as a fraction of the image width and height
    pub translate: (f32, f32),
}

impl AffineJitter {
    pub const IDENTITY: AffineJitter = AffineJitter {
        rotation_deg: 0.0,
        shear_deg: 0.0,
        zoom: 1.0,
        translate: (0.0, 0.0),
    };

    pub fn rotation(degrees: f32) -> Self {
        Self {
            rotation_deg: degrees,
            ..Self::IDENTITY
        }
    }

    /// Draw a jitter within the configured bounds.
    fn sample<R: Rng + ?Sized>(settings: &AugmentationSettings, rng: &mut R) -> Self {
        Self {
            rotation_deg: symmetric(settings.max_rotation_deg, rng),
            shear_deg: symmetric(settings.max_shear_deg, rng),
            zoom: rng.random_range(settings.zoom_min..=settings.zoom_max),
            translate: (
                symmetric(settings.max_translate, rng),
                symmetric(settings.max_translate, rng),
            ),
        }
    }
}

/// Uniform in `[-max, max]`, or zero when the bound is zero.
fn symmetric<R: Rng + ?Sized>(max: f32, rng: &mut R) -> f32 {
    if max > 0.0 {
        rng.random_range(-max..=max)
    } else {
        0.0
    }
}

/// Variants produced for one reference image.
#[derive(Debug, Default)]
pub struct Variants {
    pub images: Vec<RgbImage>,
    /// Variants whose pipeline failed and were skipped
    pub failed: usize,
}

/// Generates camera-like variants of reference images.
#[derive(Debug, Clone)]
pub struct AugmentationGenerator {
    settings: AugmentationSettings,
    backgrounds: BackgroundSource,
}

impl AugmentationGenerator {
    pub fn new(
        settings: AugmentationSettings,
        backgrounds: BackgroundSource,
    ) -> Result<Self, VisionError> {
        settings.validate().map_err(VisionError::InvalidParameter)?;
        let backgrounds = backgrounds.fit_to(settings.canvas_width, settings.canvas_height);
        Ok(Self {
            settings,
            backgrounds,
        })
    }

    pub fn canvas_size(&self) -> (u32, u32) {
        (self.settings.canvas_width, self.settings.canvas_height)
    }

    /// Resize a reference image to the canvas. This is the untouched variant.
    pub fn prepare_reference(&self, reference: &RgbImage) -> Result<RgbImage, VisionError> {
        if reference.width() == 0 || reference.height() == 0 {
            return Err(VisionError::InvalidParameter(
                "reference image is empty".to_string(),
            ));
        }
        let (width, height) = self.canvas_size();
        Ok(imageops::resize(reference, width, height, FilterType::Triangle))
    }

    /// Generate up to `count` variants of `reference`.
    ///
    /// A variant that fails is logged and skipped; the rest still come back.
    pub fn generate<R: Rng + ?Sized>(
        &self,
        reference: &RgbImage,
        count: usize,
        rng: &mut R,
    ) -> Variants {
        let base = match self.prepare_reference(reference) {
            Ok(base) => base,
            Err(e) => {
                warn!(error = %e, "Cannot augment reference image");
                return Variants {
                    images: Vec::new(),
                    failed: count,
                };
            }
        };

        let mut variants = Variants::default();
        for index in 0..count {
            match self.variant(&base, rng) {
                Ok(image) => variants.images.push(image),
                Err(e) => {
                    warn!(variant = index, error = %e, "Augmented variant failed, skipping");
                    variants.failed += 1;
                }
            }
        }

        debug!(
            generated = variants.images.len(),
            failed = variants.failed,
            "Augmentation complete"
        );
        variants
    }

    /// Run the full pipeline once on a canvas-sized base image.
    pub fn variant<R: Rng + ?Sized>(
        &self,
        base: &RgbImage,
        rng: &mut R,
    ) -> Result<RgbImage, VisionError> {
        let s = &self.settings;

        let jitter = AffineJitter::sample(s, rng);
        let mut card = affine_about_center(&rgba_from(base), jitter);

        let brightness = rng.random_range(s.brightness_min..=s.brightness_max);
        let contrast = rng.random_range(s.contrast_min..=s.contrast_max);
        let saturation = rng.random_range(s.saturation_min..=s.saturation_max);
        adjust_color(&mut card, brightness, saturation);
        adjust_contrast(&mut card, contrast);

        if rng.random_bool(s.blur_probability) {
            card = if rng.random_bool(s.motion_blur_share) {
                let length = MOTION_BLUR_LENGTHS[rng.random_range(0..MOTION_BLUR_LENGTHS.len())];
                let angle = rng.random_range(0.0..180.0);
                motion_blur(&card, length, angle)
            } else {
                let sigma = rng.random_range(BLUR_SIGMA.0..=BLUR_SIGMA.1);
                imageops::blur(&card, sigma)
            };
        }

        let composition = if rng.random_bool(s.closeup_probability) {
            Composition::CloseUp
        } else {
            Composition::Scene
        };
        let mut canvas = self.compose(&card, composition, rng)?;

        if rng.random_bool(s.noise_probability) {
            let sigma = rng.random_range(NOISE_SIGMA.0..=NOISE_SIGMA.1);
            add_noise(&mut canvas, sigma, rng);
        }

        Ok(canvas)
    }

    /// Scale `card` per the composition and place it on a fresh background.
    fn compose<R: Rng + ?Sized>(
        &self,
        card: &RgbaImage,
        composition: Composition,
        rng: &mut R,
    ) -> Result<RgbImage, VisionError> {
        let (canvas_w, canvas_h) = self.canvas_size();
        let (lo, hi) = composition.scale_range();
        let scale = rng.random_range(lo..=hi);

        let card_w = (canvas_w as f32 * scale) as u32;
        let card_h = (canvas_h as f32 * scale) as u32;
        if card_w == 0 || card_h == 0 {
            return Err(VisionError::Augmentation(format!(
                "card scaled to {card_w}x{card_h} on a {canvas_w}x{canvas_h} canvas"
            )));
        }
        let scaled = imageops::resize(card, card_w, card_h, FilterType::Triangle);

        let x = placement(canvas_w - card_w, composition.jitter(), rng);
        let y = placement(canvas_h - card_h, composition.jitter(), rng);

        let background = self.backgrounds.generate(rng, canvas_w, canvas_h);
        let mut canvas = rgba_from(&background);
        imageops::overlay(&mut canvas, &scaled, x as i64, y as i64);

        Ok(rgb_from(&canvas))
    }
}

/// Offset within `free` pixels of slack: centered, jittered by up to
/// `jitter * free`, and clamped so the card stays on the canvas.
fn placement<R: Rng + ?Sized>(free: u32, jitter: f32, rng: &mut R) -> u32 {
    let center = (free / 2) as i64;
    let spread = (free as f32 * jitter) as i64;
    let offset = if spread > 0 {
        center + rng.random_range(-spread..=spread)
    } else {
        center
    };
    offset.clamp(0, free as i64) as u32
}

fn rgba_from(image: &RgbImage) -> RgbaImage {
    RgbaImage::from_fn(image.width(), image.height(), |x, y| {
        let [r, g, b] = image.get_pixel(x, y).0;
        Rgba([r, g, b, 255])
    })
}

fn rgb_from(image: &RgbaImage) -> RgbImage {
    RgbImage::from_fn(image.width(), image.height(), |x, y| {
        let [r, g, b, _] = image.get_pixel(x, y).0;
        Rgb([r, g, b])
    })
}

/// Rotate by `degrees` about the image center, keeping the original size.
pub fn rotate_about_center(image: &RgbaImage, degrees: f32) -> RgbaImage {
    affine_about_center(image, AffineJitter::rotation(degrees))
}

/// Zoom, shear, rotate and shift about the image center, keeping the
/// original size.
///
/// Content pushed out of the frame is cut off; uncovered areas become
/// transparent so the background shows through after composition.
pub fn affine_about_center(image: &RgbaImage, jitter: AffineJitter) -> RgbaImage {
    if jitter == AffineJitter::IDENTITY {
        return image.clone();
    }

    let (width, height) = image.dimensions();
    let (sin, cos) = (jitter.rotation_deg as f64).to_radians().sin_cos();
    let shear = (jitter.shear_deg as f64).to_radians().tan();
    let zoom = (jitter.zoom as f64).max(1e-3);

    // Forward matrix rotate * shear * zoom; its determinant is zoom^2
    let a = cos * zoom;
    let b = (cos * shear - sin) * zoom;
    let c = sin * zoom;
    let d = (sin * shear + cos) * zoom;
    let det = zoom * zoom;

    let cx = (width as f64 - 1.0) / 2.0 + jitter.translate.0 as f64 * width as f64;
    let cy = (height as f64 - 1.0) / 2.0 + jitter.translate.1 as f64 * height as f64;
    let (ox, oy) = ((width as f64 - 1.0) / 2.0, (height as f64 - 1.0) / 2.0);

    RgbaImage::from_fn(width, height, |x, y| {
        // Inverse-map each output pixel into the source
        let dx = x as f64 - cx;
        let dy = y as f64 - cy;
        let sx = (d * dx - b * dy) / det + ox;
        let sy = (-c * dx + a * dy) / det + oy;
        sample_bilinear(image, sx, sy)
    })
}

/// Average `length` samples along a line at `angle_deg`, like a short shake
/// during exposure. Samples past the border repeat the edge pixel.
pub fn motion_blur(image: &RgbaImage, length: u32, angle_deg: f32) -> RgbaImage {
    if length <= 1 {
        return image.clone();
    }

    let (width, height) = image.dimensions();
    let (sin, cos) = (angle_deg as f64).to_radians().sin_cos();
    let half = (length - 1) as f64 / 2.0;
    let offsets: Vec<(f64, f64)> = (0..length)
        .map(|i| {
            let t = i as f64 - half;
            (t * cos, t * sin)
        })
        .collect();

    RgbaImage::from_fn(width, height, |x, y| {
        let mut sum = [0.0f64; 4];
        for &(ox, oy) in &offsets {
            let sx = (x as f64 + ox).round().clamp(0.0, (width - 1) as f64) as u32;
            let sy = (y as f64 + oy).round().clamp(0.0, (height - 1) as f64) as u32;
            let p = image.get_pixel(sx, sy).0;
            for (total, value) in sum.iter_mut().zip(p) {
                *total += value as f64;
            }
        }
        Rgba(std::array::from_fn(|c| clamp_channel(sum[c] / length as f64)))
    })
}

fn sample_bilinear(image: &RgbaImage, x: f64, y: f64) -> Rgba<u8> {
    let (width, height) = image.dimensions();
    if x < -0.5 || y < -0.5 || x > width as f64 - 0.5 || y > height as f64 - 0.5 {
        return Rgba([0, 0, 0, 0]);
    }

    let x = x.clamp(0.0, (width - 1) as f64);
    let y = y.clamp(0.0, (height - 1) as f64);
    let x0 = x.floor() as u32;
    let y0 = y.floor() as u32;
    let x1 = (x0 + 1).min(width - 1);
    let y1 = (y0 + 1).min(height - 1);
    let fx = x - x0 as f64;
    let fy = y - y0 as f64;

    let p00 = image.get_pixel(x0, y0).0;
    let p10 = image.get_pixel(x1, y0).0;
    let p01 = image.get_pixel(x0, y1).0;
    let p11 = image.get_pixel(x1, y1).0;

    Rgba(std::array::from_fn(|c| {
        let top = p00[c] as f64 * (1.0 - fx) + p10[c] as f64 * fx;
        let bottom = p01[c] as f64 * (1.0 - fx) + p11[c] as f64 * fx;
        clamp_channel(top * (1.0 - fy) + bottom * fy)
    }))
}

/// Scale brightness, then push colors toward or away from their luma.
fn adjust_color(image: &mut RgbaImage, brightness: f32, saturation: f32) {
    let (brightness, saturation) = (brightness as f64, saturation as f64);
    for pixel in image.pixels_mut() {
        let rgb: [f64; 3] = std::array::from_fn(|c| pixel[c] as f64 * brightness);
        let luma = 0.299 * rgb[0] + 0.587 * rgb[1] + 0.114 * rgb[2];
        for (c, value) in rgb.iter().enumerate() {
            pixel[c] = clamp_channel(luma + (value - luma) * saturation);
        }
    }
}

/// Stretch (`factor > 1`) or flatten (`factor < 1`) the visible pixels
/// around their mean luma.
fn adjust_contrast(image: &mut RgbaImage, factor: f32) {
    if factor == 1.0 {
        return;
    }

    let (mut total, mut count) = (0.0f64, 0usize);
    for pixel in image.pixels().filter(|p| p[3] > 0) {
        total += 0.299 * pixel[0] as f64 + 0.587 * pixel[1] as f64 + 0.114 * pixel[2] as f64;
        count += 1;
    }
    if count == 0 {
        return;
    }
    let mean = total / count as f64;

    let factor = factor as f64;
    for pixel in image.pixels_mut().filter(|p| p[3] > 0) {
        for c in 0..3 {
            pixel[c] = clamp_channel(mean + (pixel[c] as f64 - mean) * factor);
        }
    }
}

fn add_noise<R: Rng + ?Sized>(image: &mut RgbImage, sigma: f64, rng: &mut R) {
    for pixel in image.pixels_mut() {
        for c in 0..3 {
            pixel[c] = clamp_channel(pixel[c] as f64 + gaussian(rng) * sigma);
        }
    }
}
