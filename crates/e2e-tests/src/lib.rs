//! End-to-end test infrastructure for the card recognizer.
//!
//! Provides a shared TestHarness and helpers for tests covering the full
//! build -> persist -> load -> identify -> confirm pipeline. Everything runs
//! on the thumbnail extractor so no model download is needed.

use std::io::Cursor;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use image::{ImageFormat, Rgb, RgbImage};

use card_catalog::{BuildStats, Catalog};
use card_matcher::Recognizer;
use card_types::{ExtractorKind, Settings};

/// Reference card width in pixels (roughly the 63x88 card aspect).
pub const CARD_WIDTH: u32 = 250;
/// Reference card height in pixels.
pub const CARD_HEIGHT: u32 = 350;

const BLOCK: u32 = 50;
const BORDER: u32 = 6;

/// Shared test harness for E2E tests.
///
/// Owns a temp directory holding the reference corpus, a frames directory
/// and the catalog file, plus settings pointing at them.
pub struct TestHarness {
    /// Keeps temp dir alive for the lifetime of the harness
    pub _temp_dir: tempfile::TempDir,
    pub references_dir: PathBuf,
    pub frames_dir: PathBuf,
    pub catalog_path: PathBuf,
    pub settings: Settings,
}

impl TestHarness {
    /// Create a harness with empty reference and frame directories.
    pub fn new() -> Self {
        let temp_dir = tempfile::TempDir::new().expect("Failed to create temp dir");
        let references_dir = temp_dir.path().join("references");
        let frames_dir = temp_dir.path().join("frames");
        std::fs::create_dir_all(&references_dir).expect("Failed to create references dir");
        std::fs::create_dir_all(&frames_dir).expect("Failed to create frames dir");
        let catalog_path = temp_dir.path().join("catalog").join("catalog.json");

        let mut settings = Settings::default();
        settings.catalog.path = catalog_path.to_string_lossy().to_string();
        settings.catalog.images_dir = references_dir.to_string_lossy().to_string();
        settings.catalog.variants_per_image = 3;
        settings.extractor.kind = ExtractorKind::Thumbnail;
        settings.extractor.thumbnail_grid = 8;

        Self {
            _temp_dir: temp_dir,
            references_dir,
            frames_dir,
            catalog_path,
            settings,
        }
    }

    /// Write `<stem>.png` into the reference corpus.
    pub fn write_reference(&self, stem: &str, seed: u64) -> PathBuf {
        let path = self.references_dir.join(format!("{}.png", stem));
        synthetic_card(seed)
            .save(&path)
            .expect("Failed to write reference image");
        path
    }

    /// Write a frame for the directory frame source.
    pub fn write_frame(&self, name: &str, image: &RgbImage) -> PathBuf {
        let path = self.frames_dir.join(name);
        image.save(&path).expect("Failed to write frame");
        path
    }

    /// Write the standard three-card corpus.
    pub fn write_standard_corpus(&self) {
        self.write_reference("sv01-001_Bulbasaur", 1);
        self.write_reference("sv01-004_Charmander", 2);
        self.write_reference("sv01-007_Squirtle", 3);
    }

    /// Build and save the catalog with the harness settings.
    pub fn build(&self) -> anyhow::Result<(Catalog, BuildStats)> {
        card_daemon::build_catalog(&self.settings)
    }

    /// Load a recognizer over the saved catalog.
    pub fn recognizer(&self) -> anyhow::Result<Recognizer> {
        card_daemon::load_recognizer(&self.settings)
    }

    /// Path of a file inside the harness temp dir.
    pub fn path(&self, name: &str) -> PathBuf {
        self._temp_dir.path().join(name)
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// A synthetic card face: dark border around a grid of seeded color blocks.
///
/// Different seeds give unrelated block colors, so cards are far apart in
/// feature space.
pub fn synthetic_card(seed: u64) -> RgbImage {
    RgbImage::from_fn(CARD_WIDTH, CARD_HEIGHT, |x, y| {
        if x < BORDER || y < BORDER || x >= CARD_WIDTH - BORDER || y >= CARD_HEIGHT - BORDER {
            return Rgb([20, 20, 20]);
        }
        let block = (y / BLOCK) * (CARD_WIDTH / BLOCK + 1) + x / BLOCK;
        let h = mix(seed.wrapping_mul(1_000_003).wrapping_add(block as u64));
        Rgb([(h & 0xff) as u8, ((h >> 8) & 0xff) as u8, ((h >> 16) & 0xff) as u8])
    })
}

/// Splitmix64 finalizer.
fn mix(mut z: u64) -> u64 {
    z = z.wrapping_add(0x9e37_79b9_7f4a_7c15);
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}

/// Encode an image as PNG bytes.
pub fn png_bytes(image: &RgbImage) -> Vec<u8> {
    let mut bytes = Cursor::new(Vec::new());
    image
        .write_to(&mut bytes, ImageFormat::Png)
        .expect("Failed to encode PNG");
    bytes.into_inner()
}

/// A localhost address with a currently free port.
pub fn free_addr() -> SocketAddr {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("Failed to bind");
    listener.local_addr().expect("No local address")
}

/// Read the catalog file back.
pub fn load_catalog(path: &Path) -> Catalog {
    Catalog::load(path).expect("Failed to load catalog")
}
