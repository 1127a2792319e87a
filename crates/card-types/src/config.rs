//! Configuration loading for the card recognizer.
//!
//! Layered config: defaults -> config file -> env vars -> CLI flags.
//! The default config file lives at `~/.config/card-recognizer/config.toml`.

use config::{Config, Environment, File};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::CardError;

const APP_NAME: &str = "card-recognizer";

/// How augmented variants are stored in the catalog.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CatalogShape {
    /// Every variant keeps its own entry; queries max-pool per item
    #[default]
    PerVariant,
    /// One re-normalized mean embedding per item
    MeanPerItem,
}

impl CatalogShape {
    pub fn as_str(&self) -> &'static str {
        match self {
            CatalogShape::PerVariant => "per_variant",
            CatalogShape::MeanPerItem => "mean_per_item",
        }
    }
}

/// Catalog build and location settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogSettings {
    /// Path of the persisted catalog file
    #[serde(default = "default_catalog_path")]
    pub path: String,

    /// Directory of reference images (`<id>_<label>.png|jpg`)
    #[serde(default = "default_images_dir")]
    pub images_dir: String,

    /// Optional directory of real background photos for augmentation
    #[serde(default)]
    pub backgrounds_dir: Option<String>,

    /// Aggregation shape
    #[serde(default)]
    pub shape: CatalogShape,

    /// Augmented variants generated per reference image
    #[serde(default = "default_variants_per_image")]
    pub variants_per_image: usize,

    /// Seed for the augmentation generator
    #[serde(default = "default_seed")]
    pub seed: u64,

    /// Whether the untouched reference image is embedded too
    #[serde(default = "default_true")]
    pub include_original: bool,
}

fn default_catalog_path() -> String {
    data_dir().join("catalog.json").to_string_lossy().to_string()
}

fn default_images_dir() -> String {
    "./images".to_string()
}

fn default_variants_per_image() -> usize {
    20
}

fn default_seed() -> u64 {
    42
}

fn default_true() -> bool {
    true
}

impl Default for CatalogSettings {
    fn default() -> Self {
        Self {
            path: default_catalog_path(),
            images_dir: default_images_dir(),
            backgrounds_dir: None,
            shape: CatalogShape::default(),
            variants_per_image: default_variants_per_image(),
            seed: default_seed(),
            include_original: true,
        }
    }
}

impl CatalogSettings {
    pub fn validate(&self) -> Result<(), String> {
        if self.variants_per_image > 256 {
            return Err(format!(
                "variants_per_image must be <= 256, got {}",
                self.variants_per_image
            ));
        }
        if self.variants_per_image == 0 && !self.include_original {
            return Err("at least one of variants_per_image or include_original is required".into());
        }
        Ok(())
    }
}

/// Feature extractor backend.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExtractorKind {
    /// CLIP ViT-B/32 vision tower via Candle
    #[default]
    Clip,
    /// Deterministic thumbnail features (tests, offline use)
    Thumbnail,
}

/// Feature extractor settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractorSettings {
    #[serde(default)]
    pub kind: ExtractorKind,

    /// HuggingFace model repository for the CLIP extractor
    #[serde(default = "default_repo_id")]
    pub repo_id: String,

    /// Model cache directory (defaults to the platform cache dir)
    #[serde(default)]
    pub cache_dir: Option<String>,

    /// Grid size of the thumbnail extractor (dimension = grid * grid * 3)
    #[serde(default = "default_thumbnail_grid")]
    pub thumbnail_grid: u32,
}

fn default_repo_id() -> String {
    "openai/clip-vit-base-patch32".to_string()
}

fn default_thumbnail_grid() -> u32 {
    16
}

impl Default for ExtractorSettings {
    fn default() -> Self {
        Self {
            kind: ExtractorKind::default(),
            repo_id: default_repo_id(),
            cache_dir: None,
            thumbnail_grid: default_thumbnail_grid(),
        }
    }
}

impl ExtractorSettings {
    pub fn validate(&self) -> Result<(), String> {
        if self.repo_id.trim().is_empty() {
            return Err("repo_id must not be empty".to_string());
        }
        if !(1..=64).contains(&self.thumbnail_grid) {
            return Err(format!(
                "thumbnail_grid must be 1-64, got {}",
                self.thumbnail_grid
            ));
        }
        Ok(())
    }
}

/// Canonical geometry of images fed to the extractor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizerSettings {
    /// Target width:height ratio of the center crop
    #[serde(default = "default_aspect_ratio")]
    pub aspect_ratio: f32,

    /// Output width in pixels
    #[serde(default = "default_input_size")]
    pub width: u32,

    /// Output height in pixels
    #[serde(default = "default_input_size")]
    pub height: u32,
}

fn default_aspect_ratio() -> f32 {
    0.72
}

fn default_input_size() -> u32 {
    224
}

impl Default for NormalizerSettings {
    fn default() -> Self {
        Self {
            aspect_ratio: default_aspect_ratio(),
            width: default_input_size(),
            height: default_input_size(),
        }
    }
}

impl NormalizerSettings {
    pub fn validate(&self) -> Result<(), String> {
        if !(self.aspect_ratio.is_finite() && self.aspect_ratio > 0.0) {
            return Err(format!(
                "aspect_ratio must be a positive number, got {}",
                self.aspect_ratio
            ));
        }
        if self.width == 0 || self.height == 0 {
            return Err("width and height must be > 0".to_string());
        }
        Ok(())
    }
}

/// Bounds for the augmentation generator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AugmentationSettings {
    /// Output canvas width
    #[serde(default = "default_canvas_width")]
    pub canvas_width: u32,

    /// Output canvas height
    #[serde(default = "default_canvas_height")]
    pub canvas_height: u32,

    /// Maximum absolute rotation in degrees
    #[serde(default = "default_max_rotation")]
    pub max_rotation_deg: f32,

    /// Maximum absolute shear in degrees
    #[serde(default = "default_max_shear")]
    pub max_shear_deg: f32,

    /// Card zoom bounds, applied about the center before composition
    #[serde(default = "default_zoom_min")]
    pub zoom_min: f32,

    #[serde(default = "default_zoom_max")]
    pub zoom_max: f32,

    /// Maximum shift as a fraction of the card's width and height
    #[serde(default = "default_max_translate")]
    pub max_translate: f32,

    #[serde(default = "default_brightness_min")]
    pub brightness_min: f32,

    #[serde(default = "default_brightness_max")]
    pub brightness_max: f32,

    #[serde(default = "default_contrast_min")]
    pub contrast_min: f32,

    #[serde(default = "default_contrast_max")]
    pub contrast_max: f32,

    #[serde(default = "default_saturation_min")]
    pub saturation_min: f32,

    #[serde(default = "default_saturation_max")]
    pub saturation_max: f32,

    /// Probability that a variant is blurred
    #[serde(default = "default_blur_probability")]
    pub blur_probability: f64,

    /// Share of blurred variants that get motion blur instead of Gaussian
    #[serde(default = "default_motion_blur_share")]
    pub motion_blur_share: f64,

    /// Probability of the close-up composition (otherwise scene)
    #[serde(default = "default_closeup_probability")]
    pub closeup_probability: f64,

    /// Probability of light sensor noise
    #[serde(default = "default_noise_probability")]
    pub noise_probability: f64,
}

fn default_canvas_width() -> u32 {
    320
}

fn default_canvas_height() -> u32 {
    440
}

fn default_max_rotation() -> f32 {
    10.0
}

fn default_max_shear() -> f32 {
    5.0
}

fn default_zoom_min() -> f32 {
    0.9
}

fn default_zoom_max() -> f32 {
    1.1
}

fn default_max_translate() -> f32 {
    0.05
}

fn default_contrast_min() -> f32 {
    0.9
}

fn default_contrast_max() -> f32 {
    1.1
}

fn default_motion_blur_share() -> f64 {
    0.5
}

fn default_brightness_min() -> f32 {
    0.85
}

fn default_brightness_max() -> f32 {
    1.15
}

fn default_saturation_min() -> f32 {
    0.9
}

fn default_saturation_max() -> f32 {
    1.1
}

fn default_blur_probability() -> f64 {
    0.5
}

fn default_closeup_probability() -> f64 {
    0.9
}

fn default_noise_probability() -> f64 {
    0.2
}

impl Default for AugmentationSettings {
    fn default() -> Self {
        Self {
            canvas_width: default_canvas_width(),
            canvas_height: default_canvas_height(),
            max_rotation_deg: default_max_rotation(),
            max_shear_deg: default_max_shear(),
            zoom_min: default_zoom_min(),
            zoom_max: default_zoom_max(),
            max_translate: default_max_translate(),
            brightness_min: default_brightness_min(),
            brightness_max: default_brightness_max(),
            contrast_min: default_contrast_min(),
            contrast_max: default_contrast_max(),
            saturation_min: default_saturation_min(),
            saturation_max: default_saturation_max(),
            blur_probability: default_blur_probability(),
            motion_blur_share: default_motion_blur_share(),
            closeup_probability: default_closeup_probability(),
            noise_probability: default_noise_probability(),
        }
    }
}

impl AugmentationSettings {
    pub fn validate(&self) -> Result<(), String> {
        if self.canvas_width == 0 || self.canvas_height == 0 {
            return Err("canvas dimensions must be > 0".to_string());
        }
        if !(0.0..=45.0).contains(&self.max_rotation_deg) {
            return Err(format!(
                "max_rotation_deg must be 0-45, got {}",
                self.max_rotation_deg
            ));
        }
        if !(0.0..=20.0).contains(&self.max_shear_deg) {
            return Err(format!(
                "max_shear_deg must be 0-20, got {}",
                self.max_shear_deg
            ));
        }
        if self.zoom_min <= 0.0 || self.zoom_min > self.zoom_max || self.zoom_max > 2.0 {
            return Err("zoom bounds must satisfy 0 < min <= max <= 2".to_string());
        }
        if !(0.0..=0.25).contains(&self.max_translate) {
            return Err(format!(
                "max_translate must be 0.0-0.25, got {}",
                self.max_translate
            ));
        }
        if self.brightness_min <= 0.0 || self.brightness_min > self.brightness_max {
            return Err("brightness bounds must satisfy 0 < min <= max".to_string());
        }
        if self.contrast_min < 0.0 || self.contrast_min > self.contrast_max {
            return Err("contrast bounds must satisfy 0 <= min <= max".to_string());
        }
        if self.saturation_min < 0.0 || self.saturation_min > self.saturation_max {
            return Err("saturation bounds must satisfy 0 <= min <= max".to_string());
        }
        for (name, p) in [
            ("blur_probability", self.blur_probability),
            ("motion_blur_share", self.motion_blur_share),
            ("closeup_probability", self.closeup_probability),
            ("noise_probability", self.noise_probability),
        ] {
            if !(0.0..=1.0).contains(&p) {
                return Err(format!("{name} must be 0.0-1.0, got {p}"));
            }
        }
        Ok(())
    }
}

/// Similarity search strategy.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SearchMode {
    /// Linear scan over every entry
    #[default]
    Exact,
    /// HNSW candidate retrieval followed by exact re-scoring
    Approximate,
}

/// Similarity search settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchSettings {
    #[serde(default)]
    pub mode: SearchMode,

    /// Ranked items returned per query
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// HNSW connections per layer
    #[serde(default = "default_connectivity")]
    pub connectivity: usize,

    /// HNSW build-time search depth
    #[serde(default = "default_expansion_add")]
    pub expansion_add: usize,

    /// HNSW query-time search depth
    #[serde(default = "default_expansion_search")]
    pub expansion_search: usize,
}

/// Upper bound for `search.top_k`.
pub const MAX_TOP_K: usize = 1000;

fn default_top_k() -> usize {
    5
}

fn default_connectivity() -> usize {
    16
}

fn default_expansion_add() -> usize {
    200
}

fn default_expansion_search() -> usize {
    100
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            mode: SearchMode::default(),
            top_k: default_top_k(),
            connectivity: default_connectivity(),
            expansion_add: default_expansion_add(),
            expansion_search: default_expansion_search(),
        }
    }
}

impl SearchSettings {
    pub fn validate(&self) -> Result<(), String> {
        if !(1..=MAX_TOP_K).contains(&self.top_k) {
            return Err(format!("top_k must be 1-{MAX_TOP_K}, got {}", self.top_k));
        }
        for (name, value) in [
            ("connectivity", self.connectivity),
            ("expansion_add", self.expansion_add),
            ("expansion_search", self.expansion_search),
        ] {
            if value == 0 {
                return Err(format!("{name} must be > 0"));
            }
        }
        Ok(())
    }
}

/// Which single-frame acceptance rule to apply.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DecisionPolicyKind {
    /// Absolute similarity floor plus margin over the runner-up
    #[default]
    ThresholdMargin,
    /// Single similarity cutoff, no margin check
    FlatThreshold,
}

/// Decision policy thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionSettings {
    #[serde(default)]
    pub policy: DecisionPolicyKind,

    #[serde(default = "default_min_similarity")]
    pub min_similarity: f32,

    #[serde(default = "default_min_margin")]
    pub min_margin: f32,

    /// Cutoff used by the flat-threshold policy
    #[serde(default = "default_cutoff")]
    pub cutoff: f32,
}

fn default_min_similarity() -> f32 {
    0.5
}

fn default_min_margin() -> f32 {
    0.05
}

fn default_cutoff() -> f32 {
    0.7
}

impl Default for DecisionSettings {
    fn default() -> Self {
        Self {
            policy: DecisionPolicyKind::default(),
            min_similarity: default_min_similarity(),
            min_margin: default_min_margin(),
            cutoff: default_cutoff(),
        }
    }
}

impl DecisionSettings {
    pub fn validate(&self) -> Result<(), String> {
        for (name, v) in [
            ("min_similarity", self.min_similarity),
            ("cutoff", self.cutoff),
        ] {
            if !(-1.0..=1.0).contains(&v) {
                return Err(format!("{name} must be -1.0-1.0, got {v}"));
            }
        }
        if !(0.0..=2.0).contains(&self.min_margin) {
            return Err(format!("min_margin must be 0.0-2.0, got {}", self.min_margin));
        }
        Ok(())
    }
}

/// Temporal confirmation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfirmationSettings {
    /// Hit history capacity (K)
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,

    /// Consecutive agreeing hits required (M)
    #[serde(default = "default_window")]
    pub window: usize,

    /// Per-hit similarity that every window entry must exceed
    #[serde(default = "default_confirmation_threshold")]
    pub threshold: f32,

    /// Clear history when a frame yields no confident match
    #[serde(default)]
    pub reset_on_miss: bool,

    /// Halt frame acquisition once a result is confirmed
    #[serde(default = "default_true")]
    pub stop_on_confirm: bool,
}

fn default_history_capacity() -> usize {
    10
}

fn default_window() -> usize {
    3
}

fn default_confirmation_threshold() -> f32 {
    0.65
}

impl Default for ConfirmationSettings {
    fn default() -> Self {
        Self {
            history_capacity: default_history_capacity(),
            window: default_window(),
            threshold: default_confirmation_threshold(),
            reset_on_miss: false,
            stop_on_confirm: true,
        }
    }
}

impl ConfirmationSettings {
    pub fn validate(&self) -> Result<(), String> {
        if self.window == 0 {
            return Err("window must be > 0".to_string());
        }
        if self.window > self.history_capacity {
            return Err(format!(
                "window ({}) must not exceed history_capacity ({})",
                self.window, self.history_capacity
            ));
        }
        if !(-1.0..=1.0).contains(&self.threshold) {
            return Err(format!("threshold must be -1.0-1.0, got {}", self.threshold));
        }
        Ok(())
    }
}

/// Frame acquisition cadence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanSettings {
    /// Milliseconds between acquisition ticks
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
}

fn default_interval_ms() -> u64 {
    750
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
        }
    }
}

impl ScanSettings {
    pub fn validate(&self) -> Result<(), String> {
        if !(100..=5000).contains(&self.interval_ms) {
            return Err(format!(
                "interval_ms must be 100-5000, got {}",
                self.interval_ms
            ));
        }
        Ok(())
    }
}

/// gRPC server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    50061
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl ServerSettings {
    pub fn validate(&self) -> Result<(), String> {
        if self.host.trim().is_empty() {
            return Err("host must not be empty".to_string());
        }
        if self.port == 0 {
            return Err("port must be > 0".to_string());
        }
        Ok(())
    }
}

/// Main application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub catalog: CatalogSettings,

    #[serde(default)]
    pub extractor: ExtractorSettings,

    #[serde(default)]
    pub normalizer: NormalizerSettings,

    #[serde(default)]
    pub augmentation: AugmentationSettings,

    #[serde(default)]
    pub search: SearchSettings,

    #[serde(default)]
    pub decision: DecisionSettings,

    #[serde(default)]
    pub confirmation: ConfirmationSettings,

    #[serde(default)]
    pub scan: ScanSettings,

    #[serde(default)]
    pub server: ServerSettings,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            catalog: CatalogSettings::default(),
            extractor: ExtractorSettings::default(),
            normalizer: NormalizerSettings::default(),
            augmentation: AugmentationSettings::default(),
            search: SearchSettings::default(),
            decision: DecisionSettings::default(),
            confirmation: ConfirmationSettings::default(),
            scan: ScanSettings::default(),
            server: ServerSettings::default(),
            log_level: default_log_level(),
        }
    }
}

fn data_dir() -> PathBuf {
    ProjectDirs::from("", "", APP_NAME)
        .map(|p| p.data_local_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("./data"))
}

impl Settings {
    /// Load settings with layered precedence:
    /// 1. Built-in defaults
    /// 2. Config file (~/.config/card-recognizer/config.toml)
    /// 3. CLI-specified config file (optional)
    /// 4. Environment variables (CARD__SECTION__KEY)
    ///
    /// CLI flags should be applied by the caller after this returns.
    pub fn load(cli_config_path: Option<&str>) -> Result<Self, CardError> {
        let config_dir = ProjectDirs::from("", "", APP_NAME)
            .map(|p| p.config_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));

        let default_config_path = config_dir.join("config");

        let mut builder = Config::builder()
            .set_default("log_level", default_log_level())
            .map_err(|e| CardError::Config(e.to_string()))?
            .set_default("catalog.path", default_catalog_path())
            .map_err(|e| CardError::Config(e.to_string()))?
            .set_default("catalog.images_dir", default_images_dir())
            .map_err(|e| CardError::Config(e.to_string()))?
            .add_source(File::with_name(&default_config_path.to_string_lossy()).required(false));

        if let Some(path) = cli_config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        // Format: CARD__CATALOG__PATH, CARD__DECISION__MIN_MARGIN, CARD__LOG_LEVEL
        builder = builder.add_source(
            Environment::with_prefix("CARD")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder
            .build()
            .map_err(|e| CardError::Config(e.to_string()))?;

        let settings: Settings = config
            .try_deserialize()
            .map_err(|e| CardError::Config(e.to_string()))?;

        settings.validate()?;
        Ok(settings)
    }

    /// Validate every section, reporting the first failure.
    pub fn validate(&self) -> Result<(), CardError> {
        let checks = [
            ("catalog", self.catalog.validate()),
            ("extractor", self.extractor.validate()),
            ("normalizer", self.normalizer.validate()),
            ("augmentation", self.augmentation.validate()),
            ("search", self.search.validate()),
            ("decision", self.decision.validate()),
            ("confirmation", self.confirmation.validate()),
            ("scan", self.scan.validate()),
            ("server", self.server.validate()),
        ];
        for (section, result) in checks {
            result.map_err(|e| CardError::Config(format!("[{section}] {e}")))?;
        }
        Ok(())
    }

    /// Get the socket address for the gRPC server
    pub fn grpc_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// Expand `~/` in the catalog path to the home directory.
    pub fn expanded_catalog_path(&self) -> PathBuf {
        expand_home(&self.catalog.path)
    }

    /// Resolve the model cache directory.
    pub fn model_cache_dir(&self) -> Option<PathBuf> {
        self.extractor.cache_dir.as_deref().map(expand_home)
    }
}

fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = directories::BaseDirs::new().map(|b| b.home_dir().to_path_buf()) {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.server.port, 50061);
        assert_eq!(settings.catalog.shape, CatalogShape::PerVariant);
        assert_eq!(settings.decision.policy, DecisionPolicyKind::ThresholdMargin);
        assert!((settings.decision.min_similarity - 0.5).abs() < f32::EPSILON);
        assert!((settings.decision.min_margin - 0.05).abs() < f32::EPSILON);
        assert_eq!(settings.confirmation.history_capacity, 10);
        assert_eq!(settings.confirmation.window, 3);
        assert!((settings.confirmation.threshold - 0.65).abs() < f32::EPSILON);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_grpc_addr() {
        let settings = Settings::default();
        assert_eq!(settings.grpc_addr(), "0.0.0.0:50061");
    }

    #[test]
    fn test_load_from_file_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
log_level = "debug"

[catalog]
shape = "mean_per_item"
variants_per_image = 12

[decision]
policy = "flat_threshold"
cutoff = 0.8
"#
        )
        .unwrap();

        let settings = Settings::load(Some(file.path().to_str().unwrap())).unwrap();
        assert_eq!(settings.log_level, "debug");
        assert_eq!(settings.catalog.shape, CatalogShape::MeanPerItem);
        assert_eq!(settings.catalog.variants_per_image, 12);
        assert_eq!(settings.decision.policy, DecisionPolicyKind::FlatThreshold);
        assert!((settings.decision.cutoff - 0.8).abs() < f32::EPSILON);
        // Untouched sections keep their defaults
        assert_eq!(settings.confirmation.window, 3);
    }

    #[test]
    fn test_load_rejects_invalid_section() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[confirmation]\nwindow = 20\nhistory_capacity = 10").unwrap();

        let result = Settings::load(Some(file.path().to_str().unwrap()));
        match result {
            Err(CardError::Config(msg)) => assert!(msg.contains("confirmation")),
            other => panic!("Expected config error, got {:?}", other),
        }
    }

    #[test]
    fn test_confirmation_validation() {
        let mut config = ConfirmationSettings::default();
        assert!(config.validate().is_ok());

        config.window = 0;
        assert!(config.validate().is_err());

        config.window = 3;
        config.threshold = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_scan_interval_validation() {
        let mut scan = ScanSettings::default();
        assert!(scan.validate().is_ok());
        scan.interval_ms = 10;
        assert!(scan.validate().is_err());
    }

    #[test]
    fn test_augmentation_validation() {
        let mut aug = AugmentationSettings::default();
        assert!(aug.validate().is_ok());

        aug.brightness_min = 1.3;
        assert!(aug.validate().is_err());

        aug.brightness_min = 0.85;
        aug.blur_probability = 1.5;
        assert!(aug.validate().is_err());
    }

    #[test]
    fn test_augmentation_geometry_and_contrast_validation() {
        let defaults = AugmentationSettings::default();
        assert_eq!((defaults.zoom_min, defaults.zoom_max), (0.9, 1.1));
        assert_eq!(defaults.max_shear_deg, 5.0);
        assert_eq!(defaults.max_translate, 0.05);
        assert_eq!((defaults.contrast_min, defaults.contrast_max), (0.9, 1.1));

        let invalid = [
            AugmentationSettings {
                zoom_min: 1.2,
                ..Default::default()
            },
            AugmentationSettings {
                zoom_min: 0.0,
                ..Default::default()
            },
            AugmentationSettings {
                max_shear_deg: -1.0,
                ..Default::default()
            },
            AugmentationSettings {
                max_translate: 0.5,
                ..Default::default()
            },
            AugmentationSettings {
                contrast_min: 1.2,
                ..Default::default()
            },
            AugmentationSettings {
                motion_blur_share: 2.0,
                ..Default::default()
            },
        ];
        for aug in invalid {
            assert!(aug.validate().is_err(), "{aug:?}");
        }
    }

    #[test]
    fn test_search_validation() {
        let mut search = SearchSettings::default();
        assert!(search.validate().is_ok());

        search.top_k = 0;
        assert!(search.validate().is_err());

        search.top_k = usize::MAX;
        assert!(search.validate().is_err());

        search.top_k = MAX_TOP_K;
        assert!(search.validate().is_ok());

        search.expansion_search = 0;
        assert!(search.validate().is_err());
    }

    #[test]
    fn test_extractor_and_server_validation() {
        let mut extractor = ExtractorSettings::default();
        assert!(extractor.validate().is_ok());
        extractor.thumbnail_grid = 0;
        assert!(extractor.validate().is_err());

        let mut server = ServerSettings::default();
        assert!(server.validate().is_ok());
        server.port = 0;
        assert!(server.validate().is_err());
    }

    #[test]
    fn test_settings_validate_covers_search() {
        let mut settings = Settings::default();
        assert!(settings.validate().is_ok());

        settings.search.top_k = usize::MAX;
        let err = settings.validate().unwrap_err();
        assert!(err.to_string().contains("[search]"));
    }

    #[test]
    fn test_settings_serialization() {
        let settings = Settings::default();
        let json = serde_json::to_string(&settings).unwrap();
        let decoded: Settings = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded.catalog.seed, 42);
        assert_eq!(decoded.normalizer.width, 224);
        assert!((decoded.normalizer.aspect_ratio - 0.72).abs() < f32::EPSILON);
    }
}
