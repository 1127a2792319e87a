//! CLI argument parsing for the card daemon.
//!
//! CLI flags override all other config sources.

use clap::{Parser, Subcommand, ValueEnum};

use card_types::{CatalogShape, ExtractorKind, SearchMode};

/// Card Recognizer
///
/// Builds an embedding catalog from reference card images and identifies
/// cards in photos, replayed frames, or over gRPC.
#[derive(Parser, Debug)]
#[command(name = "card-daemon")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to config file (overrides default ~/.config/card-recognizer/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Set log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true)]
    pub log_level: Option<String>,

    /// Feature extractor backend
    #[arg(long, global = true, value_enum)]
    pub extractor: Option<ExtractorArg>,

    /// Override catalog file path
    #[arg(long, global = true)]
    pub catalog: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Daemon commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build a catalog from a directory of reference images
    Build {
        /// Reference images directory (`<id>_<label>.png`)
        #[arg(short, long)]
        images: Option<String>,

        /// Background photos directory for augmentation
        #[arg(long)]
        backgrounds: Option<String>,

        /// Augmented variants per reference image
        #[arg(long)]
        variants: Option<usize>,

        /// Augmentation seed
        #[arg(long)]
        seed: Option<u64>,

        /// Catalog aggregation shape
        #[arg(long, value_enum)]
        shape: Option<ShapeArg>,

        /// Do not embed the untouched reference image
        #[arg(long)]
        no_original: bool,
    },

    /// Identify the card in a single image
    Identify {
        /// Image file to identify
        image: String,

        /// Ranked candidates to show
        #[arg(short = 'k', long)]
        top_k: Option<usize>,

        /// Search mode
        #[arg(long, value_enum)]
        mode: Option<ModeArg>,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Scan frames replayed from a directory until a card is confirmed
    Scan {
        /// Directory of frames, replayed in file name order
        frames: String,

        /// Milliseconds between frames
        #[arg(long)]
        interval_ms: Option<u64>,

        /// Replay the directory forever
        #[arg(long)]
        repeat: bool,

        /// Keep scanning after confirmation
        #[arg(long)]
        keep_streaming: bool,
    },

    /// Serve the identification gRPC API
    Serve {
        /// Override gRPC port
        #[arg(short, long)]
        port: Option<u16>,

        /// Override bind host
        #[arg(long)]
        host: Option<String>,
    },

    /// Show catalog metadata
    Info,

    /// Print the effective configuration as TOML
    Config,
}

/// Extractor backends selectable on the command line
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractorArg {
    Clip,
    Thumbnail,
}

impl From<ExtractorArg> for ExtractorKind {
    fn from(arg: ExtractorArg) -> Self {
        match arg {
            ExtractorArg::Clip => ExtractorKind::Clip,
            ExtractorArg::Thumbnail => ExtractorKind::Thumbnail,
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShapeArg {
    PerVariant,
    MeanPerItem,
}

impl From<ShapeArg> for CatalogShape {
    fn from(arg: ShapeArg) -> Self {
        match arg {
            ShapeArg::PerVariant => CatalogShape::PerVariant,
            ShapeArg::MeanPerItem => CatalogShape::MeanPerItem,
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeArg {
    Exact,
    Approximate,
}

impl From<ModeArg> for SearchMode {
    fn from(arg: ModeArg) -> Self {
        match arg {
            ModeArg::Exact => SearchMode::Exact,
            ModeArg::Approximate => SearchMode::Approximate,
        }
    }
}
