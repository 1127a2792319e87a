//! Card daemon library exports.
//!
//! # Modules
//!
//! - `cli`: Command-line argument parsing with clap
//! - `commands`: Command implementations (build, identify, scan, serve, info, config)

pub mod cli;
pub mod commands;

pub use cli::{Cli, Commands, ExtractorArg, ModeArg, ShapeArg};
pub use commands::{
    build_catalog, identify_file, init_logging, load_extractor, load_recognizer, load_settings,
    run_identify, run_scan, run_serve, show_config, show_info, CandidateReport, IdentifyReport,
};
