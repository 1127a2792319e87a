//! Card Recognizer Daemon
//!
//! Identifies trading cards by embedding similarity against a catalog built
//! from reference images.
//!
//! # Usage
//!
//! ```bash
//! card-daemon build --images ./references
//! card-daemon identify photo.jpg
//! card-daemon scan ./frames
//! card-daemon serve [--port PORT]
//! card-daemon info
//! ```
//!
//! # Configuration
//!
//! Configuration is loaded in order (later sources override earlier):
//! 1. Built-in defaults
//! 2. Config file (~/.config/card-recognizer/config.toml)
//! 3. Environment variables (CARD__SECTION__KEY)
//! 4. CLI flags

use anyhow::{Context, Result};
use clap::Parser;

use card_daemon::{
    build_catalog, init_logging, load_settings, run_identify, run_scan, run_serve, show_config,
    show_info, Cli, Commands,
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut settings = load_settings(&cli)?;

    match cli.command {
        Commands::Build {
            images,
            backgrounds,
            variants,
            seed,
            shape,
            no_original,
        } => {
            if let Some(images) = images {
                settings.catalog.images_dir = images;
            }
            if backgrounds.is_some() {
                settings.catalog.backgrounds_dir = backgrounds;
            }
            if let Some(variants) = variants {
                settings.catalog.variants_per_image = variants;
            }
            if let Some(seed) = seed {
                settings.catalog.seed = seed;
            }
            if let Some(shape) = shape {
                settings.catalog.shape = shape.into();
            }
            if no_original {
                settings.catalog.include_original = false;
            }
            init_logging(&settings)?;

            let (catalog, stats) = tokio::task::spawn_blocking(move || build_catalog(&settings))
                .await
                .context("Build task failed")??;
            println!(
                "Built catalog: {} items, {} entries ({} references, {} skipped, {} variants failed)",
                catalog.metadata.item_count,
                catalog.len(),
                stats.references_processed,
                stats.references_skipped,
                stats.variants_failed
            );
        }
        Commands::Identify {
            image,
            top_k,
            mode,
            json,
        } => {
            if let Some(top_k) = top_k {
                settings.search.top_k = top_k;
            }
            if let Some(mode) = mode {
                settings.search.mode = mode.into();
            }
            init_logging(&settings)?;
            run_identify(settings, &image, json).await?;
        }
        Commands::Scan {
            frames,
            interval_ms,
            repeat,
            keep_streaming,
        } => {
            if let Some(interval_ms) = interval_ms {
                settings.scan.interval_ms = interval_ms;
            }
            if keep_streaming {
                settings.confirmation.stop_on_confirm = false;
            }
            init_logging(&settings)?;
            run_scan(settings, &frames, repeat).await?;
        }
        Commands::Serve { port, host } => {
            if let Some(port) = port {
                settings.server.port = port;
            }
            if let Some(host) = host {
                settings.server.host = host;
            }
            init_logging(&settings)?;
            run_serve(settings).await?;
        }
        Commands::Info => {
            show_info(&settings)?;
        }
        Commands::Config => {
            show_config(&settings)?;
        }
    }

    Ok(())
}
