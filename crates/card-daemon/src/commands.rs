//! Command implementations for the card daemon.
//!
//! Handles:
//! - build: embed a reference corpus into a catalog file
//! - identify: one image in, best match out
//! - scan: replay frames until a result is confirmed
//! - serve: gRPC identification service
//! - info / config: inspect the catalog and effective settings

use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Serialize;
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use card_catalog::{
    open_index, BuildOptions, BuildStats, Catalog, CatalogBuilder, CatalogStats, SimilarityIndex,
};
use card_embeddings::{
    CandleClipExtractor, ExtractorSlot, FeatureExtractor, ModelCache, ThumbnailExtractor,
};
use card_matcher::{CatalogSlot, Decision, DecisionPolicy, FrameOutcome, Recognizer};
use card_scanner::{DirectoryFrameSource, ScanReport, ScanUpdate, Scanner};
use card_service::run_server_with_shutdown;
use card_types::{ExtractorKind, Settings};
use card_vision::{open_image, AugmentationGenerator, BackgroundSource, ImageNormalizer};

use crate::cli::Cli;

/// Load configuration and apply the global CLI overrides.
///
/// Precedence: defaults -> config file -> env vars -> CLI flags.
pub fn load_settings(cli: &Cli) -> Result<Settings> {
    let mut settings =
        Settings::load(cli.config.as_deref()).context("Failed to load configuration")?;

    if let Some(log_level) = &cli.log_level {
        settings.log_level = log_level.clone();
    }
    if let Some(extractor) = cli.extractor {
        settings.extractor.kind = extractor.into();
    }
    if let Some(catalog) = &cli.catalog {
        settings.catalog.path = catalog.clone();
    }
    Ok(settings)
}

/// Initialize logging. `RUST_LOG` wins over the configured level.
pub fn init_logging(settings: &Settings) -> Result<()> {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&settings.log_level)),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;
    Ok(())
}

/// Instantiate the configured feature extractor.
///
/// The CLIP extractor downloads its weights on first use.
pub fn load_extractor(settings: &Settings) -> Result<Arc<dyn FeatureExtractor>> {
    match settings.extractor.kind {
        ExtractorKind::Clip => {
            let cache = match settings.model_cache_dir() {
                Some(dir) => ModelCache::new(dir, settings.extractor.repo_id.clone()),
                None => ModelCache::for_repo(settings.extractor.repo_id.clone()),
            };
            info!(repo = %settings.extractor.repo_id, dir = ?cache.model_dir(), "Loading CLIP extractor");
            let extractor =
                CandleClipExtractor::load(&cache).context("Failed to load CLIP extractor")?;
            Ok(Arc::new(extractor))
        }
        ExtractorKind::Thumbnail => {
            let extractor = ThumbnailExtractor::new(
                settings.extractor.thumbnail_grid,
                settings.normalizer.width,
                settings.normalizer.height,
            )
            .context("Invalid thumbnail extractor settings")?;
            Ok(Arc::new(extractor))
        }
    }
}

/// Build a catalog from `catalog.images_dir` and save it to `catalog.path`.
pub fn build_catalog(settings: &Settings) -> Result<(Catalog, BuildStats)> {
    settings.validate().context("Invalid configuration")?;

    let extractor = load_extractor(settings)?;
    let normalizer =
        ImageNormalizer::from_settings(&settings.normalizer).context("Invalid normalizer")?;

    let backgrounds = match &settings.catalog.backgrounds_dir {
        Some(dir) => BackgroundSource::from_dir(Path::new(dir))
            .with_context(|| format!("Failed to read backgrounds from {}", dir))?,
        None => BackgroundSource::synthetic(),
    };
    info!(photos = backgrounds.photo_count(), "Backgrounds ready");

    let generator = AugmentationGenerator::new(settings.augmentation.clone(), backgrounds)
        .context("Invalid augmentation settings")?;
    let builder = CatalogBuilder::new(
        extractor,
        normalizer,
        generator,
        BuildOptions::from(&settings.catalog),
    )
    .context("Failed to configure catalog builder")?;

    let images_dir = PathBuf::from(&settings.catalog.images_dir);
    info!(dir = %images_dir.display(), "Building catalog");
    let (catalog, stats) = builder
        .build_from_dir(&images_dir)
        .context("Catalog build failed")?;

    let path = settings.expanded_catalog_path();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).context("Failed to create catalog directory")?;
    }
    catalog.save(&path).context("Failed to save catalog")?;

    info!(
        path = %path.display(),
        items = stats.items,
        references = stats.references_processed,
        skipped = stats.references_skipped,
        variants = stats.variants_embedded,
        failed = stats.variants_failed,
        "Catalog saved"
    );
    Ok((catalog, stats))
}

/// Load the extractor, the catalog file and the search index.
pub fn load_components(
    settings: &Settings,
) -> Result<(Arc<dyn FeatureExtractor>, Arc<Catalog>, Arc<dyn SimilarityIndex>)> {
    let extractor = load_extractor(settings)?;

    let path = settings.expanded_catalog_path();
    let catalog = Catalog::load(&path)
        .with_context(|| format!("Failed to load catalog from {}", path.display()))?;
    let model = extractor.info().identity();
    if catalog.metadata.model != model {
        warn!(
            catalog = %catalog.metadata.model,
            extractor = %model,
            "Catalog was built with a different model"
        );
    }

    let catalog = Arc::new(catalog);
    let index = open_index(catalog.clone(), &settings.search).context("Failed to build index")?;
    Ok((extractor, catalog, index))
}

/// A recognizer over the given slots, configured from settings.
pub fn recognizer_with_slots(
    settings: &Settings,
    extractor: Arc<ExtractorSlot>,
    catalog: Arc<CatalogSlot>,
) -> Result<Recognizer> {
    let normalizer =
        ImageNormalizer::from_settings(&settings.normalizer).context("Invalid normalizer")?;
    Ok(Recognizer::new(
        normalizer,
        extractor,
        catalog,
        DecisionPolicy::from_settings(&settings.decision),
        settings.search.top_k,
    ))
}

/// A fully loaded recognizer.
pub fn load_recognizer(settings: &Settings) -> Result<Recognizer> {
    let (extractor, catalog, index) = load_components(settings)?;
    let recognizer = recognizer_with_slots(
        settings,
        Arc::new(ExtractorSlot::with_extractor(extractor)),
        Arc::new(CatalogSlot::with_catalog(catalog, index)),
    )?;
    recognizer
        .check_ready()
        .context("Extractor and catalog do not fit together")?;
    Ok(recognizer)
}

/// One ranked candidate in an identify report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CandidateReport {
    pub item_id: String,
    pub display_name: String,
    /// 0-100
    pub similarity: f32,
}

/// Outcome of identifying one image.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IdentifyReport {
    pub matched: bool,
    pub item_id: Option<String>,
    pub display_name: Option<String>,
    /// 0-100
    pub similarity: Option<f32>,
    pub candidates: Vec<CandidateReport>,
    /// Why nothing was matched
    pub reason: Option<String>,
}

/// Identify the card in one image file.
pub fn identify_file(recognizer: &Recognizer, image: &Path) -> Result<IdentifyReport> {
    let frame =
        open_image(image).with_context(|| format!("Failed to read {}", image.display()))?;
    let outcome = recognizer
        .recognize_frame(&frame)
        .context("Recognition failed")?;

    let (ranked, decision) = match outcome {
        FrameOutcome::Decided { ranked, decision } => (ranked, decision),
        FrameOutcome::Skipped(reason) => {
            return Ok(IdentifyReport {
                matched: false,
                item_id: None,
                display_name: None,
                similarity: None,
                candidates: Vec::new(),
                reason: Some(reason.to_string()),
            });
        }
    };

    let candidates = ranked
        .iter()
        .map(|hit| CandidateReport {
            item_id: hit.item_id.clone(),
            display_name: recognizer.display_name(&hit.item_id),
            similarity: hit.similarity_percent(),
        })
        .collect();

    Ok(match decision {
        Decision::Accept(hit) => IdentifyReport {
            matched: true,
            display_name: Some(recognizer.display_name(&hit.item_id)),
            similarity: Some(hit.similarity_percent()),
            item_id: Some(hit.item_id),
            candidates,
            reason: None,
        },
        Decision::Reject(reason) => IdentifyReport {
            matched: false,
            item_id: None,
            display_name: None,
            similarity: None,
            candidates,
            reason: Some(reason.to_string()),
        },
    })
}

/// `identify` command.
pub async fn run_identify(settings: Settings, image: &str, json: bool) -> Result<IdentifyReport> {
    let image = PathBuf::from(image);
    let report = tokio::task::spawn_blocking(move || {
        let recognizer = load_recognizer(&settings)?;
        identify_file(&recognizer, &image)
    })
    .await
    .context("Identify task failed")??;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_identify(&report);
    }
    Ok(report)
}

fn print_identify(report: &IdentifyReport) {
    match (&report.item_id, &report.display_name, report.similarity) {
        (Some(id), Some(name), Some(similarity)) => {
            println!("Match: {} ({}) {:.1}%", name, id, similarity);
        }
        _ => println!(
            "No confident match: {}",
            report.reason.as_deref().unwrap_or("unknown")
        ),
    }
    for (rank, candidate) in report.candidates.iter().enumerate() {
        println!(
            "  {}. {:<24} {:<32} {:>5.1}%",
            rank + 1,
            candidate.item_id,
            candidate.display_name,
            candidate.similarity
        );
    }
}

/// `scan` command: replay a frames directory through a scan session.
pub async fn run_scan(settings: Settings, frames: &str, repeat: bool) -> Result<ScanReport> {
    settings.validate().context("Invalid configuration")?;

    let loader_settings = settings.clone();
    let recognizer = tokio::task::spawn_blocking(move || load_recognizer(&loader_settings))
        .await
        .context("Loader task failed")??;
    let recognizer = Arc::new(recognizer);

    let scanner = Scanner::new(
        recognizer.clone(),
        settings.confirmation.clone(),
        &settings.scan,
    );
    let updates = scanner.subscribe();
    let printer = tokio::spawn(print_updates(updates, recognizer));

    let handle = scanner
        .start(DirectoryFrameSource::new(frames, repeat))
        .await
        .context("Scan did not start")?;

    let cancel = handle.cancel_token();
    let interrupt = tokio::spawn(async move {
        shutdown_signal().await;
        cancel.cancel();
    });

    let report = handle.wait().await.context("Scan failed")?;
    interrupt.abort();
    drop(scanner);
    let _ = printer.await;

    match &report.result {
        Some(result) => println!(
            "Confirmed {} at {:.1}% over {} frames",
            result.item_id,
            result.confidence_percent(),
            result.frames
        ),
        None => println!("No card confirmed ({:?})", report.stop),
    }
    Ok(report)
}

async fn print_updates(mut updates: broadcast::Receiver<ScanUpdate>, recognizer: Arc<Recognizer>) {
    loop {
        match updates.recv().await {
            Ok(ScanUpdate::Started { source }) => println!("Scanning {}", source),
            Ok(ScanUpdate::Hit { hit, history_len }) => println!(
                "  hit  {} {:.1}% [{}]",
                hit.item_id,
                hit.similarity_percent(),
                history_len
            ),
            Ok(ScanUpdate::Miss { reason }) => println!("  miss {}", reason),
            Ok(ScanUpdate::Skipped { reason }) => println!("  skip {}", reason),
            Ok(ScanUpdate::Confirmed(result)) => println!(
                "  confirmed {} ({})",
                recognizer.display_name(&result.item_id),
                result.item_id
            ),
            Ok(ScanUpdate::Stopped(reason)) => println!("Stopped: {:?}", reason),
            Err(broadcast::error::RecvError::Lagged(n)) => {
                warn!(missed = n, "Dropped scan updates");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

/// `serve` command.
///
/// The server binds immediately; the extractor and catalog load in the
/// background and requests get `UNAVAILABLE` until both are ready.
pub async fn run_serve(settings: Settings) -> Result<()> {
    settings.validate().context("Invalid configuration")?;

    info!("Card daemon starting...");
    info!("  Catalog path: {}", settings.expanded_catalog_path().display());
    info!("  Extractor: {:?}", settings.extractor.kind);
    info!("  gRPC address: {}", settings.grpc_addr());

    let addr: SocketAddr = settings
        .grpc_addr()
        .parse()
        .context("Invalid gRPC address")?;

    let extractor_slot = Arc::new(ExtractorSlot::new());
    let catalog_slot = Arc::new(CatalogSlot::new());
    let recognizer = Arc::new(recognizer_with_slots(
        &settings,
        extractor_slot.clone(),
        catalog_slot.clone(),
    )?);

    tokio::task::spawn_blocking(move || match load_components(&settings) {
        Ok((extractor, catalog, index)) => {
            extractor_slot.install(extractor);
            catalog_slot.install(catalog, index);
        }
        Err(e) => error!(error = %format!("{:#}", e), "Failed to load recognizer"),
    });

    run_server_with_shutdown(addr, recognizer, shutdown_signal())
        .await
        .map_err(|e| anyhow::anyhow!("Server error: {}", e))
}

/// `info` command.
pub fn show_info(settings: &Settings) -> Result<CatalogStats> {
    let path = settings.expanded_catalog_path();
    let catalog = Catalog::load(&path)
        .with_context(|| format!("Failed to load catalog from {}", path.display()))?;
    let stats = catalog.stats();

    println!("Catalog: {}", path.display());
    println!("  Model:      {}", stats.model);
    println!("  Dimension:  {}", stats.embedding_dim);
    println!("  Shape:      {}", stats.shape.as_str());
    println!("  Entries:    {}", stats.entry_count);
    println!("  Items:      {}", stats.item_count);
    println!("  Built at:   {}", stats.built_at.to_rfc3339());
    Ok(stats)
}

/// `config` command.
pub fn show_config(settings: &Settings) -> Result<String> {
    let rendered = toml::to_string_pretty(settings).context("Failed to render configuration")?;
    println!("{}", rendered);
    Ok(rendered)
}

/// Resolves on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down...");
        }
        _ = terminate => {
            info!("Received SIGTERM, shutting down...");
        }
    }
}
