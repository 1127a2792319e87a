//! Catalog builder.
//!
//! For each reference image: load, generate augmented variants (plus the
//! untouched original), normalize, embed, then aggregate according to the
//! catalog shape. A reference that fails is logged and skipped; a build
//! with no surviving items is an error.
//!
//! Randomness: every reference gets its own `StdRng` seeded from the build
//! seed and the reference's position in the sorted corpus, so rebuilding the
//! same corpus with the same seed yields identical entries.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use card_embeddings::{Embedding, FeatureExtractor};
use card_types::{CatalogSettings, CatalogShape};
use card_vision::{open_image, AugmentationGenerator, ImageNormalizer};
use image::RgbImage;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{debug, info, warn};

use crate::catalog::{Catalog, CatalogEntry};
use crate::corpus::{scan_corpus, ReferenceImage};
use crate::error::CatalogError;

/// Variant tag of the untouched reference image.
const ORIGINAL_VARIANT: &str = "original";

/// Variant tag of a mean-per-item entry.
const MEAN_VARIANT: &str = "mean";

/// Statistics from a build run
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BuildStats {
    /// Reference images that contributed at least one embedding
    pub references_processed: usize,
    /// Reference images skipped entirely
    pub references_skipped: usize,
    /// Embeddings produced
    pub variants_embedded: usize,
    /// Variants lost to augmentation or extraction failures
    pub variants_failed: usize,
    /// Distinct items in the resulting catalog
    pub items: usize,
}

impl BuildStats {
    /// Merge another stats into this one
    pub fn merge(&mut self, other: &BuildStats) {
        self.references_processed += other.references_processed;
        self.references_skipped += other.references_skipped;
        self.variants_embedded += other.variants_embedded;
        self.variants_failed += other.variants_failed;
        self.items += other.items;
    }
}

/// Build options
#[derive(Debug, Clone)]
pub struct BuildOptions {
    pub shape: CatalogShape,
    pub variants_per_image: usize,
    pub seed: u64,
    pub include_original: bool,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self::from(&CatalogSettings::default())
    }
}

impl From<&CatalogSettings> for BuildOptions {
    fn from(settings: &CatalogSettings) -> Self {
        Self {
            shape: settings.shape,
            variants_per_image: settings.variants_per_image,
            seed: settings.seed,
            include_original: settings.include_original,
        }
    }
}

/// Embeddings produced for one reference image.
struct Embedded {
    reference: ReferenceImage,
    variants: Vec<(String, Embedding)>,
}

pub struct CatalogBuilder {
    extractor: Arc<dyn FeatureExtractor>,
    normalizer: ImageNormalizer,
    generator: AugmentationGenerator,
    options: BuildOptions,
}

impl CatalogBuilder {
    pub fn new(
        extractor: Arc<dyn FeatureExtractor>,
        normalizer: ImageNormalizer,
        generator: AugmentationGenerator,
        options: BuildOptions,
    ) -> Result<Self, CatalogError> {
        let info = extractor.info();
        if normalizer.output_size() != (info.input_width, info.input_height) {
            return Err(CatalogError::Corpus(format!(
                "normalizer output {:?} does not match extractor input {}x{}",
                normalizer.output_size(),
                info.input_width,
                info.input_height
            )));
        }
        if options.variants_per_image == 0 && !options.include_original {
            return Err(CatalogError::Corpus(
                "nothing to embed: no variants and original excluded".to_string(),
            ));
        }

        Ok(Self {
            extractor,
            normalizer,
            generator,
            options,
        })
    }

    /// Scan `images_dir` and build a catalog from it.
    pub fn build_from_dir(&self, images_dir: &Path) -> Result<(Catalog, BuildStats), CatalogError> {
        let references = scan_corpus(images_dir)?;
        self.build(&references)
    }

    /// Build a catalog from an ordered list of reference images.
    pub fn build(
        &self,
        references: &[ReferenceImage],
    ) -> Result<(Catalog, BuildStats), CatalogError> {
        let model = self.extractor.info().identity();
        info!(
            references = references.len(),
            model = %model,
            shape = ?self.options.shape,
            variants = self.options.variants_per_image,
            seed = self.options.seed,
            "Starting catalog build"
        );

        let mut stats = BuildStats::default();
        let mut embedded = Vec::new();

        for (position, reference) in references.iter().enumerate() {
            let mut item_stats = BuildStats::default();
            match self.process_reference(position, reference, &mut item_stats) {
                Ok(variants) if !variants.is_empty() => {
                    item_stats.references_processed = 1;
                    info!(
                        item_id = %reference.label.item_id,
                        file = %reference.source_filename,
                        embedded = variants.len(),
                        failed = item_stats.variants_failed,
                        "Processed reference image"
                    );
                    embedded.push(Embedded {
                        reference: reference.clone(),
                        variants,
                    });
                }
                Ok(_) => {
                    item_stats.references_skipped = 1;
                    warn!(file = %reference.source_filename, "No usable variants, skipping");
                }
                Err(e) => {
                    item_stats.references_skipped = 1;
                    warn!(file = %reference.source_filename, error = %e, "Reference image failed, skipping");
                }
            }
            stats.merge(&item_stats);
        }

        if embedded.is_empty() {
            return Err(CatalogError::EmptyBuild {
                attempted: references.len(),
            });
        }

        let entries = match self.options.shape {
            CatalogShape::PerVariant => per_variant_entries(embedded),
            CatalogShape::MeanPerItem => mean_entries(embedded)?,
        };

        let info = self.extractor.info();
        let catalog = Catalog::new(
            model,
            info.dimension,
            (info.input_width, info.input_height),
            self.options.shape,
            self.options.seed,
            self.options.variants_per_image,
            entries,
        )?;
        stats.items = catalog.metadata.item_count;

        info!(
            items = stats.items,
            entries = catalog.len(),
            processed = stats.references_processed,
            skipped = stats.references_skipped,
            variants_failed = stats.variants_failed,
            "Catalog build complete"
        );
        Ok((catalog, stats))
    }

    /// Embed every variant of one reference image.
    fn process_reference(
        &self,
        position: usize,
        reference: &ReferenceImage,
        stats: &mut BuildStats,
    ) -> Result<Vec<(String, Embedding)>, CatalogError> {
        let image = open_image(&reference.path)?;

        let mut images: Vec<(String, RgbImage)> = Vec::new();
        if self.options.include_original {
            images.push((
                ORIGINAL_VARIANT.to_string(),
                self.generator.prepare_reference(&image)?,
            ));
        }

        let mut rng = StdRng::seed_from_u64(self.options.seed.wrapping_add(position as u64));
        let variants = self
            .generator
            .generate(&image, self.options.variants_per_image, &mut rng);
        stats.variants_failed += variants.failed;
        images.extend(
            variants
                .images
                .into_iter()
                .enumerate()
                .map(|(i, image)| (format!("aug{i}"), image)),
        );

        let mut tags = Vec::with_capacity(images.len());
        let mut normalized = Vec::with_capacity(images.len());
        for (tag, image) in images {
            match self.normalizer.normalize(&image) {
                Ok(image) => {
                    tags.push(tag);
                    normalized.push(image);
                }
                Err(e) => {
                    warn!(variant = %tag, error = %e, "Normalization failed, skipping variant");
                    stats.variants_failed += 1;
                }
            }
        }

        let embeddings = self.embed(&tags, &normalized, stats);
        stats.variants_embedded += embeddings.len();
        Ok(embeddings)
    }

    /// Embed a batch, falling back to one-by-one so a single bad variant
    /// doesn't take the whole reference down.
    fn embed(
        &self,
        tags: &[String],
        images: &[RgbImage],
        stats: &mut BuildStats,
    ) -> Vec<(String, Embedding)> {
        match self.extractor.extract_batch(images) {
            Ok(embeddings) => return tags.iter().cloned().zip(embeddings).collect(),
            Err(e) => debug!(error = %e, "Batch extraction failed, retrying per variant"),
        }

        let mut out = Vec::new();
        for (tag, image) in tags.iter().zip(images) {
            match self.extractor.extract(image) {
                Ok(embedding) => out.push((tag.clone(), embedding)),
                Err(e) => {
                    warn!(variant = %tag, error = %e, "Extraction failed, skipping variant");
                    stats.variants_failed += 1;
                }
            }
        }
        out
    }
}

fn per_variant_entries(embedded: Vec<Embedded>) -> Vec<CatalogEntry> {
    embedded
        .into_iter()
        .flat_map(|Embedded { reference, variants }| {
            variants.into_iter().map(move |(variant, embedding)| CatalogEntry {
                item_id: reference.label.item_id.clone(),
                display_name: reference.label.display_name.clone(),
                source_filename: reference.source_filename.clone(),
                variant,
                embedding,
            })
        })
        .collect()
}

/// One entry per item: the re-normalized mean of all its embeddings, across
/// every reference image that shares the item id.
fn mean_entries(embedded: Vec<Embedded>) -> Result<Vec<CatalogEntry>, CatalogError> {
    let mut order: Vec<(ReferenceImage, Vec<Embedding>)> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();

    for Embedded { reference, variants } in embedded {
        let embeddings = variants.into_iter().map(|(_, e)| e);
        let existing = positions.get(&reference.label.item_id).copied();
        match existing {
            Some(i) => order[i].1.extend(embeddings),
            None => {
                positions.insert(reference.label.item_id.clone(), order.len());
                order.push((reference, embeddings.collect()));
            }
        }
    }

    let mut entries = Vec::with_capacity(order.len());
    for (reference, embeddings) in order {
        match Embedding::mean(&embeddings) {
            Ok(embedding) => entries.push(CatalogEntry {
                item_id: reference.label.item_id,
                display_name: reference.label.display_name,
                source_filename: reference.source_filename,
                variant: MEAN_VARIANT.to_string(),
                embedding,
            }),
            Err(e) => {
                warn!(item_id = %reference.label.item_id, error = %e, "Cannot average item, skipping");
            }
        }
    }

    if entries.is_empty() {
        return Err(CatalogError::EmptyBuild {
            attempted: positions.len(),
        });
    }
    Ok(entries)
}
