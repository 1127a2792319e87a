//! # card-catalog
//!
//! The reference catalog and the search engine that runs against it.
//!
//! Build time: scan a directory of `<id>_<label>` reference images, augment
//! each one, embed every variant and persist the result as a single JSON
//! file. Query time: load the catalog once, share it read-only, and rank
//! items by their best cosine similarity to a query embedding.
//!
//! ## Catalog shapes
//! - `per_variant`: one entry per embedded variant; search max-pools per item
//! - `mean_per_item`: one re-normalized mean embedding per item
//!
//! ## Search
//! - [`FlatIndex`]: exact linear scan (default)
//! - [`HnswIndex`]: usearch HNSW candidates, re-scored exactly

pub mod builder;
pub mod catalog;
pub mod corpus;
pub mod error;
pub mod flat;
pub mod hnsw;
pub mod index;

pub use builder::{BuildOptions, BuildStats, CatalogBuilder};
pub use catalog::{Catalog, CatalogEntry, CatalogMetadata, CatalogStats, FORMAT_VERSION};
pub use corpus::{scan_corpus, ReferenceImage};
pub use error::CatalogError;
pub use flat::FlatIndex;
pub use hnsw::{HnswConfig, HnswIndex};
pub use index::{open_index, ItemTable, SimilarityIndex};
