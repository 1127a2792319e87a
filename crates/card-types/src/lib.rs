//! # card-types
//!
//! Shared domain types for the card recognizer.
//!
//! - Hits and scan results exchanged between the matcher, scanner and service
//! - Item labels parsed from reference image names
//! - Layered settings (defaults -> config file -> env vars -> CLI flags)
//!
//! ## Usage
//!
//! ```rust
//! use card_types::ItemLabel;
//!
//! let label = ItemLabel::parse("sv02-031_Litleo");
//! assert_eq!(label.item_id, "sv02-031");
//! assert_eq!(label.display_name, "Litleo");
//! ```

pub mod config;
pub mod error;
pub mod hit;
pub mod label;

pub use config::{
    AugmentationSettings, CatalogSettings, CatalogShape, ConfirmationSettings, DecisionPolicyKind,
    DecisionSettings, ExtractorKind, ExtractorSettings, NormalizerSettings, ScanSettings,
    SearchMode, SearchSettings, ServerSettings, Settings, MAX_TOP_K,
};
pub use error::CardError;
pub use hit::{Hit, ScanResult};
pub use label::ItemLabel;
