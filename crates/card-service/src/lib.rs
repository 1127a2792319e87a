//! gRPC service for the card recognizer.
//!
//! Provides:
//! - Identify RPC: one encoded image in, best match (or explicit no-match) out
//! - GetCatalogStatus RPC: readiness plus catalog model and counts
//! - Health check endpoint via tonic-health

pub mod identify;
pub mod pb;
pub mod server;
pub mod service;

pub use identify::IdentifyHandler;
pub use server::{run_server, run_server_with_shutdown};
pub use service::CardServiceImpl;
