//! Scanner error types.

use thiserror::Error;

/// Errors that prevent a scan from starting or finishing cleanly.
///
/// Per-frame problems never surface here; they are reported as
/// [`crate::ScanUpdate::Skipped`] and the loop carries on.
#[derive(Debug, Error)]
pub enum ScanError {
    /// Capture resource could not be opened (permission denied, missing device)
    #[error("Cannot acquire capture source: {0}")]
    ResourceAcquisition(String),

    /// Extractor or catalog not loaded yet
    #[error("Not ready: {0}")]
    NotReady(String),

    /// One frame could not be read
    #[error("Frame error: {0}")]
    Frame(String),

    /// Recognition pipeline misconfigured
    #[error("Match error: {0}")]
    Match(#[from] card_matcher::MatchError),

    /// Scan task panicked or was aborted
    #[error("Scan task failed: {0}")]
    Task(String),
}
