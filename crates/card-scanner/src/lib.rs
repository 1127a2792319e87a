//! # card-scanner
//!
//! Drives one scan session against a capture source.
//!
//! Frames are pulled on a fixed interval, not in a tight loop: extraction is
//! far slower than a camera's frame rate. Each tick awaits its inference
//! before the next tick may start one, so at most one inference is in
//! flight per session. Stopping cancels the loop, discards any in-flight
//! result, and releases the source before `stop()` returns.

pub mod error;
pub mod scanner;
pub mod source;

pub use error::ScanError;
pub use scanner::{ScanHandle, ScanReport, ScanUpdate, Scanner, StopReason};
pub use source::{DirectoryFrameSource, FrameSource};
