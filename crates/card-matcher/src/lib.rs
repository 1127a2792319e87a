//! # card-matcher
//!
//! Turns ranked similarity results into identifications.
//!
//! - [`DecisionPolicy`] accepts or rejects one frame's top candidate
//! - [`HitHistory`] keeps the most recent accepted hits (FIFO)
//! - [`ScanSession`] is the Idle / Accumulating / Confirmed state machine that
//!   requires several consecutive agreeing frames before confirming
//! - [`Recognizer`] runs normalize, extract, search and decide for one frame

pub mod decision;
pub mod error;
pub mod history;
pub mod recognizer;
pub mod session;

pub use decision::{Decision, DecisionPolicy, RejectReason};
pub use error::MatchError;
pub use history::HitHistory;
pub use recognizer::{CatalogSlot, FrameOutcome, LoadedCatalog, Recognizer, SkipReason};
pub use session::{ConfirmationRule, ScanSession, SessionState, Transition};
