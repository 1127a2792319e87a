//! Periodic scan loop.
//!
//! One tokio task per scan. Each tick reads a frame, runs recognition on the
//! blocking pool and feeds the decision into a [`ScanSession`]. Cancellation
//! is checked at every await point; a result that arrives after `stop()` is
//! dropped unseen.

use std::sync::Arc;
use std::time::Duration;

use card_matcher::{
    Decision, FrameOutcome, MatchError, Recognizer, RejectReason, ScanSession, Transition,
};
use card_types::{ConfirmationSettings, Hit, ScanResult, ScanSettings};
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::ScanError;
use crate::source::FrameSource;

/// Capacity of the update channel. Slow subscribers lose the oldest updates.
const UPDATE_CHANNEL_CAPACITY: usize = 64;

/// Why a scan loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// `stop()` was called
    Requested,
    /// A result was confirmed and the session halts on confirmation
    Confirmed,
    /// The source ran out of frames
    SourceExhausted,
}

/// Progress events published while a scan runs.
#[derive(Debug, Clone, PartialEq)]
pub enum ScanUpdate {
    Started { source: String },
    /// An accepted frame was added to the history
    Hit { hit: Hit, history_len: usize },
    /// The frame had no confident match
    Miss { reason: RejectReason },
    /// The frame contributed nothing (unreadable, not ready, degenerate)
    Skipped { reason: String },
    Confirmed(ScanResult),
    Stopped(StopReason),
}

/// Summary returned when a scan ends.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanReport {
    /// Confirmed result, if one was reached
    pub result: Option<ScanResult>,
    /// Frames that went through recognition
    pub frames: usize,
    /// Frames dropped before or during recognition
    pub skipped: usize,
    pub stop: StopReason,
}

/// Handle to a running scan.
pub struct ScanHandle {
    cancel: CancellationToken,
    join: JoinHandle<ScanReport>,
}

impl ScanHandle {
    /// Token that stops this scan when cancelled.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Stop the scan. Returns once the source has been released.
    pub async fn stop(self) -> Result<ScanReport, ScanError> {
        self.cancel.cancel();
        self.wait().await
    }

    /// Wait for the scan to end on its own (confirmation or exhausted source).
    pub async fn wait(self) -> Result<ScanReport, ScanError> {
        self.join
            .await
            .map_err(|e| ScanError::Task(e.to_string()))
    }
}

/// Starts scan sessions against a shared recognizer.
pub struct Scanner {
    recognizer: Arc<Recognizer>,
    confirmation: ConfirmationSettings,
    interval: Duration,
    updates: broadcast::Sender<ScanUpdate>,
}

impl Scanner {
    pub fn new(
        recognizer: Arc<Recognizer>,
        confirmation: ConfirmationSettings,
        scan: &ScanSettings,
    ) -> Self {
        Self::with_interval(
            recognizer,
            confirmation,
            Duration::from_millis(scan.interval_ms),
        )
    }

    pub fn with_interval(
        recognizer: Arc<Recognizer>,
        confirmation: ConfirmationSettings,
        interval: Duration,
    ) -> Self {
        let (updates, _) = broadcast::channel(UPDATE_CHANNEL_CAPACITY);
        Self {
            recognizer,
            confirmation,
            interval,
            updates,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Receive updates for scans started after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<ScanUpdate> {
        self.updates.subscribe()
    }

    /// Open `source` and start scanning.
    ///
    /// Fails without spawning anything if the recognizer is not ready or the
    /// source cannot be acquired.
    pub async fn start<S: FrameSource>(&self, mut source: S) -> Result<ScanHandle, ScanError> {
        self.recognizer.check_ready().map_err(|e| match e {
            MatchError::NotReady(msg) => ScanError::NotReady(msg),
            other => ScanError::Match(other),
        })?;

        source.open().await?;
        let name = source.name();
        info!(source = %name, interval_ms = self.interval.as_millis() as u64, "Scan started");

        let mut session = ScanSession::new(&self.confirmation);
        session.start();

        let cancel = CancellationToken::new();
        let scan = ScanLoop {
            recognizer: self.recognizer.clone(),
            session,
            interval: self.interval,
            cancel: cancel.clone(),
            updates: self.updates.clone(),
        };
        let _ = self.updates.send(ScanUpdate::Started { source: name });

        let join = tokio::spawn(scan.run(source));
        Ok(ScanHandle { cancel, join })
    }
}

struct ScanLoop {
    recognizer: Arc<Recognizer>,
    session: ScanSession,
    interval: Duration,
    cancel: CancellationToken,
    updates: broadcast::Sender<ScanUpdate>,
}

impl ScanLoop {
    async fn run<S: FrameSource>(mut self, mut source: S) -> ScanReport {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut frames = 0usize;
        let mut skipped = 0usize;

        let stop = loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break StopReason::Requested,
                _ = ticker.tick() => {}
            }

            let read = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break StopReason::Requested,
                read = source.next_frame() => read,
            };
            let frame = match read {
                Ok(Some(frame)) => frame,
                Ok(None) => break StopReason::SourceExhausted,
                Err(e) => {
                    warn!(error = %e, "Frame read failed, skipping tick");
                    skipped += 1;
                    self.publish(ScanUpdate::Skipped {
                        reason: e.to_string(),
                    });
                    continue;
                }
            };

            let recognizer = self.recognizer.clone();
            let inference = tokio::task::spawn_blocking(move || recognizer.recognize_frame(&frame));
            let joined = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    debug!("Scan stopped during inference, discarding result");
                    break StopReason::Requested;
                }
                joined = inference => joined,
            };

            let outcome = match joined {
                Ok(Ok(outcome)) => outcome,
                Ok(Err(e)) => {
                    warn!(error = %e, "Recognition failed, skipping frame");
                    skipped += 1;
                    self.publish(ScanUpdate::Skipped {
                        reason: e.to_string(),
                    });
                    continue;
                }
                Err(e) => {
                    warn!(error = %e, "Recognition task failed, skipping frame");
                    skipped += 1;
                    self.publish(ScanUpdate::Skipped {
                        reason: e.to_string(),
                    });
                    continue;
                }
            };

            let decision = match outcome {
                FrameOutcome::Decided { decision, .. } => decision,
                FrameOutcome::Skipped(reason) => {
                    skipped += 1;
                    self.publish(ScanUpdate::Skipped {
                        reason: reason.to_string(),
                    });
                    continue;
                }
            };
            frames += 1;

            let rejected = match &decision {
                Decision::Reject(reason) => Some(reason.clone()),
                Decision::Accept(_) => None,
            };
            match self.session.on_decision(decision) {
                Transition::Recorded(hit) => {
                    let history_len = self.session.history().len();
                    self.publish(ScanUpdate::Hit { hit, history_len });
                }
                Transition::Missed => {
                    if let Some(reason) = rejected {
                        self.publish(ScanUpdate::Miss { reason });
                    }
                }
                Transition::Confirmed(result) => {
                    self.publish(ScanUpdate::Confirmed(result));
                    if !self.session.is_active() {
                        break StopReason::Confirmed;
                    }
                }
                Transition::Ignored => {}
            }
        };

        source.release().await;

        let report = ScanReport {
            result: self.session.result().cloned(),
            frames,
            skipped,
            stop,
        };
        info!(
            stop = ?report.stop,
            frames = report.frames,
            skipped = report.skipped,
            item_id = report.result.as_ref().map(|r| r.item_id.as_str()).unwrap_or("-"),
            "Scan ended"
        );
        self.session.stop();
        self.publish(ScanUpdate::Stopped(stop));
        report
    }

    fn publish(&self, update: ScanUpdate) {
        // No subscribers is fine
        let _ = self.updates.send(update);
    }
}
