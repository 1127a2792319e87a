//! Temporal confirmation state machine.
//!
//! A single frame is unreliable while a card is being brought into view
//! (motion blur, partial occlusion). A result is confirmed only when the
//! last `window` accepted hits name the same item and each one exceeds the
//! confirmation threshold.
//!
//! ```text
//! Idle --start--> Accumulating --window agrees--> Confirmed
//!   ^                  |                              |
//!   +------stop--------+-------------stop-------------+
//!                      ^                              |
//!                      +----------rescan--------------+
//! ```

use card_types::{ConfirmationSettings, Hit, ScanResult};
use tracing::{debug, info};

use crate::decision::Decision;
use crate::history::HitHistory;

/// Session state.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionState {
    /// Not scanning
    Idle,
    /// Scanning, no confirmed result yet
    Accumulating,
    /// A stable identification was reached
    Confirmed(ScanResult),
}

/// Effect of feeding one frame's decision into the session.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    /// Session is not accepting frames
    Ignored,
    /// Hit appended to history, no confirmation yet
    Recorded(Hit),
    /// Frame had no confident match
    Missed,
    /// Confirmation fired
    Confirmed(ScanResult),
}

/// Window agreement rule.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConfirmationRule {
    /// Consecutive agreeing hits required
    pub window: usize,
    /// Every hit in the window must exceed this similarity
    pub threshold: f32,
}

impl ConfirmationRule {
    /// Check the newest `window` hits. Confidence is their mean similarity.
    pub fn check(&self, history: &HitHistory) -> Option<ScanResult> {
        let window: Vec<&Hit> = history.last(self.window)?.collect();
        let first = window.first()?;

        let agree = window
            .iter()
            .all(|h| h.item_id == first.item_id && h.similarity > self.threshold);
        if !agree {
            return None;
        }

        let total: f64 = window.iter().map(|h| h.similarity as f64).sum();
        let confidence = (total / window.len() as f64) as f32;
        Some(ScanResult::new(first.item_id.clone(), confidence, window.len()))
    }
}

impl From<&ConfirmationSettings> for ConfirmationRule {
    fn from(settings: &ConfirmationSettings) -> Self {
        Self {
            window: settings.window,
            threshold: settings.threshold,
        }
    }
}

/// One user-facing scanning attempt.
#[derive(Debug, Clone)]
pub struct ScanSession {
    state: SessionState,
    history: HitHistory,
    rule: ConfirmationRule,
    reset_on_miss: bool,
    stop_on_confirm: bool,
}

impl ScanSession {
    pub fn new(settings: &ConfirmationSettings) -> Self {
        Self {
            state: SessionState::Idle,
            history: HitHistory::new(settings.history_capacity),
            rule: ConfirmationRule::from(settings),
            reset_on_miss: settings.reset_on_miss,
            stop_on_confirm: settings.stop_on_confirm,
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn history(&self) -> &HitHistory {
        &self.history
    }

    /// The confirmed result, if any.
    pub fn result(&self) -> Option<&ScanResult> {
        match &self.state {
            SessionState::Confirmed(result) => Some(result),
            _ => None,
        }
    }

    /// Whether frames should still be acquired and fed in.
    pub fn is_active(&self) -> bool {
        match self.state {
            SessionState::Idle => false,
            SessionState::Accumulating => true,
            SessionState::Confirmed(_) => !self.stop_on_confirm,
        }
    }

    /// Idle -> Accumulating with an empty history.
    ///
    /// Starting an already running session restarts it.
    pub fn start(&mut self) {
        self.history.clear();
        self.state = SessionState::Accumulating;
        debug!("Scan session started");
    }

    /// Any state -> Idle. Clears history and any confirmed result.
    pub fn stop(&mut self) {
        self.history.clear();
        self.state = SessionState::Idle;
        debug!("Scan session stopped");
    }

    /// "Scan again": drop the result and history and resume accumulating.
    pub fn rescan(&mut self) {
        self.start();
    }

    /// Feed one frame's decision.
    pub fn on_decision(&mut self, decision: Decision) -> Transition {
        if !self.is_active() {
            return Transition::Ignored;
        }

        let hit = match decision {
            Decision::Accept(hit) => hit,
            Decision::Reject(reason) => {
                if self.reset_on_miss {
                    self.history.clear();
                }
                debug!(?reason, "No confident match this frame");
                return Transition::Missed;
            }
        };

        self.history.push(hit.clone());

        match self.rule.check(&self.history) {
            Some(result) => {
                info!(
                    item_id = %result.item_id,
                    confidence = result.confidence,
                    frames = result.frames,
                    "Scan confirmed"
                );
                self.state = SessionState::Confirmed(result.clone());
                Transition::Confirmed(result)
            }
            None => Transition::Recorded(hit),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decision::RejectReason;

    fn settings() -> ConfirmationSettings {
        ConfirmationSettings::default()
    }

    fn accept(id: &str, similarity: f32) -> Decision {
        Decision::Accept(Hit::new(id, similarity))
    }

    fn miss() -> Decision {
        Decision::Reject(RejectReason::NoCandidates)
    }

    fn history_of(hits: &[(&str, f32)]) -> HitHistory {
        let mut history = HitHistory::new(10);
        for (id, s) in hits {
            history.push(Hit::new(*id, *s));
        }
        history
    }

    fn rule() -> ConfirmationRule {
        ConfirmationRule {
            window: 3,
            threshold: 0.65,
        }
    }

    #[test]
    fn test_rule_confirms_with_mean_confidence() {
        let result = rule()
            .check(&history_of(&[
                ("card_A", 0.70),
                ("card_A", 0.68),
                ("card_A", 0.90),
            ]))
            .unwrap();
        assert_eq!(result.item_id, "card_A");
        assert!((result.confidence - 0.76).abs() < 1e-4);
        assert_eq!(result.frames, 3);
    }

    #[test]
    fn test_rule_rejects_mixed_items() {
        assert!(rule()
            .check(&history_of(&[
                ("card_A", 0.70),
                ("card_B", 0.70),
                ("card_A", 0.70),
            ]))
            .is_none());
    }

    #[test]
    fn test_rule_rejects_entry_below_threshold() {
        assert!(rule()
            .check(&history_of(&[
                ("card_A", 0.70),
                ("card_A", 0.60),
                ("card_A", 0.70),
            ]))
            .is_none());
    }

    #[test]
    fn test_rule_only_looks_at_window() {
        assert!(rule()
            .check(&history_of(&[
                ("card_B", 0.99),
                ("card_A", 0.70),
                ("card_A", 0.70),
                ("card_A", 0.70),
            ]))
            .is_some());
        assert!(rule()
            .check(&history_of(&[("card_A", 0.70), ("card_A", 0.70)]))
            .is_none());
    }

    #[test]
    fn test_idle_ignores_frames() {
        let mut session = ScanSession::new(&settings());
        assert_eq!(session.on_decision(accept("card_A", 0.9)), Transition::Ignored);
        assert!(session.history().is_empty());
    }

    #[test]
    fn test_accumulate_then_confirm() {
        let mut session = ScanSession::new(&settings());
        session.start();
        assert_eq!(*session.state(), SessionState::Accumulating);

        assert!(matches!(
            session.on_decision(accept("card_A", 0.70)),
            Transition::Recorded(_)
        ));
        assert!(matches!(
            session.on_decision(accept("card_A", 0.68)),
            Transition::Recorded(_)
        ));
        let Transition::Confirmed(result) = session.on_decision(accept("card_A", 0.90)) else {
            panic!("expected confirmation");
        };
        assert_eq!(result.item_id, "card_A");
        assert_eq!(session.result(), Some(&result));
        assert!(!session.is_active());

        // Halted: further frames are ignored and can't overwrite the result
        assert_eq!(session.on_decision(accept("card_B", 0.99)), Transition::Ignored);
        assert_eq!(session.result().unwrap().item_id, "card_A");
    }

    #[test]
    fn test_miss_is_skipped_by_default() {
        let mut session = ScanSession::new(&settings());
        session.start();
        session.on_decision(accept("card_A", 0.70));
        session.on_decision(accept("card_A", 0.70));
        assert_eq!(session.on_decision(miss()), Transition::Missed);
        assert_eq!(session.history().len(), 2);
        assert!(matches!(
            session.on_decision(accept("card_A", 0.70)),
            Transition::Confirmed(_)
        ));
    }

    #[test]
    fn test_miss_resets_when_configured() {
        let mut session = ScanSession::new(&ConfirmationSettings {
            reset_on_miss: true,
            ..settings()
        });
        session.start();
        session.on_decision(accept("card_A", 0.70));
        session.on_decision(accept("card_A", 0.70));
        session.on_decision(miss());
        assert!(session.history().is_empty());
        assert!(matches!(
            session.on_decision(accept("card_A", 0.70)),
            Transition::Recorded(_)
        ));
    }

    #[test]
    fn test_rescan_clears_and_resumes() {
        let mut session = ScanSession::new(&settings());
        session.start();
        for _ in 0..3 {
            session.on_decision(accept("card_A", 0.8));
        }
        assert!(session.result().is_some());

        session.rescan();
        assert_eq!(*session.state(), SessionState::Accumulating);
        assert!(session.result().is_none());
        assert!(session.history().is_empty());
    }

    #[test]
    fn test_stop_returns_to_idle() {
        let mut session = ScanSession::new(&settings());
        session.start();
        session.on_decision(accept("card_A", 0.8));
        session.stop();
        assert_eq!(*session.state(), SessionState::Idle);
        assert!(session.history().is_empty());
        assert!(!session.is_active());
    }

    #[test]
    fn test_streaming_after_confirm_replaces_result() {
        let mut session = ScanSession::new(&ConfirmationSettings {
            stop_on_confirm: false,
            ..settings()
        });
        session.start();
        for _ in 0..3 {
            session.on_decision(accept("card_A", 0.8));
        }
        assert!(session.is_active());

        for _ in 0..2 {
            session.on_decision(accept("card_B", 0.9));
        }
        assert_eq!(session.result().unwrap().item_id, "card_A");
        session.on_decision(accept("card_B", 0.9));
        assert_eq!(session.result().unwrap().item_id, "card_B");
    }
}
