//! Single-frame decision policy.
//!
//! A generic extractor always produces *some* nearest item, even with no card
//! in frame. The policy gates which top candidates are surfaced at all.

use std::fmt;

use card_types::{DecisionPolicyKind, DecisionSettings, Hit};
use serde::Serialize;

/// Runner-up similarity assumed when the ranking has a single item.
const MISSING_RUNNER_UP: f32 = -1.0;

/// Why a frame produced no confident match.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum RejectReason {
    /// Nothing was ranked (empty catalog)
    NoCandidates,
    /// Top similarity under the absolute floor
    BelowThreshold { similarity: f32, threshold: f32 },
    /// Top two candidates too close to call
    InsufficientMargin { margin: f32, required: f32 },
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::NoCandidates => write!(f, "catalog returned no candidates"),
            RejectReason::BelowThreshold {
                similarity,
                threshold,
            } => write!(f, "best similarity {:.3} below {:.3}", similarity, threshold),
            RejectReason::InsufficientMargin { margin, required } => {
                write!(f, "margin {:.3} below required {:.3}", margin, required)
            }
        }
    }
}

/// Outcome of the policy for one frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    Accept(Hit),
    Reject(RejectReason),
}

impl Decision {
    pub fn hit(&self) -> Option<&Hit> {
        match self {
            Decision::Accept(hit) => Some(hit),
            Decision::Reject(_) => None,
        }
    }

    pub fn is_accept(&self) -> bool {
        matches!(self, Decision::Accept(_))
    }
}

/// Frame acceptance rule.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DecisionPolicy {
    /// Accept when top-1 >= `min_similarity` and top-1 minus top-2 >= `min_margin`
    ThresholdMargin { min_similarity: f32, min_margin: f32 },
    /// Accept when top-1 exceeds `cutoff`
    FlatThreshold { cutoff: f32 },
}

impl Default for DecisionPolicy {
    fn default() -> Self {
        Self::from_settings(&DecisionSettings::default())
    }
}

impl DecisionPolicy {
    pub fn from_settings(settings: &DecisionSettings) -> Self {
        match settings.policy {
            DecisionPolicyKind::ThresholdMargin => DecisionPolicy::ThresholdMargin {
                min_similarity: settings.min_similarity,
                min_margin: settings.min_margin,
            },
            DecisionPolicyKind::FlatThreshold => DecisionPolicy::FlatThreshold {
                cutoff: settings.cutoff,
            },
        }
    }

    /// How many ranked items the policy needs to see.
    pub fn required_candidates(&self) -> usize {
        match self {
            DecisionPolicy::ThresholdMargin { .. } => 2,
            DecisionPolicy::FlatThreshold { .. } => 1,
        }
    }

    /// Decide on a ranked list (best first).
    pub fn decide(&self, ranked: &[Hit]) -> Decision {
        let Some(top) = ranked.first() else {
            return Decision::Reject(RejectReason::NoCandidates);
        };

        match *self {
            DecisionPolicy::ThresholdMargin {
                min_similarity,
                min_margin,
            } => {
                let runner_up = ranked
                    .get(1)
                    .map(|h| h.similarity)
                    .unwrap_or(MISSING_RUNNER_UP);
                let margin = top.similarity - runner_up;

                if margin < min_margin {
                    return Decision::Reject(RejectReason::InsufficientMargin {
                        margin,
                        required: min_margin,
                    });
                }
                if top.similarity < min_similarity {
                    return Decision::Reject(RejectReason::BelowThreshold {
                        similarity: top.similarity,
                        threshold: min_similarity,
                    });
                }
                Decision::Accept(top.clone())
            }
            DecisionPolicy::FlatThreshold { cutoff } => {
                if top.similarity > cutoff {
                    Decision::Accept(top.clone())
                } else {
                    Decision::Reject(RejectReason::BelowThreshold {
                        similarity: top.similarity,
                        threshold: cutoff,
                    })
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn margin_policy() -> DecisionPolicy {
        DecisionPolicy::ThresholdMargin {
            min_similarity: 0.5,
            min_margin: 0.05,
        }
    }

    fn ranked(scores: &[(&str, f32)]) -> Vec<Hit> {
        scores.iter().map(|(id, s)| Hit::new(*id, *s)).collect()
    }

    #[test]
    fn test_reject_reason_display() {
        let reason = RejectReason::InsufficientMargin {
            margin: 0.02,
            required: 0.05,
        };
        assert_eq!(reason.to_string(), "margin 0.020 below required 0.050");
        assert_eq!(
            RejectReason::NoCandidates.to_string(),
            "catalog returned no candidates"
        );
    }

    #[test]
    fn test_well_separated_match_accepted() {
        let decision = margin_policy().decide(&ranked(&[("X", 0.92), ("Y", 0.40), ("Z", 0.10)]));
        assert_eq!(decision, Decision::Accept(Hit::new("X", 0.92)));
    }

    #[test]
    fn test_small_margin_rejected_regardless_of_similarity() {
        for top in [0.55f32, 0.8, 0.95, 0.999] {
            let decision = margin_policy().decide(&ranked(&[("X", top), ("Y", top - 0.03)]));
            assert!(
                matches!(
                    decision,
                    Decision::Reject(RejectReason::InsufficientMargin { .. })
                ),
                "top {top} accepted"
            );
        }
    }

    #[test]
    fn test_low_similarity_rejected() {
        let decision = margin_policy().decide(&ranked(&[("X", 0.45), ("Y", 0.10)]));
        assert!(matches!(
            decision,
            Decision::Reject(RejectReason::BelowThreshold { .. })
        ));
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let decision = margin_policy().decide(&ranked(&[("X", 0.5), ("Y", 0.25)]));
        assert!(decision.is_accept());
    }

    #[test]
    fn test_single_candidate_uses_missing_runner_up() {
        let decision = margin_policy().decide(&ranked(&[("X", 0.6)]));
        assert_eq!(decision.hit().map(|h| h.item_id.as_str()), Some("X"));
    }

    #[test]
    fn test_empty_ranking_rejected() {
        assert_eq!(
            margin_policy().decide(&[]),
            Decision::Reject(RejectReason::NoCandidates)
        );
        assert_eq!(
            DecisionPolicy::FlatThreshold { cutoff: 0.7 }.decide(&[]),
            Decision::Reject(RejectReason::NoCandidates)
        );
    }

    #[test]
    fn test_flat_threshold_ignores_margin() {
        let policy = DecisionPolicy::FlatThreshold { cutoff: 0.7 };
        let decision = policy.decide(&ranked(&[("X", 0.80), ("Y", 0.79)]));
        assert!(decision.is_accept());
    }

    #[test]
    fn test_flat_threshold_is_strict() {
        let policy = DecisionPolicy::FlatThreshold { cutoff: 0.7 };
        assert!(!policy.decide(&ranked(&[("X", 0.7)])).is_accept());
        assert!(policy.decide(&ranked(&[("X", 0.71)])).is_accept());
    }

    #[test]
    fn test_from_settings() {
        let settings = DecisionSettings {
            policy: DecisionPolicyKind::FlatThreshold,
            cutoff: 0.8,
            ..Default::default()
        };
        assert_eq!(
            DecisionPolicy::from_settings(&settings),
            DecisionPolicy::FlatThreshold { cutoff: 0.8 }
        );
        assert_eq!(
            DecisionPolicy::default(),
            DecisionPolicy::ThresholdMargin {
                min_similarity: 0.5,
                min_margin: 0.05
            }
        );
        assert_eq!(DecisionPolicy::default().required_candidates(), 2);
    }
}
