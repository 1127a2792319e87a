//! Per-frame hits and confirmed scan results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One frame's accepted match.
///
/// Produced per query and never stored beyond the owning session's history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hit {
    /// Catalog item identifier
    pub item_id: String,
    /// Cosine similarity in [-1, 1]
    pub similarity: f32,
}

impl Hit {
    pub fn new(item_id: impl Into<String>, similarity: f32) -> Self {
        Self {
            item_id: item_id.into(),
            similarity,
        }
    }

    /// Similarity expressed on a 0-100 scale (negative similarities clamp to 0).
    pub fn similarity_percent(&self) -> f32 {
        to_percent(self.similarity)
    }
}

/// A stable identification reached by temporal confirmation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanResult {
    /// Confirmed catalog item identifier
    pub item_id: String,
    /// Mean similarity across the confirmation window
    pub confidence: f32,
    /// Number of agreeing frames that produced the confirmation
    pub frames: usize,
    /// When the confirmation fired
    pub confirmed_at: DateTime<Utc>,
}

impl ScanResult {
    pub fn new(item_id: impl Into<String>, confidence: f32, frames: usize) -> Self {
        Self {
            item_id: item_id.into(),
            confidence,
            frames,
            confirmed_at: Utc::now(),
        }
    }

    /// Confidence expressed on a 0-100 scale.
    pub fn confidence_percent(&self) -> f32 {
        to_percent(self.confidence)
    }
}

fn to_percent(similarity: f32) -> f32 {
    (similarity.clamp(0.0, 1.0) * 100.0 * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_similarity_percent() {
        let hit = Hit::new("card_A", 0.9234);
        assert!((hit.similarity_percent() - 92.34).abs() < 0.01);
    }

    #[test]
    fn test_negative_similarity_clamps_to_zero() {
        let hit = Hit::new("card_A", -0.4);
        assert_eq!(hit.similarity_percent(), 0.0);
    }

    #[test]
    fn test_scan_result_serialization() {
        let result = ScanResult::new("card_A", 0.76, 3);
        let json = serde_json::to_string(&result).unwrap();
        let decoded: ScanResult = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, result);
        assert!((decoded.confidence_percent() - 76.0).abs() < 0.01);
    }
}
