//! Auto-approval threshold that adapts to how often reviewers disagree.

use crate::classification::types::ReviewStats;

pub const DEFAULT_BASE_THRESHOLD: f64 = 0.80;
/// Reviews older than this are ignored.
pub const REVIEW_WINDOW_DAYS: i64 = 90;
/// Below this many reviews the base threshold is used unchanged.
pub const MIN_REVIEWS: i64 = 5;
/// Override rate at which the threshold equals the base.
const EXPECTED_OVERRIDE_RATE: f64 = 0.2;
const SENSITIVITY: f64 = 0.5;
const MIN_THRESHOLD: f64 = 0.5;
const MAX_THRESHOLD: f64 = 0.95;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThresholdPolicy {
    pub base: f64,
}

impl Default for ThresholdPolicy {
    fn default() -> Self {
        Self {
            base: DEFAULT_BASE_THRESHOLD,
        }
    }
}

impl ThresholdPolicy {
    pub fn new(base: f64) -> Self {
        Self { base }
    }

    /// `(rejected + overridden) / reviewed`, or `None` with too few reviews.
    pub fn override_rate(stats: &ReviewStats) -> Option<f64> {
        if stats.reviewed < MIN_REVIEWS {
            return None;
        }
        Some((stats.rejected + stats.overridden) as f64 / stats.reviewed as f64)
    }

    pub fn threshold(&self, stats: &ReviewStats) -> f64 {
        match Self::override_rate(stats) {
            None => self.base,
            Some(rate) => (self.base + (rate - EXPECTED_OVERRIDE_RATE) * SENSITIVITY)
                .clamp(MIN_THRESHOLD, MAX_THRESHOLD),
        }
    }

    pub fn auto_approves(&self, confidence: f64, stats: &ReviewStats) -> bool {
        confidence >= self.threshold(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(reviewed: i64, rejected: i64, overridden: i64) -> ReviewStats {
        ReviewStats {
            reviewed,
            rejected,
            overridden,
        }
    }

    #[test]
    fn test_few_reviews_use_base() {
        let policy = ThresholdPolicy::default();
        assert_eq!(policy.threshold(&stats(4, 4, 0)), 0.80);
        assert_eq!(policy.threshold(&stats(0, 0, 0)), 0.80);
    }

    #[test]
    fn test_threshold_moves_with_override_rate() {
        let policy = ThresholdPolicy::default();
        // 20% overrides leaves the base unchanged.
        assert!((policy.threshold(&stats(10, 1, 1)) - 0.80).abs() < 1e-9);
        // 60% -> 0.8 + 0.4 * 0.5 = 1.0, clamped.
        assert_eq!(policy.threshold(&stats(10, 4, 2)), 0.95);
        // 0% -> 0.8 - 0.1
        assert!((policy.threshold(&stats(10, 0, 0)) - 0.70).abs() < 1e-9);
    }

    #[test]
    fn test_threshold_floor() {
        let policy = ThresholdPolicy::new(0.5);
        assert_eq!(policy.threshold(&stats(20, 0, 0)), 0.5);
    }

    #[test]
    fn test_auto_approval() {
        let policy = ThresholdPolicy::default();
        assert!(policy.auto_approves(0.8, &stats(0, 0, 0)));
        assert!(!policy.auto_approves(0.79, &stats(0, 0, 0)));
    }
}
