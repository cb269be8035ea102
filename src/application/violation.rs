//! Threshold violation detection.

use crate::domain::counts::{AddressCounts, Category};
use crate::domain::request::Outcome;
use crate::domain::rule::Reason;
use crate::domain::threshold::{parse_threshold, Threshold};

/// The six thresholds, one per outcome category.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    pub access: Threshold,
    pub not_found: Threshold,
    pub failure: Threshold,
    pub invalid: Threshold,
    pub validation: Threshold,
    pub security: Threshold,
}

impl Thresholds {
    /// Threshold and reason used to judge a request with this outcome.
    pub fn for_outcome(&self, outcome: Outcome) -> (Threshold, Reason) {
        match Category::of(outcome) {
            Category::Access => (self.access, Reason::Dos),
            Category::NotFound => (self.not_found, Reason::Scan),
            Category::Failure => (self.failure, Reason::Scan),
            Category::Invalid => (self.invalid, Reason::Scan),
            Category::Validation => (self.validation, Reason::Scan),
            Category::Security => (self.security, Reason::Security),
        }
    }
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            access: parse_threshold("60 r/s, 60s"),
            not_found: parse_threshold("2 r/s, 5m"),
            failure: parse_threshold("2 r/s, 5m"),
            invalid: parse_threshold("2 r/s, 5m"),
            validation: parse_threshold("5 r/s, 15m"),
            security: parse_threshold("5 r/s, 15m"),
        }
    }
}

/// Result of checking one request against its threshold.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThresholdViolation {
    pub crossed: bool,
    pub reason: Reason,
    pub threshold: Threshold,
}

/// Check whether the client's rate for this outcome reached its threshold.
///
/// Loopback clients are never in violation unless `track_localhost` is set.
pub fn threshold_violation(
    thresholds: &Thresholds,
    outcome: Outcome,
    counts: &AddressCounts,
    track_localhost: bool,
) -> ThresholdViolation {
    if !track_localhost && counts.is_localhost() {
        return ThresholdViolation {
            crossed: false,
            reason: Reason::Scan,
            threshold: Threshold::DEFAULT,
        };
    }
    let (threshold, reason) = thresholds.for_outcome(outcome);
    let throughput = counts.throughput(outcome);
    ThresholdViolation {
        crossed: throughput >= threshold.request_rate(),
        reason,
        threshold,
    }
}
