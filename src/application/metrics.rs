//! Observability metrics for admission control.
//!
//! Counters are plain atomics shared through an `Arc`, so clones of
//! [`Metrics`] observe the same values. Nothing here gates a decision.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::domain::request::Outcome;
use crate::domain::rule::Action;
use crate::infrastructure::storage::ShardedStorage;

const OUTCOMES: [Outcome; 9] = [
    Outcome::None,
    Outcome::Success,
    Outcome::Failure,
    Outcome::Validation,
    Outcome::Invalid,
    Outcome::NotFound,
    Outcome::Security,
    Outcome::Authentication,
    Outcome::Authorization,
];

fn outcome_index(outcome: Outcome) -> usize {
    OUTCOMES
        .iter()
        .position(|candidate| *candidate == outcome)
        .unwrap_or(0)
}

/// Admission control statistics.
#[derive(Debug, Clone, Default)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

#[derive(Debug, Default)]
struct MetricsInner {
    requests_allowed: AtomicU64,
    requests_denied: AtomicU64,
    requests_throttled: AtomicU64,
    thresholds_crossed: AtomicU64,
    alerts: AtomicU64,
    bans_expired: AtomicU64,
    clients_discovered: AtomicU64,
    resolve_failures: AtomicU64,
    throttle_waits: AtomicU64,
    throttle_rejections: AtomicU64,
    throttle_interruptions: AtomicU64,
    persistence_failures: AtomicU64,
    audits_dropped: AtomicU64,
    by_outcome: [AtomicU64; 9],
    by_host: ShardedStorage<String, u64>,
    by_scheme: ShardedStorage<String, u64>,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the final decision of `validate`.
    pub(crate) fn record_decision(&self, action: Action) {
        let counter = match action {
            Action::Deny => &self.inner.requests_denied,
            Action::Throttle => &self.inner.requests_throttled,
            Action::Allow | Action::Auto => &self.inner.requests_allowed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a completed request by client host name, scheme and outcome.
    pub(crate) fn record_request(&self, host: &str, scheme: &str, outcome: Outcome) {
        self.inner.by_outcome[outcome_index(outcome)].fetch_add(1, Ordering::Relaxed);
        self.inner
            .by_host
            .with_entry_mut(host.to_string(), || 0, |count| *count += 1);
        self.inner
            .by_scheme
            .with_entry_mut(scheme.to_ascii_lowercase(), || 0, |count| *count += 1);
    }

    /// Drop the per-host count of a client that is no longer tracked.
    pub(crate) fn forget_host(&self, host: &str) {
        self.inner.by_host.remove(host);
    }

    pub(crate) fn record_crossed(&self) {
        self.inner.thresholds_crossed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_alert(&self) {
        self.inner.alerts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_ban_expired(&self) {
        self.inner.bans_expired.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_discovered(&self) {
        self.inner.clients_discovered.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_resolve_failure(&self) {
        self.inner.resolve_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_throttle_wait(&self) {
        self.inner.throttle_waits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_throttle_rejection(&self) {
        self.inner.throttle_rejections.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_throttle_interruption(&self) {
        self.inner
            .throttle_interruptions
            .fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_audit_dropped(&self) {
        self.inner.audits_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_persistence_failure(&self) {
        self.inner
            .persistence_failures
            .fetch_add(1, Ordering::Relaxed);
    }

    /// Requests completed with `outcome`.
    pub fn requests_by_outcome(&self, outcome: Outcome) -> u64 {
        self.inner.by_outcome[outcome_index(outcome)].load(Ordering::Relaxed)
    }

    /// Requests from the client known by `host`: its host name, or its IP
    /// when it has none. Counts of inactive clients are dropped with them.
    pub fn requests_by_host(&self, host: &str) -> u64 {
        self.inner.by_host.get(host).unwrap_or(0)
    }

    /// Requests using `scheme` (lower case).
    pub fn requests_by_scheme(&self, scheme: &str) -> u64 {
        self.inner.by_scheme.get(scheme).unwrap_or(0)
    }

    pub fn alerts(&self) -> u64 {
        self.inner.alerts.load(Ordering::Relaxed)
    }

    /// Get a snapshot of the scalar counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
        let inner = &self.inner;
        MetricsSnapshot {
            requests_allowed: load(&inner.requests_allowed),
            requests_denied: load(&inner.requests_denied),
            requests_throttled: load(&inner.requests_throttled),
            thresholds_crossed: load(&inner.thresholds_crossed),
            alerts: load(&inner.alerts),
            bans_expired: load(&inner.bans_expired),
            clients_discovered: load(&inner.clients_discovered),
            resolve_failures: load(&inner.resolve_failures),
            throttle_waits: load(&inner.throttle_waits),
            throttle_rejections: load(&inner.throttle_rejections),
            throttle_interruptions: load(&inner.throttle_interruptions),
            persistence_failures: load(&inner.persistence_failures),
            audits_dropped: load(&inner.audits_dropped),
        }
    }

    /// Reset all counters to zero.
    pub fn reset(&self) {
        let inner = &self.inner;
        for counter in [
            &inner.requests_allowed,
            &inner.requests_denied,
            &inner.requests_throttled,
            &inner.thresholds_crossed,
            &inner.alerts,
            &inner.bans_expired,
            &inner.clients_discovered,
            &inner.resolve_failures,
            &inner.throttle_waits,
            &inner.throttle_rejections,
            &inner.throttle_interruptions,
            &inner.persistence_failures,
            &inner.audits_dropped,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
        for counter in &inner.by_outcome {
            counter.store(0, Ordering::Relaxed);
        }
        inner.by_host.clear();
        inner.by_scheme.clear();
    }
}

/// A point-in-time copy of the scalar metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MetricsSnapshot {
    pub requests_allowed: u64,
    pub requests_denied: u64,
    pub requests_throttled: u64,
    pub thresholds_crossed: u64,
    pub alerts: u64,
    pub bans_expired: u64,
    pub clients_discovered: u64,
    pub resolve_failures: u64,
    pub throttle_waits: u64,
    pub throttle_rejections: u64,
    pub throttle_interruptions: u64,
    pub persistence_failures: u64,
    /// Audit records lost to a full queue
    pub audits_dropped: u64,
}

impl MetricsSnapshot {
    /// Total decisions returned by `validate`.
    pub fn total_decisions(&self) -> u64 {
        self.requests_allowed
            .saturating_add(self.requests_denied)
            .saturating_add(self.requests_throttled)
    }

    /// Share of decisions that were DENY (0.0 to 1.0).
    pub fn deny_rate(&self) -> f64 {
        let total = self.total_decisions();
        if total == 0 {
            0.0
        } else {
            self.requests_denied as f64 / total as f64
        }
    }
}
