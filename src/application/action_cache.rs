//! Cached per-client decisions.
//!
//! An [`ActionEntry`] is the live decision for one client or one CIDR match.
//! It is shared between request threads, so every mutable field is atomic and
//! the "already signaled" flag is flipped with compare-and-set.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::domain::rule::{Action, Reason, Rule};
use crate::domain::threshold::Threshold;

/// How long a decision that did not come from a violation stays valid.
pub const DEFAULT_HOLD: Duration = Duration::from_secs(5 * 60);

/// Live decision for a client.
#[derive(Debug)]
pub struct ActionEntry {
    rule: Arc<Rule>,
    action: AtomicU8,
    reason: AtomicU8,
    created: Instant,
    /// Expiry as nanoseconds after `created`
    expire_nanos: AtomicU64,
    crossed: AtomicBool,
}

impl ActionEntry {
    /// Entry holding `action` for [`DEFAULT_HOLD`].
    pub fn new(rule: Arc<Rule>, action: Action, now: Instant) -> Self {
        Self {
            rule,
            action: AtomicU8::new(action.to_u8()),
            reason: AtomicU8::new(Reason::Dos.to_u8()),
            created: now,
            expire_nanos: AtomicU64::new(nanos(DEFAULT_HOLD)),
            crossed: AtomicBool::new(false),
        }
    }

    pub fn rule(&self) -> &Rule {
        &self.rule
    }

    pub fn action(&self) -> Action {
        Action::from_u8(self.action.load(Ordering::Acquire))
    }

    pub fn reason(&self) -> Reason {
        Reason::from_u8(self.reason.load(Ordering::Acquire))
    }

    pub fn expires_at(&self) -> Instant {
        self.created + Duration::from_nanos(self.expire_nanos.load(Ordering::Acquire))
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at()
    }

    /// Whether a violation was already signaled for the current window.
    pub fn is_crossed(&self) -> bool {
        self.crossed.load(Ordering::Acquire)
    }

    /// Claim the violation signal. Only one caller per window gets `true`.
    pub fn try_cross(&self) -> bool {
        self.crossed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Apply a ban for the threshold's blocking period.
    ///
    /// The crossed flag stays set until the ban is reverted.
    pub fn ban(&self, action: Action, reason: Reason, threshold: &Threshold, now: Instant) {
        self.action.store(action.to_u8(), Ordering::Release);
        self.reason.store(reason.to_u8(), Ordering::Release);
        self.set_expiry(now + threshold.blocking_period());
    }

    /// Revert to the rule's own action once the entry has expired.
    ///
    /// Returns the restored action, or `None` when the entry is still valid or
    /// another thread reverted it first.
    pub fn revert_if_expired(&self, now: Instant) -> Option<Action> {
        let current = self.expire_nanos.load(Ordering::Acquire);
        if now < self.created + Duration::from_nanos(current) {
            return None;
        }
        let renewed = nanos((now + DEFAULT_HOLD).saturating_duration_since(self.created));
        if self
            .expire_nanos
            .compare_exchange(current, renewed, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return None;
        }
        let action = self.rule.action();
        self.action.store(action.to_u8(), Ordering::Release);
        self.crossed.store(false, Ordering::Release);
        Some(action)
    }

    fn set_expiry(&self, at: Instant) {
        self.expire_nanos.store(
            nanos(at.saturating_duration_since(self.created)),
            Ordering::Release,
        );
    }
}

fn nanos(duration: Duration) -> u64 {
    duration.as_nanos().try_into().unwrap_or(u64::MAX)
}
