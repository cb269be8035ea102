//! Per-client request counters.
//!
//! Every client owns one [`AddressCounts`] holding a [`Counter`] per outcome
//! category. Counters are updated with atomics so concurrent requests from
//! the same client never take a lock.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crate::domain::address::ResolvedAddress;
use crate::domain::request::Outcome;

/// Samples required before a counter reports a throughput.
///
/// Keeps a short burst from a fresh client from looking like a flood.
pub const MINIMUM_COUNT: u64 = 20;

/// Outcome category tracked by a dedicated counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Access,
    NotFound,
    Failure,
    Invalid,
    Validation,
    Security,
}

impl Category {
    /// Category whose counter and threshold judge a request with this outcome.
    ///
    /// Successful requests are judged by the access counter.
    pub fn of(outcome: Outcome) -> Category {
        match outcome {
            Outcome::None | Outcome::Success => Category::Access,
            Outcome::NotFound => Category::NotFound,
            Outcome::Failure => Category::Failure,
            Outcome::Invalid => Category::Invalid,
            Outcome::Validation => Category::Validation,
            Outcome::Security | Outcome::Authentication | Outcome::Authorization => {
                Category::Security
            }
        }
    }
}

/// Count of requests in one category with the time span it covers.
#[derive(Debug)]
pub struct Counter {
    count: AtomicU64,
    created: Instant,
    /// Nanoseconds from `created` to the last increment
    updated_nanos: AtomicU64,
}

impl Counter {
    pub fn new(created: Instant) -> Self {
        Self {
            count: AtomicU64::new(0),
            created,
            updated_nanos: AtomicU64::new(0),
        }
    }

    /// Record one request at `now`.
    pub fn increment(&self, now: Instant) {
        self.updated_nanos
            .fetch_max(nanos_since(self.created, now), Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    pub fn created(&self) -> Instant {
        self.created
    }

    pub fn updated(&self) -> Instant {
        self.created + self.elapsed()
    }

    /// Time between creation and the last increment.
    pub fn elapsed(&self) -> Duration {
        Duration::from_nanos(self.updated_nanos.load(Ordering::Relaxed))
    }

    /// Average requests per second over the counter's lifetime.
    ///
    /// Zero when no time has elapsed yet.
    pub fn throughput(&self) -> f64 {
        let seconds = self.elapsed().as_secs_f64();
        if seconds == 0.0 {
            0.0
        } else {
            self.count() as f64 / seconds
        }
    }
}

/// All counters for one client.
#[derive(Debug)]
pub struct AddressCounts {
    address: ResolvedAddress,
    created: Instant,
    updated_nanos: AtomicU64,
    access: Counter,
    not_found: Counter,
    failure: Counter,
    invalid: Counter,
    validation: Counter,
    security: Counter,
}

impl AddressCounts {
    pub fn new(address: ResolvedAddress, created: Instant) -> Self {
        Self {
            address,
            created,
            updated_nanos: AtomicU64::new(0),
            access: Counter::new(created),
            not_found: Counter::new(created),
            failure: Counter::new(created),
            invalid: Counter::new(created),
            validation: Counter::new(created),
            security: Counter::new(created),
        }
    }

    pub fn address(&self) -> &ResolvedAddress {
        &self.address
    }

    pub fn is_localhost(&self) -> bool {
        self.address.is_loopback()
    }

    /// Record a request. The access counter counts every request, the
    /// outcome's own counter is bumped as well for non-successful outcomes.
    ///
    /// Returns the counter that judges this outcome.
    pub fn increment(&self, outcome: Outcome, now: Instant) -> &Counter {
        self.access.increment(now);
        let category = Category::of(outcome);
        if category != Category::Access {
            self.counter(category).increment(now);
        }
        self.updated_nanos
            .fetch_max(nanos_since(self.created, now), Ordering::Relaxed);
        self.counter(category)
    }

    pub fn counter(&self, category: Category) -> &Counter {
        match category {
            Category::Access => &self.access,
            Category::NotFound => &self.not_found,
            Category::Failure => &self.failure,
            Category::Invalid => &self.invalid,
            Category::Validation => &self.validation,
            Category::Security => &self.security,
        }
    }

    /// Throughput of the counter judging `outcome`, zero below [`MINIMUM_COUNT`].
    pub fn throughput(&self, outcome: Outcome) -> f64 {
        let counter = self.counter(Category::of(outcome));
        if counter.count() < MINIMUM_COUNT {
            0.0
        } else {
            counter.throughput()
        }
    }

    pub fn created(&self) -> Instant {
        self.created
    }

    /// When the client was last seen.
    pub fn updated(&self) -> Instant {
        self.created + Duration::from_nanos(self.updated_nanos.load(Ordering::Relaxed))
    }

    pub fn snapshot(&self) -> CountsSnapshot {
        CountsSnapshot {
            access: self.access.count(),
            not_found: self.not_found.count(),
            failure: self.failure.count(),
            invalid: self.invalid.count(),
            validation: self.validation.count(),
            security: self.security.count(),
        }
    }

    /// Read-only view for reporting.
    pub fn view(&self) -> RequestCounts {
        RequestCounts {
            id: self.address.id(),
            name: self.address.hostname().to_string(),
            ip: self.address.ip(),
            counts: self.snapshot(),
            throughput: self.access.throughput(),
            first_seen: self.created,
            last_seen: self.updated(),
        }
    }
}

/// Point-in-time copy of a client's counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CountsSnapshot {
    pub access: u64,
    pub not_found: u64,
    pub failure: u64,
    pub invalid: u64,
    pub validation: u64,
    pub security: u64,
}

impl CountsSnapshot {
    /// Counts recorded since `previous` was taken, never negative.
    pub fn delta_since(&self, previous: &CountsSnapshot) -> CountsSnapshot {
        CountsSnapshot {
            access: self.access.saturating_sub(previous.access),
            not_found: self.not_found.saturating_sub(previous.not_found),
            failure: self.failure.saturating_sub(previous.failure),
            invalid: self.invalid.saturating_sub(previous.invalid),
            validation: self.validation.saturating_sub(previous.validation),
            security: self.security.saturating_sub(previous.security),
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == CountsSnapshot::default()
    }

    /// Add another snapshot into this one.
    pub fn accumulate(&mut self, other: &CountsSnapshot) {
        self.access += other.access;
        self.not_found += other.not_found;
        self.failure += other.failure;
        self.invalid += other.invalid;
        self.validation += other.validation;
        self.security += other.security;
    }
}

/// Reporting view of a tracked client.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestCounts {
    pub id: String,
    /// Host name, or the IP when it could not be resolved
    pub name: String,
    pub ip: std::net::IpAddr,
    pub counts: CountsSnapshot,
    /// Average requests per second across all outcomes
    pub throughput: f64,
    pub first_seen: Instant,
    pub last_seen: Instant,
}

fn nanos_since(base: Instant, now: Instant) -> u64 {
    now.saturating_duration_since(base)
        .as_nanos()
        .try_into()
        .unwrap_or(u64::MAX)
}
