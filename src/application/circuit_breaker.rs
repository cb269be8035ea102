//! Circuit breaker around the admission path.
//!
//! Admission control must never take the service down with it. Panics inside
//! `register`/`validate` are counted as failures; once enough pile up the
//! circuit opens and every call fails open (ALLOW, nothing recorded) until the
//! recovery timeout lets a trial call through.

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::application::ports::Clock;

/// Circuit breaker states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Normal operation
    Closed = 0,
    /// Failing open after repeated failures
    Open = 1,
    /// Letting trial calls through after the recovery timeout
    HalfOpen = 2,
}

impl From<u8> for CircuitState {
    fn from(value: u8) -> Self {
        match value {
            1 => CircuitState::Open,
            2 => CircuitState::HalfOpen,
            _ => CircuitState::Closed,
        }
    }
}

/// Configuration for circuit breaker behavior.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before the circuit opens
    pub failure_threshold: u32,
    /// Time the circuit stays open before a trial call
    pub recovery_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(30),
        }
    }
}

/// Lock-free circuit breaker reading time from a [`Clock`].
#[derive(Debug)]
pub struct CircuitBreaker {
    state: AtomicU8,
    consecutive_failures: AtomicU64,
    /// Last failure as nanoseconds after `epoch`
    last_failure_nanos: AtomicU64,
    config: CircuitBreakerConfig,
    clock: Arc<dyn Clock>,
    epoch: Instant,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig, clock: Arc<dyn Clock>) -> Self {
        let epoch = clock.now();
        Self {
            state: AtomicU8::new(CircuitState::Closed as u8),
            consecutive_failures: AtomicU64::new(0),
            last_failure_nanos: AtomicU64::new(0),
            config,
            clock,
            epoch,
        }
    }

    pub fn state(&self) -> CircuitState {
        CircuitState::from(self.state.load(Ordering::Acquire))
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Whether the guarded operation should run. `false` means fail open.
    pub fn allow_request(&self) -> bool {
        match self.state() {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => {
                let since_failure = self
                    .clock
                    .now()
                    .saturating_duration_since(self.last_failure());
                if since_failure < self.config.recovery_timeout {
                    return false;
                }
                // one thread flips Open -> HalfOpen, the others see HalfOpen
                self.state
                    .compare_exchange(
                        CircuitState::Open as u8,
                        CircuitState::HalfOpen as u8,
                        Ordering::AcqRel,
                        Ordering::Acquire,
                    )
                    .is_ok()
                    || self.state() == CircuitState::HalfOpen
            }
        }
    }

    pub fn record_success(&self) {
        match self.state() {
            CircuitState::HalfOpen => {
                self.consecutive_failures.store(0, Ordering::Release);
                self.state
                    .store(CircuitState::Closed as u8, Ordering::Release);
            }
            CircuitState::Closed => {
                self.consecutive_failures.store(0, Ordering::Release);
            }
            CircuitState::Open => {}
        }
    }

    pub fn record_failure(&self) {
        let failures = self.consecutive_failures.fetch_add(1, Ordering::AcqRel) + 1;
        let nanos = self
            .clock
            .now()
            .saturating_duration_since(self.epoch)
            .as_nanos()
            .try_into()
            .unwrap_or(u64::MAX);
        self.last_failure_nanos.store(nanos, Ordering::Release);

        match self.state() {
            CircuitState::HalfOpen => {
                self.state.store(CircuitState::Open as u8, Ordering::Release);
            }
            CircuitState::Closed if failures >= u64::from(self.config.failure_threshold) => {
                self.state.store(CircuitState::Open as u8, Ordering::Release);
            }
            _ => {}
        }
    }

    fn last_failure(&self) -> Instant {
        self.epoch + Duration::from_nanos(self.last_failure_nanos.load(Ordering::Acquire))
    }

    pub fn consecutive_failures(&self) -> u64 {
        self.consecutive_failures.load(Ordering::Acquire)
    }

    /// Force the circuit closed.
    pub fn reset(&self) {
        self.state
            .store(CircuitState::Closed as u8, Ordering::Release);
        self.consecutive_failures.store(0, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::mocks::MockClock;
    use std::thread;

    fn breaker(threshold: u32, recovery: Duration) -> (CircuitBreaker, MockClock) {
        let clock = MockClock::new(Instant::now());
        let breaker = CircuitBreaker::new(
            CircuitBreakerConfig {
                failure_threshold: threshold,
                recovery_timeout: recovery,
            },
            Arc::new(clock.clone()),
        );
        (breaker, clock)
    }

    #[test]
    fn test_initial_state() {
        let (cb, _) = breaker(5, Duration::from_secs(30));
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.consecutive_failures(), 0);
        assert!(cb.allow_request());
    }

    #[test]
    fn test_opens_at_threshold() {
        let (cb, _) = breaker(3, Duration::from_secs(1));
        cb.record_failure();
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Closed);
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(!cb.allow_request());
    }

    #[test]
    fn test_recovery_boundary() {
        let (cb, clock) = breaker(1, Duration::from_secs(30));
        cb.record_failure();

        clock.advance(Duration::from_secs(29));
        assert!(!cb.allow_request());
        assert_eq!(cb.state(), CircuitState::Open);

        clock.advance(Duration::from_secs(1));
        assert!(cb.allow_request());
        assert_eq!(cb.state(), CircuitState::HalfOpen);
    }

    #[test]
    fn test_half_open_outcomes() {
        let (cb, clock) = breaker(2, Duration::from_secs(5));
        cb.record_failure();
        cb.record_failure();
        clock.advance(Duration::from_secs(5));
        assert!(cb.allow_request());

        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);

        clock.advance(Duration::from_secs(5));
        assert!(cb.allow_request());
        cb.record_success();
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.consecutive_failures(), 0);
    }

    #[test]
    fn test_success_resets_count_and_reset_closes() {
        let (cb, _) = breaker(2, Duration::from_secs(10));
        cb.record_failure();
        cb.record_success();
        assert_eq!(cb.consecutive_failures(), 0);

        cb.record_failure();
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);
        cb.reset();
        assert_eq!(cb.state(), CircuitState::Closed);
        assert!(cb.allow_request());
    }

    #[test]
    fn test_concurrent_transition_to_half_open() {
        let (cb, clock) = breaker(1, Duration::from_secs(1));
        let cb = Arc::new(cb);
        cb.record_failure();
        clock.advance(Duration::from_secs(2));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cb = Arc::clone(&cb);
                thread::spawn(move || cb.allow_request())
            })
            .collect();
        for handle in handles {
            assert!(handle.join().unwrap());
        }
        assert_eq!(cb.state(), CircuitState::HalfOpen);
    }
}
