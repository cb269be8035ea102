//! Blocking throttler for clients under a THROTTLE decision.
//!
//! Each throttled client gets a [`TokenBucket`]. A request that finds the
//! bucket empty reserves the next token and parks the calling thread until it
//! is due, unless the wait would exceed the configured maximum. Parked threads
//! are released early by [`Throttler::interrupt`].

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::application::ports::Clock;
use crate::domain::token_bucket::{Reservation, TokenBucket};
use crate::infrastructure::storage::ShardedStorage;

/// What happened to a throttled request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThrottleOutcome {
    /// A token was available
    Immediate,
    /// The request waited for its token
    Waited(Duration),
    /// The token was further away than the maximum wait; the request was not delayed
    Rejected(Duration),
    /// The wait was cut short by an interrupt
    Interrupted,
}

#[derive(Debug, Default)]
struct Interrupt {
    interrupted: Mutex<bool>,
    released: Condvar,
}

/// Per-client token buckets with bounded blocking waits.
#[derive(Debug)]
pub struct Throttler {
    buckets: ShardedStorage<String, TokenBucket>,
    clock: Arc<dyn Clock>,
    max_wait: Duration,
    interrupt: Interrupt,
}

impl Throttler {
    pub fn new(clock: Arc<dyn Clock>, max_wait: Duration) -> Self {
        Self {
            buckets: ShardedStorage::new(),
            clock,
            max_wait,
            interrupt: Interrupt::default(),
        }
    }

    /// Take a token for `client`, blocking until it is available.
    ///
    /// The bucket is created on first use with `request_rate` tokens per second.
    pub fn acquire(&self, client: &str, request_rate: f64) -> ThrottleOutcome {
        let now = self.clock.now();
        let max_wait = self.max_wait;
        let reservation = self.buckets.with_entry_mut(
            client.to_string(),
            || TokenBucket::new(request_rate, now),
            |bucket| bucket.try_reserve(now, max_wait),
        );
        match reservation {
            Reservation::Ready => ThrottleOutcome::Immediate,
            Reservation::Exceeded(wait) => ThrottleOutcome::Rejected(wait),
            Reservation::Delayed(wait) => {
                if self.park(wait) {
                    ThrottleOutcome::Waited(wait)
                } else {
                    ThrottleOutcome::Interrupted
                }
            }
        }
    }

    /// Park for `wait`; `false` when interrupted first.
    fn park(&self, wait: Duration) -> bool {
        let deadline = Instant::now() + wait;
        let mut interrupted = self.interrupt.interrupted.lock();
        while !*interrupted {
            if self
                .interrupt
                .released
                .wait_until(&mut interrupted, deadline)
                .timed_out()
            {
                return !*interrupted;
            }
        }
        false
    }

    /// Release every parked thread; later waits return immediately as interrupted.
    pub fn interrupt(&self) {
        *self.interrupt.interrupted.lock() = true;
        self.interrupt.released.notify_all();
    }

    /// Allow parking again after an [`interrupt`](Self::interrupt).
    pub fn resume(&self) {
        *self.interrupt.interrupted.lock() = false;
    }

    pub fn is_interrupted(&self) -> bool {
        *self.interrupt.interrupted.lock()
    }

    /// Forget the bucket of a client.
    pub fn remove(&self, client: &str) {
        self.buckets.remove(client);
    }

    /// Number of clients with a bucket.
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}
