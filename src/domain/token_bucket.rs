//! Token bucket used to throttle clients.
//!
//! The bucket holds up to `capacity` tokens and refills continuously at
//! `capacity` tokens per second. A request that finds no token may reserve the
//! next one, driving the balance negative, as long as the wait for it stays
//! within the caller's limit.

use std::time::{Duration, Instant};

/// Result of asking a bucket for one token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reservation {
    /// A token was available
    Ready,
    /// A token was reserved; the caller must wait this long before using it
    Delayed(Duration),
    /// No token within the allowed wait; nothing was consumed
    Exceeded(Duration),
}

/// Greedy token bucket refilled once per second.
///
/// # Example
/// ```
/// use dos_guard::{Reservation, TokenBucket};
/// use std::time::{Duration, Instant};
///
/// let now = Instant::now();
/// let mut bucket = TokenBucket::new(2.0, now);
///
/// assert_eq!(bucket.try_reserve(now, Duration::ZERO), Reservation::Ready);
/// assert_eq!(bucket.try_reserve(now, Duration::ZERO), Reservation::Ready);
/// assert!(matches!(
///     bucket.try_reserve(now, Duration::from_secs(1)),
///     Reservation::Delayed(_)
/// ));
/// ```
#[derive(Debug, Clone)]
pub struct TokenBucket {
    capacity: f64,
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    /// Create a full bucket for a rate in requests per second.
    ///
    /// Fractional rates are rounded down, with a floor of one token per second.
    pub fn new(request_rate: f64, now: Instant) -> Self {
        let capacity = request_rate.floor().max(1.0);
        Self {
            capacity,
            tokens: capacity,
            last_refill: now,
        }
    }

    /// Tokens added per second, also the maximum burst.
    pub fn capacity(&self) -> u64 {
        self.capacity as u64
    }

    /// Current balance; negative while reservations are outstanding.
    pub fn available(&self) -> f64 {
        self.tokens
    }

    fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill);
        if elapsed.is_zero() {
            return;
        }
        self.tokens = (self.tokens + elapsed.as_secs_f64() * self.capacity).min(self.capacity);
        self.last_refill = now;
    }

    /// Try to take one token at `now`, reserving it if it arrives within `max_wait`.
    pub fn try_reserve(&mut self, now: Instant, max_wait: Duration) -> Reservation {
        self.refill(now);
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            return Reservation::Ready;
        }
        let wait = Duration::from_secs_f64((1.0 - self.tokens) / self.capacity);
        if wait <= max_wait {
            self.tokens -= 1.0;
            Reservation::Delayed(wait)
        } else {
            Reservation::Exceeded(wait)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capacity_floor() {
        let now = Instant::now();
        assert_eq!(TokenBucket::new(0.2, now).capacity(), 1);
        assert_eq!(TokenBucket::new(5.9, now).capacity(), 5);
    }

    #[test]
    fn test_burst_then_delay() {
        let now = Instant::now();
        let mut bucket = TokenBucket::new(5.0, now);
        for _ in 0..5 {
            assert_eq!(bucket.try_reserve(now, Duration::ZERO), Reservation::Ready);
        }
        assert_eq!(
            bucket.try_reserve(now, Duration::from_secs(1)),
            Reservation::Delayed(Duration::from_millis(200))
        );
        assert_eq!(
            bucket.try_reserve(now, Duration::from_secs(1)),
            Reservation::Delayed(Duration::from_millis(400))
        );
    }

    #[test]
    fn test_exceeded_consumes_nothing() {
        let now = Instant::now();
        let mut bucket = TokenBucket::new(1.0, now);
        assert_eq!(bucket.try_reserve(now, Duration::ZERO), Reservation::Ready);
        assert_eq!(
            bucket.try_reserve(now, Duration::from_millis(100)),
            Reservation::Exceeded(Duration::from_secs(1))
        );
        assert_eq!(bucket.available(), 0.0);
        let later = now + Duration::from_secs(1);
        assert_eq!(bucket.try_reserve(later, Duration::ZERO), Reservation::Ready);
    }

    #[test]
    fn test_refill_is_capped() {
        let now = Instant::now();
        let mut bucket = TokenBucket::new(3.0, now);
        for _ in 0..3 {
            bucket.try_reserve(now, Duration::ZERO);
        }
        bucket.refill(now + Duration::from_secs(60));
        assert_eq!(bucket.available(), 3.0);
    }

    #[test]
    fn test_sustained_rate_is_bounded() {
        // 10 req/s offered for 3 seconds against a 5 r/s bucket
        let start = Instant::now();
        let mut bucket = TokenBucket::new(5.0, start);
        let mut admitted_at = Vec::new();
        for i in 0..30u64 {
            let arrival = start + Duration::from_millis(100 * i);
            match bucket.try_reserve(arrival, Duration::from_secs(300)) {
                Reservation::Ready => admitted_at.push(arrival),
                Reservation::Delayed(wait) => admitted_at.push(arrival + wait),
                Reservation::Exceeded(_) => panic!("request rejected within the maximum wait"),
            }
        }
        assert_eq!(admitted_at.len(), 30);

        let delays: Vec<Duration> = admitted_at
            .iter()
            .enumerate()
            .map(|(i, at)| at.saturating_duration_since(start + Duration::from_millis(100 * i as u64)))
            .collect();
        assert!(delays.last().unwrap() > &delays[10]);

        let span = admitted_at
            .last()
            .unwrap()
            .saturating_duration_since(start)
            .as_secs_f64();
        // burst of 5, then 5 per second
        assert!((30.0 - 5.0) / span <= 5.0 + 1e-6);
    }
}
