//! Address resolver adapters.

use std::net::{IpAddr, SocketAddr, ToSocketAddrs};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::application::ports::{AddressResolver, Clock};
use crate::domain::address::ResolvedAddress;
use crate::infrastructure::storage::ShardedStorage;

/// How long [`CachedResolver`] keeps an answer.
pub const DEFAULT_RESOLVER_TTL: Duration = Duration::from_secs(15 * 60);

/// Resolves IP literals directly and host names through the OS resolver.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemResolver;

impl SystemResolver {
    pub fn new() -> Self {
        Self
    }
}

fn literal(address: &str) -> Option<IpAddr> {
    address
        .parse::<IpAddr>()
        .ok()
        .or_else(|| address.parse::<SocketAddr>().ok().map(|socket| socket.ip()))
}

impl AddressResolver for SystemResolver {
    fn resolve(&self, address: &str) -> Option<ResolvedAddress> {
        let address = address.trim();
        if address.is_empty() {
            return None;
        }
        if let Some(ip) = literal(address) {
            return Some(ResolvedAddress::from_ip(ip));
        }
        match (address, 0).to_socket_addrs() {
            Ok(mut addrs) => addrs
                .next()
                .map(|socket| ResolvedAddress::new(socket.ip(), address)),
            Err(error) => {
                debug!(client = address, %error, "Host name lookup failed");
                None
            }
        }
    }
}

#[derive(Debug, Clone)]
struct CachedAnswer {
    address: Option<ResolvedAddress>,
    expires: Instant,
}

/// Memoizes another resolver, including failed lookups.
#[derive(Debug)]
pub struct CachedResolver {
    inner: Arc<dyn AddressResolver>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    cache: ShardedStorage<String, CachedAnswer>,
}

impl CachedResolver {
    pub fn new(inner: Arc<dyn AddressResolver>, clock: Arc<dyn Clock>) -> Self {
        Self::with_ttl(inner, clock, DEFAULT_RESOLVER_TTL)
    }

    pub fn with_ttl(inner: Arc<dyn AddressResolver>, clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        Self {
            inner,
            clock,
            ttl,
            cache: ShardedStorage::new(),
        }
    }

    /// Number of cached answers, expired ones included until the next purge.
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}

impl AddressResolver for CachedResolver {
    fn resolve(&self, address: &str) -> Option<ResolvedAddress> {
        let key = address.trim();
        let now = self.clock.now();
        if let Some(answer) = self.cache.get(key) {
            if now < answer.expires {
                return answer.address;
            }
        }
        let resolved = self.inner.resolve(key);
        self.cache.insert(
            key.to_string(),
            CachedAnswer {
                address: resolved.clone(),
                expires: now + self.ttl,
            },
        );
        resolved
    }

    fn purge(&self) {
        let now = self.clock.now();
        self.cache.retain(|_, answer| now < answer.expires);
        self.inner.purge();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::mocks::{MockClock, MockResolver};

    #[test]
    fn test_system_resolver_literals() {
        let resolver = SystemResolver::new();
        let v4 = resolver.resolve(" 192.0.2.7 ").unwrap();
        assert_eq!(v4.id(), "192.0.2.7");
        assert_eq!(v4.hostname(), "192.0.2.7");

        let v6 = resolver.resolve("[2001:db8::1]:8443").unwrap();
        assert_eq!(v6.id(), "2001:db8::1");

        assert!(resolver.resolve("").is_none());
    }

    #[test]
    fn test_system_resolver_localhost() {
        let resolved = SystemResolver::new().resolve("localhost").unwrap();
        assert!(resolved.ip().is_loopback());
        assert_eq!(resolved.hostname(), "localhost");
    }

    #[test]
    fn test_cached_resolver_memoizes_negative_answers() {
        let clock = MockClock::new(Instant::now());
        let inner = Arc::new(MockResolver::new());
        let resolver = CachedResolver::with_ttl(
            inner.clone(),
            Arc::new(clock.clone()),
            Duration::from_secs(60),
        );

        assert!(resolver.resolve("gateway.internal").is_none());
        inner.map("gateway.internal", "10.1.2.3".parse().unwrap());
        assert!(resolver.resolve("gateway.internal").is_none());
        assert_eq!(inner.lookups(), 1);

        clock.advance(Duration::from_secs(60));
        let resolved = resolver.resolve("gateway.internal").unwrap();
        assert_eq!(resolved.id(), "10.1.2.3");
        assert_eq!(inner.lookups(), 2);
    }

    #[test]
    fn test_purge_drops_expired_answers() {
        let clock = MockClock::new(Instant::now());
        let resolver = CachedResolver::with_ttl(
            Arc::new(MockResolver::new()),
            Arc::new(clock.clone()),
            Duration::from_secs(10),
        );
        resolver.resolve("192.0.2.1");
        clock.advance(Duration::from_secs(5));
        resolver.resolve("192.0.2.2");
        assert_eq!(resolver.len(), 2);

        clock.advance(Duration::from_secs(6));
        resolver.purge();
        assert_eq!(resolver.len(), 1);
        assert!(resolver.resolve("192.0.2.2").is_some());
    }
}
