//! Resolver double with a fixed host table.

use std::net::IpAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use std::collections::HashMap;

use crate::application::ports::AddressResolver;
use crate::domain::address::ResolvedAddress;

/// Resolves IP literals and the host names registered with [`MockResolver::map`].
///
/// Clones share the table and the lookup counter.
#[derive(Debug, Clone, Default)]
pub struct MockResolver {
    hosts: Arc<Mutex<HashMap<String, IpAddr>>>,
    lookups: Arc<AtomicU64>,
}

impl MockResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `host` resolve to `ip`.
    pub fn map(&self, host: impl Into<String>, ip: IpAddr) {
        self.hosts.lock().insert(host.into(), ip);
    }

    /// Number of `resolve` calls so far.
    pub fn lookups(&self) -> u64 {
        self.lookups.load(Ordering::Relaxed)
    }
}

impl AddressResolver for MockResolver {
    fn resolve(&self, address: &str) -> Option<ResolvedAddress> {
        self.lookups.fetch_add(1, Ordering::Relaxed);
        let address = address.trim();
        if let Ok(ip) = address.parse::<IpAddr>() {
            return Some(ResolvedAddress::from_ip(ip));
        }
        self.hosts
            .lock()
            .get(address)
            .map(|ip| ResolvedAddress::new(*ip, address))
    }
}
