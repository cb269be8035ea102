//! Recording persistence gateway.

use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::application::ports::{AuditEvent, Persistence, PersistenceError, StatsDelta};
use crate::domain::address::GeoLocation;
use crate::domain::rule::Rule;

#[derive(Debug, Default)]
struct LoadGate {
    held: bool,
    waiting: usize,
}

/// Persistence double that records every call.
///
/// Each operation can be made to fail, and rule loading can be held open to
/// observe concurrent reloads.
#[derive(Debug, Default)]
pub struct MockPersistence {
    rules: Mutex<Vec<Rule>>,
    saved: Mutex<Vec<Rule>>,
    stats: Mutex<Vec<(String, StatsDelta)>>,
    audits: Mutex<Vec<AuditEvent>>,
    geo: Mutex<Option<GeoLocation>>,
    loads: AtomicU64,
    fail_loads: AtomicBool,
    fail_stats: AtomicBool,
    fail_audits: AtomicBool,
    fail_geo: AtomicBool,
    fail_saves: AtomicBool,
    gate: Mutex<LoadGate>,
    gate_changed: Condvar,
}

fn injected(operation: &'static str) -> PersistenceError {
    PersistenceError::Rejected {
        operation,
        message: "injected failure".to_string(),
    }
}

impl MockPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rules returned by `load_rules`.
    pub fn set_rules(&self, rules: Vec<Rule>) {
        *self.rules.lock() = rules;
    }

    /// Location returned by `resolve_geo` for every address.
    pub fn set_geo(&self, location: Option<GeoLocation>) {
        *self.geo.lock() = location;
    }

    pub fn fail_loads(&self, fail: bool) {
        self.fail_loads.store(fail, Ordering::Release);
    }

    pub fn fail_stats(&self, fail: bool) {
        self.fail_stats.store(fail, Ordering::Release);
    }

    pub fn fail_audits(&self, fail: bool) {
        self.fail_audits.store(fail, Ordering::Release);
    }

    pub fn fail_geo(&self, fail: bool) {
        self.fail_geo.store(fail, Ordering::Release);
    }

    pub fn fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::Release);
    }

    /// Number of `load_rules` calls.
    pub fn loads(&self) -> u64 {
        self.loads.load(Ordering::Acquire)
    }

    pub fn audits(&self) -> Vec<AuditEvent> {
        self.audits.lock().clone()
    }

    /// Persisted deltas as `(rule id, delta)`.
    pub fn stats(&self) -> Vec<(String, StatsDelta)> {
        self.stats.lock().clone()
    }

    pub fn saved_rules(&self) -> Vec<Rule> {
        self.saved.lock().clone()
    }

    /// Make `load_rules` block until [`MockPersistence::release_loads`].
    pub fn hold_loads(&self) {
        self.gate.lock().held = true;
    }

    pub fn release_loads(&self) {
        self.gate.lock().held = false;
        self.gate_changed.notify_all();
    }

    /// Wait until a `load_rules` call is blocked on the gate.
    pub fn wait_for_held_load(&self, timeout: Duration) -> bool {
        let mut gate = self.gate.lock();
        if gate.waiting > 0 {
            return true;
        }
        let result = self
            .gate_changed
            .wait_while_for(&mut gate, |gate| gate.waiting == 0, timeout);
        !result.timed_out() || gate.waiting > 0
    }
}

impl Persistence for MockPersistence {
    fn load_rules(&self) -> Result<Vec<Rule>, PersistenceError> {
        self.loads.fetch_add(1, Ordering::AcqRel);
        {
            let mut gate = self.gate.lock();
            if gate.held {
                gate.waiting += 1;
                self.gate_changed.notify_all();
                self.gate_changed.wait_while(&mut gate, |gate| gate.held);
                gate.waiting -= 1;
            }
        }
        if self.fail_loads.load(Ordering::Acquire) {
            return Err(PersistenceError::Unavailable("injected failure".to_string()));
        }
        Ok(self.rules.lock().clone())
    }

    fn persist_stats_delta(&self, rule: &Rule, delta: &StatsDelta) -> Result<(), PersistenceError> {
        if self.fail_stats.load(Ordering::Acquire) {
            return Err(injected("persist_stats_delta"));
        }
        self.stats
            .lock()
            .push((rule.id().to_string(), delta.clone()));
        Ok(())
    }

    fn audit_violation(&self, event: &AuditEvent) -> Result<(), PersistenceError> {
        if self.fail_audits.load(Ordering::Acquire) {
            return Err(injected("audit_violation"));
        }
        self.audits.lock().push(event.clone());
        Ok(())
    }

    fn resolve_geo(&self, _ip: IpAddr) -> Result<Option<GeoLocation>, PersistenceError> {
        if self.fail_geo.load(Ordering::Acquire) {
            return Err(injected("resolve_geo"));
        }
        Ok(self.geo.lock().clone())
    }

    fn save_rule(&self, rule: &Rule) -> Result<(), PersistenceError> {
        if self.fail_saves.load(Ordering::Acquire) {
            return Err(injected("save_rule"));
        }
        self.saved.lock().push(rule.clone());
        Ok(())
    }
}
