//! The DoS registry.
//!
//! [`DosRegistry`] owns every in-memory map of the engine: rules, per-client
//! counters, cached decisions and throttling buckets. Request threads call
//! [`DosRegistry::validate`] before handling a request and
//! [`DosRegistry::register`] once its outcome is known; maintenance tasks call
//! the persistence and cleanup operations on their own schedule.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use parking_lot::Mutex;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, error, info, warn};

use crate::application::action_cache::ActionEntry;
use crate::application::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
use crate::application::metrics::Metrics;
use crate::application::ports::{AddressResolver, AuditEvent, Clock, Persistence, StatsDelta};
use crate::application::throttle::{ThrottleOutcome, Throttler};
use crate::application::violation::{threshold_violation, Thresholds};
use crate::domain::address::ResolvedAddress;
use crate::domain::counts::{AddressCounts, CountsSnapshot, RequestCounts};
use crate::domain::request::Request;
use crate::domain::rule::{applies, Action, Reason, Rule, RuleType};
use crate::infrastructure::storage::ShardedStorage;

/// Target of the observability issues raised for restricted or new clients.
pub const ISSUE_TARGET: &str = "dos_guard::issue";

/// Runtime settings of the registry.
#[derive(Debug, Clone, PartialEq)]
pub struct RegistrySettings {
    /// When off, `validate` allows everything; tracking continues
    pub enabled: bool,
    /// Whether loopback clients can cross thresholds
    pub track_localhost: bool,
    /// Longest a throttled request may be held
    pub maximum_throttling_duration: Duration,
    /// Minimum time between two rule reloads through `check_reload`
    pub reload_interval: Duration,
    /// Counters idle for longer than this are dropped
    pub inactivity_interval: Duration,
    /// Audit records queued between two `flush_audits` calls
    pub audit_queue_capacity: usize,
    pub thresholds: Thresholds,
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            enabled: true,
            track_localhost: false,
            maximum_throttling_duration: Duration::from_secs(5 * 60),
            reload_interval: Duration::from_secs(15 * 60),
            inactivity_interval: Duration::from_secs(7 * 24 * 60 * 60),
            audit_queue_capacity: 10_000,
            thresholds: Thresholds::default(),
        }
    }
}

/// Admission control registry.
#[derive(Debug)]
pub struct DosRegistry {
    settings: RegistrySettings,
    clock: Arc<dyn Clock>,
    resolver: Arc<dyn AddressResolver>,
    persistence: Arc<dyn Persistence>,

    rules_by_id: ShardedStorage<String, Arc<Rule>>,
    /// IP rules keyed by IP and by host name
    rules_by_address: ShardedStorage<String, Arc<Rule>>,
    cidr_rules: ShardedStorage<String, Arc<Rule>>,
    counts: ShardedStorage<String, Arc<AddressCounts>>,
    persisted_counts: ShardedStorage<String, CountsSnapshot>,
    actions: ShardedStorage<String, Arc<ActionEntry>>,
    /// CIDR decisions cached per client IP
    cidr_actions: ShardedStorage<String, Arc<ActionEntry>>,
    throttler: Throttler,

    audits: mpsc::Sender<AuditEvent>,
    pending_audits: Mutex<mpsc::Receiver<AuditEvent>>,

    rules_loading: AtomicBool,
    epoch: Instant,
    last_reload_nanos: AtomicU64,

    metrics: Metrics,
    circuit_breaker: Arc<CircuitBreaker>,
}

struct LoadingGuard<'a>(&'a AtomicBool);

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl DosRegistry {
    /// Create a registry. Most callers go through [`DosRegistry::builder`].
    pub fn new(
        settings: RegistrySettings,
        clock: Arc<dyn Clock>,
        resolver: Arc<dyn AddressResolver>,
        persistence: Arc<dyn Persistence>,
        circuit_breaker: CircuitBreakerConfig,
    ) -> Self {
        let (audits, pending_audits) = mpsc::channel(settings.audit_queue_capacity.max(1));
        let epoch = clock.now();
        Self {
            throttler: Throttler::new(Arc::clone(&clock), settings.maximum_throttling_duration),
            circuit_breaker: Arc::new(CircuitBreaker::new(circuit_breaker, Arc::clone(&clock))),
            settings,
            clock,
            resolver,
            persistence,
            rules_by_id: ShardedStorage::new(),
            rules_by_address: ShardedStorage::new(),
            cidr_rules: ShardedStorage::new(),
            counts: ShardedStorage::new(),
            persisted_counts: ShardedStorage::new(),
            actions: ShardedStorage::new(),
            cidr_actions: ShardedStorage::new(),
            audits,
            pending_audits: Mutex::new(pending_audits),
            rules_loading: AtomicBool::new(false),
            epoch,
            last_reload_nanos: AtomicU64::new(0),
            metrics: Metrics::new(),
        }
    }

    pub fn settings(&self) -> &RegistrySettings {
        &self.settings
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    pub fn circuit_breaker(&self) -> &Arc<CircuitBreaker> {
        &self.circuit_breaker
    }

    /// Record a completed request and update the client's decision.
    ///
    /// Unknown clients get an AUTO rule. When the request pushes the client
    /// over the threshold for its outcome, the client is banned for the
    /// threshold's blocking period and, for DENY, exactly one audit record is
    /// queued per ban.
    pub fn register(&self, request: &Request) {
        self.guarded((), || self.register_request(request));
    }

    /// Decide whether a request may be processed.
    ///
    /// Returns ALLOW, DENY or THROTTLE. A THROTTLE answer means the calling
    /// thread was already held back by the client's token bucket and the
    /// request may proceed. Never fails: internal errors fail open, while an
    /// unresolvable client is denied.
    pub fn validate(&self, request: &Request) -> Action {
        match self.guarded(None, || Some(self.validate_request(request))) {
            Some(action) => action,
            None => {
                self.metrics.record_decision(Action::Allow);
                Action::Allow
            }
        }
    }

    fn guarded<R>(&self, fallback: R, operation: impl FnOnce() -> R) -> R {
        if !self.circuit_breaker.allow_request() {
            return fallback;
        }
        match panic::catch_unwind(AssertUnwindSafe(operation)) {
            Ok(result) => {
                self.circuit_breaker.record_success();
                result
            }
            Err(_) => {
                self.circuit_breaker.record_failure();
                error!("Admission control failed, allowing request");
                fallback
            }
        }
    }

    fn register_request(&self, request: &Request) {
        let Some(address) = self.resolve(request.address()) else {
            return;
        };
        let now = self.clock.now();
        self.metrics
            .record_request(address.hostname(), request.scheme(), request.outcome());
        self.discover(&address, request, now);

        let ip = address.id();
        let Some(rule) = self.rules_by_address.get(&ip) else {
            return;
        };
        let counts = self.counts_for(&address, now);
        let counter = counts.increment(request.outcome(), now);
        let violation = threshold_violation(
            &self.settings.thresholds,
            request.outcome(),
            &counts,
            self.settings.track_localhost,
        );

        let action = match rule.action() {
            Action::Auto => Action::Deny,
            configured => configured,
        };
        if !(applies(action) && rule.is_active()) {
            return;
        }

        let entry = self.actions.get_or_insert_with(ip, || {
            Arc::new(ActionEntry::new(Arc::clone(&rule), rule.action(), now))
        });
        if violation.crossed && entry.try_cross() {
            let message = format!(
                "Client '{}' crossed threshold '{}' for outcome '{}', statistics 'count {}, throughput {:.2} r/s'",
                address,
                violation.threshold,
                request.outcome(),
                counter.count(),
                counter.throughput()
            );
            info!(
                client = %address,
                outcome = %request.outcome(),
                reason = %violation.reason,
                action = %action,
                "{}",
                message
            );
            self.metrics.record_crossed();
            entry.ban(action, violation.reason, &violation.threshold, now);
            if action == Action::Deny && self.settings.enabled {
                self.enqueue_audit(AuditEvent {
                    rule: entry.rule().clone(),
                    reason: violation.reason,
                    description: message,
                    uri: request.uri().to_string(),
                    timestamp: SystemTime::now(),
                });
                self.metrics.record_alert();
            }
        } else if entry.is_expired(now) {
            self.unban(&address, &entry, now);
        }
    }

    fn validate_request(&self, request: &Request) -> Action {
        if !self.settings.enabled {
            self.metrics.record_decision(Action::Allow);
            return Action::Allow;
        }
        let Some(address) = self.resolve(request.address()) else {
            return self.finish(request, None, Action::Deny);
        };
        let now = self.clock.now();
        let Some(entry) = self.decision(&address, now) else {
            return self.finish(request, Some(&address), Action::Allow);
        };

        if entry.action() != Action::Allow && entry.is_expired(now) {
            self.unban(&address, &entry, now);
        }
        if !entry.rule().is_active() {
            return self.finish(request, Some(&address), Action::Allow);
        }
        let action = match entry.action() {
            Action::Auto => Action::Allow,
            Action::Throttle => {
                self.throttle(&entry, &address);
                Action::Throttle
            }
            other => other,
        };
        self.finish(request, Some(&address), action)
    }

    /// The cached decision governing a client: its own entry when that pins
    /// an action, otherwise the best CIDR match, otherwise its AUTO entry.
    fn decision(&self, address: &ResolvedAddress, now: Instant) -> Option<Arc<ActionEntry>> {
        let ip_entry = self.actions.get(&address.id());
        let ip_overrides = ip_entry
            .as_ref()
            .is_some_and(|entry| entry.rule().is_active() && entry.action() != Action::Auto);
        if ip_overrides {
            ip_entry
        } else {
            self.cidr_action(address, now).or(ip_entry)
        }
    }

    fn finish(
        &self,
        request: &Request,
        address: Option<&ResolvedAddress>,
        action: Action,
    ) -> Action {
        self.metrics.record_decision(action);
        let client = address
            .map(ResolvedAddress::to_description)
            .unwrap_or_else(|| request.address().to_string());
        match action {
            Action::Deny => warn!(
                target: ISSUE_TARGET,
                severity = "critical",
                client = %client,
                uri = request.uri(),
                "Request denied"
            ),
            Action::Throttle => info!(
                target: ISSUE_TARGET,
                severity = "notice",
                client = %client,
                uri = request.uri(),
                "Request throttled"
            ),
            _ => {}
        }
        action
    }

    fn throttle(&self, entry: &ActionEntry, address: &ResolvedAddress) {
        let rate = entry.rule().request_rate().unwrap_or(1.0);
        match self.throttler.acquire(&address.id(), rate) {
            ThrottleOutcome::Immediate => {}
            ThrottleOutcome::Waited(wait) => {
                self.metrics.record_throttle_wait();
                debug!(client = %address, wait = ?wait, "Request throttled");
            }
            ThrottleOutcome::Rejected(wait) => {
                self.metrics.record_throttle_rejection();
                debug!(
                    client = %address,
                    wait = ?wait,
                    maximum = ?self.settings.maximum_throttling_duration,
                    "Throttling wait exceeds the maximum, request not delayed"
                );
            }
            ThrottleOutcome::Interrupted => {
                self.metrics.record_throttle_interruption();
                warn!(client = %address, "Throttling interrupted, request proceeds");
            }
        }
    }

    fn resolve(&self, raw: &str) -> Option<ResolvedAddress> {
        let raw = raw.trim();
        let resolved = if raw.is_empty() {
            None
        } else {
            self.resolver.resolve(raw)
        };
        if resolved.is_none() {
            self.metrics.record_resolve_failure();
            debug!(client = raw, "Client address cannot be resolved");
        }
        resolved
    }

    fn discover(&self, address: &ResolvedAddress, request: &Request, now: Instant) {
        let ip = address.id();
        if self.rules_by_address.contains_key(&ip) {
            return;
        }
        let mut builder = Rule::builder(ip.clone(), RuleType::Ip)
            .name(address.hostname())
            .description(address.to_description())
            .action(Action::Auto);
        if address.hostname() != ip {
            builder = builder.host_name(address.hostname());
        }
        let rule = match builder.build() {
            Ok(rule) => Arc::new(rule),
            Err(error) => {
                warn!(client = %address, %error, "Cannot create rule for new client");
                return;
            }
        };
        if !self
            .rules_by_address
            .insert_if_absent(ip.clone(), Arc::clone(&rule))
        {
            return;
        }
        self.index_rule(&rule, now, false);
        self.metrics.record_discovered();
        debug!(client = %address, rule = rule.id(), "Discovered new client");
        self.enqueue_audit(AuditEvent {
            rule: (*rule).clone(),
            reason: Reason::Discovery,
            description: address.to_description(),
            uri: request.uri().to_string(),
            timestamp: SystemTime::now(),
        });
    }

    fn counts_for(&self, address: &ResolvedAddress, now: Instant) -> Arc<AddressCounts> {
        let id = address.id();
        if let Some(counts) = self.counts.get(&id) {
            return counts;
        }
        let mut created = false;
        let counts = self.counts.get_or_insert_with(id, || {
            created = true;
            Arc::new(AddressCounts::new(address.clone(), now))
        });
        if created && !address.is_local_network() {
            info!(
                target: ISSUE_TARGET,
                severity = "notice",
                client = %address,
                "New client"
            );
        }
        counts
    }

    fn cidr_action(&self, address: &ResolvedAddress, now: Instant) -> Option<Arc<ActionEntry>> {
        let ip = address.id();
        if let Some(entry) = self.cidr_actions.get(&ip) {
            if !entry.is_expired(now) {
                return Some(entry);
            }
            self.cidr_actions
                .remove_if(&ip, |current| Arc::ptr_eq(current, &entry));
        }
        let rule = self.find_cidr_rule(address.ip())?;
        let entry = Arc::new(ActionEntry::new(Arc::clone(&rule), rule.action(), now));
        self.cidr_actions.insert(ip, Arc::clone(&entry));
        Some(entry)
    }

    /// Most specific active CIDR rule containing `ip`; ties go to the lowest id.
    pub fn find_cidr_rule(&self, ip: std::net::IpAddr) -> Option<Arc<Rule>> {
        self.cidr_rules
            .values()
            .into_iter()
            .filter(|rule| rule.is_active() && rule.matches(ip))
            .max_by(|a, b| {
                a.prefix_len()
                    .cmp(&b.prefix_len())
                    .then_with(|| b.id().cmp(a.id()))
            })
    }

    fn unban(&self, address: &ResolvedAddress, entry: &ActionEntry, now: Instant) {
        let was_banned = entry.is_crossed();
        let Some(restored) = entry.revert_if_expired(now) else {
            return;
        };
        if was_banned {
            self.metrics.record_ban_expired();
            info!(
                client = %address,
                action = %restored,
                "Client ban expired, reverting to rule action"
            );
        } else {
            debug!(client = %address, action = %restored, "Cached decision renewed");
        }
    }

    fn enqueue_audit(&self, event: AuditEvent) {
        match self.audits.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                self.metrics.record_audit_dropped();
                warn!(
                    target: ISSUE_TARGET,
                    severity = "warning",
                    client = %event.rule.address(),
                    reason = %event.reason,
                    capacity = self.settings.audit_queue_capacity,
                    "Audit queue full, record dropped"
                );
            }
            Err(TrySendError::Closed(_)) => {
                self.metrics.record_audit_dropped();
                warn!("Audit queue closed, record dropped");
            }
        }
    }

    /// Add the rule to the indexes. With `replace` the client's cached
    /// decision is rebuilt from the rule; otherwise it is kept when the rule
    /// is unchanged.
    fn index_rule(&self, rule: &Arc<Rule>, now: Instant, replace: bool) {
        self.rules_by_id
            .insert(rule.id().to_string(), Arc::clone(rule));
        match rule.rule_type() {
            RuleType::Ip => {
                let ip = rule.address().to_string();
                self.rules_by_address.insert(ip.clone(), Arc::clone(rule));
                if let Some(host) = rule.host_name().filter(|host| *host != ip) {
                    self.rules_by_address
                        .insert(host.to_string(), Arc::clone(rule));
                }
                let keep = !replace
                    && self
                        .actions
                        .get(&ip)
                        .is_some_and(|entry| entry.rule() == rule.as_ref());
                if !keep {
                    self.actions.insert(
                        ip,
                        Arc::new(ActionEntry::new(Arc::clone(rule), rule.action(), now)),
                    );
                }
            }
            RuleType::Cidr => {
                self.cidr_rules
                    .insert(rule.id().to_string(), Arc::clone(rule));
            }
        }
    }

    fn normalize(&self, rule: Rule) -> Option<Arc<Rule>> {
        if !rule.needs_resolution() {
            return Some(Arc::new(rule));
        }
        match self.resolver.resolve(rule.address()) {
            Some(address) => Some(Arc::new(rule.with_resolved_address(address.ip()))),
            None => {
                warn!(
                    rule = rule.id(),
                    address = rule.address(),
                    "Cannot resolve rule host name, rule skipped"
                );
                None
            }
        }
    }

    /// Register a rule, replacing the cached decision of its client, and save
    /// it through the persistence gateway.
    ///
    /// Returns the registered rule, or `None` when its host name cannot be
    /// resolved.
    pub fn add_rule(&self, rule: Rule) -> Option<Arc<Rule>> {
        let rule = self.normalize(rule)?;
        let now = self.clock.now();
        self.index_rule(&rule, now, true);
        match rule.rule_type() {
            RuleType::Ip => self.throttler.remove(rule.address()),
            RuleType::Cidr => self.cidr_actions.clear(),
        }
        info!(rule = %rule, "Rule registered");
        if let Err(error) = self.persistence.save_rule(&rule) {
            self.metrics.record_persistence_failure();
            warn!(rule = rule.id(), %error, "Failed to save rule");
        }
        Some(rule)
    }

    /// Rule applying to an IP or host name: the client's own rule, else the
    /// most specific CIDR rule containing it. `None` when the address cannot
    /// be resolved.
    pub fn find_rule(&self, address: &str) -> Option<Arc<Rule>> {
        let address = self.resolver.resolve(address.trim())?;
        self.rules_by_address
            .get(&address.id())
            .or_else(|| self.find_cidr_rule(address.ip()))
    }

    /// Cached decision of a client's own rule, without CIDR matching.
    pub fn action_entry(&self, address: &str) -> Option<Arc<ActionEntry>> {
        let address = self.resolver.resolve(address.trim())?;
        self.actions.get(&address.id())
    }

    /// Action currently taken against an IP or host name.
    ///
    /// DENY when the address cannot be resolved, ALLOW when no decision is
    /// cached or the cached one has expired. Nothing is reverted here; that
    /// happens on the next `register` or `validate`.
    pub fn action(&self, address: &str) -> Action {
        let Some(address) = self.resolver.resolve(address.trim()) else {
            return Action::Deny;
        };
        let now = self.clock.now();
        match self.decision(&address, now) {
            Some(entry) if entry.rule().is_active() && !entry.is_expired(now) => entry.action(),
            _ => Action::Allow,
        }
    }

    /// All registered rules.
    pub fn rules(&self) -> Vec<Arc<Rule>> {
        self.rules_by_id.values()
    }

    /// Reporting view of every tracked client.
    pub fn request_counts(&self) -> Vec<RequestCounts> {
        self.counts
            .values()
            .into_iter()
            .map(|counts| counts.view())
            .collect()
    }

    /// Counters of one client.
    pub fn counts(&self, ip: &str) -> Option<Arc<AddressCounts>> {
        self.counts.get(ip)
    }

    /// Reload every rule from the persistence gateway.
    ///
    /// Only one reload runs at a time; a call made while another is in
    /// flight returns `false` without doing anything. CIDR decisions are
    /// dropped, and a client's cached decision is rebuilt when its rule
    /// changed.
    pub fn reload(&self) -> bool {
        if self
            .rules_loading
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Rule reload already in progress");
            return false;
        }
        let _guard = LoadingGuard(&self.rules_loading);

        match self.persistence.load_rules() {
            Ok(rules) => {
                let now = self.clock.now();
                self.cidr_actions.clear();
                let total = rules.len();
                let registered = rules
                    .into_iter()
                    .filter_map(|rule| self.normalize(rule))
                    .inspect(|rule| self.index_rule(rule, now, false))
                    .count();
                info!(rules = registered, skipped = total - registered, "Rules reloaded");
            }
            Err(error) => {
                self.metrics.record_persistence_failure();
                warn!(%error, "Failed to load rules");
            }
        }
        self.last_reload_nanos.store(
            self.clock
                .now()
                .saturating_duration_since(self.epoch)
                .as_nanos()
                .try_into()
                .unwrap_or(u64::MAX),
            Ordering::Release,
        );
        true
    }

    /// Reload if the reload interval elapsed since the last reload.
    pub fn check_reload(&self) -> bool {
        let last = self.epoch + Duration::from_nanos(self.last_reload_nanos.load(Ordering::Acquire));
        if self.clock.now().saturating_duration_since(last) < self.settings.reload_interval {
            return false;
        }
        self.reload()
    }

    /// Hand every client's new counts since the previous run to the
    /// persistence gateway. Returns the number of clients persisted.
    ///
    /// A failure for one client is logged and does not stop the others; its
    /// delta is retried on the next run.
    pub fn persist_stats(&self) -> usize {
        let mut persisted = 0;
        for counts in self.counts.values() {
            let address = counts.address();
            let id = address.id();
            let current = counts.snapshot();
            let previous = self.persisted_counts.get(&id).unwrap_or_default();
            let delta = current.delta_since(&previous);
            if delta.is_empty() {
                continue;
            }
            let Some(rule) = self.rules_by_address.get(&id) else {
                continue;
            };
            let geo = match self.persistence.resolve_geo(address.ip()) {
                Ok(geo) => geo,
                Err(error) => {
                    debug!(client = %address, %error, "Geo lookup failed");
                    None
                }
            };
            let delta = StatsDelta {
                address: address.clone(),
                counts: delta,
                geo,
            };
            match self.persistence.persist_stats_delta(&rule, &delta) {
                Ok(()) => {
                    self.persisted_counts.insert(id, current);
                    persisted += 1;
                }
                Err(error) => {
                    self.metrics.record_persistence_failure();
                    error!(
                        client = %address,
                        rule = rule.id(),
                        %error,
                        "Failed to persist statistics"
                    );
                }
            }
        }
        persisted
    }

    /// Deliver queued audit records. Returns how many were stored.
    ///
    /// The maintenance scheduler calls this on every stats tick. Hosts that
    /// run without it must call it themselves: records beyond
    /// `audit_queue_capacity` are dropped and counted in
    /// [`MetricsSnapshot::audits_dropped`](crate::MetricsSnapshot::audits_dropped).
    pub fn flush_audits(&self) -> usize {
        let mut pending = self.pending_audits.lock();
        let mut delivered = 0;
        while let Ok(event) = pending.try_recv() {
            match self.persistence.audit_violation(&event) {
                Ok(()) => delivered += 1,
                Err(error) => {
                    self.metrics.record_persistence_failure();
                    error!(
                        rule = event.rule.id(),
                        reason = %event.reason,
                        %error,
                        "Failed to store audit record"
                    );
                }
            }
        }
        delivered
    }

    /// Drop counters of clients idle longer than the inactivity interval,
    /// expired CIDR decisions and stale resolver entries.
    ///
    /// Returns the number of clients removed.
    pub fn cleanup_inactive(&self) -> usize {
        let now = self.clock.now();
        let inactivity = self.settings.inactivity_interval;
        let mut removed = Vec::new();
        let mut hosts = Vec::new();
        self.counts.retain(|id, counts| {
            let active = now.saturating_duration_since(counts.updated()) <= inactivity;
            if !active {
                removed.push(id.clone());
                hosts.push(counts.address().hostname().to_string());
            }
            active
        });
        for id in &removed {
            self.persisted_counts.remove(id);
            self.throttler.remove(id);
        }
        for host in &hosts {
            self.metrics.forget_host(host);
        }
        self.cidr_actions.retain(|_, entry| !entry.is_expired(now));
        self.resolver.purge();
        if !removed.is_empty() {
            info!(count = removed.len(), clients = ?removed, "Removed inactive clients");
        }
        removed.len()
    }

    /// Release threads blocked in throttling; they proceed unthrottled.
    pub fn shutdown(&self) {
        self.throttler.interrupt();
        info!("Admission control shut down");
    }
}
