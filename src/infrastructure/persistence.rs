//! In-memory persistence gateway.
//!
//! Default gateway when no durable store is wired in. Rules saved through it
//! are returned by the next reload, statistics accumulate per rule id, and
//! audit records are kept in arrival order.

use std::collections::HashMap;
use std::net::IpAddr;

use parking_lot::Mutex;

use crate::application::ports::{AuditEvent, Persistence, PersistenceError, StatsDelta};
use crate::domain::address::GeoLocation;
use crate::domain::counts::CountsSnapshot;
use crate::domain::rule::Rule;
use crate::infrastructure::storage::ShardedStorage;

#[derive(Debug, Default)]
pub struct InMemoryPersistence {
    rules: ShardedStorage<String, Rule>,
    stats: ShardedStorage<String, CountsSnapshot>,
    audits: Mutex<Vec<AuditEvent>>,
    geo: Mutex<HashMap<IpAddr, GeoLocation>>,
}

impl InMemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with a set of rules.
    pub fn with_rules(rules: impl IntoIterator<Item = Rule>) -> Self {
        let persistence = Self::new();
        for rule in rules {
            persistence.rules.insert(rule.id().to_string(), rule);
        }
        persistence
    }

    /// Register a location returned by `resolve_geo`.
    pub fn set_geo(&self, ip: IpAddr, location: GeoLocation) {
        self.geo.lock().insert(ip, location);
    }

    pub fn rule(&self, id: &str) -> Option<Rule> {
        self.rules.get(id)
    }

    /// Totals persisted so far for a rule.
    pub fn stats(&self, rule_id: &str) -> Option<CountsSnapshot> {
        self.stats.get(rule_id)
    }

    pub fn audits(&self) -> Vec<AuditEvent> {
        self.audits.lock().clone()
    }
}

impl Persistence for InMemoryPersistence {
    fn load_rules(&self) -> Result<Vec<Rule>, PersistenceError> {
        let mut rules = self.rules.values();
        rules.sort_by(|a, b| a.id().cmp(b.id()));
        Ok(rules)
    }

    fn persist_stats_delta(&self, rule: &Rule, delta: &StatsDelta) -> Result<(), PersistenceError> {
        self.stats.with_entry_mut(
            rule.id().to_string(),
            CountsSnapshot::default,
            |totals| totals.accumulate(&delta.counts),
        );
        Ok(())
    }

    fn audit_violation(&self, event: &AuditEvent) -> Result<(), PersistenceError> {
        self.rules
            .insert_if_absent(event.rule.id().to_string(), event.rule.clone());
        self.audits.lock().push(event.clone());
        Ok(())
    }

    fn resolve_geo(&self, ip: IpAddr) -> Result<Option<GeoLocation>, PersistenceError> {
        Ok(self.geo.lock().get(&ip).cloned())
    }

    fn save_rule(&self, rule: &Rule) -> Result<(), PersistenceError> {
        self.rules.insert(rule.id().to_string(), rule.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::address::ResolvedAddress;
    use crate::domain::rule::{Action, Reason, RuleType};
    use std::time::SystemTime;

    fn rule(address: &str) -> Rule {
        Rule::builder(address, RuleType::Ip).build().unwrap()
    }

    #[test]
    fn test_saved_rules_are_loaded() {
        let persistence = InMemoryPersistence::with_rules([rule("192.0.2.2")]);
        persistence
            .save_rule(&rule("192.0.2.1").with_action(Action::Deny).unwrap())
            .unwrap();

        let loaded = persistence.load_rules().unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].address(), "192.0.2.1");
        assert_eq!(loaded[0].action(), Action::Deny);
    }

    #[test]
    fn test_stats_accumulate_per_rule() {
        let persistence = InMemoryPersistence::new();
        let rule = rule("192.0.2.3");
        let delta = StatsDelta {
            address: ResolvedAddress::from_ip("192.0.2.3".parse().unwrap()),
            counts: CountsSnapshot {
                access: 4,
                not_found: 3,
                ..Default::default()
            },
            geo: None,
        };
        persistence.persist_stats_delta(&rule, &delta).unwrap();
        persistence.persist_stats_delta(&rule, &delta).unwrap();

        let totals = persistence.stats(rule.id()).unwrap();
        assert_eq!(totals.access, 8);
        assert_eq!(totals.not_found, 6);
    }

    #[test]
    fn test_audit_registers_unknown_rule() {
        let persistence = InMemoryPersistence::new();
        let rule = rule("192.0.2.4");
        persistence
            .audit_violation(&AuditEvent {
                rule: rule.clone(),
                reason: Reason::Discovery,
                description: "192.0.2.4".to_string(),
                uri: "https://api.example.com/".to_string(),
                timestamp: SystemTime::now(),
            })
            .unwrap();

        assert_eq!(persistence.audits().len(), 1);
        assert_eq!(persistence.rule(rule.id()), Some(rule));
    }

    #[test]
    fn test_geo_lookup() {
        let persistence = InMemoryPersistence::new();
        let ip: IpAddr = "192.0.2.5".parse().unwrap();
        assert_eq!(persistence.resolve_geo(ip).unwrap(), None);
        persistence.set_geo(
            ip,
            GeoLocation {
                country: Some("NL".to_string()),
                ..Default::default()
            },
        );
        let location = persistence.resolve_geo(ip).unwrap().unwrap();
        assert_eq!(location.description(), "NL");
    }
}
