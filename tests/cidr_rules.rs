//! Network range rules and their interaction with per-client rules.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dos_guard::infrastructure::mocks::{MockClock, MockPersistence, MockResolver};
use dos_guard::{Action, DosRegistry, Request, Rule, RuleError, RuleType};

fn registry() -> (Arc<DosRegistry>, MockClock) {
    let clock = MockClock::new(Instant::now());
    let registry = DosRegistry::builder()
        .with_clock(Arc::new(clock.clone()))
        .with_resolver(Arc::new(MockResolver::new()))
        .with_persistence(Arc::new(MockPersistence::new()))
        .with_initial_load(false)
        .build()
        .unwrap();
    (registry, clock)
}

fn cidr(address: &str, action: Action) -> Rule {
    Rule::builder(address, RuleType::Cidr)
        .action(action)
        .build()
        .unwrap()
}

fn validate(registry: &DosRegistry, ip: &str) -> Action {
    registry.validate(&Request::new("https://api.example.com/orders", ip))
}

#[test]
fn test_most_specific_network_wins() {
    let (registry, _) = registry();
    registry.add_rule(cidr("100.64.0.0/10", Action::Deny));
    registry.add_rule(cidr("100.64.1.0/24", Action::Allow));

    assert_eq!(validate(&registry, "100.64.1.9"), Action::Allow);
    assert_eq!(validate(&registry, "100.64.2.9"), Action::Deny);
    assert_eq!(validate(&registry, "100.128.0.1"), Action::Allow);

    let rule = registry.find_cidr_rule("100.64.1.9".parse().unwrap()).unwrap();
    assert_eq!(rule.id(), "cidr_100_64_1_0_24");
}

#[test]
fn test_ip_rule_overrides_network_rule() {
    let (registry, _) = registry();
    registry.add_rule(cidr("192.0.2.0/24", Action::Deny));
    registry.add_rule(
        Rule::builder("192.0.2.77", RuleType::Ip)
            .action(Action::Allow)
            .build()
            .unwrap(),
    );

    assert_eq!(validate(&registry, "192.0.2.77"), Action::Allow);
    assert_eq!(validate(&registry, "192.0.2.78"), Action::Deny);
}

#[test]
fn test_discovered_client_inside_denied_network() {
    let (registry, _) = registry();
    registry.add_rule(cidr("192.0.2.0/24", Action::Deny));

    registry.register(&Request::new("https://api.example.com/", "192.0.2.90"));
    assert_eq!(
        registry.action_entry("192.0.2.90").unwrap().action(),
        Action::Auto
    );
    assert_eq!(registry.action("192.0.2.90"), Action::Deny);
    assert_eq!(validate(&registry, "192.0.2.90"), Action::Deny);
}

#[test]
fn test_lookups_fall_back_to_network_rules() {
    let (registry, _) = registry();
    registry.add_rule(cidr("192.0.2.0/24", Action::Deny));

    assert_eq!(validate(&registry, "192.0.2.9"), Action::Deny);
    let rule = registry.find_rule("192.0.2.9").unwrap();
    assert_eq!(rule.rule_type(), RuleType::Cidr);
    assert_eq!(rule.id(), "cidr_192_0_2_0_24");
    assert_eq!(registry.action("192.0.2.9"), Action::Deny);

    // the client's own rule comes first
    registry.add_rule(
        Rule::builder("192.0.2.10", RuleType::Ip)
            .action(Action::Allow)
            .build()
            .unwrap(),
    );
    assert_eq!(
        registry.find_rule("192.0.2.10").unwrap().rule_type(),
        RuleType::Ip
    );
    assert_eq!(registry.action("192.0.2.10"), Action::Allow);

    assert!(registry.find_rule("198.51.100.1").is_none());
    assert!(registry.find_rule("unknown.example.org").is_none());
}

#[test]
fn test_inactive_network_rule_is_ignored() {
    let (registry, _) = registry();
    registry.add_rule(cidr("192.0.2.0/24", Action::Deny).with_active(false));
    assert_eq!(validate(&registry, "192.0.2.5"), Action::Allow);
    assert!(registry.find_cidr_rule("192.0.2.5".parse().unwrap()).is_none());
}

#[test]
fn test_new_network_rule_replaces_cached_decision() {
    let (registry, _) = registry();
    registry.add_rule(cidr("10.0.0.0/8", Action::Deny));
    assert_eq!(validate(&registry, "10.20.30.40"), Action::Deny);

    registry.add_rule(cidr("10.20.30.0/24", Action::Allow));
    assert_eq!(validate(&registry, "10.20.30.40"), Action::Allow);
}

#[test]
fn test_network_decision_outlives_its_cache_entry() {
    let (registry, clock) = registry();
    registry.add_rule(cidr("2001:db8::/32", Action::Deny));
    assert_eq!(validate(&registry, "2001:db8::5"), Action::Deny);

    clock.advance(Duration::from_secs(30 * 60));
    assert_eq!(validate(&registry, "2001:db8::5"), Action::Deny);
    assert_eq!(validate(&registry, "2001:db9::5"), Action::Allow);
}

#[test]
fn test_network_rule_validation() {
    let host = Rule::builder("10.0.0.0/8", RuleType::Cidr)
        .host_name("gateway.internal")
        .build();
    assert!(matches!(host, Err(RuleError::HostNameNotAllowed(_))));

    let invalid = Rule::builder("10.0.0.0/33", RuleType::Cidr).build();
    assert!(matches!(invalid, Err(RuleError::InvalidNetwork(_))));

    // host bits are dropped and a bare address covers itself
    let truncated = cidr("10.1.2.3/8", Action::Deny);
    assert_eq!(truncated.prefix_len(), 8);
    assert!(truncated.matches("10.200.0.1".parse().unwrap()));

    let single = cidr("192.0.2.1", Action::Deny);
    assert_eq!(single.prefix_len(), 32);
    assert!(single.matches("192.0.2.1".parse().unwrap()));
    assert!(!single.matches("192.0.2.2".parse().unwrap()));
}
