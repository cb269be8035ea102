use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use dos_guard::infrastructure::mocks::{MockCaptureLayer, MockClock, MockPersistence, MockResolver};
use dos_guard::{
    first_client, Action, DosConfig, DosRegistry, Outcome, Reason, Request, Rule, RuleType,
    ISSUE_TARGET,
};
use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;

struct Harness {
    registry: Arc<DosRegistry>,
    clock: MockClock,
    persistence: Arc<MockPersistence>,
}

fn harness(config: DosConfig) -> Harness {
    let clock = MockClock::new(Instant::now());
    let persistence = Arc::new(MockPersistence::new());
    let registry = DosRegistry::builder()
        .with_config(config)
        .with_clock(Arc::new(clock.clone()))
        .with_resolver(Arc::new(MockResolver::new()))
        .with_persistence(persistence.clone())
        .with_initial_load(false)
        .build()
        .unwrap();
    Harness {
        registry,
        clock,
        persistence,
    }
}

fn request(ip: &str, outcome: Outcome) -> Request {
    Request::with("https://shop.example.com/admin.php", ip, outcome)
}

/// Register `count` requests spaced by `spacing`.
fn flood(h: &Harness, ip: &str, outcome: Outcome, count: usize, spacing: Duration) {
    for _ in 0..count {
        h.registry.register(&request(ip, outcome));
        h.clock.advance(spacing);
    }
}

fn violations(h: &Harness) -> Vec<dos_guard::AuditEvent> {
    h.registry.flush_audits();
    h.persistence
        .audits()
        .into_iter()
        .filter(|audit| audit.reason != Reason::Discovery)
        .collect()
}

#[test]
fn test_not_found_scan_is_banned_for_blocking_period() {
    let h = harness(DosConfig::default());
    let ip = "203.0.113.10";

    // 10 r/s of 404s against a "2 r/s, 5m" threshold
    flood(&h, ip, Outcome::NotFound, 25, Duration::from_millis(100));
    assert_eq!(h.registry.validate(&request(ip, Outcome::None)), Action::Deny);

    let audits = violations(&h);
    assert_eq!(audits.len(), 1);
    assert_eq!(audits[0].reason, Reason::Scan);
    assert_eq!(audits[0].rule.address(), ip);
    assert!(audits[0].description.contains("crossed threshold"));
    assert_eq!(audits[0].uri, "https://shop.example.com/admin.php");

    h.clock.advance(Duration::from_secs(4 * 60));
    assert_eq!(h.registry.validate(&request(ip, Outcome::None)), Action::Deny);

    h.clock.advance(Duration::from_secs(61));
    assert_eq!(h.registry.validate(&request(ip, Outcome::None)), Action::Allow);
    assert_eq!(h.registry.action(ip), Action::Auto);
    assert_eq!(h.registry.metrics().snapshot().bans_expired, 1);
}

#[test]
fn test_ban_alerts_at_most_once_under_concurrency() {
    let h = harness(DosConfig::default());
    let ip = "203.0.113.11";
    h.registry.register(&request(ip, Outcome::Failure));
    h.clock.advance(Duration::from_secs(1));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let registry = Arc::clone(&h.registry);
            thread::spawn(move || {
                for _ in 0..50 {
                    registry.register(&request(ip, Outcome::Failure));
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(h.registry.metrics().alerts(), 1);
    assert_eq!(h.registry.metrics().snapshot().thresholds_crossed, 1);
    assert_eq!(violations(&h).len(), 1);
    assert_eq!(h.registry.counts(ip).unwrap().snapshot().failure, 401);
}

#[test]
fn test_slow_clients_are_never_banned() {
    let h = harness(DosConfig::default());
    flood(&h, "203.0.113.12", Outcome::NotFound, 100, Duration::from_secs(1));
    assert_eq!(
        h.registry.validate(&request("203.0.113.12", Outcome::None)),
        Action::Allow
    );
    assert!(violations(&h).is_empty());
}

#[test]
fn test_outcomes_map_to_reasons() {
    let h = harness(DosConfig::default());
    flood(&h, "203.0.113.13", Outcome::Authentication, 25, Duration::from_millis(50));
    flood(&h, "203.0.113.14", Outcome::Success, 25, Duration::from_millis(10));

    let audits = violations(&h);
    let reason_of = |ip: &str| {
        audits
            .iter()
            .find(|audit| audit.rule.address() == ip)
            .map(|audit| audit.reason)
    };
    assert_eq!(reason_of("203.0.113.13"), Some(Reason::Security));
    assert_eq!(reason_of("203.0.113.14"), Some(Reason::Dos));

    // the security threshold blocks for 15 minutes
    h.clock.advance(Duration::from_secs(10 * 60));
    assert_eq!(
        h.registry.validate(&request("203.0.113.13", Outcome::None)),
        Action::Deny
    );
    assert_eq!(
        h.registry.validate(&request("203.0.113.14", Outcome::None)),
        Action::Allow
    );
}

#[test]
fn test_unresolvable_clients_are_denied() {
    let h = harness(DosConfig::default());
    assert_eq!(h.registry.validate(&request("", Outcome::None)), Action::Deny);
    assert_eq!(h.registry.validate(&request("   ", Outcome::None)), Action::Deny);
    assert_eq!(
        h.registry.validate(&request("unknown.invalid", Outcome::None)),
        Action::Deny
    );
    assert_eq!(h.registry.metrics().snapshot().requests_denied, 3);
}

#[test]
fn test_explicit_rules() {
    let h = harness(DosConfig::default());
    h.registry.add_rule(
        Rule::builder("198.51.100.1", RuleType::Ip)
            .action(Action::Deny)
            .build()
            .unwrap(),
    );
    h.registry.add_rule(
        Rule::builder("198.51.100.2", RuleType::Ip)
            .action(Action::Allow)
            .build()
            .unwrap(),
    );

    // an allowed client is never banned
    flood(&h, "198.51.100.2", Outcome::NotFound, 50, Duration::from_millis(10));
    assert_eq!(
        h.registry.validate(&request("198.51.100.2", Outcome::None)),
        Action::Allow
    );
    assert!(violations(&h).is_empty());

    // a denied client stays denied once the cached decision expires
    h.clock.advance(Duration::from_secs(3600));
    assert_eq!(
        h.registry.validate(&request("198.51.100.1", Outcome::None)),
        Action::Deny
    );
    assert_eq!(h.persistence.saved_rules().len(), 2);
}

#[test]
fn test_action_lookup_follows_ban_expiry() {
    let h = harness(DosConfig::default());
    let ip = "203.0.113.20";
    flood(&h, ip, Outcome::NotFound, 25, Duration::from_millis(40));
    assert_eq!(h.registry.action(ip), Action::Deny);

    // expired but not yet reverted by traffic
    h.clock.advance(Duration::from_secs(6 * 60));
    assert_eq!(h.registry.action_entry(ip).unwrap().action(), Action::Deny);
    assert_eq!(h.registry.action(ip), Action::Allow);
    assert!(h
        .registry
        .find_rule(ip)
        .is_some_and(|rule| rule.action() == Action::Auto));

    assert_eq!(h.registry.validate(&request(ip, Outcome::None)), Action::Allow);
    assert_eq!(h.registry.action(ip), Action::Auto);
}

#[test]
fn test_action_lookup_of_unknown_and_unresolvable_clients() {
    let h = harness(DosConfig::default());
    assert_eq!(h.registry.action("203.0.113.21"), Action::Allow);
    assert!(h.registry.find_rule("203.0.113.21").is_none());

    assert_eq!(h.registry.action(""), Action::Deny);
    assert_eq!(h.registry.action("unknown.invalid"), Action::Deny);
    assert!(h.registry.find_rule("unknown.invalid").is_none());
    assert!(h.registry.action_entry("unknown.invalid").is_none());
}

#[test]
fn test_host_name_clients_share_the_ip_rule() {
    let clock = MockClock::new(Instant::now());
    let resolver = MockResolver::new();
    resolver.map("crawler.example.net", "192.0.2.50".parse().unwrap());
    let registry = DosRegistry::builder()
        .with_clock(Arc::new(clock.clone()))
        .with_resolver(Arc::new(resolver))
        .with_persistence(Arc::new(MockPersistence::new()))
        .with_initial_load(false)
        .build()
        .unwrap();

    registry.register(&request("crawler.example.net", Outcome::Success));
    let rule = registry.find_rule("192.0.2.50").unwrap();
    assert_eq!(rule.host_name(), Some("crawler.example.net"));
    assert_eq!(rule.name(), "crawler.example.net");
    assert_eq!(registry.find_rule("crawler.example.net"), Some(rule));

    registry.add_rule(
        Rule::builder("crawler.example.net", RuleType::Ip)
            .action(Action::Deny)
            .build()
            .unwrap(),
    );
    assert_eq!(
        registry.validate(&request("192.0.2.50", Outcome::None)),
        Action::Deny
    );
    assert_eq!(registry.action("crawler.example.net"), Action::Deny);
}

#[test]
fn test_issues_are_emitted_for_restricted_and_new_clients() {
    let capture = MockCaptureLayer::new();
    let subscriber = tracing_subscriber::registry().with(capture.clone());
    let h = harness(DosConfig::default());
    h.registry.add_rule(
        Rule::builder("198.51.100.3", RuleType::Ip)
            .action(Action::Deny)
            .build()
            .unwrap(),
    );

    tracing::subscriber::with_default(subscriber, || {
        h.registry.register(&request("203.0.113.15", Outcome::Success));
        h.registry.register(&request("10.0.0.15", Outcome::Success));
        h.registry.validate(&request("198.51.100.3", Outcome::None));
    });

    let issues = capture.with_target(ISSUE_TARGET);
    assert_eq!(issues.len(), 2);

    assert_eq!(issues[0].message, "New client");
    assert_eq!(issues[0].field("severity"), Some("notice"));
    assert_eq!(issues[0].field("client"), Some("203.0.113.15"));

    assert_eq!(issues[1].level, Level::WARN);
    assert_eq!(issues[1].field("severity"), Some("critical"));
    assert_eq!(issues[1].field("client"), Some("198.51.100.3"));
    assert_eq!(
        issues[1].field("uri"),
        Some("https://shop.example.com/admin.php")
    );
}

#[test]
fn test_threshold_crossing_is_logged() {
    let capture = MockCaptureLayer::new();
    let subscriber = tracing_subscriber::registry().with(capture.clone());
    let h = harness(DosConfig::default());

    tracing::subscriber::with_default(subscriber, || {
        flood(&h, "203.0.113.16", Outcome::Invalid, 25, Duration::from_millis(100));
    });

    let crossings: Vec<_> = capture
        .get_captured()
        .into_iter()
        .filter(|event| event.message.contains("crossed threshold"))
        .collect();
    assert_eq!(crossings.len(), 1);
    assert_eq!(crossings[0].level, Level::INFO);
    assert_eq!(crossings[0].field("outcome"), Some("INVALID"));
    assert_eq!(crossings[0].field("reason"), Some("SCAN"));
}

#[test]
fn test_configured_thresholds_apply() {
    let config: DosConfig = serde_json::from_str(
        r#"{ "validationThreshold": "100 r/s, 1m", "trackLocalhost": true }"#,
    )
    .unwrap();
    let h = harness(config);

    // 10 r/s is below the raised validation threshold
    flood(&h, "203.0.113.17", Outcome::Validation, 40, Duration::from_millis(100));
    assert_eq!(
        h.registry.validate(&request("203.0.113.17", Outcome::None)),
        Action::Allow
    );

    // localhost is tracked like any other client
    flood(&h, "127.0.0.1", Outcome::NotFound, 25, Duration::from_millis(100));
    assert_eq!(
        h.registry.validate(&request("127.0.0.1", Outcome::None)),
        Action::Deny
    );
}

#[test]
fn test_request_breakdown_and_counts_view() {
    let h = harness(DosConfig::default());
    h.registry.register(&Request::with(
        "https://shop.example.com/cart",
        "203.0.113.18",
        Outcome::from_http_status(Some(200)),
    ));
    h.clock.advance(Duration::from_secs(2));
    h.registry.register(&Request::with(
        "http://shop.example.com/missing",
        "203.0.113.18",
        Outcome::from_http_status(Some(404)),
    ));

    let metrics = h.registry.metrics();
    assert_eq!(metrics.requests_by_host("203.0.113.18"), 2);
    assert_eq!(metrics.requests_by_host("shop.example.com"), 0);
    assert_eq!(metrics.requests_by_scheme("https"), 1);
    assert_eq!(metrics.requests_by_scheme("http"), 1);
    assert_eq!(metrics.requests_by_outcome(Outcome::NotFound), 1);

    let views = h.registry.request_counts();
    assert_eq!(views.len(), 1);
    assert_eq!(views[0].counts.access, 2);
    assert_eq!(views[0].counts.not_found, 1);
    assert_eq!(views[0].last_seen - views[0].first_seen, Duration::from_secs(2));
}

#[test]
fn test_named_clients_are_counted_by_host_name() {
    let resolver = MockResolver::new();
    resolver.map("crawler.example.net", "198.51.100.40".parse().unwrap());
    let registry = DosRegistry::builder()
        .with_resolver(Arc::new(resolver))
        .with_persistence(Arc::new(MockPersistence::new()))
        .with_initial_load(false)
        .build()
        .unwrap();

    registry.register(&Request::new("https://shop.example.com/", "crawler.example.net"));
    registry.register(&Request::new("https://shop.example.com/", "198.51.100.41"));

    let metrics = registry.metrics();
    assert_eq!(metrics.requests_by_host("crawler.example.net"), 1);
    assert_eq!(metrics.requests_by_host("198.51.100.41"), 1);
    assert_eq!(metrics.requests_by_host("198.51.100.40"), 0);
}

#[test]
fn test_forwarded_client_selection() {
    assert_eq!(
        first_client(Some("203.0.113.19, 10.0.0.1"), "10.0.0.2"),
        "203.0.113.19"
    );
    assert_eq!(first_client(None, "10.0.0.2"), "10.0.0.2");
}
