//! # dos-guard
//!
//! Self-learning denial-of-service admission control.
//!
//! Every request is classified by its outcome (success, not found, failure,
//! invalid, validation, security). The registry tracks per-client request
//! rates for each outcome category, discovers new clients automatically, and
//! bans a client for a blocking period once its rate crosses the threshold
//! configured for the outcome. Explicit rules pin a client or a network
//! range to ALLOW, DENY or THROTTLE.
//!
//! ## Quick Start
//!
//! ```rust
//! use dos_guard::{Action, DosRegistry, Outcome, Request, Rule, RuleType};
//!
//! let registry = DosRegistry::builder().build()?;
//!
//! // Before handling the request
//! let request = Request::new("https://api.example.com/login", "203.0.113.7");
//! if registry.validate(&request) != Action::Deny {
//!     // ... handle it, then report the outcome
//!     registry.register(&request.with_outcome(Outcome::from_http_status(Some(404))));
//! }
//!
//! // Pin a whole network
//! registry.add_rule(
//!     Rule::builder("198.51.100.0/24", RuleType::Cidr)
//!         .action(Action::Deny)
//!         .build()?,
//! );
//! let blocked = Request::new("https://api.example.com/", "198.51.100.20");
//! assert_eq!(registry.validate(&blocked), Action::Deny);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Decisions
//!
//! - **ALLOW**: process the request.
//! - **DENY**: reject it. Clients that cannot be resolved are always denied.
//! - **THROTTLE**: the calling thread was held back by the client's token
//!   bucket, at most `maximumThrottlingDuration`; the request may proceed.
//! - **AUTO**: the rule of a discovered client; behaves as ALLOW until a
//!   threshold is crossed, then as DENY for the blocking period.
//!
//! ## Thresholds
//!
//! Thresholds are written `"<rate> r/s|r/m|r/h, <blocking period>"`:
//!
//! | Option | Default | Outcomes |
//! |--------|---------|----------|
//! | `accessThreshold` | `60 r/s, 60s` | NONE, SUCCESS |
//! | `notFoundThreshold` | `2 r/s, 5m` | NOT_FOUND |
//! | `failureThreshold` | `2 r/s, 5m` | FAILURE |
//! | `invalidThreshold` | `2 r/s, 5m` | INVALID |
//! | `validationThreshold` | `5 r/s, 15m` | VALIDATION |
//! | `securityThreshold` | `5 r/s, 15m` | SECURITY, AUTHENTICATION, AUTHORIZATION |
//!
//! A client is only judged once it has sent at least
//! [`MINIMUM_COUNT`](domain::counts::MINIMUM_COUNT) requests in a category.
//! Malformed thresholds fall back to `1 r/s, 15m` with a warning.
//!
//! ## Background Maintenance
//!
//! With the `async` feature (default), [`MaintenanceScheduler`] persists
//! statistics deltas and audit records, removes inactive clients and reloads
//! rules on their own intervals. Without it, call
//! [`DosRegistry::flush_audits`] periodically: audit records wait in a queue
//! of `auditQueueCapacity` entries and overflow is dropped.
//!
//! ```rust,no_run
//! # use dos_guard::{DosConfig, DosRegistry, MaintenanceScheduler};
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = DosConfig::default();
//! let registry = DosRegistry::builder().with_config(config.clone()).build()?;
//! let maintenance = MaintenanceScheduler::start(registry.clone(), config.maintenance_config()?);
//!
//! // ... serve requests ...
//!
//! registry.shutdown();
//! maintenance.shutdown().await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Observability
//!
//! Diagnostics go through `tracing`. DENY and THROTTLE decisions and the first
//! sighting of a non-local client are emitted on the [`ISSUE_TARGET`] target
//! with a `severity` field, as are audit records lost to a full queue. Counters are available through
//! [`DosRegistry::metrics`].
//!
//! ## Fail-Safe Operation
//!
//! `register` and `validate` never fail the caller. A panic inside them is
//! caught and counted by a circuit breaker; the call fails open (ALLOW). After
//! repeated failures the breaker opens and every call fails open until its
//! recovery timeout elapses.

// Domain layer - value types
pub mod domain;

// Application layer - orchestration
pub mod application;

// Infrastructure layer - external adapters
pub mod infrastructure;

// Re-export commonly used types for convenience
pub use domain::{
    address::{GeoLocation, ResolvedAddress},
    counts::{CountsSnapshot, RequestCounts, MINIMUM_COUNT},
    request::{first_client, Outcome, Request},
    rule::{Action, Reason, Rule, RuleBuilder, RuleError, RuleType},
    threshold::{parse_threshold, Threshold, ThresholdError},
    token_bucket::{Reservation, TokenBucket},
};

pub use application::{
    action_cache::ActionEntry,
    circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState},
    metrics::{Metrics, MetricsSnapshot},
    ports::{AddressResolver, AuditEvent, Clock, Persistence, PersistenceError, StatsDelta},
    registry::{DosRegistry, RegistrySettings, ISSUE_TARGET},
    violation::Thresholds,
};

#[cfg(feature = "async")]
pub use application::maintenance::{
    MaintenanceConfig, MaintenanceConfigError, MaintenanceHandle, MaintenanceScheduler,
    ShutdownError,
};

pub use infrastructure::{
    builder::{BuildError, DosRegistryBuilder},
    clock::SystemClock,
    config::DosConfig,
    persistence::InMemoryPersistence,
    resolver::{CachedResolver, SystemResolver},
    storage::ShardedStorage,
};
