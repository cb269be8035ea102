//! Application layer - orchestration of domain logic.
//!
//! This layer coordinates the domain logic and manages the runtime behavior:
//! - DoS registry (register/validate protocol, rules, reload, maintenance operations)
//! - Cached decisions with expiring bans
//! - Threshold violation detection
//! - Blocking throttler
//! - Background maintenance scheduler
//!
//! ## Ports
//!
//! The application layer defines ports (traits) that infrastructure
//! adapters must implement: clock, address resolver and persistence gateway.

pub mod action_cache;
pub mod circuit_breaker;
#[cfg(feature = "async")]
pub mod maintenance;
pub mod metrics;
pub mod ports;
pub mod registry;
pub mod throttle;
pub mod violation;
