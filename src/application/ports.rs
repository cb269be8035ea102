//! Ports (interfaces) for the application layer.
//!
//! The registry depends only on these traits. Infrastructure provides the
//! adapters: system clock and resolver for production, in-memory persistence,
//! and the mocks used by tests.

use std::fmt::{self, Debug};
use std::net::IpAddr;
use std::time::{Instant, SystemTime};

use crate::domain::address::{GeoLocation, ResolvedAddress};
use crate::domain::counts::CountsSnapshot;
use crate::domain::rule::{Reason, Rule};

/// Port for obtaining current time.
///
/// Infrastructure provides `SystemClock` and, for tests, `MockClock`.
pub trait Clock: Send + Sync + Debug {
    /// Get the current instant.
    fn now(&self) -> Instant;
}

/// Port turning the raw client string of a request into an address.
pub trait AddressResolver: Send + Sync + Debug {
    /// Resolve an IP literal or host name; `None` when it cannot be resolved.
    fn resolve(&self, address: &str) -> Option<ResolvedAddress>;

    /// Drop cached entries that are past their lifetime.
    fn purge(&self) {}
}

/// Error reported by a persistence gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PersistenceError {
    /// The backing store cannot be reached
    Unavailable(String),
    /// The store refused the operation
    Rejected {
        operation: &'static str,
        message: String,
    },
}

impl fmt::Display for PersistenceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PersistenceError::Unavailable(message) => {
                write!(f, "persistence unavailable: {}", message)
            }
            PersistenceError::Rejected { operation, message } => {
                write!(f, "persistence rejected {}: {}", operation, message)
            }
        }
    }
}

impl std::error::Error for PersistenceError {}

/// Audit record for a discovered client or a ban.
#[derive(Debug, Clone, PartialEq)]
pub struct AuditEvent {
    pub rule: Rule,
    pub reason: Reason,
    pub description: String,
    /// URI of the request that triggered the record
    pub uri: String,
    pub timestamp: SystemTime,
}

/// Requests counted for a client since the previous persisted snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct StatsDelta {
    pub address: ResolvedAddress,
    pub counts: CountsSnapshot,
    pub geo: Option<GeoLocation>,
}

/// Port to the durable store for rules, statistics and audit records.
///
/// Implementations are called from maintenance tasks, never while a request
/// is being admitted. Every method may fail; the registry logs failures and
/// carries on.
pub trait Persistence: Send + Sync + Debug {
    /// Load every known rule.
    fn load_rules(&self) -> Result<Vec<Rule>, PersistenceError>;

    /// Add a statistics delta to the totals of a rule.
    fn persist_stats_delta(&self, rule: &Rule, delta: &StatsDelta) -> Result<(), PersistenceError>;

    /// Store an audit record.
    fn audit_violation(&self, event: &AuditEvent) -> Result<(), PersistenceError>;

    /// Look up where an address is located.
    fn resolve_geo(&self, ip: IpAddr) -> Result<Option<GeoLocation>, PersistenceError>;

    /// Create or update a rule.
    fn save_rule(&self, rule: &Rule) -> Result<(), PersistenceError>;
}
