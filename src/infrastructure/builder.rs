//! Registry construction.

use std::sync::Arc;

use crate::application::circuit_breaker::CircuitBreakerConfig;
use crate::application::ports::{AddressResolver, Clock, Persistence};
use crate::application::registry::DosRegistry;
use crate::infrastructure::clock::SystemClock;
use crate::infrastructure::config::DosConfig;
use crate::infrastructure::persistence::InMemoryPersistence;
use crate::infrastructure::resolver::{CachedResolver, SystemResolver};

/// Error returned when building a [`DosRegistry`] fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildError {
    /// A periodic interval is zero
    ZeroInterval(&'static str),
    /// Circuit breaker needs at least one failure to open
    ZeroFailureThreshold,
    ZeroAuditQueueCapacity,
}

impl std::fmt::Display for BuildError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BuildError::ZeroInterval(name) => write!(f, "{} must be greater than 0", name),
            BuildError::ZeroFailureThreshold => {
                write!(f, "circuit breaker failure threshold must be greater than 0")
            }
            BuildError::ZeroAuditQueueCapacity => {
                write!(f, "auditQueueCapacity must be greater than 0")
            }
        }
    }
}

impl std::error::Error for BuildError {}

/// Builder for [`DosRegistry`].
///
/// Defaults: [`DosConfig::default`], the system clock, a cached system
/// resolver and in-memory persistence. Rules are loaded from the persistence
/// gateway when the registry is built.
pub struct DosRegistryBuilder {
    config: DosConfig,
    clock: Option<Arc<dyn Clock>>,
    resolver: Option<Arc<dyn AddressResolver>>,
    persistence: Option<Arc<dyn Persistence>>,
    circuit_breaker: CircuitBreakerConfig,
    load_rules: bool,
}

impl DosRegistryBuilder {
    fn new() -> Self {
        Self {
            config: DosConfig::default(),
            clock: None,
            resolver: None,
            persistence: None,
            circuit_breaker: CircuitBreakerConfig::default(),
            load_rules: true,
        }
    }

    pub fn with_config(mut self, config: DosConfig) -> Self {
        self.config = config;
        self
    }

    /// Set a custom clock (mainly for testing).
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Use this resolver as is. Without one, a [`CachedResolver`] over
    /// [`SystemResolver`] is used.
    pub fn with_resolver(mut self, resolver: Arc<dyn AddressResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn with_persistence(mut self, persistence: Arc<dyn Persistence>) -> Self {
        self.persistence = Some(persistence);
        self
    }

    pub fn with_circuit_breaker(mut self, config: CircuitBreakerConfig) -> Self {
        self.circuit_breaker = config;
        self
    }

    /// Whether `build` loads rules from the persistence gateway. Default: true
    pub fn with_initial_load(mut self, load: bool) -> Self {
        self.load_rules = load;
        self
    }

    /// Build the registry.
    ///
    /// # Errors
    /// Returns `BuildError` if a periodic interval, the audit queue capacity
    /// or the circuit breaker failure threshold is zero.
    pub fn build(self) -> Result<Arc<DosRegistry>, BuildError> {
        if let Some((name, _)) = self
            .config
            .intervals()
            .into_iter()
            .find(|(_, interval)| interval.is_zero())
        {
            return Err(BuildError::ZeroInterval(name));
        }
        if self.circuit_breaker.failure_threshold == 0 {
            return Err(BuildError::ZeroFailureThreshold);
        }
        if self.config.audit_queue_capacity == 0 {
            return Err(BuildError::ZeroAuditQueueCapacity);
        }

        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock::new()));
        let resolver = self.resolver.unwrap_or_else(|| {
            Arc::new(CachedResolver::new(
                Arc::new(SystemResolver::new()),
                Arc::clone(&clock),
            ))
        });
        let persistence = self
            .persistence
            .unwrap_or_else(|| Arc::new(InMemoryPersistence::new()));

        let registry = Arc::new(DosRegistry::new(
            self.config.settings(),
            clock,
            resolver,
            persistence,
            self.circuit_breaker,
        ));
        if self.load_rules {
            registry.reload();
        }
        Ok(registry)
    }
}

impl DosRegistry {
    /// Create a builder for configuring the registry.
    pub fn builder() -> DosRegistryBuilder {
        DosRegistryBuilder::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::rule::{Action, Rule, RuleType};
    use crate::infrastructure::mocks::{MockPersistence, MockResolver};
    use std::time::Duration;

    #[test]
    fn test_zero_intervals_are_rejected() {
        let config = DosConfig {
            stats_update_interval: Duration::ZERO,
            ..Default::default()
        };
        let result = DosRegistry::builder().with_config(config).build();
        assert_eq!(
            result.unwrap_err(),
            BuildError::ZeroInterval("statsUpdateInterval")
        );

        let result = DosRegistry::builder()
            .with_circuit_breaker(CircuitBreakerConfig {
                failure_threshold: 0,
                ..Default::default()
            })
            .build();
        assert_eq!(result.unwrap_err(), BuildError::ZeroFailureThreshold);

        let config = DosConfig {
            audit_queue_capacity: 0,
            ..Default::default()
        };
        let result = DosRegistry::builder().with_config(config).build();
        assert_eq!(result.unwrap_err(), BuildError::ZeroAuditQueueCapacity);
    }

    #[test]
    fn test_build_loads_rules() {
        let persistence = Arc::new(MockPersistence::new());
        persistence.set_rules(vec![Rule::builder("192.0.2.10", RuleType::Ip)
            .action(Action::Deny)
            .build()
            .unwrap()]);

        let registry = DosRegistry::builder()
            .with_resolver(Arc::new(MockResolver::new()))
            .with_persistence(persistence.clone())
            .build()
            .unwrap();
        assert_eq!(persistence.loads(), 1);
        assert_eq!(registry.action("192.0.2.10"), Action::Deny);

        let registry = DosRegistry::builder()
            .with_persistence(persistence.clone())
            .with_initial_load(false)
            .build()
            .unwrap();
        assert_eq!(persistence.loads(), 1);
        assert!(registry.rules().is_empty());
    }

    #[test]
    fn test_config_reaches_settings() {
        let config = DosConfig {
            enabled: false,
            track_localhost: true,
            ..Default::default()
        };
        let registry = DosRegistry::builder()
            .with_config(config)
            .with_initial_load(false)
            .build()
            .unwrap();
        assert!(!registry.settings().enabled);
        assert!(registry.settings().track_localhost);
    }

    #[test]
    fn test_build_error_display() {
        assert_eq!(
            BuildError::ZeroInterval("reloadInterval").to_string(),
            "reloadInterval must be greater than 0"
        );
    }
}
