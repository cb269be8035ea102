//! Configuration surface.
//!
//! [`DosConfig`] mirrors the recognized options one to one and deserializes
//! from any serde format using camelCase keys. Durations use `humantime`
//! notation (`"10s"`, `"5m"`, `"7days"`); thresholds use the
//! `"<rate> r/s|r/m|r/h, <duration>"` form. A malformed threshold does not
//! fail deserialization: it is replaced by the default threshold with a
//! warning when the registry settings are derived.

use std::time::Duration;

use serde::{Deserialize, Serialize};

#[cfg(feature = "async")]
use crate::application::maintenance::{MaintenanceConfig, MaintenanceConfigError};
use crate::application::registry::RegistrySettings;
use crate::application::violation::Thresholds;
use crate::domain::threshold::parse_threshold;

/// Admission control options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DosConfig {
    pub enabled: bool,
    pub track_localhost: bool,
    #[serde(with = "humantime_serde")]
    pub maintenance_interval: Duration,
    #[serde(with = "humantime_serde")]
    pub stats_update_interval: Duration,
    #[serde(with = "humantime_serde")]
    pub maximum_throttling_duration: Duration,
    #[serde(with = "humantime_serde")]
    pub reload_interval: Duration,
    #[serde(with = "humantime_serde")]
    pub inactivity_interval: Duration,
    /// Audit records held until `flush_audits` runs; overflow is dropped
    pub audit_queue_capacity: usize,
    pub access_threshold: String,
    pub failure_threshold: String,
    pub not_found_threshold: String,
    pub validation_threshold: String,
    pub invalid_threshold: String,
    pub security_threshold: String,
}

impl Default for DosConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            track_localhost: false,
            maintenance_interval: Duration::from_secs(5 * 60),
            stats_update_interval: Duration::from_secs(10),
            maximum_throttling_duration: Duration::from_secs(5 * 60),
            reload_interval: Duration::from_secs(15 * 60),
            inactivity_interval: Duration::from_secs(7 * 24 * 60 * 60),
            audit_queue_capacity: 10_000,
            access_threshold: "60 r/s, 60s".to_string(),
            failure_threshold: "2 r/s, 5m".to_string(),
            not_found_threshold: "2 r/s, 5m".to_string(),
            validation_threshold: "5 r/s, 15m".to_string(),
            invalid_threshold: "2 r/s, 5m".to_string(),
            security_threshold: "5 r/s, 15m".to_string(),
        }
    }
}

impl DosConfig {
    /// Parse the six threshold strings.
    pub fn thresholds(&self) -> Thresholds {
        Thresholds {
            access: parse_threshold(&self.access_threshold),
            not_found: parse_threshold(&self.not_found_threshold),
            failure: parse_threshold(&self.failure_threshold),
            invalid: parse_threshold(&self.invalid_threshold),
            validation: parse_threshold(&self.validation_threshold),
            security: parse_threshold(&self.security_threshold),
        }
    }

    /// Settings for [`DosRegistry`](crate::application::registry::DosRegistry).
    pub fn settings(&self) -> RegistrySettings {
        RegistrySettings {
            enabled: self.enabled,
            track_localhost: self.track_localhost,
            maximum_throttling_duration: self.maximum_throttling_duration,
            reload_interval: self.reload_interval,
            inactivity_interval: self.inactivity_interval,
            audit_queue_capacity: self.audit_queue_capacity,
            thresholds: self.thresholds(),
        }
    }

    /// Intervals for the maintenance scheduler.
    ///
    /// # Errors
    /// Returns an error if a periodic interval is zero.
    #[cfg(feature = "async")]
    pub fn maintenance_config(&self) -> Result<MaintenanceConfig, MaintenanceConfigError> {
        MaintenanceConfig::new(
            self.stats_update_interval,
            self.maintenance_interval,
            self.reload_interval,
        )
    }

    /// Named periodic intervals, used to reject zero values.
    pub(crate) fn intervals(&self) -> [(&'static str, Duration); 4] {
        [
            ("maintenanceInterval", self.maintenance_interval),
            ("statsUpdateInterval", self.stats_update_interval),
            ("reloadInterval", self.reload_interval),
            ("inactivityInterval", self.inactivity_interval),
        ]
    }
}

mod humantime_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(s.trim()).map_err(serde::de::Error::custom)
    }
}
