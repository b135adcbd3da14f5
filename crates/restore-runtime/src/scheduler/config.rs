//! Scheduler tuning knobs.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::SchedulerError;

/// Queue, drain and promotion limits for a [`RestoreScheduler`](super::RestoreScheduler).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Requests beyond this many queued entries are dropped.
    pub queue_capacity: usize,
    /// How long the runner keeps absorbing requests into a batch after the last one.
    #[serde(rename = "idle_timeout_ms", with = "millis")]
    pub idle_timeout: Duration,
    pub max_promotion_attempts: u32,
    /// Upper bound on waiting for the runner during reset/dispose.
    #[serde(rename = "shutdown_grace_ms", with = "millis")]
    pub shutdown_grace: Duration,
    /// Hold the runner until the host calls `mark_host_ready`.
    pub require_host_ready: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 150,
            idle_timeout: Duration::from_millis(400),
            max_promotion_attempts: 150,
            shutdown_grace: Duration::from_secs(5),
            require_host_ready: true,
        }
    }
}

impl SchedulerConfig {
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    pub fn with_max_promotion_attempts(mut self, attempts: u32) -> Self {
        self.max_promotion_attempts = attempts;
        self
    }

    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    pub fn with_require_host_ready(mut self, require: bool) -> Self {
        self.require_host_ready = require;
        self
    }

    pub fn validate(&self) -> Result<(), SchedulerError> {
        if self.queue_capacity == 0 {
            return Err(SchedulerError::Config(
                "queue_capacity must be greater than zero".to_string(),
            ));
        }
        if self.max_promotion_attempts == 0 {
            return Err(SchedulerError::Config(
                "max_promotion_attempts must be greater than zero".to_string(),
            ));
        }
        if self.idle_timeout.is_zero() {
            return Err(SchedulerError::Config(
                "idle_timeout must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_design_values() {
        let config = SchedulerConfig::default();
        assert_eq!(config.queue_capacity, 150);
        assert_eq!(config.idle_timeout, Duration::from_millis(400));
        assert_eq!(config.max_promotion_attempts, 150);
        assert_eq!(config.shutdown_grace, Duration::from_secs(5));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config: SchedulerConfig = serde_json::from_value(serde_json::json!({
            "queue_capacity": 10,
            "idle_timeout_ms": 50,
        }))
        .unwrap();
        assert_eq!(config.queue_capacity, 10);
        assert_eq!(config.idle_timeout, Duration::from_millis(50));
        assert_eq!(config.max_promotion_attempts, 150);
        assert!(config.require_host_ready);
    }

    #[test]
    fn zero_limits_are_rejected() {
        let err = SchedulerConfig::default()
            .with_queue_capacity(0)
            .validate()
            .unwrap_err();
        assert!(matches!(err, SchedulerError::Config(_)));
        assert!(SchedulerConfig::default()
            .with_max_promotion_attempts(0)
            .validate()
            .is_err());
        assert!(SchedulerConfig::default()
            .with_idle_timeout(Duration::ZERO)
            .validate()
            .is_err());
    }
}
