//! Per-check invocation policy

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Minimum time between two real evaluations when no interval is configured.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(30);

/// Consecutive DOWN evaluations needed before DOWN is reported.
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 3;

/// Unset fields fall back to the parent configuration (see [`merge`]) and
/// finally to the crate defaults.
///
/// [`merge`]: HealthCheckConfiguration::merge
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthCheckConfiguration {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    /// Zero means every call re-evaluates.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_threshold: Option<u32>,
}

impl HealthCheckConfiguration {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = Some(enabled);
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval_ms = Some(interval.as_millis() as u64);
        self
    }

    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = Some(threshold);
        self
    }

    pub fn effective_enabled(&self) -> bool {
        self.enabled.unwrap_or(true)
    }

    pub fn effective_interval(&self) -> Duration {
        self.interval_ms
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_INTERVAL)
    }

    pub fn effective_failure_threshold(&self) -> u32 {
        self.failure_threshold.unwrap_or(DEFAULT_FAILURE_THRESHOLD)
    }

    /// Returns a copy where every unset field is taken from `parent`.
    pub fn merge(&self, parent: &HealthCheckConfiguration) -> HealthCheckConfiguration {
        HealthCheckConfiguration {
            enabled: self.enabled.or(parent.enabled),
            interval_ms: self.interval_ms.or(parent.interval_ms),
            failure_threshold: self.failure_threshold.or(parent.failure_threshold),
        }
    }
}
