//! Sweeping a registry and folding the results into one report

use super::check::{HealthCheck, Options};
use super::registry::HealthCheckRegistry;
use super::result::{HealthCheckResult, ResultBuilder, State};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Instant;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub overall: State,
    pub results: BTreeMap<String, HealthCheckResult>,
    pub timestamp: DateTime<Utc>,
}

impl HealthReport {
    pub fn new() -> Self {
        Self {
            overall: State::Unknown,
            results: BTreeMap::new(),
            timestamp: Utc::now(),
        }
    }

    /// DOWN wins over everything; UP needs at least one UP result.
    pub fn add_result(&mut self, result: HealthCheckResult) {
        match result.state() {
            State::Down => {
                self.overall = State::Down;
            }
            State::Up => {
                if self.overall == State::Unknown {
                    self.overall = State::Up;
                }
            }
            State::Unknown => {}
        }

        self.results.insert(result.check_id().to_string(), result);
    }

    pub fn is_up(&self) -> bool {
        self.overall == State::Up
    }

    pub fn down_checks(&self) -> Vec<&str> {
        self.results
            .values()
            .filter(|result| result.is_down())
            .map(|result| result.check_id())
            .collect()
    }
}

impl Default for HealthReport {
    fn default() -> Self {
        Self::new()
    }
}

/// Calls `check`, turning a fault in its evaluation into a DOWN result.
pub fn invoke_check(check: &dyn HealthCheck, options: &Options) -> HealthCheckResult {
    match check.call(options) {
        Ok(result) => result,
        Err(e) => {
            error!("Health check '{}' failed to evaluate: {}", check.id(), e);
            let mut builder = ResultBuilder::new(check.id(), check.group().map(str::to_string));
            builder
                .message(format!("Health check failed: {}", e))
                .error(&e);
            if e.is_programming_fault() {
                builder.detail("check.fault", "state.not.set");
            }
            builder.build_with_state(State::Down)
        }
    }
}

pub fn invoke<F>(registry: &HealthCheckRegistry, options: &Options, filter: F) -> HealthReport
where
    F: Fn(&dyn HealthCheck) -> bool,
{
    let mut report = HealthReport::new();
    let start = Instant::now();

    for check in registry.stream().filter(|check| filter(check.as_ref())) {
        let result = invoke_check(check.as_ref(), options);

        match result.state() {
            State::Up => {}
            State::Unknown => {
                info!(
                    "Health check '{}' is unknown: {}",
                    check.id(),
                    result.message().unwrap_or("no message")
                );
            }
            State::Down => {
                warn!(
                    "Health check '{}' is down: {}",
                    check.id(),
                    result.message().unwrap_or("no message")
                );
            }
        }

        report.add_result(result);
    }

    info!(
        "Health check sweep of {} checks completed in {:?} - overall status: {}",
        report.results.len(),
        start.elapsed(),
        report.overall
    );
    report
}

pub fn invoke_all(registry: &HealthCheckRegistry, options: &Options) -> HealthReport {
    invoke(registry, options, |_| true)
}

pub fn invoke_readiness(registry: &HealthCheckRegistry, options: &Options) -> HealthReport {
    invoke(registry, options, |check| check.is_readiness())
}

pub fn invoke_liveness(registry: &HealthCheckRegistry, options: &Options) -> HealthReport {
    invoke(registry, options, |check| check.is_liveness())
}

pub fn invoke_group(registry: &HealthCheckRegistry, group: &str, options: &Options) -> HealthReport {
    invoke(registry, options, |check| check.group() == Some(group))
}

/// Invokes the single check `id`, if the registry can see it.
pub fn query(registry: &HealthCheckRegistry, id: &str, options: &Options) -> Option<HealthCheckResult> {
    registry
        .get_check(id)
        .map(|check| invoke_check(check.as_ref(), options))
}
