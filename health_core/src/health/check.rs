//! The check contract and the invoker wrapping every concrete probe
//!
//! A [`ProbeCheck`] owns the policy (enabled flag, debounce interval, failure
//! threshold) and the invocation history of one check. The actual health
//! logic lives in a [`HealthProbe`], which only has to put a definite state
//! on the [`ResultBuilder`] it is handed.

use super::configuration::HealthCheckConfiguration;
use super::host::HostAware;
use super::result::{HealthCheckResult, ResultBuilder, State};
use crate::error::{HealthError, Result};
use chrono::Utc;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Instant;
use tracing::{debug, warn};

pub type Options = HashMap<String, Value>;
pub type Metadata = HashMap<String, Value>;

pub mod keys {
    pub const CHECK_ID: &str = "check.id";
    pub const CHECK_GROUP: &str = "check.group";
    pub const CHECK_ENABLED: &str = "check.enabled";
    pub const INVOCATION_COUNT: &str = "invocation.count";
    pub const INVOCATION_TIME: &str = "invocation.time";
    pub const INVOCATION_ATTEMPT_TIME: &str = "invocation.attempt.time";
    pub const FAILURE_COUNT: &str = "failure.count";
}

pub trait HealthCheck: Send + Sync {
    /// Identity of the check. Two checks with the same id are the same check.
    fn id(&self) -> &str;

    fn group(&self) -> Option<&str>;

    fn is_readiness(&self) -> bool {
        true
    }

    fn is_liveness(&self) -> bool {
        true
    }

    fn configuration(&self) -> HealthCheckConfiguration;

    fn set_configuration(&self, configuration: HealthCheckConfiguration);

    /// Snapshot of the check's metadata, including invocation bookkeeping.
    fn metadata(&self) -> Metadata;

    fn call(&self, options: &Options) -> Result<HealthCheckResult>;

    fn as_host_aware(&self) -> Option<&dyn HostAware> {
        None
    }
}

/// `group.id` when the check is grouped, otherwise the bare id.
pub fn qualified_id(check: &dyn HealthCheck) -> String {
    match check.group() {
        Some(group) => format!("{}.{}", group, check.id()),
        None => check.id().to_string(),
    }
}

/// Check-specific evaluation logic run by [`ProbeCheck`].
pub trait HealthProbe: Send + Sync {
    /// Must leave a state on `builder`; returning without one is reported as
    /// [`HealthError::StateNotSet`].
    fn probe(&self, builder: &mut ResultBuilder, options: &Options) -> Result<()>;

    fn as_host_aware(&self) -> Option<&dyn HostAware> {
        None
    }
}

pub struct FnProbe<F>(F);

impl<F> HealthProbe for FnProbe<F>
where
    F: Fn(&mut ResultBuilder, &Options) -> Result<()> + Send + Sync,
{
    fn probe(&self, builder: &mut ResultBuilder, options: &Options) -> Result<()> {
        (self.0)(builder, options)
    }
}

struct InvocationState {
    configuration: HealthCheckConfiguration,
    metadata: Metadata,
    last_result: Option<HealthCheckResult>,
    last_invocation: Option<Instant>,
    failure_count: u32,
    invocation_count: u64,
}

pub struct ProbeCheck<P> {
    id: String,
    group: Option<String>,
    readiness: bool,
    liveness: bool,
    probe: P,
    invocation: Mutex<InvocationState>,
}

impl<F> ProbeCheck<FnProbe<F>> {
    pub fn from_fn(id: impl Into<String>, probe: F) -> Self
    where
        F: Fn(&mut ResultBuilder, &Options) -> Result<()> + Send + Sync,
    {
        Self::new(id, FnProbe(probe))
    }
}

impl<P: HealthProbe> ProbeCheck<P> {
    pub fn new(id: impl Into<String>, probe: P) -> Self {
        let id = id.into();
        let mut metadata = Metadata::new();
        metadata.insert(keys::CHECK_ID.to_string(), Value::String(id.clone()));
        metadata.insert(keys::INVOCATION_COUNT.to_string(), Value::from(0u64));
        metadata.insert(keys::FAILURE_COUNT.to_string(), Value::from(0u32));

        Self {
            id,
            group: None,
            readiness: true,
            liveness: true,
            probe,
            invocation: Mutex::new(InvocationState {
                configuration: HealthCheckConfiguration::default(),
                metadata,
                last_result: None,
                last_invocation: None,
                failure_count: 0,
                invocation_count: 0,
            }),
        }
    }

    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        let group = group.into();
        self.invocation
            .get_mut()
            .metadata
            .insert(keys::CHECK_GROUP.to_string(), Value::String(group.clone()));
        self.group = Some(group);
        self
    }

    pub fn with_configuration(mut self, configuration: HealthCheckConfiguration) -> Self {
        self.invocation.get_mut().configuration = configuration;
        self
    }

    /// Adds a caller-visible annotation to the metadata.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.invocation
            .get_mut()
            .metadata
            .insert(key.into(), value.into());
        self
    }

    pub fn readiness(mut self, readiness: bool) -> Self {
        self.readiness = readiness;
        self
    }

    pub fn liveness(mut self, liveness: bool) -> Self {
        self.liveness = liveness;
        self
    }

    pub fn probe(&self) -> &P {
        &self.probe
    }

    pub fn last_result(&self) -> Option<HealthCheckResult> {
        self.invocation.lock().last_result.clone()
    }

    pub fn failure_count(&self) -> u32 {
        self.invocation.lock().failure_count
    }

    pub fn invocation_count(&self) -> u64 {
        self.invocation.lock().invocation_count
    }
}

impl<P: HealthProbe> HealthCheck for ProbeCheck<P> {
    fn id(&self) -> &str {
        &self.id
    }

    fn group(&self) -> Option<&str> {
        self.group.as_deref()
    }

    fn is_readiness(&self) -> bool {
        self.readiness
    }

    fn is_liveness(&self) -> bool {
        self.liveness
    }

    fn configuration(&self) -> HealthCheckConfiguration {
        self.invocation.lock().configuration.clone()
    }

    fn set_configuration(&self, configuration: HealthCheckConfiguration) {
        self.invocation.lock().configuration = configuration;
    }

    fn metadata(&self) -> Metadata {
        self.invocation.lock().metadata.clone()
    }

    fn call(&self, options: &Options) -> Result<HealthCheckResult> {
        // Held for the whole call: one invocation per check at a time, and
        // counters, timestamps and last result always move together.
        let mut invocation = self.invocation.lock();

        let enabled = invocation.configuration.effective_enabled();
        let interval = invocation.configuration.effective_interval();
        let threshold = invocation.configuration.effective_failure_threshold();

        let now = Utc::now().to_rfc3339();
        invocation.metadata.insert(
            keys::INVOCATION_ATTEMPT_TIME.to_string(),
            Value::String(now.clone()),
        );

        let mut builder = ResultBuilder::new(self.id.clone(), self.group.clone());

        if !enabled {
            return builder
                .unknown()
                .message("Disabled")
                .detail(keys::CHECK_ENABLED, false)
                .build();
        }

        let debounced = match (&invocation.last_result, invocation.last_invocation) {
            (Some(_), Some(last)) if !interval.is_zero() => last.elapsed() < interval,
            _ => false,
        };

        if debounced {
            if let Some(previous) = &invocation.last_result {
                builder.replay(previous);
            }
            debug!("Health check '{}' debounced, reusing last result", self.id);
        } else {
            self.probe.probe(&mut builder, options)?;

            let raw = builder.current_state().ok_or_else(|| HealthError::StateNotSet {
                check: self.id.clone(),
            })?;

            let mut failure_count = invocation.failure_count;
            if raw == State::Down {
                failure_count = failure_count.saturating_add(1);
                if failure_count < threshold {
                    debug!(
                        "Health check '{}' reported down ({}/{}), holding state up",
                        self.id, failure_count, threshold
                    );
                    builder.up();
                } else {
                    warn!(
                        "Health check '{}' is down after {} consecutive failures: {}",
                        self.id,
                        failure_count,
                        builder.current_message().unwrap_or("no message")
                    );
                }
            } else {
                failure_count = 0;
            }

            let invocation_count = invocation.invocation_count + 1;
            invocation.failure_count = failure_count;
            invocation.invocation_count = invocation_count;
            invocation.last_invocation = Some(Instant::now());

            let metadata = &mut invocation.metadata;
            metadata.insert(keys::INVOCATION_TIME.to_string(), Value::String(now.clone()));
            metadata.insert(keys::FAILURE_COUNT.to_string(), Value::from(failure_count));
            metadata.insert(keys::INVOCATION_COUNT.to_string(), Value::from(invocation_count));

            builder
                .detail(keys::INVOCATION_TIME, now)
                .detail(keys::INVOCATION_COUNT, invocation_count)
                .detail(keys::FAILURE_COUNT, failure_count);
        }

        let result = builder.build()?;
        invocation.last_result = Some(result.clone());
        Ok(result)
    }

    fn as_host_aware(&self) -> Option<&dyn HostAware> {
        self.probe.as_host_aware()
    }
}
