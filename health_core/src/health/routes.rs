//! Health checks bound to a single managed route
//!
//! The coarse verdict comes from the route's lifecycle status. When that is
//! not already DOWN, an ordered list of [`Evaluator`]s may look at the
//! route's live metrics and turn it DOWN.

use super::check::{HealthProbe, Options, ProbeCheck};
use super::host::ServiceStatus;
use super::result::{ResultBuilder, State};
use crate::error::Result;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

pub const ROUTE_GROUP: &str = "routes";
pub const ROUTE_ID: &str = "route.id";
pub const ROUTE_STATUS: &str = "route.status";
pub const ROUTE_CONTEXT_NAME: &str = "route.context.name";

pub trait ManagedRoute: Send + Sync {
    /// `None` when the route has no identifiable name.
    fn route_id(&self) -> Option<String>;
    fn status(&self) -> ServiceStatus;
    fn context_name(&self) -> String;
    /// True when no active controller owns the route's lifecycle.
    fn is_externally_managed(&self) -> bool;
    fn auto_startup(&self) -> bool;
    fn metrics(&self) -> Option<Arc<dyn RouteMetrics>>;
}

/// Live performance counters of a route.
pub trait RouteMetrics: Send + Sync {
    fn exchanges_total(&self) -> u64;
    fn exchanges_failed(&self) -> u64;
    fn exchanges_inflight(&self) -> u64;
    fn min_processing_time(&self) -> Duration;
    fn mean_processing_time(&self) -> Duration;
    fn max_processing_time(&self) -> Duration;
    fn last_processing_time(&self) -> Duration;
}

pub trait Evaluator: Send + Sync {
    fn evaluate(&self, metrics: &dyn RouteMetrics, builder: &mut ResultBuilder, options: &Options);
}

pub struct RouteProbe {
    route: Arc<dyn ManagedRoute>,
    evaluators: Vec<Arc<dyn Evaluator>>,
}

impl RouteProbe {
    pub fn route(&self) -> &Arc<dyn ManagedRoute> {
        &self.route
    }

    pub fn evaluators(&self) -> &[Arc<dyn Evaluator>] {
        &self.evaluators
    }
}

impl HealthProbe for RouteProbe {
    fn probe(&self, builder: &mut ResultBuilder, options: &Options) -> Result<()> {
        let status = self.route.status();
        builder
            .detail(ROUTE_STATUS, status.name())
            .detail(ROUTE_CONTEXT_NAME, self.route.context_name());

        let Some(route_id) = self.route.route_id() else {
            builder.unknown().message("Route has no id");
            return Ok(());
        };
        builder.detail(ROUTE_ID, route_id.clone());

        if self.route.is_externally_managed() || !self.route.auto_startup() {
            builder.up();
            return Ok(());
        }

        if status.is_started() {
            builder.up();
        } else if status.is_stopped() {
            builder
                .down()
                .message(format!("Route {} has status {}", route_id, status));
        } else {
            builder
                .unknown()
                .message(format!("Route {} is {}", route_id, status));
        }

        if builder.current_state() == Some(State::Down) || self.evaluators.is_empty() {
            return Ok(());
        }

        if let Some(metrics) = self.route.metrics() {
            for evaluator in &self.evaluators {
                evaluator.evaluate(metrics.as_ref(), builder, options);
                if builder.current_state() == Some(State::Down) {
                    break;
                }
            }
        }

        Ok(())
    }
}

pub type RouteHealthCheck = ProbeCheck<RouteProbe>;

impl ProbeCheck<RouteProbe> {
    /// Check id is `route:<route id>`, or `route:<unnamed>` for routes
    /// without one.
    pub fn for_route(route: Arc<dyn ManagedRoute>, evaluators: Vec<Arc<dyn Evaluator>>) -> Self {
        let id = format!(
            "route:{}",
            route.route_id().unwrap_or_else(|| "<unnamed>".to_string())
        );
        ProbeCheck::new(id, RouteProbe { route, evaluators }).with_group(ROUTE_GROUP)
    }
}

/// Fixed counter values, typically a snapshot taken by a metrics collector.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RouteMetricsSnapshot {
    pub exchanges_total: u64,
    pub exchanges_failed: u64,
    pub exchanges_inflight: u64,
    pub min_processing_time: Duration,
    pub mean_processing_time: Duration,
    pub max_processing_time: Duration,
    pub last_processing_time: Duration,
}

impl RouteMetrics for RouteMetricsSnapshot {
    fn exchanges_total(&self) -> u64 {
        self.exchanges_total
    }

    fn exchanges_failed(&self) -> u64 {
        self.exchanges_failed
    }

    fn exchanges_inflight(&self) -> u64 {
        self.exchanges_inflight
    }

    fn min_processing_time(&self) -> Duration {
        self.min_processing_time
    }

    fn mean_processing_time(&self) -> Duration {
        self.mean_processing_time
    }

    fn max_processing_time(&self) -> Duration {
        self.max_processing_time
    }

    fn last_processing_time(&self) -> Duration {
        self.last_processing_time
    }
}

/// Route whose state is pushed in by the embedder.
pub struct StaticRoute {
    id: Option<String>,
    context_name: String,
    status: RwLock<ServiceStatus>,
    externally_managed: bool,
    auto_startup: bool,
    metrics: RwLock<Option<Arc<dyn RouteMetrics>>>,
}

impl StaticRoute {
    pub fn new(id: Option<String>, context_name: impl Into<String>) -> Self {
        Self {
            id,
            context_name: context_name.into(),
            status: RwLock::new(ServiceStatus::Started),
            externally_managed: false,
            auto_startup: true,
            metrics: RwLock::new(None),
        }
    }

    pub fn externally_managed(mut self, externally_managed: bool) -> Self {
        self.externally_managed = externally_managed;
        self
    }

    pub fn auto_startup(mut self, auto_startup: bool) -> Self {
        self.auto_startup = auto_startup;
        self
    }

    pub fn set_status(&self, status: ServiceStatus) {
        *self.status.write() = status;
    }

    pub fn set_metrics(&self, metrics: Option<Arc<dyn RouteMetrics>>) {
        *self.metrics.write() = metrics;
    }
}

impl ManagedRoute for StaticRoute {
    fn route_id(&self) -> Option<String> {
        self.id.clone()
    }

    fn status(&self) -> ServiceStatus {
        *self.status.read()
    }

    fn context_name(&self) -> String {
        self.context_name.clone()
    }

    fn is_externally_managed(&self) -> bool {
        self.externally_managed
    }

    fn auto_startup(&self) -> bool {
        self.auto_startup
    }

    fn metrics(&self) -> Option<Arc<dyn RouteMetrics>> {
        self.metrics.read().clone()
    }
}

pub mod evaluators {
    //! Built-in metric evaluators.

    use super::{Evaluator, Options, ResultBuilder, RouteMetrics};
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::time::Duration;

    fn millis(duration: Duration) -> u64 {
        duration.as_millis() as u64
    }

    /// DOWN once more than `threshold` exchanges have failed.
    pub struct ExchangesFailed {
        threshold: u64,
    }

    impl ExchangesFailed {
        pub fn new(threshold: u64) -> Self {
            Self { threshold }
        }
    }

    impl Evaluator for ExchangesFailed {
        fn evaluate(&self, metrics: &dyn RouteMetrics, builder: &mut ResultBuilder, _options: &Options) {
            let value = metrics.exchanges_failed();
            builder
                .detail("exchanges.failed", value)
                .detail("exchanges.failed.threshold", self.threshold);

            if value > self.threshold {
                builder.down().message(format!(
                    "Failed exchanges {} exceed threshold {}",
                    value, self.threshold
                ));
            }
        }
    }

    /// DOWN once more than `threshold` exchanges are in flight.
    pub struct ExchangesInflight {
        threshold: u64,
    }

    impl ExchangesInflight {
        pub fn new(threshold: u64) -> Self {
            Self { threshold }
        }
    }

    impl Evaluator for ExchangesInflight {
        fn evaluate(&self, metrics: &dyn RouteMetrics, builder: &mut ResultBuilder, _options: &Options) {
            let value = metrics.exchanges_inflight();
            builder
                .detail("exchanges.inflight", value)
                .detail("exchanges.inflight.threshold", self.threshold);

            if value > self.threshold {
                builder.down().message(format!(
                    "Inflight exchanges {} exceed threshold {}",
                    value, self.threshold
                ));
            }
        }
    }

    /// DOWN when the last processing time stayed above `threshold` for more
    /// than `failures` consecutive evaluations. Streaks are counted per
    /// check, so one instance can be shared by every route check.
    pub struct LastProcessingTime {
        threshold: Duration,
        failures: u32,
        streaks: Mutex<HashMap<String, u32>>,
    }

    impl LastProcessingTime {
        pub fn new(threshold: Duration, failures: u32) -> Self {
            Self {
                threshold,
                failures,
                streaks: Mutex::new(HashMap::new()),
            }
        }
    }

    impl Evaluator for LastProcessingTime {
        fn evaluate(&self, metrics: &dyn RouteMetrics, builder: &mut ResultBuilder, _options: &Options) {
            let value = metrics.last_processing_time();
            builder
                .detail("exchanges.last.time", millis(value))
                .detail("exchanges.last.time.threshold", millis(self.threshold))
                .detail("exchanges.last.time.failures", self.failures);

            if value > self.threshold {
                let failures = {
                    let mut streaks = self.streaks.lock();
                    let streak = streaks.entry(builder.check_id().to_string()).or_insert(0);
                    *streak += 1;
                    *streak
                };
                if failures > self.failures {
                    builder.down().message(format!(
                        "Last processing time {}ms exceeded {}ms for {} evaluations",
                        millis(value),
                        millis(self.threshold),
                        failures
                    ));
                }
            } else {
                self.streaks.lock().remove(builder.check_id());
            }
        }
    }

    macro_rules! processing_time_evaluator {
        ($(#[$doc:meta])* $name:ident, $accessor:ident, $key:literal, $label:literal) => {
            $(#[$doc])*
            pub struct $name {
                threshold: Duration,
            }

            impl $name {
                pub fn new(threshold: Duration) -> Self {
                    Self { threshold }
                }
            }

            impl Evaluator for $name {
                fn evaluate(&self, metrics: &dyn RouteMetrics, builder: &mut ResultBuilder, _options: &Options) {
                    let value = metrics.$accessor();
                    builder
                        .detail($key, millis(value))
                        .detail(concat!($key, ".threshold"), millis(self.threshold));

                    if value > self.threshold {
                        builder.down().message(format!(
                            concat!($label, " processing time {}ms exceeds {}ms"),
                            millis(value),
                            millis(self.threshold)
                        ));
                    }
                }
            }
        };
    }

    processing_time_evaluator!(MinProcessingTime, min_processing_time, "exchanges.min.time", "Min");
    processing_time_evaluator!(MeanProcessingTime, mean_processing_time, "exchanges.mean.time", "Mean");
    processing_time_evaluator!(
        /// DOWN when the slowest exchange took longer than `threshold`.
        MaxProcessingTime,
        max_processing_time,
        "exchanges.max.time",
        "Max"
    );
}
