//! Health-check aggregation engine.
//!
//! Checks apply debounce and failure hysteresis around their own probe logic;
//! the [`HealthCheckRegistry`] exposes the deduplicated union of directly
//! registered checks and every check yielded by its repositories.

pub mod config;
pub mod error;
pub mod health;

pub use config::{AgentSettings, CheckOverrides, HealthSettings, RouteSettings};
pub use error::{HealthError, Result};
pub use health::helper;
pub use health::routes::evaluators;
pub use health::{
    keys, BeanHealthCheckRepository, BeanRegistry, CheckStream, ContextHealthCheck, Details,
    Evaluator, FnProbe, HealthCheck, HealthCheckConfiguration, HealthCheckRegistry,
    HealthCheckRepository, HealthCheckResult, HealthProbe, HealthReport, HostAware, HostContext,
    ManagedRoute, Metadata, Options, ProbeCheck, ResultBuilder, RouteHealthCheck, RouteMetrics,
    RouteMetricsSnapshot, RoutesHealthCheckRepository, ServiceStatus, State, StaticHost,
    StaticRoute, DEFAULT_FAILURE_THRESHOLD, DEFAULT_INTERVAL,
};
