pub mod check;
pub mod configuration;
pub mod context;
pub mod helper;
pub mod host;
pub mod registry;
pub mod result;
pub mod routes;


pub use check::{keys, FnProbe, HealthCheck, HealthProbe, Metadata, Options, ProbeCheck};
pub use configuration::{HealthCheckConfiguration, DEFAULT_FAILURE_THRESHOLD, DEFAULT_INTERVAL};
pub use context::ContextHealthCheck;
pub use helper::HealthReport;
pub use host::{BeanRegistry, HostAware, HostContext, ServiceStatus, StaticHost};
pub use registry::{
    BeanHealthCheckRepository, CheckStream, HealthCheckRegistry, HealthCheckRepository,
    RoutesHealthCheckRepository,
};
pub use result::{Details, HealthCheckResult, ResultBuilder, State};
pub use routes::{Evaluator, ManagedRoute, RouteHealthCheck, RouteMetrics, RouteMetricsSnapshot, StaticRoute};
