use health_core::{
    evaluators::{ExchangesFailed, LastProcessingTime}, keys, CheckStream, ContextHealthCheck, HealthCheck,
    HealthCheckConfiguration, HealthCheckRegistry, HealthCheckRepository, HealthSettings,
    HostAware, HostContext, Options, ProbeCheck, RouteMetrics, RouteMetricsSnapshot,
    RoutesHealthCheckRepository, ServiceStatus, State, StaticHost, StaticRoute,
};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn up_check(id: &str) -> Arc<dyn HealthCheck> {
    Arc::new(ProbeCheck::from_fn(id.to_string(), |builder, _options| {
        builder.up();
        Ok(())
    }))
}

fn ids(registry: &HealthCheckRegistry) -> Vec<String> {
    let mut ids: Vec<String> = registry.stream().map(|check| check.id().to_string()).collect();
    ids.sort();
    ids
}

/// Repository over a fixed list that counts how often it was pulled.
struct ListRepository {
    id: String,
    checks: RwLock<Vec<Arc<dyn HealthCheck>>>,
    pulls: AtomicUsize,
    host: RwLock<Option<Arc<dyn HostContext>>>,
}

impl ListRepository {
    fn new(id: &str, checks: Vec<Arc<dyn HealthCheck>>) -> Self {
        Self {
            id: id.to_string(),
            checks: RwLock::new(checks),
            pulls: AtomicUsize::new(0),
            host: RwLock::new(None),
        }
    }
}

impl HealthCheckRepository for ListRepository {
    fn id(&self) -> &str {
        &self.id
    }

    fn stream(&self) -> CheckStream {
        self.pulls.fetch_add(1, Ordering::SeqCst);
        Box::new(self.checks.read().clone().into_iter())
    }

    fn as_host_aware(&self) -> Option<&dyn HostAware> {
        Some(self)
    }
}

impl HostAware for ListRepository {
    fn set_host(&self, host: Arc<dyn HostContext>) {
        *self.host.write() = Some(host);
    }

    fn host(&self) -> Option<Arc<dyn HostContext>> {
        self.host.read().clone()
    }
}

#[test]
fn test_register_is_idempotent_by_id() {
    let registry = HealthCheckRegistry::new();

    assert!(registry.register(up_check("db")));
    assert!(!registry.register(up_check("db")));
    assert!(registry.register(up_check("cache")));
    assert_eq!(registry.check_ids(), vec!["cache", "db"]);

    assert!(registry.unregister(up_check("db").as_ref()));
    assert!(!registry.unregister_id("db"));
    assert_eq!(ids(&registry), vec!["cache"]);
}

#[test]
fn test_stream_deduplicates_across_sources() {
    let registry = HealthCheckRegistry::new();
    let shared = up_check("shared");
    registry.register(shared.clone());

    let first = Arc::new(ListRepository::new("first", vec![shared.clone(), up_check("only-first")]));
    let second = Arc::new(ListRepository::new("second", vec![up_check("shared"), up_check("only-first")]));
    assert!(registry.add_repository(first.clone()));
    assert!(registry.add_repository(second.clone()));

    let streamed: Vec<Arc<dyn HealthCheck>> = registry.stream().collect();
    assert_eq!(streamed.len(), 2);
    assert_eq!(ids(&registry), vec!["only-first", "shared"]);

    let shared_streamed = streamed
        .iter()
        .find(|check| check.id() == "shared")
        .unwrap();
    assert!(Arc::ptr_eq(shared_streamed, &shared));
}

#[test]
fn test_repositories_pulled_lazily_on_every_stream() {
    let registry = HealthCheckRegistry::new();
    let repository = Arc::new(ListRepository::new("list", vec![up_check("a")]));
    registry.add_repository(repository.clone());

    let stream = registry.stream();
    assert_eq!(repository.pulls.load(Ordering::SeqCst), 0);
    assert_eq!(stream.count(), 1);
    assert_eq!(repository.pulls.load(Ordering::SeqCst), 1);

    repository.checks.write().push(up_check("b"));
    assert_eq!(ids(&registry), vec!["a", "b"]);
    assert_eq!(repository.pulls.load(Ordering::SeqCst), 2);
}

#[test]
fn test_repository_add_and_remove() {
    let registry = HealthCheckRegistry::new();
    assert_eq!(registry.repository_ids(), vec!["registry-repository"]);

    let repository = Arc::new(ListRepository::new("list", vec![up_check("a")]));
    assert!(registry.add_repository(repository.clone()));
    assert!(!registry.add_repository(Arc::new(ListRepository::new("list", Vec::new()))));
    assert!(registry.get_repository("list").is_some());
    assert_eq!(ids(&registry), vec!["a"]);

    assert!(registry.remove_repository(repository.as_ref()));
    assert!(!registry.remove_repository(repository.as_ref()));
    assert!(ids(&registry).is_empty());
}

#[test]
fn test_host_propagation() {
    let registry = HealthCheckRegistry::new();
    let early = Arc::new(ContextHealthCheck::for_context());
    let repository = Arc::new(ListRepository::new("list", Vec::new()));
    registry.register(early.clone());
    registry.add_repository(repository.clone());
    assert!(early.as_host_aware().unwrap().host().is_none());

    let host = Arc::new(StaticHost::new("main"));
    registry.set_host(host.clone());
    assert_eq!(early.as_host_aware().unwrap().host().unwrap().name(), "main");
    assert_eq!(repository.host().unwrap().name(), "main");
    assert_eq!(registry.host().unwrap().name(), "main");

    let late = Arc::new(ContextHealthCheck::for_context());
    registry.unregister(late.as_ref());
    registry.register(late.clone());
    assert_eq!(late.as_host_aware().unwrap().host().unwrap().name(), "main");

    let replacement = Arc::new(StaticHost::new("replacement"));
    registry.set_host(replacement);
    assert_eq!(late.as_host_aware().unwrap().host().unwrap().name(), "replacement");
    assert_eq!(repository.host().unwrap().name(), "replacement");
}

#[test]
fn test_bean_store_checks_are_discovered() {
    let registry = HealthCheckRegistry::new();
    let host = Arc::new(StaticHost::new("main"));
    host.beans().bind("db-check", up_check("db"));
    host.beans().bind("not-a-check", 42u32);

    assert!(ids(&registry).is_empty());
    registry.set_host(host.clone());
    assert_eq!(ids(&registry), vec!["db"]);

    registry.register(up_check("db"));
    assert_eq!(ids(&registry), vec!["db"]);

    host.beans().bind("cache-check", up_check("cache"));
    assert_eq!(ids(&registry), vec!["cache", "db"]);
    assert!(registry.get_check("cache").is_some());
    assert!(registry.get_check("missing").is_none());
}

#[test]
fn test_routes_repository_keeps_check_history() {
    let registry = HealthCheckRegistry::new();
    let host = Arc::new(StaticHost::new("main"));
    let orders = Arc::new(StaticRoute::new(Some("orders".to_string()), "main"));
    host.add_route(orders.clone());
    registry.set_host(host.clone());

    let routes = RoutesHealthCheckRepository::new();
    routes.add_evaluator(Arc::new(ExchangesFailed::new(3)));
    registry.add_repository(Arc::new(routes));

    let check = registry.get_check("route:orders").unwrap();
    check.set_configuration(
        HealthCheckConfiguration::new()
            .with_failure_threshold(2)
            .with_interval(Duration::ZERO),
    );

    orders.set_metrics(Some(Arc::new(RouteMetricsSnapshot {
        exchanges_failed: 5,
        ..Default::default()
    }) as Arc<dyn RouteMetrics>));
    assert_eq!(check.call(&Options::new()).unwrap().state(), State::Up);

    let again = registry.get_check("route:orders").unwrap();
    let result = again.call(&Options::new()).unwrap();
    assert_eq!(result.state(), State::Down);
    assert_eq!(result.detail(keys::FAILURE_COUNT), Some(&serde_json::json!(2)));

    host.add_route(Arc::new(StaticRoute::new(Some("billing".to_string()), "main")));
    assert_eq!(ids(&registry), vec!["route:billing", "route:orders"]);

    assert!(host.remove_route("orders"));
    assert_eq!(ids(&registry), vec!["route:billing"]);
}

#[test]
fn test_settings_overrides_apply_on_register() {
    let mut settings = HealthSettings::default();
    settings.defaults = HealthCheckConfiguration::new().with_interval(Duration::ZERO);
    settings.checks.insert(
        "runtime.*".to_string(),
        HealthCheckConfiguration::new().with_failure_threshold(1),
    );
    let registry = HealthCheckRegistry::with_settings(&settings).unwrap();

    let context = Arc::new(ContextHealthCheck::for_context());
    registry.register(context.clone());
    let host = Arc::new(StaticHost::new("main"));
    registry.set_host(host.clone());

    host.set_status(ServiceStatus::Stopped);
    assert_eq!(context.configuration().failure_threshold, Some(1));
    assert_eq!(context.configuration().interval_ms, Some(0));
    assert_eq!(context.call(&Options::new()).unwrap().state(), State::Down);
}

#[test]
fn test_routes_repository_uses_overrides() {
    let mut settings = HealthSettings::default();
    settings.checks.insert(
        "route:*".to_string(),
        HealthCheckConfiguration::new()
            .with_failure_threshold(1)
            .with_interval(Duration::ZERO),
    );

    let registry = HealthCheckRegistry::new();
    let host = Arc::new(StaticHost::new("main"));
    let route = Arc::new(StaticRoute::new(Some("orders".to_string()), "main"));
    route.set_status(ServiceStatus::Stopped);
    host.add_route(route);
    registry.set_host(host);
    registry.add_repository(Arc::new(
        RoutesHealthCheckRepository::new().with_overrides(settings.overrides().unwrap()),
    ));

    let check = registry.get_check("route:orders").unwrap();
    assert_eq!(check.call(&Options::new()).unwrap().state(), State::Down);
}

#[test]
fn test_slow_routes_keep_separate_tolerance() {
    let mut settings = HealthSettings::default();
    settings.checks.insert(
        "route:*".to_string(),
        HealthCheckConfiguration::new()
            .with_failure_threshold(1)
            .with_interval(Duration::ZERO),
    );

    let registry = HealthCheckRegistry::new();
    let host = Arc::new(StaticHost::new("main"));
    for id in ["a", "b"] {
        let route = Arc::new(StaticRoute::new(Some(id.to_string()), "main"));
        route.set_metrics(Some(Arc::new(RouteMetricsSnapshot {
            last_processing_time: Duration::from_secs(5),
            ..Default::default()
        }) as Arc<dyn RouteMetrics>));
        host.add_route(route);
    }
    registry.set_host(host);

    let routes = RoutesHealthCheckRepository::new().with_overrides(settings.overrides().unwrap());
    routes.add_evaluator(Arc::new(LastProcessingTime::new(Duration::from_millis(100), 1)));
    registry.add_repository(Arc::new(routes));

    let sweep = || {
        let mut states: Vec<(String, State)> = registry
            .stream()
            .map(|check| (check.id().to_string(), check.call(&Options::new()).unwrap().state()))
            .collect();
        states.sort_by(|a, b| a.0.cmp(&b.0));
        states
    };

    assert_eq!(
        sweep(),
        vec![("route:a".to_string(), State::Up), ("route:b".to_string(), State::Up)]
    );
    assert_eq!(
        sweep(),
        vec![("route:a".to_string(), State::Down), ("route:b".to_string(), State::Down)]
    );
}

#[test]
fn test_settings_overrides_apply_to_bean_checks() {
    let mut settings = HealthSettings::default();
    settings.defaults = HealthCheckConfiguration::new().with_interval(Duration::ZERO);
    settings.checks.insert(
        "db".to_string(),
        HealthCheckConfiguration::new().with_failure_threshold(1),
    );
    let registry = HealthCheckRegistry::with_settings(&settings).unwrap();

    let host = Arc::new(StaticHost::new("main"));
    let db = up_check("db");
    host.beans().bind("db-check", db.clone());
    registry.set_host(host);

    assert_eq!(ids(&registry), vec!["db"]);
    assert_eq!(db.configuration().failure_threshold, Some(1));
    assert_eq!(db.configuration().interval_ms, Some(0));
}
