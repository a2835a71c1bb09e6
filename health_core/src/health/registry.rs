//! Registry aggregating directly registered checks and repository-sourced ones

use super::check::HealthCheck;
use super::host::{HostAware, HostContext, HostSlot};
use super::routes::{Evaluator, ManagedRoute, RouteHealthCheck};
use crate::config::{CheckOverrides, HealthSettings};
use crate::error::Result;
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::debug;

pub type CheckStream = Box<dyn Iterator<Item = Arc<dyn HealthCheck>> + Send>;

pub const BEAN_REPOSITORY_ID: &str = "registry-repository";
pub const ROUTES_REPOSITORY_ID: &str = "routes";

/// A dynamic source of checks. Every call to [`stream`] pulls afresh.
///
/// [`stream`]: HealthCheckRepository::stream
pub trait HealthCheckRepository: Send + Sync {
    fn id(&self) -> &str;

    fn stream(&self) -> CheckStream;

    fn as_host_aware(&self) -> Option<&dyn HostAware> {
        None
    }
}

/// Every `Arc<dyn HealthCheck>` bound in the host's bean store.
#[derive(Default)]
pub struct BeanHealthCheckRepository {
    host: HostSlot,
    overrides: Option<Arc<CheckOverrides>>,
}

impl BeanHealthCheckRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolved configurations are applied on every pull, so beans bound
    /// after startup pick them up too.
    pub fn with_overrides(mut self, overrides: CheckOverrides) -> Self {
        self.overrides = Some(Arc::new(overrides));
        self
    }
}

impl HealthCheckRepository for BeanHealthCheckRepository {
    fn id(&self) -> &str {
        BEAN_REPOSITORY_ID
    }

    fn stream(&self) -> CheckStream {
        let Some(host) = self.host.get() else {
            return Box::new(std::iter::empty());
        };

        let checks = host.beans().find_by_type::<Arc<dyn HealthCheck>>();
        if let Some(overrides) = &self.overrides {
            for check in &checks {
                overrides.apply(check.as_ref());
            }
        }
        Box::new(checks.into_iter())
    }

    fn as_host_aware(&self) -> Option<&dyn HostAware> {
        Some(self)
    }
}

impl HostAware for BeanHealthCheckRepository {
    fn set_host(&self, host: Arc<dyn HostContext>) {
        self.host.set(host);
    }

    fn host(&self) -> Option<Arc<dyn HostContext>> {
        self.host.get()
    }
}

/// One [`RouteHealthCheck`] per route of the host. Checks are kept between
/// streams so their invocation history survives.
#[derive(Default)]
pub struct RoutesHealthCheckRepository {
    host: HostSlot,
    evaluators: RwLock<Vec<Arc<dyn Evaluator>>>,
    overrides: Option<Arc<CheckOverrides>>,
    checks: Arc<Mutex<HashMap<String, Arc<RouteHealthCheck>>>>,
}

impl RoutesHealthCheckRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_overrides(mut self, overrides: CheckOverrides) -> Self {
        self.overrides = Some(Arc::new(overrides));
        self
    }

    /// Applies to route checks created after this call.
    pub fn add_evaluator(&self, evaluator: Arc<dyn Evaluator>) {
        self.evaluators.write().push(evaluator);
    }

    pub fn evaluators(&self) -> Vec<Arc<dyn Evaluator>> {
        self.evaluators.read().clone()
    }
}

fn same_route(a: &Arc<dyn ManagedRoute>, b: &Arc<dyn ManagedRoute>) -> bool {
    std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
}

impl HealthCheckRepository for RoutesHealthCheckRepository {
    fn id(&self) -> &str {
        ROUTES_REPOSITORY_ID
    }

    fn stream(&self) -> CheckStream {
        let Some(host) = self.host.get() else {
            return Box::new(std::iter::empty());
        };

        let routes = host.routes();
        let live: HashSet<String> = routes.iter().filter_map(|route| route.route_id()).collect();
        self.checks.lock().retain(|route_id, _| live.contains(route_id));

        let cache = self.checks.clone();
        let evaluators = self.evaluators();
        let overrides = self.overrides.clone();

        Box::new(routes.into_iter().map(move |route| {
            let create = |route: Arc<dyn ManagedRoute>| {
                let check = RouteHealthCheck::for_route(route, evaluators.clone());
                if let Some(overrides) = &overrides {
                    overrides.apply(&check);
                }
                Arc::new(check)
            };

            let check = match route.route_id() {
                Some(route_id) => {
                    let mut cache = cache.lock();
                    let cached = cache
                        .get(&route_id)
                        .filter(|existing| same_route(existing.probe().route(), &route))
                        .cloned();
                    match cached {
                        Some(existing) => existing,
                        None => {
                            let check = create(route);
                            cache.insert(route_id, check.clone());
                            check
                        }
                    }
                }
                None => create(route),
            };

            check as Arc<dyn HealthCheck>
        }))
    }

    fn as_host_aware(&self) -> Option<&dyn HostAware> {
        Some(self)
    }
}

impl HostAware for RoutesHealthCheckRepository {
    fn set_host(&self, host: Arc<dyn HostContext>) {
        self.host.set(host);
    }

    fn host(&self) -> Option<Arc<dyn HostContext>> {
        self.host.get()
    }
}

pub struct HealthCheckRegistry {
    checks: RwLock<HashMap<String, Arc<dyn HealthCheck>>>,
    repositories: RwLock<Vec<Arc<dyn HealthCheckRepository>>>,
    host: RwLock<Option<Arc<dyn HostContext>>>,
    overrides: Option<CheckOverrides>,
}

impl HealthCheckRegistry {
    /// Starts with a [`BeanHealthCheckRepository`] so checks bound in the
    /// host's bean store are visible without registration.
    pub fn new() -> Self {
        Self {
            checks: RwLock::new(HashMap::new()),
            repositories: RwLock::new(vec![Arc::new(BeanHealthCheckRepository::new())]),
            host: RwLock::new(None),
            overrides: None,
        }
    }

    /// Registered checks and bean store checks get their configuration
    /// resolved against `settings` (override, then own configuration, then
    /// defaults).
    pub fn with_settings(settings: &HealthSettings) -> Result<Self> {
        let overrides = settings.overrides()?;
        let beans = BeanHealthCheckRepository::new().with_overrides(overrides.clone());
        Ok(Self {
            checks: RwLock::new(HashMap::new()),
            repositories: RwLock::new(vec![Arc::new(beans)]),
            host: RwLock::new(None),
            overrides: Some(overrides),
        })
    }

    pub fn host(&self) -> Option<Arc<dyn HostContext>> {
        self.host.read().clone()
    }

    pub fn set_host(&self, host: Arc<dyn HostContext>) {
        *self.host.write() = Some(host.clone());
        debug!("Health check registry attached to host '{}'", host.name());

        for check in self.checks.read().values() {
            if let Some(aware) = check.as_host_aware() {
                aware.set_host(host.clone());
            }
        }

        for repository in self.repositories.read().iter() {
            if let Some(aware) = repository.as_host_aware() {
                aware.set_host(host.clone());
            }
        }
    }

    /// Returns false if a check with the same id is already registered.
    pub fn register(&self, check: Arc<dyn HealthCheck>) -> bool {
        let mut checks = self.checks.write();
        if checks.contains_key(check.id()) {
            return false;
        }

        if let Some(overrides) = &self.overrides {
            overrides.apply(check.as_ref());
        }

        if let (Some(aware), Some(host)) = (check.as_host_aware(), self.host()) {
            aware.set_host(host);
        }

        debug!("Registered health check '{}'", check.id());
        checks.insert(check.id().to_string(), check);
        true
    }

    pub fn unregister(&self, check: &dyn HealthCheck) -> bool {
        self.unregister_id(check.id())
    }

    pub fn unregister_id(&self, id: &str) -> bool {
        let removed = self.checks.write().remove(id).is_some();
        if removed {
            debug!("Unregistered health check '{}'", id);
        }
        removed
    }

    /// Returns false if a repository with the same id is already present.
    pub fn add_repository(&self, repository: Arc<dyn HealthCheckRepository>) -> bool {
        let mut repositories = self.repositories.write();
        if repositories.iter().any(|existing| existing.id() == repository.id()) {
            return false;
        }

        if let (Some(aware), Some(host)) = (repository.as_host_aware(), self.host()) {
            aware.set_host(host);
        }

        debug!("Added health check repository '{}'", repository.id());
        repositories.push(repository);
        true
    }

    pub fn remove_repository(&self, repository: &dyn HealthCheckRepository) -> bool {
        let mut repositories = self.repositories.write();
        let before = repositories.len();
        repositories.retain(|existing| existing.id() != repository.id());

        let removed = repositories.len() != before;
        if removed {
            debug!("Removed health check repository '{}'", repository.id());
        }
        removed
    }

    pub fn get_repository(&self, id: &str) -> Option<Arc<dyn HealthCheckRepository>> {
        self.repositories
            .read()
            .iter()
            .find(|repository| repository.id() == id)
            .cloned()
    }

    pub fn repository_ids(&self) -> Vec<String> {
        self.repositories
            .read()
            .iter()
            .map(|repository| repository.id().to_string())
            .collect()
    }

    /// Ids of the directly registered checks, sorted.
    pub fn check_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.checks.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn get_check(&self, id: &str) -> Option<Arc<dyn HealthCheck>> {
        if let Some(check) = self.checks.read().get(id) {
            return Some(check.clone());
        }
        self.stream().find(|check| check.id() == id)
    }

    /// Registered checks followed by every repository's checks, each id
    /// yielded once. Works on snapshots, so concurrent registration never
    /// blocks or invalidates an ongoing stream.
    pub fn stream(&self) -> impl Iterator<Item = Arc<dyn HealthCheck>> + Send {
        let checks: Vec<Arc<dyn HealthCheck>> = self.checks.read().values().cloned().collect();
        let repositories = self.repositories.read().clone();
        let mut seen = HashSet::new();

        checks
            .into_iter()
            .chain(repositories.into_iter().flat_map(|repository| repository.stream()))
            .filter(move |check| seen.insert(check.id().to_string()))
    }
}

impl Default for HealthCheckRegistry {
    fn default() -> Self {
        Self::new()
    }
}
