//! The owning context checks and repositories may ask to be attached to

use super::routes::ManagedRoute;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ServiceStatus {
    Initializing,
    Starting,
    Started,
    Stopping,
    Stopped,
    Suspended,
}

impl ServiceStatus {
    pub fn is_started(&self) -> bool {
        matches!(self, ServiceStatus::Started)
    }

    pub fn is_stopped(&self) -> bool {
        matches!(self, ServiceStatus::Stopped | ServiceStatus::Suspended)
    }

    pub fn name(&self) -> &'static str {
        match self {
            ServiceStatus::Initializing => "Initializing",
            ServiceStatus::Starting => "Starting",
            ServiceStatus::Started => "Started",
            ServiceStatus::Stopping => "Stopping",
            ServiceStatus::Stopped => "Stopped",
            ServiceStatus::Suspended => "Suspended",
        }
    }
}

impl std::fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

pub trait HostContext: Send + Sync {
    fn name(&self) -> &str;
    fn status(&self) -> ServiceStatus;
    fn beans(&self) -> Arc<BeanRegistry>;
    fn routes(&self) -> Vec<Arc<dyn ManagedRoute>>;
}

/// Implemented by checks and repositories that want the registry's host.
pub trait HostAware {
    fn set_host(&self, host: Arc<dyn HostContext>);
    fn host(&self) -> Option<Arc<dyn HostContext>>;
}

#[derive(Default)]
pub struct HostSlot(RwLock<Option<Arc<dyn HostContext>>>);

impl HostSlot {
    pub fn set(&self, host: Arc<dyn HostContext>) {
        *self.0.write() = Some(host);
    }

    pub fn get(&self) -> Option<Arc<dyn HostContext>> {
        self.0.read().clone()
    }
}

/// Named component store. Values are discovered by their concrete type, so a
/// check must be bound as `Arc<dyn HealthCheck>` to be found as one.
#[derive(Default)]
pub struct BeanRegistry {
    beans: RwLock<BTreeMap<String, Arc<dyn Any + Send + Sync>>>,
}

impl BeanRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if a bean with the same name was replaced.
    pub fn bind<T: Any + Send + Sync>(&self, name: impl Into<String>, bean: T) -> bool {
        self.beans.write().insert(name.into(), Arc::new(bean)).is_some()
    }

    pub fn unbind(&self, name: &str) -> bool {
        self.beans.write().remove(name).is_some()
    }

    pub fn lookup<T: Any + Clone>(&self, name: &str) -> Option<T> {
        self.beans
            .read()
            .get(name)
            .and_then(|bean| bean.downcast_ref::<T>())
            .cloned()
    }

    pub fn find_by_type<T: Any + Clone>(&self) -> Vec<T> {
        self.beans
            .read()
            .values()
            .filter_map(|bean| bean.downcast_ref::<T>())
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.beans.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.beans.read().is_empty()
    }
}

/// In-process host whose status and route table are set by the embedder.
pub struct StaticHost {
    name: String,
    status: RwLock<ServiceStatus>,
    beans: Arc<BeanRegistry>,
    routes: RwLock<Vec<Arc<dyn ManagedRoute>>>,
}

impl StaticHost {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: RwLock::new(ServiceStatus::Initializing),
            beans: Arc::new(BeanRegistry::new()),
            routes: RwLock::new(Vec::new()),
        }
    }

    pub fn set_status(&self, status: ServiceStatus) {
        *self.status.write() = status;
    }

    pub fn add_route(&self, route: Arc<dyn ManagedRoute>) {
        self.routes.write().push(route);
    }

    pub fn remove_route(&self, route_id: &str) -> bool {
        let mut routes = self.routes.write();
        let before = routes.len();
        routes.retain(|route| route.route_id().as_deref() != Some(route_id));
        routes.len() != before
    }
}

impl HostContext for StaticHost {
    fn name(&self) -> &str {
        &self.name
    }

    fn status(&self) -> ServiceStatus {
        *self.status.read()
    }

    fn beans(&self) -> Arc<BeanRegistry> {
        self.beans.clone()
    }

    fn routes(&self) -> Vec<Arc<dyn ManagedRoute>> {
        self.routes.read().clone()
    }
}
