use std::sync::{Arc, Mutex, PoisonError};

use super::{
    inject::ErasedInjector, registry::Dependency, service::ErasedService, ContainerError,
    ContainerInner, InjectedValue, Interrupted, Mode, Service, ServiceContainer,
    ServiceController, ServiceListener, StabilityMonitor,
};
use crate::ServiceName;

/// Something services can be added to.
pub trait ServiceTarget {
    fn add_service<S: Service>(&self, name: ServiceName, service: S) -> ServiceBuilder;
}

/// Read access to installed services.
pub trait ServiceRegistry {
    fn get_service(&self, name: &ServiceName) -> Option<ServiceController>;

    fn get_required_service(&self, name: &ServiceName) -> Result<ServiceController, ContainerError> {
        self.get_service(name)
            .ok_or_else(|| ContainerError::ServiceNotFound(name.clone()))
    }

    /// Names of every installed service, sorted.
    fn service_names(&self) -> Vec<ServiceName>;
}

/// Collects a service's registration until [`install`](Self::install).
#[must_use = "a service is only registered once installed"]
pub struct ServiceBuilder {
    inner: Arc<ContainerInner>,
    name: ServiceName,
    service: Arc<dyn ErasedService>,
    mode: Mode,
    dependencies: Vec<Dependency>,
    listeners: Vec<Arc<dyn ServiceListener>>,
    tracker: Option<Arc<Mutex<Vec<ServiceController>>>>,
}

impl ServiceBuilder {
    fn new(inner: Arc<ContainerInner>, name: ServiceName, service: Arc<dyn ErasedService>) -> Self {
        Self {
            inner,
            name,
            service,
            mode: Mode::Active,
            dependencies: Vec::new(),
            listeners: Vec::new(),
            tracker: None,
        }
    }

    pub fn name(&self) -> &ServiceName {
        &self.name
    }

    pub fn add_dependency(self, name: ServiceName) -> Self {
        self.with_dependency(name, false, None)
    }

    pub fn add_dependencies<I>(self, names: I) -> Self
    where
        I: IntoIterator<Item = ServiceName>,
    {
        names
            .into_iter()
            .fold(self, |builder, name| builder.add_dependency(name))
    }

    /// A dependency that does not block the start while it is not installed.
    pub fn add_optional_dependency(self, name: ServiceName) -> Self {
        self.with_dependency(name, true, None)
    }

    /// A required dependency whose value is injected into `target` before start.
    pub fn add_injected_dependency<T: Send + Sync + 'static>(
        self,
        name: ServiceName,
        target: &InjectedValue<T>,
    ) -> Self {
        self.with_dependency(name, false, Some(Arc::new(target.clone())))
    }

    pub fn add_optional_injected_dependency<T: Send + Sync + 'static>(
        self,
        name: ServiceName,
        target: &InjectedValue<T>,
    ) -> Self {
        self.with_dependency(name, true, Some(Arc::new(target.clone())))
    }

    pub fn set_initial_mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    pub fn add_listener(mut self, listener: impl ServiceListener + 'static) -> Self {
        self.listeners.push(Arc::new(listener));
        self
    }

    pub fn install(self) -> Result<ServiceController, ContainerError> {
        let controller = self.inner.install(
            self.name,
            self.service,
            self.mode,
            self.dependencies,
            self.listeners,
        )?;
        if let Some(tracker) = self.tracker {
            tracker
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(controller.clone());
        }
        Ok(controller)
    }

    fn with_dependency(
        mut self,
        name: ServiceName,
        optional: bool,
        injector: Option<Arc<dyn ErasedInjector>>,
    ) -> Self {
        match self.dependencies.iter_mut().find(|d| d.name == name) {
            Some(existing) => {
                // required wins over optional
                existing.optional &= optional;
                existing.injectors.extend(injector);
            }
            None => self.dependencies.push(Dependency {
                name,
                optional,
                injectors: injector.into_iter().collect(),
            }),
        }
        self
    }
}

impl ServiceTarget for ServiceContainer {
    fn add_service<S: Service>(&self, name: ServiceName, service: S) -> ServiceBuilder {
        ServiceBuilder::new(self.inner.clone(), name, Arc::new(service))
    }
}

impl ServiceRegistry for ServiceContainer {
    fn get_service(&self, name: &ServiceName) -> Option<ServiceController> {
        let id = self.inner.lock().entries.get(name)?.id;
        Some(ServiceController::new(self.inner.clone(), name.clone(), id))
    }

    fn service_names(&self) -> Vec<ServiceName> {
        let mut names: Vec<ServiceName> = self.inner.lock().entries.keys().cloned().collect();
        names.sort();
        names
    }
}

/// A service target that remembers every controller installed through it and
/// adds its own dependencies to each of them.
#[derive(Clone)]
pub struct TrackingServiceTarget {
    container: ServiceContainer,
    installed: Arc<Mutex<Vec<ServiceController>>>,
    dependencies: Vec<ServiceName>,
}

impl TrackingServiceTarget {
    pub fn new(container: ServiceContainer) -> Self {
        Self {
            container,
            installed: Arc::default(),
            dependencies: Vec::new(),
        }
    }

    /// Every service added through this target will also depend on `name`.
    pub fn add_dependency(&mut self, name: ServiceName) {
        if !self.dependencies.contains(&name) {
            self.dependencies.push(name);
        }
    }

    pub fn container(&self) -> &ServiceContainer {
        &self.container
    }

    /// Controllers installed so far, in installation order.
    pub fn installed(&self) -> Vec<ServiceController> {
        self.installed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Remove every tracked service and wait until they are gone.
    pub fn remove_all(&self) -> Result<(), Interrupted> {
        let controllers =
            std::mem::take(&mut *self.installed.lock().unwrap_or_else(PoisonError::into_inner));
        if controllers.is_empty() {
            return Ok(());
        }
        let monitor = StabilityMonitor::new();
        for controller in controllers.iter().rev() {
            monitor.add_controller(controller);
            // already removed controllers are fine
            let _ = controller.set_mode(Mode::Remove);
        }
        monitor.await_stability()
    }
}

impl ServiceTarget for TrackingServiceTarget {
    fn add_service<S: Service>(&self, name: ServiceName, service: S) -> ServiceBuilder {
        let mut builder = self
            .container
            .add_service(name, service)
            .add_dependencies(self.dependencies.iter().cloned());
        builder.tracker = Some(self.installed.clone());
        builder
    }
}

impl ServiceRegistry for TrackingServiceTarget {
    fn get_service(&self, name: &ServiceName) -> Option<ServiceController> {
        self.container.get_service(name)
    }

    fn service_names(&self) -> Vec<ServiceName> {
        self.container.service_names()
    }
}
