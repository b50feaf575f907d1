//! A minimal naming registry: names bound to service values.
//!
//! The registry itself is published as the value of the
//! [`naming_registry_name`] service. [`BinderService`] binds one name while it
//! is up, so a binding lives exactly as long as the service that provides it.
use std::{
    any::Any,
    collections::BTreeMap,
    fmt,
    sync::{Arc, Mutex, PoisonError},
};

use mooring_core::{
    container::{
        ContainerError, InjectedValue, Service, ServiceController, ServiceTarget, StartContext,
        StartException, StopContext, ValueService,
    },
    ServiceName,
};
use thiserror::Error;
use tracing::debug;

pub type BoundValue = Arc<dyn Any + Send + Sync>;

pub fn naming_registry_name() -> ServiceName {
    ServiceName::jboss().append(["naming", "registry"])
}

/// `jboss.naming.context.java.module.<app>.<module>.<name>`
pub fn module_binder_name(app: &str, module: &str, name: &str) -> ServiceName {
    ServiceName::jboss().append(["naming", "context", "java", "module", app, module, name])
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NamingError {
    #[error("{0} is already bound")]
    AlreadyBound(String),
}

#[derive(Default)]
pub struct NamingRegistry {
    bindings: Mutex<BTreeMap<String, BoundValue>>,
}

impl NamingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(&self, name: impl Into<String>, value: BoundValue) -> Result<(), NamingError> {
        let name = name.into();
        let mut bindings = self.bindings();
        if bindings.contains_key(&name) {
            return Err(NamingError::AlreadyBound(name));
        }
        debug!("bound {name}");
        bindings.insert(name, value);
        Ok(())
    }

    pub fn unbind(&self, name: &str) -> Option<BoundValue> {
        let removed = self.bindings().remove(name);
        if removed.is_some() {
            debug!("unbound {name}");
        }
        removed
    }

    pub fn lookup(&self, name: &str) -> Option<BoundValue> {
        self.bindings().get(name).cloned()
    }

    /// Look a name up and downcast its value.
    pub fn lookup_as<T: Send + Sync + 'static>(&self, name: &str) -> Option<Arc<T>> {
        self.lookup(name)?.downcast::<T>().ok()
    }

    /// Every bound name, sorted.
    pub fn names(&self) -> Vec<String> {
        self.bindings().keys().cloned().collect()
    }

    fn bindings(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, BoundValue>> {
        self.bindings.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for NamingRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.names()).finish()
    }
}

/// Install the registry service. Done once at boot.
pub fn install_naming_registry(
    target: &impl ServiceTarget,
) -> Result<ServiceController, ContainerError> {
    target
        .add_service(naming_registry_name(), ValueService::new(NamingRegistry::new()))
        .install()
}

/// Binds `name` to the injected value of another service while up.
pub struct BinderService<T> {
    name: String,
    registry: InjectedValue<NamingRegistry>,
    value: InjectedValue<T>,
}

impl<T> BinderService<T> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            registry: InjectedValue::new(),
            value: InjectedValue::new(),
        }
    }

    /// Where the naming registry service is injected.
    pub fn registry(&self) -> &InjectedValue<NamingRegistry> {
        &self.registry
    }

    /// Where the bound service's value is injected.
    pub fn value_injector(&self) -> &InjectedValue<T> {
        &self.value
    }
}

impl<T: Send + Sync + 'static> Service for BinderService<T> {
    type Value = String;

    fn start(&self, _ctx: StartContext) -> Result<(), StartException> {
        let registry = self.registry.value().map_err(StartException::unexpected)?;
        let value = self.value.value().map_err(StartException::unexpected)?;
        registry
            .bind(self.name.clone(), value)
            .map_err(|e| StartException::with_cause(format!("cannot bind {}", self.name), e))
    }

    fn stop(&self, _ctx: StopContext) {
        if let Some(registry) = self.registry.get() {
            registry.unbind(&self.name);
        }
    }

    fn value(&self) -> Option<Arc<String>> {
        Some(Arc::new(self.name.clone()))
    }
}
