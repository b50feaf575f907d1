use std::{fmt, sync::Arc};

use super::{
    ContainerError, ContainerInner, Mode, ServiceContainer, ServiceListener, StartException,
    State, Substate,
};
use crate::ServiceName;

/// Handle on one installed service.
///
/// Controllers outlive their registration: once the service is removed every
/// query reports [`State::Removed`] and mutations fail with
/// [`ContainerError::IllegalState`].
#[derive(Clone)]
pub struct ServiceController {
    inner: Arc<ContainerInner>,
    name: ServiceName,
    id: u64,
}

impl ServiceController {
    pub(crate) fn new(inner: Arc<ContainerInner>, name: ServiceName, id: u64) -> Self {
        Self { inner, name, id }
    }

    pub(crate) fn inner(&self) -> &Arc<ContainerInner> {
        &self.inner
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    pub fn name(&self) -> &ServiceName {
        &self.name
    }

    pub fn container(&self) -> ServiceContainer {
        ServiceContainer {
            inner: self.inner.clone(),
        }
    }

    pub fn mode(&self) -> Mode {
        self.inner
            .lock()
            .lookup(&self.name, self.id)
            .map(|e| e.mode)
            .unwrap_or(Mode::Remove)
    }

    pub fn substate(&self) -> Substate {
        self.inner.lock().substate_of(&self.name, self.id)
    }

    pub fn state(&self) -> State {
        self.substate().state()
    }

    pub fn set_mode(&self, mode: Mode) -> Result<(), ContainerError> {
        self.inner.apply(|reg, fx| {
            let current = reg
                .lookup(&self.name, self.id)
                .map(|e| e.mode)
                .ok_or_else(|| self.illegal("service was removed"))?;
            if current == Mode::Remove && mode != Mode::Remove {
                return Err(self.illegal("service is being removed"));
            }
            reg.set_mode(&self.name, mode, fx);
            Ok(())
        })
    }

    /// Change the mode to `new` only if it currently is `expected`. Returns
    /// whether the change happened.
    pub fn compare_and_set_mode(&self, expected: Mode, new: Mode) -> Result<bool, ContainerError> {
        self.inner.apply(|reg, fx| {
            let current = reg
                .lookup(&self.name, self.id)
                .map(|e| e.mode)
                .ok_or_else(|| self.illegal("service was removed"))?;
            if current != expected {
                return Ok(false);
            }
            if current == Mode::Remove && new != Mode::Remove {
                return Err(self.illegal("service is being removed"));
            }
            reg.set_mode(&self.name, new, fx);
            Ok(true)
        })
    }

    pub fn start_exception(&self) -> Option<StartException> {
        self.inner
            .lock()
            .lookup(&self.name, self.id)
            .and_then(|e| e.start_exception.clone())
    }

    /// Leave `StartFailed` and try to start again.
    pub fn retry(&self) {
        self.inner.apply(|reg, fx| {
            if reg.lookup(&self.name, self.id).is_some() {
                reg.retry(&self.name, fx);
            }
        })
    }

    /// The published value, if the service is up and its value is a `T`.
    pub fn value<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        let value = self
            .inner
            .lock()
            .lookup(&self.name, self.id)
            .and_then(|e| e.value.clone())?;
        value.downcast::<T>().ok()
    }

    pub fn dependencies(&self) -> Vec<ServiceName> {
        self.inner
            .lock()
            .lookup(&self.name, self.id)
            .map(|e| e.dependencies.iter().map(|d| d.name.clone()).collect())
            .unwrap_or_default()
    }

    /// Required dependencies that are missing or not up, and optional ones
    /// that are installed but not up.
    pub fn unavailable_dependencies(&self) -> Vec<ServiceName> {
        let reg = self.inner.lock();
        reg.lookup(&self.name, self.id)
            .map(|e| reg.unavailable_dependencies(e))
            .unwrap_or_default()
    }

    /// Listen to this controller only. Returns false if it was already removed.
    pub fn add_listener(&self, listener: impl ServiceListener + 'static) -> bool {
        let mut reg = self.inner.lock();
        match reg.lookup_mut(&self.name, self.id) {
            Some(entry) => {
                entry.listeners.push(Arc::new(listener));
                true
            }
            None => false,
        }
    }

    fn illegal(&self, reason: &'static str) -> ContainerError {
        ContainerError::IllegalState {
            service: self.name.clone(),
            reason,
        }
    }
}

impl fmt::Debug for ServiceController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceController")
            .field("name", &self.name)
            .field("substate", &self.substate())
            .finish()
    }
}

impl PartialEq for ServiceController {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner) && self.name == other.name && self.id == other.id
    }
}

impl Eq for ServiceController {}

#[cfg(test)]
mod tests {
    use super::super::{ContainerError, Mode, ServiceContainer, ServiceTarget, State, ValueService};
    use crate::ServiceName;

    #[test]
    fn test_compare_and_set_mode() {
        let container = ServiceContainer::new();
        let c = container
            .add_service(ServiceName::of(["a"]), ValueService::new(()))
            .install()
            .unwrap();
        assert!(!c.compare_and_set_mode(Mode::Never, Mode::Active).unwrap());
        assert!(c.compare_and_set_mode(Mode::Active, Mode::Never).unwrap());
        assert_eq!(State::Down, c.state());
        assert!(c.compare_and_set_mode(Mode::Never, Mode::Remove).unwrap());
        assert_eq!(State::Removed, c.state());
        assert!(matches!(
            c.set_mode(Mode::Active),
            Err(ContainerError::IllegalState { .. })
        ));
    }
}
